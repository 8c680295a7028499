//! Multi-threaded CPU slicing kernel (Rayon).
//!
//! # Work partitioning
//!
//! - **Forward**: output rows are independent; each rayon task fills one
//!   contiguous row of the output buffer.
//! - **Guide gradient**: one writer per pixel; tasks own rows of the guide
//!   gradient and sum over channels locally.
//! - **Grid gradient**: many output pixels scatter into the same grid cell.
//!   Rows are split into fixed chunks; each task accumulates its chunk into a
//!   private slab-sized buffer and the partial slabs are summed in chunk
//!   order, so no two threads ever write the same cell.
//!
//! Chunk boundaries depend only on the image height and the pool size, so
//! repeated calls on the same kernel are bit-identical. Pools of different
//! sizes may differ from each other (and from [`ReferenceKernel`]) in the
//! last bits of the grid gradient.
//!
//! [`ReferenceKernel`]: super::ReferenceKernel

use super::tent::SamplePoint;
use super::{guide_derivative, sample_channel, validate_backward, validate_forward};
use crate::SliceKernel;
use bgrid_common::{KernelError, Result, SliceGeometry};
use rayon::prelude::*;

/// Minimum rows handed to one task when accumulating the grid gradient.
const MIN_ROWS_PER_TASK: usize = 4;

/// Row-partitioned slicing kernel.
pub struct ParallelKernel {
    pool: Option<rayon::ThreadPool>,
}

impl ParallelKernel {
    /// Kernel running on the global rayon pool.
    pub fn new() -> Self {
        Self { pool: None }
    }

    /// Kernel with a dedicated pool of `num_threads` workers.
    pub fn with_threads(num_threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|idx| format!("bgrid-slice-{idx}"))
            .build()
            .map_err(|e| KernelError::ExecutionFailed {
                reason: format!("failed to build slice thread pool: {e}"),
            })?;
        Ok(Self { pool: Some(pool) })
    }

    pub fn num_threads(&self) -> usize {
        match &self.pool {
            Some(pool) => pool.current_num_threads(),
            None => rayon::current_num_threads(),
        }
    }

    fn install<R: Send>(&self, op: impl FnOnce() -> R + Send) -> R {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }

    fn grid_gradient(
        &self,
        geom: &SliceGeometry,
        guide: &[f32],
        grad_output: &[f32],
        grad_grid: &mut [f32],
    ) {
        let slab = geom.grid_slab_len();
        let rows_per_task = geom.height.div_ceil(self.num_threads().max(1)).max(MIN_ROWS_PER_TASK);
        let num_tasks = geom.height.div_ceil(rows_per_task);

        for (n, grad_slab) in grad_grid.chunks_mut(slab).enumerate() {
            let partials: Vec<Vec<f32>> = (0..num_tasks)
                .into_par_iter()
                .map(|task| {
                    let mut acc = vec![0.0f32; slab];
                    let rows = task * rows_per_task..((task + 1) * rows_per_task).min(geom.height);
                    for y in rows {
                        for x in 0..geom.width {
                            let point = SamplePoint::new(geom, x, y, guide[geom.guide_index(n, y, x)]);
                            for c in 0..geom.coefficient_len {
                                let d_out = grad_output[geom.output_index(n, y, x, c)];
                                for corner in point.corners(geom) {
                                    acc[geom.grid_slab_index(c, corner.z, corner.y, corner.x)] +=
                                        corner.weight() * d_out;
                                }
                            }
                        }
                    }
                    acc
                })
                .collect();

            // Summed in task order so the result only depends on the pool size.
            grad_slab.fill(0.0);
            for partial in &partials {
                grad_slab.iter_mut().zip(partial).for_each(|(g, p)| *g += p);
            }
        }
    }
}

impl Default for ParallelKernel {
    fn default() -> Self {
        Self::new()
    }
}

impl SliceKernel for ParallelKernel {
    fn name(&self) -> &'static str {
        "parallel"
    }

    fn is_available(&self) -> bool {
        self.pool.is_some() || num_cpus::get() > 1
    }

    fn forward(
        &self,
        geom: &SliceGeometry,
        guide: &[f32],
        grid: &[f32],
        output: &mut [f32],
    ) -> Result<()> {
        validate_forward(geom, guide, grid, output)?;
        let slab = geom.grid_slab_len();

        self.install(|| {
            output.par_chunks_mut(geom.output_row_len()).enumerate().for_each(|(r, row)| {
                let out_row = geom.output_row(r);
                let grid_slab = &grid[out_row.batch * slab..][..slab];
                for x in 0..geom.width {
                    let g = guide[geom.guide_index(out_row.batch, out_row.y, x)];
                    let point = SamplePoint::new(geom, x, out_row.y, g);
                    for c in out_row.channels.clone() {
                        row[out_row.offset(x, c)] = sample_channel(geom, grid_slab, &point, c);
                    }
                }
            });
        });

        Ok(())
    }

    fn backward(
        &self,
        geom: &SliceGeometry,
        guide: &[f32],
        grid: &[f32],
        grad_output: &[f32],
        grad_guide: Option<&mut [f32]>,
        grad_grid: Option<&mut [f32]>,
    ) -> Result<()> {
        validate_backward(
            geom,
            guide,
            grid,
            grad_output,
            grad_guide.as_deref(),
            grad_grid.as_deref(),
        )?;
        let slab = geom.grid_slab_len();

        self.install(|| {
            if let Some(grad_guide) = grad_guide {
                grad_guide.par_chunks_mut(geom.width).enumerate().for_each(|(r, dg_row)| {
                    let (n, y) = (r / geom.height, r % geom.height);
                    let grid_slab = &grid[n * slab..][..slab];
                    for (x, dg) in dg_row.iter_mut().enumerate() {
                        let point = SamplePoint::new(geom, x, y, guide[geom.guide_index(n, y, x)]);
                        *dg = (0..geom.coefficient_len)
                            .map(|c| {
                                grad_output[geom.output_index(n, y, x, c)]
                                    * guide_derivative(geom, grid_slab, &point, c)
                            })
                            .sum();
                    }
                });
            }

            if let Some(grad_grid) = grad_grid {
                self.grid_gradient(geom, guide, grad_output, grad_grid);
            }
        });

        Ok(())
    }
}
