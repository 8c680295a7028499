//! Reference CPU slicing kernel
//!
//! Single-threaded, loop-per-axis implementation of forward and backward
//! slicing. It prioritizes readability over speed and serves as the
//! correctness baseline that the parallel kernel is checked against.

use super::tent::SamplePoint;
use super::{validate_backward, validate_forward};
use crate::SliceKernel;
use bgrid_common::{Result, SliceGeometry};

/// Scalar slicing kernel that works everywhere.
///
/// - Forward: O(N·H·W·S·8), one output element at a time
/// - Backward: one pass, scatter-adds directly into the grid gradient
pub struct ReferenceKernel;

impl SliceKernel for ReferenceKernel {
    fn name(&self) -> &'static str {
        "reference"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn forward(
        &self,
        geom: &SliceGeometry,
        guide: &[f32],
        grid: &[f32],
        output: &mut [f32],
    ) -> Result<()> {
        validate_forward(geom, guide, grid, output)?;

        for n in 0..geom.batch {
            for y in 0..geom.height {
                for x in 0..geom.width {
                    let point = SamplePoint::new(geom, x, y, guide[geom.guide_index(n, y, x)]);
                    for c in 0..geom.coefficient_len {
                        let mut acc = 0.0f32;
                        for corner in point.corners(geom) {
                            acc += corner.weight()
                                * grid[geom.grid_index(n, c, corner.z, corner.y, corner.x)];
                        }
                        output[geom.output_index(n, y, x, c)] = acc;
                    }
                }
            }
        }

        Ok(())
    }

    fn backward(
        &self,
        geom: &SliceGeometry,
        guide: &[f32],
        grid: &[f32],
        grad_output: &[f32],
        mut grad_guide: Option<&mut [f32]>,
        mut grad_grid: Option<&mut [f32]>,
    ) -> Result<()> {
        validate_backward(
            geom,
            guide,
            grid,
            grad_output,
            grad_guide.as_deref(),
            grad_grid.as_deref(),
        )?;

        if let Some(g) = grad_guide.as_deref_mut() {
            g.fill(0.0);
        }
        if let Some(g) = grad_grid.as_deref_mut() {
            g.fill(0.0);
        }
        if grad_guide.is_none() && grad_grid.is_none() {
            return Ok(());
        }

        for n in 0..geom.batch {
            for y in 0..geom.height {
                for x in 0..geom.width {
                    let pixel = geom.guide_index(n, y, x);
                    let point = SamplePoint::new(geom, x, y, guide[pixel]);
                    let mut d_guide = 0.0f32;

                    for c in 0..geom.coefficient_len {
                        let d_out = grad_output[geom.output_index(n, y, x, c)];
                        for corner in point.corners(geom) {
                            let cell = geom.grid_index(n, c, corner.z, corner.y, corner.x);
                            if let Some(dg) = grad_grid.as_deref_mut() {
                                dg[cell] += corner.weight() * d_out;
                            }
                            d_guide += d_out * corner.guide_weight(geom.depth_scale) * grid[cell];
                        }
                    }

                    if let Some(dg) = grad_guide.as_deref_mut() {
                        dg[pixel] = d_guide;
                    }
                }
            }
        }

        Ok(())
    }
}
