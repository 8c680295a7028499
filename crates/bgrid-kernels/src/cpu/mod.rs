//! CPU kernel implementations

pub mod fallback;
pub mod parallel;
pub mod tent;

pub use fallback::ReferenceKernel;
pub use parallel::ParallelKernel;
pub use tent::{Corner, SamplePoint, tent, tent_grad};

use bgrid_common::{Result, ShapeError, SliceGeometry};

fn check_len(buffer: &'static str, actual: usize, expected: usize) -> Result<()> {
    if actual != expected {
        return Err(ShapeError::BufferLength { buffer, expected, actual }.into());
    }
    Ok(())
}

pub(crate) fn validate_forward(
    geom: &SliceGeometry,
    guide: &[f32],
    grid: &[f32],
    output: &[f32],
) -> Result<()> {
    check_len("guide", guide.len(), geom.guide_len())?;
    check_len("grid", grid.len(), geom.grid_len())?;
    check_len("output", output.len(), geom.output_len())
}

pub(crate) fn validate_backward(
    geom: &SliceGeometry,
    guide: &[f32],
    grid: &[f32],
    grad_output: &[f32],
    grad_guide: Option<&[f32]>,
    grad_grid: Option<&[f32]>,
) -> Result<()> {
    validate_forward(geom, guide, grid, grad_output)?;
    if let Some(g) = grad_guide {
        check_len("grad_guide", g.len(), geom.guide_len())?;
    }
    if let Some(g) = grad_grid {
        check_len("grad_grid", g.len(), geom.grid_len())?;
    }
    Ok(())
}

/// Interpolated value of channel `c` at `point`, reading from one batch slab.
#[inline]
pub(crate) fn sample_channel(
    geom: &SliceGeometry,
    grid_slab: &[f32],
    point: &SamplePoint,
    c: usize,
) -> f32 {
    point
        .corners(geom)
        .map(|k| k.weight() * grid_slab[geom.grid_slab_index(c, k.z, k.y, k.x)])
        .sum()
}

/// d(output[c]) / d(guide) at `point`.
#[inline]
pub(crate) fn guide_derivative(
    geom: &SliceGeometry,
    grid_slab: &[f32],
    point: &SamplePoint,
    c: usize,
) -> f32 {
    point
        .corners(geom)
        .map(|k| k.guide_weight(geom.depth_scale) * grid_slab[geom.grid_slab_index(c, k.z, k.y, k.x)])
        .sum()
}
