//! Bilateral slicing layer
//!
//! [`BilateralSliceLayer`] is the surface a host execution engine drives:
//!
//! 1. [`reshape`](BilateralSliceLayer::reshape) whenever input shapes change.
//!    It validates `depth_dim == coefficient_len * depth`, derives the scale
//!    factors and resizes the output/gradient buffers.
//! 2. [`forward`](BilateralSliceLayer::forward) slices the grid with the guide.
//! 3. [`backward`](BilateralSliceLayer::backward) produces the requested
//!    gradients.
//!
//! Buffers are owned by the layer and reused across calls with the same shape.

use bgrid_common::{BilateralError, Result, SliceConfig, SliceGeometry};
use bgrid_kernels::{SliceKernel, select_kernel};
use std::path::Path;
use tracing::{debug, info, instrument};

/// Which inputs should receive a gradient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropagateDown {
    pub guide: bool,
    pub grid: bool,
}

impl PropagateDown {
    pub const ALL: Self = Self { guide: true, grid: true };
    pub const NONE: Self = Self { guide: false, grid: false };
    pub const GRID_ONLY: Self = Self { guide: false, grid: true };
    pub const GUIDE_ONLY: Self = Self { guide: true, grid: false };
}

impl Default for PropagateDown {
    fn default() -> Self {
        Self::ALL
    }
}

/// Gradients produced by one backward call. `None` for inputs that were not
/// requested.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SliceGradients<'a> {
    pub guide: Option<&'a [f32]>,
    pub grid: Option<&'a [f32]>,
}

type ShapeKey = (Vec<usize>, Vec<usize>);

pub struct BilateralSliceLayer {
    config: SliceConfig,
    kernel: Box<dyn SliceKernel>,
    shapes: Option<ShapeKey>,
    geometry: Option<SliceGeometry>,
    output: Vec<f32>,
    grad_guide: Vec<f32>,
    grad_grid: Vec<f32>,
}

impl BilateralSliceLayer {
    /// Create a layer, picking the kernel named by `config.backend`.
    pub fn new(config: SliceConfig) -> Result<Self> {
        config.validate()?;
        let kernel = select_kernel(config.backend, config.num_threads)?;
        Ok(Self::with_kernel(config, kernel))
    }

    /// Create a layer from a TOML/JSON file with `BGRID_*` env overrides.
    pub fn from_config_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::new(SliceConfig::load(path)?)
    }

    /// Create a layer around an explicit kernel.
    pub fn with_kernel(config: SliceConfig, kernel: Box<dyn SliceKernel>) -> Self {
        info!(kernel = kernel.name(), backend = %config.backend, "bilateral slice layer created");
        Self {
            config,
            kernel,
            shapes: None,
            geometry: None,
            output: Vec::new(),
            grad_guide: Vec::new(),
            grad_grid: Vec::new(),
        }
    }

    pub fn config(&self) -> &SliceConfig {
        &self.config
    }

    pub fn kernel_name(&self) -> &'static str {
        self.kernel.name()
    }

    /// Geometry from the last successful reshape.
    pub fn geometry(&self) -> Option<&SliceGeometry> {
        self.geometry.as_ref()
    }

    /// Output of the last forward call.
    pub fn output(&self) -> &[f32] {
        &self.output
    }

    /// Validate shapes and (re)derive the geometry if they changed.
    ///
    /// On failure the previous geometry is dropped, so forward/backward will
    /// refuse to run until a valid reshape succeeds.
    pub fn reshape(&mut self, guide_shape: &[usize], grid_shape: &[usize]) -> Result<&SliceGeometry> {
        let unchanged = self.geometry.is_some()
            && self
                .shapes
                .as_ref()
                .is_some_and(|(g, r)| g.as_slice() == guide_shape && r.as_slice() == grid_shape);

        if !unchanged {
            self.shapes = None;
            self.geometry = None;

            let geom = SliceGeometry::from_shapes(guide_shape, grid_shape, &self.config)?;
            debug!(
                guide = ?guide_shape,
                grid = ?grid_shape,
                depth = geom.depth,
                scale_x = geom.scale_x,
                scale_y = geom.scale_y,
                depth_scale = geom.depth_scale,
                "slice geometry derived"
            );

            self.output.resize(geom.output_len(), 0.0);
            self.grad_guide.resize(geom.guide_len(), 0.0);
            self.grad_grid.resize(geom.grid_len(), 0.0);
            self.shapes = Some((guide_shape.to_vec(), grid_shape.to_vec()));
            self.geometry = Some(geom);
        }

        self.geometry.as_ref().ok_or(BilateralError::NotReshaped)
    }

    /// Slice `grid` with `guide`; returns the output buffer.
    #[instrument(level = "debug", skip_all, fields(kernel = self.kernel.name()))]
    pub fn forward(&mut self, guide: &[f32], grid: &[f32]) -> Result<&[f32]> {
        let geom = self.geometry.as_ref().ok_or(BilateralError::NotReshaped)?;
        self.kernel.forward(geom, guide, grid, &mut self.output)?;
        Ok(&self.output)
    }

    /// Compute the gradients selected by `propagate` from `grad_output`.
    ///
    /// Coordinates and weights are recomputed from `guide` and `grid`; no
    /// forward state is cached between the two calls.
    #[instrument(level = "debug", skip_all, fields(kernel = self.kernel.name(), ?propagate))]
    pub fn backward(
        &mut self,
        guide: &[f32],
        grid: &[f32],
        grad_output: &[f32],
        propagate: PropagateDown,
    ) -> Result<SliceGradients<'_>> {
        let geom = self.geometry.as_ref().ok_or(BilateralError::NotReshaped)?;
        self.kernel.backward(
            geom,
            guide,
            grid,
            grad_output,
            propagate.guide.then_some(self.grad_guide.as_mut_slice()),
            propagate.grid.then_some(self.grad_grid.as_mut_slice()),
        )?;

        Ok(SliceGradients {
            guide: propagate.guide.then_some(self.grad_guide.as_slice()),
            grid: propagate.grid.then_some(self.grad_grid.as_slice()),
        })
    }
}
