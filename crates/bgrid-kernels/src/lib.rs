//! Bilateral grid slicing kernels
//!
//! A [`SliceKernel`] implements the forward slice (trilinear gather from the
//! grid, indexed by position and guide intensity) and its backward pass
//! (scatter-add into the grid gradient, tent-derivative into the guide
//! gradient). Providers are interchangeable; [`KernelManager`] and
//! [`select_kernel`] choose one at runtime.

use bgrid_common::{BackendRequest, KernelError, Result, SliceGeometry};
use std::sync::OnceLock;

pub mod cpu;

pub use cpu::{ParallelKernel, ReferenceKernel};

/// Forward/backward slicing provider.
///
/// All buffers are flat row-major slices whose lengths must match `geom`
/// (see [`SliceGeometry::guide_len`], [`SliceGeometry::grid_len`] and
/// [`SliceGeometry::output_len`]).
pub trait SliceKernel: Send + Sync {
    fn name(&self) -> &'static str;
    fn is_available(&self) -> bool;

    /// Slice `grid` with `guide` into `output`. Every element of `output` is
    /// overwritten.
    fn forward(
        &self,
        geom: &SliceGeometry,
        guide: &[f32],
        grid: &[f32],
        output: &mut [f32],
    ) -> Result<()>;

    /// Compute gradients of the loss with respect to the guide and/or the
    /// grid. Requested buffers are zero-filled first; `None` skips that
    /// gradient entirely.
    fn backward(
        &self,
        geom: &SliceGeometry,
        guide: &[f32],
        grid: &[f32],
        grad_output: &[f32],
        grad_guide: Option<&mut [f32]>,
        grad_grid: Option<&mut [f32]>,
    ) -> Result<()>;
}

/// Kernel manager for selecting the preferred provider with cached selection
pub struct KernelManager {
    providers: Vec<Box<dyn SliceKernel>>,
    selected: OnceLock<usize>,
}

impl KernelManager {
    pub fn new() -> Self {
        // Ordered by preference; the reference kernel is last and always available.
        let providers: Vec<Box<dyn SliceKernel>> =
            vec![Box::new(ParallelKernel::new()), Box::new(ReferenceKernel)];
        Self { providers, selected: OnceLock::new() }
    }

    /// Select the best available kernel provider with caching
    pub fn select_best(&self) -> Result<&dyn SliceKernel> {
        let selected_idx = self.selected.get_or_init(|| {
            for (i, provider) in self.providers.iter().enumerate() {
                if provider.is_available() {
                    log::info!("Selected slice kernel: {}", provider.name());
                    return i;
                }
            }
            log::error!("No available slice kernel found");
            self.providers.len() - 1
        });

        self.providers
            .get(*selected_idx)
            .map(|provider| provider.as_ref())
            .ok_or_else(|| KernelError::NoProvider.into())
    }

    /// Name of the currently selected provider, if selection has happened.
    pub fn selected_provider_name(&self) -> Option<&'static str> {
        self.selected.get().and_then(|&idx| self.providers.get(idx)).map(|p| p.name())
    }

    pub fn list_available_providers(&self) -> Vec<&'static str> {
        self.providers.iter().filter(|p| p.is_available()).map(|p| p.name()).collect()
    }

    /// Force reselection (for testing)
    #[cfg(test)]
    pub fn reset_selection(&mut self) {
        self.selected = OnceLock::new();
    }
}

impl Default for KernelManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Build an owned provider for `request`.
///
/// `num_threads` gives the parallel kernel a dedicated worker pool instead of
/// the global rayon pool; it is ignored by the reference kernel.
pub fn select_kernel(
    request: BackendRequest,
    num_threads: Option<usize>,
) -> Result<Box<dyn SliceKernel>> {
    let parallel = || -> Result<ParallelKernel> {
        match num_threads {
            Some(n) => ParallelKernel::with_threads(n),
            None => Ok(ParallelKernel::new()),
        }
    };

    let kernel: Box<dyn SliceKernel> = match request {
        BackendRequest::Reference => Box::new(ReferenceKernel),
        BackendRequest::Parallel => {
            let kernel = parallel()?;
            if !kernel.is_available() {
                log::warn!("parallel slice kernel requested on a single-core host");
            }
            Box::new(kernel)
        }
        BackendRequest::Auto => {
            let kernel = parallel()?;
            if kernel.is_available() { Box::new(kernel) } else { Box::new(ReferenceKernel) }
        }
    };

    log::debug!("slice kernel for request={request}: {}", kernel.name());
    Ok(kernel)
}
