//! Slice geometry: the immutable shape/scale record produced by reshape.
//!
//! A [`SliceGeometry`] is derived once from the guide and grid shapes plus a
//! [`SliceConfig`], and then passed by reference into every forward and
//! backward call. It is the single source of truth for the spatial scale
//! factors and for the guide-to-depth mapping.
//!
//! Layouts (row-major, innermost last):
//!
//! ```text
//! guide  [N, H, W]            (or [N, 1, H, W])
//! grid   [N, S * D, H', W']   channel c owns depth slab [c*D, (c+1)*D)
//! output [N, H, W, S]         ChannelsLast
//!        [N, S, H, W]         ChannelsFirst
//! ```

use crate::config::{OutputLayout, SliceConfig};
use crate::error::ShapeError;
use std::ops::Range;

/// Cached shape metadata for one guide/grid shape pair.
#[derive(Debug, Clone, PartialEq)]
pub struct SliceGeometry {
    pub batch: usize,
    pub height: usize,
    pub width: usize,
    pub grid_height: usize,
    pub grid_width: usize,
    /// Depth resolution `D` of one channel's slab.
    pub depth: usize,
    /// Number of output channels `S`.
    pub coefficient_len: usize,
    /// Output pixels per grid cell along x (`W / W'`).
    pub scale_x: f32,
    /// Output pixels per grid cell along y (`H / H'`).
    pub scale_y: f32,
    /// Multiplier turning a guide value into a depth coordinate.
    pub depth_scale: f32,
    pub layout: OutputLayout,
}

/// One contiguous row of the output buffer.
///
/// In `ChannelsLast` a row covers every channel of `(n, y)`; in
/// `ChannelsFirst` it covers a single channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputRow {
    pub batch: usize,
    pub y: usize,
    pub channels: Range<usize>,
    /// Distance between consecutive `x` positions inside the row.
    pub x_stride: usize,
}

impl OutputRow {
    /// Offset of `(x, c)` inside the row slice.
    #[inline]
    pub fn offset(&self, x: usize, c: usize) -> usize {
        x * self.x_stride + (c - self.channels.start)
    }
}

impl SliceGeometry {
    /// Validate the guide and grid shapes against `config` and derive the
    /// geometry.
    ///
    /// `guide_shape` is `[N, H, W]` or `[N, 1, H, W]`; `grid_shape` is
    /// `[N, S * D, H', W']`.
    pub fn from_shapes(
        guide_shape: &[usize],
        grid_shape: &[usize],
        config: &SliceConfig,
    ) -> Result<Self, ShapeError> {
        let (batch, height, width) = match *guide_shape {
            [n, h, w] => (n, h, w),
            [n, 1, h, w] => (n, h, w),
            [_, c, _, _] => return Err(ShapeError::GuideChannels { channels: c }),
            _ => {
                return Err(ShapeError::Rank {
                    tensor: "guide",
                    expected: "3 or 4",
                    shape: guide_shape.to_vec(),
                });
            }
        };
        let [grid_batch, depth_dim, grid_height, grid_width] = *grid_shape else {
            return Err(ShapeError::Rank {
                tensor: "grid",
                expected: "4",
                shape: grid_shape.to_vec(),
            });
        };

        if guide_shape.contains(&0) {
            return Err(ShapeError::EmptyDimension { tensor: "guide", shape: guide_shape.to_vec() });
        }
        if grid_shape.contains(&0) {
            return Err(ShapeError::EmptyDimension { tensor: "grid", shape: grid_shape.to_vec() });
        }
        if batch != grid_batch {
            return Err(ShapeError::BatchMismatch { guide: batch, grid: grid_batch });
        }

        let coefficient_len = config.coefficient_len;
        let depth = match config.depth {
            Some(depth) => {
                if coefficient_len.checked_mul(depth) != Some(depth_dim) {
                    return Err(ShapeError::GridDepthMismatch { depth_dim, coefficient_len, depth });
                }
                depth
            }
            None => {
                if coefficient_len == 0 || depth_dim % coefficient_len != 0 {
                    return Err(ShapeError::IndivisibleDepth { depth_dim, coefficient_len });
                }
                depth_dim / coefficient_len
            }
        };

        let output_len = [batch, height, width, coefficient_len]
            .into_iter()
            .try_fold(1usize, usize::checked_mul);
        if output_len.is_none() {
            return Err(ShapeError::TooLarge {
                tensor: "output",
                shape: vec![batch, height, width, coefficient_len],
            });
        }
        if grid_shape.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d)).is_none() {
            return Err(ShapeError::TooLarge { tensor: "grid", shape: grid_shape.to_vec() });
        }

        Ok(Self {
            batch,
            height,
            width,
            grid_height,
            grid_width,
            depth,
            coefficient_len,
            scale_x: width as f32 / grid_width as f32,
            scale_y: height as f32 / grid_height as f32,
            depth_scale: config.depth_mapping.depth_scale(depth),
            layout: config.output_layout,
        })
    }

    pub fn guide_len(&self) -> usize {
        self.batch * self.height * self.width
    }

    /// Elements in one batch entry of the grid.
    pub fn grid_slab_len(&self) -> usize {
        self.coefficient_len * self.depth * self.grid_height * self.grid_width
    }

    pub fn grid_len(&self) -> usize {
        self.batch * self.grid_slab_len()
    }

    pub fn output_len(&self) -> usize {
        self.batch * self.height * self.width * self.coefficient_len
    }

    pub fn guide_shape(&self) -> [usize; 3] {
        [self.batch, self.height, self.width]
    }

    pub fn grid_shape(&self) -> [usize; 4] {
        [self.batch, self.coefficient_len * self.depth, self.grid_height, self.grid_width]
    }

    pub fn output_shape(&self) -> [usize; 4] {
        match self.layout {
            OutputLayout::ChannelsLast => {
                [self.batch, self.height, self.width, self.coefficient_len]
            }
            OutputLayout::ChannelsFirst => {
                [self.batch, self.coefficient_len, self.height, self.width]
            }
        }
    }

    #[inline]
    pub fn guide_index(&self, n: usize, y: usize, x: usize) -> usize {
        (n * self.height + y) * self.width + x
    }

    /// Index of `(c, z, y, x)` inside one batch slab of the grid.
    #[inline]
    pub fn grid_slab_index(&self, c: usize, z: usize, y: usize, x: usize) -> usize {
        ((c * self.depth + z) * self.grid_height + y) * self.grid_width + x
    }

    #[inline]
    pub fn grid_index(&self, n: usize, c: usize, z: usize, y: usize, x: usize) -> usize {
        n * self.grid_slab_len() + self.grid_slab_index(c, z, y, x)
    }

    #[inline]
    pub fn output_index(&self, n: usize, y: usize, x: usize, c: usize) -> usize {
        match self.layout {
            OutputLayout::ChannelsLast => {
                ((n * self.height + y) * self.width + x) * self.coefficient_len + c
            }
            OutputLayout::ChannelsFirst => {
                ((n * self.coefficient_len + c) * self.height + y) * self.width + x
            }
        }
    }

    /// Length of one contiguous output row.
    pub fn output_row_len(&self) -> usize {
        match self.layout {
            OutputLayout::ChannelsLast => self.width * self.coefficient_len,
            OutputLayout::ChannelsFirst => self.width,
        }
    }

    /// Decode the `row`-th chunk of `output_row_len()` elements.
    pub fn output_row(&self, row: usize) -> OutputRow {
        match self.layout {
            OutputLayout::ChannelsLast => OutputRow {
                batch: row / self.height,
                y: row % self.height,
                channels: 0..self.coefficient_len,
                x_stride: self.coefficient_len,
            },
            OutputLayout::ChannelsFirst => {
                let c = (row / self.height) % self.coefficient_len;
                OutputRow {
                    batch: row / (self.height * self.coefficient_len),
                    y: row % self.height,
                    channels: c..c + 1,
                    x_stride: 1,
                }
            }
        }
    }
}
