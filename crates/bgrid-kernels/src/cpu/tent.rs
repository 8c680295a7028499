//! Tent kernel and the 8-corner sample topology shared by every provider.
//!
//! Each output pixel maps to a continuous grid coordinate
//!
//! ```text
//! gx = x / scale_x      gy = y / scale_y      gz = g[n, y, x] * depth_scale
//! ```
//!
//! and reads the 8 integer corners around it, weighted by
//! `tent(gx - cx) * tent(gy - cy) * tent(gz - cz)`. Corners outside the grid
//! are skipped, which makes the grid implicitly zero-padded.

use bgrid_common::SliceGeometry;

/// `max(0, 1 - |s|)`
#[inline]
pub fn tent(s: f32) -> f32 {
    (1.0 - s.abs()).max(0.0)
}

/// Subgradient of [`tent`]: `-sign(s)` inside `(-1, 1)`, zero at the kink
/// `s == 0` and wherever the kernel is flat.
#[inline]
pub fn tent_grad(s: f32) -> f32 {
    if s == 0.0 || !(s.abs() < 1.0) {
        0.0
    } else if s > 0.0 {
        -1.0
    } else {
        1.0
    }
}

/// Continuous grid coordinate of one output pixel plus its base corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplePoint {
    pub gx: f32,
    pub gy: f32,
    pub gz: f32,
    pub ix: i64,
    pub iy: i64,
    pub iz: i64,
}

/// One in-range corner of a [`SamplePoint`] with its per-axis weights.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Corner {
    pub x: usize,
    pub y: usize,
    pub z: usize,
    pub wx: f32,
    pub wy: f32,
    pub wz: f32,
    /// `tent_grad` along depth, before the `depth_scale` chain factor.
    pub dwz: f32,
}

impl Corner {
    /// Trilinear interpolation weight.
    #[inline]
    pub fn weight(&self) -> f32 {
        self.wx * self.wy * self.wz
    }

    /// Derivative of [`Corner::weight`] with respect to the guide value.
    #[inline]
    pub fn guide_weight(&self, depth_scale: f32) -> f32 {
        self.wx * self.wy * self.dwz * depth_scale
    }
}

impl SamplePoint {
    pub fn new(geom: &SliceGeometry, x: usize, y: usize, guide: f32) -> Self {
        let gx = x as f32 / geom.scale_x;
        let gy = y as f32 / geom.scale_y;
        let gz = guide * geom.depth_scale;
        // Saturating float->int casts keep non-finite guides in range of i64.
        Self { gx, gy, gz, ix: gx.floor() as i64, iy: gy.floor() as i64, iz: gz.floor() as i64 }
    }

    /// The in-range corners among the 8 surrounding this point.
    pub fn corners(&self, geom: &SliceGeometry) -> impl Iterator<Item = Corner> + use<> {
        let p = *self;
        let (w, h, d) = (geom.grid_width as i64, geom.grid_height as i64, geom.depth as i64);
        (0..8i64).filter_map(move |k| {
            let cx = p.ix.saturating_add(k & 1);
            let cy = p.iy.saturating_add((k >> 1) & 1);
            let cz = p.iz.saturating_add(k >> 2);
            if !(0..w).contains(&cx) || !(0..h).contains(&cy) || !(0..d).contains(&cz) {
                return None;
            }
            let sz = p.gz - cz as f32;
            Some(Corner {
                x: cx as usize,
                y: cy as usize,
                z: cz as usize,
                wx: tent(p.gx - cx as f32),
                wy: tent(p.gy - cy as f32),
                wz: tent(sz),
                dwz: tent_grad(sz),
            })
        })
    }
}
