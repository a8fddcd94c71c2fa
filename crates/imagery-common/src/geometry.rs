//! Window geometry: rectangles, clip regions, the map viewport and affine
//! transforms.
//!
//! Two coordinate conventions meet here. Callers and map placement use the
//! library convention (origin bottom-left, y increasing upwards). Rasters
//! use window pixels (origin top-left, y increasing downwards). [`Viewport`] converts between them.

use serde::{Deserialize, Serialize};

/// Trig results smaller than this are snapped to zero so that right angle
/// rotations produce exact axis swaps.
const TRIG_EPSILON: f64 = 1e-7;

/// Sine of an angle in degrees, snapped to zero near the axes.
pub fn sin_deg(degrees: f64) -> f64 {
    let s = degrees.to_radians().sin();
    if s.abs() < TRIG_EPSILON {
        0.0
    } else {
        s
    }
}

/// Cosine of an angle in degrees, snapped to zero near the axes.
pub fn cos_deg(degrees: f64) -> f64 {
    let c = degrees.to_radians().cos();
    if c.abs() < TRIG_EPSILON {
        0.0
    } else {
        c
    }
}

/// An axis aligned rectangle in window pixels (origin top-left).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> i32 {
        self.x + self.width as i32
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height as i32
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Rectangles under 3 pixels in either direction come from roundoff and
    /// are never drawn.
    pub fn is_degenerate(&self) -> bool {
        self.width < 3 || self.height < 3
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(Rect::new(x0, y0, (x1 - x0) as u32, (y1 - y0) as u32))
    }

    /// Y of the rectangle's bottom edge in library coordinates.
    pub fn library_y(&self, window_height: u32) -> i32 {
        window_height as i32 - self.bottom()
    }
}

/// A clip region in library coordinates, inclusive pixel bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipRect {
    pub left: i32,
    pub bottom: i32,
    pub right: i32,
    pub top: i32,
}

impl ClipRect {
    pub fn new(left: i32, bottom: i32, right: i32, top: i32) -> Self {
        Self {
            left,
            bottom,
            right,
            top,
        }
    }

    /// Convert to window limits `(left, right, top, bottom)`, inclusive and
    /// constrained to the window.
    pub fn window_limits(&self, window_width: u32, window_height: u32) -> (i32, i32, i32, i32) {
        let ym = window_height as i32;
        let vl = self.left.max(0);
        let vr = self.right.min(window_width as i32 - 1);
        let vt = (ym - self.top - 1).max(0);
        let vb = (ym - self.bottom - 1).min(ym - 1);
        (vl, vr, vt, vb)
    }
}

/// Mapping from map coordinates to window pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub window_width: u32,
    pub window_height: u32,
    /// Map extent, used as the placement of synthetic images.
    pub map_width: f64,
    pub map_height: f64,
    pub scale_x: f64,
    pub scale_y: f64,
    pub trans_x: f64,
    pub trans_y: f64,
}

impl Viewport {
    /// A viewport where one map unit is one window pixel.
    pub fn identity(width: u32, height: u32) -> Self {
        Self {
            window_width: width,
            window_height: height,
            map_width: width as f64,
            map_height: height as f64,
            scale_x: 1.0,
            scale_y: 1.0,
            trans_x: 0.0,
            trans_y: 0.0,
        }
    }

    /// A viewport fitting a map of the given extent into the window.
    pub fn fit(map_width: f64, map_height: f64, window_width: u32, window_height: u32) -> Self {
        Self {
            window_width,
            window_height,
            map_width,
            map_height,
            scale_x: window_width as f64 / map_width,
            scale_y: window_height as f64 / map_height,
            trans_x: 0.0,
            trans_y: 0.0,
        }
    }

    /// Window column of a map x.
    pub fn window_x(&self, mx: f64) -> i32 {
        (mx * self.scale_x + self.trans_x).floor() as i32
    }

    /// Window row of a map y (mirrored).
    pub fn window_y(&self, my: f64) -> i32 {
        self.window_height as i32 - 1 - (my * self.scale_y + self.trans_y).floor() as i32
    }

    /// A map width in window pixels, rounded.
    pub fn pixel_width(&self, mw: f64) -> i32 {
        (mw * self.scale_x + 0.5).floor() as i32
    }

    /// A map height in window pixels, rounded.
    pub fn pixel_height(&self, mh: f64) -> i32 {
        (mh * self.scale_y + 0.5).floor() as i32
    }

    /// The clip region covering the whole window.
    pub fn full_clip(&self) -> ClipRect {
        ClipRect::new(
            0,
            0,
            self.window_width as i32 - 1,
            self.window_height as i32 - 1,
        )
    }
}

/// A 2x3 affine transform `[a0, a1, a2, a3, a4, a5]` applied as
/// `x' = x*a0 + y*a2 + a4`, `y' = x*a1 + y*a3 + a5`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Affine(pub [f64; 6]);

impl Affine {
    pub const IDENTITY: Affine = Affine([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    /// Scale, then rotate, then translate.
    ///
    /// `rotation` is in degrees in the library convention. Raster rows grow
    /// downwards, so the angle is negated here.
    pub fn scale_rotate_translate(sx: f64, sy: f64, rotation: f64, tx: f64, ty: f64) -> Self {
        let s = sin_deg(-rotation);
        let c = cos_deg(-rotation);
        Affine([sx * c, sx * s, -sy * s, sy * c, tx, ty])
    }

    #[inline(always)]
    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        let a = &self.0;
        (x * a[0] + y * a[2] + a[4], x * a[1] + y * a[3] + a[5])
    }

    pub fn determinant(&self) -> f64 {
        self.0[0] * self.0[3] - self.0[1] * self.0[2]
    }

    /// The inverse transform, or `None` for a singular matrix.
    pub fn invert(&self) -> Option<Affine> {
        let det = self.determinant();
        if det.abs() < f64::EPSILON {
            return None;
        }
        let a = &self.0;
        let r = 1.0 / det;
        let i0 = a[3] * r;
        let i1 = -a[1] * r;
        let i2 = -a[2] * r;
        let i3 = a[0] * r;
        Some(Affine([
            i0,
            i1,
            i2,
            i3,
            -a[4] * i0 - a[5] * i2,
            -a[4] * i1 - a[5] * i3,
        ]))
    }

    pub fn coefficients(&self) -> [f64; 6] {
        self.0
    }
}

impl Default for Affine {
    fn default() -> Self {
        Self::IDENTITY
    }
}
