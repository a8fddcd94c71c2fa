//! Nearest neighbour affine resampling.
//!
//! Every destination pixel centre is mapped back into the source through the
//! inverse transform. A per-row pre-pass ([`affine_run`]) narrows the columns
//! to those that can land inside the source so large transparent margins of
//! rotated or shifted images cost nothing.

use crate::codec::PixelCodec;
use crate::colormap::ColorMapper;
use crate::raster::Raster;
use imagery_common::{Affine, Rgb, RASTER_BPP};

/// Coefficients smaller than this are treated as zero by [`affine_run`].
pub const AFFINE_EPSILON: f64 = 1e-6;

/// Test bit `index` of a row-major, LSB-first source mask.
#[inline(always)]
pub fn mask_bit(mask: &[u8], index: usize) -> bool {
    mask.get(index >> 3)
        .map_or(false, |b| b & (1u8 << (index & 7)) != 0)
}

/// Narrow `[x0, x1)` on destination row `y` to the columns whose inverse
/// mapping falls inside a `width` x `height` source.
///
/// An empty run is returned as `x1 <= x0`.
pub fn affine_run(x0: i32, x1: i32, y: i32, width: usize, height: usize, inv: &Affine) -> (i32, i32) {
    let a = &inv.0;
    let cy = y as f64 + 0.5;
    let mut run = (x0, x1);

    let z = a[2] * cy + a[4];
    if !clip_axis(&mut run, a[0], z, width as f64) {
        return (x0, x0);
    }
    let z = a[3] * cy + a[5];
    if !clip_axis(&mut run, a[1], z, height as f64) {
        return (x0, x0);
    }
    run
}

/// Intersect `run` with the columns where `x*coef + z` lies in `[0, limit)`.
/// Returns false when no column can qualify.
fn clip_axis(run: &mut (i32, i32), coef: f64, z: f64, limit: f64) -> bool {
    let (lo, hi) = if coef > AFFINE_EPSILON {
        (-z / coef, (limit - z) / coef)
    } else if coef < -AFFINE_EPSILON {
        ((limit - z) / coef, -z / coef)
    } else {
        // Constant along the row: either every column qualifies or none does.
        return z >= 0.0 && z < limit;
    };
    let lo = (lo + AFFINE_EPSILON - 0.5).ceil() as i32;
    let hi = (hi - AFFINE_EPSILON - 0.5).ceil() as i32;
    run.0 = run.0.max(lo);
    run.1 = run.1.min(hi);
    true
}

/// Source pixel under destination pixel `(x, y)`, if any.
pub fn inverse_pixel(inv: &Affine, x: i32, y: i32, width: usize, height: usize) -> Option<(usize, usize)> {
    let (fx, fy) = inv.apply(x as f64 + 0.5, y as f64 + 0.5);
    let (sx, sy) = (fx.floor(), fy.floor());
    if sx < 0.0 || sy < 0.0 {
        return None;
    }
    let (sx, sy) = (sx as usize, sy as usize);
    (sx < width && sy < height).then_some((sx, sy))
}

/// Dimensions and optional transparency mask of a cartesian source.
#[derive(Debug, Clone, Copy)]
pub struct SourceGrid<'a> {
    pub width: usize,
    pub height: usize,
    /// One bit per source pixel; a clear bit is transparent.
    pub mask: Option<&'a [u8]>,
}

impl<'a> SourceGrid<'a> {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            mask: None,
        }
    }

    pub fn with_mask(mut self, mask: Option<&'a [u8]>) -> Self {
        self.mask = mask;
        self
    }
}

/// Drive `sample` over every destination pixel whose centre maps inside the
/// source and whose mask bit is set. `sample` receives the source pixel index
/// and decides the color; `None` leaves the destination untouched.
pub fn resample<F>(grid: SourceGrid<'_>, inv: &Affine, dst: &mut Raster, mut sample: F)
where
    F: FnMut(usize) -> Option<Rgb>,
{
    let dw = dst.width() as i32;
    for y in 0..dst.height() {
        let (x0, x1) = affine_run(0, dw, y as i32, grid.width, grid.height, inv);
        if x1 <= x0 {
            continue;
        }
        let row = dst.row_mut(y);
        for x in x0..x1 {
            let Some((sx, sy)) = inverse_pixel(inv, x, y as i32, grid.width, grid.height) else {
                continue;
            };
            let pos = sy * grid.width + sx;
            if let Some(mask) = grid.mask {
                if !mask_bit(mask, pos) {
                    continue;
                }
            }
            if let Some(color) = sample(pos) {
                let i = x as usize * RASTER_BPP;
                color.write_to(&mut row[i..i + RASTER_BPP]);
            }
        }
    }
}

/// Resample a three band RGB source.
pub fn resample_rgb(src: &[u8], grid: SourceGrid<'_>, inv: &Affine, dst: &mut Raster, mapper: &ColorMapper) {
    resample(grid, inv, dst, |pos| {
        let i = pos * RASTER_BPP;
        src.get(i..i + RASTER_BPP)
            .map(|p| mapper.map_rgb(Rgb::from_slice(p)))
    });
}

/// Resample a paletted source, applying `remap` to each index first.
pub fn resample_indexed(
    src: &[u8],
    grid: SourceGrid<'_>,
    inv: &Affine,
    dst: &mut Raster,
    mapper: &ColorMapper,
    remap: Option<&[u8]>,
) {
    match remap {
        Some(remap) => resample(grid, inv, dst, |pos| {
            let idx = *src.get(pos)?;
            mapper.map_index(*remap.get(idx as usize)?)
        }),
        None => resample(grid, inv, dst, |pos| mapper.map_index(*src.get(pos)?)),
    }
}

/// Resample a source of coded data values through a value LUT.
pub fn resample_coded(
    src: &[u8],
    grid: SourceGrid<'_>,
    inv: &Affine,
    dst: &mut Raster,
    codec: &PixelCodec,
    mapper: &ColorMapper,
) {
    resample(grid, inv, dst, |pos| mapper.map_pixel(codec.decode(src, pos)?));
}

/// Values of a polar radar scan.
#[derive(Debug, Clone, Copy)]
pub enum PolarValues<'a> {
    /// Palette indices.
    Bytes(&'a [u8]),
    /// Physical values for a ranged LUT.
    Floats(&'a [f32]),
}

/// A range x bearing radar array, bearing-major.
#[derive(Debug, Clone, Copy)]
pub struct PolarGrid<'a> {
    /// Number of range bins along each ray.
    pub range_bins: usize,
    /// Number of rays in a full sweep.
    pub bearing_bins: usize,
    /// Source pixels per range bin.
    pub range_scale: f64,
    /// Degrees per bearing bin.
    pub bearing_scale: f64,
    pub values: PolarValues<'a>,
}

impl<'a> PolarGrid<'a> {
    /// Side of the square source image covering the full radar range.
    pub fn side(&self) -> usize {
        (2.0 * self.range_bins as f64 * self.range_scale).round() as usize
    }

    /// Index into `values` for a point in source pixel coordinates.
    ///
    /// Bearing is measured clockwise from north (up); points beyond the last
    /// range bin have none.
    pub fn bin_at(&self, sx: f64, sy: f64) -> Option<usize> {
        if self.range_bins == 0 || self.bearing_bins == 0 || self.range_scale <= 0.0 {
            return None;
        }
        let centre = self.range_bins as f64 * self.range_scale;
        let dx = sx - centre;
        let dy = sy - centre;
        let dist = (dx * dx + dy * dy).sqrt();
        let radius = (dist / self.range_scale + 0.5).floor() as usize;
        if radius >= self.range_bins {
            return None;
        }
        let mut bearing = dx.atan2(-dy).to_degrees();
        if bearing < 0.0 {
            bearing += 360.0;
        }
        let theta = (bearing / self.bearing_scale + 0.5).floor() as usize % self.bearing_bins;
        Some(theta * self.range_bins + radius)
    }

    /// Raw value at a source point.
    pub fn value_at(&self, sx: f64, sy: f64) -> Option<f64> {
        let idx = self.bin_at(sx, sy)?;
        match self.values {
            PolarValues::Bytes(v) => v.get(idx).map(|b| *b as f64),
            PolarValues::Floats(v) => v.get(idx).map(|f| *f as f64).filter(|f| !f.is_nan()),
        }
    }
}

/// Resample a polar radar scan.
pub fn resample_polar(polar: &PolarGrid<'_>, inv: &Affine, dst: &mut Raster, mapper: &ColorMapper) {
    let side = polar.side();
    let dw = dst.width() as i32;
    for y in 0..dst.height() {
        let (x0, x1) = affine_run(0, dw, y as i32, side, side, inv);
        if x1 <= x0 {
            continue;
        }
        let row = dst.row_mut(y);
        let cy = y as f64 + 0.5;
        for x in x0..x1 {
            let (fx, fy) = inv.apply(x as f64 + 0.5, cy);
            let Some(idx) = polar.bin_at(fx, fy) else {
                continue;
            };
            let color = match polar.values {
                PolarValues::Bytes(v) => v.get(idx).and_then(|b| mapper.map_index(*b)),
                PolarValues::Floats(v) => v.get(idx).and_then(|f| mapper.map_pixel(*f as f64)),
            };
            if let Some(color) = color {
                let i = x as usize * RASTER_BPP;
                color.write_to(&mut row[i..i + RASTER_BPP]);
            }
        }
    }
}
