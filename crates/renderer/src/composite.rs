//! Copy, combine and blend of positioned rasters.
//!
//! Source and destination may cover different window rectangles; only their
//! overlap is touched.

use crate::raster::Raster;
use imagery_common::{Rgb, RASTER_BPP};

/// How a source raster is merged into a destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compositor {
    /// Overwrite the overlap, transparent pixels included.
    Copy,
    /// Overwrite with opaque source pixels only.
    Combine,
    /// Interpolate opaque pixels by a percentage towards the source.
    Blend(u8),
}

impl Compositor {
    pub fn apply(self, dst: &mut Raster, src: &Raster) {
        match self {
            Compositor::Copy => copy(dst, src),
            Compositor::Combine => combine(dst, src),
            Compositor::Blend(percent) => blend(dst, src, percent),
        }
    }
}

/// Overlapping region expressed in both rasters' local coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Overlap {
    dst_x: usize,
    dst_y: usize,
    src_x: usize,
    src_y: usize,
    width: usize,
    height: usize,
}

fn overlap(dst: &Raster, src: &Raster) -> Option<Overlap> {
    let region = dst.rect().intersect(&src.rect())?;
    Some(Overlap {
        dst_x: (region.x - dst.rect().x) as usize,
        dst_y: (region.y - dst.rect().y) as usize,
        src_x: (region.x - src.rect().x) as usize,
        src_y: (region.y - src.rect().y) as usize,
        width: region.width as usize,
        height: region.height as usize,
    })
}

/// Visit each overlapping row pair as `(dst_row, src_row)` byte slices.
fn for_each_row(dst: &mut Raster, src: &Raster, mut f: impl FnMut(&mut [u8], &[u8])) {
    let Some(o) = overlap(dst, src) else {
        return;
    };
    let len = o.width * RASTER_BPP;
    for row in 0..o.height {
        let s = &src.row(o.src_y + row)[o.src_x * RASTER_BPP..][..len];
        let d = &mut dst.row_mut(o.dst_y + row)[o.dst_x * RASTER_BPP..][..len];
        f(d, s);
    }
}

pub fn copy(dst: &mut Raster, src: &Raster) {
    for_each_row(dst, src, |d, s| d.copy_from_slice(s));
}

pub fn combine(dst: &mut Raster, src: &Raster) {
    for_each_row(dst, src, |d, s| {
        for (dp, sp) in d.chunks_exact_mut(RASTER_BPP).zip(s.chunks_exact(RASTER_BPP)) {
            if Rgb::from_slice(sp).is_opaque() {
                dp.copy_from_slice(sp);
            }
        }
    });
}

/// Blend `src` over `dst` by `percent` (0 keeps the destination, 100 takes
/// the source). Where only the source is opaque it is copied.
pub fn blend(dst: &mut Raster, src: &Raster, percent: u8) {
    let ratio = percent.min(100) as i32 * 256 / 100;
    for_each_row(dst, src, |d, s| {
        for (dp, sp) in d.chunks_exact_mut(RASTER_BPP).zip(s.chunks_exact(RASTER_BPP)) {
            let sc = Rgb::from_slice(sp);
            if sc.is_transparent() {
                continue;
            }
            let dc = Rgb::from_slice(dp);
            if dc.is_transparent() {
                dp.copy_from_slice(sp);
                continue;
            }
            let mix = |dv: u8, sv: u8| (dv as i32 + (sv as i32 - dv as i32) * ratio / 256) as u8;
            Rgb::new(mix(dc.r, sc.r), mix(dc.g, sc.g), mix(dc.b, sc.b))
                .opaque_or_black()
                .write_to(dp);
        }
    });
}
