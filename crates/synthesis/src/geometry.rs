//! Geometry resolution: where a node lands in the window and the transform
//! that takes its source pixels there.

use crate::node::{Placement, ResolvedGeometry};
use imagery_common::geometry::{cos_deg, sin_deg};
use imagery_common::{Affine, ClipRect, Rect, Viewport};

/// Angles below this are drawn unrotated.
const MIN_ROTATION: f64 = 0.001;

/// Outcome of resolving one node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolution {
    pub geometry: ResolvedGeometry,
    /// Destination collapsed below 3 pixels or fell outside the clip.
    pub degenerate: bool,
}

/// Resolve the destination rectangle and forward transform of a source of
/// `source_width` x `source_height` pixels placed by `placement`.
///
/// `keep_aspect` preserves the source aspect ratio by shrinking one side of
/// the placement extent.
pub fn resolve(
    placement: &Placement,
    source_width: usize,
    source_height: usize,
    keep_aspect: bool,
    viewport: &Viewport,
    clip: &ClipRect,
) -> Resolution {
    let mut iw = viewport.pixel_width(placement.width);
    let mut ih = viewport.pixel_height(placement.height);
    if source_width == 0 || source_height == 0 || iw <= 0 || ih <= 0 {
        return collapsed();
    }

    if keep_aspect && !placement.adjust_aspect {
        let r0 = source_width as f64 / source_height as f64;
        let r1 = iw as f64 / ih as f64;
        if r1 > r0 {
            iw = (ih as f64 * r0 + 0.5) as i32;
        } else if r1 < r0 {
            ih = (iw as f64 / r0 + 0.5) as i32;
        }
    }
    let sx = iw as f64 / source_width as f64;
    let sy = ih as f64 / source_height as f64;

    let ix = viewport.window_x(placement.x);
    let iy = viewport.window_y(placement.y) - ih + 1;
    let (vl, vr, vt, vb) = clip.window_limits(viewport.window_width, viewport.window_height);
    let ra = placement.rotation;

    let (mut dx, mut dy, mut dw, mut dh) = (ix, iy, iw, ih);
    let (tx, ty);
    if ra.abs() < MIN_ROTATION || vr - vl < 2 || vb - vt < 2 {
        tx = (dx - vl).min(0);
        ty = (dy - vt).min(0);
    } else {
        let sinra = sin_deg(ra);
        let cosra = cos_deg(ra);
        let (fw, fh) = (iw as f64, ih as f64);

        // Offset of the rotated origin from the unrotated one
        let x = viewport.window_x(placement.rotation_x) - ix;
        let y = viewport.window_y(placement.rotation_y) - iy;
        let xp = y as f64 * sinra + x as f64 * cosra;
        let yp = y as f64 * cosra - x as f64 * sinra;
        let tx0 = x - xp.round() as i32;
        let ty0 = y - yp.round() as i32;

        dw = (fh * sinra.abs() + fw * cosra.abs() + 0.5) as i32;
        dh = (fh * cosra.abs() + fw * sinra.abs() + 0.5) as i32;

        if ra > 0.0 && ra <= 90.0 {
            let lift = (fw * sinra + 0.5) as i32;
            dx = ix + tx0;
            dy = iy - lift + ty0;
            tx = (dx - vl).min(0);
            ty = (dy - vt).min(0) + lift;
        } else if ra > 90.0 {
            let shift = (fw * cosra - 0.5) as i32;
            dx = ix + shift + tx0;
            dy = iy + (fh * cosra - fw * sinra - 0.5) as i32 + ty0;
            tx = (dx - vl).min(0) - shift;
            ty = (dy - vt).min(0) + dh;
        } else if ra >= -90.0 {
            let shift = (fh * sinra - 0.5) as i32;
            dx = ix + shift + tx0;
            dy = iy + ty0;
            tx = (dx - vl).min(0) - shift;
            ty = (dy - vt).min(0);
        } else {
            let lift = (fh * cosra - 0.5) as i32;
            dx = ix + (fh * sinra + fw * cosra - 0.5) as i32 + tx0;
            dy = iy + lift + ty0;
            tx = (dx - vl).min(0) + dw;
            ty = (dy - vt).min(0) - lift;
        }
    }

    // Clip to the visible window
    dw = ((dx + dw).min(vr + 1) - dx.max(vl)).max(0);
    dh = ((dy + dh).min(vb + 1) - dy.max(vt)).max(0);
    dx = dx.max(vl);
    dy = dy.max(vt);

    let dest = Rect::new(dx, dy, dw as u32, dh as u32);
    Resolution {
        geometry: ResolvedGeometry {
            dest,
            affine: Affine::scale_rotate_translate(sx, sy, ra, tx as f64, ty as f64),
            scale_x: sx,
            scale_y: sy,
        },
        degenerate: dest.is_degenerate(),
    }
}

fn collapsed() -> Resolution {
    Resolution {
        geometry: ResolvedGeometry {
            dest: Rect::default(),
            affine: Affine::IDENTITY,
            scale_x: 0.0,
            scale_y: 0.0,
        },
        degenerate: true,
    }
}

/// Placement of a synthetic node when none was assigned: the whole map.
pub fn full_map(viewport: &Viewport) -> Placement {
    Placement::new(0.0, 0.0, viewport.map_width, viewport.map_height).with_adjust_aspect(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window() -> (Viewport, ClipRect) {
        let vp = Viewport::identity(100, 100);
        (vp, vp.full_clip())
    }

    #[test]
    fn test_full_window_image_maps_identically() {
        let (vp, clip) = window();
        let r = resolve(&Placement::new(0.0, 0.0, 100.0, 100.0), 100, 100, true, &vp, &clip);
        assert!(!r.degenerate);
        assert_eq!(r.geometry.dest, Rect::new(0, 0, 100, 100));
        assert_eq!(r.geometry.affine, Affine::IDENTITY);
    }

    #[test]
    fn test_half_scale_placement() {
        let (vp, clip) = window();
        // 200x100 source on a 50x25 map extent at library (10, 20)
        let r = resolve(&Placement::new(10.0, 20.0, 50.0, 25.0), 200, 100, true, &vp, &clip);
        assert_eq!(r.geometry.dest, Rect::new(10, 55, 50, 25));
        assert_eq!(r.geometry.dest.library_y(100), 20);
        assert_eq!(r.geometry.scale_x, 0.25);
        assert_eq!(r.geometry.affine.apply(4.0, 4.0), (1.0, 1.0));
    }

    #[test]
    fn test_aspect_ratio_is_kept_unless_adjusted() {
        let (vp, clip) = window();
        let p = Placement::new(0.0, 0.0, 80.0, 40.0);
        let kept = resolve(&p, 100, 100, true, &vp, &clip);
        assert_eq!((kept.geometry.dest.width, kept.geometry.dest.height), (40, 40));

        let stretched = resolve(&p.with_adjust_aspect(true), 100, 100, true, &vp, &clip);
        assert_eq!((stretched.geometry.dest.width, stretched.geometry.dest.height), (80, 40));

        let synthetic = resolve(&p, 100, 100, false, &vp, &clip);
        assert_eq!(synthetic.geometry.dest.width, 80);
    }

    #[test]
    fn test_partially_clipped_image_shifts_transform() {
        let (vp, clip) = window();
        let r = resolve(&Placement::new(-20.0, 0.0, 50.0, 50.0), 50, 50, true, &vp, &clip);
        assert_eq!(r.geometry.dest, Rect::new(0, 50, 30, 50));
        // Destination column 0 shows source column 20
        assert_eq!(r.geometry.affine.apply(20.0, 0.0), (0.0, 0.0));
    }

    #[test]
    fn test_outside_clip_is_degenerate() {
        let (vp, _) = window();
        let clip = ClipRect::new(0, 0, 40, 40);
        let r = resolve(&Placement::new(60.0, 60.0, 30.0, 30.0), 30, 30, true, &vp, &clip);
        assert!(r.degenerate);
    }

    #[test]
    fn test_tiny_image_is_degenerate() {
        let (vp, clip) = window();
        let r = resolve(&Placement::new(5.0, 5.0, 2.0, 2.0), 10, 10, true, &vp, &clip);
        assert!(r.degenerate);
        assert!(resolve(&Placement::new(5.0, 5.0, 20.0, 20.0), 0, 10, true, &vp, &clip).degenerate);
    }

    #[test]
    fn test_rotated_destination_stays_inside_clip() {
        let vp = Viewport::identity(200, 150);
        let clip = ClipRect::new(10, 5, 180, 140);
        let (vl, vr, vt, vb) = clip.window_limits(200, 150);
        for angle in [0.0, 45.0, -45.0, 90.0, -90.0, 135.0, -135.0, 180.0, 30.0, -170.0] {
            for (x, y) in [(0.0, 0.0), (60.0, 40.0), (150.0, 120.0), (-30.0, 100.0)] {
                let p = Placement::new(x, y, 70.0, 50.0).with_rotation(angle, x + 10.0, y + 5.0);
                let r = resolve(&p, 140, 100, true, &vp, &clip);
                if r.degenerate {
                    continue;
                }
                let d = r.geometry.dest;
                assert!(d.x >= vl && d.right() <= vr + 1, "angle {} x {:?}", angle, d);
                assert!(d.y >= vt && d.bottom() <= vb + 1, "angle {} y {:?}", angle, d);
            }
        }
    }

    #[test]
    fn test_quarter_turn_swaps_extent() {
        let (vp, clip) = window();
        let p = Placement::new(40.0, 40.0, 30.0, 10.0).with_rotation(90.0, 40.0, 40.0);
        let r = resolve(&p, 30, 10, true, &vp, &clip);
        assert_eq!((r.geometry.dest.width, r.geometry.dest.height), (10, 30));
        // Every source corner lands inside the destination raster
        let (w, h) = (r.geometry.dest.width as f64, r.geometry.dest.height as f64);
        for (sx, sy) in [(0.5, 0.5), (29.5, 0.5), (0.5, 9.5), (29.5, 9.5)] {
            let (x, y) = r.geometry.affine.apply(sx, sy);
            assert!(x >= 0.0 && x <= w && y >= 0.0 && y <= h, "({}, {}) -> ({}, {})", sx, sy, x, y);
        }
    }

    #[test]
    fn test_full_map_placement() {
        let vp = Viewport::fit(1000.0, 500.0, 200, 100);
        let r = resolve(&full_map(&vp), 200, 100, false, &vp, &vp.full_clip());
        assert_eq!(r.geometry.dest, Rect::new(0, 0, 200, 100));
    }
}
