//! Tests for raster compositing.
//!
//! Checks the layering rules used when synthetic images are assembled:
//! transparency preservation, blend bounds and overlap handling.

use imagery_common::{Rect, Rgb};
use rand::Rng;
use renderer::composite::{blend, combine, copy, Compositor};
use renderer::Raster;

// ============================================================================
// Helper functions
// ============================================================================

/// Random raster where roughly a third of the pixels are transparent.
fn random_raster(rect: Rect) -> Raster {
    let mut rng = rand::thread_rng();
    let mut r = Raster::transparent(rect, usize::MAX).unwrap();
    for y in 0..r.height() {
        for x in 0..r.width() {
            if rng.gen_range(0..3) > 0 {
                let c = Rgb::new(rng.gen(), rng.gen(), rng.gen()).opaque_or_black();
                r.set_pixel(x, y, c);
            }
        }
    }
    r
}

fn transparent(rect: Rect) -> Raster {
    Raster::transparent(rect, usize::MAX).unwrap()
}

// ============================================================================
// Combine
// ============================================================================

#[test]
fn test_combine_onto_transparent_reproduces_source() {
    let rect = Rect::new(3, 7, 40, 30);
    let src = random_raster(rect);
    let mut dst = transparent(rect);
    combine(&mut dst, &src);
    assert_eq!(dst, src);
}

#[test]
fn test_combine_keeps_destination_under_transparent_source() {
    let rect = Rect::new(0, 0, 20, 20);
    let src = random_raster(rect);
    let original = random_raster(rect);
    let mut dst = original.clone();
    combine(&mut dst, &src);
    for y in 0..20 {
        for x in 0..20 {
            let s = src.pixel(x, y);
            let expected = if s.is_opaque() { s } else { original.pixel(x, y) };
            assert_eq!(dst.pixel(x, y), expected);
        }
    }
}

#[test]
fn test_combine_with_partial_overlap() {
    let mut dst = transparent(Rect::new(0, 0, 10, 10));
    let mut src = transparent(Rect::new(-5, 8, 10, 10));
    for y in 0..10 {
        for x in 0..10 {
            src.set_pixel(x, y, Rgb::WHITE);
        }
    }
    combine(&mut dst, &src);
    // Overlap is window x 0..5, y 8..10
    assert_eq!(dst.opaque_count(), 5 * 2);
    assert_eq!(dst.window_pixel(4, 9), Some(Rgb::WHITE));
    assert_eq!(dst.window_pixel(5, 9), Some(Rgb::TRANSPARENT));
}

// ============================================================================
// Blend
// ============================================================================

#[test]
fn test_blend_ratio_bounds() {
    let rect = Rect::new(0, 0, 32, 32);
    let src = random_raster(rect);
    let base = random_raster(rect);

    let mut zero = base.clone();
    blend(&mut zero, &src, 0);
    let mut full = base.clone();
    blend(&mut full, &src, 100);

    for y in 0..32 {
        for x in 0..32 {
            let (s, d) = (src.pixel(x, y), base.pixel(x, y));
            if s.is_opaque() && d.is_opaque() {
                assert_eq!(zero.pixel(x, y), d);
                let f = full.pixel(x, y);
                assert!((f.r as i32 - s.r as i32).abs() <= 1);
                assert!((f.g as i32 - s.g as i32).abs() <= 1);
                assert!((f.b as i32 - s.b as i32).abs() <= 1);
            } else if s.is_opaque() {
                assert_eq!(zero.pixel(x, y), s);
            } else {
                assert_eq!(zero.pixel(x, y), d);
            }
        }
    }
}

#[test]
fn test_blend_never_produces_sentinel() {
    // 0 + (2 - 0) * 128 / 256 = 1 on red, zero elsewhere
    let rect = Rect::new(0, 0, 1, 1);
    let mut dst = transparent(rect);
    dst.set_pixel(0, 0, Rgb::new(0, 0, 0));
    let mut src = transparent(rect);
    src.set_pixel(0, 0, Rgb::new(2, 0, 0));
    blend(&mut dst, &src, 50);
    assert!(dst.pixel(0, 0).is_opaque());
}

// ============================================================================
// Copy and dispatch
// ============================================================================

#[test]
fn test_copy_overwrites_with_transparency() {
    let rect = Rect::new(0, 0, 4, 4);
    let mut dst = random_raster(rect);
    let src = transparent(rect);
    copy(&mut dst, &src);
    assert_eq!(dst.opaque_count(), 0);
}

#[test]
fn test_compositor_layering_order() {
    let rect = Rect::new(0, 0, 1, 1);
    let mut back = transparent(rect);
    back.set_pixel(0, 0, Rgb::new(10, 10, 10));
    let mut front = transparent(rect);
    front.set_pixel(0, 0, Rgb::new(200, 200, 200));

    let mut dst = transparent(rect);
    Compositor::Copy.apply(&mut dst, &back);
    Compositor::Combine.apply(&mut dst, &front);
    assert_eq!(dst.pixel(0, 0), Rgb::new(200, 200, 200));

    let mut dst = transparent(rect);
    Compositor::Copy.apply(&mut dst, &back);
    Compositor::Blend(50).apply(&mut dst, &front);
    assert_eq!(dst.pixel(0, 0), Rgb::new(105, 105, 105));
}
