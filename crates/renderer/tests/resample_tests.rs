//! Tests for affine resampling.
//!
//! Tests the resampler against scaled, shifted and rotated transforms,
//! including masks, coded values and polar radar sources.

use imagery_common::{Affine, ColorBand, IndexedLut, Lut, RangedLut, Rect, Rgb};
use renderer::resample::{
    affine_run, resample_coded, resample_indexed, resample_polar, resample_rgb, PolarGrid,
    PolarValues, SourceGrid,
};
use renderer::{ByteOrder, ColorMapper, PixelCodec, Raster, ValueKind};

// ============================================================================
// Helper functions
// ============================================================================

fn palette_mapper() -> ColorMapper {
    let colors: Vec<Rgb> = (0..16).map(|i| Rgb::new(i * 16, 255 - i * 16, 50)).collect();
    ColorMapper::new(&Lut::Indexed(IndexedLut::new(&colors).unwrap()), 1.0, false)
}

/// A width x height source where pixel (x, y) holds index `(x + y) % 16`.
fn diagonal_source(width: usize, height: usize) -> Vec<u8> {
    (0..height)
        .flat_map(|y| (0..width).map(move |x| ((x + y) % 16) as u8))
        .collect()
}

fn raster(w: u32, h: u32) -> Raster {
    Raster::transparent(Rect::new(0, 0, w, h), usize::MAX).unwrap()
}

// ============================================================================
// Cartesian sources
// ============================================================================

#[test]
fn test_identity_copies_every_pixel() {
    let src = diagonal_source(10, 10);
    let mapper = palette_mapper();
    let mut dst = raster(10, 10);
    resample_indexed(&src, SourceGrid::new(10, 10), &Affine::IDENTITY, &mut dst, &mapper, None);
    for y in 0..10 {
        for x in 0..10 {
            assert_eq!(Some(dst.pixel(x, y)), mapper.map_index(((x + y) % 16) as u8));
        }
    }
}

#[test]
fn test_upscale_by_two() {
    let src = diagonal_source(4, 4);
    let mapper = palette_mapper();
    let forward = Affine::scale_rotate_translate(2.0, 2.0, 0.0, 0.0, 0.0);
    let inv = forward.invert().unwrap();
    let mut dst = raster(8, 8);
    resample_indexed(&src, SourceGrid::new(4, 4), &inv, &mut dst, &mapper, None);
    assert_eq!(dst.opaque_count(), 64);
    assert_eq!(dst.pixel(7, 7), dst.pixel(6, 6));
    assert_eq!(Some(dst.pixel(3, 0)), mapper.map_index(1));
}

#[test]
fn test_pixels_outside_source_stay_transparent() {
    let src = diagonal_source(4, 4);
    let inv = Affine::scale_rotate_translate(1.0, 1.0, 0.0, 3.0, 2.0).invert().unwrap();
    let mut dst = raster(10, 10);
    resample_indexed(&src, SourceGrid::new(4, 4), &inv, &mut dst, &palette_mapper(), None);
    assert_eq!(dst.opaque_count(), 16);
    assert_eq!(dst.pixel(2, 2), Rgb::TRANSPARENT);
    assert!(dst.pixel(3, 2).is_opaque());
    assert!(dst.pixel(6, 5).is_opaque());
    assert_eq!(dst.pixel(7, 5), Rgb::TRANSPARENT);
}

#[test]
fn test_rotation_by_ninety_transposes() {
    // A 3x5 source turned by 90 degrees: source (x, y) lands at (y, 2 - x)
    let src = diagonal_source(3, 5);
    let forward = Affine::scale_rotate_translate(1.0, 1.0, 90.0, 0.0, 3.0);
    let inv = forward.invert().unwrap();
    let mapper = palette_mapper();
    let mut dst = raster(5, 3);
    resample_indexed(&src, SourceGrid::new(3, 5), &inv, &mut dst, &mapper, None);
    assert_eq!(dst.opaque_count(), 15);
    for sy in 0..5 {
        for sx in 0..3 {
            let expected = mapper.map_index(((sx + sy) % 16) as u8);
            assert_eq!(Some(dst.pixel(sy, 2 - sx)), expected);
        }
    }
}

#[test]
fn test_run_matches_brute_force_under_rotation() {
    for angle in [15.0, 45.0, 100.0, -30.0, -135.0, 180.0] {
        let forward = Affine::scale_rotate_translate(1.3, 0.7, angle, 40.0, 40.0);
        let inv = forward.invert().unwrap();
        for y in 0..80 {
            let (x0, x1) = affine_run(0, 80, y, 30, 20, &inv);
            for x in 0..80 {
                let (sx, sy) = inv.apply(x as f64 + 0.5, y as f64 + 0.5);
                let inside = sx >= 0.0 && sx < 30.0 && sy >= 0.0 && sy < 20.0;
                let in_run = x >= x0 && x < x1;
                // Only pixels right on an edge may disagree
                if inside != in_run {
                    let edge = sx.abs().min((sx - 30.0).abs()).min(sy.abs()).min((sy - 20.0).abs());
                    assert!(edge < 1e-3, "angle {} pixel ({}, {})", angle, x, y);
                }
            }
        }
    }
}

#[test]
fn test_mask_hides_pixels() {
    let src = vec![255u8, 0, 0, 0, 255, 0, 0, 0, 255, 9, 9, 9];
    // Only pixels 0 and 3 are visible
    let mask = [0b0000_1001u8];
    let mut dst = raster(2, 2);
    resample_rgb(
        &src,
        SourceGrid::new(2, 2).with_mask(Some(&mask)),
        &Affine::IDENTITY,
        &mut dst,
        &ColorMapper::direct(1.0, false),
    );
    assert_eq!(dst.pixel(0, 0), Rgb::new(255, 0, 0));
    assert_eq!(dst.pixel(1, 0), Rgb::TRANSPARENT);
    assert_eq!(dst.pixel(0, 1), Rgb::TRANSPARENT);
    assert_eq!(dst.pixel(1, 1), Rgb::new(9, 9, 9));
}

#[test]
fn test_rgb_brightness() {
    let src = vec![100u8, 100, 100];
    let mut dst = raster(1, 1);
    resample_rgb(
        &src,
        SourceGrid::new(1, 1),
        &Affine::IDENTITY,
        &mut dst,
        &ColorMapper::direct(0.5, false),
    );
    assert_eq!(dst.pixel(0, 0), Rgb::new(50, 50, 50));
}

#[test]
fn test_coded_values_through_ranged_lut() {
    let codec = PixelCodec::new(2, ByteOrder::Big, ValueKind::Unsigned)
        .unwrap()
        .with_linear(0.1, 0.0);
    // Values 5.0, 15.0, 25.0, 100.0
    let src: Vec<u8> = [50u16, 150, 250, 1000].iter().flat_map(|v| v.to_be_bytes()).collect();
    let lut = Lut::Ranged(
        RangedLut::new(vec![
            ColorBand::new(0.0, 10.0, Rgb::new(0, 0, 255)),
            ColorBand::new(10.0, 20.0, Rgb::new(0, 255, 0)),
            ColorBand::new(20.0, 30.0, Rgb::new(255, 0, 0)),
        ])
        .unwrap(),
    );
    let mapper = ColorMapper::new(&lut, 1.0, false);
    let mut dst = raster(2, 2);
    resample_coded(&src, SourceGrid::new(2, 2), &Affine::IDENTITY, &mut dst, &codec, &mapper);
    assert_eq!(dst.pixel(0, 0), Rgb::new(0, 0, 255));
    assert_eq!(dst.pixel(1, 0), Rgb::new(0, 255, 0));
    assert_eq!(dst.pixel(0, 1), Rgb::new(255, 0, 0));
    assert_eq!(dst.pixel(1, 1), Rgb::TRANSPARENT);
}

// ============================================================================
// Polar radar
// ============================================================================

#[test]
fn test_polar_scan_fills_disc_only() {
    // 8 range bins of 2 px, 36 rays: every bin holds palette index 3
    let values = vec![3u8; 36 * 8];
    let polar = PolarGrid {
        range_bins: 8,
        bearing_bins: 36,
        range_scale: 2.0,
        bearing_scale: 10.0,
        values: PolarValues::Bytes(&values),
    };
    let mapper = palette_mapper();
    let mut dst = raster(32, 32);
    resample_polar(&polar, &Affine::IDENTITY, &mut dst, &mapper);
    assert_eq!(Some(dst.pixel(16, 16)), mapper.map_index(3));
    assert_eq!(dst.pixel(0, 0), Rgb::TRANSPARENT);
    assert_eq!(dst.pixel(31, 31), Rgb::TRANSPARENT);
    assert!(dst.opaque_count() > 600 && dst.opaque_count() < 32 * 32);
}

#[test]
fn test_polar_float_values() {
    let values = vec![42.0f32; 4 * 5];
    let polar = PolarGrid {
        range_bins: 5,
        bearing_bins: 4,
        range_scale: 1.0,
        bearing_scale: 90.0,
        values: PolarValues::Floats(&values),
    };
    let lut = Lut::Ranged(RangedLut::new(vec![ColorBand::new(40.0, 50.0, Rgb::WHITE)]).unwrap());
    let mut dst = raster(10, 10);
    resample_polar(&polar, &Affine::IDENTITY, &mut dst, &ColorMapper::new(&lut, 1.0, false));
    assert_eq!(dst.pixel(5, 5), Rgb::WHITE);
}
