//! Overlays drawn onto a rendered raster, such as radar range rings.

use crate::raster::Raster;
use imagery_common::Rgb;
use serde::{Deserialize, Serialize};

/// Closest intermediate rings may be, in source pixels.
const MIN_RING_SPACING: f64 = 1.0;

/// Range ring settings for radar images.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangeRings {
    /// Color of the ring at the maximum range.
    pub limit_color: Rgb,
    /// Color of the intermediate rings.
    pub ring_color: Rgb,
    /// Spacing of intermediate rings in source pixels; 0 draws only the limit.
    /// Positive values below one pixel are treated as one pixel.
    pub spacing: f64,
}

impl Default for RangeRings {
    fn default() -> Self {
        Self {
            limit_color: Rgb::new(255, 255, 255),
            ring_color: Rgb::new(160, 160, 160),
            spacing: 0.0,
        }
    }
}

impl RangeRings {
    /// Draw rings centred at raster pixel `(xc, yc)` for a coverage of
    /// `radius` source pixels scaled by `(sx, sy)`.
    pub fn draw(&self, raster: &mut Raster, xc: i32, yc: i32, radius: f64, sx: f64, sy: f64) {
        draw_ellipse(
            raster,
            xc,
            yc,
            (radius * sx).floor() as i32,
            (radius * sy).floor() as i32,
            self.limit_color,
        );
        if self.spacing > 0.0 {
            let spacing = self.spacing.max(MIN_RING_SPACING);
            let mut r = spacing;
            while r < radius {
                draw_ellipse(
                    raster,
                    xc,
                    yc,
                    (r * sx).floor() as i32,
                    (r * sy).floor() as i32,
                    self.ring_color,
                );
                r += spacing;
            }
        }
    }
}

fn plot(raster: &mut Raster, x: i64, y: i64, color: Rgb) {
    if x >= 0 && y >= 0 && (x as usize) < raster.width() && (y as usize) < raster.height() {
        raster.set_pixel(x as usize, y as usize, color);
    }
}

fn plot4(raster: &mut Raster, xc: i64, yc: i64, x: i64, y: i64, color: Rgb) {
    plot(raster, xc + x, yc + y, color);
    plot(raster, xc - x, yc + y, color);
    plot(raster, xc + x, yc - y, color);
    plot(raster, xc - x, yc - y, color);
}

/// Midpoint ellipse outline, clipped to the raster.
pub fn draw_ellipse(raster: &mut Raster, xc: i32, yc: i32, rx: i32, ry: i32, color: Rgb) {
    if rx <= 0 || ry <= 0 {
        return;
    }
    let (xc, yc) = (xc as i64, yc as i64);
    let (a2, b2) = ((rx as i64).pow(2), (ry as i64).pow(2));
    let (two_a2, two_b2) = (2 * a2, 2 * b2);

    let mut x: i64 = 0;
    let mut y: i64 = ry as i64;
    let mut dx: i64 = 0;
    let mut dy: i64 = two_a2 * y;
    let mut d: i64 = b2 - a2 * y + a2 / 4;

    // Region 1: slope above -1
    while dx < dy {
        plot4(raster, xc, yc, x, y, color);
        if d > 0 {
            y -= 1;
            dy -= two_a2;
            d -= dy;
        }
        x += 1;
        dx += two_b2;
        d += b2 + dx;
    }

    // Region 2
    d += (3 * (a2 - b2) / 2 - (dx + dy)) / 2;
    while y >= 0 {
        plot4(raster, xc, yc, x, y, color);
        if d < 0 {
            x += 1;
            dx += two_b2;
            d += dx;
        }
        y -= 1;
        dy -= two_a2;
        d += a2 - dy;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imagery_common::Rect;

    #[test]
    fn test_circle_extremes() {
        let mut r = Raster::transparent(Rect::new(0, 0, 21, 21), 1000).unwrap();
        draw_ellipse(&mut r, 10, 10, 8, 8, Rgb::WHITE);
        assert_eq!(r.pixel(10, 2), Rgb::WHITE);
        assert_eq!(r.pixel(10, 18), Rgb::WHITE);
        assert_eq!(r.pixel(2, 10), Rgb::WHITE);
        assert_eq!(r.pixel(18, 10), Rgb::WHITE);
        assert_eq!(r.pixel(10, 10), Rgb::TRANSPARENT);
    }

    #[test]
    fn test_clipped_ellipse_does_not_panic() {
        let mut r = Raster::transparent(Rect::new(0, 0, 5, 5), 100).unwrap();
        draw_ellipse(&mut r, 0, 0, 40, 10, Rgb::WHITE);
        draw_ellipse(&mut r, 2, 2, 0, 3, Rgb::WHITE);
        assert_eq!(r.opaque_count(), 0);

        draw_ellipse(&mut r, 0, 0, 3, 3, Rgb::WHITE);
        assert_eq!(r.pixel(3, 0), Rgb::WHITE);
        assert_eq!(r.pixel(0, 3), Rgb::WHITE);
    }

    #[test]
    fn test_rings_with_spacing() {
        let mut r = Raster::transparent(Rect::new(0, 0, 41, 41), 10_000).unwrap();
        let rings = RangeRings {
            spacing: 5.0,
            ..Default::default()
        };
        rings.draw(&mut r, 20, 20, 20.0, 1.0, 1.0);
        assert_eq!(r.pixel(20, 0), rings.limit_color);
        assert_eq!(r.pixel(20, 15), rings.ring_color);
    }

    #[test]
    fn test_tiny_spacing_is_clamped() {
        let mut r = Raster::transparent(Rect::new(0, 0, 41, 41), 10_000).unwrap();
        let rings = RangeRings {
            spacing: 1e-9,
            ..Default::default()
        };
        rings.draw(&mut r, 20, 20, 20.0, 1.0, 1.0);
        assert_eq!(r.pixel(20, 0), rings.limit_color);
        assert_eq!(r.pixel(20, 19), rings.ring_color);
        assert_eq!(r.pixel(20, 10), rings.ring_color);
    }
}
