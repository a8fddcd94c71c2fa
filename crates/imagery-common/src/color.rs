//! RGB pixel type and the transparent sentinel.

use serde::{Deserialize, Serialize};

/// Bytes per pixel of every internal raster (packed RGB).
pub const RASTER_BPP: usize = 3;

/// Tolerance below which a brightness factor counts as exactly 1.
const UNIT_BRIGHTNESS_EPSILON: f64 = 1e-6;

/// An opaque or transparent RGB color.
///
/// Rasters carry no alpha channel. A pixel is transparent iff it equals
/// [`Rgb::TRANSPARENT`]; every other value is opaque.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    /// The reserved transparent sentinel.
    pub const TRANSPARENT: Rgb = Rgb::new(1, 0, 0);
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Read a pixel from the first three bytes of a slice.
    #[inline(always)]
    pub fn from_slice(p: &[u8]) -> Self {
        Self::new(p[0], p[1], p[2])
    }

    #[inline(always)]
    pub fn write_to(self, p: &mut [u8]) {
        p[0] = self.r;
        p[1] = self.g;
        p[2] = self.b;
    }

    #[inline(always)]
    pub fn to_bytes(self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }

    #[inline(always)]
    pub fn is_transparent(self) -> bool {
        self == Self::TRANSPARENT
    }

    #[inline(always)]
    pub fn is_opaque(self) -> bool {
        !self.is_transparent()
    }

    /// Replace an opaque color that happens to equal the sentinel.
    ///
    /// Arithmetic on opaque colors (brightness, blending, greyscale) can land
    /// on the sentinel value; those results are shifted to black.
    #[inline(always)]
    pub fn opaque_or_black(self) -> Self {
        if self.is_transparent() {
            Self::BLACK
        } else {
            self
        }
    }

    /// Scale each channel by a brightness factor.
    ///
    /// The sentinel is never scaled and no scaled color is allowed to become
    /// the sentinel.
    pub fn scaled(self, factor: f64) -> Self {
        if self.is_transparent() || (factor - 1.0).abs() < UNIT_BRIGHTNESS_EPSILON {
            return self;
        }
        let scale = |v: u8| -> u8 {
            let s = (v as f64 * factor).clamp(0.0, 255.0);
            (s + 0.5) as u8
        };
        Self::new(scale(self.r), scale(self.g), scale(self.b)).opaque_or_black()
    }

    /// Convert to grey using CCIR 601 luma weights.
    pub fn greyscale(self) -> Self {
        if self.is_transparent() {
            return self;
        }
        let luma = (self.r as u32 * 6969 + self.g as u32 * 23434 + self.b as u32 * 2365) / 32768;
        let v = luma.min(255) as u8;
        Self::new(v, v, v)
    }

    /// Parse `#rrggbb` or `rrggbb`.
    pub fn from_hex(s: &str) -> Option<Self> {
        let hex = s.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }
        let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
        let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
        let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
        Some(Self::new(r, g, b))
    }
}

impl From<[u8; 3]> for Rgb {
    fn from(p: [u8; 3]) -> Self {
        Self::new(p[0], p[1], p[2])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_is_not_scaled() {
        assert_eq!(Rgb::TRANSPARENT.scaled(2.0), Rgb::TRANSPARENT);
        assert_eq!(Rgb::TRANSPARENT.scaled(0.0), Rgb::TRANSPARENT);
    }

    #[test]
    fn test_scaled_never_lands_on_sentinel() {
        // 2 * 0.5 rounds to 1 which would collide with the sentinel.
        let c = Rgb::new(2, 0, 0).scaled(0.5);
        assert!(c.is_opaque());
        assert_eq!(c, Rgb::BLACK);
    }

    #[test]
    fn test_scaled_clamps_and_rounds() {
        let c = Rgb::new(200, 100, 3).scaled(1.5);
        assert_eq!(c, Rgb::new(255, 150, 5));
        assert_eq!(Rgb::new(9, 9, 9).scaled(1.0), Rgb::new(9, 9, 9));
    }

    #[test]
    fn test_greyscale_weights() {
        assert_eq!(Rgb::WHITE.greyscale(), Rgb::new(255, 255, 255));
        assert_eq!(Rgb::BLACK.greyscale(), Rgb::BLACK);
        let g = Rgb::new(255, 0, 0).greyscale();
        assert_eq!(g, Rgb::new(54, 54, 54));
        assert_eq!(Rgb::TRANSPARENT.greyscale(), Rgb::TRANSPARENT);
    }

    #[test]
    fn test_from_hex() {
        assert_eq!(Rgb::from_hex("#ff8000"), Some(Rgb::new(255, 128, 0)));
        assert_eq!(Rgb::from_hex("00ff00"), Some(Rgb::new(0, 255, 0)));
        assert_eq!(Rgb::from_hex("#fff"), None);
        assert_eq!(Rgb::from_hex("zzzzzz"), None);
    }
}
