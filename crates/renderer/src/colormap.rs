//! Pixel value to color mapping.
//!
//! A [`ColorMapper`] is built once per render of an image. Brightness and
//! greyscale adjustments are folded into a private copy of the lookup table
//! up front so the per pixel path is a plain table read.

use imagery_common::{IndexedLut, Lut, LutKind, RangedLut, Rgb};

/// Maps raw bytes, decoded values or direct RGB to output colors.
#[derive(Debug, Clone)]
pub struct ColorMapper {
    table: Option<Lut>,
    brightness: f64,
    greyscale: bool,
}

impl ColorMapper {
    /// Mapper for a lookup table with brightness and greyscale folded in.
    pub fn new(lut: &Lut, brightness: f64, greyscale: bool) -> Self {
        let adjust = |c: Rgb| adjust_color(c, brightness, greyscale);
        let table = match lut {
            Lut::Indexed(t) => Lut::Indexed(t.map_colors(adjust)),
            Lut::Ranged(t) => Lut::Ranged(t.map_colors(adjust)),
        };
        Self {
            table: Some(table),
            brightness,
            greyscale,
        }
    }

    /// Mapper for images that already carry RGB pixels.
    pub fn direct(brightness: f64, greyscale: bool) -> Self {
        Self {
            table: None,
            brightness,
            greyscale,
        }
    }

    pub fn kind(&self) -> Option<LutKind> {
        self.table.as_ref().map(Lut::kind)
    }

    /// Color for a raw index or decoded value. `None` is transparent.
    #[inline]
    pub fn map_pixel(&self, value: f64) -> Option<Rgb> {
        self.table.as_ref()?.lookup(value)
    }

    /// Color for a palette index.
    #[inline(always)]
    pub fn map_index(&self, index: u8) -> Option<Rgb> {
        match &self.table {
            Some(Lut::Indexed(t)) => Some(t.get(index)).filter(|c| c.is_opaque()),
            Some(Lut::Ranged(t)) => t.lookup(index as f64),
            None => None,
        }
    }

    /// Adjust a direct RGB pixel.
    #[inline(always)]
    pub fn map_rgb(&self, color: Rgb) -> Rgb {
        adjust_color(color, self.brightness, self.greyscale)
    }

    pub fn indexed(&self) -> Option<&IndexedLut> {
        match &self.table {
            Some(Lut::Indexed(t)) => Some(t),
            _ => None,
        }
    }

    pub fn ranged(&self) -> Option<&RangedLut> {
        match &self.table {
            Some(Lut::Ranged(t)) => Some(t),
            _ => None,
        }
    }
}

fn adjust_color(c: Rgb, brightness: f64, greyscale: bool) -> Rgb {
    let c = c.scaled(brightness);
    if greyscale {
        c.greyscale()
    } else {
        c
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imagery_common::ColorBand;

    #[test]
    fn test_indexed_with_brightness() {
        let lut = Lut::Indexed(IndexedLut::new(&[Rgb::new(100, 50, 10)]).unwrap());
        let mapper = ColorMapper::new(&lut, 2.0, false);
        assert_eq!(mapper.map_index(0), Some(Rgb::new(200, 100, 20)));
        assert_eq!(mapper.map_index(1), None);
    }

    #[test]
    fn test_ranged_no_band_is_transparent() {
        let lut = Lut::Ranged(
            RangedLut::new(vec![ColorBand::new(0.0, 5.0, Rgb::new(0, 0, 200))]).unwrap(),
        );
        let mapper = ColorMapper::new(&lut, 1.0, false);
        assert_eq!(mapper.map_pixel(2.5), Some(Rgb::new(0, 0, 200)));
        assert_eq!(mapper.map_pixel(7.0), None);
    }

    #[test]
    fn test_direct_greyscale() {
        let mapper = ColorMapper::direct(1.0, true);
        assert_eq!(mapper.map_rgb(Rgb::WHITE), Rgb::WHITE);
        assert_eq!(mapper.map_rgb(Rgb::TRANSPARENT), Rgb::TRANSPARENT);
        assert!(mapper.map_pixel(1.0).is_none());
    }
}
