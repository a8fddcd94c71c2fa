//! Positioned RGB raster buffers.
//!
//! A raster covers a rectangle of the window. Pixels are packed RGB, rows top
//! to bottom, and start out transparent.

use imagery_common::{Rect, Rgb, SynthError, SynthResult, RASTER_BPP};

/// An owned, positioned RGB pixel buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Raster {
    rect: Rect,
    data: Vec<u8>,
}

impl Raster {
    /// Allocate a transparent raster covering `rect`.
    ///
    /// Fails with `MemoryExhausted` when the raster is larger than
    /// `max_pixels` or the allocation itself fails.
    pub fn transparent(rect: Rect, max_pixels: usize) -> SynthResult<Self> {
        let exhausted = || SynthError::MemoryExhausted {
            width: rect.width,
            height: rect.height,
        };
        let pixels = rect.pixel_count();
        if pixels > max_pixels {
            return Err(exhausted());
        }
        let size = pixels.checked_mul(RASTER_BPP).ok_or_else(exhausted)?;
        let mut data = Vec::new();
        data.try_reserve_exact(size).map_err(|_| exhausted())?;
        for _ in 0..pixels {
            data.extend_from_slice(&Rgb::TRANSPARENT.to_bytes());
        }
        Ok(Self { rect, data })
    }

    /// Wrap existing pixel data. The length must match the rectangle.
    pub fn from_data(rect: Rect, data: Vec<u8>) -> SynthResult<Self> {
        if data.len() != rect.pixel_count() * RASTER_BPP {
            return Err(SynthError::invalid_parameter(
                "raster",
                format!(
                    "{} bytes do not describe a {}x{} raster",
                    data.len(),
                    rect.width,
                    rect.height
                ),
            ));
        }
        Ok(Self { rect, data })
    }

    pub fn rect(&self) -> Rect {
        self.rect
    }

    pub fn width(&self) -> usize {
        self.rect.width as usize
    }

    pub fn height(&self) -> usize {
        self.rect.height as usize
    }

    pub fn stride(&self) -> usize {
        self.width() * RASTER_BPP
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn row(&self, y: usize) -> &[u8] {
        let s = self.stride();
        &self.data[y * s..(y + 1) * s]
    }

    pub fn row_mut(&mut self, y: usize) -> &mut [u8] {
        let s = self.stride();
        &mut self.data[y * s..(y + 1) * s]
    }

    /// Pixel at raster-local coordinates.
    pub fn pixel(&self, x: usize, y: usize) -> Rgb {
        let i = (y * self.width() + x) * RASTER_BPP;
        Rgb::from_slice(&self.data[i..i + RASTER_BPP])
    }

    pub fn set_pixel(&mut self, x: usize, y: usize, color: Rgb) {
        let i = (y * self.width() + x) * RASTER_BPP;
        color.write_to(&mut self.data[i..i + RASTER_BPP]);
    }

    /// Pixel at window coordinates, if covered by this raster.
    pub fn window_pixel(&self, x: i32, y: i32) -> Option<Rgb> {
        if !self.rect.contains(x, y) {
            return None;
        }
        Some(self.pixel((x - self.rect.x) as usize, (y - self.rect.y) as usize))
    }

    pub fn opaque_count(&self) -> usize {
        self.data
            .chunks_exact(RASTER_BPP)
            .filter(|p| Rgb::from_slice(p).is_opaque())
            .count()
    }

    /// Apply `f` to every opaque pixel.
    pub fn map_opaque(&mut self, f: impl Fn(Rgb) -> Rgb) {
        for p in self.data.chunks_exact_mut(RASTER_BPP) {
            let c = Rgb::from_slice(p);
            if c.is_opaque() {
                f(c).opaque_or_black().write_to(p);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_raster_is_transparent() {
        let r = Raster::transparent(Rect::new(5, 5, 4, 3), 1000).unwrap();
        assert_eq!(r.data().len(), 4 * 3 * 3);
        assert_eq!(r.opaque_count(), 0);
        assert_eq!(r.pixel(3, 2), Rgb::TRANSPARENT);
    }

    #[test]
    fn test_pixel_limit() {
        let err = Raster::transparent(Rect::new(0, 0, 100, 100), 50).unwrap_err();
        assert!(matches!(err, SynthError::MemoryExhausted { width: 100, height: 100 }));
    }

    #[test]
    fn test_window_pixel() {
        let mut r = Raster::transparent(Rect::new(10, 20, 5, 5), 1000).unwrap();
        r.set_pixel(1, 2, Rgb::WHITE);
        assert_eq!(r.window_pixel(11, 22), Some(Rgb::WHITE));
        assert_eq!(r.window_pixel(9, 22), None);
    }

    #[test]
    fn test_from_data_length_check() {
        assert!(Raster::from_data(Rect::new(0, 0, 2, 2), vec![0; 12]).is_ok());
        assert!(Raster::from_data(Rect::new(0, 0, 2, 2), vec![0; 11]).is_err());
    }
}
