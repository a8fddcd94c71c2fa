//! Source image generators with predictable pixels.
//!
//! These generators create verifiable test patterns so a rendered pixel can
//! be traced back to the source pixel that produced it.

use imagery_common::Rgb;
use renderer::{ByteOrder, PixelCodec, ValueKind};
use synthesis::{DecodedImage, PolarData};

/// A single color RGB source.
///
/// # Example
///
/// ```
/// use imagery_common::Rgb;
/// use test_utils::solid_rgb;
///
/// let img = solid_rgb(4, 2, Rgb::new(10, 20, 30));
/// assert_eq!((img.width, img.height), (4, 2));
/// ```
pub fn solid_rgb(width: usize, height: usize, color: Rgb) -> DecodedImage {
    let data = (0..width * height).flat_map(|_| color.to_bytes()).collect();
    DecodedImage::rgb(width, height, data)
}

/// An RGB source where pixel (x, y) is `(x, y, 200)`, capped at 255.
pub fn coordinate_rgb(width: usize, height: usize) -> DecodedImage {
    let mut data = Vec::with_capacity(width * height * 3);
    for y in 0..height {
        for x in 0..width {
            data.extend_from_slice(&[x.min(255) as u8, y.min(255) as u8, 200]);
        }
    }
    DecodedImage::rgb(width, height, data)
}

/// A paletted source where pixel (x, y) holds index `(x + y) % modulo`.
pub fn diagonal_indexed(width: usize, height: usize, modulo: usize) -> DecodedImage {
    let data = (0..height)
        .flat_map(|y| (0..width).map(move |x| ((x + y) % modulo.max(1)) as u8))
        .collect();
    DecodedImage::indexed(width, height, data)
}

/// A 2 byte big endian grid with value `col * 10 + row` scaled by 0.1, so
/// the decoded value at (col, row) is `col + row / 10`.
pub fn coded_grid(width: usize, height: usize) -> DecodedImage {
    let mut data = Vec::with_capacity(width * height * 2);
    for row in 0..height {
        for col in 0..width {
            data.extend_from_slice(&((col * 10 + row) as u16).to_be_bytes());
        }
    }
    let codec = PixelCodec::new(2, ByteOrder::Big, ValueKind::Unsigned)
        .map(|c| c.with_linear(0.1, 0.0))
        .unwrap_or_else(|_| PixelCodec::byte());
    DecodedImage::coded(width, height, data, codec)
}

/// A polar scan where every bin on ray `r` holds `r % 16`.
pub fn polar_scan(range_bins: usize, bearing_bins: usize, range_scale: f64) -> DecodedImage {
    let values = (0..bearing_bins)
        .flat_map(|ray| std::iter::repeat((ray % 16) as u8).take(range_bins))
        .collect();
    DecodedImage::polar(
        range_bins,
        bearing_bins,
        range_scale,
        360.0 / bearing_bins.max(1) as f64,
        PolarData::Bytes(values),
    )
}

/// A polar scan of constant float values.
pub fn polar_floats(range_bins: usize, bearing_bins: usize, value: f32) -> DecodedImage {
    DecodedImage::polar(
        range_bins,
        bearing_bins,
        1.0,
        360.0 / bearing_bins.max(1) as f64,
        PolarData::Floats(vec![value; range_bins * bearing_bins]),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generators_validate() {
        assert!(solid_rgb(3, 3, Rgb::WHITE).validate("a").is_ok());
        assert!(coordinate_rgb(5, 4).validate("a").is_ok());
        assert!(diagonal_indexed(5, 4, 7).validate("a").is_ok());
        assert!(coded_grid(5, 4).validate("a").is_ok());
        assert!(polar_scan(10, 36, 1.0).validate("a").is_ok());
        assert!(polar_floats(10, 36, 3.0).validate("a").is_ok());
    }

    #[test]
    fn test_coded_grid_values() {
        let img = coded_grid(4, 3);
        if let synthesis::SourcePixels::Coded { data, codec } = &img.pixels {
            let v = codec.decode(data, 2 * 4 + 3).unwrap();
            assert!((v - 3.2).abs() < 1e-9);
        } else {
            panic!("expected coded pixels");
        }
    }
}
