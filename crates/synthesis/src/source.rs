//! External collaborators: image decoding and reprojection.
//!
//! The engine never reads files itself. A [`Decoder`] turns a source
//! reference into a [`DecodedImage`] and an optional [`Reprojector`] warps it
//! into the display projection.

use imagery_common::{LutHandle, SynthError, SynthResult, RASTER_BPP};
use renderer::resample::{PolarGrid, PolarValues};
use renderer::PixelCodec;
use serde::{Deserialize, Serialize};

/// Values of a polar radar scan, `bearing_bins` rays of `range_bins` each.
#[derive(Debug, Clone, PartialEq)]
pub enum PolarData {
    Bytes(Vec<u8>),
    Floats(Vec<f32>),
}

impl PolarData {
    pub fn len(&self) -> usize {
        match self {
            PolarData::Bytes(v) => v.len(),
            PolarData::Floats(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Decoded pixel payload.
#[derive(Debug, Clone, PartialEq)]
pub enum SourcePixels {
    /// Interleaved 8 bit RGB.
    Rgb(Vec<u8>),
    /// One palette index per pixel. `remap` rewrites indices and applies
    /// only while the image is drawn with its native palette.
    Indexed { data: Vec<u8>, remap: Option<Vec<u8>> },
    /// Coded data values.
    Coded { data: Vec<u8>, codec: PixelCodec },
    /// Polar radar scan.
    Polar {
        range_bins: usize,
        bearing_bins: usize,
        /// Source pixels per range bin.
        range_scale: f64,
        /// Degrees per ray.
        bearing_scale: f64,
        values: PolarData,
    },
}

/// A decoded source image.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedImage {
    pub width: usize,
    pub height: usize,
    pub pixels: SourcePixels,
    /// Row-major, LSB-first transparency mask; a clear bit is transparent.
    pub mask: Option<Vec<u8>>,
    /// Palette shipped with the source, registered by the decoder.
    pub native_lut: Option<LutHandle>,
}

impl DecodedImage {
    pub fn rgb(width: usize, height: usize, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            pixels: SourcePixels::Rgb(data),
            mask: None,
            native_lut: None,
        }
    }

    pub fn indexed(width: usize, height: usize, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            pixels: SourcePixels::Indexed { data, remap: None },
            mask: None,
            native_lut: None,
        }
    }

    pub fn coded(width: usize, height: usize, data: Vec<u8>, codec: PixelCodec) -> Self {
        Self {
            width,
            height,
            pixels: SourcePixels::Coded { data, codec },
            mask: None,
            native_lut: None,
        }
    }

    /// A polar scan. Its cartesian extent is a square covering the full range.
    pub fn polar(
        range_bins: usize,
        bearing_bins: usize,
        range_scale: f64,
        bearing_scale: f64,
        values: PolarData,
    ) -> Self {
        let side = (2.0 * range_bins as f64 * range_scale).round() as usize;
        Self {
            width: side,
            height: side,
            pixels: SourcePixels::Polar {
                range_bins,
                bearing_bins,
                range_scale,
                bearing_scale,
                values,
            },
            mask: None,
            native_lut: None,
        }
    }

    pub fn with_mask(mut self, mask: Vec<u8>) -> Self {
        self.mask = Some(mask);
        self
    }

    pub fn with_native_lut(mut self, lut: LutHandle) -> Self {
        self.native_lut = Some(lut);
        self
    }

    pub fn with_remap(mut self, table: Vec<u8>) -> Self {
        if let SourcePixels::Indexed { remap, .. } = &mut self.pixels {
            *remap = Some(table);
        }
        self
    }

    /// Number of bands per pixel as reported by the decoder.
    pub fn bands(&self) -> usize {
        match self.pixels {
            SourcePixels::Rgb(_) => RASTER_BPP,
            _ => 1,
        }
    }

    /// Polar view over the scan, if this is one.
    pub fn polar_grid(&self) -> Option<PolarGrid<'_>> {
        match &self.pixels {
            SourcePixels::Polar {
                range_bins,
                bearing_bins,
                range_scale,
                bearing_scale,
                values,
            } => Some(PolarGrid {
                range_bins: *range_bins,
                bearing_bins: *bearing_bins,
                range_scale: *range_scale,
                bearing_scale: *bearing_scale,
                values: match values {
                    PolarData::Bytes(v) => PolarValues::Bytes(v),
                    PolarData::Floats(v) => PolarValues::Floats(v),
                },
            }),
            _ => None,
        }
    }

    /// Check that buffers match the declared dimensions.
    pub fn validate(&self, source_ref: &str) -> SynthResult<()> {
        let pixels = self.width * self.height;
        if pixels == 0 {
            return Err(SynthError::decode(source_ref, "empty image"));
        }
        let (have, want) = match &self.pixels {
            SourcePixels::Rgb(d) => (d.len(), pixels * RASTER_BPP),
            SourcePixels::Indexed { data, .. } => (data.len(), pixels),
            SourcePixels::Coded { data, codec } => (data.len(), codec.grid_len(self.width, self.height)),
            SourcePixels::Polar {
                range_bins,
                bearing_bins,
                values,
                ..
            } => (values.len(), range_bins * bearing_bins),
        };
        if have < want {
            return Err(SynthError::decode(
                source_ref,
                format!("{} pixel bytes, expected {}", have, want),
            ));
        }
        if let Some(mask) = &self.mask {
            if mask.len() * 8 < pixels {
                return Err(SynthError::decode(source_ref, "mask shorter than image"));
            }
        }
        Ok(())
    }
}

/// Decodes a source reference into pixels.
pub trait Decoder: Send + Sync {
    fn decode(&self, source_ref: &str) -> SynthResult<DecodedImage>;
}

/// A map projection, compared by name and parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionDef {
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<f64>,
}

impl ProjectionDef {
    pub fn new(name: impl Into<String>, parameters: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            parameters,
        }
    }

    /// Whether an image in this projection can be placed in `other` by
    /// scaling, rotating and translating alone.
    pub fn is_compatible(&self, other: &ProjectionDef) -> bool {
        self.name.eq_ignore_ascii_case(&other.name)
            && self.parameters.len() == other.parameters.len()
            && self
                .parameters
                .iter()
                .zip(&other.parameters)
                .all(|(a, b)| (a - b).abs() < 1e-9)
    }
}

/// New map placement of a reprojected image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeometryHint {
    pub origin_x: f64,
    pub origin_y: f64,
    pub width: f64,
    pub height: f64,
}

/// Warps a decoded image between projections.
pub trait Reprojector: Send + Sync {
    fn reproject(
        &self,
        image: &DecodedImage,
        from: &ProjectionDef,
        to: &ProjectionDef,
    ) -> SynthResult<(DecodedImage, GeometryHint)>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_catches_short_buffers() {
        assert!(DecodedImage::rgb(2, 2, vec![0; 12]).validate("a").is_ok());
        let err = DecodedImage::rgb(2, 2, vec![0; 11]).validate("a").unwrap_err();
        assert_eq!(err.code(), "DecodeFailure");
        assert!(DecodedImage::indexed(4, 4, vec![0; 16])
            .with_mask(vec![0; 1])
            .validate("a")
            .is_err());
        assert!(DecodedImage::indexed(0, 4, vec![]).validate("a").is_err());
    }

    #[test]
    fn test_polar_extent_covers_full_range() {
        let img = DecodedImage::polar(10, 36, 1.5, 10.0, PolarData::Bytes(vec![0; 360]));
        assert_eq!((img.width, img.height), (30, 30));
        assert_eq!(img.polar_grid().unwrap().side(), 30);
        assert!(img.validate("radar").is_ok());
    }

    #[test]
    fn test_projection_compatibility() {
        let a = ProjectionDef::new("lambert", vec![25.0, 25.0]);
        let b = ProjectionDef::new("Lambert", vec![25.0, 25.0]);
        let c = ProjectionDef::new("lambert", vec![25.0, 30.0]);
        assert!(a.is_compatible(&b));
        assert!(!a.is_compatible(&c));
        assert!(!a.is_compatible(&ProjectionDef::new("mercator", vec![])));
    }

    #[test]
    fn test_remap_only_applies_to_indexed() {
        let img = DecodedImage::rgb(1, 1, vec![0; 3]).with_remap(vec![1, 2]);
        assert_eq!(img.pixels, SourcePixels::Rgb(vec![0; 3]));
        let img = DecodedImage::indexed(1, 1, vec![0]).with_remap(vec![7]);
        assert!(matches!(img.pixels, SourcePixels::Indexed { remap: Some(_), .. }));
    }
}
