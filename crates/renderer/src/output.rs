//! Conversion of internal rasters to caller selected pixel layouts.

use crate::raster::Raster;
use imagery_common::{Rgb, SynthError, RASTER_BPP};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Minimum pixels before conversion is spread over the thread pool
const PARALLEL_THRESHOLD: usize = 65536; // 256x256 or larger

/// Pixel layout of a rendered buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelLayout {
    /// Interleaved RGB; transparent pixels keep the sentinel value.
    PixelMajor,
    /// Interleaved RGB; transparent pixels become black.
    PixelMajorOpaque,
    /// Separate R, G and B planes; sentinel kept.
    PlaneMajor,
    /// Separate R, G and B planes; transparent pixels become black.
    PlaneMajorOpaque,
    /// Interleaved RGBA; transparent pixels are fully transparent black.
    AlphaPixelMajor,
    /// Separate R, G, B and A planes.
    AlphaPlaneMajor,
}

impl PixelLayout {
    pub fn channels(&self) -> usize {
        match self {
            PixelLayout::AlphaPixelMajor | PixelLayout::AlphaPlaneMajor => 4,
            _ => 3,
        }
    }

    pub fn is_planar(&self) -> bool {
        matches!(
            self,
            PixelLayout::PlaneMajor | PixelLayout::PlaneMajorOpaque | PixelLayout::AlphaPlaneMajor
        )
    }

    /// The channel values written for one pixel.
    #[inline(always)]
    fn pixel(&self, c: Rgb) -> [u8; 4] {
        let opaque = c.is_opaque();
        match self {
            PixelLayout::PixelMajor | PixelLayout::PlaneMajor => [c.r, c.g, c.b, 255],
            PixelLayout::PixelMajorOpaque | PixelLayout::PlaneMajorOpaque => {
                let c = if opaque { c } else { Rgb::BLACK };
                [c.r, c.g, c.b, 255]
            }
            PixelLayout::AlphaPixelMajor | PixelLayout::AlphaPlaneMajor => {
                if opaque {
                    [c.r, c.g, c.b, 255]
                } else {
                    [0, 0, 0, 0]
                }
            }
        }
    }
}

impl FromStr for PixelLayout {
    type Err = SynthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pixel" | "pixel_major" => Ok(PixelLayout::PixelMajor),
            "pixel_opaque" | "pixel_major_opaque" => Ok(PixelLayout::PixelMajorOpaque),
            "plane" | "plane_major" => Ok(PixelLayout::PlaneMajor),
            "plane_opaque" | "plane_major_opaque" => Ok(PixelLayout::PlaneMajorOpaque),
            "rgba" | "alpha_pixel_major" => Ok(PixelLayout::AlphaPixelMajor),
            "alpha_plane_major" => Ok(PixelLayout::AlphaPlaneMajor),
            other => Err(SynthError::invalid_parameter(
                "layout",
                format!("unknown pixel layout '{}'", other),
            )),
        }
    }
}

/// Convert a raster to `layout`.
pub fn to_layout(raster: &Raster, layout: PixelLayout) -> Vec<u8> {
    let pixels = raster.width() * raster.height();
    let channels = layout.channels();
    let src = raster.data();

    let mut out = vec![0u8; pixels * channels];

    if layout.is_planar() {
        for (i, p) in src.chunks_exact(RASTER_BPP).enumerate() {
            let v = layout.pixel(Rgb::from_slice(p));
            for (c, value) in v.iter().take(channels).enumerate() {
                out[c * pixels + i] = *value;
            }
        }
        return out;
    }

    let convert = |(dst, p): (&mut [u8], &[u8])| {
        let v = layout.pixel(Rgb::from_slice(p));
        dst.copy_from_slice(&v[..channels]);
    };
    if pixels >= PARALLEL_THRESHOLD {
        out.par_chunks_mut(channels)
            .zip(src.par_chunks(RASTER_BPP))
            .for_each(convert);
    } else {
        out.chunks_mut(channels)
            .zip(src.chunks(RASTER_BPP))
            .for_each(convert);
    }
    out
}
