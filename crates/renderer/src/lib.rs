//! Pixel level rendering for synthesized weather imagery.
//!
//! - Raster buffers with a transparent sentinel
//! - Color mapping through indexed and ranged lookup tables
//! - Nearest neighbour affine resampling (cartesian and polar radar)
//! - Copy, combine and blend compositing
//! - Output pixel layouts and PNG encoding

pub mod codec;
pub mod colormap;
pub mod composite;
pub mod output;
pub mod overlay;
pub mod png;
pub mod raster;
pub mod resample;

pub use codec::{ByteOrder, PixelCodec, ValueKind};
pub use colormap::ColorMapper;
pub use output::PixelLayout;
pub use raster::Raster;
