//! Common types shared across the imagery synthesis crates.

pub mod color;
pub mod config;
pub mod error;
pub mod geometry;
pub mod lut;

pub use color::{Rgb, RASTER_BPP};
pub use config::EngineConfig;
pub use error::{SynthError, SynthResult};
pub use geometry::{Affine, ClipRect, Rect, Viewport};
pub use lut::{ColorBand, IndexedLut, Lut, LutHandle, LutKind, LutRegistry, RangedLut};
