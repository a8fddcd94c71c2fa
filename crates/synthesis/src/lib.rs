//! Image synthesis for weather displays.
//!
//! Leaf images (satellite, radar, gridded data, map backgrounds) are decoded,
//! colored and resampled into window rasters, then layered by synthetic nodes
//! that combine, blend or composite their children. Rendered rasters are kept
//! in a per-process disk cache so an unchanged tree is loaded rather than
//! rebuilt.
//!
//! # Example
//!
//! ```ignore
//! use synthesis::{LeafSpec, Placement, SynthesisEngine};
//! use renderer::PixelLayout;
//!
//! let mut engine = SynthesisEngine::new(EngineConfig::from_env(), my_decoder)?;
//! let sat = engine.create_image(LeafSpec::file("goes16.gif", Placement::new(0.0, 0.0, 512.0, 512.0)))?;
//! let out = engine.render(sat, PixelLayout::AlphaPixelMajor)?;
//! ```

pub mod arena;
pub mod context;
pub mod engine;
pub mod geometry;
pub mod node;
mod orchestrator;
pub mod source;

pub use arena::{NodeArena, NodeId};
pub use context::{Diagnostic, RenderContext, Severity};
pub use engine::{LeafKind, LeafSpec, NodeGeometry, RenderOutput, RenderedImage, SynthesisEngine};
pub use node::{
    BlendRatio, ChildLink, ImageClass, ImageNode, Payload, Placement, Plane, RenderStatus, SynthKind,
};
pub use source::{
    DecodedImage, Decoder, GeometryHint, PolarData, ProjectionDef, Reprojector, SourcePixels,
};
