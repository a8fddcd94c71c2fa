//! Storage for the imagery synthesis engine.
//!
//! Provides the disk backed render cache: per-process scratch files holding
//! compressed rasters, keyed by the identity of the composition subtree that
//! produced them.

pub mod render_cache;

pub use render_cache::{CacheKey, CacheStats, RenderCache};
