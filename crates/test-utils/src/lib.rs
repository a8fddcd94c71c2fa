//! Shared test utilities for the imagery synthesis workspace.
//!
//! This crate provides common testing infrastructure including:
//! - An in-memory decoder with injectable failures
//! - Source image generators
//! - LUT fixtures and engine setup in a temporary work directory
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```
//!
//! Then import in your tests:
//!
//! ```ignore
//! use test_utils::{MemoryDecoder, test_engine};
//! ```

pub mod decoder;
pub mod fixtures;
pub mod generators;

// Re-export commonly used items at the crate root
pub use decoder::*;
pub use fixtures::*;
pub use generators::*;

/// Route `tracing` output through the test harness. Safe to call from every
/// test; only the first call installs the subscriber.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}
