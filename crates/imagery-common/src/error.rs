//! Error types for the imagery synthesis engine.

use thiserror::Error;

/// Result type alias using SynthError.
pub type SynthResult<T> = Result<T, SynthError>;

/// Primary error type for synthesis operations.
///
/// Every variant is scoped to a single node: the orchestrator records it as a
/// diagnostic and carries on with the rest of the tree. A collapsed geometry
/// is not an error at all, it is the `NotVisible` status.
#[derive(Debug, Error)]
pub enum SynthError {
    // === Source Errors ===
    #[error("Failed to decode '{source_ref}': {message}")]
    DecodeFailure { source_ref: String, message: String },

    #[error("Reprojection failed: {0}")]
    Reprojection(String),

    // === Resource Errors ===
    #[error("Unable to allocate a {width}x{height} raster")]
    MemoryExhausted { width: u32, height: u32 },

    #[error("Render cache I/O failed: {0}")]
    CacheIo(String),

    // === Caller Errors ===
    #[error("Invalid parameter value for '{param}': {message}")]
    InvalidParameter { param: String, message: String },

    #[error("Invalid node: {0}")]
    InvalidNode(String),

    #[error("Configuration error: {0}")]
    Config(String),

    // === Output Errors ===
    #[error("Encoding failed: {0}")]
    Encode(String),
}

impl SynthError {
    pub fn decode(source_ref: impl Into<String>, message: impl Into<String>) -> Self {
        SynthError::DecodeFailure {
            source_ref: source_ref.into(),
            message: message.into(),
        }
    }

    pub fn invalid_parameter(param: impl Into<String>, message: impl Into<String>) -> Self {
        SynthError::InvalidParameter {
            param: param.into(),
            message: message.into(),
        }
    }

    /// True when the failure only removes one node from the current render
    /// pass rather than rejecting the caller's request outright.
    pub fn is_node_scoped(&self) -> bool {
        matches!(
            self,
            SynthError::DecodeFailure { .. }
                | SynthError::Reprojection(_)
                | SynthError::MemoryExhausted { .. }
                | SynthError::CacheIo(_)
        )
    }

    /// Short machine readable code used in diagnostics.
    pub fn code(&self) -> &'static str {
        match self {
            SynthError::DecodeFailure { .. } => "DecodeFailure",
            SynthError::Reprojection(_) => "Reprojection",
            SynthError::MemoryExhausted { .. } => "MemoryExhausted",
            SynthError::CacheIo(_) => "CacheIoFailure",
            SynthError::InvalidParameter { .. } => "InvalidParameter",
            SynthError::InvalidNode(_) => "InvalidNode",
            SynthError::Config(_) => "Config",
            SynthError::Encode(_) => "Encode",
        }
    }
}

impl From<std::io::Error> for SynthError {
    fn from(err: std::io::Error) -> Self {
        SynthError::CacheIo(err.to_string())
    }
}

impl From<serde_json::Error> for SynthError {
    fn from(err: serde_json::Error) -> Self {
        SynthError::Config(format!("JSON error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_scoped_errors() {
        assert!(SynthError::decode("radar.urp", "truncated").is_node_scoped());
        assert!(SynthError::MemoryExhausted { width: 10, height: 10 }.is_node_scoped());
        assert!(!SynthError::invalid_parameter("blend_ratio", "150").is_node_scoped());
        assert!(!SynthError::InvalidNode("3.1".into()).is_node_scoped());
    }

    #[test]
    fn test_io_error_maps_to_cache_io() {
        let err: SynthError = std::io::Error::new(std::io::ErrorKind::Other, "disk full").into();
        assert_eq!(err.code(), "CacheIoFailure");
        assert!(err.to_string().contains("disk full"));
    }
}
