//! Configuration for the synthesis engine.

use crate::error::{SynthError, SynthResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for the synthesis engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Root of the per-process scratch files used by the render cache.
    pub work_directory: PathBuf,

    /// Persist rendered rasters between passes.
    pub cache_enabled: bool,

    /// zlib level for cache artifacts (0-9).
    pub compression_level: u32,

    /// Brightness applied to images that set none of their own.
    pub brightness: f64,

    /// Largest raster the engine will allocate, in pixels.
    pub max_raster_pixels: usize,

    /// Remove this process's scratch files on shutdown.
    pub purge_on_shutdown: bool,

    /// Convert every rendered color to grey.
    pub force_greyscale: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            work_directory: std::env::temp_dir().join("imagery-synthesis"),
            cache_enabled: true,
            compression_level: 1,
            brightness: 1.0,
            max_raster_pixels: 64 * 1024 * 1024,
            purge_on_shutdown: true,
            force_greyscale: false,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("SYNTH_WORK_DIR") {
            if !val.is_empty() {
                config.work_directory = PathBuf::from(val);
            }
        }

        if let Ok(val) = std::env::var("SYNTH_CACHE_ENABLED") {
            config.cache_enabled = parse_flag(&val);
        }

        if let Ok(val) = std::env::var("SYNTH_COMPRESSION_LEVEL") {
            if let Ok(level) = val.parse() {
                config.compression_level = level;
            }
        }

        if let Ok(val) = std::env::var("SYNTH_BRIGHTNESS") {
            if let Ok(b) = val.parse() {
                config.brightness = b;
            }
        }

        if let Ok(val) = std::env::var("SYNTH_MAX_RASTER_PIXELS") {
            if let Ok(n) = val.parse() {
                config.max_raster_pixels = n;
            }
        }

        if let Ok(val) = std::env::var("SYNTH_FORCE_GREYSCALE") {
            config.force_greyscale = parse_flag(&val);
        }

        config
    }

    /// Parse a JSON document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> SynthResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate().map_err(SynthError::Config)?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> SynthResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| SynthError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.work_directory.as_os_str().is_empty() {
            return Err("work_directory must not be empty".to_string());
        }

        if self.compression_level > 9 {
            return Err(format!(
                "compression_level must be 0-9, got {}",
                self.compression_level
            ));
        }

        if !self.brightness.is_finite() || self.brightness < 0.0 {
            return Err(format!("brightness must be >= 0, got {}", self.brightness));
        }

        if self.max_raster_pixels == 0 {
            return Err("max_raster_pixels must be > 0".to_string());
        }

        Ok(())
    }
}

fn parse_flag(val: &str) -> bool {
    let v = val.to_lowercase();
    v == "true" || v == "1" || v == "yes"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.cache_enabled);
        assert_eq!(config.brightness, 1.0);
    }

    #[test]
    fn test_validate_rejects_bad_level() {
        let config = EngineConfig {
            compression_level: 12,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_json_partial() {
        let config =
            EngineConfig::from_json(r#"{"work_directory": "/tmp/x", "brightness": 0.8}"#).unwrap();
        assert_eq!(config.work_directory, PathBuf::from("/tmp/x"));
        assert_eq!(config.brightness, 0.8);
        assert!(config.cache_enabled);
    }

    #[test]
    fn test_from_json_invalid() {
        assert!(matches!(
            EngineConfig::from_json(r#"{"brightness": -2.0}"#),
            Err(SynthError::Config(_))
        ));
        assert!(EngineConfig::from_json("not json").is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(&path, r#"{"cache_enabled": false}"#).unwrap();
        let config = EngineConfig::from_file(&path).unwrap();
        assert!(!config.cache_enabled);
    }
}
