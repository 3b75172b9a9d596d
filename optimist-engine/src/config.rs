//! Engine configuration

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),
}

/// Engine settings, usually loaded from `engine.yml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Keep documents in the store when a listener is unset
    pub preserve_on_unset: bool,

    /// Record reprocessing counters and timings
    pub metrics: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            preserve_on_unset: false,
            metrics: true,
        }
    }
}

impl EngineConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(contents)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config = EngineConfig::from_yaml("preserve_on_unset: true\n").unwrap();
        assert!(config.preserve_on_unset);
        assert!(config.metrics);
    }

    #[test]
    fn test_empty_file_is_default() {
        assert_eq!(EngineConfig::from_yaml("").unwrap(), EngineConfig::default());
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "metrics: false").unwrap();

        let config = EngineConfig::from_file(file.path()).unwrap();
        assert!(!config.metrics);
        assert!(!config.preserve_on_unset);
    }

    #[test]
    fn test_missing_file() {
        let result = EngineConfig::from_file("/nonexistent/engine.yml");
        assert!(matches!(result, Err(ConfigError::ReadError(_))));
    }

    #[test]
    fn test_invalid_yaml() {
        let result = EngineConfig::from_yaml("metrics: [not, a, bool]");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }
}
