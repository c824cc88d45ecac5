//! Configuration management for MetaVision.
//!
//! Configuration is loaded from the platform config directory with sensible
//! defaults. All config structs implement `Default`.

mod types;
mod validate;

pub use types::*;

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration structure for MetaVision.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Resource limits and validation rules
    pub limits: LimitsConfig,

    /// Preview settings
    pub preview: PreviewConfig,

    /// Optional capability switches
    pub extractors: ExtractorConfig,

    /// Image host settings
    pub upload: UploadConfig,

    /// Offline cache settings
    pub offline: OfflineConfig,

    /// Output settings
    pub output: OutputConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Returns default configuration if the file doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path.
    ///
    /// Uses platform-appropriate directories:
    /// - macOS: ~/Library/Application Support/com.metavision.metavision/config.toml
    /// - Linux: ~/.config/metavision/config.toml
    /// - Windows: C:\Users\<User>\AppData\Roaming\metavision\config\config.toml
    ///
    /// Falls back to ~/.metavision/config.toml if directory detection fails.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("com", "metavision", "metavision")
            .map(|dirs| dirs.config_dir().to_path_buf().join("config.toml"))
            .unwrap_or_else(|| {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                PathBuf::from(home).join(".metavision").join("config.toml")
            })
    }

    /// Get the resolved offline cache directory (with ~ expansion).
    pub fn cache_dir(&self) -> PathBuf {
        let expanded = shellexpand::tilde(&self.offline.cache_dir);
        PathBuf::from(expanded.into_owned())
    }

    /// Serialize the config to a pretty TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.limits.max_file_size_mb, 32);
        assert_eq!(config.limits.max_file_size_bytes(), 32 * 1024 * 1024);
        assert_eq!(config.extractors.ocr_language, "eng");
        assert_eq!(config.offline.version, 1);
    }

    #[test]
    fn test_config_to_toml() {
        let config = Config::default();
        let toml = config.to_toml().unwrap();
        assert!(toml.contains("[limits]"));
        assert!(toml.contains("[offline]"));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[extractors]\nocr = false\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert!(!config.extractors.ocr);
        assert!(config.extractors.qr);
        assert_eq!(config.limits.allowed_types.len(), 5);
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[offline]\nversion = 0\n").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("offline.version"));
    }

    #[test]
    fn test_cache_dir_expands_tilde() {
        let mut config = Config::default();
        config.offline.cache_dir = "/tmp/mv-cache".to_string();
        assert_eq!(config.cache_dir(), PathBuf::from("/tmp/mv-cache"));

        config.offline.cache_dir = "~/cache".to_string();
        assert!(!config.cache_dir().to_string_lossy().starts_with('~'));
    }
}
