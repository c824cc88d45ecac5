//! Configuration validation with range checks.

use crate::error::ConfigError;

use super::Config;

impl Config {
    /// Validate configuration values are within acceptable ranges.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.limits.max_file_size_mb == 0 {
            return Err(ConfigError::ValidationError(
                "limits.max_file_size_mb must be > 0".into(),
            ));
        }
        if self.limits.allowed_types.is_empty() {
            return Err(ConfigError::ValidationError(
                "limits.allowed_types must not be empty".into(),
            ));
        }
        if self.limits.max_image_dimension == 0 {
            return Err(ConfigError::ValidationError(
                "limits.max_image_dimension must be > 0".into(),
            ));
        }
        if self.limits.decode_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "limits.decode_timeout_ms must be > 0".into(),
            ));
        }
        if self.limits.fetch_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "limits.fetch_timeout_ms must be > 0".into(),
            ));
        }
        if self.limits.ocr_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "limits.ocr_timeout_ms must be > 0".into(),
            ));
        }
        if self.preview.size == 0 {
            return Err(ConfigError::ValidationError(
                "preview.size must be > 0".into(),
            ));
        }
        if self.offline.version == 0 {
            return Err(ConfigError::ValidationError(
                "offline.version must be >= 1".into(),
            ));
        }
        if self.offline.update_check_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "offline.update_check_interval_secs must be > 0".into(),
            ));
        }
        if reqwest::Url::parse(&self.offline.origin).is_err() {
            return Err(ConfigError::ValidationError(format!(
                "offline.origin is not a valid URL: {}",
                self.offline.origin
            )));
        }
        if !self.offline.shell_path.starts_with('/') {
            return Err(ConfigError::ValidationError(
                "offline.shell_path must start with '/'".into(),
            ));
        }
        Ok(())
    }
}
