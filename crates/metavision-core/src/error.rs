//! Error types for the MetaVision extraction pipeline and offline cache.
//!
//! Errors are organized by stage so a failure names the input, the stage and
//! the specific issue. Only input validation and upload errors ever abort a
//! run; every other pipeline error is absorbed by the extractor that owns it.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for MetaVision operations.
#[derive(Error, Debug)]
pub enum MetaVisionError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Pipeline processing errors
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Offline cache errors
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// General I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file from disk
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse TOML configuration
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Configuration values are invalid
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Pipeline processing errors, organized by stage.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Image decoding failed
    #[error("Decode error for {name}: {message}")]
    Decode { name: String, message: String },

    /// Metadata extraction failed
    #[error("Metadata extraction failed for {name}: {message}")]
    Metadata { name: String, message: String },

    /// Reading the hosted reference copy failed
    #[error("Fetch failed for {url}: {message}")]
    Fetch { url: String, message: String },

    /// Text recognition failed
    #[error("OCR failed: {message}")]
    Ocr { message: String },

    /// Machine-readable code scan failed
    #[error("Code detection failed: {message}")]
    CodeDetection { message: String },

    /// Operation timed out
    #[error("Timeout in {stage} stage for {name} after {timeout_ms}ms")]
    Timeout {
        name: String,
        stage: String,
        timeout_ms: u64,
    },

    /// File exceeds size limit
    #[error("File too large: {name} ({size_mb}MB > {max_mb}MB)")]
    FileTooLarge {
        name: String,
        size_mb: u64,
        max_mb: u64,
    },

    /// Image dimensions exceed limit
    #[error("Image too large: {name} ({width}x{height} > {max_dim})")]
    ImageTooLarge {
        name: String,
        width: u32,
        height: u32,
        max_dim: u32,
    },

    /// MIME type outside the allow-list, or content that is not an image
    #[error("Unsupported type for {name}: {mime_type}")]
    UnsupportedType { name: String, mime_type: String },

    /// Upload to the image host failed
    #[error("Upload failed: {message}")]
    Upload {
        message: String,
        status_code: Option<u16>,
    },

    /// File not found
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),
}

impl PipelineError {
    /// Whether this error must abort the run instead of being absorbed.
    ///
    /// Input validation and upload failures are fatal; everything else is a
    /// stage-local failure that the owning extractor replaces with sentinels.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PipelineError::FileTooLarge { .. }
                | PipelineError::UnsupportedType { .. }
                | PipelineError::FileNotFound(_)
                | PipelineError::Upload { .. }
        )
    }
}

/// Offline cache and update controller errors.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Network fetch failed or returned an unusable response
    #[error("Fetch failed for {url}: {message}")]
    Fetch {
        url: String,
        message: String,
        status_code: Option<u16>,
    },

    /// A precache manifest entry could not be stored; nothing was committed
    #[error("Install of cache version {version} failed at {url}: {message}")]
    Install {
        version: u32,
        url: String,
        message: String,
    },

    /// No network response and no cached copy
    #[error("Offline with no cached response for {0}")]
    Offline(String),

    /// The URL could not be parsed or resolved against the origin
    #[error("Invalid URL {url}: {message}")]
    InvalidUrl { url: String, message: String },

    /// The controller is not in a state that permits the operation
    #[error("Controller for version {version} cannot {action} while {state}")]
    InvalidState {
        version: u32,
        action: String,
        state: String,
    },

    /// Persisted storage could not be read or written
    #[error("Cache storage IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Persisted storage is malformed
    #[error("Cache storage JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience type alias for MetaVision results.
pub type Result<T> = std::result::Result<T, MetaVisionError>;

/// Convenience type alias for pipeline-specific results.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

/// Convenience type alias for cache-specific results.
pub type CacheResult<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_and_upload_errors_are_fatal() {
        let err = PipelineError::FileTooLarge {
            name: "big.jpg".to_string(),
            size_mb: 40,
            max_mb: 32,
        };
        assert!(err.is_fatal());

        let err = PipelineError::Upload {
            message: "HTTP 400".to_string(),
            status_code: Some(400),
        };
        assert!(err.is_fatal());
    }

    #[test]
    fn test_stage_errors_are_not_fatal() {
        let err = PipelineError::Ocr {
            message: "engine crashed".to_string(),
        };
        assert!(!err.is_fatal());

        let err = PipelineError::Decode {
            name: "x.png".to_string(),
            message: "truncated".to_string(),
        };
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_install_error_message_names_version_and_url() {
        let err = CacheError::Install {
            version: 2,
            url: "https://app.test/styles.css".to_string(),
            message: "HTTP 404".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("version 2"));
        assert!(msg.contains("styles.css"));
    }
}
