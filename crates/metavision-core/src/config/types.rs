//! Sub-configuration structs with defaults matching the hosted tool.

use serde::{Deserialize, Serialize};

/// Resource limits and input validation rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum file size in megabytes
    pub max_file_size_mb: u64,

    /// MIME types accepted for extraction
    pub allowed_types: Vec<String>,

    /// Maximum image dimension (width or height)
    pub max_image_dimension: u32,

    /// Decode timeout in milliseconds
    pub decode_timeout_ms: u64,

    /// Timeout for reading the hosted reference copy, in milliseconds
    pub fetch_timeout_ms: u64,

    /// OCR engine timeout in milliseconds
    pub ocr_timeout_ms: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_file_size_mb: 32,
            allowed_types: vec![
                "image/jpeg".to_string(),
                "image/png".to_string(),
                "image/gif".to_string(),
                "image/webp".to_string(),
                "image/bmp".to_string(),
            ],
            max_image_dimension: 20000,
            decode_timeout_ms: 10000,
            fetch_timeout_ms: 30000,
            ocr_timeout_ms: 120000,
        }
    }
}

impl LimitsConfig {
    /// Maximum file size in bytes.
    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb * 1024 * 1024
    }
}

/// Preview (transient thumbnail) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    /// Whether to register a preview for each run
    pub enabled: bool,

    /// Preview size in pixels (longest edge)
    pub size: u32,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            size: 256,
        }
    }
}

/// Which optional extraction capabilities are available.
///
/// A disabled capability behaves exactly like a missing third-party engine:
/// its section is filled with the documented sentinels.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// EXIF/camera parsing
    pub exif: bool,

    /// Named color palette extraction
    pub palette: bool,

    /// Optical character recognition
    pub ocr: bool,

    /// QR code detection
    pub qr: bool,

    /// Recognition language passed to the OCR engine
    pub ocr_language: String,

    /// Path or name of the tesseract binary
    pub tesseract_path: String,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            exif: true,
            palette: true,
            ocr: true,
            qr: true,
            ocr_language: "eng".to_string(),
            tesseract_path: "tesseract".to_string(),
        }
    }
}

/// Image host settings for producing the reference URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Upload endpoint
    pub endpoint: String,

    /// API key (supports ${ENV_VAR} syntax)
    pub api_key: String,

    /// Max retry attempts for transient failures
    pub retry_attempts: u32,

    /// Base delay between retries in milliseconds
    pub retry_delay_ms: u64,

    /// Request timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.imgbb.com/1/upload".to_string(),
            api_key: "${IMGBB_API_KEY}".to_string(),
            retry_attempts: 2,
            retry_delay_ms: 1000,
            timeout_ms: 60000,
        }
    }
}

/// Offline cache and update controller settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OfflineConfig {
    /// Cache version; bumping it rolls out a new pair of stores
    pub version: u32,

    /// Prefix for store names (`<prefix>-cache-v<N>`, `<prefix>-runtime-v<N>`)
    pub cache_prefix: String,

    /// Origin of the hosting application
    pub origin: String,

    /// Host of the image-hosting API (network-first route)
    pub api_host: String,

    /// App shell document served to offline navigations
    pub shell_path: String,

    /// Ordered manifest fetched verbatim at install
    pub precache_urls: Vec<String>,

    /// Third-party library bundles served cache-first
    pub cdn_urls: Vec<String>,

    /// Directory holding the persisted stores
    pub cache_dir: String,

    /// How often the host checks for a new version, in seconds
    pub update_check_interval_secs: u64,
}

impl Default for OfflineConfig {
    fn default() -> Self {
        Self {
            version: 1,
            cache_prefix: "metavision".to_string(),
            origin: "http://localhost:8080".to_string(),
            api_host: "api.imgbb.com".to_string(),
            shell_path: "/index.html".to_string(),
            precache_urls: vec![
                "/".to_string(),
                "/index.html".to_string(),
                "/styles.css".to_string(),
                "/script.js".to_string(),
                "/manifest.json".to_string(),
                "/icons/icon-192x192.png".to_string(),
                "/icons/icon-512x512.png".to_string(),
            ],
            cdn_urls: vec![
                "https://cdn.jsdelivr.net/npm/exifr/dist/full.umd.js".to_string(),
                "https://cdn.jsdelivr.net/npm/tesseract.js".to_string(),
                "https://cdn.jsdelivr.net/npm/jsqr/dist/jsQR.js".to_string(),
                "https://cdn.jsdelivr.net/npm/node-vibrant/dist/vibrant.min.js".to_string(),
            ],
            cache_dir: "~/.metavision/cache".to_string(),
            update_check_interval_secs: 3600,
        }
    }
}

/// Output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Default output format ("json" or "jsonl")
    pub format: String,

    /// Pretty-print JSON output
    pub pretty: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: "json".to_string(),
            pretty: true,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,

    /// Log format: "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
