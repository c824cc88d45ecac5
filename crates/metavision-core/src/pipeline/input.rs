//! The raw image a run operates on.

use image::ImageFormat;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use crate::config::LimitsConfig;
use crate::error::PipelineError;

/// Fallback MIME type when neither content nor extension identify the file.
const OCTET_STREAM: &str = "application/octet-stream";

/// One user-submitted image: bytes plus the facts a file picker reports.
///
/// Bytes are shared so concurrent stages can borrow them without copying.
#[derive(Debug, Clone)]
pub struct ImageInput {
    /// File name without directory
    pub name: String,
    /// Declared MIME type
    pub mime_type: String,
    /// Full file contents
    pub bytes: Arc<[u8]>,
    /// Filesystem modification time, if known
    pub last_modified: Option<SystemTime>,
}

impl ImageInput {
    pub fn new(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: impl Into<Arc<[u8]>>,
        last_modified: Option<SystemTime>,
    ) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes: bytes.into(),
            last_modified,
        }
    }

    /// Read an image from disk.
    ///
    /// Files over the configured size limit are rejected before any bytes
    /// are read. The MIME type is sniffed from the content and falls back to
    /// the file extension, so a misnamed PNG still reports `image/png`.
    pub async fn from_path(path: &Path, limits: &LimitsConfig) -> Result<Self, PipelineError> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|_| PipelineError::FileNotFound(path.to_path_buf()))?;

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();

        if metadata.len() > limits.max_file_size_bytes() {
            return Err(PipelineError::FileTooLarge {
                name,
                size_mb: metadata.len() / (1024 * 1024),
                max_mb: limits.max_file_size_mb,
            });
        }

        let bytes = tokio::fs::read(path).await.map_err(|e| PipelineError::Decode {
            name: name.clone(),
            message: format!("Cannot read file: {e}"),
        })?;

        let last_modified = metadata.modified().ok();

        let mime_type = sniff_mime_type(&bytes, path);

        Ok(Self::new(name, mime_type, bytes, last_modified))
    }

    /// File size in bytes.
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Determine a MIME type from magic bytes, then from the extension.
pub fn sniff_mime_type(bytes: &[u8], path: &Path) -> String {
    image::guess_format(bytes)
        .or_else(|_| ImageFormat::from_path(path))
        .map(|format| format.to_mime_type().to_string())
        .unwrap_or_else(|_| OCTET_STREAM.to_string())
}

#[cfg(test)]
pub(crate) mod fixtures {
    use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    use super::ImageInput;

    /// Encode an image in memory.
    pub fn encode(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        image.write_to(&mut buffer, format).unwrap();
        buffer.into_inner()
    }

    /// A solid-color PNG as an `ImageInput`.
    pub fn solid_png(name: &str, width: u32, height: u32, color: [u8; 4]) -> ImageInput {
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba(color)));
        ImageInput::new(name, "image/png", encode(&image, ImageFormat::Png), None)
    }
}
