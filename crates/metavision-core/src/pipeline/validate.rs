//! Input validation before any extraction or upload.

use crate::config::LimitsConfig;
use crate::error::PipelineError;

use super::input::ImageInput;

/// Validates submitted images before a run starts.
pub struct Validator {
    limits: LimitsConfig,
}

impl Validator {
    /// Create a new validator with the given limits.
    pub fn new(limits: LimitsConfig) -> Self {
        Self { limits }
    }

    /// Reject inputs the pipeline must never see.
    ///
    /// Checks:
    /// - MIME type is on the allow-list
    /// - File size is within limits
    /// - File has valid image magic bytes
    pub fn validate(&self, input: &ImageInput) -> Result<(), PipelineError> {
        if !self
            .limits
            .allowed_types
            .iter()
            .any(|t| t.eq_ignore_ascii_case(&input.mime_type))
        {
            return Err(PipelineError::UnsupportedType {
                name: input.name.clone(),
                mime_type: input.mime_type.clone(),
            });
        }

        if input.size() > self.limits.max_file_size_bytes() {
            return Err(PipelineError::FileTooLarge {
                name: input.name.clone(),
                size_mb: input.size() / (1024 * 1024),
                max_mb: self.limits.max_file_size_mb,
            });
        }

        if !Self::is_valid_image_header(&input.bytes) {
            return Err(PipelineError::UnsupportedType {
                name: input.name.clone(),
                mime_type: "unrecognized content".to_string(),
            });
        }

        Ok(())
    }

    /// Check if the header bytes match an allow-listed image format.
    fn is_valid_image_header(header: &[u8]) -> bool {
        if header.len() < 4 {
            return false;
        }

        // JPEG: FF D8 FF
        if header[0] == 0xFF && header[1] == 0xD8 && header[2] == 0xFF {
            return true;
        }

        // PNG: 89 50 4E 47
        if header[0] == 0x89 && header[1] == b'P' && header[2] == b'N' && header[3] == b'G' {
            return true;
        }

        // GIF: GIF8
        if header.starts_with(b"GIF8") {
            return true;
        }

        // WebP: RIFF....WEBP
        if header.starts_with(b"RIFF") {
            if header.len() >= 12 {
                return &header[8..12] == b"WEBP";
            }
            return false;
        }

        // BMP: BM
        header[0] == b'B' && header[1] == b'M'
    }
}
