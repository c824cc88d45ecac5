//! File identity facts: size, type, modification time and content digest.

use chrono::{DateTime, Local};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::time::SystemTime;

use crate::error::PipelineError;
use crate::types::{Field, FileSection};

use super::input::ImageInput;

/// Bytes hashed per update; keeps large inputs from being hashed in one call.
const CHUNK_SIZE: usize = 64 * 1024;

/// Computes the `file` section of the record.
pub struct Hasher;

impl Hasher {
    /// Extract file facts for an input.
    ///
    /// Name, size, type and timestamp come from data already in hand. The
    /// digest runs off the async executor; if it fails, only `sha256_hash`
    /// falls back to "N/A".
    pub async fn extract(input: &ImageInput) -> FileSection {
        let bytes = input.bytes.clone();
        let digest = match tokio::task::spawn_blocking(move || Self::content_hash(&bytes[..])).await
        {
            Ok(Ok(hex)) => Field::Value(hex),
            Ok(Err(e)) => {
                tracing::warn!("Digest failed for {}: {e}", input.name);
                Field::NotAvailable
            }
            Err(e) => {
                tracing::warn!("Digest task failed for {}: {e}", input.name);
                Field::NotAvailable
            }
        };

        FileSection {
            filename: Field::Value(input.name.clone()),
            file_size: Field::Value(format_bytes(input.size())),
            mime_type: Field::Value(input.mime_type.clone()),
            last_modified: input.last_modified.map(format_timestamp).into(),
            sha256_hash: digest,
        }
    }

    /// SHA-256 of a byte stream as 64 lowercase hex characters.
    ///
    /// Depends only on content: the same bytes under another name or
    /// timestamp produce the same digest.
    pub fn content_hash<R: Read>(mut reader: R) -> Result<String, PipelineError> {
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; CHUNK_SIZE];
        loop {
            let bytes_read = reader.read(&mut buffer).map_err(|e| PipelineError::Metadata {
                name: "digest".to_string(),
                message: e.to_string(),
            })?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }
        Ok(Self::to_hex(hasher))
    }

    /// SHA-256 of an in-memory buffer.
    pub fn content_hash_from_bytes(data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Self::to_hex(hasher)
    }

    fn to_hex(hasher: Sha256) -> String {
        hasher
            .finalize()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }
}

/// Format a byte count with binary units, trimming trailing zeros.
///
/// `0` → "0 Bytes", `1536` → "1.5 KB", `1048576` → "1 MB".
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    let mut exponent = 0;
    while exponent < UNITS.len() - 1 && bytes >= 1024u64.pow(exponent as u32 + 1) {
        exponent += 1;
    }
    let value = bytes as f64 / 1024u64.pow(exponent as u32) as f64;
    let rounded = (value * 100.0).round() / 100.0;
    format!("{} {}", rounded, UNITS[exponent])
}

/// Render a modification time in local time.
pub fn format_timestamp(time: SystemTime) -> String {
    let local: DateTime<Local> = time.into();
    local.format("%Y-%m-%d %H:%M:%S").to_string()
}
