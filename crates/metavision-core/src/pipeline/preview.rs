//! Transient previews: WebP thumbnails behind revocable handles.
//!
//! A [`PreviewHandle`] is owned by exactly one record. Dropping it revokes
//! the preview, so replacing or resetting the record releases the preview
//! exactly once.

use image::{DynamicImage, ImageFormat};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::PreviewConfig;

/// URL scheme prefix for registered previews.
const PREVIEW_URL_PREFIX: &str = "blob:metavision/";

#[derive(Default)]
struct RegistryInner {
    next_id: AtomicU64,
    entries: Mutex<HashMap<u64, Arc<[u8]>>>,
}

/// Process-wide table of live previews.
#[derive(Clone, Default)]
pub struct PreviewRegistry {
    inner: Arc<RegistryInner>,
}

impl PreviewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register encoded preview bytes and hand out the owning handle.
    pub fn register(&self, bytes: Vec<u8>) -> PreviewHandle {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        if let Ok(mut entries) = self.inner.entries.lock() {
            entries.insert(id, bytes.into());
        }
        PreviewHandle {
            id,
            url: format!("{PREVIEW_URL_PREFIX}{id}"),
            registry: self.inner.clone(),
        }
    }

    /// Look up a live preview by its URL.
    pub fn get(&self, url: &str) -> Option<Arc<[u8]>> {
        let id: u64 = url.strip_prefix(PREVIEW_URL_PREFIX)?.parse().ok()?;
        self.inner.entries.lock().ok()?.get(&id).cloned()
    }

    /// Number of previews not yet released.
    pub fn live_count(&self) -> usize {
        self.inner.entries.lock().map(|e| e.len()).unwrap_or(0)
    }
}

/// Owning reference to a registered preview. Revoked on drop.
pub struct PreviewHandle {
    id: u64,
    url: String,
    registry: Arc<RegistryInner>,
}

impl PreviewHandle {
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl std::fmt::Debug for PreviewHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreviewHandle").field("url", &self.url).finish()
    }
}

impl Drop for PreviewHandle {
    fn drop(&mut self) {
        if let Ok(mut entries) = self.registry.entries.lock() {
            if entries.remove(&self.id).is_some() {
                tracing::trace!("Released preview {}", self.url);
            }
        }
    }
}

/// Generates previews from decoded images.
#[derive(Clone)]
pub struct PreviewGenerator {
    config: PreviewConfig,
    registry: PreviewRegistry,
}

impl PreviewGenerator {
    pub fn new(config: PreviewConfig, registry: PreviewRegistry) -> Self {
        Self { config, registry }
    }

    /// Encode a thumbnail and register it.
    ///
    /// Returns `None` if previews are disabled or encoding fails.
    pub fn create(&self, image: &DynamicImage) -> Option<PreviewHandle> {
        let bytes = self.generate_bytes(image)?;
        Some(self.registry.register(bytes))
    }

    /// Encode a WebP thumbnail (longest edge = configured size).
    pub fn generate_bytes(&self, image: &DynamicImage) -> Option<Vec<u8>> {
        if !self.config.enabled {
            return None;
        }

        // The WebP encoder only takes 8-bit RGB(A)
        let thumbnail = DynamicImage::ImageRgba8(
            image.thumbnail(self.config.size, self.config.size).to_rgba8(),
        );

        let mut buffer = Cursor::new(Vec::new());
        if let Err(e) = thumbnail.write_to(&mut buffer, ImageFormat::WebP) {
            tracing::warn!("Preview encoding failed: {e}");
            return None;
        }
        Some(buffer.into_inner())
    }

    pub fn registry(&self) -> &PreviewRegistry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generator(enabled: bool) -> PreviewGenerator {
        PreviewGenerator::new(
            PreviewConfig { enabled, size: 64 },
            PreviewRegistry::new(),
        )
    }

    #[test]
    fn test_preview_is_webp() {
        let bytes = generator(true)
            .generate_bytes(&DynamicImage::new_rgb8(200, 100))
            .unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WEBP");
    }

    #[test]
    fn test_disabled_generates_nothing() {
        assert!(generator(false)
            .create(&DynamicImage::new_rgb8(10, 10))
            .is_none());
    }

    #[test]
    fn test_handle_released_exactly_once_on_drop() {
        let gen = generator(true);
        let handle = gen.create(&DynamicImage::new_luma8(20, 20)).unwrap();
        let url = handle.url().to_string();
        assert!(url.starts_with(PREVIEW_URL_PREFIX));
        assert_eq!(gen.registry().live_count(), 1);
        assert!(gen.registry().get(&url).is_some());

        drop(handle);
        assert_eq!(gen.registry().live_count(), 0);
        assert!(gen.registry().get(&url).is_none());
    }

    #[test]
    fn test_handles_are_unique() {
        let registry = PreviewRegistry::new();
        let a = registry.register(vec![1]);
        let b = registry.register(vec![2]);
        assert_ne!(a.url(), b.url());
        drop(a);
        assert_eq!(registry.live_count(), 1);
        assert_eq!(&*registry.get(b.url()).unwrap(), &[2]);
    }
}
