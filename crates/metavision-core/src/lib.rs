//! MetaVision Core - Embeddable image metadata extraction library.
//!
//! MetaVision takes a single image and produces one structured record with
//! seven sections: file facts, image geometry, camera settings, location,
//! color analysis, recognized text and detected codes, plus technical
//! details. Optional engines (EXIF, palette, OCR, QR) degrade to sentinel
//! values when they are unavailable.
//!
//! # Architecture
//!
//! ```text
//! Validate → Upload → ┬ Hash
//!                     ├ Decode → Geometry → EXIF
//!                     └ Fetch reference → ┬ Colors
//!                                         ├ OCR
//!                                         └ QR → MetadataRecord
//! ```
//!
//! The [`offline`] module holds the versioned response cache that keeps the
//! hosting application usable without a network.
//!
//! # Usage
//!
//! ```rust,ignore
//! use metavision_core::{Config, ImageInput, MetaVision, ProcessOptions};
//!
//! #[tokio::main]
//! async fn main() -> metavision_core::Result<()> {
//!     let config = Config::load()?;
//!     let mv = MetaVision::new(config, &ProcessOptions::default()).await;
//!
//!     let input = ImageInput::from_path("./photo.jpg".as_ref(), &mv.config().limits).await?;
//!     if let Some(record) = mv.process(&input, None).await? {
//!         println!("{}", metavision_core::export::to_json(&record)?);
//!     }
//!     Ok(())
//! }
//! ```

// Module declarations
pub mod config;
pub mod error;
pub mod export;
pub mod offline;
pub mod pipeline;
pub mod types;

use std::sync::Arc;

// Re-exports for convenient access
pub use config::Config;
pub use error::{
    CacheError, CacheResult, ConfigError, MetaVisionError, PipelineError, PipelineResult, Result,
};
pub use export::{OutputFormat, OutputWriter};
pub use pipeline::{ImageInput, ImageProcessor, PreviewRegistry, ProcessOptions, Session, Uploader};
pub use types::{Field, MetadataRecord};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// MetaVision extractor - the main entry point for processing images.
///
/// Owns the processor, the optional image host and the session that
/// decides which run's record is current.
pub struct MetaVision {
    config: Config,
    processor: ImageProcessor,
    uploader: Option<Uploader>,
    session: Session,
    previews: PreviewRegistry,
}

impl MetaVision {
    /// Create an extractor with engines detected from the environment.
    pub async fn new(config: Config, options: &ProcessOptions) -> Self {
        tracing::debug!("Initializing MetaVision v{}", VERSION);
        let previews = PreviewRegistry::new();
        let processor = ImageProcessor::new(&config, options, previews.clone()).await;
        Self::with_processor(config, processor, previews)
    }

    /// Create an extractor around an existing processor.
    pub fn with_processor(config: Config, processor: ImageProcessor, previews: PreviewRegistry) -> Self {
        Self {
            config,
            processor,
            uploader: None,
            session: Session::new(),
            previews,
        }
    }

    /// Use `uploader` to produce reference URLs.
    pub fn with_uploader(mut self, uploader: Uploader) -> Self {
        self.uploader = Some(uploader);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn previews(&self) -> &PreviewRegistry {
        &self.previews
    }

    /// Run the whole pipeline for one image.
    ///
    /// Validation and upload failures abort the run. When `reference_url` is
    /// `None` the image is uploaded first. Returns `Ok(None)` if another run
    /// started before this one finished.
    pub async fn process(
        &self,
        input: &ImageInput,
        reference_url: Option<&str>,
    ) -> PipelineResult<Option<Arc<MetadataRecord>>> {
        self.processor.validate(input)?;
        let ticket = self.session.begin();

        let reference = match reference_url {
            Some(url) => url.to_string(),
            None => {
                let uploader = self.uploader.as_ref().ok_or_else(|| PipelineError::Upload {
                    message: "no image host configured".to_string(),
                    status_code: None,
                })?;
                uploader.upload(input).await?
            }
        };

        if !self.session.is_current(ticket) {
            tracing::debug!("Run for {} superseded before extraction", input.name);
            return Ok(None);
        }

        let record = self.processor.extract(input, &reference).await;
        if self.session.commit(ticket, record) {
            Ok(self.session.current())
        } else {
            Ok(None)
        }
    }

    /// Drop the current record and supersede any run in flight.
    pub fn reset(&self) {
        self.session.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::input::fixtures;
    use crate::pipeline::{Engines, ImageHost, LocalHost};
    use async_trait::async_trait;
    use std::time::Duration;

    /// Stages locally after a delay.
    struct SlowHost {
        inner: LocalHost,
        delay: Duration,
    }

    #[async_trait]
    impl ImageHost for SlowHost {
        fn name(&self) -> &str {
            "slow"
        }

        async fn upload(&self, input: &ImageInput) -> PipelineResult<String> {
            tokio::time::sleep(self.delay).await;
            self.inner.upload(input).await
        }
    }

    fn metavision(host: Option<SlowHost>) -> MetaVision {
        let config = Config::default();
        let previews = PreviewRegistry::new();
        let processor = ImageProcessor::with_engines(
            &config,
            &ProcessOptions::default(),
            previews.clone(),
            Engines::none(),
        );
        let mv = MetaVision::with_processor(config.clone(), processor, previews);
        match host {
            Some(host) => mv.with_uploader(Uploader::new(Arc::new(host), &config.upload)),
            None => mv,
        }
    }

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[tokio::test]
    async fn test_process_uploads_then_commits() {
        let dir = tempfile::tempdir().unwrap();
        let mv = metavision(Some(SlowHost {
            inner: LocalHost::new(dir.path()),
            delay: Duration::ZERO,
        }));
        let input = fixtures::solid_png("photo.png", 8, 6, [10, 20, 30, 255]);

        let record = mv.process(&input, None).await.unwrap().unwrap();
        assert_eq!(record.file.filename.value().unwrap(), "photo.png");
        assert_eq!(record.image.width, Field::Value(8));
        assert_eq!(record.generation, 1);
        assert!(Arc::ptr_eq(&record, &mv.session().current().unwrap()));
        assert_eq!(mv.previews().live_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_host_is_upload_error() {
        let mv = metavision(None);
        let input = fixtures::solid_png("photo.png", 2, 2, [0, 0, 0, 255]);
        let err = mv.process(&input, None).await.unwrap_err();
        assert!(matches!(err, PipelineError::Upload { .. }));
    }

    #[tokio::test]
    async fn test_invalid_input_never_starts_a_run() {
        let mv = metavision(None);
        let input = ImageInput::new("notes.txt", "text/plain", b"hello".to_vec(), None);
        let err = mv.process(&input, Some("file:///unused")).await.unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedType { .. }));
        assert!(mv.session().current().is_none());
    }

    #[tokio::test]
    async fn test_newer_run_supersedes_slow_one() {
        let dir = tempfile::tempdir().unwrap();
        let mv = Arc::new(metavision(Some(SlowHost {
            inner: LocalHost::new(dir.path()),
            delay: Duration::from_millis(300),
        })));

        let slow = {
            let mv = mv.clone();
            tokio::spawn(async move {
                let input = fixtures::solid_png("first.png", 4, 4, [255, 0, 0, 255]);
                mv.process(&input, None).await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let second = fixtures::solid_png("second.png", 4, 4, [0, 255, 0, 255]);
        let url = LocalHost::new(dir.path()).upload(&second).await.unwrap();
        let record = mv.process(&second, Some(&url)).await.unwrap().unwrap();
        assert_eq!(record.file.filename.value().unwrap(), "second.png");

        assert!(slow.await.unwrap().unwrap().is_none());
        let current = mv.session().current().unwrap();
        assert_eq!(current.file.filename.value().unwrap(), "second.png");
    }

    #[tokio::test]
    async fn test_reset_clears_record_and_preview() {
        let dir = tempfile::tempdir().unwrap();
        let mv = metavision(None);
        let input = fixtures::solid_png("photo.png", 4, 4, [0, 0, 0, 255]);
        let url = LocalHost::new(dir.path()).upload(&input).await.unwrap();

        mv.process(&input, Some(&url)).await.unwrap().unwrap();
        assert_eq!(mv.previews().live_count(), 1);
        mv.reset();
        assert!(mv.session().current().is_none());
        assert_eq!(mv.previews().live_count(), 0);
    }
}
