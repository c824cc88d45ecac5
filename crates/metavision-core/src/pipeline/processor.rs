//! Pipeline orchestration - wires together all extraction stages.

use image::DynamicImage;
use std::sync::Arc;
use std::time::Instant;

use crate::config::{Config, ExtractorConfig};
use crate::error::PipelineError;
use crate::types::{MetadataRecord, TextSection};

use super::capability::Capability;
use super::colors::{ColorAnalyzer, PaletteBuilder};
use super::decode::{DecodedImage, ImageDecoder};
use super::geometry::GeometryExtractor;
use super::hash::Hasher;
use super::input::ImageInput;
use super::metadata::{ExifSections, MetadataExtractor};
use super::ocr::{OcrEngine, OcrExtractor, TesseractCli};
use super::preview::{PreviewGenerator, PreviewRegistry};
use super::qr::{CodeDetector, QrExtractor, RqrrDetector};
use super::source::ImageSource;
use super::validate::Validator;

/// Options for switching stages off for one processor.
#[derive(Debug, Clone, Default)]
pub struct ProcessOptions {
    /// Skip preview generation
    pub skip_preview: bool,
    /// Skip EXIF parsing
    pub skip_exif: bool,
    /// Skip palette and average color
    pub skip_palette: bool,
    /// Skip text recognition
    pub skip_ocr: bool,
    /// Skip code detection
    pub skip_qr: bool,
}

/// The optional engines behind each extractor.
pub struct Engines {
    pub exif: Capability<exif::Reader>,
    pub palette: Capability<PaletteBuilder>,
    pub ocr: Capability<Arc<dyn OcrEngine>>,
    pub qr: Capability<Arc<dyn CodeDetector>>,
}

impl Engines {
    /// Load every engine enabled by config and options.
    ///
    /// Tesseract is probed on the PATH; if it is missing OCR is reported as
    /// not loaded rather than failing.
    pub async fn detect(config: &ExtractorConfig, options: &ProcessOptions) -> Self {
        let ocr = if config.ocr && !options.skip_ocr {
            TesseractCli::detect(&config.tesseract_path, &config.ocr_language)
                .await
                .map(|engine| Arc::new(engine) as Arc<dyn OcrEngine>)
                .into()
        } else {
            Capability::Unavailable
        };
        if !ocr.is_available() && config.ocr && !options.skip_ocr {
            tracing::info!("OCR engine not found at '{}'", config.tesseract_path);
        }

        Self {
            exif: Capability::when(config.exif && !options.skip_exif, exif::Reader::new),
            palette: Capability::when(config.palette && !options.skip_palette, || PaletteBuilder),
            ocr,
            qr: Capability::when(config.qr && !options.skip_qr, || {
                Arc::new(RqrrDetector) as Arc<dyn CodeDetector>
            }),
        }
    }

    /// No optional engine at all.
    pub fn none() -> Self {
        Self {
            exif: Capability::Unavailable,
            palette: Capability::Unavailable,
            ocr: Capability::Unavailable,
            qr: Capability::Unavailable,
        }
    }
}

/// The image processor that orchestrates one extraction run.
pub struct ImageProcessor {
    validator: Validator,
    decoder: ImageDecoder,
    source: ImageSource,
    previews: PreviewGenerator,
    metadata: MetadataExtractor,
    colors: ColorAnalyzer,
    ocr: OcrExtractor,
    qr: QrExtractor,
}

impl ImageProcessor {
    /// Create a processor with engines detected from the environment.
    pub async fn new(config: &Config, options: &ProcessOptions, registry: PreviewRegistry) -> Self {
        let engines = Engines::detect(&config.extractors, options).await;
        Self::with_engines(config, options, registry, engines)
    }

    /// Create a processor with explicitly provided engines.
    pub fn with_engines(
        config: &Config,
        options: &ProcessOptions,
        registry: PreviewRegistry,
        engines: Engines,
    ) -> Self {
        let mut preview = config.preview.clone();
        preview.enabled &= !options.skip_preview;

        Self {
            validator: Validator::new(config.limits.clone()),
            decoder: ImageDecoder::new(config.limits.clone()),
            source: ImageSource::new(&config.limits),
            previews: PreviewGenerator::new(preview, registry),
            metadata: MetadataExtractor::new(engines.exif),
            colors: ColorAnalyzer::new(engines.palette),
            ocr: OcrExtractor::new(engines.ocr, config.limits.ocr_timeout_ms),
            qr: QrExtractor::new(engines.qr),
        }
    }

    /// Check type, size and signature before anything else runs.
    pub fn validate(&self, input: &ImageInput) -> Result<(), PipelineError> {
        self.validator.validate(input)
    }

    /// Run every stage and assemble the record.
    ///
    /// Never fails: each stage absorbs its own errors and contributes its
    /// default section instead. The local image is decoded once and the
    /// raster is shared by geometry, code detection and, when the reference
    /// copy is byte-identical, color analysis.
    pub async fn extract(&self, input: &ImageInput, reference_url: &str) -> MetadataRecord {
        let start = Instant::now();
        tracing::debug!("Extracting: {} (reference {reference_url})", input.name);

        // Independent stages: file facts, local decode, reference fetch
        let (file, decoded, reference) = tokio::join!(
            Hasher::extract(input),
            self.decode_local(input),
            self.fetch_reference(reference_url),
        );
        tracing::trace!("  File/decode/fetch: {:?}", start.elapsed());

        let Some(decoded) = decoded else {
            // Only file facts survive; OCR still reads the reference copy
            let ocr = self.ocr.extract(reference).await;
            return MetadataRecord {
                file,
                text: TextSection::new(ocr, self.qr.extract(None).await),
                ..MetadataRecord::default()
            };
        };

        let (image, preview) = GeometryExtractor::extract(&decoded, &self.previews);
        let ExifSections {
            camera,
            location,
            technical,
        } = self.metadata.extract(input);
        tracing::trace!("  Geometry/EXIF: {:?}", start.elapsed());

        let local = Arc::new(decoded.image);
        let color_raster = self.color_raster(input, &local, reference.clone(), reference_url);

        let (colors, ocr, code) = tokio::join!(
            async { self.colors.extract(color_raster.await).await },
            self.ocr.extract(reference),
            self.qr.extract(Some(local.clone())),
        );

        tracing::debug!(
            "Extracted {} in {:?} ({}x{})",
            input.name,
            start.elapsed(),
            decoded.width,
            decoded.height
        );

        MetadataRecord {
            file,
            image,
            camera,
            location,
            colors,
            text: TextSection::new(ocr, code),
            technical,
            generation: 0,
            preview,
        }
    }

    async fn decode_local(&self, input: &ImageInput) -> Option<DecodedImage> {
        match self.decoder.decode(input.bytes.clone(), &input.name).await {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                tracing::warn!("{e}");
                None
            }
        }
    }

    async fn fetch_reference(&self, url: &str) -> Option<Arc<[u8]>> {
        match self.source.fetch(url).await {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                tracing::warn!("{e}");
                None
            }
        }
    }

    /// Raster for color analysis: the local one when the reference copy is
    /// byte-identical, otherwise a decode of the reference bytes.
    async fn color_raster(
        &self,
        input: &ImageInput,
        local: &Arc<DynamicImage>,
        reference: Option<Arc<[u8]>>,
        reference_url: &str,
    ) -> Option<Arc<DynamicImage>> {
        let bytes = reference?;
        if bytes[..] == input.bytes[..] {
            return Some(local.clone());
        }
        match self.decoder.decode(bytes, reference_url).await {
            Ok(decoded) => Some(Arc::new(decoded.image)),
            Err(e) => {
                tracing::warn!("{e}");
                None
            }
        }
    }
}
