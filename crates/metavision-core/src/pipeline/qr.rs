//! Machine-readable code detection on the decoded local raster.

use image::{DynamicImage, GrayImage};
use std::sync::Arc;

use crate::error::PipelineError;
use crate::types::CodeFields;

use super::capability::Capability;

/// A decoded code and its top-left corner in pixel coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedCode {
    pub payload: String,
    pub top_left: (i32, i32),
}

/// Locates and decodes a code in a greyscale raster.
pub trait CodeDetector: Send + Sync {
    /// Return the first decodable code, or `None`.
    fn detect(&self, raster: &GrayImage) -> Result<Option<DetectedCode>, PipelineError>;
}

/// QR detection backed by rqrr.
#[derive(Debug, Clone, Copy, Default)]
pub struct RqrrDetector;

impl CodeDetector for RqrrDetector {
    fn detect(&self, raster: &GrayImage) -> Result<Option<DetectedCode>, PipelineError> {
        let (width, height) = raster.dimensions();
        let mut prepared =
            rqrr::PreparedImage::prepare_from_greyscale(width as usize, height as usize, |x, y| {
                raster.get_pixel(x as u32, y as u32)[0]
            });

        for grid in prepared.detect_grids() {
            match grid.decode() {
                Ok((_, payload)) => {
                    let corner = grid.bounds[0];
                    return Ok(Some(DetectedCode {
                        payload,
                        top_left: (corner.x, corner.y),
                    }));
                }
                // A finder pattern that doesn't decode is not a code
                Err(e) => tracing::debug!("Skipping undecodable grid: {e}"),
            }
        }
        Ok(None)
    }
}

/// Fills the code half of the `text` section.
#[derive(Clone)]
pub struct QrExtractor {
    detector: Capability<Arc<dyn CodeDetector>>,
}

impl QrExtractor {
    pub fn new(detector: Capability<Arc<dyn CodeDetector>>) -> Self {
        Self { detector }
    }

    /// Scan the local raster. `None` means the image could not be decoded.
    pub async fn extract(&self, raster: Option<Arc<DynamicImage>>) -> CodeFields {
        let detector = match &self.detector {
            Capability::Available(detector) => detector.clone(),
            Capability::Unavailable => return CodeFields::not_loaded(),
        };
        let Some(raster) = raster else {
            return CodeFields::failed();
        };

        let scanned =
            tokio::task::spawn_blocking(move || detector.detect(&raster.to_luma8())).await;
        match scanned {
            Ok(Ok(Some(code))) => CodeFields::found(code.payload, code.top_left.0, code.top_left.1),
            Ok(Ok(None)) => CodeFields::none_found(),
            Ok(Err(e)) => {
                tracing::warn!("Code detection failed: {e}");
                CodeFields::failed()
            }
            Err(e) => {
                tracing::warn!("Code detection task failed: {e}");
                CodeFields::failed()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{sentinel, Field};

    struct FixedDetector(Result<Option<DetectedCode>, String>);

    impl CodeDetector for FixedDetector {
        fn detect(&self, _raster: &GrayImage) -> Result<Option<DetectedCode>, PipelineError> {
            self.0
                .clone()
                .map_err(|message| PipelineError::CodeDetection { message })
        }
    }

    fn with(result: Result<Option<DetectedCode>, String>) -> QrExtractor {
        QrExtractor::new(Capability::Available(Arc::new(FixedDetector(result))))
    }

    fn raster() -> Option<Arc<DynamicImage>> {
        Some(Arc::new(DynamicImage::new_luma8(16, 16)))
    }

    #[test]
    fn test_rqrr_blank_image_has_no_code() {
        let blank = GrayImage::from_pixel(64, 64, image::Luma([255]));
        assert_eq!(RqrrDetector.detect(&blank).unwrap(), None);
    }

    #[tokio::test]
    async fn test_found_code_reports_payload_and_corner() {
        let fields = with(Ok(Some(DetectedCode {
            payload: "https://example.test".to_string(),
            top_left: (12, 34),
        })))
        .extract(raster())
        .await;
        assert_eq!(fields.qr_code, "https://example.test");
        assert_eq!(fields.qr_location, Field::Value("(12, 34)".to_string()));
    }

    #[tokio::test]
    async fn test_no_code_sentinel() {
        let fields = with(Ok(None)).extract(raster()).await;
        assert_eq!(fields.qr_code, sentinel::NO_CODE);
        assert_eq!(fields.qr_location, Field::NotAvailable);
    }

    #[tokio::test]
    async fn test_detector_error_and_missing_raster_fail() {
        assert_eq!(
            with(Err("bad".to_string())).extract(raster()).await,
            CodeFields::failed()
        );
        assert_eq!(with(Ok(None)).extract(None).await, CodeFields::failed());
    }

    #[tokio::test]
    async fn test_unavailable_detector() {
        let fields = QrExtractor::new(Capability::Unavailable).extract(raster()).await;
        assert_eq!(fields.qr_code, sentinel::QR_NOT_LOADED);
    }
}
