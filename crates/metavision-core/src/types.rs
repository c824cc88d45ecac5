//! Core data types for the MetaVision extraction pipeline.
//!
//! The [`MetadataRecord`] is the only artifact a run produces. It has a fixed
//! shape: all seven sections are always present and every field is always
//! serialized, with [`Field::NotAvailable`] standing in for missing data.

use serde::{Serialize, Serializer};

use crate::pipeline::preview::PreviewHandle;

/// Placeholder values written in place of missing data.
pub mod sentinel {
    /// Generic "no data" marker used by every section.
    pub const NOT_AVAILABLE: &str = "N/A";
    /// Alpha detection could not decode a representative pixel.
    pub const UNKNOWN: &str = "Unknown";
    /// OCR ran and recognized nothing.
    pub const NO_TEXT: &str = "No text detected";
    /// OCR engine is not available.
    pub const OCR_NOT_LOADED: &str = "OCR library not loaded";
    /// OCR engine was available but failed.
    pub const OCR_FAILED: &str = "OCR failed";
    /// Detector ran and found no code.
    pub const NO_CODE: &str = "No QR code detected";
    /// Code detector is not available.
    pub const QR_NOT_LOADED: &str = "QR scanner not loaded";
    /// Raster for code detection could not be produced.
    pub const QR_FAILED: &str = "QR detection failed";
}

/// A single metadata value, or the "not available" sentinel.
///
/// Serializes as the inner value, or as `"N/A"` when absent, so consumers
/// never need to branch on a missing key.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Field<T> {
    Value(T),
    #[default]
    NotAvailable,
}

impl<T> Field<T> {
    /// Borrow the value if present.
    pub fn value(&self) -> Option<&T> {
        match self {
            Field::Value(v) => Some(v),
            Field::NotAvailable => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Field::Value(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Field<U> {
        match self {
            Field::Value(v) => Field::Value(f(v)),
            Field::NotAvailable => Field::NotAvailable,
        }
    }
}

impl<T> From<Option<T>> for Field<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Field::Value(v),
            None => Field::NotAvailable,
        }
    }
}

impl<T: Serialize> Serialize for Field<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Field::Value(v) => v.serialize(serializer),
            Field::NotAvailable => serializer.serialize_str(sentinel::NOT_AVAILABLE),
        }
    }
}

/// File identity facts.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FileSection {
    pub filename: Field<String>,
    /// Human-readable size, e.g. "1.5 MB"
    pub file_size: Field<String>,
    pub mime_type: Field<String>,
    pub last_modified: Field<String>,
    /// SHA-256 of the full byte stream, lowercase hex
    pub sha256_hash: Field<String>,
}

/// Result of probing a representative pixel for transparency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlphaChannel {
    Yes,
    No,
    #[default]
    Unknown,
}

impl Serialize for AlphaChannel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(match self {
            AlphaChannel::Yes => "Yes",
            AlphaChannel::No => "No",
            AlphaChannel::Unknown => sentinel::UNKNOWN,
        })
    }
}

/// Pixel geometry of the decoded image.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImageSection {
    pub width: Field<u32>,
    pub height: Field<u32>,
    /// Width over height, two decimals
    pub aspect_ratio: Field<String>,
    pub has_alpha: AlphaChannel,
    /// Opaque handle URL of the registered preview
    pub preview_url: Field<String>,
}

/// Flash indicator as recorded by the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashState {
    Fired,
    NotFired,
}

impl Serialize for FlashState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(match self {
            FlashState::Fired => "Fired",
            FlashState::NotFired => "Not Fired",
        })
    }
}

/// Camera and exposure fields.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CameraSection {
    pub make: Field<String>,
    pub model: Field<String>,
    pub lens: Field<String>,
    /// "1/<x>s"
    pub exposure_time: Field<String>,
    pub iso: Field<u32>,
    /// "f/<FNumber>"
    pub aperture: Field<String>,
    /// "<value>mm"
    pub focal_length: Field<String>,
    pub flash: Field<FlashState>,
    pub software: Field<String>,
    pub capture_date: Field<String>,
}

/// GPS location. Coordinates are either both present or both absent.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LocationSection {
    pub latitude: Field<String>,
    pub longitude: Field<String>,
    pub altitude: Field<String>,
    pub has_gps: bool,
}

impl LocationSection {
    /// Build the section from decimal degrees.
    ///
    /// A lone latitude or longitude is discarded along with the altitude:
    /// location is reported only when both coordinates resolve.
    pub fn from_coordinates(
        latitude: Option<f64>,
        longitude: Option<f64>,
        altitude: Option<f64>,
    ) -> Self {
        match (latitude, longitude) {
            (Some(lat), Some(lon)) => Self {
                latitude: Field::Value(format!("{lat:.6}")),
                longitude: Field::Value(format!("{lon:.6}")),
                altitude: altitude.map(|a| format!("{a}m")).into(),
                has_gps: true,
            },
            _ => Self::default(),
        }
    }
}

/// One named palette entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Swatch {
    /// Palette role, e.g. "Vibrant" or "DarkMuted"
    pub name: String,
    /// "#rrggbb"
    pub hex: String,
    pub rgb: [u8; 3],
    /// Number of sampled pixels that fell into this color
    pub population: u32,
}

/// Palette and average color summary.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ColorsSection {
    pub palette: Vec<Swatch>,
    /// Hex of the first palette entry
    pub dominant_color: Field<String>,
    pub total_colors: usize,
    /// "rgb(r, g, b)"
    pub average_color: Field<String>,
    /// Mean pixel brightness, 0 to 100
    pub brightness: Field<u8>,
}

/// Recognized text plus the code detector's payload.
#[derive(Debug, Clone, Serialize)]
pub struct TextSection {
    pub ocr_text: String,
    /// "<n>%"
    pub confidence: Field<String>,
    pub word_count: usize,
    pub qr_code: String,
    /// "(x, y)" of the top-left corner
    pub qr_location: Field<String>,
}

impl TextSection {
    /// Merge the OCR half and the code detector half into one section.
    pub fn new(ocr: OcrFields, code: CodeFields) -> Self {
        Self {
            ocr_text: ocr.ocr_text,
            confidence: ocr.confidence,
            word_count: ocr.word_count,
            qr_code: code.qr_code,
            qr_location: code.qr_location,
        }
    }
}

impl Default for TextSection {
    fn default() -> Self {
        Self::new(OcrFields::not_loaded(), CodeFields::not_loaded())
    }
}

/// The OCR-owned fields of the `text` section.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrFields {
    pub ocr_text: String,
    pub confidence: Field<String>,
    pub word_count: usize,
}

impl OcrFields {
    pub fn not_loaded() -> Self {
        Self {
            ocr_text: sentinel::OCR_NOT_LOADED.to_string(),
            confidence: Field::NotAvailable,
            word_count: 0,
        }
    }

    pub fn failed() -> Self {
        Self {
            ocr_text: sentinel::OCR_FAILED.to_string(),
            confidence: Field::NotAvailable,
            word_count: 0,
        }
    }
}

/// The code-detector-owned fields of the `text` section.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeFields {
    pub qr_code: String,
    pub qr_location: Field<String>,
}

impl CodeFields {
    pub fn found(payload: String, x: i32, y: i32) -> Self {
        Self {
            qr_code: payload,
            qr_location: Field::Value(format!("({x}, {y})")),
        }
    }

    pub fn none_found() -> Self {
        Self::sentinel(sentinel::NO_CODE)
    }

    pub fn not_loaded() -> Self {
        Self::sentinel(sentinel::QR_NOT_LOADED)
    }

    pub fn failed() -> Self {
        Self::sentinel(sentinel::QR_FAILED)
    }

    fn sentinel(text: &str) -> Self {
        Self {
            qr_code: text.to_string(),
            qr_location: Field::NotAvailable,
        }
    }
}

/// Technical encoding details from EXIF.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TechnicalSection {
    pub orientation: Field<u32>,
    /// "sRGB" for value 1, otherwise the raw number
    pub color_space: Field<String>,
    pub compression: Field<u32>,
    pub x_resolution: Field<String>,
    pub y_resolution: Field<String>,
}

/// The complete output of one extraction run.
///
/// Created with every section defaulted, filled section by section by the
/// orchestrator, and replaced wholesale when a new run commits. The record
/// owns its preview handle; dropping the record releases the preview.
#[derive(Debug, Default, Serialize)]
pub struct MetadataRecord {
    pub file: FileSection,
    pub image: ImageSection,
    pub camera: CameraSection,
    pub location: LocationSection,
    pub colors: ColorsSection,
    pub text: TextSection,
    pub technical: TechnicalSection,

    /// Run generation that produced this record
    #[serde(skip)]
    pub generation: u64,

    #[serde(skip)]
    pub preview: Option<PreviewHandle>,
}

/// Section names in export order.
pub const SECTION_NAMES: [&str; 7] = [
    "file",
    "image",
    "camera",
    "location",
    "colors",
    "text",
    "technical",
];
