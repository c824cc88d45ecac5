//! Image extraction pipeline components.
//!
//! This module contains all the stages of the extraction pipeline:
//! - **validate**: Pre-run type, size and signature checks
//! - **upload**: Image hosts that produce the reference URL
//! - **source**: Reads the reference copy back
//! - **decode**: Decodes the local image once
//! - **hash**: File facts and content digest
//! - **geometry**: Dimensions, aspect ratio, alpha and preview
//! - **metadata**: EXIF camera, location and technical fields
//! - **colors**: Palette, average color and brightness
//! - **ocr**: Text recognition
//! - **qr**: Code detection
//! - **processor**: Orchestrates one run
//! - **session**: Generation guard against stale runs

pub mod capability;
pub mod colors;
pub mod decode;
pub mod geometry;
pub mod hash;
pub mod input;
pub mod metadata;
pub mod ocr;
pub mod preview;
pub mod processor;
pub mod qr;
pub mod retry;
pub mod session;
pub mod source;
pub mod upload;
pub mod validate;

// Re-exports for convenient access
pub use capability::Capability;
pub use colors::{ColorAnalyzer, PaletteBuilder};
pub use decode::{DecodedImage, ImageDecoder};
pub use hash::Hasher;
pub use input::ImageInput;
pub use metadata::MetadataExtractor;
pub use ocr::{OcrEngine, OcrExtractor, Recognition, TesseractCli};
pub use preview::{PreviewGenerator, PreviewHandle, PreviewRegistry};
pub use processor::{Engines, ImageProcessor, ProcessOptions};
pub use qr::{CodeDetector, QrExtractor, RqrrDetector};
pub use session::{RunTicket, Session};
pub use source::ImageSource;
pub use upload::{ImageHost, ImgbbHost, LocalHost, Uploader};
pub use validate::Validator;
