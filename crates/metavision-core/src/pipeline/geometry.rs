//! Pixel geometry: dimensions, aspect ratio and alpha presence.

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};

use crate::types::{AlphaChannel, Field, ImageSection};

use super::decode::DecodedImage;
use super::preview::{PreviewGenerator, PreviewHandle};

/// Builds the `image` section from an already-decoded raster.
pub struct GeometryExtractor;

impl GeometryExtractor {
    /// Extract geometry and register a preview.
    ///
    /// The preview handle is returned separately so the caller can hand its
    /// ownership to the record.
    pub fn extract(
        decoded: &DecodedImage,
        previews: &PreviewGenerator,
    ) -> (ImageSection, Option<PreviewHandle>) {
        let preview = previews.create(&decoded.image);
        let section = ImageSection {
            width: Field::Value(decoded.width),
            height: Field::Value(decoded.height),
            aspect_ratio: aspect_ratio(decoded.width, decoded.height).into(),
            has_alpha: probe_alpha(&decoded.image),
            preview_url: preview.as_ref().map(|p| p.url().to_string()).into(),
        };
        (section, preview)
    }
}

/// Width over height with two decimals, e.g. "1.78".
pub fn aspect_ratio(width: u32, height: u32) -> Option<String> {
    if height == 0 {
        return None;
    }
    Some(format!("{:.2}", width as f64 / height as f64))
}

/// Check whether a representative pixel is less than fully opaque.
///
/// The whole image is averaged down to one pixel; formats without an alpha
/// channel are opaque by construction.
pub fn probe_alpha(image: &DynamicImage) -> AlphaChannel {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return AlphaChannel::Unknown;
    }
    if !image.color().has_alpha() {
        return AlphaChannel::No;
    }
    let pixel = image.resize_exact(1, 1, FilterType::Triangle).to_rgba8();
    if pixel.get_pixel(0, 0)[3] < u8::MAX {
        AlphaChannel::Yes
    } else {
        AlphaChannel::No
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PreviewConfig;
    use crate::pipeline::preview::PreviewRegistry;
    use image::{ImageFormat, Rgba, RgbaImage};

    fn decoded(image: DynamicImage) -> DecodedImage {
        let (width, height) = image.dimensions();
        DecodedImage {
            image,
            format: ImageFormat::Png,
            width,
            height,
        }
    }

    #[test]
    fn test_aspect_ratio_two_decimals() {
        assert_eq!(aspect_ratio(1920, 1080).as_deref(), Some("1.78"));
        assert_eq!(aspect_ratio(100, 100).as_deref(), Some("1.00"));
        assert_eq!(aspect_ratio(10, 0), None);
    }

    #[test]
    fn test_alpha_detection() {
        assert_eq!(probe_alpha(&DynamicImage::new_rgb8(4, 4)), AlphaChannel::No);

        let opaque = RgbaImage::from_pixel(4, 4, Rgba([9, 9, 9, 255]));
        assert_eq!(probe_alpha(&DynamicImage::ImageRgba8(opaque)), AlphaChannel::No);

        let translucent = RgbaImage::from_pixel(4, 4, Rgba([9, 9, 9, 10]));
        assert_eq!(
            probe_alpha(&DynamicImage::ImageRgba8(translucent)),
            AlphaChannel::Yes
        );
    }

    #[test]
    fn test_extract_fills_section_and_preview() {
        let previews = PreviewGenerator::new(PreviewConfig::default(), PreviewRegistry::new());
        let (section, handle) = GeometryExtractor::extract(
            &decoded(DynamicImage::new_rgba8(300, 200)),
            &previews,
        );
        assert_eq!(section.width, Field::Value(300));
        assert_eq!(section.height, Field::Value(200));
        assert_eq!(section.aspect_ratio.value().unwrap(), "1.50");
        assert_eq!(section.has_alpha, AlphaChannel::Yes);
        let handle = handle.unwrap();
        assert_eq!(section.preview_url.value().unwrap(), handle.url());
    }

    #[test]
    fn test_extract_without_preview() {
        let previews = PreviewGenerator::new(
            PreviewConfig {
                enabled: false,
                size: 64,
            },
            PreviewRegistry::new(),
        );
        let (section, handle) =
            GeometryExtractor::extract(&decoded(DynamicImage::new_rgb8(3, 3)), &previews);
        assert!(handle.is_none());
        assert_eq!(section.preview_url, Field::NotAvailable);
    }
}
