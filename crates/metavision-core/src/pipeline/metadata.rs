//! EXIF metadata extraction: camera, location and technical sections.

use chrono::NaiveDateTime;
use exif::{Exif, In, Reader, Tag, Value};
use std::io::Cursor;

use crate::types::{
    CameraSection, Field, FlashState, LocationSection, TechnicalSection,
};

use super::capability::Capability;
use super::input::ImageInput;

/// The three sections derived from embedded metadata.
#[derive(Debug, Clone, Default)]
pub struct ExifSections {
    pub camera: CameraSection,
    pub location: LocationSection,
    pub technical: TechnicalSection,
}

/// Extracts EXIF metadata from raw image bytes.
pub struct MetadataExtractor {
    reader: Capability<Reader>,
}

impl MetadataExtractor {
    pub fn new(reader: Capability<Reader>) -> Self {
        Self { reader }
    }

    /// Extractor backed by kamadak-exif.
    pub fn available() -> Self {
        Self::new(Capability::Available(Reader::new()))
    }

    /// Parse every IFD (primary, thumbnail, EXIF, GPS, interop) in one pass.
    ///
    /// Never fails: a missing parser, missing EXIF block or parse error all
    /// yield the default triple of sections with `has_gps = false`.
    pub fn extract(&self, input: &ImageInput) -> ExifSections {
        let reader = match &self.reader {
            Capability::Available(reader) => reader,
            Capability::Unavailable => return ExifSections::default(),
        };

        let mut cursor = Cursor::new(&input.bytes[..]);
        match reader.read_from_container(&mut cursor) {
            Ok(exif) => Self::from_exif(&exif),
            Err(exif::Error::NotFound(_)) => {
                tracing::debug!("No EXIF data in {}", input.name);
                ExifSections::default()
            }
            Err(e) => {
                tracing::warn!("EXIF extraction failed for {}: {e}", input.name);
                ExifSections::default()
            }
        }
    }

    /// Derive all three sections from parsed EXIF.
    pub fn from_exif(exif: &Exif) -> ExifSections {
        let camera = CameraSection {
            make: get_string(exif, Tag::Make).into(),
            model: get_string(exif, Tag::Model).into(),
            lens: get_string(exif, Tag::LensModel).into(),
            exposure_time: get_f64(exif, Tag::ExposureTime)
                .and_then(format_exposure)
                .into(),
            iso: get_u32(exif, Tag::PhotographicSensitivity).into(),
            aperture: get_f64(exif, Tag::FNumber).map(|f| format!("f/{f}")).into(),
            focal_length: get_f64(exif, Tag::FocalLength)
                .map(|f| format!("{f}mm"))
                .into(),
            flash: get_u32(exif, Tag::Flash).map(flash_state).into(),
            software: get_string(exif, Tag::Software).into(),
            capture_date: get_string(exif, Tag::DateTimeOriginal)
                .map(|s| format_capture_date(&s))
                .into(),
        };

        let location = LocationSection::from_coordinates(
            get_gps_coord(exif, Tag::GPSLatitude, Tag::GPSLatitudeRef),
            get_gps_coord(exif, Tag::GPSLongitude, Tag::GPSLongitudeRef),
            get_altitude(exif),
        );

        let technical = TechnicalSection {
            orientation: get_u32(exif, Tag::Orientation).into(),
            color_space: get_u32(exif, Tag::ColorSpace).map(color_space_label).into(),
            compression: get_u32(exif, Tag::Compression).into(),
            x_resolution: get_f64(exif, Tag::XResolution)
                .map(|r| format!("{r} dpi"))
                .into(),
            y_resolution: get_f64(exif, Tag::YResolution)
                .map(|r| format!("{r} dpi"))
                .into(),
        };

        ExifSections {
            camera,
            location,
            technical,
        }
    }
}

/// `1/x` seconds with the reciprocal rounded to the nearest integer.
///
/// `0.01` → "1/100s", `0.0005` → "1/2000s". Zero or non-finite exposure is
/// treated as absent.
pub fn format_exposure(seconds: f64) -> Option<String> {
    if !(seconds.is_finite() && seconds > 0.0) {
        return None;
    }
    Some(format!("1/{}s", (1.0 / seconds).round() as u64))
}

/// Bit 0 of the Flash tag records whether the flash fired.
pub fn flash_state(raw: u32) -> FlashState {
    if raw & 1 == 1 {
        FlashState::Fired
    } else {
        FlashState::NotFired
    }
}

/// ColorSpace 1 is sRGB; anything else (e.g. 65535 "uncalibrated") passes through.
pub fn color_space_label(raw: u32) -> String {
    if raw == 1 {
        "sRGB".to_string()
    } else {
        raw.to_string()
    }
}

/// Render an EXIF "YYYY:MM:DD HH:MM:SS" timestamp; unparseable values pass through.
pub fn format_capture_date(raw: &str) -> String {
    NaiveDateTime::parse_from_str(raw, "%Y:%m:%d %H:%M:%S")
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|_| raw.to_string())
}

/// Look a tag up in the primary IFD, falling back to the thumbnail IFD.
fn get_field(exif: &Exif, tag: Tag) -> Option<&exif::Field> {
    exif.get_field(tag, In::PRIMARY)
        .or_else(|| exif.get_field(tag, In::THUMBNAIL))
}

/// Get a string field, trimmed of NUL padding and whitespace.
fn get_string(exif: &Exif, tag: Tag) -> Option<String> {
    match &get_field(exif, tag)?.value {
        Value::Ascii(parts) => {
            let first = parts.first()?;
            let s = String::from_utf8_lossy(first)
                .trim_matches(|c: char| c == '\0' || c.is_whitespace())
                .to_string();
            (!s.is_empty()).then_some(s)
        }
        _ => None,
    }
}

/// Get an unsigned integer field (BYTE, SHORT or LONG).
fn get_u32(exif: &Exif, tag: Tag) -> Option<u32> {
    get_field(exif, tag)?.value.get_uint(0)
}

/// Get a rational field as a float.
fn get_f64(exif: &Exif, tag: Tag) -> Option<f64> {
    match &get_field(exif, tag)?.value {
        Value::Rational(v) => v.first().map(|r| r.to_f64()),
        Value::SRational(v) => v.first().map(|r| r.to_f64()),
        _ => None,
    }
    .filter(|f| f.is_finite())
}

/// Get GPS coordinate, converting from degrees/minutes/seconds to decimal.
fn get_gps_coord(exif: &Exif, coord_tag: Tag, ref_tag: Tag) -> Option<f64> {
    let coord = get_field(exif, coord_tag)?;
    let degrees = parse_gps_rationals(&coord.value)?;

    // Missing reference is read as N/E
    let negative = get_string(exif, ref_tag)
        .map(|r| r.contains('S') || r.contains('W'))
        .unwrap_or(false);

    Some(if negative { -degrees } else { degrees })
}

/// Parse GPS rationals (degrees, minutes, seconds) to decimal degrees.
fn parse_gps_rationals(value: &Value) -> Option<f64> {
    match value {
        Value::Rational(rationals) if rationals.len() >= 3 => {
            let degrees = rationals[0].to_f64();
            let minutes = rationals[1].to_f64();
            let seconds = rationals[2].to_f64();
            let decimal = degrees + minutes / 60.0 + seconds / 3600.0;
            decimal.is_finite().then_some(decimal)
        }
        _ => None,
    }
}

/// Altitude in meters; GPSAltitudeRef 1 means below sea level.
fn get_altitude(exif: &Exif) -> Option<f64> {
    let altitude = get_f64(exif, Tag::GPSAltitude)?;
    let below = get_u32(exif, Tag::GPSAltitudeRef) == Some(1);
    Some(if below { -altitude } else { altitude })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::input::fixtures;
    use exif::experimental::Writer;
    use exif::Rational;

    fn field(tag: Tag, value: Value) -> exif::Field {
        exif::Field {
            tag,
            ifd_num: In::PRIMARY,
            value,
        }
    }

    fn ascii(s: &str) -> Value {
        Value::Ascii(vec![s.as_bytes().to_vec()])
    }

    fn rational(num: u32, denom: u32) -> Value {
        Value::Rational(vec![Rational { num, denom }])
    }

    fn dms(d: u32, m: u32, s_num: u32, s_denom: u32) -> Value {
        Value::Rational(vec![
            Rational { num: d, denom: 1 },
            Rational { num: m, denom: 1 },
            Rational {
                num: s_num,
                denom: s_denom,
            },
        ])
    }

    /// Serialize fields to a TIFF blob and parse it back.
    fn parse(fields: &[exif::Field]) -> Exif {
        let mut writer = Writer::new();
        for f in fields {
            writer.push_field(f);
        }
        let mut buf = Cursor::new(Vec::new());
        writer.write(&mut buf, false).unwrap();
        Reader::new().read_raw(buf.into_inner()).unwrap()
    }

    #[test]
    fn test_format_exposure() {
        assert_eq!(format_exposure(0.01).as_deref(), Some("1/100s"));
        assert_eq!(format_exposure(0.0005).as_deref(), Some("1/2000s"));
        assert_eq!(format_exposure(1.0 / 3.0).as_deref(), Some("1/3s"));
        assert_eq!(format_exposure(0.0), None);
        assert_eq!(format_exposure(f64::NAN), None);
    }

    #[test]
    fn test_color_space_label() {
        assert_eq!(color_space_label(1), "sRGB");
        assert_eq!(color_space_label(65535), "65535");
    }

    #[test]
    fn test_flash_state() {
        assert_eq!(flash_state(0x0), FlashState::NotFired);
        assert_eq!(flash_state(0x10), FlashState::NotFired);
        assert_eq!(flash_state(0x19), FlashState::Fired);
    }

    #[test]
    fn test_capture_date() {
        assert_eq!(format_capture_date("2023:06:15 14:30:05"), "2023-06-15 14:30:05");
        assert_eq!(format_capture_date("garbage"), "garbage");
    }

    #[test]
    fn test_camera_fields_from_exif() {
        let exif = parse(&[
            field(Tag::Make, ascii("Canon")),
            field(Tag::Model, ascii("EOS R5")),
            field(Tag::ExposureTime, rational(1, 100)),
            field(Tag::FNumber, rational(28, 10)),
            field(Tag::FocalLength, rational(50, 1)),
            field(Tag::PhotographicSensitivity, Value::Short(vec![400])),
            field(Tag::Flash, Value::Short(vec![0x10])),
            field(Tag::DateTimeOriginal, ascii("2023:06:15 14:30:05")),
            field(Tag::ColorSpace, Value::Short(vec![1])),
            field(Tag::Orientation, Value::Short(vec![6])),
            field(Tag::XResolution, rational(72, 1)),
        ]);
        let sections = MetadataExtractor::from_exif(&exif);

        let camera = sections.camera;
        assert_eq!(camera.make.value().unwrap(), "Canon");
        assert_eq!(camera.model.value().unwrap(), "EOS R5");
        assert_eq!(camera.exposure_time.value().unwrap(), "1/100s");
        assert_eq!(camera.aperture.value().unwrap(), "f/2.8");
        assert_eq!(camera.focal_length.value().unwrap(), "50mm");
        assert_eq!(camera.iso, Field::Value(400));
        assert_eq!(camera.flash, Field::Value(FlashState::NotFired));
        assert_eq!(camera.capture_date.value().unwrap(), "2023-06-15 14:30:05");
        assert_eq!(camera.lens, Field::NotAvailable);
        assert_eq!(camera.software, Field::NotAvailable);

        let technical = sections.technical;
        assert_eq!(technical.color_space.value().unwrap(), "sRGB");
        assert_eq!(technical.orientation, Field::Value(6));
        assert_eq!(technical.x_resolution.value().unwrap(), "72 dpi");
        assert_eq!(technical.y_resolution, Field::NotAvailable);

        assert!(!sections.location.has_gps);
    }

    #[test]
    fn test_gps_from_exif() {
        let exif = parse(&[
            field(Tag::GPSLatitudeRef, ascii("S")),
            field(Tag::GPSLatitude, dms(33, 51, 3540, 100)),
            field(Tag::GPSLongitudeRef, ascii("E")),
            field(Tag::GPSLongitude, dms(151, 12, 5400, 100)),
            field(Tag::GPSAltitudeRef, Value::Byte(vec![0])),
            field(Tag::GPSAltitude, rational(58, 1)),
        ]);
        let location = MetadataExtractor::from_exif(&exif).location;

        assert!(location.has_gps);
        assert_eq!(location.latitude.value().unwrap(), "-33.859833");
        assert_eq!(location.longitude.value().unwrap(), "151.215000");
        assert_eq!(location.altitude.value().unwrap(), "58m");
    }

    #[test]
    fn test_lone_latitude_is_not_gps() {
        let exif = parse(&[
            field(Tag::GPSLatitudeRef, ascii("N")),
            field(Tag::GPSLatitude, dms(10, 0, 0, 1)),
        ]);
        let location = MetadataExtractor::from_exif(&exif).location;
        assert!(!location.has_gps);
        assert_eq!(location.latitude, Field::NotAvailable);
        assert_eq!(location.longitude, Field::NotAvailable);
        assert_eq!(location.altitude, Field::NotAvailable);
    }

    #[test]
    fn test_png_without_exif_yields_defaults() {
        let input = fixtures::solid_png("plain.png", 2, 2, [0, 0, 0, 255]);
        let sections = MetadataExtractor::available().extract(&input);
        assert!(!sections.location.has_gps);
        assert_eq!(sections.camera.make, Field::NotAvailable);
        assert_eq!(sections.technical.orientation, Field::NotAvailable);
    }

    #[test]
    fn test_unavailable_parser_yields_defaults() {
        let input = ImageInput::new("x.jpg", "image/jpeg", vec![0xFF, 0xD8, 0xFF], None);
        let sections = MetadataExtractor::new(Capability::Unavailable).extract(&input);
        assert_eq!(sections.camera.exposure_time, Field::NotAvailable);
        assert!(!sections.location.has_gps);
    }

    #[test]
    fn test_corrupt_data_yields_defaults() {
        let input = ImageInput::new("bad.jpg", "image/jpeg", vec![0xFF, 0xD8, 0xFF, 0xE1, 0, 4, b'E'], None);
        let sections = MetadataExtractor::available().extract(&input);
        assert_eq!(sections.camera.make, Field::NotAvailable);
    }
}
