//! Color analysis: named palette swatches plus average color and brightness.
//!
//! The palette follows the Vibrant approach: pixels are bucketed on a 5-bit
//! per channel grid, the most populous buckets become candidates, and each
//! named target picks the candidate closest to its saturation and luma
//! goals. Targets are filled in a fixed order and a candidate is used at
//! most once.

use image::{DynamicImage, GenericImageView, RgbaImage};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::PipelineError;
use crate::types::{ColorsSection, Field, Swatch};

use super::capability::Capability;

/// Longest edge of the sampling thumbnail used for the palette.
const SAMPLE_EDGE: u32 = 128;

/// Candidate buckets considered when matching targets.
const MAX_CANDIDATES: usize = 64;

/// Pixels with alpha below this are ignored by the palette.
const MIN_ALPHA: u8 = 125;

const WEIGHT_SATURATION: f64 = 3.0;
const WEIGHT_LUMA: f64 = 6.5;
const WEIGHT_POPULATION: f64 = 0.5;

/// A named swatch role and the ranges a candidate must fall in.
#[derive(Debug, Clone, Copy)]
struct Target {
    name: &'static str,
    luma: (f64, f64, f64),
    saturation: (f64, f64, f64),
}

const DARK: (f64, f64, f64) = (0.0, 0.26, 0.45);
const NORMAL: (f64, f64, f64) = (0.3, 0.5, 0.7);
const LIGHT: (f64, f64, f64) = (0.55, 0.74, 1.0);
const VIBRANT: (f64, f64, f64) = (0.35, 1.0, 1.0);
const MUTED: (f64, f64, f64) = (0.0, 0.3, 0.4);

/// Palette order; the first swatch found is reported as dominant.
const TARGETS: [Target; 6] = [
    Target { name: "Vibrant", luma: NORMAL, saturation: VIBRANT },
    Target { name: "Muted", luma: NORMAL, saturation: MUTED },
    Target { name: "DarkVibrant", luma: DARK, saturation: VIBRANT },
    Target { name: "DarkMuted", luma: DARK, saturation: MUTED },
    Target { name: "LightVibrant", luma: LIGHT, saturation: VIBRANT },
    Target { name: "LightMuted", luma: LIGHT, saturation: MUTED },
];

/// One quantized color bucket.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    rgb: [u8; 3],
    population: u32,
    saturation: f64,
    luma: f64,
}

/// Extracts named swatches from a raster.
#[derive(Debug, Clone, Copy, Default)]
pub struct PaletteBuilder;

impl PaletteBuilder {
    pub fn build(&self, image: &DynamicImage) -> Vec<Swatch> {
        let candidates = Self::candidates(image);
        let Some(max_population) = candidates.iter().map(|c| c.population).max() else {
            return Vec::new();
        };

        let mut used = vec![false; candidates.len()];
        let mut palette = Vec::new();
        for target in TARGETS {
            let best = candidates
                .iter()
                .enumerate()
                .filter(|(i, c)| !used[*i] && target.accepts(c))
                .map(|(i, c)| (i, target.score(c, max_population)))
                .max_by(|a, b| a.1.total_cmp(&b.1));

            if let Some((i, _)) = best {
                used[i] = true;
                let c = candidates[i];
                palette.push(Swatch {
                    name: target.name.to_string(),
                    hex: to_hex(c.rgb),
                    rgb: c.rgb,
                    population: c.population,
                });
            }
        }
        palette
    }

    /// Quantize a downsampled copy into the most populous buckets.
    fn candidates(image: &DynamicImage) -> Vec<Candidate> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Vec::new();
        }
        let sample = if width > SAMPLE_EDGE || height > SAMPLE_EDGE {
            image.thumbnail(SAMPLE_EDGE, SAMPLE_EDGE).to_rgba8()
        } else {
            image.to_rgba8()
        };

        // bucket key -> (count, channel sums)
        let mut buckets: HashMap<u16, (u32, [u64; 3])> = HashMap::new();
        for pixel in sample.pixels() {
            let [r, g, b, a] = pixel.0;
            if a < MIN_ALPHA || (r > 250 && g > 250 && b > 250) {
                continue;
            }
            let key = ((r as u16 >> 3) << 10) | ((g as u16 >> 3) << 5) | (b as u16 >> 3);
            let entry = buckets.entry(key).or_insert((0, [0; 3]));
            entry.0 += 1;
            entry.1[0] += r as u64;
            entry.1[1] += g as u64;
            entry.1[2] += b as u64;
        }

        let mut candidates: Vec<Candidate> = buckets
            .into_values()
            .map(|(count, sums)| {
                let n = count as u64;
                let rgb = [
                    (sums[0] / n) as u8,
                    (sums[1] / n) as u8,
                    (sums[2] / n) as u8,
                ];
                let (saturation, luma) = saturation_lightness(rgb);
                Candidate {
                    rgb,
                    population: count,
                    saturation,
                    luma,
                }
            })
            .collect();

        // Stable order for equal populations keeps output deterministic
        candidates.sort_by(|a, b| b.population.cmp(&a.population).then(a.rgb.cmp(&b.rgb)));
        candidates.truncate(MAX_CANDIDATES);
        candidates
    }
}

impl Target {
    fn accepts(&self, c: &Candidate) -> bool {
        (self.luma.0..=self.luma.2).contains(&c.luma)
            && (self.saturation.0..=self.saturation.2).contains(&c.saturation)
    }

    fn score(&self, c: &Candidate, max_population: u32) -> f64 {
        let saturation = 1.0 - (c.saturation - self.saturation.1).abs();
        let luma = 1.0 - (c.luma - self.luma.1).abs();
        let population = c.population as f64 / max_population as f64;
        (saturation * WEIGHT_SATURATION + luma * WEIGHT_LUMA + population * WEIGHT_POPULATION)
            / (WEIGHT_SATURATION + WEIGHT_LUMA + WEIGHT_POPULATION)
    }
}

/// HSL saturation and lightness, both in [0, 1].
fn saturation_lightness(rgb: [u8; 3]) -> (f64, f64) {
    let [r, g, b] = rgb.map(|v| v as f64 / 255.0);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let lightness = (max + min) / 2.0;
    if max == min {
        return (0.0, lightness);
    }
    let delta = max - min;
    let saturation = if lightness > 0.5 {
        delta / (2.0 - max - min)
    } else {
        delta / (max + min)
    };
    (saturation, lightness)
}

fn to_hex(rgb: [u8; 3]) -> String {
    format!("#{:02x}{:02x}{:02x}", rgb[0], rgb[1], rgb[2])
}

/// Per-channel mean over every pixel plus brightness as a 0-100 integer.
///
/// Brightness is the mean over pixels of `(r + g + b) / 3`, scaled to a
/// percentage and rounded.
pub fn scan_raster(raster: &RgbaImage) -> Result<(String, u8), PipelineError> {
    let count = raster.pixels().len() as u64;
    if count == 0 {
        return Err(PipelineError::Decode {
            name: "raster".to_string(),
            message: "empty raster".to_string(),
        });
    }

    let mut sums = [0u64; 3];
    for pixel in raster.pixels() {
        sums[0] += pixel[0] as u64;
        sums[1] += pixel[1] as u64;
        sums[2] += pixel[2] as u64;
    }

    let mean = |sum: u64| (sum as f64 / count as f64).round() as u8;
    let average = format!("rgb({}, {}, {})", mean(sums[0]), mean(sums[1]), mean(sums[2]));

    // sum of per-pixel (r+g+b)/3 equals total/3
    let per_pixel = (sums[0] + sums[1] + sums[2]) as f64 / 3.0 / count as f64;
    let brightness = (per_pixel / 255.0 * 100.0).round().clamp(0.0, 100.0) as u8;
    Ok((average, brightness))
}

/// Builds the `colors` section from the reference raster.
#[derive(Clone)]
pub struct ColorAnalyzer {
    palette: Capability<PaletteBuilder>,
}

impl ColorAnalyzer {
    pub fn new(palette: Capability<PaletteBuilder>) -> Self {
        Self { palette }
    }

    /// Analyze the reference raster.
    ///
    /// `None` means the reference copy could not be read or decoded; the
    /// section is then all defaults. A failed raster scan keeps the palette.
    pub async fn extract(&self, raster: Option<Arc<DynamicImage>>) -> ColorsSection {
        let builder = match self.palette {
            Capability::Available(builder) => builder,
            Capability::Unavailable => return ColorsSection::default(),
        };
        let Some(raster) = raster else {
            return ColorsSection::default();
        };

        let analyzed = tokio::task::spawn_blocking(move || Self::analyze(builder, &raster)).await;
        match analyzed {
            Ok(section) => section,
            Err(e) => {
                tracing::warn!("Color analysis task failed: {e}");
                ColorsSection::default()
            }
        }
    }

    fn analyze(builder: PaletteBuilder, raster: &DynamicImage) -> ColorsSection {
        let palette = builder.build(raster);
        let mut section = ColorsSection {
            dominant_color: palette.first().map(|s| s.hex.clone()).into(),
            total_colors: palette.len(),
            palette,
            ..ColorsSection::default()
        };

        match scan_raster(&raster.to_rgba8()) {
            Ok((average, brightness)) => {
                section.average_color = Field::Value(average);
                section.brightness = Field::Value(brightness);
            }
            Err(e) => tracing::warn!("Raster scan failed: {e}"),
        }
        section
    }
}
