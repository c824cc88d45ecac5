//! Text recognition over the reference copy of the image.

use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::PipelineError;
use crate::types::{sentinel, Field, OcrFields};

use super::capability::Capability;

/// Raw result of one recognition call.
#[derive(Debug, Clone, PartialEq)]
pub struct Recognition {
    /// Recognized text, lines separated by `\n`
    pub text: String,
    /// Mean word confidence, 0 to 100
    pub confidence: f64,
    pub word_count: usize,
}

/// A text recognition engine.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Engine name, used in logs.
    fn name(&self) -> &str;

    /// Recognize text in an encoded image.
    async fn recognize(&self, image: &[u8]) -> Result<Recognition, PipelineError>;
}

/// Fills the OCR half of the `text` section.
#[derive(Clone)]
pub struct OcrExtractor {
    engine: Capability<Arc<dyn OcrEngine>>,
    timeout: Duration,
}

impl OcrExtractor {
    pub fn new(engine: Capability<Arc<dyn OcrEngine>>, timeout_ms: u64) -> Self {
        Self {
            engine,
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    /// Recognize text in the reference image.
    ///
    /// `None` means the reference copy could not be read, which counts as a
    /// failed run when an engine is loaded.
    pub async fn extract(&self, reference: Option<Arc<[u8]>>) -> OcrFields {
        let engine = match &self.engine {
            Capability::Available(engine) => engine,
            Capability::Unavailable => return OcrFields::not_loaded(),
        };
        let Some(image) = reference else {
            tracing::warn!("OCR skipped: reference image unavailable");
            return OcrFields::failed();
        };

        match tokio::time::timeout(self.timeout, engine.recognize(&image)).await {
            Ok(Ok(recognition)) => Self::to_fields(recognition),
            Ok(Err(e)) => {
                tracing::warn!("OCR via {} failed: {e}", engine.name());
                OcrFields::failed()
            }
            Err(_) => {
                tracing::warn!(
                    "OCR via {} timed out after {}ms",
                    engine.name(),
                    self.timeout.as_millis()
                );
                OcrFields::failed()
            }
        }
    }

    fn to_fields(recognition: Recognition) -> OcrFields {
        let confidence = Field::Value(format!("{}%", recognition.confidence.round() as i64));
        let text = recognition.text.trim();
        if text.is_empty() {
            return OcrFields {
                ocr_text: sentinel::NO_TEXT.to_string(),
                confidence,
                word_count: 0,
            };
        }
        OcrFields {
            ocr_text: text.to_string(),
            confidence,
            word_count: recognition.word_count,
        }
    }
}

/// Tesseract driven through its command-line interface.
///
/// The image is piped on stdin and word-level TSV is read from stdout.
pub struct TesseractCli {
    binary: String,
    language: String,
}

impl TesseractCli {
    pub fn new(binary: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            language: language.into(),
        }
    }

    /// Probe for the binary. Returns `None` if it cannot be executed.
    pub async fn detect(binary: &str, language: &str) -> Option<Self> {
        let status = Command::new(binary)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        match status {
            Ok(s) if s.success() => Some(Self::new(binary, language)),
            Ok(s) => {
                tracing::debug!("{binary} --version exited with {s}");
                None
            }
            Err(e) => {
                tracing::debug!("Tesseract not found at {binary}: {e}");
                None
            }
        }
    }
}

#[async_trait]
impl OcrEngine for TesseractCli {
    fn name(&self) -> &str {
        "tesseract"
    }

    async fn recognize(&self, image: &[u8]) -> Result<Recognition, PipelineError> {
        let mut child = Command::new(&self.binary)
            .args(["stdin", "stdout", "-l", &self.language, "tsv"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ocr_error(format!("cannot start {}: {e}", self.binary)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(image)
                .await
                .map_err(|e| ocr_error(format!("cannot write image: {e}")))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ocr_error(e.to_string()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ocr_error(format!(
                "{} exited with {}: {}",
                self.binary,
                output.status,
                stderr.trim()
            )));
        }

        Ok(parse_tsv(&String::from_utf8_lossy(&output.stdout)))
    }
}

fn ocr_error(message: String) -> PipelineError {
    PipelineError::Ocr { message }
}

/// Word rows in Tesseract TSV output have level 5.
const WORD_LEVEL: &str = "5";

/// Rebuild text and confidence from Tesseract TSV.
///
/// Columns: level, page, block, paragraph, line, word, left, top, width,
/// height, conf, text.
pub fn parse_tsv(tsv: &str) -> Recognition {
    let mut lines: Vec<((u32, u32, u32, u32), Vec<&str>)> = Vec::new();
    let mut confidence_sum = 0.0;
    let mut word_count = 0;

    for row in tsv.lines().skip(1) {
        let cols: Vec<&str> = row.split('\t').collect();
        if cols.len() < 12 || cols[0] != WORD_LEVEL {
            continue;
        }
        let word = cols[11].trim();
        if word.is_empty() {
            continue;
        }
        let key = (
            cols[1].parse().unwrap_or(0),
            cols[2].parse().unwrap_or(0),
            cols[3].parse().unwrap_or(0),
            cols[4].parse().unwrap_or(0),
        );
        match lines.last_mut() {
            Some((last, words)) if *last == key => words.push(word),
            _ => lines.push((key, vec![word])),
        }
        confidence_sum += cols[10].parse::<f64>().unwrap_or(0.0).max(0.0);
        word_count += 1;
    }

    let text = lines
        .iter()
        .map(|(_, words)| words.join(" "))
        .collect::<Vec<_>>()
        .join("\n");
    let confidence = if word_count == 0 {
        0.0
    } else {
        confidence_sum / word_count as f64
    };

    Recognition {
        text,
        confidence,
        word_count,
    }
}
