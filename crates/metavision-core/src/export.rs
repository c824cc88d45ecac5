//! Export of finished records as JSON or JSON Lines.
//!
//! Records are only ever read here. The single-record export is the
//! pretty-printed document a user copies or downloads; [`OutputWriter`]
//! streams several records when more than one image is processed.

use chrono::Utc;
use serde::Serialize;
use std::io::{self, Write};

use crate::types::MetadataRecord;

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// One JSON document (an array when several records are written)
    Json,
    /// One compact record per line
    JsonLines,
}

impl OutputFormat {
    /// Parse format from string (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(Self::Json),
            "jsonl" | "jsonlines" | "ndjson" => Some(Self::JsonLines),
            _ => None,
        }
    }
}

/// Pretty-printed JSON of one record, with all seven sections.
pub fn to_json(record: &MetadataRecord) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(record)
}

/// Suggested download name: `metadata_<unix millis>.json`.
pub fn export_file_name() -> String {
    format!("metadata_{}.json", Utc::now().timestamp_millis())
}

/// Writes records as they complete.
///
/// JSON Lines output is flushed line by line. JSON output buffers nothing:
/// a single record is written as an object, several as an array via
/// [`OutputWriter::write_all`].
pub struct OutputWriter<W: Write> {
    writer: W,
    format: OutputFormat,
    pretty: bool,
    items_written: usize,
}

impl<W: Write> OutputWriter<W> {
    /// `pretty` only affects JSON; JSON Lines is always compact.
    pub fn new(writer: W, format: OutputFormat, pretty: bool) -> Self {
        Self {
            writer,
            format,
            pretty,
            items_written: 0,
        }
    }

    /// Write a single record.
    pub fn write<T: Serialize>(&mut self, item: &T) -> io::Result<()> {
        match self.format {
            OutputFormat::Json if self.pretty => {
                serde_json::to_writer_pretty(&mut self.writer, item).map_err(io::Error::other)?
            }
            OutputFormat::Json | OutputFormat::JsonLines => {
                serde_json::to_writer(&mut self.writer, item).map_err(io::Error::other)?
            }
        }
        writeln!(self.writer)?;
        if self.format == OutputFormat::JsonLines {
            self.writer.flush()?;
        }
        self.items_written += 1;
        Ok(())
    }

    /// Write several records: an array for JSON, one line each for JSON Lines.
    pub fn write_all<T: Serialize>(&mut self, items: &[T]) -> io::Result<()> {
        match self.format {
            OutputFormat::Json => {
                if self.pretty {
                    serde_json::to_writer_pretty(&mut self.writer, items)
                        .map_err(io::Error::other)?;
                } else {
                    serde_json::to_writer(&mut self.writer, items).map_err(io::Error::other)?;
                }
                writeln!(self.writer)?;
                self.items_written += items.len();
            }
            OutputFormat::JsonLines => {
                for item in items {
                    self.write(item)?;
                }
            }
        }
        Ok(())
    }

    /// Get the number of records written.
    pub fn items_written(&self) -> usize {
        self.items_written
    }

    /// Flush the underlying writer.
    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}
