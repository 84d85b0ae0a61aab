//! Machine-readable batch reports in JSON or JSONL.
//!
//! JSONL streams one record per line as images finish. JSON buffers the
//! records and writes a single array when the writer is finished.

use serde::Serialize;
use std::io::{self, Write};

use crate::batch::{BatchSummary, ProgressEvent, ProgressObserver};

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// One JSON array, written at the end
    Json,
    /// One JSON object per line (newline-delimited JSON)
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

/// One line (or array element) of a report.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ReportRecord {
    Image(ProgressEvent),
    Summary(BatchSummary),
}

/// Serializes report records to a writer.
pub struct OutputWriter<W: Write> {
    writer: W,
    format: OutputFormat,
    pending: Vec<serde_json::Value>,
    items_written: usize,
}

impl<W: Write> OutputWriter<W> {
    pub fn new(writer: W, format: OutputFormat) -> Self {
        Self {
            writer,
            format,
            pending: Vec::new(),
            items_written: 0,
        }
    }

    /// Write (JSONL) or buffer (JSON) a single record.
    pub fn write<T: Serialize>(&mut self, item: &T) -> io::Result<()> {
        match self.format {
            OutputFormat::Json => {
                let value = serde_json::to_value(item).map_err(io::Error::other)?;
                self.pending.push(value);
            }
            OutputFormat::JsonLines => {
                serde_json::to_writer(&mut self.writer, item).map_err(io::Error::other)?;
                writeln!(self.writer)?;
                self.writer.flush()?;
            }
        }
        self.items_written += 1;
        Ok(())
    }

    /// Emit anything buffered and flush. JSON output is written as a pretty
    /// array; calling this again writes nothing more.
    pub fn finish(&mut self) -> io::Result<()> {
        if self.format == OutputFormat::Json && !self.pending.is_empty() {
            let items = std::mem::take(&mut self.pending);
            serde_json::to_writer_pretty(&mut self.writer, &items).map_err(io::Error::other)?;
            writeln!(self.writer)?;
        }
        self.writer.flush()
    }

    /// Get the number of records written.
    pub fn items_written(&self) -> usize {
        self.items_written
    }

    /// Consume the writer and return the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> ProgressObserver for OutputWriter<W> {
    fn on_image(&mut self, event: &ProgressEvent) {
        if let Err(e) = self.write(&ReportRecord::Image(event.clone())) {
            tracing::warn!("Failed to write report record: {e}");
        }
    }

    fn on_finish(&mut self, summary: &BatchSummary) {
        let result = self
            .write(&ReportRecord::Summary(summary.clone()))
            .and_then(|_| self.finish());
        if let Err(e) = result {
            tracing::warn!("Failed to write report summary: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::RunCounts;
    use crate::types::Outcome;
    use std::path::PathBuf;
    use std::time::Duration;

    fn event(index: usize, outcome: Outcome) -> ProgressEvent {
        ProgressEvent {
            index,
            total: 2,
            image: PathBuf::from(format!("/photos/{index}.jpg")),
            outcome,
            detail: "cat, hat".to_string(),
            counts: RunCounts::default(),
        }
    }

    fn summary() -> BatchSummary {
        BatchSummary {
            completed: 1,
            skipped: 1,
            failed: 0,
            retagged: 0,
            total: 2,
            attempted: 2,
            cancelled: false,
            elapsed: Duration::from_secs(1),
        }
    }

    #[test]
    fn test_jsonl_streams_one_record_per_line() {
        let mut writer = OutputWriter::new(Vec::new(), OutputFormat::JsonLines);
        writer.on_image(&event(1, Outcome::Completed));
        writer.on_image(&event(2, Outcome::Skipped));
        writer.on_finish(&summary());

        let output = String::from_utf8(writer.into_inner()).unwrap();
        let lines: Vec<serde_json::Value> = output
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["type"], "image");
        assert_eq!(lines[1]["outcome"], "skipped");
        assert_eq!(lines[2]["type"], "summary");
        assert_eq!(lines[2]["completed"], 1);
    }

    #[test]
    fn test_json_writes_single_array_on_finish() {
        let mut writer = OutputWriter::new(Vec::new(), OutputFormat::Json);
        writer.on_image(&event(1, Outcome::Completed));
        assert_eq!(writer.items_written(), 1);
        writer.on_finish(&summary());
        writer.finish().unwrap();

        let output = String::from_utf8(writer.into_inner()).unwrap();
        let parsed: Vec<serde_json::Value> = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0]["index"], 1);
        assert_eq!(parsed[1]["type"], "summary");
    }

    #[test]
    fn test_json_without_records_writes_nothing() {
        let mut writer = OutputWriter::new(Vec::new(), OutputFormat::Json);
        writer.finish().unwrap();
        assert!(writer.into_inner().is_empty());
    }

    #[test]
    fn test_format_parse() {
        assert_eq!(OutputFormat::parse("json"), Some(OutputFormat::Json));
        assert_eq!(OutputFormat::parse("jsonl"), Some(OutputFormat::JsonLines));
        assert_eq!(OutputFormat::parse("JSONL"), Some(OutputFormat::JsonLines));
        assert_eq!(OutputFormat::parse("invalid"), None);
    }
}
