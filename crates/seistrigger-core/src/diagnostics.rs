//! Per-sample diagnostic traces
//!
//! A trace row carries every intermediate value of the chain for one sample
//! so two runs can be compared offline. Traces are CSV with a header row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use thiserror::Error;

/// Errors raised while writing or reading traces
#[derive(Error, Debug)]
pub enum DiagnosticsError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Intermediate values of one processed sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticRecord {
    pub sample_index: u64,
    pub timestamp: DateTime<Utc>,
    pub raw: f64,
    pub filtered: f64,
    pub sta: f64,
    pub lta: f64,
    pub ratio: f64,
}

/// CSV trace writer
pub struct DiagnosticWriter<W: Write> {
    writer: csv::Writer<W>,
    written: u64,
}

impl DiagnosticWriter<File> {
    /// Create (or truncate) a trace file
    pub fn create(path: &Path) -> Result<Self, DiagnosticsError> {
        let file = File::create(path)?;
        tracing::debug!(path = %path.display(), "Diagnostic trace opened");
        Ok(Self::new(file))
    }
}

impl<W: Write> DiagnosticWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(inner),
            written: 0,
        }
    }

    /// Append one record; the header is written before the first one
    pub fn write(&mut self, record: &DiagnosticRecord) -> Result<(), DiagnosticsError> {
        self.writer.serialize(record)?;
        self.written += 1;
        Ok(())
    }

    /// Records written so far
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn flush(&mut self) -> Result<(), DiagnosticsError> {
        self.writer.flush()?;
        Ok(())
    }

    /// Flush and return the underlying writer
    pub fn into_inner(self) -> Result<W, DiagnosticsError> {
        self.writer
            .into_inner()
            .map_err(|e| DiagnosticsError::Io(e.into_error()))
    }
}

/// Read every record of a trace
pub fn read_records<R: Read>(reader: R) -> Result<Vec<DiagnosticRecord>, DiagnosticsError> {
    csv::Reader::from_reader(reader)
        .deserialize()
        .map(|row| row.map_err(DiagnosticsError::from))
        .collect()
}

/// Read every record of a trace file
pub fn read_records_from_path(path: &Path) -> Result<Vec<DiagnosticRecord>, DiagnosticsError> {
    read_records(File::open(path)?)
}
