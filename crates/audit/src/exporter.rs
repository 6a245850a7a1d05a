//! An optional durable mirror for audit entries.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use thiserror::Error;

use superego_core::AuditEntry;

/// Failure raised by an [`AuditExporter`].
#[derive(Debug, Error)]
pub enum ExportError {
    /// Underlying I/O failure.
    #[error("audit export io error: {0}")]
    Io(#[from] std::io::Error),
    /// Serialization failure.
    #[error("audit export serialize error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// A pluggable destination that mirrors audit entries to durable storage.
/// The in-memory ring in [`crate::AuditSink`] is always authoritative for
/// `recent`/`stats`; an exporter is a write-only side channel.
pub trait AuditExporter: Send + Sync {
    /// Persist one entry. Errors are logged by the caller, never
    /// propagated back into the evaluation path.
    fn export(&self, entry: &AuditEntry) -> Result<(), ExportError>;
}

/// A reference [`AuditExporter`] that appends one JSON object per line to
/// a file, adapted from the teacher's append-only event log.
pub struct JsonlAuditExporter {
    file: Mutex<File>,
}

impl JsonlAuditExporter {
    /// Open (creating if necessary) a JSONL file at `path` for appending.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ExportError> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file: Mutex::new(file) })
    }
}

impl AuditExporter for JsonlAuditExporter {
    fn export(&self, entry: &AuditEntry) -> Result<(), ExportError> {
        let line = serde_json::to_string(entry)?;
        let mut file = self.file.lock().expect("audit exporter mutex poisoned");
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        file.flush()?;
        Ok(())
    }
}
