//! Destinations that receive audit entries after they are committed.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;
use tracing::trace;

use super::audit::AuditEntry;

/// Errors from an audit sink.
#[derive(Error, Debug)]
pub enum AuditSinkError {
    #[error("audit sink I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("audit entry serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("audit sink lock poisoned")]
    LockPoisoned,

    #[error("audit sink error: {0}")]
    Backend(String),
}

/// Consumer of audit entries.
///
/// The vault calls `append` once per entry, in sequence order, and only after
/// the snapshot holding that entry was committed.
pub trait AuditSink: Send + Sync {
    fn append(&self, entry: &AuditEntry) -> Result<(), AuditSinkError>;
}

/// Sink that discards every entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullAuditSink;

impl AuditSink for NullAuditSink {
    fn append(&self, _entry: &AuditEntry) -> Result<(), AuditSinkError> {
        Ok(())
    }
}

/// Append-only file with one JSON object per line.
#[derive(Debug)]
pub struct JsonLinesAuditSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonLinesAuditSink {
    /// Open (or create) the log file, creating parent directories as needed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, AuditSinkError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(JsonLinesAuditSink {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for JsonLinesAuditSink {
    fn append(&self, entry: &AuditEntry) -> Result<(), AuditSinkError> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');

        let mut file = self.file.lock().map_err(|_| AuditSinkError::LockPoisoned)?;
        file.write_all(&line)?;
        file.flush()?;
        trace!(sequence = entry.sequence, path = %self.path.display(), "Audit entry written");
        Ok(())
    }
}
