//! Snapshot persistence.
//!
//! The vault only sees the [`SnapshotStore`] trait. Two implementations ship
//! with the crate: [`FileSnapshotStore`] (JSON on disk, atomic replace) and
//! [`MemorySnapshotStore`].

use std::fs;
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Deserialize;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use super::snapshot::{CURRENT_FORMAT_VERSION, VaultSnapshot};

/// Suffix appended to the snapshot path for the previous-generation copy.
const BACKUP_SUFFIX: &str = ".backup";

/// Errors from loading or saving a snapshot.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("IO error for '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to serialize snapshot: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The stored snapshot is unreadable or violates ledger invariants.
    #[error("Corrupt snapshot at '{path}': {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("Unsupported snapshot format version {found} (expected {expected})")]
    UnsupportedFormat { found: u32, expected: u32 },

    /// Failure reported by a custom store implementation.
    #[error("Snapshot store error: {0}")]
    Backend(String),

    #[error("Snapshot store lock poisoned")]
    LockPoisoned,
}

impl PersistenceError {
    fn io(path: &Path, source: io::Error) -> Self {
        PersistenceError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Loads and atomically replaces whole vault snapshots.
///
/// After a successful `save`, the next `load` must return exactly that
/// snapshot; after a failed `save`, it must return the previous one. Partial
/// writes must never be observable.
pub trait SnapshotStore: Send + Sync {
    /// Load the last committed snapshot, or `None` if nothing was ever saved.
    fn load(&self) -> Result<Option<VaultSnapshot>, PersistenceError>;

    /// Durably replace the stored snapshot.
    fn save(&self, snapshot: &VaultSnapshot) -> Result<(), PersistenceError>;
}

/// Snapshot stored as a single JSON file.
///
/// Writes go to a temporary file in the same directory, are fsynced, and are
/// then renamed over the target, so readers see either the old or the new
/// snapshot. On unix the file is created with mode `0600`.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    path: PathBuf,
    keep_backup: bool,
}

#[derive(Deserialize)]
struct FormatProbe {
    format_version: u32,
}

impl FileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileSnapshotStore {
            path: path.into(),
            keep_backup: true,
        }
    }

    /// Whether to copy the previous snapshot to `<path>.backup` before replacing it.
    #[must_use]
    pub fn with_backup(mut self, keep_backup: bool) -> Self {
        self.keep_backup = keep_backup;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backup_path(&self) -> PathBuf {
        let mut path = self.path.as_os_str().to_owned();
        path.push(BACKUP_SUFFIX);
        PathBuf::from(path)
    }

    fn parent_dir(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    fn corrupt(&self, reason: impl ToString) -> PersistenceError {
        PersistenceError::Corrupt {
            path: self.path.clone(),
            reason: reason.to_string(),
        }
    }

    fn write_backup(&self) {
        if !self.keep_backup || !self.path.exists() {
            return;
        }
        let backup = self.backup_path();
        if let Err(e) = fs::copy(&self.path, &backup) {
            warn!(path = %backup.display(), error = %e, "Failed to write snapshot backup");
        }
    }
}

impl SnapshotStore for FileSnapshotStore {
    #[instrument(level = "debug", skip(self), fields(path = %self.path.display()))]
    fn load(&self) -> Result<Option<VaultSnapshot>, PersistenceError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No snapshot on disk");
                return Ok(None);
            }
            Err(e) => return Err(PersistenceError::io(&self.path, e)),
        };

        let probe: FormatProbe = serde_json::from_slice(&bytes).map_err(|e| self.corrupt(e))?;
        if probe.format_version != CURRENT_FORMAT_VERSION {
            return Err(PersistenceError::UnsupportedFormat {
                found: probe.format_version,
                expected: CURRENT_FORMAT_VERSION,
            });
        }

        let snapshot: VaultSnapshot =
            serde_json::from_slice(&bytes).map_err(|e| self.corrupt(e))?;
        debug!(
            secrets = snapshot.secrets.len(),
            audit_entries = snapshot.audit.len(),
            "Snapshot loaded"
        );
        Ok(Some(snapshot))
    }

    #[instrument(level = "debug", skip_all, fields(path = %self.path.display()))]
    fn save(&self, snapshot: &VaultSnapshot) -> Result<(), PersistenceError> {
        let json = serde_json::to_vec_pretty(snapshot)?;

        let parent = self.parent_dir();
        fs::create_dir_all(parent).map_err(|e| PersistenceError::io(parent, e))?;

        // Create temp file in the same directory (ensures same filesystem for rename)
        let mut temp_file =
            NamedTempFile::new_in(parent).map_err(|e| PersistenceError::io(parent, e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            temp_file
                .as_file()
                .set_permissions(fs::Permissions::from_mode(0o600))
                .map_err(|e| PersistenceError::io(temp_file.path(), e))?;
        }
        temp_file
            .write_all(&json)
            .and_then(|()| temp_file.as_file().sync_all())
            .map_err(|e| PersistenceError::io(&self.path, e))?;

        self.write_backup();

        temp_file
            .persist(&self.path)
            .map_err(|e| PersistenceError::io(&self.path, e.error))?;
        debug!(bytes = json.len(), "Snapshot committed");
        Ok(())
    }
}

/// Snapshot held in memory, for tests and embedders that persist elsewhere.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    snapshot: Mutex<Option<VaultSnapshot>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: VaultSnapshot) -> Self {
        MemorySnapshotStore {
            snapshot: Mutex::new(Some(snapshot)),
        }
    }

    /// The last saved snapshot.
    pub fn current(&self) -> Result<Option<VaultSnapshot>, PersistenceError> {
        self.load()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn load(&self) -> Result<Option<VaultSnapshot>, PersistenceError> {
        let guard = self
            .snapshot
            .lock()
            .map_err(|_| PersistenceError::LockPoisoned)?;
        Ok(guard.clone())
    }

    fn save(&self, snapshot: &VaultSnapshot) -> Result<(), PersistenceError> {
        let mut guard = self
            .snapshot
            .lock()
            .map_err(|_| PersistenceError::LockPoisoned)?;
        *guard = Some(snapshot.clone());
        Ok(())
    }
}
