//! Vault directory layout and master key resolution.
//!
//! A vault directory holds three files:
//!
//! ```text
//! .oxvault/
//! ├── secrets.json   # versioned, encrypted snapshot
//! ├── master.key     # base64 master key (mode 0600), unless supplied elsewhere
//! └── audit.log      # JSON-lines copy of the audit trail
//! ```
//!
//! The master key is resolved in order: `--key-file`, then
//! `OXVAULT_MASTER_KEY` (base64), then `<vault>/master.key`.

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::debug;

use oxvault_core::crypto::MasterKey;
use oxvault_core::vault::{FileSnapshotStore, JsonLinesAuditSink, Vault, VaultOptions};

/// Environment variable carrying a base64 master key
pub const MASTER_KEY_ENV: &str = "OXVAULT_MASTER_KEY";

const SECRETS_FILE: &str = "secrets.json";
const KEY_FILE: &str = "master.key";
const AUDIT_FILE: &str = "audit.log";

/// Where the master key for this invocation came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    File(PathBuf),
    Env,
}

/// Paths for one vault directory plus the key location chosen on the command line.
#[derive(Debug, Clone)]
pub struct VaultDir {
    root: PathBuf,
    key_file: Option<PathBuf>,
}

impl VaultDir {
    pub fn new(root: impl Into<PathBuf>, key_file: Option<PathBuf>) -> Self {
        Self {
            root: root.into(),
            key_file,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether `--key-file` was given, which takes precedence over the environment.
    pub fn has_explicit_key_file(&self) -> bool {
        self.key_file.is_some()
    }

    pub fn secrets_path(&self) -> PathBuf {
        self.root.join(SECRETS_FILE)
    }

    pub fn audit_log_path(&self) -> PathBuf {
        self.root.join(AUDIT_FILE)
    }

    /// Key file path: `--key-file` if given, otherwise `<vault>/master.key`.
    pub fn key_path(&self) -> PathBuf {
        self.key_file
            .clone()
            .unwrap_or_else(|| self.root.join(KEY_FILE))
    }

    pub fn is_initialized(&self) -> bool {
        self.secrets_path().exists()
    }

    /// Resolve the master key for this vault.
    pub fn resolve_key(&self) -> Result<(MasterKey, KeySource)> {
        if self.key_file.is_none()
            && let Ok(encoded) = std::env::var(MASTER_KEY_ENV)
        {
            debug!("Using master key from {MASTER_KEY_ENV}");
            let key = MasterKey::from_base64(&encoded)
                .with_context(|| format!("Invalid master key in {MASTER_KEY_ENV}"))?;
            return Ok((key, KeySource::Env));
        }

        let path = self.key_path();
        debug!(path = %path.display(), "Reading master key file");
        let encoded = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read master key file: {}", path.display()))?;
        let key = MasterKey::from_base64(&encoded)
            .with_context(|| format!("Invalid master key in {}", path.display()))?;
        Ok((key, KeySource::File(path)))
    }

    /// Open the vault with its file store and JSON-lines audit sink.
    pub fn open(&self, key: MasterKey, options: VaultOptions) -> Result<Vault> {
        if !self.is_initialized() {
            anyhow::bail!(
                "No vault found at {} (run `oxvault init` first)",
                self.root.display()
            );
        }
        self.open_uninitialized(key, options)
    }

    /// Open without checking for an existing snapshot. Used by `init`.
    pub fn open_uninitialized(&self, key: MasterKey, options: VaultOptions) -> Result<Vault> {
        let store = Arc::new(FileSnapshotStore::new(self.secrets_path()));
        let sink = JsonLinesAuditSink::open(self.audit_log_path())
            .with_context(|| format!("Failed to open audit log: {}", self.audit_log_path().display()))?;

        Vault::builder(key, store)
            .options(options)
            .audit_sink(Arc::new(sink))
            .open()
            .with_context(|| format!("Failed to open vault at {}", self.root.display()))
    }

    /// Resolve the key and open the vault in one step.
    pub fn open_with_resolved_key(&self, options: VaultOptions) -> Result<(Vault, KeySource)> {
        let (key, source) = self.resolve_key()?;
        Ok((self.open(key, options)?, source))
    }
}

/// Write a base64 master key to `path`, readable only by the owner.
///
/// Refuses to overwrite an existing file unless `overwrite` is set.
pub fn write_key_file(path: &Path, key: &MasterKey, overwrite: bool) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let mut options = fs::OpenOptions::new();
    options.write(true);
    if overwrite {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options
        .open(path)
        .with_context(|| format!("Failed to create key file: {}", path.display()))?;
    let encoded = key.to_base64()?;
    writeln!(file, "{}", encoded.as_str())
        .and_then(|()| file.sync_all())
        .with_context(|| format!("Failed to write key file: {}", path.display()))?;
    Ok(())
}
