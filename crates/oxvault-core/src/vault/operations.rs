//! The public vault facade.
//!
//! [`Vault`] composes the codec, ledger, rotation coordinator and audit trail
//! behind one reader/writer lock and talks to a [`SnapshotStore`] for
//! durability and an [`AuditSink`] for forwarding committed audit entries.

use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use secrecy::SecretString;
use thiserror::Error;
use tracing::{debug, info, instrument, trace, warn};

use super::audit::{AuditEntry, AuditOperation, AuditQuery};
use super::config::VaultOptions;
use super::ledger::{LedgerError, Metadata, VersionInfo, VersionRecord, record_aad};
use super::rotation::{RotationCoordinator, StagedRotation};
use super::sink::{AuditSink, NullAuditSink};
use super::snapshot::VaultSnapshot;
use super::store::{PersistenceError, SnapshotStore};
use crate::crypto::{CryptoError, KeyAccessError, MasterKey, SealingKey};

/// Errors returned by [`Vault`] operations.
///
/// Variants marked `[INTEGRITY VIOLATION]` indicate stored data that no longer
/// authenticates and should be treated as security events.
#[derive(Error, Debug)]
pub enum VaultError {
    /// Key material is not exactly 256 bits.
    #[error("Invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKey { expected: usize, actual: usize },

    /// Unknown name, or a tombstoned name read without an explicit version.
    #[error("Secret '{name}' not found")]
    NotFound { name: String },

    #[error("Secret '{name}' has no version {version}")]
    VersionNotFound { name: String, version: u64 },

    /// **[INTEGRITY VIOLATION]** The stored record failed tag verification.
    #[error("[INTEGRITY VIOLATION] Secret '{name}' version {version} failed authentication")]
    AuthenticationFailed { name: String, version: u64 },

    /// A record could not be re-keyed; the vault is unchanged.
    #[error("Rotation aborted at '{name}' version {version}: {reason}")]
    RotationAborted {
        name: String,
        version: u64,
        reason: String,
    },

    #[error("Persistence failed: {0}")]
    Persistence(#[from] PersistenceError),

    /// The value authenticated but is not valid UTF-8.
    #[error("Secret '{name}' version {version} is not valid UTF-8")]
    MalformedPlaintext { name: String, version: u64 },

    /// A loaded or staged ledger broke a numbering invariant.
    #[error("Ledger invariant violated: {0}")]
    InvariantViolation(LedgerError),

    #[error("Key access failed: {0}")]
    KeyAccess(#[from] KeyAccessError),

    #[error("Cryptographic operation failed: {0}")]
    Crypto(CryptoError),

    #[error("Vault lock poisoned")]
    LockPoisoned,

    #[error("No rotation is pending")]
    NoPendingRotation,
}

impl From<CryptoError> for VaultError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::InvalidKey { expected, actual } => {
                VaultError::InvalidKey { expected, actual }
            }
            CryptoError::KeyAccess(e) => VaultError::KeyAccess(e),
            other => VaultError::Crypto(other),
        }
    }
}

impl From<LedgerError> for VaultError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::NotFound { name } => VaultError::NotFound { name },
            LedgerError::VersionNotFound { name, version } => {
                VaultError::VersionNotFound { name, version }
            }
            other => VaultError::InvariantViolation(other),
        }
    }
}

/// Result of [`Vault::verify`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifyReport {
    /// Number of records checked.
    pub checked: usize,
    /// `(name, version)` of every record that failed to authenticate.
    pub failures: Vec<(String, u64)>,
}

impl VerifyReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Live state guarded by the vault lock.
struct VaultState {
    key: MasterKey,
    sealing_key: SealingKey,
    snapshot: VaultSnapshot,
    dirty: bool,
    pending_rotation: Option<StagedRotation>,
    /// Highest audit sequence already handed to the sink.
    forwarded_sequence: u64,
}

/// A versioned, rotatable secrets vault.
///
/// All operations are synchronous. Reads share the lock; mutations, rotation
/// and commits hold it exclusively, so no caller ever observes a half-applied
/// mutation or a half-rotated ledger.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use oxvault_core::crypto::MasterKey;
/// use oxvault_core::vault::{MemorySnapshotStore, Vault, VaultOptions};
/// use secrecy::ExposeSecret;
///
/// let store = Arc::new(MemorySnapshotStore::new());
/// let vault = Vault::open(MasterKey::random().unwrap(), store, VaultOptions::default()).unwrap();
///
/// assert_eq!(vault.set("API_KEY", "abc123", None).unwrap(), 1);
/// assert_eq!(vault.get("API_KEY", None).unwrap().expose_secret(), "abc123");
/// ```
pub struct Vault {
    state: RwLock<VaultState>,
    store: Arc<dyn SnapshotStore>,
    sink: Arc<dyn AuditSink>,
    options: VaultOptions,
}

impl fmt::Debug for Vault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vault")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Vault`] with an optional audit sink.
pub struct VaultBuilder {
    key: MasterKey,
    store: Arc<dyn SnapshotStore>,
    options: VaultOptions,
    sink: Arc<dyn AuditSink>,
}

impl VaultBuilder {
    #[must_use]
    pub fn options(mut self, options: VaultOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Load the stored snapshot (or start empty) and return the vault.
    pub fn open(self) -> Result<Vault, VaultError> {
        Vault::open_with_sink(self.key, self.store, self.options, self.sink)
    }
}

impl Vault {
    /// Open a vault over `store` with no audit sink.
    pub fn open(
        key: MasterKey,
        store: Arc<dyn SnapshotStore>,
        options: VaultOptions,
    ) -> Result<Self, VaultError> {
        Self::open_with_sink(key, store, options, Arc::new(NullAuditSink))
    }

    pub fn builder(key: MasterKey, store: Arc<dyn SnapshotStore>) -> VaultBuilder {
        VaultBuilder {
            key,
            store,
            options: VaultOptions::default(),
            sink: Arc::new(NullAuditSink),
        }
    }

    #[instrument(level = "debug", skip_all)]
    fn open_with_sink(
        key: MasterKey,
        store: Arc<dyn SnapshotStore>,
        options: VaultOptions,
        sink: Arc<dyn AuditSink>,
    ) -> Result<Self, VaultError> {
        let sealing_key = SealingKey::new(&key)?;
        let snapshot = store.load()?.unwrap_or_default();
        let forwarded_sequence = snapshot.audit.next_sequence() - 1;
        debug!(
            secrets = snapshot.secrets.len(),
            audit_entries = snapshot.audit.len(),
            "Vault opened"
        );

        Ok(Vault {
            state: RwLock::new(VaultState {
                key,
                sealing_key,
                snapshot,
                dirty: false,
                pending_rotation: None,
                forwarded_sequence,
            }),
            store,
            sink,
            options,
        })
    }

    pub fn options(&self) -> &VaultOptions {
        &self.options
    }

    fn read_state(&self) -> Result<RwLockReadGuard<'_, VaultState>, VaultError> {
        self.state.read().map_err(|_| VaultError::LockPoisoned)
    }

    fn write_state(&self) -> Result<RwLockWriteGuard<'_, VaultState>, VaultError> {
        self.state.write().map_err(|_| VaultError::LockPoisoned)
    }

    // ==================== Mutations ====================

    /// Encrypt and store a new version of `name`.
    ///
    /// Creates the secret if needed and revives it if it was deleted; version
    /// numbering continues from the highest existing version.
    #[instrument(level = "debug", skip_all, fields(name = %name))]
    pub fn set(
        &self,
        name: &str,
        plaintext: &str,
        metadata: Option<Metadata>,
    ) -> Result<u64, VaultError> {
        let mut state = self.write_state()?;
        let state = &mut *state;

        let version = state.snapshot.secrets.next_version(name);
        let sealed = state
            .sealing_key
            .seal(plaintext.as_bytes(), &record_aad(name, version))?;
        let record = VersionRecord {
            version,
            sealed,
            created_at: Utc::now(),
            metadata: metadata.unwrap_or_default(),
        };

        self.apply(state, |snapshot| {
            snapshot.secrets.append(name, record);
            snapshot
                .audit
                .record(AuditOperation::Set, Some(name), Some(version));
        })?;
        debug!(version, "Secret set");
        Ok(version)
    }

    /// Tombstone `name`.
    ///
    /// Returns `false` (and records nothing) if the name is unknown or already
    /// deleted. History stays readable by explicit version.
    #[instrument(level = "debug", skip_all, fields(name = %name))]
    pub fn delete(&self, name: &str) -> Result<bool, VaultError> {
        let mut state = self.write_state()?;
        let state = &mut *state;

        let Ok(version) = state.snapshot.secrets.current_version(name) else {
            trace!("Nothing to delete");
            return Ok(false);
        };

        self.apply(state, |snapshot| {
            snapshot.secrets.tombstone(name);
            snapshot
                .audit
                .record(AuditOperation::Delete, Some(name), Some(version));
        })?;
        debug!(version, "Secret deleted");
        Ok(true)
    }

    /// Apply a ledger mutation under the write lock.
    ///
    /// With auto-save the mutation runs on a copy that replaces the live
    /// snapshot only after the store accepted it. Without auto-save it runs in
    /// place and marks the vault dirty.
    fn apply<F>(&self, state: &mut VaultState, mutate: F) -> Result<(), VaultError>
    where
        F: FnOnce(&mut VaultSnapshot),
    {
        if !self.options.auto_save {
            Self::discard_pending_rotation(state);
            mutate(&mut state.snapshot);
            state.dirty = true;
            return Ok(());
        }

        // A rolled-back mutation leaves the staged rotation valid for retry
        let mut staged = state.snapshot.clone();
        mutate(&mut staged);
        self.store.save(&staged).inspect_err(|e| {
            warn!(error = %e, "Commit failed; mutation rolled back");
        })?;
        Self::discard_pending_rotation(state);
        state.snapshot = staged;
        state.dirty = false;
        self.forward_audit(state);
        Ok(())
    }

    fn discard_pending_rotation(state: &mut VaultState) {
        if let Some(stale) = state.pending_rotation.take() {
            debug!(
                fingerprint = stale.fingerprint(),
                "Discarding pending rotation after mutation"
            );
        }
    }

    /// Hand committed audit entries to the sink, in order.
    ///
    /// Stops at the first rejected entry; it and everything after it are
    /// re-sent on the next commit.
    fn forward_audit(&self, state: &mut VaultState) {
        for entry in state.snapshot.audit.entries_after(state.forwarded_sequence) {
            if let Err(e) = self.sink.append(entry) {
                warn!(
                    sequence = entry.sequence,
                    error = %e,
                    "Audit sink rejected entry; forwarding resumes on next commit"
                );
                return;
            }
            state.forwarded_sequence = entry.sequence;
        }
    }

    // ==================== Reads ====================

    /// Decrypt the current value of `name`, or a specific historical version.
    ///
    /// Without `version`, tombstoned names fail `NotFound`. With `version`,
    /// the value is returned even for a tombstoned name.
    #[instrument(level = "debug", skip_all, fields(name = %name, version = ?version))]
    pub fn get(&self, name: &str, version: Option<u64>) -> Result<SecretString, VaultError> {
        if !self.options.audit_reads {
            let state = self.read_state()?;
            return Self::read_value(&state, name, version).map(|(_, value)| value);
        }

        let mut state = self.write_state()?;
        let (version, value) = Self::read_value(&state, name, version)?;
        state
            .snapshot
            .audit
            .record(AuditOperation::Get, Some(name), Some(version));
        state.dirty = true;
        Ok(value)
    }

    fn read_value(
        state: &VaultState,
        name: &str,
        version: Option<u64>,
    ) -> Result<(u64, SecretString), VaultError> {
        let ledger = &state.snapshot.secrets;
        let record = match version {
            Some(v) => ledger.version_record(name, v)?,
            None => ledger.current_record(name)?,
        };

        let plaintext = state
            .sealing_key
            .open(&record.sealed, &record_aad(name, record.version))
            .map_err(|e| match e {
                CryptoError::AuthenticationFailed => {
                    warn!(name, version = record.version, "Stored secret failed authentication");
                    VaultError::AuthenticationFailed {
                        name: name.to_string(),
                        version: record.version,
                    }
                }
                other => other.into(),
            })?;

        let value = std::str::from_utf8(&plaintext).map_err(|_| VaultError::MalformedPlaintext {
            name: name.to_string(),
            version: record.version,
        })?;
        trace!(version = record.version, "Secret read");
        Ok((record.version, SecretString::from(value.to_owned())))
    }

    /// Names of all non-deleted secrets, in creation order.
    pub fn list_keys(&self) -> Result<Vec<String>, VaultError> {
        Ok(self.read_state()?.snapshot.secrets.live_names())
    }

    /// Version history of `name`, including deleted secrets.
    pub fn list_versions(&self, name: &str) -> Result<Vec<VersionInfo>, VaultError> {
        Ok(self.read_state()?.snapshot.secrets.versions(name)?)
    }

    /// Most recent audit entries first, optionally for one name.
    pub fn audit_log(&self, name: Option<&str>, limit: usize) -> Result<Vec<AuditEntry>, VaultError> {
        Ok(self.read_state()?.snapshot.audit.entries_for(name, limit))
    }

    pub fn audit_query(&self, query: &AuditQuery) -> Result<Vec<AuditEntry>, VaultError> {
        Ok(self.read_state()?.snapshot.audit.query(query))
    }

    /// Check that every stored record authenticates under the current key.
    #[instrument(level = "debug", skip_all)]
    pub fn verify(&self) -> Result<VerifyReport, VaultError> {
        let state = self.read_state()?;
        let mut report = VerifyReport::default();

        for entry in state.snapshot.secrets.entries() {
            for record in &entry.versions {
                report.checked += 1;
                let aad = record_aad(&entry.name, record.version);
                if state.sealing_key.open(&record.sealed, &aad).is_err() {
                    report.failures.push((entry.name.clone(), record.version));
                }
            }
        }

        if !report.is_clean() {
            warn!(failures = report.failures.len(), "Verification found unreadable records");
        }
        Ok(report)
    }

    pub fn key_fingerprint(&self) -> Result<String, VaultError> {
        Ok(self.read_state()?.key.fingerprint()?)
    }

    /// Whether there are changes not yet committed to the store.
    pub fn is_dirty(&self) -> Result<bool, VaultError> {
        Ok(self.read_state()?.dirty)
    }

    /// Number of audit entries the sink has not yet accepted.
    pub fn pending_audit_forward(&self) -> Result<usize, VaultError> {
        let state = self.read_state()?;
        Ok(state.snapshot.audit.entries_after(state.forwarded_sequence).len())
    }

    /// A copy of the live snapshot.
    pub fn snapshot(&self) -> Result<VaultSnapshot, VaultError> {
        Ok(self.read_state()?.snapshot.clone())
    }

    // ==================== Commit ====================

    /// Commit the live snapshot to the store.
    ///
    /// On failure the in-memory state, dirty flag included, is kept so the
    /// call can be retried.
    #[instrument(level = "debug", skip_all)]
    pub fn save(&self) -> Result<(), VaultError> {
        let mut state = self.write_state()?;
        self.store.save(&state.snapshot).inspect_err(|e| {
            warn!(error = %e, "Explicit save failed");
        })?;
        state.dirty = false;
        self.forward_audit(&mut state);
        Ok(())
    }

    // ==================== Rotation ====================

    /// Re-encrypt every record under `new_key` (or a freshly generated key)
    /// and make it current.
    ///
    /// Returns a copy of the new key for the embedder to store. If re-keying
    /// fails nothing changes. If only the final commit fails, the old key stays
    /// current and the staged rotation is kept for
    /// [`retry_rotation_commit`](Self::retry_rotation_commit).
    #[instrument(level = "debug", skip_all)]
    pub fn rotate(&self, new_key: Option<MasterKey>) -> Result<MasterKey, VaultError> {
        let mut state = self.write_state()?;
        let state = &mut *state;
        state.pending_rotation = None;

        let candidate = match new_key {
            Some(key) => key,
            None => MasterKey::random()?,
        };
        let staged =
            RotationCoordinator::new(&state.sealing_key).stage(&state.snapshot.secrets, candidate)?;

        self.commit_rotation(state, staged).map_err(|(staged, e)| {
            if self.options.rotation_commit_retries > 0 {
                state.pending_rotation = Some(staged);
            }
            e
        })
    }

    /// Retry committing a rotation whose commit previously failed.
    ///
    /// No re-encryption happens. After `rotation_commit_retries` failed
    /// retries the staged rotation is discarded.
    #[instrument(level = "debug", skip_all)]
    pub fn retry_rotation_commit(&self) -> Result<MasterKey, VaultError> {
        let mut state = self.write_state()?;
        let state = &mut *state;
        let staged = state
            .pending_rotation
            .take()
            .ok_or(VaultError::NoPendingRotation)?;

        self.commit_rotation(state, staged).map_err(|(mut staged, e)| {
            staged.failed_retries += 1;
            if staged.failed_retries < self.options.rotation_commit_retries {
                state.pending_rotation = Some(staged);
            } else {
                warn!(
                    retries = staged.failed_retries,
                    "Discarding staged rotation after repeated commit failures"
                );
            }
            e
        })
    }

    /// Fingerprint of the candidate key of a rotation awaiting commit retry.
    pub fn pending_rotation(&self) -> Result<Option<String>, VaultError> {
        Ok(self
            .read_state()?
            .pending_rotation
            .as_ref()
            .map(|staged| staged.fingerprint().to_string()))
    }

    fn commit_rotation(
        &self,
        state: &mut VaultState,
        staged: StagedRotation,
    ) -> Result<MasterKey, (StagedRotation, VaultError)> {
        let returned = match staged.key.try_clone() {
            Ok(key) => key,
            Err(e) => return Err((staged, e.into())),
        };
        let snapshot = staged.snapshot_with(&state.snapshot.audit);

        if let Err(e) = self.store.save(&snapshot) {
            warn!(error = %e, "Rotation commit failed; old key remains current");
            return Err((staged, e.into()));
        }

        let old_fingerprint = state.key.fingerprint().unwrap_or_default();
        state.key = staged.key;
        state.sealing_key = staged.sealing_key;
        state.snapshot = snapshot;
        state.dirty = false;
        info!(
            old_key = %old_fingerprint,
            new_key = %staged.fingerprint,
            records = state.snapshot.secrets.record_count(),
            "Master key rotated"
        );
        self.forward_audit(state);
        Ok(returned)
    }
}
