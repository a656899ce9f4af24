//! Vault behavior options.

use serde::{Deserialize, Serialize};

/// Default number of times a failed rotation commit may be retried.
pub const DEFAULT_ROTATION_COMMIT_RETRIES: u32 = 3;

/// Options controlling when a [`Vault`](super::Vault) commits and what it audits.
///
/// Deserializable from any serde format; missing fields take their defaults.
///
/// # Example
///
/// ```
/// use oxvault_core::vault::VaultOptions;
///
/// let options = VaultOptions::default()
///     .with_auto_save(false)
///     .with_audit_reads(true);
/// assert_eq!(options.rotation_commit_retries, 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultOptions {
    /// Commit to the snapshot store after every mutation (default `true`).
    ///
    /// With `false`, mutations stay in memory until [`Vault::save`](super::Vault::save)
    /// is called; nothing is committed implicitly, not even on drop. Rotation
    /// commits regardless.
    pub auto_save: bool,

    /// Record a `get` audit entry for every successful read (default `false`).
    ///
    /// Read entries are persisted with the next commit rather than forcing one.
    pub audit_reads: bool,

    /// How many times [`Vault::retry_rotation_commit`](super::Vault::retry_rotation_commit)
    /// may fail before the staged rotation is discarded (default 3).
    pub rotation_commit_retries: u32,
}

impl Default for VaultOptions {
    fn default() -> Self {
        VaultOptions {
            auto_save: true,
            audit_reads: false,
            rotation_commit_retries: DEFAULT_ROTATION_COMMIT_RETRIES,
        }
    }
}

impl VaultOptions {
    #[must_use]
    pub fn with_auto_save(mut self, auto_save: bool) -> Self {
        self.auto_save = auto_save;
        self
    }

    #[must_use]
    pub fn with_audit_reads(mut self, audit_reads: bool) -> Self {
        self.audit_reads = audit_reads;
        self
    }

    #[must_use]
    pub fn with_rotation_commit_retries(mut self, retries: u32) -> Self {
        self.rotation_commit_retries = retries;
        self
    }
}
