//! Whole-vault re-keying.
//!
//! A rotation decrypts every version of every secret under the current key and
//! re-seals it under a candidate key, building a complete replacement ledger in
//! memory. Nothing is committed until every record has succeeded; a single
//! failure aborts the rotation and leaves the live state untouched.

use rayon::prelude::*;
use tracing::{debug, instrument, warn};

use super::audit::{AuditLog, AuditOperation};
use super::ledger::{SecretEntry, VersionLedger, record_aad};
use super::operations::VaultError;
use super::snapshot::{CURRENT_FORMAT_VERSION, VaultSnapshot};
use crate::crypto::{MasterKey, SealingKey};

/// A fully re-keyed ledger waiting to be committed together with its key.
///
/// Kept by the vault after a failed commit so the save can be retried without
/// repeating the re-encryption.
pub struct StagedRotation {
    pub(crate) key: MasterKey,
    pub(crate) sealing_key: SealingKey,
    pub(crate) fingerprint: String,
    pub(crate) secrets: VersionLedger,
    pub(crate) failed_retries: u32,
}

impl std::fmt::Debug for StagedRotation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagedRotation")
            .field("fingerprint", &self.fingerprint)
            .field("secrets", &self.secrets.len())
            .field("failed_retries", &self.failed_retries)
            .finish_non_exhaustive()
    }
}

impl StagedRotation {
    /// Fingerprint of the candidate key.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// The snapshot to commit: the re-keyed ledger plus `audit` with one
    /// `rotate` entry appended.
    ///
    /// The audit trail is taken at commit time so read entries recorded while
    /// the rotation was pending are not lost.
    pub(crate) fn snapshot_with(&self, audit: &AuditLog) -> VaultSnapshot {
        let mut audit = audit.clone();
        audit.record(AuditOperation::Rotate, None, None);
        VaultSnapshot {
            format_version: CURRENT_FORMAT_VERSION,
            secrets: self.secrets.clone(),
            audit,
        }
    }
}

/// Re-encrypts a ledger from the current key to a candidate key.
pub struct RotationCoordinator<'a> {
    current: &'a SealingKey,
}

impl<'a> RotationCoordinator<'a> {
    pub fn new(current: &'a SealingKey) -> Self {
        RotationCoordinator { current }
    }

    /// Re-key every record of `ledger` under `candidate`.
    ///
    /// Entries are processed in parallel; the staged ledger keeps the original
    /// name order, version numbers, metadata and tombstone flags.
    ///
    /// # Errors
    ///
    /// `VaultError::RotationAborted` naming the first record that failed to
    /// decrypt or re-encrypt. No state is modified in that case.
    #[instrument(level = "debug", skip_all, fields(secrets = ledger.len()))]
    pub fn stage(
        &self,
        ledger: &VersionLedger,
        candidate: MasterKey,
    ) -> Result<StagedRotation, VaultError> {
        let sealing_key = SealingKey::new(&candidate)?;
        let fingerprint = candidate.fingerprint()?;

        let entries: Vec<&SecretEntry> = ledger.entries().collect();
        let rekeyed = entries
            .par_iter()
            .map(|entry| self.rekey_entry(entry, &sealing_key))
            .collect::<Result<Vec<_>, _>>()?;

        let secrets = VersionLedger::with_entries(rekeyed)?;
        debug!(records = secrets.record_count(), "Rotation staged");

        Ok(StagedRotation {
            key: candidate,
            sealing_key,
            fingerprint,
            secrets,
            failed_retries: 0,
        })
    }

    fn rekey_entry(
        &self,
        entry: &SecretEntry,
        candidate: &SealingKey,
    ) -> Result<SecretEntry, VaultError> {
        let abort = |version: u64, reason: String| {
            warn!(name = %entry.name, version, %reason, "Rotation aborted");
            VaultError::RotationAborted {
                name: entry.name.clone(),
                version,
                reason,
            }
        };

        let versions = entry
            .versions
            .iter()
            .map(|record| {
                let aad = record_aad(&entry.name, record.version);
                let plaintext = self
                    .current
                    .open(&record.sealed, &aad)
                    .map_err(|e| abort(record.version, e.to_string()))?;
                let sealed = candidate
                    .seal(&plaintext, &aad)
                    .map_err(|e| abort(record.version, e.to_string()))?;
                Ok(record.resealed(sealed))
            })
            .collect::<Result<Vec<_>, VaultError>>()?;

        Ok(SecretEntry {
            name: entry.name.clone(),
            versions,
            tombstoned: entry.tombstoned,
        })
    }
}
