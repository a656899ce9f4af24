//! Per-name version history.
//!
//! The ledger owns every [`SecretEntry`] of a vault in name-insertion order.
//! Version numbers start at 1, grow by exactly one per append and are never
//! reused, even across a delete and re-create.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;

use crate::crypto::SealedValue;

/// Prefix of the associated data bound into every sealed record.
const AAD_PREFIX: &str = "oxvault:v1";

/// Caller-supplied, unencrypted key/value annotations on a version.
pub type Metadata = BTreeMap<String, String>;

/// Build the associated data that ties a ciphertext to its `(name, version)` slot.
///
/// A record moved to another name or version no longer authenticates.
pub fn record_aad(name: &str, version: u64) -> Vec<u8> {
    format!("{AAD_PREFIX}:{name}:{version}").into_bytes()
}

/// Errors raised by ledger lookups and snapshot validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// The name never existed, or it is tombstoned and a current value was requested.
    #[error("secret '{name}' not found")]
    NotFound { name: String },

    /// The name exists but has no record with this version.
    #[error("secret '{name}' has no version {version}")]
    VersionNotFound { name: String, version: u64 },

    /// Two entries share a name.
    #[error("duplicate secret name '{0}' in ledger")]
    DuplicateName(String),

    /// An entry has no version records.
    #[error("secret '{0}' has no versions")]
    EmptyEntry(String),

    /// Version numbers are not exactly 1..=n in order.
    #[error("secret '{name}' has version {found} where {expected} was expected")]
    NonSequentialVersion {
        name: String,
        expected: u64,
        found: u64,
    },
}

/// One immutable version of a secret.
///
/// Rotation is the only operation that replaces `sealed`; everything else is
/// fixed at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub version: u64,
    pub sealed: SealedValue,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl VersionRecord {
    /// Copy of this record with a new sealed value.
    pub fn resealed(&self, sealed: SealedValue) -> Self {
        VersionRecord {
            version: self.version,
            sealed,
            created_at: self.created_at,
            metadata: self.metadata.clone(),
        }
    }

    pub fn info(&self) -> VersionInfo {
        VersionInfo {
            version: self.version,
            created_at: self.created_at,
            metadata: self.metadata.clone(),
        }
    }
}

/// Public, ciphertext-free view of a version record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub metadata: Metadata,
}

/// A named secret and its full history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretEntry {
    pub name: String,
    pub versions: Vec<VersionRecord>,
    #[serde(default)]
    pub tombstoned: bool,
}

impl SecretEntry {
    /// Highest version number in this entry.
    pub fn latest_version(&self) -> u64 {
        self.versions.last().map_or(0, |r| r.version)
    }

    fn validate(&self) -> Result<(), LedgerError> {
        if self.versions.is_empty() {
            return Err(LedgerError::EmptyEntry(self.name.clone()));
        }
        for (expected, record) in (1u64..).zip(&self.versions) {
            if record.version != expected {
                return Err(LedgerError::NonSequentialVersion {
                    name: self.name.clone(),
                    expected,
                    found: record.version,
                });
            }
        }
        Ok(())
    }
}

/// All secret entries of a vault, in name-insertion order.
///
/// Serialized as a plain list of entries; the name index is rebuilt on load,
/// and a list that breaks the numbering invariants is rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<SecretEntry>", into = "Vec<SecretEntry>")]
pub struct VersionLedger {
    entries: Vec<SecretEntry>,
    index: HashMap<String, usize>,
}

impl PartialEq for VersionLedger {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl Eq for VersionLedger {}

impl TryFrom<Vec<SecretEntry>> for VersionLedger {
    type Error = LedgerError;

    fn try_from(entries: Vec<SecretEntry>) -> Result<Self, Self::Error> {
        Self::with_entries(entries)
    }
}

impl From<VersionLedger> for Vec<SecretEntry> {
    fn from(ledger: VersionLedger) -> Self {
        ledger.entries
    }
}

impl VersionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a ledger from existing entries, validating every invariant.
    pub fn with_entries(entries: Vec<SecretEntry>) -> Result<Self, LedgerError> {
        let mut index = HashMap::with_capacity(entries.len());
        for (position, entry) in entries.iter().enumerate() {
            entry.validate()?;
            if index.insert(entry.name.clone(), position).is_some() {
                return Err(LedgerError::DuplicateName(entry.name.clone()));
            }
        }
        Ok(VersionLedger { entries, index })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of version records across all entries.
    pub fn record_count(&self) -> usize {
        self.entries.iter().map(|e| e.versions.len()).sum()
    }

    pub fn entry(&self, name: &str) -> Option<&SecretEntry> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    /// Entries in name-insertion order, tombstoned ones included.
    pub fn entries(&self) -> impl Iterator<Item = &SecretEntry> {
        self.entries.iter()
    }

    /// The version the next append to `name` will receive.
    pub fn next_version(&self, name: &str) -> u64 {
        self.entry(name).map_or(1, |e| e.latest_version() + 1)
    }

    /// Append a new version, creating or reviving the entry as needed.
    pub fn append(&mut self, name: &str, record: VersionRecord) -> u64 {
        let version = record.version;
        match self.index.get(name) {
            Some(&i) => {
                let entry = &mut self.entries[i];
                debug_assert_eq!(version, entry.latest_version() + 1);
                entry.versions.push(record);
                entry.tombstoned = false;
            }
            None => {
                debug_assert_eq!(version, 1);
                self.index.insert(name.to_string(), self.entries.len());
                self.entries.push(SecretEntry {
                    name: name.to_string(),
                    versions: vec![record],
                    tombstoned: false,
                });
            }
        }
        trace!(name, version, "Appended version");
        version
    }

    fn live_entry(&self, name: &str) -> Result<&SecretEntry, LedgerError> {
        self.entry(name)
            .filter(|e| !e.tombstoned)
            .ok_or_else(|| LedgerError::NotFound {
                name: name.to_string(),
            })
    }

    /// Highest version of a live entry.
    pub fn current_version(&self, name: &str) -> Result<u64, LedgerError> {
        Ok(self.live_entry(name)?.latest_version())
    }

    /// Highest-version record of a live entry.
    pub fn current_record(&self, name: &str) -> Result<&VersionRecord, LedgerError> {
        self.live_entry(name)?
            .versions
            .last()
            .ok_or_else(|| LedgerError::EmptyEntry(name.to_string()))
    }

    /// A specific version, whether or not the entry is tombstoned.
    pub fn version_record(&self, name: &str, version: u64) -> Result<&VersionRecord, LedgerError> {
        let entry = self.entry(name).ok_or_else(|| LedgerError::NotFound {
            name: name.to_string(),
        })?;
        // Versions are 1..=n, so the record for `v` sits at index v - 1.
        usize::try_from(version)
            .ok()
            .and_then(|v| v.checked_sub(1))
            .and_then(|i| entry.versions.get(i))
            .ok_or_else(|| LedgerError::VersionNotFound {
                name: name.to_string(),
                version,
            })
    }

    /// Mark an entry deleted. Returns `false` if it is unknown or already tombstoned.
    pub fn tombstone(&mut self, name: &str) -> bool {
        match self.index.get(name) {
            Some(&i) if !self.entries[i].tombstoned => {
                self.entries[i].tombstoned = true;
                true
            }
            _ => false,
        }
    }

    /// Names of non-tombstoned entries, in insertion order.
    pub fn live_names(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| !e.tombstoned)
            .map(|e| e.name.clone())
            .collect()
    }

    /// History of an entry, including tombstoned ones.
    pub fn versions(&self, name: &str) -> Result<Vec<VersionInfo>, LedgerError> {
        let entry = self.entry(name).ok_or_else(|| LedgerError::NotFound {
            name: name.to_string(),
        })?;
        Ok(entry.versions.iter().map(VersionRecord::info).collect())
    }
}
