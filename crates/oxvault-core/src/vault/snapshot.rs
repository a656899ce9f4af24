use serde::{Deserialize, Serialize};

use super::audit::AuditLog;
use super::ledger::VersionLedger;

/// Snapshot format written by this version of the crate.
pub const CURRENT_FORMAT_VERSION: u32 = 1;

/// The complete, consistent state of a vault: every secret with its history,
/// plus the audit trail.
///
/// This is the unit a [`SnapshotStore`](super::store::SnapshotStore) loads and
/// atomically replaces. The master key is never part of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultSnapshot {
    pub format_version: u32,
    pub secrets: VersionLedger,
    pub audit: AuditLog,
}

impl Default for VaultSnapshot {
    fn default() -> Self {
        VaultSnapshot {
            format_version: CURRENT_FORMAT_VERSION,
            secrets: VersionLedger::new(),
            audit: AuditLog::new(),
        }
    }
}

impl VaultSnapshot {
    pub fn new() -> Self {
        Self::default()
    }
}
