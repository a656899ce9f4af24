//! Vault-level abstractions and operations

pub mod audit;
pub mod config;
pub mod ledger;
pub mod operations;
pub mod rotation;
pub mod sink;
pub mod snapshot;
pub mod store;

// Re-export commonly used types
pub use audit::{AuditEntry, AuditLog, AuditOperation, AuditQuery};
pub use config::VaultOptions;
pub use ledger::{
    LedgerError, Metadata, SecretEntry, VersionInfo, VersionLedger, VersionRecord, record_aad,
};
pub use operations::{Vault, VaultBuilder, VaultError, VerifyReport};
pub use rotation::{RotationCoordinator, StagedRotation};
pub use sink::{AuditSink, AuditSinkError, JsonLinesAuditSink, NullAuditSink};
pub use snapshot::{CURRENT_FORMAT_VERSION, VaultSnapshot};
pub use store::{FileSnapshotStore, MemorySnapshotStore, PersistenceError, SnapshotStore};
