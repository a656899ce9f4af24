//! Error types for the vault engine
//!
//! Each layer defines its own error enum; this module gathers them in one place.

pub use crate::crypto::{CryptoError, KeyAccessError};
pub use crate::vault::audit::AuditOrderError;
pub use crate::vault::ledger::LedgerError;
pub use crate::vault::operations::VaultError;
pub use crate::vault::sink::AuditSinkError;
pub use crate::vault::store::PersistenceError;
