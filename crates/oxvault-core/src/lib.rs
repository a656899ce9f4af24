//! Encryption-and-versioning engine for a local secrets vault.
//!
//! Secrets are sealed with AES-256-GCM under a single master key, kept with
//! their full version history, and re-keyed all-or-nothing on rotation. Every
//! mutation is recorded in an ordered audit trail stored alongside the secrets.
//!
//! Start with [`vault::Vault`].

pub mod crypto;
pub mod error;
pub mod vault;

pub use crypto::MasterKey;
pub use vault::{Vault, VaultError, VaultOptions};
