//! Cryptographic primitives for vault operations

pub mod aead;
pub mod keys;
mod thread_safety; // Send + Sync impls for MasterKey

use thiserror::Error;

/// Errors that can occur during cryptographic operations.
///
/// # Security Classification
///
/// Some errors indicate potential **adversarial tampering** or **integrity violations**.
/// These should be treated as security events and may warrant logging, alerting,
/// or aborting the operation entirely. They are marked with `[INTEGRITY VIOLATION]`.
///
/// Other errors indicate **caller errors** (bad key material) or **system errors**
/// (memory protection). These are marked accordingly.
#[derive(Error, Debug)]
pub enum CryptoError {
    // =========================================================================
    // INTEGRITY VIOLATIONS - Potential adversarial tampering
    // =========================================================================
    /// The GCM authentication tag did not verify.
    ///
    /// **[INTEGRITY VIOLATION]** The nonce, ciphertext, tag or associated data were
    /// modified, or the value was sealed under a different key. No plaintext is
    /// ever returned in this case.
    #[error("[INTEGRITY VIOLATION] authentication tag mismatch - tampered data or wrong key")]
    AuthenticationFailed,

    // =========================================================================
    // CALLER ERRORS - Invalid key material or encodings
    // =========================================================================
    /// Key material is not exactly 256 bits.
    #[error("Invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKey { expected: usize, actual: usize },

    /// Key material could not be decoded from its textual form.
    #[error("Invalid key encoding: {0}")]
    InvalidKeyEncoding(String),

    /// AES-GCM refused to encrypt (plaintext exceeds the GCM length limit).
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    // =========================================================================
    // SYSTEM ERRORS
    // =========================================================================
    /// Key access failed due to memory protection error or lock poisoning.
    ///
    /// **[SYSTEM ERROR]** This indicates a failure in the memory protection
    /// subsystem (mlock, mprotect) or a poisoned key lock.
    #[error("Key access failed: {0}")]
    KeyAccess(#[from] KeyAccessError),
}

// Re-export commonly used types
pub use aead::{SealedValue, SealingKey, decrypt, encrypt};
pub use keys::{KEY_LEN, KeyAccessError, MasterKey};
