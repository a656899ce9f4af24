#![forbid(unsafe_code)]

use std::fmt;
use std::sync::RwLock;

use base64::Engine as _;
use memsafe::MemSafe;
use rand::RngCore;
use subtle::ConstantTimeEq;
use thiserror::Error;
use zeroize::Zeroizing;

use super::CryptoError;

/// Length of a master key in bytes (256 bits).
pub const KEY_LEN: usize = 32;

/// Number of digest bytes shown in a key fingerprint.
const FINGERPRINT_LEN: usize = 8;

/// Error type for key access operations.
///
/// This error can occur when accessing protected key material, either due to
/// memory protection failures or lock poisoning (a thread panicked while holding the lock).
#[derive(Debug, Error)]
pub enum KeyAccessError {
    /// Memory protection operation failed (mlock, mprotect, etc.)
    #[error("Memory protection operation failed: {0}")]
    MemoryProtection(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Lock was poisoned (a thread panicked while holding it)
    #[error("Key lock was poisoned")]
    LockPoisoned,
}

impl KeyAccessError {
    /// Create a memory protection error from any error type.
    pub fn memory_protection<E: std::error::Error + Send + Sync + 'static>(err: E) -> Self {
        KeyAccessError::MemoryProtection(Box::new(err))
    }
}

/// The 256-bit symmetric key every secret in a vault is sealed under.
///
/// Exactly one `MasterKey` is current for a vault at any time. Rotation produces
/// a new one and drops the old one, at which point its memory is zeroed.
///
/// # Security
///
/// The key is stored using the `memsafe` crate's `MemSafe` type, which provides:
/// - **Memory locking**: the key is pinned in RAM via `mlock`, preventing swap to disk
/// - **Access control**: memory is protected with `mprotect(PROT_NONE)` when not in use
/// - **Dump exclusion**: on Linux, `MADV_DONTDUMP` excludes the key from core dumps
/// - **Zeroization**: memory is securely zeroed when the key is dropped
///
/// Access to key material is only provided through [`with_key`](Self::with_key),
/// which elevates memory permissions for the duration of a callback.
///
/// # Thread Safety
///
/// `MasterKey` is `Send + Sync`. The internal `RwLock` serializes access to the
/// protected region; a panic while it is held makes the key inaccessible.
pub struct MasterKey {
    key: RwLock<MemSafe<[u8; KEY_LEN]>>,
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MasterKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl MasterKey {
    /// Generate a new random key using a cryptographically secure RNG.
    ///
    /// # Errors
    ///
    /// Returns a `KeyAccessError` if memory protection initialization fails.
    /// This can happen if the system's mlock limit is exceeded.
    pub fn random() -> Result<Self, KeyAccessError> {
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        rand::rng().fill_bytes(key.as_mut());
        Self::new(*key)
    }

    /// Create a key from raw 256-bit material.
    ///
    /// The array is copied into a `MemSafe` container. The caller is responsible
    /// for zeroing the original if it holds sensitive data.
    pub fn new(key: [u8; KEY_LEN]) -> Result<Self, KeyAccessError> {
        Ok(MasterKey {
            key: RwLock::new(MemSafe::new(key).map_err(KeyAccessError::memory_protection)?),
        })
    }

    /// Create a key from a byte slice supplied by the embedder.
    ///
    /// # Errors
    ///
    /// - `CryptoError::InvalidKey` if the slice is not exactly 32 bytes
    /// - `CryptoError::KeyAccess` if memory protection fails
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let key: [u8; KEY_LEN] = bytes.try_into().map_err(|_| CryptoError::InvalidKey {
            expected: KEY_LEN,
            actual: bytes.len(),
        })?;
        let key = Zeroizing::new(key);
        Ok(Self::new(*key)?)
    }

    /// Decode a key from standard base64 (surrounding whitespace is ignored).
    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let bytes = Zeroizing::new(
            base64::engine::general_purpose::STANDARD
                .decode(encoded.trim())
                .map_err(|e| CryptoError::InvalidKeyEncoding(e.to_string()))?,
        );
        Self::from_slice(&bytes)
    }

    /// Encode the key as standard base64 for handing back to the embedder.
    pub fn to_base64(&self) -> Result<Zeroizing<String>, KeyAccessError> {
        self.with_key(|key| Zeroizing::new(base64::engine::general_purpose::STANDARD.encode(key)))
    }

    /// Try to clone the key into a fresh protected region.
    pub fn try_clone(&self) -> Result<Self, KeyAccessError> {
        let copy = self.with_key(|key| Zeroizing::new(*key))?;
        Self::new(*copy)
    }

    /// Execute a function with access to the raw key bytes.
    ///
    /// The key material never escapes the callback; memory permissions are
    /// elevated only while it runs.
    ///
    /// # Example
    ///
    /// ```
    /// # use oxvault_core::crypto::keys::MasterKey;
    /// # use aes_gcm::{Aes256Gcm, Key, KeyInit};
    /// let master_key = MasterKey::random().unwrap();
    ///
    /// let cipher = master_key.with_key(|key_bytes| {
    ///     let key: &Key<Aes256Gcm> = key_bytes.into();
    ///     Aes256Gcm::new(key)
    /// }).unwrap();
    /// ```
    pub fn with_key<F, R>(&self, f: F) -> Result<R, KeyAccessError>
    where
        F: FnOnce(&[u8; KEY_LEN]) -> R,
    {
        let mut lock = self.key.write().map_err(|_| KeyAccessError::LockPoisoned)?;
        let guard = lock.read().map_err(KeyAccessError::memory_protection)?;
        Ok(f(&guard))
    }

    /// Short, non-secret identifier for this key: the first 8 bytes of its
    /// SHA-256 digest, hex encoded. Safe to log and display.
    pub fn fingerprint(&self) -> Result<String, KeyAccessError> {
        self.with_key(|key| {
            let digest = ring::digest::digest(&ring::digest::SHA256, key);
            hex::encode(&digest.as_ref()[..FINGERPRINT_LEN])
        })
    }

    /// Compare two keys without exposing either.
    pub fn same_key_as(&self, other: &MasterKey) -> Result<bool, KeyAccessError> {
        let mine = self.with_key(|key| Zeroizing::new(*key))?;
        other.with_key(|theirs| bool::from(mine.as_slice().ct_eq(theirs.as_slice())))
    }
}
