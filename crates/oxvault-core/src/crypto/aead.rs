//! AES-256-GCM sealing of individual secret values.
//!
//! Every call to [`encrypt`] or [`SealingKey::seal`] draws a fresh 96-bit nonce
//! from the OS-seeded CSPRNG. The 128-bit tag is kept detached from the
//! ciphertext so the persisted record exposes all three parts separately.

use std::fmt;

use aes_gcm::{
    Aes256Gcm, Key, Nonce, Tag,
    aead::{AeadInPlace, KeyInit},
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_with::base64::Base64;
use serde_with::serde_as;
use tracing::{trace, warn};
use zeroize::Zeroizing;

use super::CryptoError;
use super::keys::{KEY_LEN, MasterKey};

/// AES-GCM nonce length in bytes (96 bits).
pub const NONCE_LEN: usize = 12;

/// AES-GCM authentication tag length in bytes (128 bits).
pub const TAG_LEN: usize = 16;

/// The output of one AES-256-GCM encryption.
///
/// Byte fields are serialized as standard base64.
#[serde_as]
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedValue {
    #[serde_as(as = "Base64")]
    pub nonce: [u8; NONCE_LEN],
    #[serde_as(as = "Base64")]
    pub ciphertext: Vec<u8>,
    #[serde_as(as = "Base64")]
    pub tag: [u8; TAG_LEN],
}

impl fmt::Debug for SealedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SealedValue")
            .field("nonce", &hex::encode(self.nonce))
            .field("ciphertext_len", &self.ciphertext.len())
            .field("tag", &hex::encode(self.tag))
            .finish()
    }
}

/// Encrypt `plaintext` under a raw 256-bit key, binding `aad` into the tag.
///
/// # Errors
///
/// - `CryptoError::InvalidKey` if `key` is not exactly 32 bytes
/// - `CryptoError::EncryptionFailed` if the plaintext exceeds the GCM length limit
pub fn encrypt(key: &[u8], plaintext: &[u8], aad: &[u8]) -> Result<SealedValue, CryptoError> {
    cipher_from_slice(key)?.seal(plaintext, aad)
}

/// Decrypt a sealed value under a raw 256-bit key.
///
/// The plaintext is returned only after the tag verifies against the nonce,
/// ciphertext and `aad`.
///
/// # Errors
///
/// - `CryptoError::InvalidKey` if `key` is not exactly 32 bytes
/// - `CryptoError::AuthenticationFailed` if any input was altered or the key is wrong
pub fn decrypt(
    key: &[u8],
    sealed: &SealedValue,
    aad: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    cipher_from_slice(key)?.open(sealed, aad)
}

fn cipher_from_slice(key: &[u8]) -> Result<SealingKey, CryptoError> {
    if key.len() != KEY_LEN {
        return Err(CryptoError::InvalidKey {
            expected: KEY_LEN,
            actual: key.len(),
        });
    }
    let key = Key::<Aes256Gcm>::from_slice(key);
    Ok(SealingKey {
        cipher: Aes256Gcm::new(key),
    })
}

/// An AES-256-GCM cipher instance bound to one master key.
///
/// Built once through [`MasterKey::with_key`] so that a batch of seal/open calls
/// does not re-enter the protected key region for every record. The instance is
/// `Send + Sync` and is shared by reference across rotation worker threads.
pub struct SealingKey {
    cipher: Aes256Gcm,
}

impl fmt::Debug for SealingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SealingKey")
            .field("cipher", &"[REDACTED]")
            .finish()
    }
}

impl SealingKey {
    /// Build a cipher from the master key's protected material.
    pub fn new(master_key: &MasterKey) -> Result<Self, CryptoError> {
        let cipher = master_key.with_key(|aes_key| {
            let key: &Key<Aes256Gcm> = aes_key.into();
            Aes256Gcm::new(key)
        })?;
        Ok(SealingKey { cipher })
    }

    /// Build a cipher from raw key bytes.
    pub fn from_bytes(key: &[u8]) -> Result<Self, CryptoError> {
        cipher_from_slice(key)
    }

    /// Encrypt `plaintext` with a fresh random nonce.
    pub fn seal(&self, plaintext: &[u8], aad: &[u8]) -> Result<SealedValue, CryptoError> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce);

        let mut ciphertext = plaintext.to_vec();
        let tag = self
            .cipher
            .encrypt_in_place_detached(Nonce::from_slice(&nonce), aad, &mut ciphertext)
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

        let mut tag_bytes = [0u8; TAG_LEN];
        tag_bytes.copy_from_slice(&tag);

        trace!(plaintext_len = plaintext.len(), "Value sealed");
        Ok(SealedValue {
            nonce,
            ciphertext,
            tag: tag_bytes,
        })
    }

    /// Verify and decrypt a sealed value.
    pub fn open(
        &self,
        sealed: &SealedValue,
        aad: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        let mut buffer = Zeroizing::new(sealed.ciphertext.clone());
        self.cipher
            .decrypt_in_place_detached(
                Nonce::from_slice(&sealed.nonce),
                aad,
                &mut buffer,
                Tag::from_slice(&sealed.tag),
            )
            .map_err(|_| {
                warn!("[INTEGRITY VIOLATION] Decryption failed: authentication tag mismatch");
                CryptoError::AuthenticationFailed
            })?;
        Ok(buffer)
    }
}
