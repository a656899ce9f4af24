//! Fuzz target for opening sealed values
//!
//! Arbitrary nonce, ciphertext, tag and associated data must either fail
//! authentication or, for a value sealed here and left untouched, round-trip.
//! No input may panic or yield plaintext for a modified record.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use oxvault_core::crypto::aead::{SealedValue, SealingKey};
use oxvault_core::crypto::CryptoError;

const FIXED_KEY: [u8; 32] = [
    0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07,
    0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e, 0x0f,
    0x10, 0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17,
    0x18, 0x19, 0x1a, 0x1b, 0x1c, 0x1d, 0x1e, 0x1f,
];

#[derive(Arbitrary, Debug)]
enum FuzzInput {
    /// Open a completely attacker-controlled record
    Forged {
        nonce: [u8; 12],
        ciphertext: Vec<u8>,
        tag: [u8; 16],
        aad: Vec<u8>,
    },
    /// Seal, flip one bit somewhere, open
    Tampered {
        plaintext: Vec<u8>,
        aad: Vec<u8>,
        bit: usize,
    },
}

fuzz_target!(|input: FuzzInput| {
    let Ok(key) = SealingKey::from_bytes(&FIXED_KEY) else {
        return;
    };

    match input {
        FuzzInput::Forged { nonce, ciphertext, tag, aad } => {
            let sealed = SealedValue { nonce, ciphertext, tag };
            // Forging a valid tag is infeasible; any success would be a bug.
            assert!(matches!(key.open(&sealed, &aad), Err(CryptoError::AuthenticationFailed)));
        }
        FuzzInput::Tampered { plaintext, aad, bit } => {
            let Ok(mut sealed) = key.seal(&plaintext, &aad) else {
                return;
            };
            let opened = key.open(&sealed, &aad).expect("untampered value opens");
            assert_eq!(opened.as_slice(), plaintext.as_slice());

            let bits = (12 + sealed.ciphertext.len() + 16) * 8;
            let bit = bit % bits;
            let (byte, mask) = (bit / 8, 1u8 << (bit % 8));
            if byte < 12 {
                sealed.nonce[byte] ^= mask;
            } else if byte < 12 + sealed.ciphertext.len() {
                sealed.ciphertext[byte - 12] ^= mask;
            } else {
                sealed.tag[byte - 12 - sealed.ciphertext.len()] ^= mask;
            }
            assert!(key.open(&sealed, &aad).is_err());
        }
    }
});
