//! Fuzz target for snapshot deserialization
//!
//! Parsing untrusted snapshot JSON must never panic, and any snapshot that
//! parses must satisfy the ledger and audit invariants.

#![no_main]

use libfuzzer_sys::fuzz_target;
use oxvault_core::vault::VaultSnapshot;

fuzz_target!(|data: &[u8]| {
    let Ok(snapshot) = serde_json::from_slice::<VaultSnapshot>(data) else {
        return;
    };

    for entry in snapshot.secrets.entries() {
        assert!(!entry.versions.is_empty());
        for (expected, record) in (1u64..).zip(&entry.versions) {
            assert_eq!(record.version, expected);
        }
    }
    let sequences: Vec<u64> = snapshot.audit.entries().iter().map(|e| e.sequence).collect();
    assert!(sequences.windows(2).all(|w| w[0] < w[1]));
});
