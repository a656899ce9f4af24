//! Rotation tests: value preservation, all-or-nothing aborts and commit retry.

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;

use common::{
    FlakyStore, RecordingSink, create_test_master_key, init_test_tracing, open_memory_vault,
};
use oxvault_core::crypto::MasterKey;
use oxvault_core::vault::{
    AuditOperation, MemorySnapshotStore, SecretEntry, SnapshotStore, Vault, VaultError,
    VaultOptions,
};
use secrecy::ExposeSecret;

/// Every readable `(name, version, value)` in the vault.
fn all_values(vault: &Vault) -> Vec<(String, u64, String)> {
    let snapshot = vault.snapshot().unwrap();
    snapshot
        .secrets
        .entries()
        .flat_map(|entry| {
            entry.versions.iter().map(|record| {
                let value = vault
                    .get(&entry.name, Some(record.version))
                    .unwrap()
                    .expose_secret()
                    .to_string();
                (entry.name.clone(), record.version, value)
            })
        })
        .collect()
}

fn populate(vault: &Vault) {
    for i in 0..20 {
        let name = format!("secret-{i}");
        let mut metadata = BTreeMap::new();
        metadata.insert("index".to_string(), i.to_string());
        for v in 0..=(i % 4) {
            vault
                .set(&name, &format!("{name}-value-{v}"), Some(metadata.clone()))
                .unwrap();
        }
        if i % 5 == 0 {
            vault.delete(&name).unwrap();
        }
    }
}

#[test]
fn test_rotation_preserves_every_version() {
    let (vault, _store) = open_memory_vault(VaultOptions::default());
    populate(&vault);

    let before_values = all_values(&vault);
    let before = vault.snapshot().unwrap();

    vault.rotate(None).unwrap();

    assert_eq!(all_values(&vault), before_values);
    let after = vault.snapshot().unwrap();
    assert_eq!(after.secrets.live_names(), before.secrets.live_names());
    for (old, new) in before.secrets.entries().zip(after.secrets.entries()) {
        assert_eq!(old.name, new.name);
        assert_eq!(old.tombstoned, new.tombstoned);
        assert_eq!(old.versions.len(), new.versions.len());
        for (r_old, r_new) in old.versions.iter().zip(&new.versions) {
            assert_eq!(r_old.version, r_new.version);
            assert_eq!(r_old.metadata, r_new.metadata);
            assert_eq!(r_old.created_at, r_new.created_at);
            assert_ne!(r_old.sealed.nonce, r_new.sealed.nonce);
        }
    }
}

#[test]
fn test_rotation_adds_exactly_one_audit_entry() {
    let (vault, _store) = open_memory_vault(VaultOptions::default());
    populate(&vault);
    let before = vault.audit_log(None, usize::MAX).unwrap().len();

    vault.rotate(None).unwrap();

    let log = vault.audit_log(None, usize::MAX).unwrap();
    assert_eq!(log.len(), before + 1);
    assert_eq!(log[0].operation, AuditOperation::Rotate);
    assert_eq!(log[0].name, None);
    assert_eq!(log[0].version, None);
}

#[test]
fn test_rotation_with_supplied_key() {
    let (vault, store) = open_memory_vault(VaultOptions::default());
    vault.set("a", "v", None).unwrap();

    let supplied = MasterKey::new([0x07; 32]).unwrap();
    let expected = supplied.fingerprint().unwrap();
    let returned = vault.rotate(Some(supplied)).unwrap();
    assert_eq!(returned.fingerprint().unwrap(), expected);
    assert_eq!(vault.key_fingerprint().unwrap(), expected);

    // The committed snapshot opens with the new key only
    let reopened = Vault::open(
        MasterKey::new([0x07; 32]).unwrap(),
        store.clone(),
        VaultOptions::default(),
    )
    .unwrap();
    assert_eq!(reopened.get("a", None).unwrap().expose_secret(), "v");

    let stale = Vault::open(create_test_master_key(), store, VaultOptions::default()).unwrap();
    assert!(matches!(
        stale.get("a", None),
        Err(VaultError::AuthenticationFailed { .. })
    ));
}

#[test]
fn test_rotation_of_empty_vault() {
    let (vault, store) = open_memory_vault(VaultOptions::default());
    vault.rotate(None).unwrap();
    let stored = store.current().unwrap().unwrap();
    assert!(stored.secrets.is_empty());
    assert_eq!(stored.audit.len(), 1);
}

#[test]
fn test_aborted_rotation_leaves_store_untouched() {
    init_test_tracing();
    let (vault, store) = open_memory_vault(VaultOptions::default());
    populate(&vault);

    // Corrupt one historical record of a tombstoned secret
    let mut snapshot = store.current().unwrap().unwrap();
    let mut entries: Vec<SecretEntry> = snapshot.secrets.clone().into();
    let victim = entries.iter().position(|e| e.name == "secret-15").unwrap();
    entries[victim].versions[2].sealed.tag[7] ^= 0x20;
    snapshot.secrets = entries.try_into().unwrap();

    let store = Arc::new(MemorySnapshotStore::with_snapshot(snapshot.clone()));
    let vault = Vault::open(create_test_master_key(), store.clone(), VaultOptions::default()).unwrap();
    let fingerprint = vault.key_fingerprint().unwrap();

    let err = vault.rotate(None).unwrap_err();
    assert!(matches!(
        err,
        VaultError::RotationAborted { ref name, version: 3, .. } if name == "secret-15"
    ));

    assert_eq!(vault.snapshot().unwrap(), snapshot);
    assert_eq!(store.current().unwrap().unwrap(), snapshot);
    assert_eq!(vault.key_fingerprint().unwrap(), fingerprint);
    assert_eq!(vault.pending_rotation().unwrap(), None);
    assert_eq!(
        serde_json::to_vec(&store.load().unwrap().unwrap()).unwrap(),
        serde_json::to_vec(&snapshot).unwrap()
    );

    // Undamaged secrets still read under the old key
    assert_eq!(
        vault.get("secret-1", None).unwrap().expose_secret(),
        "secret-1-value-1"
    );
}

#[test]
fn test_commit_failure_keeps_old_key_and_allows_retry() {
    init_test_tracing();
    let sink = Arc::new(RecordingSink::default());
    let store = Arc::new(FlakyStore::new());
    let vault = Vault::builder(create_test_master_key(), store.clone())
        .audit_sink(sink.clone())
        .open()
        .unwrap();
    vault.set("a", "v1", None).unwrap();
    let committed = store.stored().unwrap();
    let old_fingerprint = vault.key_fingerprint().unwrap();

    store.fail_next(1);
    let new_key = MasterKey::new([0x0A; 32]).unwrap();
    let new_fingerprint = new_key.fingerprint().unwrap();
    assert!(matches!(
        vault.rotate(Some(new_key)),
        Err(VaultError::Persistence(_))
    ));

    // Live state is still the old epoch
    assert_eq!(vault.key_fingerprint().unwrap(), old_fingerprint);
    assert_eq!(vault.snapshot().unwrap(), committed);
    assert_eq!(vault.get("a", None).unwrap().expose_secret(), "v1");
    assert_eq!(vault.pending_rotation().unwrap(), Some(new_fingerprint.clone()));
    assert_eq!(sink.sequences(), vec![1]);

    let returned = vault.retry_rotation_commit().unwrap();
    assert_eq!(returned.fingerprint().unwrap(), new_fingerprint);
    assert_eq!(vault.key_fingerprint().unwrap(), new_fingerprint);
    assert_eq!(vault.pending_rotation().unwrap(), None);
    assert_eq!(vault.get("a", None).unwrap().expose_secret(), "v1");
    assert_eq!(sink.sequences(), vec![1, 2]);
    assert_eq!(store.stored().unwrap(), vault.snapshot().unwrap());
}

#[test]
fn test_retry_keeps_reads_audited_while_pending() {
    let store = Arc::new(FlakyStore::new());
    let vault = Vault::open(
        create_test_master_key(),
        store.clone(),
        VaultOptions::default().with_audit_reads(true),
    )
    .unwrap();
    vault.set("a", "v1", None).unwrap();

    store.fail_next(1);
    assert!(vault.rotate(None).is_err());
    vault.get("a", None).unwrap();
    vault.retry_rotation_commit().unwrap();

    let ops: Vec<_> = store
        .stored()
        .unwrap()
        .audit
        .entries()
        .iter()
        .map(|e| e.operation)
        .collect();
    assert_eq!(
        ops,
        vec![AuditOperation::Set, AuditOperation::Get, AuditOperation::Rotate]
    );
}

#[test]
fn test_pending_rotation_discarded_after_retry_budget() {
    let store = Arc::new(FlakyStore::new());
    let vault = Vault::open(
        create_test_master_key(),
        store.clone(),
        VaultOptions::default().with_rotation_commit_retries(2),
    )
    .unwrap();
    vault.set("a", "v1", None).unwrap();

    store.fail_next(3);
    assert!(vault.rotate(None).is_err());
    assert!(vault.retry_rotation_commit().is_err());
    assert!(vault.pending_rotation().unwrap().is_some());
    assert!(vault.retry_rotation_commit().is_err());
    assert_eq!(vault.pending_rotation().unwrap(), None);
    assert!(matches!(
        vault.retry_rotation_commit(),
        Err(VaultError::NoPendingRotation)
    ));

    // Still fully usable on the old key
    assert_eq!(vault.get("a", None).unwrap().expose_secret(), "v1");
}

#[test]
fn test_zero_retry_budget_keeps_nothing() {
    let store = Arc::new(FlakyStore::new());
    let vault = Vault::open(
        create_test_master_key(),
        store.clone(),
        VaultOptions::default().with_rotation_commit_retries(0),
    )
    .unwrap();

    store.fail_next(1);
    assert!(vault.rotate(None).is_err());
    assert_eq!(vault.pending_rotation().unwrap(), None);
}

#[test]
fn test_mutation_discards_pending_rotation() {
    let store = Arc::new(FlakyStore::new());
    let vault = Vault::open(create_test_master_key(), store.clone(), VaultOptions::default()).unwrap();
    vault.set("a", "v1", None).unwrap();

    store.fail_next(1);
    assert!(vault.rotate(None).is_err());
    assert!(vault.pending_rotation().unwrap().is_some());

    vault.set("a", "v2", None).unwrap();
    assert_eq!(vault.pending_rotation().unwrap(), None);
    assert!(matches!(
        vault.retry_rotation_commit(),
        Err(VaultError::NoPendingRotation)
    ));
}

#[test]
fn test_rolled_back_mutation_keeps_pending_rotation() {
    let store = Arc::new(FlakyStore::new());
    let vault = Vault::open(create_test_master_key(), store.clone(), VaultOptions::default()).unwrap();
    vault.set("a", "v1", None).unwrap();

    store.fail_next(1);
    let new_key = MasterKey::new([0x0B; 32]).unwrap();
    let new_fingerprint = new_key.fingerprint().unwrap();
    assert!(vault.rotate(Some(new_key)).is_err());

    // The set's own commit fails, so nothing changed and the rotation stays valid
    store.fail_next(1);
    assert!(matches!(
        vault.set("a", "v2", None),
        Err(VaultError::Persistence(_))
    ));
    assert_eq!(vault.pending_rotation().unwrap(), Some(new_fingerprint.clone()));

    let returned = vault.retry_rotation_commit().unwrap();
    assert_eq!(returned.fingerprint().unwrap(), new_fingerprint);
    assert_eq!(vault.get("a", None).unwrap().expose_secret(), "v1");
    assert_eq!(vault.list_versions("a").unwrap().len(), 1);
    assert_eq!(store.stored().unwrap(), vault.snapshot().unwrap());
}

#[test]
fn test_rotation_commits_even_without_auto_save() {
    let store = Arc::new(FlakyStore::new());
    let vault = Vault::open(
        create_test_master_key(),
        store.clone(),
        VaultOptions::default().with_auto_save(false),
    )
    .unwrap();
    vault.set("a", "v1", None).unwrap();
    assert_eq!(store.saves(), 0);

    vault.rotate(None).unwrap();
    assert_eq!(store.saves(), 1);
    assert!(!vault.is_dirty().unwrap());
    assert_eq!(store.stored().unwrap(), vault.snapshot().unwrap());
}
