#![allow(dead_code)] // Each test binary uses a different subset

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use oxvault_core::crypto::MasterKey;
use oxvault_core::vault::{
    AuditEntry, AuditSink, AuditSinkError, MemorySnapshotStore, PersistenceError, SnapshotStore,
    Vault, VaultOptions, VaultSnapshot,
};

/// Route engine logs to the test harness. Honours `RUST_LOG`; safe to call repeatedly.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Create a deterministic MasterKey for testing
pub fn create_test_master_key() -> MasterKey {
    MasterKey::new([0x01; 32]).unwrap()
}

pub fn open_memory_vault(options: VaultOptions) -> (Vault, Arc<MemorySnapshotStore>) {
    let store = Arc::new(MemorySnapshotStore::new());
    let vault = Vault::open(create_test_master_key(), store.clone(), options).unwrap();
    (vault, store)
}

/// Store that fails the next `n` saves, then behaves like a memory store.
#[derive(Debug, Default)]
pub struct FlakyStore {
    inner: MemorySnapshotStore,
    failures_left: AtomicU32,
    saves: AtomicU32,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, n: u32) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    /// Successful saves so far.
    pub fn saves(&self) -> u32 {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn stored(&self) -> Option<VaultSnapshot> {
        self.inner.load().unwrap()
    }
}

impl SnapshotStore for FlakyStore {
    fn load(&self) -> Result<Option<VaultSnapshot>, PersistenceError> {
        self.inner.load()
    }

    fn save(&self, snapshot: &VaultSnapshot) -> Result<(), PersistenceError> {
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(PersistenceError::Backend("injected failure".into()));
        }
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.inner.save(snapshot)
    }
}

/// Sink that keeps every entry it receives, and can be taken offline.
#[derive(Debug, Default)]
pub struct RecordingSink {
    entries: Mutex<Vec<AuditEntry>>,
    offline: AtomicBool,
}

impl RecordingSink {
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().unwrap().clone()
    }

    pub fn sequences(&self) -> Vec<u64> {
        self.entries().iter().map(|e| e.sequence).collect()
    }

    /// While offline every append is rejected.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }
}

impl AuditSink for RecordingSink {
    fn append(&self, entry: &AuditEntry) -> Result<(), AuditSinkError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(AuditSinkError::Backend("sink offline".into()));
        }
        self.entries.lock().unwrap().push(entry.clone());
        Ok(())
    }
}
