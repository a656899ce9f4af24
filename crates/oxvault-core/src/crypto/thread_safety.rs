//! Thread safety implementations for cryptographic types.
//!
//! This module provides the `unsafe impl Send` and `unsafe impl Sync` for `MasterKey`.
//! They are sound because every access to the underlying `MemSafe` goes through the
//! key's `RwLock`, and the raw pointer inside `MemSafe` is never dereferenced
//! without holding that lock.
//!
//! # Safety Rationale
//!
//! The `MemSafe` type from the `memsafe` crate contains a raw pointer (`*mut T`) because
//! it manages memory protection at the OS level. This raw pointer prevents automatic
//! `Send` and `Sync` implementations. Our usage is safe because:
//!
//! - The `MemSafe` is wrapped in an `RwLock` that synchronizes all access
//! - `mlock`, `mprotect` and `MADV_DONTDUMP` are thread-safe system calls
//! - The raw pointer is never exposed, and no aliased references to the protected
//!   memory are created

use super::keys::MasterKey;

// SAFETY: MasterKey can be sent between threads because:
// - Its only field is an RwLock which synchronizes access
// - The underlying MemSafe's raw pointer points to memory that is valid
//   regardless of which thread accesses it
unsafe impl Send for MasterKey {}

// SAFETY: MasterKey can be shared between threads because:
// - All access to the key material goes through RwLock::write()
// - The raw pointer in MemSafe is never accessed without holding the lock
unsafe impl Sync for MasterKey {}
