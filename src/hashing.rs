//! This module provides a deterministic hasher and `HashMap` and `HashSet` variants that use
//! it. The hashing data structures in the standard library are not deterministic:
//!
//! > By default, HashMap uses a hashing algorithm selected to provide
//! > resistance against HashDoS attacks. The algorithm is randomly seeded, and a
//! > reasonable best-effort is made to generate this seed from a high quality,
//! > secure source of randomness provided by the host without blocking the program.
//!
//! Iteration order over a cell's pending queue bookkeeping or a transition-time table must not
//! depend on process-level randomness, so the kernel uses `rustc_hash` everywhere.
//!
//! `hash_usize` derives the per-slot seeds of `crate::random::RandomManager`.

use std::hash::{Hash, Hasher};

use rustc_hash::FxHasher;
pub use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};

/// A convenience method to compute the hash of a `usize`, e.g. a worker slot.
pub fn hash_usize(value: usize) -> u64 {
    let mut hasher = FxHasher::default();
    value.hash(&mut hasher);
    hasher.finish()
}
