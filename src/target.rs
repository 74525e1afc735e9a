//! Structural change detection for the targets of cached calls.
//!
//! A cached call step is keyed by its path from the root, not by the object
//! it was called on. When that object is mutated between evaluations the key
//! stays the same while the cached answer goes stale, so the evaluator hashes
//! the target on every pass and compares with what it saw last time.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::hash::StructuralHash;
use crate::key::QueryKey;
use crate::tracer::TargetChange;

/// Last observed target hash per call key.
pub struct TargetHashTable {
    hashes: Mutex<HashMap<QueryKey, StructuralHash, ahash::RandomState>>,
}

impl Default for TargetHashTable {
    fn default() -> Self {
        Self::new()
    }
}

impl TargetHashTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            hashes: Mutex::new(HashMap::with_hasher(ahash::RandomState::new())),
        }
    }

    /// Record `observed` for `key` and report how it compares with the
    /// previous observation. The stored hash is overwritten in every case.
    pub fn check_and_record(&self, key: &QueryKey, observed: StructuralHash) -> TargetChange {
        match self.hashes.lock().insert(key.clone(), observed) {
            None => TargetChange::First,
            Some(previous) if previous == observed => TargetChange::Unchanged,
            Some(_) => TargetChange::Changed,
        }
    }

    /// Last hash recorded for `key`.
    pub fn get(&self, key: &QueryKey) -> Option<StructuralHash> {
        self.hashes.lock().get(key).copied()
    }

    /// Forget every recorded hash.
    pub fn reset(&self) {
        self.hashes.lock().clear();
    }

    /// Number of keys with a recorded hash.
    pub fn len(&self) -> usize {
        self.hashes.lock().len()
    }

    /// Returns true if no hash is recorded.
    pub fn is_empty(&self) -> bool {
        self.hashes.lock().is_empty()
    }
}
