//! Structural hashing.
//!
//! A structural hash fingerprints a value by its content rather than by its
//! address. It is used both to fingerprint method arguments inside query keys
//! and to notice when an upstream object changed between two evaluations.

use std::fmt;
use std::hash::{BuildHasher, Hash, Hasher};

// Fixed seeds keep the hash stable for the life of the process, unlike
// `ahash::RandomState::new()` which is reseeded per map.
const SEEDS: [u64; 4] = [
    0x243f_6a88_85a3_08d3,
    0x1319_8a2e_0370_7344,
    0xa409_3822_299f_31d0,
    0x082e_fa98_ec4e_6c89,
];

/// Fixed-width fingerprint of a value's structure.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct StructuralHash(pub u64);

impl fmt::Debug for StructuralHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:016x}", self.0)
    }
}

impl fmt::Display for StructuralHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Compute the structural hash of any hashable value.
///
/// Structurally equal inputs always produce the same token within a process.
///
/// ```
/// use query_chain::structural_hash;
///
/// assert_eq!(structural_hash(&("customer", 1)), structural_hash(&("customer", 1)));
/// assert_ne!(structural_hash(&("customer", 1)), structural_hash(&("customer", 2)));
/// ```
pub fn structural_hash<T: Hash + ?Sized>(value: &T) -> StructuralHash {
    let mut hasher = build_state().build_hasher();
    value.hash(&mut hasher);
    StructuralHash(hasher.finish())
}

fn build_state() -> ahash::RandomState {
    ahash::RandomState::with_seeds(SEEDS[0], SEEDS[1], SEEDS[2], SEEDS[3])
}
