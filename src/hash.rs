//! Fixed-seed hashing for the crate's internal sets and maps.
//!
//! Every set here is keyed by small integer ids that the crate allocates
//! itself, so HashDoS resistance buys nothing. `FastHashBuilder` is zero-sized
//! and deterministic, which keeps iteration order of the hashed (non-indexed)
//! collections stable between runs.

use std::hash::BuildHasher;

use foldhash::fast::{FixedState, FoldHasher};
use indexmap::{IndexMap, IndexSet};

/// Zero-sized `BuildHasher` backed by foldhash with a constant seed.
#[derive(Clone, Copy, Debug, Default)]
pub struct FastHashBuilder;

impl BuildHasher for FastHashBuilder {
    type Hasher = FoldHasher<'static>;

    #[inline]
    fn build_hasher(&self) -> Self::Hasher {
        FixedState::with_seed(0x9e37_79b9_7f4a_7c15).build_hasher()
    }
}

/// Insertion-ordered set used for subscriber lists and dependency sets.
pub type FastIndexSet<T> = IndexSet<T, FastHashBuilder>;

/// Insertion-ordered map used for reactive map slots.
pub type FastIndexMap<K, V> = IndexMap<K, V, FastHashBuilder>;
