//! Leaves of the accumulator's doubly linked list.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use smt_trie::{Digest, Hasher};

use crate::codec::{write_index, Hashable, INDEX_LEN};

/// Length of the canonical encoding of a [`LeafOpening`].
pub const LEAF_OPENING_LEN: usize = 2 * INDEX_LEN + 2 * 32;

/// Position of the head sentinel.
pub const HEAD_POSITION: u64 = 0;
/// Position of the tail sentinel.
pub const TAIL_POSITION: u64 = 1;

/// The pre-image of a leaf: its neighbours in key order and the hashes of the
/// key and value it holds. The leaf committed in the tree is the hash of this
/// structure's canonical encoding.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct LeafOpening {
    #[serde(rename = "prevLeaf")]
    pub prev: u64,
    #[serde(rename = "nextLeaf")]
    pub next: u64,
    pub hkey: Digest,
    pub hval: Digest,
}

impl LeafOpening {
    /// The head sentinel. Its key hash is the minimum digest.
    pub const fn head() -> Self {
        Self {
            prev: HEAD_POSITION,
            next: TAIL_POSITION,
            hkey: Digest::ZERO,
            hval: Digest::ZERO,
        }
    }

    /// The tail sentinel. Its key hash is the maximum digest.
    pub const fn tail() -> Self {
        Self {
            prev: HEAD_POSITION,
            next: TAIL_POSITION,
            hkey: Digest::MAX,
            hval: Digest::ZERO,
        }
    }

    pub fn is_head_or_tail(&self) -> bool {
        self.hkey == Digest::ZERO || self.hkey == Digest::MAX
    }

    /// `prev || next || hkey || hval`, the positions written as 64-byte
    /// big-endian integers.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(LEAF_OPENING_LEN);
        self.write_to(&mut out);
        out
    }

    /// The leaf committed in the tree for this opening.
    pub fn hash<H: Hasher>(&self) -> Digest {
        H::hash_bytes(&self.encode())
    }

    pub fn copy_with_prev(&self, prev: u64) -> Self {
        Self { prev, ..*self }
    }

    pub fn copy_with_next(&self, next: u64) -> Self {
        Self { next, ..*self }
    }

    /// Number of fields among `prev`, `next` and `hval` that differ between
    /// `self` and `other`, or `None` if the key hashes differ.
    pub fn changed_fields(&self, other: &Self) -> Option<usize> {
        if self.hkey != other.hkey {
            return None;
        }
        Some(
            usize::from(self.prev != other.prev)
                + usize::from(self.next != other.next)
                + usize::from(self.hval != other.hval),
        )
    }
}

impl Hashable for LeafOpening {
    fn write_to(&self, out: &mut Vec<u8>) {
        write_index(out, self.prev);
        write_index(out, self.next);
        out.extend_from_slice(self.hkey.as_bytes());
        out.extend_from_slice(self.hval.as_bytes());
    }
}

impl Display for LeafOpening {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LeafOpening{{Prev: {}, Next: {}, HKey: {}, HVal: {}}}",
            self.prev, self.next, self.hkey, self.hval
        )
    }
}

/// A leaf opening together with the raw key and value it commits to.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KVOpeningTuple<K, V> {
    pub leaf_opening: LeafOpening,
    pub key: K,
    pub value: V,
}

impl<K: Hashable, V: Hashable> KVOpeningTuple<K, V> {
    pub fn new(leaf_opening: LeafOpening, key: K, value: V) -> Self {
        Self {
            leaf_opening,
            key,
            value,
        }
    }

    pub fn match_key<H: Hasher>(&self, key: &K) -> bool {
        self.leaf_opening.hkey == key.digest::<H>()
    }

    pub fn match_value<H: Hasher>(&self, value: &V) -> bool {
        self.leaf_opening.hval == value.digest::<H>()
    }

    /// Whether the opening commits to the tuple's own key and value.
    /// Sentinels hold no key or value and are always consistent.
    pub fn is_consistent<H: Hasher>(&self) -> bool {
        self.leaf_opening.is_head_or_tail()
            || (self.match_key::<H>(&self.key) && self.match_value::<H>(&self.value))
    }

    /// Returns the leaf to write in the tree for this tuple.
    ///
    /// # Panics
    /// Panics if the opening does not commit to the tuple's key and value.
    pub fn check_and_leaf<H: Hasher>(&self) -> Digest {
        assert!(
            self.is_consistent::<H>(),
            "leaf opening {} does not commit to its key and value",
            self.leaf_opening
        );
        self.leaf_opening.hash::<H>()
    }
}
