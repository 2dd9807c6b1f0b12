//! A fixed-depth sparse Merkle tree over 32-byte digests.
//!
//! The tree addresses its leaves by position rather than by key: position `i`
//! is the `i`-th leaf from the left of a complete binary tree of depth `D`.
//! Subtrees that were never written are represented implicitly by a cached
//! empty digest per level, so a depth-40 tree only stores the nodes above the
//! leaves that were actually allocated.
//!
//! - [`Tree`][tree::Tree] supports point updates, path proofs and a parallel
//!   bulk build from a complete leaf array ([`Tree::from_leaves`][tree::Tree::from_leaves]).
//! - [`Proof`][proof::Proof] recomputes the root along a fixed sibling path. A
//!   single proof authenticates both the old and the new value of a leaf.
//! - The hash function is pluggable through [`Hasher`][hasher::Hasher].

#![deny(rustdoc::broken_intra_doc_links)]
#![deny(missing_debug_implementations)]

pub mod bulk;
pub mod config;
pub mod digest;
pub mod hasher;
pub mod proof;
#[cfg(test)]
mod smt_test;
#[cfg(test)]
pub(crate) mod testing_utils;
pub mod tree;

pub use config::TreeConfig;
pub use digest::Digest;
pub use hasher::{Hasher, KeccakHasher, PoseidonHasher};
pub use proof::Proof;
pub use tree::{SmtError, SmtResult, Tree, EMPTY_LEAF};
