//! An authenticated, ordered key-value accumulator.
//!
//! Keys and values live in the leaves of a fixed-depth sparse Merkle tree
//! ([`smt_trie::Tree`]), chained into a doubly linked list sorted by key
//! hash. The [`ProverState`][prover::ProverState] holds the whole tree and
//! answers five operations, each producing a [`Trace`][trace::Trace]:
//!
//! - insertion of a new key,
//! - update of the value of a stored key,
//! - deletion of a stored key,
//! - proof of absence of a key (read-zero),
//! - proof of membership of a key with its value (read-non-zero).
//!
//! A [`VerifierState`][verifier::VerifierState] only holds the sub-tree root
//! and the next free position. It replays traces, checking every proof
//! against the root left by the previous step, and ends on the same roots as
//! the prover.
//!
//! ```
//! use ethereum_types::H256;
//! use kv_accumulator::prover::ProverState;
//! use smt_trie::{PoseidonHasher, TreeConfig};
//!
//! let mut prover =
//!     ProverState::<H256, H256, PoseidonHasher>::new("0x01", TreeConfig::with_depth(16)).unwrap();
//! let mut verifier = prover.verifier_state();
//!
//! let trace = prover
//!     .insert_and_prove(H256::from_low_u64_be(1), H256::from_low_u64_be(2))
//!     .unwrap();
//! verifier.insert_verify(&trace).unwrap();
//!
//! assert_eq!(verifier.top_root(), prover.top_root());
//! ```

#![deny(rustdoc::broken_intra_doc_links)]
#![deny(missing_debug_implementations)]

pub mod codec;
pub mod leaf_opening;
pub mod prover;
#[cfg(test)]
pub(crate) mod testing_utils;
pub mod trace;
pub mod verifier;

pub use codec::{top_root, AccumulatorEntry, Hashable};
pub use leaf_opening::{KVOpeningTuple, LeafOpening};
pub use prover::{AccumulatorError, AccumulatorResult, ProverState};
pub use trace::{
    DeletionTrace, InsertionTrace, ReadNonZeroTrace, ReadZeroTrace, Trace, TraceType, UpdateTrace,
};
pub use verifier::{VerificationError, VerificationResult, VerifierState};
