//! The verifier side of the accumulator.
//!
//! A verifier holds nothing but the roots: the sub-tree root and the next
//! free node. It replays each trace by chaining the trace's proofs: the first
//! proof authenticates the prior leaf against the current root, the root
//! recomputed with the rewritten leaf becomes the root the next proof must
//! authenticate against, and the last recomputed root must be the one the
//! trace claims. A rejected trace leaves the verifier untouched.

use std::marker::PhantomData;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use smt_trie::{Digest, Hasher, Proof, SmtError, TreeConfig, EMPTY_LEAF};
use thiserror::Error;

use crate::codec::{top_root, Hashable};
use crate::leaf_opening::{LeafOpening, HEAD_POSITION, TAIL_POSITION};
use crate::trace::{
    DeletionTrace, InsertionTrace, ReadNonZeroTrace, ReadZeroTrace, Trace, TraceType, UpdateTrace,
};

pub type VerificationResult<T> = Result<T, VerificationError>;

/// Why a trace was rejected.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum VerificationError {
    #[error("Trace is for accumulator {got} but the verifier tracks {expected}")]
    LocationMismatch { expected: String, got: String },

    #[error("Trace starts from sub-tree root {got} but the current root is {expected}")]
    OldRootMismatch { expected: Digest, got: Digest },

    #[error("Trace claims next free node {got} but {expected} was expected")]
    NextFreeNodeMismatch { expected: u64, got: u64 },

    #[error("Insertion must allocate position {expected} but uses {got}")]
    WrongInsertionSlot { expected: u64, got: u64 },

    #[error("Positions {0:?} must be pairwise distinct")]
    DuplicatePositions(Vec<u64>),

    #[error("Sentinel at position {0} cannot be updated or deleted")]
    SentinelTouched(u64),

    #[error("Leaves {left} and {right} are not adjacent in the linked list")]
    NotAdjacent { left: u64, right: u64 },

    #[error("Key hash {hkey} is not strictly between {lower} and {upper}")]
    KeyOutsideSandwich {
        hkey: Digest,
        lower: Digest,
        upper: Digest,
    },

    #[error(
        "Leaf {position} commits to key hash {committed} but the trace's key hashes to {claimed}"
    )]
    KeyHashMismatch {
        position: u64,
        committed: Digest,
        claimed: Digest,
    },

    #[error("Leaf {position} commits to value hash {committed} but the trace's value hashes to {claimed}")]
    ValueHashMismatch {
        position: u64,
        committed: Digest,
        claimed: Digest,
    },

    #[error("Merkle proof for position {position} does not authenticate its leaf")]
    InvalidMerkleProof { position: u64 },

    #[error(transparent)]
    MalformedProof(#[from] SmtError),

    #[error("Replay ends on sub-tree root {computed} but the trace claims {claimed}")]
    NewRootMismatch { claimed: Digest, computed: Digest },

    #[error("Trace #{index} rejected: {source}")]
    AtTrace {
        index: usize,
        #[source]
        source: Box<VerificationError>,
    },
}

/// The roots the verifier moves to once a trace is accepted.
struct Commit {
    next_free_node: u64,
    sub_tree_root: Digest,
}

/// The succinct state of an accumulator, as tracked by a verifier.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(bound = "", rename_all = "camelCase")]
pub struct VerifierState<H> {
    location: String,
    next_free_node: u64,
    sub_tree_root: Digest,
    config: TreeConfig,
    #[serde(skip)]
    _hasher: PhantomData<H>,
}

impl<H: Hasher> VerifierState<H> {
    pub fn new(
        location: String,
        next_free_node: u64,
        sub_tree_root: Digest,
        config: TreeConfig,
    ) -> Self {
        Self {
            location,
            next_free_node,
            sub_tree_root,
            config,
            _hasher: PhantomData,
        }
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn next_free_node(&self) -> u64 {
        self.next_free_node
    }

    pub fn sub_tree_root(&self) -> Digest {
        self.sub_tree_root
    }

    pub fn config(&self) -> TreeConfig {
        self.config
    }

    pub fn top_root(&self) -> Digest {
        top_root::<H>(self.next_free_node, &self.sub_tree_root)
    }

    /// Replays any trace.
    pub fn verify<K: Hashable, V: Hashable>(
        &mut self,
        trace: &Trace<K, V>,
    ) -> VerificationResult<()> {
        match trace {
            Trace::Insertion(t) => self.insert_verify(t),
            Trace::Update(t) => self.update_verify(t),
            Trace::Deletion(t) => self.delete_verify(t),
            Trace::ReadZero(t) => self.read_zero_verify(t),
            Trace::ReadNonZero(t) => self.read_non_zero_verify(t),
        }
    }

    /// Replays traces in order, stopping at the first rejected one. Traces
    /// before it stay applied.
    pub fn verify_all<'a, K, V, I>(&mut self, traces: I) -> VerificationResult<()>
    where
        K: Hashable + 'a,
        V: Hashable + 'a,
        I: IntoIterator<Item = &'a Trace<K, V>>,
    {
        for (index, trace) in traces.into_iter().enumerate() {
            self.verify(trace)
                .map_err(|source| VerificationError::AtTrace {
                    index,
                    source: Box::new(source),
                })?;
        }
        Ok(())
    }

    pub fn insert_verify<K: Hashable, V: Hashable>(
        &mut self,
        trace: &InsertionTrace<K, V>,
    ) -> VerificationResult<()> {
        let outcome = self.replay_insertion(trace);
        self.commit(TraceType::Insertion, outcome)
    }

    pub fn update_verify<K: Hashable, V: Hashable>(
        &mut self,
        trace: &UpdateTrace<K, V>,
    ) -> VerificationResult<()> {
        let outcome = self.replay_update(trace);
        self.commit(TraceType::Update, outcome)
    }

    pub fn delete_verify<K: Hashable, V: Hashable>(
        &mut self,
        trace: &DeletionTrace<K, V>,
    ) -> VerificationResult<()> {
        let outcome = self.replay_deletion(trace);
        self.commit(TraceType::Deletion, outcome)
    }

    pub fn read_zero_verify<K: Hashable>(
        &mut self,
        trace: &ReadZeroTrace<K>,
    ) -> VerificationResult<()> {
        let outcome = self.replay_read_zero(trace);
        self.commit(TraceType::ReadZero, outcome)
    }

    pub fn read_non_zero_verify<K: Hashable, V: Hashable>(
        &mut self,
        trace: &ReadNonZeroTrace<K, V>,
    ) -> VerificationResult<()> {
        let outcome = self.replay_read_non_zero(trace);
        self.commit(TraceType::ReadNonZero, outcome)
    }

    fn commit(
        &mut self,
        kind: TraceType,
        outcome: VerificationResult<Commit>,
    ) -> VerificationResult<()> {
        match outcome {
            Ok(commit) => {
                debug!(
                    "[{}] accepted {kind} trace, sub-tree root {} -> {}, next free node {} -> {}",
                    self.location,
                    self.sub_tree_root,
                    commit.sub_tree_root,
                    self.next_free_node,
                    commit.next_free_node
                );
                self.sub_tree_root = commit.sub_tree_root;
                self.next_free_node = commit.next_free_node;
                Ok(())
            }
            Err(err) => {
                warn!("[{}] rejected {kind} trace: {err}", self.location);
                Err(err)
            }
        }
    }

    fn replay_insertion<K: Hashable, V: Hashable>(
        &self,
        trace: &InsertionTrace<K, V>,
    ) -> VerificationResult<Commit> {
        self.check_header(&trace.location, &trace.old_sub_root)?;
        let Some(expected) = self.next_free_node.checked_add(1) else {
            return Err(VerificationError::NextFreeNodeMismatch {
                expected: self.next_free_node,
                got: trace.new_next_free_node,
            });
        };
        self.check_next_free_node(expected, trace.new_next_free_node)?;
        let (i_minus, i_new, i_plus) =
            self.check_positions([&trace.left_proof, &trace.new_proof, &trace.right_proof])?;
        if i_new != self.next_free_node {
            return Err(VerificationError::WrongInsertionSlot {
                expected: self.next_free_node,
                got: i_new,
            });
        }

        let prior_left = &trace.prior_left_leaf;
        let prior_right = &trace.prior_right_leaf;
        check_adjacent(i_minus, prior_left, i_plus, prior_right)?;
        let hkey = trace.key.digest::<H>();
        if !(prior_left.hkey < hkey && hkey < prior_right.hkey) {
            return Err(VerificationError::KeyOutsideSandwich {
                hkey,
                lower: prior_left.hkey,
                upper: prior_right.hkey,
            });
        }

        let inserted = LeafOpening {
            prev: i_minus,
            next: i_plus,
            hkey,
            hval: trace.value.digest::<H>(),
        };

        let root = self.sub_tree_root;
        let root = transition::<H>(
            root,
            &trace.left_proof,
            &prior_left.hash::<H>(),
            &prior_left.copy_with_next(i_new).hash::<H>(),
        )?;
        let root = transition::<H>(root, &trace.new_proof, &EMPTY_LEAF, &inserted.hash::<H>())?;
        let root = transition::<H>(
            root,
            &trace.right_proof,
            &prior_right.hash::<H>(),
            &prior_right.copy_with_prev(i_new).hash::<H>(),
        )?;

        check_new_root(&trace.new_sub_root, root)?;
        Ok(Commit {
            next_free_node: trace.new_next_free_node,
            sub_tree_root: root,
        })
    }

    fn replay_update<K: Hashable, V: Hashable>(
        &self,
        trace: &UpdateTrace<K, V>,
    ) -> VerificationResult<Commit> {
        self.check_header(&trace.location, &trace.old_sub_root)?;
        self.check_next_free_node(self.next_free_node, trace.new_next_free_node)?;
        trace.proof.check_shape(self.config.depth)?;

        let position = trace.proof.path;
        let prior = &trace.prior_updated_leaf;
        check_not_sentinel(position)?;
        check_key(position, prior, &trace.key.digest::<H>())?;
        check_value(position, prior, &trace.old_value.digest::<H>())?;

        let updated = LeafOpening {
            hval: trace.new_value.digest::<H>(),
            ..*prior
        };
        let root = transition::<H>(
            self.sub_tree_root,
            &trace.proof,
            &prior.hash::<H>(),
            &updated.hash::<H>(),
        )?;

        check_new_root(&trace.new_sub_root, root)?;
        Ok(Commit {
            next_free_node: self.next_free_node,
            sub_tree_root: root,
        })
    }

    fn replay_deletion<K: Hashable, V: Hashable>(
        &self,
        trace: &DeletionTrace<K, V>,
    ) -> VerificationResult<Commit> {
        self.check_header(&trace.location, &trace.old_sub_root)?;
        self.check_next_free_node(self.next_free_node, trace.new_next_free_node)?;
        let (i_minus, i_del, i_plus) =
            self.check_positions([&trace.left_proof, &trace.deleted_proof, &trace.right_proof])?;
        check_not_sentinel(i_del)?;

        let prior_left = &trace.prior_left_leaf;
        let prior_deleted = &trace.prior_deleted_leaf;
        let prior_right = &trace.prior_right_leaf;
        check_adjacent(i_minus, prior_left, i_del, prior_deleted)?;
        check_adjacent(i_del, prior_deleted, i_plus, prior_right)?;
        check_key(i_del, prior_deleted, &trace.key.digest::<H>())?;
        check_value(i_del, prior_deleted, &trace.deleted_value.digest::<H>())?;

        let root = self.sub_tree_root;
        let root = transition::<H>(
            root,
            &trace.left_proof,
            &prior_left.hash::<H>(),
            &prior_left.copy_with_next(i_plus).hash::<H>(),
        )?;
        let root = transition::<H>(
            root,
            &trace.deleted_proof,
            &prior_deleted.hash::<H>(),
            &EMPTY_LEAF,
        )?;
        let root = transition::<H>(
            root,
            &trace.right_proof,
            &prior_right.hash::<H>(),
            &prior_right.copy_with_prev(i_minus).hash::<H>(),
        )?;

        check_new_root(&trace.new_sub_root, root)?;
        Ok(Commit {
            next_free_node: self.next_free_node,
            sub_tree_root: root,
        })
    }

    fn replay_read_zero<K: Hashable>(
        &self,
        trace: &ReadZeroTrace<K>,
    ) -> VerificationResult<Commit> {
        self.check_header(&trace.location, &trace.sub_root)?;
        self.check_next_free_node(self.next_free_node, trace.next_free_node)?;
        for proof in [&trace.left_proof, &trace.right_proof] {
            proof.check_shape(self.config.depth)?;
        }

        let (i_minus, i_plus) = (trace.left_proof.path, trace.right_proof.path);
        if i_minus == i_plus {
            return Err(VerificationError::DuplicatePositions(vec![i_minus, i_plus]));
        }
        check_adjacent(i_minus, &trace.left_leaf, i_plus, &trace.right_leaf)?;
        let hkey = trace.key.digest::<H>();
        if !(trace.left_leaf.hkey < hkey && hkey < trace.right_leaf.hkey) {
            return Err(VerificationError::KeyOutsideSandwich {
                hkey,
                lower: trace.left_leaf.hkey,
                upper: trace.right_leaf.hkey,
            });
        }

        self.check_membership(&trace.left_proof, &trace.left_leaf)?;
        self.check_membership(&trace.right_proof, &trace.right_leaf)?;
        Ok(self.unchanged())
    }

    fn replay_read_non_zero<K: Hashable, V: Hashable>(
        &self,
        trace: &ReadNonZeroTrace<K, V>,
    ) -> VerificationResult<Commit> {
        self.check_header(&trace.location, &trace.sub_root)?;
        self.check_next_free_node(self.next_free_node, trace.next_free_node)?;
        trace.proof.check_shape(self.config.depth)?;

        let position = trace.proof.path;
        check_key(position, &trace.leaf, &trace.key.digest::<H>())?;
        check_value(position, &trace.leaf, &trace.value.digest::<H>())?;
        self.check_membership(&trace.proof, &trace.leaf)?;
        Ok(self.unchanged())
    }

    fn unchanged(&self) -> Commit {
        Commit {
            next_free_node: self.next_free_node,
            sub_tree_root: self.sub_tree_root,
        }
    }

    fn check_header(&self, location: &str, old_sub_root: &Digest) -> VerificationResult<()> {
        if location != self.location {
            return Err(VerificationError::LocationMismatch {
                expected: self.location.clone(),
                got: location.to_string(),
            });
        }
        if *old_sub_root != self.sub_tree_root {
            return Err(VerificationError::OldRootMismatch {
                expected: self.sub_tree_root,
                got: *old_sub_root,
            });
        }
        Ok(())
    }

    fn check_next_free_node(&self, expected: u64, got: u64) -> VerificationResult<()> {
        if got != expected {
            return Err(VerificationError::NextFreeNodeMismatch { expected, got });
        }
        Ok(())
    }

    /// Shape-checks three proofs and returns their pairwise distinct paths.
    fn check_positions(&self, proofs: [&Proof; 3]) -> VerificationResult<(u64, u64, u64)> {
        for proof in proofs {
            proof.check_shape(self.config.depth)?;
        }
        let [a, b, c] = proofs.map(|p| p.path);
        if a == b || b == c || a == c {
            return Err(VerificationError::DuplicatePositions(vec![a, b, c]));
        }
        Ok((a, b, c))
    }

    fn check_membership(&self, proof: &Proof, leaf: &LeafOpening) -> VerificationResult<()> {
        if !proof.verify::<H>(&leaf.hash::<H>(), &self.sub_tree_root) {
            return Err(VerificationError::InvalidMerkleProof {
                position: proof.path,
            });
        }
        Ok(())
    }
}

/// Authenticates `old_leaf` against `root`, then returns the root with
/// `new_leaf` in its place.
fn transition<H: Hasher>(
    root: Digest,
    proof: &Proof,
    old_leaf: &Digest,
    new_leaf: &Digest,
) -> VerificationResult<Digest> {
    if !proof.verify::<H>(old_leaf, &root) {
        return Err(VerificationError::InvalidMerkleProof {
            position: proof.path,
        });
    }
    Ok(proof.recover_root::<H>(new_leaf))
}

fn check_adjacent(
    left: u64,
    left_leaf: &LeafOpening,
    right: u64,
    right_leaf: &LeafOpening,
) -> VerificationResult<()> {
    if left_leaf.next != right || right_leaf.prev != left {
        return Err(VerificationError::NotAdjacent { left, right });
    }
    Ok(())
}

fn check_not_sentinel(position: u64) -> VerificationResult<()> {
    if position == HEAD_POSITION || position == TAIL_POSITION {
        return Err(VerificationError::SentinelTouched(position));
    }
    Ok(())
}

fn check_key(position: u64, leaf: &LeafOpening, claimed: &Digest) -> VerificationResult<()> {
    if leaf.hkey != *claimed {
        return Err(VerificationError::KeyHashMismatch {
            position,
            committed: leaf.hkey,
            claimed: *claimed,
        });
    }
    Ok(())
}

fn check_value(position: u64, leaf: &LeafOpening, claimed: &Digest) -> VerificationResult<()> {
    if leaf.hval != *claimed {
        return Err(VerificationError::ValueHashMismatch {
            position,
            committed: leaf.hval,
            claimed: *claimed,
        });
    }
    Ok(())
}

fn check_new_root(claimed: &Digest, computed: Digest) -> VerificationResult<()> {
    if *claimed != computed {
        return Err(VerificationError::NewRootMismatch {
            claimed: *claimed,
            computed,
        });
    }
    Ok(())
}
