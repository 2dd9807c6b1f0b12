//! The prover side of the accumulator.
//!
//! The prover owns the full tree and the decoded content of every allocated
//! leaf. Keys are kept in a doubly linked list sorted by key hash, threaded
//! through the leaves' `prev`/`next` pointers and bounded by two sentinels:
//! the head at position 0 and the tail at position 1. New keys are always
//! allocated at `next_free_node`, which never decreases; deleted positions are
//! emptied and never reused.
//!
//! Every operation returns a trace. Mutating operations are decomposed into
//! atomic transitions that each rewrite a single field of a single leaf, and
//! the trace carries the proof taken just before each transition.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound::{Excluded, Unbounded};

use log::{debug, trace};
use smt_trie::{Digest, Hasher, Proof, SmtError, Tree, TreeConfig, EMPTY_LEAF};
use thiserror::Error;

use crate::codec::{top_root, AccumulatorEntry};
use crate::leaf_opening::{KVOpeningTuple, LeafOpening, HEAD_POSITION, TAIL_POSITION};
use crate::trace::{DeletionTrace, InsertionTrace, ReadNonZeroTrace, ReadZeroTrace, UpdateTrace};
use crate::verifier::VerifierState;

/// Position of the first leaf that can hold a key.
pub const FIRST_FREE_NODE: u64 = 2;

pub type AccumulatorResult<T> = Result<T, AccumulatorError>;

/// An error raised by a prover operation. A failed operation leaves the
/// prover untouched.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum AccumulatorError {
    /// Raised when inserting, or proving the absence of, a key that is stored.
    #[error("Key with hash {0} is already present in the accumulator")]
    KeyAlreadyPresent(Digest),

    /// Raised when updating, deleting, or reading a key that is not stored.
    #[error("Key with hash {0} is not present in the accumulator")]
    KeyNotFound(Digest),

    /// All `2^depth` positions have been allocated.
    #[error("The accumulator is full: all {0} positions have been allocated")]
    TreeFull(u64),

    #[error(transparent)]
    Smt(#[from] SmtError),

    /// A persisted prover state failed its consistency checks.
    #[error("Inconsistent accumulator snapshot: {0}")]
    CorruptSnapshot(String),
}

/// The prover's state: the tree and the content of every live leaf.
#[derive(Clone, Debug)]
pub struct ProverState<K, V, H: Hasher> {
    /// Identifier of the accumulator, copied into every trace.
    pub location: String,
    next_free_node: u64,
    tree: Tree<H>,
    data: HashMap<u64, KVOpeningTuple<K, V>>,
    /// Key hash to position, sentinels included.
    index: BTreeMap<Digest, u64>,
}

impl<K, V, H> ProverState<K, V, H>
where
    K: AccumulatorEntry,
    V: AccumulatorEntry,
    H: Hasher,
{
    /// Creates an empty accumulator holding only the two sentinels.
    pub fn new(location: impl Into<String>, config: TreeConfig) -> AccumulatorResult<Self> {
        let mut state = Self {
            location: location.into(),
            next_free_node: FIRST_FREE_NODE,
            tree: Tree::new(config)?,
            data: HashMap::new(),
            index: BTreeMap::new(),
        };

        for (position, opening) in [
            (HEAD_POSITION, LeafOpening::head()),
            (TAIL_POSITION, LeafOpening::tail()),
        ] {
            state.upsert(position, Self::sentinel(opening))?;
            state.index.insert(opening.hkey, position);
        }

        debug!(
            "Initialized accumulator {} with sub-tree root {}",
            state.location,
            state.sub_tree_root()
        );
        Ok(state)
    }

    /// Creates an empty accumulator with the default tree configuration.
    pub fn initialize(location: impl Into<String>) -> AccumulatorResult<Self> {
        Self::new(location, TreeConfig::default())
    }

    /// Rebuilds a prover from a persisted set of tuples, the tree being
    /// recomputed with the bulk build.
    ///
    /// The snapshot must contain both sentinels, every tuple must commit to
    /// its own key and value, and following the `next` pointers from the
    /// head must visit every tuple exactly once, in strictly increasing key
    /// hash order, with matching `prev` pointers.
    pub fn restore<I>(
        location: impl Into<String>,
        config: TreeConfig,
        next_free_node: u64,
        tuples: I,
    ) -> AccumulatorResult<Self>
    where
        I: IntoIterator<Item = (u64, KVOpeningTuple<K, V>)>,
    {
        let location = location.into();
        config.validate()?;
        if next_free_node < FIRST_FREE_NODE {
            return Err(corrupt(format!(
                "next free node {next_free_node} leaves no room for the sentinels"
            )));
        }
        if next_free_node > config.capacity() {
            return Err(corrupt(format!(
                "next free node {next_free_node} exceeds the tree capacity {}",
                config.capacity()
            )));
        }

        let mut data = HashMap::new();
        for (position, tuple) in tuples {
            if position >= next_free_node {
                return Err(corrupt(format!(
                    "position {position} was never allocated (next free node is {next_free_node})"
                )));
            }
            if !tuple.is_consistent::<H>() {
                return Err(corrupt(format!(
                    "leaf at position {position} does not commit to its key and value"
                )));
            }
            if data.insert(position, tuple).is_some() {
                return Err(corrupt(format!("position {position} appears twice")));
            }
        }

        let index = check_linkage(&data)?;

        let mut leaves = vec![EMPTY_LEAF; next_free_node as usize];
        for (position, tuple) in &data {
            leaves[*position as usize] = tuple.leaf_opening.hash::<H>();
        }
        let tree = Tree::from_leaves(config, leaves)?;

        debug!(
            "Restored accumulator {location} with {} keys, next free node {next_free_node}",
            data.len() - 2
        );
        Ok(Self {
            location,
            next_free_node,
            tree,
            data,
            index,
        })
    }

    pub fn next_free_node(&self) -> u64 {
        self.next_free_node
    }

    pub fn sub_tree_root(&self) -> Digest {
        self.tree.root()
    }

    pub fn top_root(&self) -> Digest {
        top_root::<H>(self.next_free_node, &self.sub_tree_root())
    }

    pub fn tree(&self) -> &Tree<H> {
        &self.tree
    }

    pub fn config(&self) -> TreeConfig {
        *self.tree.config()
    }

    /// Every allocated, non-deleted position, sentinels included.
    pub fn data(&self) -> &HashMap<u64, KVOpeningTuple<K, V>> {
        &self.data
    }

    pub fn get(&self, position: u64) -> Option<&KVOpeningTuple<K, V>> {
        self.data.get(&position)
    }

    /// Number of stored keys, sentinels excluded.
    pub fn len(&self) -> usize {
        self.data.len() - 2
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Position of `key`, if it is stored.
    pub fn find_key(&self, key: &K) -> Option<u64> {
        self.index.get(&key.digest::<H>()).copied()
    }

    /// The succinct state a verifier needs to replay this prover's traces.
    pub fn verifier_state(&self) -> VerifierState<H> {
        VerifierState::new(
            self.location.clone(),
            self.next_free_node,
            self.sub_tree_root(),
            self.config(),
        )
    }

    /// Inserts a key that is not stored yet, at position `next_free_node`,
    /// between the two leaves whose key hashes enclose the new key's hash.
    pub fn insert_and_prove(
        &mut self,
        key: K,
        value: V,
    ) -> AccumulatorResult<InsertionTrace<K, V>> {
        let hkey = key.digest::<H>();
        if self.index.contains_key(&hkey) {
            return Err(AccumulatorError::KeyAlreadyPresent(hkey));
        }
        if self.next_free_node >= self.tree.capacity() {
            return Err(AccumulatorError::TreeFull(self.tree.capacity()));
        }

        let (i_minus, i_plus) = self.sandwich(&hkey);
        let i_new = self.next_free_node;
        let old_sub_root = self.sub_tree_root();

        let left = self.tuple(i_minus).clone();
        let right = self.tuple(i_plus).clone();
        let prior_left_leaf = left.leaf_opening;
        let prior_right_leaf = right.leaf_opening;
        assert!(
            prior_left_leaf.next == i_plus && prior_right_leaf.prev == i_minus,
            "leaves {i_minus} and {i_plus} enclose {hkey} but are not linked"
        );

        let left_proof = self.upsert(
            i_minus,
            KVOpeningTuple {
                leaf_opening: prior_left_leaf.copy_with_next(i_new),
                ..left
            },
        )?;

        let inserted = LeafOpening {
            prev: i_minus,
            next: i_plus,
            hkey,
            hval: value.digest::<H>(),
        };
        let new_proof = self.upsert(
            i_new,
            KVOpeningTuple::new(inserted, key.clone(), value.clone()),
        )?;
        self.index.insert(hkey, i_new);

        let right_proof = self.upsert(
            i_plus,
            KVOpeningTuple {
                leaf_opening: prior_right_leaf.copy_with_prev(i_new),
                ..right
            },
        )?;

        self.next_free_node += 1;
        debug!(
            "[{}] inserted {hkey} at position {i_new} between {i_minus} and {i_plus}",
            self.location
        );

        Ok(InsertionTrace {
            location: self.location.clone(),
            new_next_free_node: self.next_free_node,
            old_sub_root,
            new_sub_root: self.sub_tree_root(),
            left_proof,
            new_proof,
            right_proof,
            key,
            value,
            prior_left_leaf,
            prior_right_leaf,
        })
    }

    /// Replaces the value of a stored key.
    pub fn update_and_prove(
        &mut self,
        key: K,
        new_value: V,
    ) -> AccumulatorResult<UpdateTrace<K, V>> {
        let hkey = key.digest::<H>();
        let position = self.position_of(&hkey)?;
        let old_sub_root = self.sub_tree_root();

        let old = self.tuple(position).clone();
        let prior_updated_leaf = old.leaf_opening;
        let updated = LeafOpening {
            hval: new_value.digest::<H>(),
            ..prior_updated_leaf
        };
        let proof = self.upsert(
            position,
            KVOpeningTuple::new(updated, old.key, new_value.clone()),
        )?;

        debug!("[{}] updated {hkey} at position {position}", self.location);

        Ok(UpdateTrace {
            location: self.location.clone(),
            new_next_free_node: self.next_free_node,
            old_sub_root,
            new_sub_root: self.sub_tree_root(),
            proof,
            key,
            old_value: old.value,
            new_value,
            prior_updated_leaf,
        })
    }

    /// Removes a stored key: its neighbours are linked to each other and its
    /// position is emptied.
    pub fn delete_and_prove(&mut self, key: K) -> AccumulatorResult<DeletionTrace<K, V>> {
        let hkey = key.digest::<H>();
        let i_del = self.position_of(&hkey)?;
        let old_sub_root = self.sub_tree_root();

        let deleted = self.tuple(i_del).clone();
        let prior_deleted_leaf = deleted.leaf_opening;
        let (i_minus, i_plus) = (prior_deleted_leaf.prev, prior_deleted_leaf.next);
        let left = self.tuple(i_minus).clone();
        let right = self.tuple(i_plus).clone();
        let prior_left_leaf = left.leaf_opening;
        let prior_right_leaf = right.leaf_opening;
        assert!(
            prior_left_leaf.next == i_del && prior_right_leaf.prev == i_del,
            "neighbours {i_minus} and {i_plus} do not point back to {i_del}"
        );

        let left_proof = self.upsert(
            i_minus,
            KVOpeningTuple {
                leaf_opening: prior_left_leaf.copy_with_next(i_plus),
                ..left
            },
        )?;

        let deleted_proof = self.tree.prove(i_del)?;
        self.tree.update(i_del, EMPTY_LEAF)?;
        self.data.remove(&i_del);
        self.index.remove(&hkey);
        trace!("[{}] emptied position {i_del}", self.location);

        let right_proof = self.upsert(
            i_plus,
            KVOpeningTuple {
                leaf_opening: prior_right_leaf.copy_with_prev(i_minus),
                ..right
            },
        )?;

        debug!(
            "[{}] deleted {hkey} from position {i_del}, relinking {i_minus} and {i_plus}",
            self.location
        );

        Ok(DeletionTrace {
            location: self.location.clone(),
            new_next_free_node: self.next_free_node,
            old_sub_root,
            new_sub_root: self.sub_tree_root(),
            left_proof,
            deleted_proof,
            right_proof,
            key,
            deleted_value: deleted.value,
            prior_left_leaf,
            prior_deleted_leaf,
            prior_right_leaf,
        })
    }

    /// Proves that `key` is not stored.
    pub fn read_zero_and_prove(&self, key: K) -> AccumulatorResult<ReadZeroTrace<K>> {
        let hkey = key.digest::<H>();
        if self.index.contains_key(&hkey) {
            return Err(AccumulatorError::KeyAlreadyPresent(hkey));
        }

        let (i_minus, i_plus) = self.sandwich(&hkey);
        trace!(
            "[{}] {hkey} is absent, enclosed by {i_minus} and {i_plus}",
            self.location
        );

        Ok(ReadZeroTrace {
            location: self.location.clone(),
            next_free_node: self.next_free_node,
            sub_root: self.sub_tree_root(),
            left_leaf: self.tuple(i_minus).leaf_opening,
            right_leaf: self.tuple(i_plus).leaf_opening,
            left_proof: self.tree.prove(i_minus)?,
            right_proof: self.tree.prove(i_plus)?,
            key,
        })
    }

    /// Proves that `key` is stored, and with which value.
    pub fn read_non_zero_and_prove(&self, key: K) -> AccumulatorResult<ReadNonZeroTrace<K, V>> {
        let hkey = key.digest::<H>();
        let position = self.position_of(&hkey)?;
        let tuple = self.tuple(position);

        Ok(ReadNonZeroTrace {
            location: self.location.clone(),
            next_free_node: self.next_free_node,
            sub_root: self.sub_tree_root(),
            leaf: tuple.leaf_opening,
            proof: self.tree.prove(position)?,
            key,
            value: tuple.value.clone(),
        })
    }

    fn sentinel(opening: LeafOpening) -> KVOpeningTuple<K, V> {
        KVOpeningTuple::new(opening, K::default(), V::default())
    }

    fn tuple(&self, position: u64) -> &KVOpeningTuple<K, V> {
        match self.data.get(&position) {
            Some(tuple) => tuple,
            None => panic!("position {position} is linked but holds no leaf"),
        }
    }

    /// Position of a stored key. Sentinels are not keys.
    fn position_of(&self, hkey: &Digest) -> AccumulatorResult<u64> {
        match self.index.get(hkey) {
            Some(&position) if position >= FIRST_FREE_NODE => Ok(position),
            _ => Err(AccumulatorError::KeyNotFound(*hkey)),
        }
    }

    /// Positions of the stored leaves whose key hashes are the closest below
    /// and above `hkey`. The sentinels bound every key hash.
    fn sandwich(&self, hkey: &Digest) -> (u64, u64) {
        let minus = self
            .index
            .range(..*hkey)
            .next_back()
            .map_or(HEAD_POSITION, |(_, &p)| p);
        let plus = self
            .index
            .range((Excluded(*hkey), Unbounded))
            .next()
            .map_or(TAIL_POSITION, |(_, &p)| p);
        (minus, plus)
    }

    /// The atomic transition: writes `tuple` at `position` and returns the
    /// proof of the position taken before the write.
    fn upsert(&mut self, position: u64, tuple: KVOpeningTuple<K, V>) -> AccumulatorResult<Proof> {
        let leaf = tuple.check_and_leaf::<H>();
        if let Some(old) = self.data.get(&position) {
            assert!(
                matches!(
                    old.leaf_opening.changed_fields(&tuple.leaf_opening),
                    Some(0 | 1)
                ),
                "transition at position {position} rewrites more than one field: {} -> {}",
                old.leaf_opening,
                tuple.leaf_opening
            );
        }

        let proof = self.tree.prove(position)?;
        self.tree.update(position, leaf)?;
        trace!(
            "[{}] position {position} := {}",
            self.location,
            tuple.leaf_opening
        );
        self.data.insert(position, tuple);
        Ok(proof)
    }
}

fn corrupt(reason: String) -> AccumulatorError {
    AccumulatorError::CorruptSnapshot(reason)
}

/// Walks the linked list from the head and returns the key hash index.
fn check_linkage<K, V>(
    data: &HashMap<u64, KVOpeningTuple<K, V>>,
) -> AccumulatorResult<BTreeMap<Digest, u64>> {
    let opening = |position: u64| {
        data.get(&position)
            .map(|t| t.leaf_opening)
            .ok_or_else(|| corrupt(format!("position {position} is linked but missing")))
    };

    let head = opening(HEAD_POSITION)?;
    let tail = opening(TAIL_POSITION)?;
    if head.hkey != Digest::ZERO || head.prev != HEAD_POSITION {
        return Err(corrupt(format!("malformed head sentinel {head}")));
    }
    if tail.hkey != Digest::MAX || tail.next != TAIL_POSITION {
        return Err(corrupt(format!("malformed tail sentinel {tail}")));
    }

    let mut index = BTreeMap::new();
    index.insert(head.hkey, HEAD_POSITION);
    let (mut position, mut current) = (HEAD_POSITION, head);
    while position != TAIL_POSITION {
        let next = opening(current.next)?;
        if next.prev != position {
            return Err(corrupt(format!(
                "leaf {} does not point back to its predecessor {position}",
                current.next
            )));
        }
        // Strictly increasing key hashes also rule out cycles.
        if next.hkey <= current.hkey {
            return Err(corrupt(format!(
                "key hashes are out of order between positions {position} and {}",
                current.next
            )));
        }
        index.insert(next.hkey, current.next);
        (position, current) = (current.next, next);
    }

    if index.len() != data.len() {
        return Err(corrupt(format!(
            "{} leaves are not reachable from the head",
            data.len() - index.len()
        )));
    }
    Ok(index)
}
