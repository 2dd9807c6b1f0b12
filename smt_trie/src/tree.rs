//! A fixed-depth binary sparse Merkle tree.
//!
//! Leaves are addressed by their position in `[0, 2^depth)`. Unallocated
//! regions are never stored: each level keeps a dense prefix of nodes up to the
//! highest position written so far, and anything past that prefix is the
//! precomputed empty subtree digest for that level.

use std::fmt::{self, Debug};
use std::marker::PhantomData;

use log::trace;
use thiserror::Error;

use crate::config::{TreeConfig, MAX_DEPTH};
use crate::digest::Digest;
use crate::hasher::Hasher;
use crate::proof::Proof;

/// Stores the result of tree operations. Returns a [`SmtError`] upon failure.
pub type SmtResult<T> = Result<T, SmtError>;

/// An error type for tree operations.
#[derive(Clone, Debug, Eq, Error, Hash, PartialEq)]
pub enum SmtError {
    /// A leaf position outside of `[0, 2^depth)`.
    #[error("Position {position} is out of range for a tree of depth {depth}")]
    PositionOutOfRange { position: u64, depth: usize },

    #[error("Tree depth must lie in 1..={MAX_DEPTH}, got {0}")]
    InvalidDepth(usize),

    #[error("Bulk-build subtree height must be positive, got {0}")]
    InvalidSubtreeHeight(usize),

    /// More leaves were handed to the bulk build than the tree has positions.
    #[error("{count} leaves do not fit in a tree of depth {depth}")]
    TooManyLeaves { count: usize, depth: usize },

    /// A proof whose sibling list does not match the tree depth.
    #[error("Expected a proof with {expected} siblings, got {got}")]
    MalformedProof { expected: usize, got: usize },
}

/// The canonical value of an unallocated leaf.
pub const EMPTY_LEAF: Digest = Digest::ZERO;

/// Returns the roots of the empty subtrees of height `0..=depth`.
pub fn empty_nodes<H: Hasher>(depth: usize) -> Vec<Digest> {
    let mut nodes = Vec::with_capacity(depth + 1);
    nodes.push(EMPTY_LEAF);
    for level in 1..=depth {
        let below = nodes[level - 1];
        nodes.push(H::compress(&below, &below));
    }
    nodes
}

/// Sparse Merkle tree over [`Digest`] leaves.
///
/// `levels[0]` holds the leaves and `levels[l]` the nodes `l` levels above
/// them, for `l < depth`. The root is kept apart. The length of each level is
/// its logical high-water mark; the backing vectors grow on demand.
#[derive(Clone, PartialEq, Eq)]
pub struct Tree<H: Hasher> {
    pub(crate) config: TreeConfig,
    pub(crate) levels: Vec<Vec<Digest>>,
    pub(crate) empty_nodes: Vec<Digest>,
    pub(crate) root: Digest,
    pub(crate) _hasher: PhantomData<H>,
}

impl<H: Hasher> Debug for Tree<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tree")
            .field("depth", &self.config.depth)
            .field("occupied_leaves", &self.occupied_len(0))
            .field("root", &self.root)
            .finish()
    }
}

impl<H: Hasher> Tree<H> {
    /// Creates a tree in which every leaf is [`EMPTY_LEAF`].
    pub fn new(config: TreeConfig) -> SmtResult<Self> {
        config.validate()?;
        let empty_nodes = empty_nodes::<H>(config.depth);
        let root = empty_nodes[config.depth];

        Ok(Self {
            config,
            levels: vec![Vec::new(); config.depth],
            empty_nodes,
            root,
            _hasher: PhantomData,
        })
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    pub fn depth(&self) -> usize {
        self.config.depth
    }

    pub fn root(&self) -> Digest {
        self.root
    }

    /// Number of leaf positions.
    pub fn capacity(&self) -> u64 {
        self.config.capacity()
    }

    /// Root of an empty subtree whose leaves are `level` levels below it.
    /// `empty_node(depth())` is the root of the empty tree.
    pub fn empty_node(&self, level: usize) -> Digest {
        self.empty_nodes[level]
    }

    /// Number of nodes physically stored at `level`; every node past it is
    /// empty.
    pub fn occupied_len(&self, level: usize) -> usize {
        self.levels.get(level).map_or(0, Vec::len)
    }

    /// Returns the leaf at `position`, or [`EMPTY_LEAF`] if it was never
    /// written.
    pub fn get_leaf(&self, position: u64) -> SmtResult<Digest> {
        let idx = self.index_of(position)?;
        Ok(self.node(0, idx))
    }

    /// Sets the leaf at `position` and recomputes every node on its path to the
    /// root.
    pub fn update(&mut self, position: u64, leaf: Digest) -> SmtResult<()> {
        let mut idx = self.index_of(position)?;
        trace!("Updating leaf {position} to {leaf}");

        let mut current = leaf;
        self.write(0, idx, current);

        for level in 0..self.depth() {
            let sibling = self.node(level, idx ^ 1);
            current = if idx & 1 == 0 {
                H::compress(&current, &sibling)
            } else {
                H::compress(&sibling, &current)
            };
            idx >>= 1;

            if level + 1 < self.depth() {
                self.write(level + 1, idx, current);
            }
        }

        self.root = current;
        Ok(())
    }

    /// Returns the authentication path of `position`, siblings ordered from the
    /// leaf level upward.
    pub fn prove(&self, position: u64) -> SmtResult<Proof> {
        let idx = self.index_of(position)?;
        let siblings = (0..self.depth())
            .map(|level| self.node(level, (idx >> level) ^ 1))
            .collect();

        Ok(Proof {
            path: position,
            siblings,
        })
    }

    fn index_of(&self, position: u64) -> SmtResult<usize> {
        let out_of_range = || SmtError::PositionOutOfRange {
            position,
            depth: self.depth(),
        };
        if position >= self.capacity() {
            return Err(out_of_range());
        }
        usize::try_from(position).map_err(|_| out_of_range())
    }

    fn node(&self, level: usize, idx: usize) -> Digest {
        self.levels[level]
            .get(idx)
            .copied()
            .unwrap_or(self.empty_nodes[level])
    }

    /// Writes a node, first growing the level up to `idx` with empty digests if
    /// it is past the current high-water mark.
    fn write(&mut self, level: usize, idx: usize, value: Digest) {
        let nodes = &mut self.levels[level];
        if idx >= nodes.len() {
            nodes.resize(idx + 1, self.empty_nodes[level]);
        }
        nodes[idx] = value;
    }
}
