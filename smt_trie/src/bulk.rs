//! Building a [`Tree`] from a complete leaf array in one pass.
//!
//! The build runs in two phases:
//! 1. The leaves are cut into chunks of `2^bulk_subtree_height` and each chunk's
//!    subtree is hashed entirely by one task. Every task writes to its own
//!    disjoint slice of each lower level, so no synchronisation is needed.
//! 2. The remaining upper levels are hashed one at a time, each level split
//!    into parallel chunks of parents.
//!
//! The result is identical, node for node, to writing the leaves one by one
//! with [`Tree::update`].

use std::marker::PhantomData;

use log::debug;
use plonky2_maybe_rayon::*;

use crate::config::TreeConfig;
use crate::digest::Digest;
use crate::hasher::Hasher;
use crate::tree::{empty_nodes, SmtError, SmtResult, Tree};

/// Number of parents hashed by one task in the upper-level phase.
const UPPER_LEVEL_CHUNK: usize = 256;

impl<H: Hasher> Tree<H> {
    /// Builds the tree whose leaves `0..leaves.len()` are `leaves` and whose
    /// other leaves are empty.
    pub fn from_leaves(config: TreeConfig, leaves: Vec<Digest>) -> SmtResult<Self> {
        config.validate()?;
        let depth = config.depth;
        if leaves.len() as u128 > config.capacity() as u128 {
            return Err(SmtError::TooManyLeaves {
                count: leaves.len(),
                depth,
            });
        }

        let empty_nodes = empty_nodes::<H>(depth);
        let subtree_height = config.bulk_subtree_height.min(depth);
        debug!(
            "Bulk building a depth {depth} tree from {} leaves (subtree height {subtree_height})",
            leaves.len()
        );

        let lower = hash_lower_levels::<H>(&leaves, subtree_height, &empty_nodes);
        let mut levels = Vec::with_capacity(depth + 1);
        levels.push(leaves);
        levels.extend(lower);

        for level in subtree_height + 1..=depth {
            let parents = hash_upper_level::<H>(&levels[level - 1], empty_nodes[level - 1]);
            levels.push(parents);
        }

        // The top entry is the root level; it is not stored with the others.
        let root = levels
            .pop()
            .and_then(|top| top.first().copied())
            .unwrap_or(empty_nodes[depth]);

        Ok(Self {
            config,
            levels,
            empty_nodes,
            root,
            _hasher: PhantomData,
        })
    }
}

/// Number of nodes stored at `level` when `n_leaves` leaves are occupied.
fn level_len(n_leaves: usize, level: usize) -> usize {
    n_leaves.div_ceil(1 << level)
}

/// Phase one: levels `1..=height`, one task per chunk of `2^height` leaves.
fn hash_lower_levels<H: Hasher>(
    leaves: &[Digest],
    height: usize,
    empty_nodes: &[Digest],
) -> Vec<Vec<Digest>> {
    let mut lower: Vec<Vec<Digest>> = (1..=height)
        .map(|level| vec![Digest::ZERO; level_len(leaves.len(), level)])
        .collect();

    let chunk_len = 1usize << height;
    {
        // A full chunk has `2^(height - level)` nodes at `level`, and every level
        // has exactly as many chunks as the leaves, the last one possibly short.
        let mut outputs_per_level: Vec<_> = lower
            .iter_mut()
            .enumerate()
            .map(|(i, nodes)| nodes.chunks_mut(chunk_len >> (i + 1)))
            .collect();

        let tasks: Vec<(&[Digest], Vec<&mut [Digest]>)> = leaves
            .chunks(chunk_len)
            .map(|chunk| {
                let outputs: Vec<&mut [Digest]> = outputs_per_level
                    .iter_mut()
                    .filter_map(Iterator::next)
                    .collect();
                debug_assert_eq!(outputs.len(), height);
                (chunk, outputs)
            })
            .collect();

        tasks
            .into_par_iter()
            .for_each(|(chunk, mut outputs)| hash_subtree::<H>(chunk, &mut outputs, empty_nodes));
    }

    lower
}

/// Hashes one subtree bottom-up. `outputs[i]` receives level `i + 1`.
fn hash_subtree<H: Hasher>(
    leaves: &[Digest],
    outputs: &mut [&mut [Digest]],
    empty_nodes: &[Digest],
) {
    let Some((first, _)) = outputs.split_first_mut() else {
        return;
    };
    hash_level::<H>(leaves, first, empty_nodes[0]);

    for i in 1..outputs.len() {
        let (below, above) = outputs.split_at_mut(i);
        hash_level::<H>(&below[i - 1][..], &mut above[0][..], empty_nodes[i]);
    }
}

/// Phase two: one level above `children`, hashed in parallel chunks.
fn hash_upper_level<H: Hasher>(children: &[Digest], empty_child: Digest) -> Vec<Digest> {
    let mut parents = vec![Digest::ZERO; children.len().div_ceil(2)];
    parents
        .par_chunks_mut(UPPER_LEVEL_CHUNK)
        .enumerate()
        .for_each(|(c, out)| {
            let start = 2 * c * UPPER_LEVEL_CHUNK;
            let end = (start + 2 * out.len()).min(children.len());
            hash_level::<H>(&children[start..end], out, empty_child);
        });
    parents
}

/// Fills `parents[i]` with the compression of `children[2i]` and
/// `children[2i + 1]`, the latter defaulting to `empty_child` past the end.
fn hash_level<H: Hasher>(children: &[Digest], parents: &mut [Digest], empty_child: Digest) {
    for (i, parent) in parents.iter_mut().enumerate() {
        let left = children[2 * i];
        let right = children.get(2 * i + 1).copied().unwrap_or(empty_child);
        *parent = H::compress(&left, &right);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::KeccakHasher;

    #[test]
    fn level_lengths_round_up() {
        assert_eq!(level_len(0, 1), 0);
        assert_eq!(level_len(5, 0), 5);
        assert_eq!(level_len(5, 1), 3);
        assert_eq!(level_len(5, 2), 2);
        assert_eq!(level_len(5, 3), 1);
        assert_eq!(level_len(8, 3), 1);
    }

    #[test]
    fn lone_child_pairs_with_the_empty_sibling() {
        let children = [
            Digest::from_u64(1),
            Digest::from_u64(2),
            Digest::from_u64(3),
        ];
        let empty = Digest::from_u64(99);
        let mut parents = [Digest::ZERO; 2];
        hash_level::<KeccakHasher>(&children, &mut parents, empty);
        assert_eq!(
            parents[0],
            KeccakHasher::compress(&children[0], &children[1])
        );
        assert_eq!(parents[1], KeccakHasher::compress(&children[2], &empty));
    }

    #[test]
    fn too_many_leaves() {
        let config = TreeConfig::with_depth(2);
        let err = Tree::<KeccakHasher>::from_leaves(config, vec![Digest::ZERO; 5]).unwrap_err();
        assert_eq!(err, SmtError::TooManyLeaves { count: 5, depth: 2 });
    }

    #[test]
    fn no_leaves_gives_the_empty_tree() {
        let config = TreeConfig::with_depth(12);
        let built = Tree::<KeccakHasher>::from_leaves(config, Vec::new()).unwrap();
        assert_eq!(built, Tree::new(config).unwrap());
    }
}
