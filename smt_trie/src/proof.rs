//! Merkle authentication paths.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use crate::digest::Digest;
use crate::hasher::Hasher;
use crate::tree::{SmtError, SmtResult};

/// The siblings of every node on the path from a leaf to the root.
///
/// A proof only depends on the leaf's position and on the other leaves, never
/// on the leaf itself. The same proof therefore authenticates both the value a
/// position held before an update and the value it holds afterwards.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Proof {
    /// Position of the leaf.
    #[serde(alias = "leafIndex")]
    pub path: u64,

    /// Sibling digests, from the leaf level upward.
    pub siblings: Vec<Digest>,
}

impl Proof {
    pub fn depth(&self) -> usize {
        self.siblings.len()
    }

    /// Checks that the proof belongs to a tree of the given depth: one sibling
    /// per level and a position inside `[0, 2^depth)`.
    pub fn check_shape(&self, depth: usize) -> SmtResult<()> {
        if self.siblings.len() != depth {
            return Err(SmtError::MalformedProof {
                expected: depth,
                got: self.siblings.len(),
            });
        }
        if depth < 64 && self.path >> depth != 0 {
            return Err(SmtError::PositionOutOfRange {
                position: self.path,
                depth,
            });
        }
        Ok(())
    }

    /// Recomputes the root of the tree in which `leaf` sits at `self.path`.
    pub fn recover_root<H: Hasher>(&self, leaf: &Digest) -> Digest {
        let mut current = *leaf;
        let mut idx = self.path;
        for sibling in &self.siblings {
            current = if idx & 1 == 0 {
                H::compress(&current, sibling)
            } else {
                H::compress(sibling, &current)
            };
            idx >>= 1;
        }
        current
    }

    pub fn verify<H: Hasher>(&self, leaf: &Digest, root: &Digest) -> bool {
        self.recover_root::<H>(leaf) == *root
    }
}

impl Display for Proof {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Proof{{Path: {}, Siblings: [", self.path)?;
        for (i, sibling) in self.siblings.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{sibling}")?;
        }
        write!(f, "]}}")
    }
}
