//! Static parameters of a [`Tree`](crate::tree::Tree).

use serde::{Deserialize, Serialize};

use crate::tree::{SmtError, SmtResult};

/// Depth used by the state accumulators.
pub const DEFAULT_DEPTH: usize = 40;

/// Height of the subtrees each bulk-build task computes on its own. `2^10`
/// leaves plus their ancestors fit comfortably in a per-core L2 cache.
pub const DEFAULT_BULK_SUBTREE_HEIGHT: usize = 10;

/// Positions are `u64`, so a tree holds at most `2^63` leaves.
pub const MAX_DEPTH: usize = 63;

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TreeConfig {
    /// Number of levels between the leaves and the root.
    pub depth: usize,

    /// Height of the cache-sized subtrees built by a single task in
    /// [`Tree::from_leaves`](crate::tree::Tree::from_leaves).
    pub bulk_subtree_height: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            depth: DEFAULT_DEPTH,
            bulk_subtree_height: DEFAULT_BULK_SUBTREE_HEIGHT,
        }
    }
}

impl TreeConfig {
    pub fn with_depth(depth: usize) -> Self {
        Self {
            depth,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> SmtResult<()> {
        if self.depth == 0 || self.depth > MAX_DEPTH {
            return Err(SmtError::InvalidDepth(self.depth));
        }
        if self.bulk_subtree_height == 0 {
            return Err(SmtError::InvalidSubtreeHeight(self.bulk_subtree_height));
        }
        Ok(())
    }

    /// Number of leaf positions, `2^depth`.
    pub const fn capacity(&self) -> u64 {
        1 << self.depth
    }
}
