use rand::seq::SliceRandom;
use rand::Rng;

use crate::config::TreeConfig;
use crate::digest::Digest;
use crate::hasher::{Hasher, KeccakHasher, PoseidonHasher};
use crate::testing_utils::{common_setup, random_digest, random_leaves, rng};
use crate::tree::{Tree, EMPTY_LEAF};

fn incremental<H: Hasher>(config: TreeConfig, leaves: &[Digest]) -> Tree<H> {
    let mut tree = Tree::new(config).unwrap();
    for (i, leaf) in leaves.iter().enumerate() {
        tree.update(i as u64, *leaf).unwrap();
    }
    tree
}

fn assert_bulk_matches_incremental<H: Hasher + PartialEq>(config: TreeConfig, n: usize, seed: u64) {
    let leaves = random_leaves(&mut rng(seed), n);
    let bulk = Tree::<H>::from_leaves(config, leaves.clone()).unwrap();
    let inc = incremental::<H>(config, &leaves);

    assert_eq!(bulk.root(), inc.root(), "root mismatch for {n} leaves");
    assert_eq!(bulk, inc, "node mismatch for {n} leaves");
}

#[test]
fn bulk_build_matches_incremental_updates() {
    common_setup();
    let config = TreeConfig {
        depth: 12,
        bulk_subtree_height: 3,
    };
    for n in [0, 1, 2, 3, 7, 8, 9, 31, 64, 100, 513] {
        assert_bulk_matches_incremental::<KeccakHasher>(config, n, n as u64);
    }
}

#[test]
fn bulk_build_with_subtrees_taller_than_the_tree() {
    common_setup();
    let config = TreeConfig {
        depth: 5,
        bulk_subtree_height: 10,
    };
    for n in [1, 17, 32] {
        assert_bulk_matches_incremental::<PoseidonHasher>(config, n, 7);
    }
}

#[test]
fn bulk_build_at_default_depth() {
    common_setup();
    assert_bulk_matches_incremental::<PoseidonHasher>(TreeConfig::default(), 1500, 42);
}

#[test]
fn bulk_built_tree_keeps_accepting_updates() {
    common_setup();
    let mut r = rng(3);
    let config = TreeConfig {
        depth: 10,
        bulk_subtree_height: 2,
    };
    let leaves = random_leaves(&mut r, 50);
    let mut bulk = Tree::<KeccakHasher>::from_leaves(config, leaves.clone()).unwrap();
    let mut inc = incremental::<KeccakHasher>(config, &leaves);

    for _ in 0..40 {
        let pos = r.gen_range(0..200);
        let leaf = random_digest(&mut r);
        bulk.update(pos, leaf).unwrap();
        inc.update(pos, leaf).unwrap();
        assert_eq!(bulk.root(), inc.root());
    }
    assert_eq!(bulk, inc);
}

#[test]
fn every_proof_verifies_against_the_root() {
    common_setup();
    let mut r = rng(11);
    let config = TreeConfig::with_depth(16);
    let leaves = random_leaves(&mut r, 300);
    let tree = Tree::<PoseidonHasher>::from_leaves(config, leaves.clone()).unwrap();

    for (i, leaf) in leaves.iter().enumerate() {
        let proof = tree.prove(i as u64).unwrap();
        assert_eq!(proof.depth(), 16);
        assert!(proof.verify::<PoseidonHasher>(leaf, &tree.root()));
    }

    // Unallocated positions prove the canonical empty leaf.
    for pos in [300, 301, 1 << 15, (1 << 16) - 1] {
        let proof = tree.prove(pos).unwrap();
        assert!(proof.verify::<PoseidonHasher>(&EMPTY_LEAF, &tree.root()));
    }
}

#[test]
fn update_order_does_not_change_the_root() {
    common_setup();
    let mut r = rng(5);
    let config = TreeConfig::with_depth(20);
    let mut writes: Vec<(u64, Digest)> = (0..64)
        .map(|_| (r.gen_range(0..1 << 20), random_digest(&mut r)))
        .collect();
    writes.sort_by_key(|(pos, _)| *pos);
    writes.dedup_by_key(|(pos, _)| *pos);

    let mut a = Tree::<KeccakHasher>::new(config).unwrap();
    for (pos, leaf) in &writes {
        a.update(*pos, *leaf).unwrap();
    }

    writes.shuffle(&mut r);
    let mut b = Tree::<KeccakHasher>::new(config).unwrap();
    for (pos, leaf) in &writes {
        b.update(*pos, *leaf).unwrap();
    }

    assert_eq!(a.root(), b.root());
}

#[test]
fn proof_chaining_across_successive_updates() {
    common_setup();
    let mut r = rng(21);
    let mut tree = Tree::<PoseidonHasher>::new(TreeConfig::with_depth(8)).unwrap();
    for i in 0..20 {
        tree.update(i, random_digest(&mut r)).unwrap();
    }

    // Three successive writes replayed from proofs alone.
    let mut running = tree.root();
    for pos in [3, 17, 40] {
        let old = tree.get_leaf(pos).unwrap();
        let new = random_digest(&mut r);
        let proof = tree.prove(pos).unwrap();
        assert!(proof.verify::<PoseidonHasher>(&old, &running));
        running = proof.recover_root::<PoseidonHasher>(&new);
        tree.update(pos, new).unwrap();
        assert_eq!(running, tree.root());
    }
}
