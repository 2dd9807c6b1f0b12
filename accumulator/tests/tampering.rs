//! Traces altered after the fact must be rejected, leaving the verifier on
//! the roots it had before.

use ethereum_types::H256;
use kv_accumulator::{
    DeletionTrace, InsertionTrace, ProverState, ReadNonZeroTrace, ReadZeroTrace, Trace,
    UpdateTrace, VerificationError, VerifierState,
};
use smt_trie::{Digest, PoseidonHasher, TreeConfig};

type Prover = ProverState<H256, H256, PoseidonHasher>;
type Verifier = VerifierState<PoseidonHasher>;

fn key(i: u64) -> H256 {
    H256::from_low_u64_be(i)
}

fn value(i: u64) -> H256 {
    H256::from_low_u64_be(1000 + i)
}

/// A prover holding a few keys, and a verifier in sync with it.
fn setup() -> (Prover, Verifier) {
    let _ = pretty_env_logger::try_init();
    let mut prover = Prover::new("0x0a", TreeConfig::with_depth(10)).unwrap();
    for i in 0..6 {
        prover.insert_and_prove(key(i), value(i)).unwrap();
    }
    let verifier = prover.verifier_state();
    (prover, verifier)
}

/// Checks that `trace` is rejected with an error matched by `expected`, that
/// the verifier did not move, and that the untampered trace still verifies.
fn assert_rejected<F>(
    verifier: &mut Verifier,
    tampered: Trace<H256, H256>,
    honest: Trace<H256, H256>,
    expected: F,
) where
    F: Fn(&VerificationError) -> bool,
{
    let before = verifier.clone();
    let err = verifier.verify(&tampered).unwrap_err();
    assert!(expected(&err), "unexpected error: {err}");
    assert_eq!(*verifier, before);
    verifier.verify(&honest).unwrap();
}

fn insertion() -> (Prover, Verifier, InsertionTrace<H256, H256>) {
    let (mut p, v) = setup();
    let t = p.insert_and_prove(key(100), value(100)).unwrap();
    (p, v, t)
}

#[test]
fn insertion_with_a_wrong_value() {
    let (_, mut v, t) = insertion();
    let mut bad = t.clone();
    bad.value = value(7);
    // The right neighbour's proof no longer matches the chained root.
    let right = t.right_proof.path;
    assert_rejected(
        &mut v,
        bad.into(),
        t.into(),
        |e| matches!(e, VerificationError::InvalidMerkleProof { position } if *position == right),
    );
}

#[test]
fn insertion_at_the_wrong_slot() {
    let (_, mut v, t) = insertion();
    let mut bad = t.clone();
    bad.new_proof.path += 1;
    assert_rejected(&mut v, bad.into(), t.into(), |e| {
        matches!(e, VerificationError::WrongInsertionSlot { .. })
    });
}

#[test]
fn insertion_with_a_wrong_counter() {
    let (_, mut v, t) = insertion();
    let mut bad = t.clone();
    bad.new_next_free_node += 1;
    assert_rejected(&mut v, bad.into(), t.into(), |e| {
        matches!(e, VerificationError::NextFreeNodeMismatch { .. })
    });
}

#[test]
fn insertion_outside_its_sandwich() {
    let (_, mut v, t) = insertion();
    let mut bad = t.clone();
    std::mem::swap(
        &mut bad.prior_left_leaf.hkey,
        &mut bad.prior_right_leaf.hkey,
    );
    assert_rejected(&mut v, bad.into(), t.into(), |e| {
        matches!(e, VerificationError::KeyOutsideSandwich { .. })
    });
}

#[test]
fn insertion_between_non_adjacent_leaves() {
    let (_, mut v, t) = insertion();
    let mut bad = t.clone();
    bad.prior_left_leaf.next = bad.new_proof.path;
    assert_rejected(&mut v, bad.into(), t.into(), |e| {
        matches!(e, VerificationError::NotAdjacent { .. })
    });
}

#[test]
fn insertion_with_a_forged_neighbour() {
    let (_, mut v, t) = insertion();
    let mut bad = t.clone();
    bad.prior_right_leaf.hval = Digest::from_u64(1);
    assert_rejected(&mut v, bad.into(), t.into(), |e| {
        matches!(e, VerificationError::InvalidMerkleProof { .. })
    });
}

#[test]
fn insertion_with_a_corrupted_sibling() {
    let (_, mut v, t) = insertion();
    let mut bad = t.clone();
    bad.right_proof.siblings[3] = Digest::from_u64(3);
    assert_rejected(&mut v, bad.into(), t.into(), |e| {
        matches!(e, VerificationError::InvalidMerkleProof { .. })
    });
}

#[test]
fn insertion_with_a_truncated_proof() {
    let (_, mut v, t) = insertion();
    let mut bad = t.clone();
    bad.left_proof.siblings.pop();
    assert_rejected(&mut v, bad.into(), t.into(), |e| {
        matches!(e, VerificationError::MalformedProof(_))
    });
}

#[test]
fn insertion_claiming_another_root() {
    let (_, mut v, t) = insertion();
    let mut bad = t.clone();
    bad.new_sub_root = Digest::from_u64(9);
    assert_rejected(&mut v, bad.into(), t.into(), |e| {
        matches!(e, VerificationError::NewRootMismatch { .. })
    });
}

#[test]
fn trace_for_another_accumulator() {
    let (_, mut v, t) = insertion();
    let mut bad = t.clone();
    bad.location = "0x0b".to_string();
    assert_rejected(&mut v, bad.into(), t.into(), |e| {
        matches!(e, VerificationError::LocationMismatch { .. })
    });
}

fn update() -> (Prover, Verifier, UpdateTrace<H256, H256>) {
    let (mut p, v) = setup();
    let t = p.update_and_prove(key(2), value(200)).unwrap();
    (p, v, t)
}

#[test]
fn update_with_a_wrong_old_value() {
    let (_, mut v, t) = update();
    let mut bad = t.clone();
    bad.old_value = value(3);
    assert_rejected(&mut v, bad.into(), t.into(), |e| {
        matches!(e, VerificationError::ValueHashMismatch { .. })
    });
}

#[test]
fn update_of_another_key() {
    let (_, mut v, t) = update();
    let mut bad = t.clone();
    bad.key = key(3);
    assert_rejected(&mut v, bad.into(), t.into(), |e| {
        matches!(e, VerificationError::KeyHashMismatch { .. })
    });
}

#[test]
fn update_with_a_swapped_new_value() {
    let (_, mut v, t) = update();
    let mut bad = t.clone();
    bad.new_value = value(201);
    assert_rejected(&mut v, bad.into(), t.into(), |e| {
        matches!(e, VerificationError::NewRootMismatch { .. })
    });
}

#[test]
fn update_that_grows_the_counter() {
    let (_, mut v, t) = update();
    let mut bad = t.clone();
    bad.new_next_free_node += 1;
    assert_rejected(&mut v, bad.into(), t.into(), |e| {
        matches!(e, VerificationError::NextFreeNodeMismatch { .. })
    });
}

fn deletion() -> (Prover, Verifier, DeletionTrace<H256, H256>) {
    let (mut p, v) = setup();
    let t = p.delete_and_prove(key(4)).unwrap();
    (p, v, t)
}

#[test]
fn deletion_with_a_wrong_value() {
    let (_, mut v, t) = deletion();
    let mut bad = t.clone();
    bad.deleted_value = value(5);
    assert_rejected(&mut v, bad.into(), t.into(), |e| {
        matches!(e, VerificationError::ValueHashMismatch { .. })
    });
}

#[test]
fn deletion_with_repeated_positions() {
    let (_, mut v, t) = deletion();
    let mut bad = t.clone();
    bad.right_proof = bad.left_proof.clone();
    assert_rejected(&mut v, bad.into(), t.into(), |e| {
        matches!(e, VerificationError::DuplicatePositions(_))
    });
}

#[test]
fn deletion_of_a_sentinel() {
    let (_, mut v, t) = deletion();
    let mut bad = t.clone();
    // Pick the sentinel that is not already one of the neighbours.
    let sentinel = if bad.left_proof.path == 0 || bad.right_proof.path == 0 {
        1
    } else {
        0
    };
    bad.deleted_proof.path = sentinel;
    assert_rejected(
        &mut v,
        bad.into(),
        t.into(),
        |e| matches!(e, VerificationError::SentinelTouched(p) if *p == sentinel),
    );
}

#[test]
fn deletion_with_a_broken_link() {
    let (_, mut v, t) = deletion();
    let mut bad = t.clone();
    bad.prior_right_leaf.prev = bad.left_proof.path;
    assert_rejected(&mut v, bad.into(), t.into(), |e| {
        matches!(e, VerificationError::NotAdjacent { .. })
    });
}

#[test]
fn read_zero_of_a_stored_key() {
    let (p, mut v) = setup();
    let honest: ReadZeroTrace<H256> = p.read_zero_and_prove(key(50)).unwrap();
    let mut bad = honest.clone();
    bad.key = key(3);
    assert_rejected(&mut v, bad.into(), honest.into(), |e| {
        matches!(e, VerificationError::KeyOutsideSandwich { .. })
    });
}

#[test]
fn read_zero_with_a_forged_leaf() {
    let (p, mut v) = setup();
    let honest = p.read_zero_and_prove(key(50)).unwrap();
    let mut bad = honest.clone();
    bad.left_leaf.hval = Digest::from_u64(5);
    assert_rejected(&mut v, bad.into(), honest.into(), |e| {
        matches!(e, VerificationError::InvalidMerkleProof { .. })
    });
}

#[test]
fn read_non_zero_with_a_wrong_value() {
    let (p, mut v) = setup();
    let honest: ReadNonZeroTrace<H256, H256> = p.read_non_zero_and_prove(key(1)).unwrap();
    let mut bad = honest.clone();
    bad.value = value(2);
    assert_rejected(&mut v, bad.into(), honest.into(), |e| {
        matches!(e, VerificationError::ValueHashMismatch { .. })
    });
}

#[test]
fn read_non_zero_on_a_stale_root() {
    let (mut p, mut v) = setup();
    let stale = p.read_non_zero_and_prove(key(1)).unwrap();
    let t = p.update_and_prove(key(1), value(11)).unwrap();
    v.update_verify(&t).unwrap();

    let before = v.clone();
    assert!(matches!(
        v.read_non_zero_verify(&stale),
        Err(VerificationError::OldRootMismatch { .. })
    ));
    assert_eq!(v, before);
}

#[test]
fn replayed_insertion_is_rejected() {
    let (_, mut v, t) = insertion();
    v.insert_verify(&t).unwrap();
    let before = v.clone();
    assert!(v.insert_verify(&t).is_err());
    assert_eq!(v, before);
}
