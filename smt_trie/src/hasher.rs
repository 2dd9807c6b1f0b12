//! The hash primitive seam.
//!
//! The tree never names a concrete hash function: every type that computes a
//! digest is generic over [`Hasher`]. Two implementations ship with the crate,
//! [`PoseidonHasher`] (Poseidon over Goldilocks, as used by the plonky2
//! circuits) and [`KeccakHasher`].

use std::fmt::Debug;

use plonky2::field::goldilocks_field::GoldilocksField;
use plonky2::field::types::{Field, PrimeField64};
use plonky2::hash::hash_types::HashOut;
use plonky2::hash::poseidon::PoseidonHash;
use plonky2::plonk::config::Hasher as Plonky2Hasher;

use crate::digest::{Digest, DIGEST_LEN};

type F = GoldilocksField;

/// Number of bytes packed into one field element when hashing raw bytes.
const BYTES_PER_ELEMENT: usize = 7;

/// Byte inputs are padded to a multiple of this many bytes.
const PADDING_BLOCK: usize = 56;

/// A two-to-one compression function plus a hash over arbitrary bytes.
pub trait Hasher: Clone + Copy + Debug + Default + Send + Sync + 'static {
    /// Compresses two children into their parent. Used for every internal
    /// node of the tree, including the precomputed empty subtrees.
    fn compress(left: &Digest, right: &Digest) -> Digest;

    /// Hashes an encoded object (hashed keys, hashed values, leaf openings).
    fn hash_bytes(bytes: &[u8]) -> Digest;
}

/// Poseidon over the Goldilocks field.
///
/// A digest holds the four canonical field elements of a plonky2 `HashOut`,
/// each as 8 big-endian bytes.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PoseidonHasher;

impl PoseidonHasher {
    fn to_hash_out(d: &Digest) -> HashOut<F> {
        HashOut {
            elements: std::array::from_fn(|i| {
                let mut limb = [0; 8];
                limb.copy_from_slice(&d.0[i * 8..(i + 1) * 8]);
                F::from_noncanonical_u64(u64::from_be_bytes(limb))
            }),
        }
    }

    fn from_hash_out(h: HashOut<F>) -> Digest {
        let mut out = [0; DIGEST_LEN];
        for (chunk, x) in out.chunks_exact_mut(8).zip(h.elements) {
            chunk.copy_from_slice(&x.to_canonical_u64().to_be_bytes());
        }
        Digest(out)
    }

    /// Appends `0x01`, zero-pads to a multiple of 56 bytes and sets the high
    /// bit of the final byte.
    fn pad(bytes: &[u8]) -> Vec<u8> {
        let mut padded = Vec::with_capacity(bytes.len() + PADDING_BLOCK);
        padded.extend_from_slice(bytes);
        padded.push(0x01);
        while padded.len() % PADDING_BLOCK != 0 {
            padded.push(0x00);
        }
        if let Some(last) = padded.last_mut() {
            *last |= 0x80;
        }
        padded
    }
}

impl Hasher for PoseidonHasher {
    fn compress(left: &Digest, right: &Digest) -> Digest {
        Self::from_hash_out(PoseidonHash::two_to_one(
            Self::to_hash_out(left),
            Self::to_hash_out(right),
        ))
    }

    fn hash_bytes(bytes: &[u8]) -> Digest {
        let elements: Vec<F> = Self::pad(bytes)
            .chunks_exact(BYTES_PER_ELEMENT)
            .map(|block| {
                let mut limb = [0u8; 8];
                limb[..BYTES_PER_ELEMENT].copy_from_slice(block);
                F::from_canonical_u64(u64::from_le_bytes(limb))
            })
            .collect();
        Self::from_hash_out(PoseidonHash::hash_no_pad(&elements))
    }
}

/// Keccak-256. Compression hashes the 64-byte concatenation of both children.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct KeccakHasher;

impl Hasher for KeccakHasher {
    fn compress(left: &Digest, right: &Digest) -> Digest {
        let mut buf = [0; 2 * DIGEST_LEN];
        buf[..DIGEST_LEN].copy_from_slice(&left.0);
        buf[DIGEST_LEN..].copy_from_slice(&right.0);
        Self::hash_bytes(&buf)
    }

    fn hash_bytes(bytes: &[u8]) -> Digest {
        Digest(keccak_hash::keccak(bytes).0)
    }
}
