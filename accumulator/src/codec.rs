//! Fixed-width encodings of the keys and values stored in the accumulator.
//!
//! Raw keys and values never enter the tree. Only their hashes do, computed
//! over the encoding produced by [`Hashable::write_to`].

use std::fmt::Debug;

use ethereum_types::{H160, H256, U256};
use serde::de::DeserializeOwned;
use serde::Serialize;
use smt_trie::{Digest, Hasher};

/// Number of bytes used to encode a leaf position.
pub const INDEX_LEN: usize = 64;

/// A type with a fixed-width byte encoding that can be hashed to a
/// [`Digest`].
pub trait Hashable {
    fn write_to(&self, out: &mut Vec<u8>);

    fn encoded(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.write_to(&mut out);
        out
    }

    fn digest<H: Hasher>(&self) -> Digest {
        H::hash_bytes(&self.encoded())
    }
}

/// Everything the accumulator asks of a key or value type.
pub trait AccumulatorEntry:
    Hashable + Clone + Debug + Default + PartialEq + Serialize + DeserializeOwned
{
}

impl<T> AccumulatorEntry for T where
    T: Hashable + Clone + Debug + Default + PartialEq + Serialize + DeserializeOwned
{
}

/// Writes `index` as a 64-byte big-endian integer.
pub fn write_index(out: &mut Vec<u8>, index: u64) {
    out.extend_from_slice(&[0; INDEX_LEN - 8]);
    out.extend_from_slice(&index.to_be_bytes());
}

/// Root of the whole accumulator: binds the sub-tree root to the number of
/// positions allocated so far.
pub fn top_root<H: Hasher>(next_free_node: u64, sub_tree_root: &Digest) -> Digest {
    let mut buf = Vec::with_capacity(INDEX_LEN + 32);
    write_index(&mut buf, next_free_node);
    buf.extend_from_slice(sub_tree_root.as_bytes());
    H::hash_bytes(&buf)
}

// Integers are written on 32 bytes, big-endian.
impl Hashable for u64 {
    fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&[0; 24]);
        out.extend_from_slice(&self.to_be_bytes());
    }
}

impl Hashable for U256 {
    fn write_to(&self, out: &mut Vec<u8>) {
        let mut buf = [0; 32];
        self.to_big_endian(&mut buf);
        out.extend_from_slice(&buf);
    }
}

impl Hashable for H256 {
    fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.as_bytes());
    }
}

impl Hashable for H160 {
    fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.as_bytes());
    }
}

impl Hashable for Digest {
    fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.as_bytes());
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;
    use smt_trie::KeccakHasher;

    use super::*;

    #[test]
    fn encodings_are_fixed_width() {
        assert_eq!(7u64.encoded().len(), 32);
        assert_eq!(U256::from(7).encoded().len(), 32);
        assert_eq!(H256::zero().encoded().len(), 32);
        assert_eq!(H160::zero().encoded().len(), 20);

        let mut out = Vec::new();
        write_index(&mut out, 1);
        assert_eq!(out.len(), INDEX_LEN);
        assert_eq!(out[INDEX_LEN - 1], 1);
    }

    #[test]
    fn integers_and_words_agree() {
        assert_eq!(0x2au64.encoded(), U256::from(0x2a).encoded());
        assert_eq!(
            U256::from(0x2a).encoded(),
            H256::from_low_u64_be(0x2a).encoded()
        );
    }

    #[test]
    fn address_encoding_is_raw() {
        let addr = H160(hex!("2400000000000000000000000000000000000000"));
        assert_eq!(addr.encoded(), addr.as_bytes().to_vec());
    }

    #[test]
    fn top_root_depends_on_the_counter() {
        let root = Digest::from_u64(5);
        assert_ne!(
            top_root::<KeccakHasher>(2, &root),
            top_root::<KeccakHasher>(3, &root)
        );
    }
}
