//! The fixed-size output of the tree's hash primitive.

use std::fmt::{self, Debug, Display};
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Number of bytes in a [`Digest`].
pub const DIGEST_LEN: usize = 32;

/// A hash or compression output.
///
/// Digests compare as big-endian unsigned integers, which is the order used to
/// sort hashed keys in the accumulator's linked list.
#[derive(Copy, Clone, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Digest(pub [u8; DIGEST_LEN]);

/// Failure to parse a [`Digest`] from its hex form.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum DigestParseError {
    /// The input was not valid hex.
    #[error("Invalid hex in digest: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    /// The input decoded to the wrong number of bytes.
    #[error("Expected a {DIGEST_LEN} byte digest, got {0} bytes")]
    WrongLength(usize),
}

impl Digest {
    /// The all-zero digest. It doubles as the canonical empty leaf and as the
    /// hashed key of the head sentinel.
    pub const ZERO: Self = Digest([0; DIGEST_LEN]);

    /// The largest representable digest, used as the hashed key of the tail
    /// sentinel.
    pub const MAX: Self = Digest([0xff; DIGEST_LEN]);

    pub const fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// Builds a digest whose last 8 bytes hold `x` in big-endian order.
    pub fn from_u64(x: u64) -> Self {
        let mut bytes = [0; DIGEST_LEN];
        bytes[DIGEST_LEN - 8..].copy_from_slice(&x.to_be_bytes());
        Digest(bytes)
    }

    /// `0x`-prefixed lowercase hex.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    pub fn from_hex(s: &str) -> Result<Self, DigestParseError> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s)?;
        let arr: [u8; DIGEST_LEN] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| DigestParseError::WrongLength(bytes.len()))?;
        Ok(Digest(arr))
    }
}

impl From<[u8; DIGEST_LEN]> for Digest {
    fn from(bytes: [u8; DIGEST_LEN]) -> Self {
        Digest(bytes)
    }
}

impl From<Digest> for [u8; DIGEST_LEN] {
    fn from(d: Digest) -> Self {
        d.0
    }
}

impl AsRef<[u8]> for Digest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl FromStr for Digest {
    type Err = DigestParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(D::Error::custom)
    }
}
