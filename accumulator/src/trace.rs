//! Traces emitted by the prover, one per operation.
//!
//! A trace carries everything the verifier needs to replay the operation from
//! the previous roots: the Merkle proofs of every touched position, the leaf
//! openings as they were before the operation and the raw key and value.
//!
//! On the wire a trace is a JSON object whose integer `type` field selects the
//! variant:
//!
//! | `type` | variant       |
//! |--------|---------------|
//! | 0      | `ReadNonZero` |
//! | 1      | `ReadZero`    |
//! | 2      | `Insertion`   |
//! | 3      | `Update`      |
//! | 4      | `Deletion`    |

use std::fmt::{self, Display};

use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use smt_trie::{Digest, Proof};

use crate::leaf_opening::LeafOpening;

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertionTrace<K, V> {
    pub location: String,
    pub new_next_free_node: u64,
    pub old_sub_root: Digest,
    pub new_sub_root: Digest,
    /// Proof of the left neighbour, whose `next` is redirected.
    pub left_proof: Proof,
    /// Proof of the freshly allocated position.
    pub new_proof: Proof,
    /// Proof of the right neighbour, whose `prev` is redirected.
    pub right_proof: Proof,
    pub key: K,
    pub value: V,
    pub prior_left_leaf: LeafOpening,
    pub prior_right_leaf: LeafOpening,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTrace<K, V> {
    pub location: String,
    pub new_next_free_node: u64,
    pub old_sub_root: Digest,
    pub new_sub_root: Digest,
    pub proof: Proof,
    pub key: K,
    pub old_value: V,
    pub new_value: V,
    pub prior_updated_leaf: LeafOpening,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletionTrace<K, V> {
    pub location: String,
    pub new_next_free_node: u64,
    pub old_sub_root: Digest,
    pub new_sub_root: Digest,
    pub left_proof: Proof,
    pub deleted_proof: Proof,
    pub right_proof: Proof,
    pub key: K,
    pub deleted_value: V,
    pub prior_left_leaf: LeafOpening,
    pub prior_deleted_leaf: LeafOpening,
    pub prior_right_leaf: LeafOpening,
}

/// Proof that a key is absent: two adjacent leaves whose key hashes strictly
/// enclose the key's hash.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadZeroTrace<K> {
    pub location: String,
    pub next_free_node: u64,
    pub sub_root: Digest,
    pub left_leaf: LeafOpening,
    pub right_leaf: LeafOpening,
    pub left_proof: Proof,
    pub right_proof: Proof,
    pub key: K,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadNonZeroTrace<K, V> {
    pub location: String,
    pub next_free_node: u64,
    pub sub_root: Digest,
    pub leaf: LeafOpening,
    pub proof: Proof,
    pub key: K,
    pub value: V,
}

/// Discriminant of a [`Trace`], serialized as an integer.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum TraceType {
    ReadNonZero = 0,
    ReadZero = 1,
    Insertion = 2,
    Update = 3,
    Deletion = 4,
}

impl TryFrom<u8> for TraceType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::ReadNonZero),
            1 => Ok(Self::ReadZero),
            2 => Ok(Self::Insertion),
            3 => Ok(Self::Update),
            4 => Ok(Self::Deletion),
            _ => Err(value),
        }
    }
}

impl Display for TraceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ReadNonZero => "read-non-zero",
            Self::ReadZero => "read-zero",
            Self::Insertion => "insertion",
            Self::Update => "update",
            Self::Deletion => "deletion",
        };
        f.write_str(name)
    }
}

impl Serialize for TraceType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

impl<'de> Deserialize<'de> for TraceType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = u8::deserialize(deserializer)?;
        Self::try_from(code).map_err(|code| D::Error::custom(format!("unknown trace type {code}")))
    }
}

/// Any of the five traces.
#[derive(Clone, Debug, PartialEq)]
pub enum Trace<K, V> {
    Insertion(InsertionTrace<K, V>),
    Update(UpdateTrace<K, V>),
    Deletion(DeletionTrace<K, V>),
    ReadZero(ReadZeroTrace<K>),
    ReadNonZero(ReadNonZeroTrace<K, V>),
}

impl<K, V> Trace<K, V> {
    pub const fn trace_type(&self) -> TraceType {
        match self {
            Self::Insertion(_) => TraceType::Insertion,
            Self::Update(_) => TraceType::Update,
            Self::Deletion(_) => TraceType::Deletion,
            Self::ReadZero(_) => TraceType::ReadZero,
            Self::ReadNonZero(_) => TraceType::ReadNonZero,
        }
    }

    pub fn location(&self) -> &str {
        match self {
            Self::Insertion(t) => &t.location,
            Self::Update(t) => &t.location,
            Self::Deletion(t) => &t.location,
            Self::ReadZero(t) => &t.location,
            Self::ReadNonZero(t) => &t.location,
        }
    }

    /// Sub-tree root the trace starts from.
    pub fn old_sub_root(&self) -> Digest {
        match self {
            Self::Insertion(t) => t.old_sub_root,
            Self::Update(t) => t.old_sub_root,
            Self::Deletion(t) => t.old_sub_root,
            Self::ReadZero(t) => t.sub_root,
            Self::ReadNonZero(t) => t.sub_root,
        }
    }

    /// Sub-tree root after the operation. Reads leave it unchanged.
    pub fn new_sub_root(&self) -> Digest {
        match self {
            Self::Insertion(t) => t.new_sub_root,
            Self::Update(t) => t.new_sub_root,
            Self::Deletion(t) => t.new_sub_root,
            Self::ReadZero(t) => t.sub_root,
            Self::ReadNonZero(t) => t.sub_root,
        }
    }

    /// Next free node after the operation.
    pub fn next_free_node(&self) -> u64 {
        match self {
            Self::Insertion(t) => t.new_next_free_node,
            Self::Update(t) => t.new_next_free_node,
            Self::Deletion(t) => t.new_next_free_node,
            Self::ReadZero(t) => t.next_free_node,
            Self::ReadNonZero(t) => t.next_free_node,
        }
    }

    pub const fn is_read(&self) -> bool {
        matches!(self, Self::ReadZero(_) | Self::ReadNonZero(_))
    }
}

impl<K: Serialize, V: Serialize> Trace<K, V> {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl<K: DeserializeOwned, V: DeserializeOwned> Trace<K, V> {
    pub fn from_json(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }
}

macro_rules! impl_from_trace {
    ($variant:ident, $ty:ty) => {
        impl<K, V> From<$ty> for Trace<K, V> {
            fn from(trace: $ty) -> Self {
                Self::$variant(trace)
            }
        }
    };
}

impl_from_trace!(Insertion, InsertionTrace<K, V>);
impl_from_trace!(Update, UpdateTrace<K, V>);
impl_from_trace!(Deletion, DeletionTrace<K, V>);
impl_from_trace!(ReadZero, ReadZeroTrace<K>);
impl_from_trace!(ReadNonZero, ReadNonZeroTrace<K, V>);

/// A trace body preceded by its `type` field.
#[derive(Serialize)]
struct Tagged<'a, T> {
    #[serde(rename = "type")]
    trace_type: TraceType,
    #[serde(flatten)]
    body: &'a T,
}

impl<K: Serialize, V: Serialize> Serialize for Trace<K, V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let trace_type = self.trace_type();
        match self {
            Self::Insertion(body) => Tagged { trace_type, body }.serialize(serializer),
            Self::Update(body) => Tagged { trace_type, body }.serialize(serializer),
            Self::Deletion(body) => Tagged { trace_type, body }.serialize(serializer),
            Self::ReadZero(body) => Tagged { trace_type, body }.serialize(serializer),
            Self::ReadNonZero(body) => Tagged { trace_type, body }.serialize(serializer),
        }
    }
}

impl<'de, K: DeserializeOwned, V: DeserializeOwned> Deserialize<'de> for Trace<K, V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        let trace_type = match value.get("type") {
            Some(tag) => TraceType::deserialize(tag).map_err(D::Error::custom)?,
            None => return Err(D::Error::missing_field("type")),
        };

        fn body<T: DeserializeOwned, E: serde::de::Error>(
            value: serde_json::Value,
        ) -> Result<T, E> {
            serde_json::from_value(value).map_err(E::custom)
        }

        Ok(match trace_type {
            TraceType::Insertion => Self::Insertion(body::<_, D::Error>(value)?),
            TraceType::Update => Self::Update(body::<_, D::Error>(value)?),
            TraceType::Deletion => Self::Deletion(body::<_, D::Error>(value)?),
            TraceType::ReadZero => Self::ReadZero(body::<_, D::Error>(value)?),
            TraceType::ReadNonZero => Self::ReadNonZero(body::<_, D::Error>(value)?),
        })
    }
}
