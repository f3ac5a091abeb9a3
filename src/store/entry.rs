//! Entry data model: value tags, payloads, and the stored entry itself.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tag describing which shape of payload a key holds.
///
/// A key's stored type never silently changes: typed accessors check it
/// and fail with a
/// [`TypeMismatch`](crate::error::CacheError::TypeMismatch) instead of
/// coercing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Scalar,
    List,
    Set,
    SortedSet,
    Map,
    Queue,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Scalar => "scalar",
            ValueType::List => "list",
            ValueType::Set => "set",
            ValueType::SortedSet => "sorted set",
            ValueType::Map => "map",
            ValueType::Queue => "queue",
        };
        f.write_str(name)
    }
}

/// Tagged payload stored under a key.
///
/// `Empty` records that a computation ran and produced nothing; it is a
/// cache *hit*, distinct from the key being absent. Scalars, list/queue
/// elements, and map values are opaque [`serde_json::Value`] payloads;
/// set and sorted-set members are plain strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheValue {
    /// Computed to nothing. Present, but carries no payload.
    Empty,
    Scalar(Value),
    List(Vec<Value>),
    Set(BTreeSet<String>),
    /// Member -> score. Ordered iteration by `(score, member)` is
    /// computed on read.
    SortedSet(BTreeMap<String, f64>),
    Map(BTreeMap<String, Value>),
    Queue(VecDeque<Value>),
}

impl CacheValue {
    /// The type tag of this payload, or `None` for the empty marker.
    pub fn value_type(&self) -> Option<ValueType> {
        match self {
            CacheValue::Empty => None,
            CacheValue::Scalar(_) => Some(ValueType::Scalar),
            CacheValue::List(_) => Some(ValueType::List),
            CacheValue::Set(_) => Some(ValueType::Set),
            CacheValue::SortedSet(_) => Some(ValueType::SortedSet),
            CacheValue::Map(_) => Some(ValueType::Map),
            CacheValue::Queue(_) => Some(ValueType::Queue),
        }
    }

    /// Whether this is the present-but-empty marker.
    pub fn is_empty_marker(&self) -> bool {
        matches!(self, CacheValue::Empty)
    }
}

/// Result of a read: either a stored value (possibly the empty marker)
/// or nothing cached under the key.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Hit(CacheValue),
    Miss,
}

impl Lookup {
    pub fn is_hit(&self) -> bool {
        matches!(self, Lookup::Hit(_))
    }

    pub fn is_miss(&self) -> bool {
        matches!(self, Lookup::Miss)
    }

    /// Unwrap into an `Option`, discarding the hit/miss distinction for
    /// callers that treat the empty marker like any other value.
    pub fn into_value(self) -> Option<CacheValue> {
        match self {
            Lookup::Hit(value) => Some(value),
            Lookup::Miss => None,
        }
    }
}

/// One stored entry. Internal to the store; the public surface hands out
/// [`CacheValue`]s only.
#[derive(Debug, Clone)]
pub(crate) struct CacheEntry {
    pub value: CacheValue,
    /// Keys this entry was derived from; unordered, duplicate-free.
    pub dependencies: BTreeSet<String>,
    /// Absolute expiry; `None` means permanent.
    pub expires_at: Option<Instant>,
    /// Monotonic per key across reinsertions. The sweeper compares this
    /// against its queue tickets so a reinserted key is never evicted by
    /// a stale deadline.
    pub version: u64,
}

impl CacheEntry {
    pub fn is_expired(&self, now: Instant) -> bool {
        match self.expires_at {
            Some(at) => at <= now,
            None => false,
        }
    }
}
