//! Error types for the caching core.

use std::fmt;

use thiserror::Error;

use crate::store::{CacheValue, ValueType};

/// Errors surfaced by the store and the interception layer.
///
/// Absence of a key on read is never an error; reads report it through
/// [`Lookup::Miss`](crate::store::Lookup) or `Ok(None)` so the real
/// computation can proceed.
#[derive(Debug, Error)]
pub enum CacheError {
    /// A typed accessor disagrees with the stored value type.
    ///
    /// Raised before any mutation is attempted; fatal to that call.
    #[error(fmt = fmt_type_mismatch)]
    TypeMismatch {
        key: String,
        expected: ValueType,
        /// What is actually stored; `None` when the entry holds the
        /// present-but-empty marker.
        actual: Option<ValueType>,
    },

    /// A TTL could not be registered on the delay queue (the sweeper has
    /// been stopped). The write is aborted: an unexpirable leaked entry
    /// is worse than a failed write.
    #[error("could not schedule expiry for key '{key}': delay queue is closed")]
    SchedulingFailure { key: String },

    /// An eviction directive supplied both a single key and a key list,
    /// or neither.
    #[error("malformed evict directive: {0}")]
    MalformedDirective(&'static str),
}

fn fmt_type_mismatch(
    key: &String,
    expected: &ValueType,
    actual: &Option<ValueType>,
    f: &mut fmt::Formatter,
) -> fmt::Result {
    write!(f, "type mismatch for key '{key}': expected {expected}, found ")?;
    match actual {
        Some(actual) => write!(f, "{actual}"),
        None => f.write_str("empty"),
    }
}

impl CacheError {
    /// Build a [`CacheError::TypeMismatch`] from the value actually stored.
    pub(crate) fn type_mismatch(key: &str, expected: ValueType, found: &CacheValue) -> Self {
        Self::TypeMismatch {
            key: key.to_string(),
            expected,
            actual: found.value_type(),
        }
    }
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_mismatch_display_names_the_stored_type() {
        let err = CacheError::type_mismatch(
            "k",
            ValueType::List,
            &CacheValue::Scalar(serde_json::Value::from(1)),
        );
        assert_eq!(
            err.to_string(),
            "type mismatch for key 'k': expected list, found scalar"
        );
    }

    #[test]
    fn test_type_mismatch_display_for_empty_marker() {
        let err = CacheError::type_mismatch("k", ValueType::Map, &CacheValue::Empty);
        assert_eq!(
            err.to_string(),
            "type mismatch for key 'k': expected map, found empty"
        );
    }
}
