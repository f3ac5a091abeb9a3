//! Typed sub-views over the store.
//!
//! Thin facades over the same `get`/`put`/`evict` primitives, one per
//! [`ValueType`]. Every read checks the stored tag and fails fast with
//! [`CacheError::TypeMismatch`] instead of coercing; a miss reads as
//! `Ok(None)`. Views are cheap to clone and share the store they were
//! taken from.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::time::Duration;

use serde_json::Value;

use crate::error::{CacheError, Result};
use crate::store::{CacheStore, CacheValue, Lookup, NO_DEPS, ValueType};

/// Type-check a hit against `expected`. `Ok(None)` on miss; the empty
/// marker and any other tag are mismatches.
fn typed_get(store: &CacheStore, key: &str, expected: ValueType) -> Result<Option<CacheValue>> {
    match store.get(key) {
        Lookup::Miss => Ok(None),
        Lookup::Hit(value) if value.value_type() == Some(expected) => Ok(Some(value)),
        Lookup::Hit(value) => Err(CacheError::type_mismatch(key, expected, &value)),
    }
}

macro_rules! view {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone)]
        pub struct $name {
            store: CacheStore,
        }

        impl $name {
            /// Remove the key (cascading to its dependents). Returns
            /// the number of entries evicted.
            pub fn evict(&self, key: &str) -> usize {
                self.store.evict([key])
            }

            /// Whether a live entry of any type exists under `key`.
            pub fn exists(&self, key: &str) -> bool {
                self.store.contains(key)
            }
        }
    };
}

view! {
    /// Scalar (single opaque payload) view.
    ScalarView
}

impl ScalarView {
    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        match typed_get(&self.store, key, ValueType::Scalar)? {
            Some(CacheValue::Scalar(value)) => Ok(Some(value)),
            _ => Ok(None),
        }
    }

    pub fn put(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<()> {
        self.store.put(key, CacheValue::Scalar(value), ttl, NO_DEPS)?;
        Ok(())
    }
}

view! {
    /// List view: ordered opaque payloads.
    ListView
}

impl ListView {
    pub fn get(&self, key: &str) -> Result<Option<Vec<Value>>> {
        match typed_get(&self.store, key, ValueType::List)? {
            Some(CacheValue::List(items)) => Ok(Some(items)),
            _ => Ok(None),
        }
    }

    pub fn put(&self, key: &str, items: Vec<Value>, ttl: Option<Duration>) -> Result<()> {
        self.store.put(key, CacheValue::List(items), ttl, NO_DEPS)?;
        Ok(())
    }

    /// Length of the stored list; `Ok(None)` on miss.
    pub fn len(&self, key: &str) -> Result<Option<usize>> {
        Ok(self.get(key)?.map(|items| items.len()))
    }
}

view! {
    /// Set view: unordered, duplicate-free string members.
    SetView
}

impl SetView {
    pub fn get(&self, key: &str) -> Result<Option<BTreeSet<String>>> {
        match typed_get(&self.store, key, ValueType::Set)? {
            Some(CacheValue::Set(members)) => Ok(Some(members)),
            _ => Ok(None),
        }
    }

    pub fn put(&self, key: &str, members: BTreeSet<String>, ttl: Option<Duration>) -> Result<()> {
        self.store.put(key, CacheValue::Set(members), ttl, NO_DEPS)?;
        Ok(())
    }

    pub fn is_member(&self, key: &str, member: &str) -> Result<bool> {
        Ok(self
            .get(key)?
            .is_some_and(|members| members.contains(member)))
    }
}

view! {
    /// Sorted-set view: string members ranked by an `f64` score.
    SortedSetView
}

impl SortedSetView {
    pub fn get(&self, key: &str) -> Result<Option<BTreeMap<String, f64>>> {
        match typed_get(&self.store, key, ValueType::SortedSet)? {
            Some(CacheValue::SortedSet(scored)) => Ok(Some(scored)),
            _ => Ok(None),
        }
    }

    pub fn put(
        &self,
        key: &str,
        scored: BTreeMap<String, f64>,
        ttl: Option<Duration>,
    ) -> Result<()> {
        self.store
            .put(key, CacheValue::SortedSet(scored), ttl, NO_DEPS)?;
        Ok(())
    }

    /// Members ordered by `(score, member)`, lowest score first.
    pub fn ranked(&self, key: &str) -> Result<Option<Vec<(String, f64)>>> {
        Ok(self.get(key)?.map(|scored| {
            let mut ranked: Vec<(String, f64)> = scored.into_iter().collect();
            ranked.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
            ranked
        }))
    }

    pub fn score(&self, key: &str, member: &str) -> Result<Option<f64>> {
        Ok(self.get(key)?.and_then(|scored| scored.get(member).copied()))
    }
}

view! {
    /// Map view: string fields to opaque payloads.
    MapView
}

impl MapView {
    pub fn get(&self, key: &str) -> Result<Option<BTreeMap<String, Value>>> {
        match typed_get(&self.store, key, ValueType::Map)? {
            Some(CacheValue::Map(fields)) => Ok(Some(fields)),
            _ => Ok(None),
        }
    }

    pub fn put(
        &self,
        key: &str,
        fields: BTreeMap<String, Value>,
        ttl: Option<Duration>,
    ) -> Result<()> {
        self.store.put(key, CacheValue::Map(fields), ttl, NO_DEPS)?;
        Ok(())
    }

    pub fn field(&self, key: &str, field: &str) -> Result<Option<Value>> {
        Ok(self.get(key)?.and_then(|mut fields| fields.remove(field)))
    }
}

view! {
    /// Queue view: FIFO of opaque payloads.
    QueueView
}

impl QueueView {
    pub fn get(&self, key: &str) -> Result<Option<VecDeque<Value>>> {
        match typed_get(&self.store, key, ValueType::Queue)? {
            Some(CacheValue::Queue(items)) => Ok(Some(items)),
            _ => Ok(None),
        }
    }

    pub fn put(&self, key: &str, items: VecDeque<Value>, ttl: Option<Duration>) -> Result<()> {
        self.store.put(key, CacheValue::Queue(items), ttl, NO_DEPS)?;
        Ok(())
    }

    /// The element at the head of the queue; `Ok(None)` on miss or
    /// empty queue.
    pub fn peek(&self, key: &str) -> Result<Option<Value>> {
        Ok(self
            .get(key)?
            .and_then(|mut items| items.pop_front()))
    }
}

impl CacheStore {
    pub fn scalar_view(&self) -> ScalarView {
        ScalarView {
            store: self.clone(),
        }
    }

    pub fn list_view(&self) -> ListView {
        ListView {
            store: self.clone(),
        }
    }

    pub fn set_view(&self) -> SetView {
        SetView {
            store: self.clone(),
        }
    }

    pub fn sorted_set_view(&self) -> SortedSetView {
        SortedSetView {
            store: self.clone(),
        }
    }

    pub fn map_view(&self) -> MapView {
        MapView {
            store: self.clone(),
        }
    }

    pub fn queue_view(&self) -> QueueView {
        QueueView {
            store: self.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_roundtrip_and_miss() {
        let store = CacheStore::new();
        let view = store.scalar_view();

        assert_eq!(view.get("k").unwrap(), None);
        view.put("k", Value::from("hello"), None).unwrap();
        assert_eq!(view.get("k").unwrap(), Some(Value::from("hello")));
    }

    #[test]
    fn test_type_mismatch_is_a_checked_error() {
        let store = CacheStore::new();
        store.scalar_view().put("k", Value::from(1), None).unwrap();

        let err = store.list_view().get("k").unwrap_err();
        match err {
            CacheError::TypeMismatch {
                key,
                expected,
                actual,
            } => {
                assert_eq!(key, "k");
                assert_eq!(expected, ValueType::List);
                assert_eq!(actual, Some(ValueType::Scalar));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_marker_mismatches_every_view() {
        let store = CacheStore::new();
        store.put("void", CacheValue::Empty, None, NO_DEPS).unwrap();

        let err = store.scalar_view().get("void").unwrap_err();
        assert!(matches!(
            err,
            CacheError::TypeMismatch { actual: None, .. }
        ));
    }

    #[test]
    fn test_sorted_set_ranked_order() {
        let store = CacheStore::new();
        let view = store.sorted_set_view();

        let scored: BTreeMap<String, f64> = [
            ("bronze".to_string(), 3.0),
            ("gold".to_string(), 1.0),
            ("silver".to_string(), 2.0),
            ("also-gold".to_string(), 1.0),
        ]
        .into_iter()
        .collect();
        view.put("podium", scored, None).unwrap();

        let ranked = view.ranked("podium").unwrap().unwrap();
        let members: Vec<&str> = ranked.iter().map(|(m, _)| m.as_str()).collect();
        // Ties break on member name.
        assert_eq!(members, ["also-gold", "gold", "silver", "bronze"]);
        assert_eq!(view.score("podium", "silver").unwrap(), Some(2.0));
    }

    #[test]
    fn test_set_membership() {
        let store = CacheStore::new();
        let view = store.set_view();

        view.put("tags", ["a".to_string(), "b".to_string()].into(), None)
            .unwrap();
        assert!(view.is_member("tags", "a").unwrap());
        assert!(!view.is_member("tags", "z").unwrap());
        assert!(!view.is_member("missing", "a").unwrap());
    }

    #[test]
    fn test_map_field_access() {
        let store = CacheStore::new();
        let view = store.map_view();

        let fields: BTreeMap<String, Value> =
            [("name".to_string(), Value::from("ada"))].into_iter().collect();
        view.put("profile", fields, None).unwrap();

        assert_eq!(view.field("profile", "name").unwrap(), Some(Value::from("ada")));
        assert_eq!(view.field("profile", "age").unwrap(), None);
    }

    #[test]
    fn test_queue_peek() {
        let store = CacheStore::new();
        let view = store.queue_view();

        view.put("q", VecDeque::from([Value::from(1), Value::from(2)]), None)
            .unwrap();
        assert_eq!(view.peek("q").unwrap(), Some(Value::from(1)));
        // Peek does not consume.
        assert_eq!(view.get("q").unwrap().unwrap().len(), 2);
    }

    #[test]
    fn test_view_evict_cascades() {
        let store = CacheStore::new();
        store.scalar_view().put("b", Value::from(1), None).unwrap();
        store.put("a", CacheValue::Scalar(Value::from(2)), None, ["b"]).unwrap();

        assert_eq!(store.scalar_view().evict("b"), 2);
        assert!(!store.scalar_view().exists("a"));
    }
}
