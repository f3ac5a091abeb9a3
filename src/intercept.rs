//! Interception surface - the hooks a proxy layer drives around a
//! guarded computation, and the composed read/compute/write shape.
//!
//! Key resolution happens upstream: everything arriving here is already
//! a literal key string. The contract:
//! - before the computation, [`read_through`] consults the store; a hit
//!   is credited to every enclosing open scope and returned verbatim;
//! - on a miss, a collector scope brackets the real computation, and
//!   [`write_through`] stores the result together with the discovered
//!   (or explicitly declared) dependency set;
//! - evict directives run strictly before or strictly after the
//!   computation, never during it.

use std::collections::HashSet;
use std::time::Duration;

use tracing::debug;

use crate::collector;
use crate::error::{CacheError, Result};
use crate::store::{CacheStore, CacheValue, Lookup};

/// "Before call" hook: read-through.
///
/// On a hit, the caller's declared dependencies - or the key itself
/// when none are declared - are recorded into all open enclosing
/// scopes, and the stored value is returned verbatim, observably
/// identical to a fresh computation.
pub fn read_through(store: &CacheStore, key: &str, declared: &[String]) -> Option<CacheValue> {
    match store.get(key) {
        Lookup::Hit(value) => {
            credit(key, declared);
            Some(value)
        }
        Lookup::Miss => None,
    }
}

/// "After call" hook: write-through.
///
/// The stored dependency set is the declared list when one is present,
/// otherwise the set collected while the computation ran. An explicit
/// declaration replaces only what is *stored* for this computation;
/// whatever was auto-detected has already propagated into enclosing
/// scopes and is not undone here.
pub fn write_through(
    store: &CacheStore,
    key: &str,
    value: CacheValue,
    ttl: Option<Duration>,
    declared: &[String],
    collected: HashSet<String>,
) -> Result<Option<CacheValue>> {
    if declared.is_empty() {
        store.put(key, value, ttl, collected)
    } else {
        store.put(key, value, ttl, declared.iter().cloned())
    }
}

/// The full guarded-call shape: read-through, and on a miss run
/// `compute` inside a fresh collector scope, then write the result
/// through with the discovered dependencies.
///
/// No store lock is held while `compute` runs, so it may freely make
/// further guarded calls; each nested call records itself into this
/// scope (and every outer one).
pub fn cache_through<F>(
    store: &CacheStore,
    key: &str,
    ttl: Option<Duration>,
    declared: &[String],
    compute: F,
) -> Result<CacheValue>
where
    F: FnOnce() -> CacheValue,
{
    try_cache_through(store, key, ttl, declared, || Ok(compute()))
}

/// Fallible variant of [`cache_through`]. A failed computation caches
/// nothing; its scope is discarded.
pub fn try_cache_through<F>(
    store: &CacheStore,
    key: &str,
    ttl: Option<Duration>,
    declared: &[String],
    compute: F,
) -> Result<CacheValue>
where
    F: FnOnce() -> Result<CacheValue>,
{
    if let Some(hit) = read_through(store, key, declared) {
        debug!(key, "guarded call served from cache");
        return Ok(hit);
    }

    let scope = OpenScope::new();
    let value = compute()?;
    let collected = scope.finish();

    // This computation is itself a dependency of whatever encloses it.
    credit(key, declared);

    write_through(store, key, value.clone(), ttl, declared, collected)?;
    debug!(key, "guarded call computed and cached");
    Ok(value)
}

/// Record `declared` (or, when empty, `key` itself) into every open
/// enclosing scope.
fn credit(key: &str, declared: &[String]) {
    if declared.is_empty() {
        collector::record_use(key);
    } else {
        for dep in declared {
            collector::record_use(dep);
        }
    }
}

/// Closes the collector scope even when the computation unwinds, so a
/// panicking guarded call cannot leak a scope into later calls on the
/// same thread.
struct OpenScope {
    token: Option<collector::ScopeToken>,
}

impl OpenScope {
    fn new() -> Self {
        Self {
            token: Some(collector::open_scope()),
        }
    }

    fn finish(mut self) -> HashSet<String> {
        match self.token.take() {
            Some(token) => collector::close_scope(token),
            None => HashSet::new(),
        }
    }
}

impl Drop for OpenScope {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            let _ = collector::close_scope(token);
        }
    }
}

/// When an eviction directive runs relative to the guarded computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictTiming {
    Before,
    After,
}

/// A resolved eviction directive: exactly one of a single key or a key
/// list, plus its timing. Validation happens at construction, before
/// any mutation.
#[derive(Debug, Clone)]
pub struct EvictDirective {
    keys: Vec<String>,
    timing: EvictTiming,
}

impl EvictDirective {
    /// Build from the raw directive fields. Supplying both a single key
    /// and a key list, or neither, is rejected.
    pub fn new(
        key: Option<String>,
        keys: Option<Vec<String>>,
        timing: EvictTiming,
    ) -> Result<Self> {
        match (key, keys) {
            (Some(_), Some(_)) => Err(CacheError::MalformedDirective(
                "both a single key and a key list supplied",
            )),
            (None, None) => Err(CacheError::MalformedDirective(
                "neither a single key nor a key list supplied",
            )),
            (Some(key), None) => Ok(Self {
                keys: vec![key],
                timing,
            }),
            (None, Some(keys)) => Ok(Self { keys, timing }),
        }
    }

    /// Directive targeting one resolved key.
    pub fn single(key: impl Into<String>, timing: EvictTiming) -> Self {
        Self {
            keys: vec![key.into()],
            timing,
        }
    }

    /// Batch directive: one eviction per element of the resolved list.
    pub fn batch<I>(keys: I, timing: EvictTiming) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
            timing,
        }
    }

    pub fn timing(&self) -> EvictTiming {
        self.timing
    }

    /// Cascade-evict every targeted key. Returns the number of entries
    /// removed (including dependents).
    pub fn apply(&self, store: &CacheStore) -> usize {
        store.evict(self.keys.iter().cloned())
    }
}
