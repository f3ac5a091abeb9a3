//! Cachegraph - dependency-aware caching core.
//!
//! Caches call results and *discovers* what each result depends on from
//! the call graph, instead of asking callers to declare it: while a
//! guarded computation runs, every cached key it (or anything it calls)
//! touches is attributed to it. Invalidating one key then cascades to
//! every entry derived from it, however deep the derivation chain.
//!
//! ## Architecture
//!
//! - `store` - entry map, typed value tags, TTL, reverse-dependency
//!   index, cascading and glob-pattern eviction
//! - `collector` - reentrant, thread-scoped dependency tracking
//! - `sweeper` - background worker draining the expiry delay queue
//! - `intercept` - read-through / write-through hooks and evict
//!   directives driven by the (external) proxy layer
//! - `views` - typed sub-views (scalar, list, set, sorted set, map,
//!   queue) that fail fast on type mismatch
//! - `config` - store configuration
//! - `error` - the error taxonomy
//!
//! ## Usage
//!
//! ```rust
//! use cachegraph::{CacheStore, CacheValue, cache_through};
//!
//! let store = CacheStore::new();
//!
//! // Guarded call: computed once, served from cache afterwards.
//! let value = cache_through(&store, "user:1", None, &[], || {
//!     CacheValue::Scalar(serde_json::json!({"name": "ada"}))
//! })
//! .unwrap();
//!
//! // A later computation that reads "user:1" through a guarded call
//! // is invalidated automatically when "user:1" is evicted.
//! store.evict(["user:1"]);
//! assert!(store.get("user:1").is_miss());
//! # let _ = value;
//! ```

pub mod collector;
pub mod config;
pub mod error;
pub mod intercept;
pub mod store;
pub mod sweeper;
pub mod views;

pub use config::CacheConfig;
pub use error::{CacheError, Result};
pub use intercept::{
    EvictDirective, EvictTiming, cache_through, read_through, try_cache_through, write_through,
};
pub use store::{CacheStore, CacheValue, Lookup, NO_DEPS, ValueType};
pub use sweeper::Sweeper;
pub use views::{ListView, MapView, QueueView, ScalarView, SetView, SortedSetView};
