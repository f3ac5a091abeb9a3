//! Cache store - entries, reverse-dependency index, cascading eviction.
//!
//! The store keeps three structures that are always mutated together,
//! under one structural lock:
//! - the entry map (`key -> CacheEntry`),
//! - the reverse-dependency index (`dependency key -> dependent keys`),
//! - the delay queue of expiry tickets consumed by the sweeper.
//!
//! The lock is held only around structural mutation, never across a
//! caller's computation, so guarded computations may reenter the store
//! freely. Expiry is lazy: reads treat an entry whose deadline has
//! passed as a miss, and the sweeper removes it (cascading to its
//! dependents) on its next pass.

mod entry;
mod pattern;

pub use entry::{CacheValue, Lookup, ValueType};
pub use pattern::glob_match;

pub(crate) use entry::CacheEntry;

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::debug;

use crate::config::CacheConfig;
use crate::error::{CacheError, Result};

/// Empty dependency list for writes that were derived from nothing.
pub const NO_DEPS: [&str; 0] = [];

/// One scheduled expiry. Tickets are compared by deadline so the heap
/// (wrapped in `Reverse`) pops the earliest one first.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Ticket {
    deadline: Instant,
    key: String,
    version: u64,
}

/// What the sweeper should do with a popped ticket.
enum Verdict {
    /// Entry gone, reinserted, or made permanent since scheduling.
    Drop,
    /// TTL was extended in place; put the ticket back at the new deadline.
    Requeue(Instant),
    /// Deadline has genuinely passed.
    Expired,
}

struct StoreInner {
    entries: HashMap<String, CacheEntry>,
    /// dependency key -> keys of entries that declared it.
    reverse: HashMap<String, HashSet<String>>,
    queue: BinaryHeap<Reverse<Ticket>>,
    /// Cleared when the sweeper stops; TTL registration fails after that.
    queue_open: bool,
    next_version: u64,
}

struct Shared {
    inner: Mutex<StoreInner>,
    /// Signaled when an earlier deadline is scheduled or the queue closes.
    expiry_changed: Condvar,
    config: CacheConfig,
}

/// The dependency-aware cache store.
///
/// Cloning is cheap and shares the same underlying state.
#[derive(Clone)]
pub struct CacheStore {
    shared: Arc<Shared>,
}

impl CacheStore {
    pub fn new() -> Self {
        Self::with_config(CacheConfig::default())
    }

    pub fn with_config(config: CacheConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(StoreInner {
                    entries: HashMap::with_capacity(config.initial_capacity),
                    reverse: HashMap::new(),
                    queue: BinaryHeap::new(),
                    queue_open: true,
                    next_version: 1,
                }),
                expiry_changed: Condvar::new(),
                config,
            }),
        }
    }

    /// Read a key. Absence and lapsed TTL both read as [`Lookup::Miss`];
    /// the present-but-empty marker reads as a hit.
    pub fn get(&self, key: &str) -> Lookup {
        let inner = self.shared.inner.lock();
        match inner.entries.get(key) {
            Some(entry) if !entry.is_expired(Instant::now()) => Lookup::Hit(entry.value.clone()),
            _ => Lookup::Miss,
        }
    }

    /// Write a key, replacing any previous entry atomically: the old
    /// version's reverse-index links are removed, the new dependency
    /// set's links added, and the entry scheduled on the delay queue
    /// when `ttl` is given. Returns the previous live value.
    ///
    /// Fails with [`CacheError::SchedulingFailure`] - writing nothing -
    /// when a TTL is requested but the delay queue has been closed.
    pub fn put<I>(
        &self,
        key: &str,
        value: CacheValue,
        ttl: Option<Duration>,
        dependencies: I,
    ) -> Result<Option<CacheValue>>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let dependencies: BTreeSet<String> = dependencies.into_iter().map(Into::into).collect();

        let mut inner = self.shared.inner.lock();
        if ttl.is_some() && !inner.queue_open {
            return Err(CacheError::SchedulingFailure {
                key: key.to_string(),
            });
        }

        let now = Instant::now();
        let version = inner.next_version;
        inner.next_version += 1;
        let expires_at = ttl.map(|d| now + d);

        let previous = inner.entries.remove(key);
        if let Some(prev) = &previous {
            unlink(&mut inner.reverse, key, &prev.dependencies);
        }
        for dep in &dependencies {
            inner
                .reverse
                .entry(dep.clone())
                .or_default()
                .insert(key.to_string());
        }

        debug!(key, deps = dependencies.len(), ttl = ?ttl, "put");

        inner.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                dependencies,
                expires_at,
                version,
            },
        );

        if let Some(at) = expires_at {
            self.schedule(&mut inner, key, version, at);
        }

        Ok(previous
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value))
    }

    /// Remove the given keys and, via the reverse index, every entry
    /// that transitively depends on any of them. Complete before this
    /// returns. Absent keys are a no-op; the count is how many entries
    /// were actually removed.
    pub fn evict<I>(&self, keys: I) -> usize
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let roots: Vec<String> = keys.into_iter().map(Into::into).collect();
        let mut inner = self.shared.inner.lock();
        evict_locked(&mut inner, roots)
    }

    /// Match all live keys against a glob (`*` any run, `?` one
    /// character) and cascade-evict the matches.
    pub fn evict_pattern(&self, pattern: &str) -> usize {
        let mut inner = self.shared.inner.lock();
        let now = Instant::now();
        let matches: Vec<String> = inner
            .entries
            .iter()
            .filter(|(key, entry)| !entry.is_expired(now) && glob_match(pattern, key))
            .map(|(key, _)| key.clone())
            .collect();
        evict_locked(&mut inner, matches)
    }

    /// The stored type tag of a live key, or `None` when the key is
    /// absent, expired, or holds the empty marker.
    pub fn value_type(&self, key: &str) -> Option<ValueType> {
        let inner = self.shared.inner.lock();
        inner
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired(Instant::now()))
            .and_then(|entry| entry.value.value_type())
    }

    /// Set or replace a live key's TTL without touching its value or
    /// dependencies. Returns `false` for an absent key, even after the
    /// delay queue has closed; [`CacheError::SchedulingFailure`] is
    /// reserved for a live entry whose TTL can no longer be registered,
    /// and leaves that entry untouched.
    ///
    /// The previous ticket (if any) stays on the delay queue; the
    /// sweeper reconciles it lazily when it fires.
    pub fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let mut inner = self.shared.inner.lock();
        let now = Instant::now();
        let at = now + ttl;
        let queue_open = inner.queue_open;
        let version = match inner.entries.get_mut(key) {
            Some(entry) if !entry.is_expired(now) => {
                if !queue_open {
                    return Err(CacheError::SchedulingFailure {
                        key: key.to_string(),
                    });
                }
                entry.expires_at = Some(at);
                entry.version
            }
            _ => return Ok(false),
        };
        self.schedule(&mut inner, key, version, at);
        Ok(true)
    }

    /// Cancel a live key's TTL, making it permanent. Returns `false`
    /// for an absent key. Stale queue tickets are dropped by the
    /// sweeper when they fire.
    pub fn persist(&self, key: &str) -> bool {
        let mut inner = self.shared.inner.lock();
        match inner.entries.get_mut(key) {
            Some(entry) if !entry.is_expired(Instant::now()) => {
                entry.expires_at = None;
                true
            }
            _ => false,
        }
    }

    /// Whether a live entry exists under `key`.
    pub fn contains(&self, key: &str) -> bool {
        let inner = self.shared.inner.lock();
        inner
            .entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired(Instant::now()))
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let inner = self.shared.inner.lock();
        let now = Instant::now();
        inner
            .entries
            .values()
            .filter(|entry| !entry.is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All live keys, in no particular order.
    pub fn keys(&self) -> Vec<String> {
        let inner = self.shared.inner.lock();
        let now = Instant::now();
        inner
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// The dependency set a live key was stored with.
    pub fn dependencies_of(&self, key: &str) -> Option<BTreeSet<String>> {
        let inner = self.shared.inner.lock();
        inner
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired(Instant::now()))
            .map(|entry| entry.dependencies.clone())
    }

    fn schedule(&self, inner: &mut StoreInner, key: &str, version: u64, at: Instant) {
        let wakes_earlier = inner
            .queue
            .peek()
            .is_none_or(|Reverse(head)| at < head.deadline);
        inner.queue.push(Reverse(Ticket {
            deadline: at,
            key: key.to_string(),
            version,
        }));
        if wakes_earlier {
            self.shared.expiry_changed.notify_all();
        }
    }

    /// Number of keys present in the reverse index. Test visibility.
    #[cfg(test)]
    pub(crate) fn reverse_index_len(&self) -> usize {
        self.shared.inner.lock().reverse.len()
    }

    pub(crate) fn sweep_bound(&self) -> Duration {
        self.shared.config.sweep_bound
    }

    /// One sweeper iteration: bounded wait for the earliest deadline,
    /// then pop every due ticket, re-validate it against the live entry,
    /// and cascade-evict the genuinely expired keys. Returns how many
    /// entries were removed.
    pub(crate) fn sweep_once(&self, bound: Duration, shutdown: &AtomicBool) -> usize {
        let mut inner = self.shared.inner.lock();

        let now = Instant::now();
        let wait = match inner.queue.peek() {
            Some(Reverse(head)) if head.deadline <= now => Duration::ZERO,
            Some(Reverse(head)) => (head.deadline - now).min(bound),
            None => bound,
        };
        // The flag is re-read under the structural lock: the shutdown
        // path sets it and then notifies while holding this lock, so it
        // cannot slip between this load and the wait below.
        if !wait.is_zero() && !shutdown.load(Ordering::Acquire) {
            let _ = self
                .shared
                .expiry_changed
                .wait_for(&mut inner, wait);
        }

        let now = Instant::now();
        let mut expired = Vec::new();
        loop {
            match inner.queue.peek() {
                Some(Reverse(head)) if head.deadline <= now => {}
                _ => break,
            }
            let Some(Reverse(ticket)) = inner.queue.pop() else {
                break;
            };

            let verdict = match inner.entries.get(&ticket.key) {
                None => Verdict::Drop,
                Some(entry) if entry.version != ticket.version => Verdict::Drop,
                Some(entry) => match entry.expires_at {
                    None => Verdict::Drop,
                    Some(at) if at > now => Verdict::Requeue(at),
                    Some(_) => Verdict::Expired,
                },
            };

            match verdict {
                Verdict::Drop => {}
                Verdict::Requeue(at) => inner.queue.push(Reverse(Ticket {
                    deadline: at,
                    ..ticket
                })),
                Verdict::Expired => expired.push(ticket.key),
            }
        }

        if expired.is_empty() {
            0
        } else {
            debug!(due = expired.len(), "sweeping expired entries");
            evict_locked(&mut inner, expired)
        }
    }

    /// Refuse further TTL registration and wake the sweeper. Called on
    /// sweeper shutdown.
    pub(crate) fn close_queue(&self) -> usize {
        let mut inner = self.shared.inner.lock();
        inner.queue_open = false;
        self.shared.expiry_changed.notify_all();
        inner.queue.len()
    }

    pub(crate) fn wake_sweeper(&self) {
        self.shared.expiry_changed.notify_all();
    }
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.shared.inner.lock();
        f.debug_struct("CacheStore")
            .field("entry_count", &inner.entries.len())
            .field("indexed_dependencies", &inner.reverse.len())
            .field("queued_expirations", &inner.queue.len())
            .finish()
    }
}

/// Remove `key` from the reverse-index set of each of its dependencies,
/// dropping sets that empty out.
fn unlink(reverse: &mut HashMap<String, HashSet<String>>, key: &str, dependencies: &BTreeSet<String>) {
    for dep in dependencies {
        if let Some(dependents) = reverse.get_mut(dep) {
            dependents.remove(key);
            if dependents.is_empty() {
                reverse.remove(dep);
            }
        }
    }
}

/// Cascading eviction under the structural lock. The visited set
/// guarantees termination even when explicit dependency declarations
/// formed a cycle.
fn evict_locked(inner: &mut StoreInner, roots: Vec<String>) -> usize {
    let mut visited: HashSet<String> = HashSet::new();
    let mut stack = roots;
    let mut removed = 0;

    while let Some(key) = stack.pop() {
        if !visited.insert(key.clone()) {
            continue;
        }
        if let Some(dependents) = inner.reverse.get(&key) {
            stack.extend(dependents.iter().cloned());
        }
        if let Some(entry) = inner.entries.remove(&key) {
            unlink(&mut inner.reverse, &key, &entry.dependencies);
            removed += 1;
            debug!(key = %key, "evicted");
        }
    }

    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn scalar(n: i64) -> CacheValue {
        CacheValue::Scalar(serde_json::Value::from(n))
    }

    #[test]
    fn test_put_get_roundtrip() {
        let store = CacheStore::new();
        store.put("k", scalar(7), None, NO_DEPS).unwrap();

        assert_eq!(store.get("k"), Lookup::Hit(scalar(7)));
        assert_eq!(store.get("missing"), Lookup::Miss);
    }

    #[test]
    fn test_put_returns_previous_value() {
        let store = CacheStore::new();
        assert_eq!(store.put("k", scalar(1), None, NO_DEPS).unwrap(), None);
        assert_eq!(
            store.put("k", scalar(2), None, NO_DEPS).unwrap(),
            Some(scalar(1))
        );
    }

    #[test]
    fn test_empty_marker_is_a_hit_but_untyped() {
        let store = CacheStore::new();
        store.put("nothing", CacheValue::Empty, None, NO_DEPS).unwrap();

        assert!(store.get("nothing").is_hit());
        assert_eq!(store.value_type("nothing"), None);
    }

    #[test]
    fn test_evict_absent_key_is_a_noop() {
        let store = CacheStore::new();
        store.put("a", scalar(1), None, ["b"]).unwrap();
        let indexed = store.reverse_index_len();

        assert_eq!(store.evict(["ghost"]), 0);
        assert_eq!(store.len(), 1);
        assert_eq!(store.reverse_index_len(), indexed);
    }

    #[test]
    fn test_evicting_dependency_cascades() {
        let store = CacheStore::new();
        store.put("b", scalar(1), None, NO_DEPS).unwrap();
        store.put("a", scalar(2), None, ["b"]).unwrap();

        assert_eq!(store.evict(["b"]), 2);
        assert_eq!(store.get("a"), Lookup::Miss);
        assert_eq!(store.value_type("a"), None);
        assert_eq!(store.reverse_index_len(), 0);
    }

    #[test]
    fn test_evicting_leaf_removes_only_it() {
        let store = CacheStore::new();
        store.put("b", scalar(1), None, NO_DEPS).unwrap();
        store.put("a", scalar(2), None, ["b"]).unwrap();
        store.put("c", scalar(3), None, NO_DEPS).unwrap();

        assert_eq!(store.evict(["c"]), 1);
        assert!(store.contains("a"));
        assert!(store.contains("b"));
    }

    #[test]
    fn test_cascade_runs_transitively() {
        let store = CacheStore::new();
        store.put("base", scalar(0), None, NO_DEPS).unwrap();
        store.put("mid", scalar(1), None, ["base"]).unwrap();
        store.put("top", scalar(2), None, ["mid"]).unwrap();

        assert_eq!(store.evict(["base"]), 3);
        assert!(store.is_empty());
        assert_eq!(store.reverse_index_len(), 0);
    }

    #[test]
    fn test_cyclic_dependencies_terminate() {
        let store = CacheStore::new();
        store.put("a", scalar(1), None, ["b"]).unwrap();
        store.put("b", scalar(2), None, ["a"]).unwrap();

        assert_eq!(store.evict(["a"]), 2);
        assert!(store.is_empty());
    }

    #[test]
    fn test_put_rewires_reverse_index() {
        let store = CacheStore::new();
        store.put("dep1", scalar(0), None, NO_DEPS).unwrap();
        store.put("dep2", scalar(0), None, NO_DEPS).unwrap();
        store.put("a", scalar(1), None, ["dep1"]).unwrap();
        store.put("a", scalar(2), None, ["dep2"]).unwrap();

        // The old link must be gone: evicting dep1 leaves a standing.
        assert_eq!(store.evict(["dep1"]), 1);
        assert!(store.contains("a"));
        // The new link works.
        assert_eq!(store.evict(["dep2"]), 2);
        assert!(!store.contains("a"));
    }

    #[test]
    fn test_pattern_eviction_matches_exactly() {
        let store = CacheStore::new();
        store.put("user:1", scalar(1), None, NO_DEPS).unwrap();
        store.put("user:2", scalar(2), None, NO_DEPS).unwrap();
        store.put("order:1", scalar(3), None, ["user:1"]).unwrap();

        // order:1 depends on user:1, so the cascade takes it too.
        assert_eq!(store.evict_pattern("user:*"), 3);
        assert_eq!(store.get("order:1"), Lookup::Miss);

        store.put("user:1", scalar(1), None, NO_DEPS).unwrap();
        store.put("user:2", scalar(2), None, NO_DEPS).unwrap();
        store.put("order:1", scalar(3), None, NO_DEPS).unwrap();

        assert_eq!(store.evict_pattern("user:*"), 2);
        assert!(store.contains("order:1"));
    }

    #[test]
    fn test_lazy_expiry_reads_as_miss() {
        let store = CacheStore::new();
        store
            .put("short", scalar(1), Some(Duration::from_millis(5)), NO_DEPS)
            .unwrap();

        thread::sleep(Duration::from_millis(20));
        // No sweeper running; the read itself must treat it as gone.
        assert_eq!(store.get("short"), Lookup::Miss);
        assert!(!store.contains("short"));
        assert_eq!(store.value_type("short"), None);
    }

    #[test]
    fn test_expire_and_persist() {
        let store = CacheStore::new();
        store.put("k", scalar(1), None, NO_DEPS).unwrap();

        assert!(store.expire("k", Duration::from_millis(5)).unwrap());
        store.persist("k");
        thread::sleep(Duration::from_millis(20));
        assert!(store.contains("k"));

        assert!(!store.expire("ghost", Duration::from_secs(1)).unwrap());
        assert!(!store.persist("ghost"));
    }

    #[test]
    fn test_concurrent_disjoint_writes_lose_nothing() {
        let store = CacheStore::new();
        let mut handles = Vec::new();

        for t in 0..8 {
            let store = store.clone();
            handles.push(thread::spawn(move || {
                for i in 0..100 {
                    let key = format!("t{t}:k{i}");
                    store.put(&key, scalar(i), None, NO_DEPS).unwrap();
                    assert!(store.get(&key).is_hit());
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.len(), 800);
    }

    #[test]
    fn test_evict_visible_across_threads() {
        let store = CacheStore::new();
        store.put("k", scalar(1), None, NO_DEPS).unwrap();

        let evictor = {
            let store = store.clone();
            thread::spawn(move || store.evict(["k"]))
        };
        assert_eq!(evictor.join().unwrap(), 1);

        // The evict returned before we read: the miss is guaranteed.
        assert_eq!(store.get("k"), Lookup::Miss);
    }

    #[test]
    fn test_dependencies_of_reflects_stored_set() {
        let store = CacheStore::new();
        store.put("a", scalar(1), None, ["b", "c", "b"]).unwrap();

        let deps = store.dependencies_of("a").unwrap();
        assert_eq!(deps.len(), 2);
        assert!(deps.contains("b") && deps.contains("c"));
    }
}
