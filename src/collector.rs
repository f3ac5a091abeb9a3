//! Dependency collector - reentrant, thread-scoped key tracking.
//!
//! Each guarded computation opens a scope before it runs and closes it
//! after; every cache key touched while it is open is recorded into it
//! *and into every other scope open on the same thread*, because an
//! outer computation transitively depends on anything an inner one
//! touched, hit or miss.
//!
//! State is thread-local by design. A computation that offloads work to
//! another thread loses automatic propagation there; such callers must
//! declare their dependencies explicitly. This is a documented
//! limitation of the collector, not something the store compensates for.

use std::cell::RefCell;
use std::collections::HashSet;

use tracing::debug;
use uuid::Uuid;

/// Identifies one open scope. Opaque; obtained from [`open_scope`] and
/// spent in [`close_scope`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeToken(Uuid);

struct Scope {
    token: ScopeToken,
    keys: HashSet<String>,
}

thread_local! {
    static SCOPES: RefCell<Vec<Scope>> = const { RefCell::new(Vec::new()) };
}

/// Begin tracking a guarded computation. Scopes nest: opening a second
/// scope before closing the first models a nested guarded call.
pub fn open_scope() -> ScopeToken {
    let token = ScopeToken(Uuid::new_v4());
    SCOPES.with(|scopes| {
        scopes.borrow_mut().push(Scope {
            token,
            keys: HashSet::new(),
        });
    });
    token
}

/// Record that `key` was touched. The key lands in the accumulator of
/// every scope currently open on this thread; duplicates collapse.
/// A no-op when no scope is open.
pub fn record_use(key: &str) {
    SCOPES.with(|scopes| {
        for scope in scopes.borrow_mut().iter_mut() {
            scope.keys.insert(key.to_string());
        }
    });
}

/// End tracking for `token`, returning its accumulated key set.
///
/// The scope is removed wherever it sits in the stack; an unknown or
/// already-closed token yields an empty set rather than an error, since
/// the interception layer pairs open/close itself.
pub fn close_scope(token: ScopeToken) -> HashSet<String> {
    SCOPES.with(|scopes| {
        let mut scopes = scopes.borrow_mut();
        match scopes.iter().rposition(|scope| scope.token == token) {
            Some(idx) => scopes.remove(idx).keys,
            None => {
                debug!(?token, "close_scope on unknown token");
                HashSet::new()
            }
        }
    })
}

/// Number of scopes currently open on this thread.
pub fn open_scope_count() -> usize {
    SCOPES.with(|scopes| scopes.borrow().len())
}
