//! Expiry sweeper - background worker draining the delay queue.
//!
//! One worker thread pulls the earliest-expiring ticket with a bounded
//! wait. A ticket that fires is re-validated against the live entry
//! under the structural lock: gone or reinserted since - dropped
//! silently; made permanent - dropped; TTL extended in place -
//! re-enqueued at the new deadline; genuinely expired - cascade-evicted
//! together with everything that depends on it. In-place TTL updates
//! therefore never need to touch the queue synchronously; the sweeper
//! reconciles stale wake-ups lazily.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use tracing::{debug, info, warn};

use crate::store::CacheStore;

/// Handle to the background expiry worker.
///
/// Stopping (explicitly or on drop) closes the store's delay queue -
/// later TTL registrations fail with `SchedulingFailure` - lets the
/// current iteration finish, and joins the thread. An eviction in
/// flight when stop is requested completes; it is never dropped
/// half-done.
pub struct Sweeper {
    handle: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    store: CacheStore,
}

impl Sweeper {
    /// Start the worker for `store`, using the store's configured sweep
    /// bound.
    pub fn start(store: CacheStore) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let handle = {
            let store = store.clone();
            let shutdown = Arc::clone(&shutdown);
            std::thread::Builder::new()
                .name("cachegraph-sweeper".to_string())
                .spawn(move || run(store, shutdown))
                .unwrap_or_else(|e| panic!("failed to spawn sweeper thread: {e}"))
        };
        info!("expiry sweeper started");
        Self {
            handle: Some(handle),
            shutdown,
            store,
        }
    }

    /// Request shutdown and wait for the worker to exit.
    pub fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        self.shutdown.store(true, Ordering::Release);
        let pending = self.store.close_queue();
        self.store.wake_sweeper();
        if handle.join().is_err() {
            warn!("sweeper thread panicked before shutdown");
        }
        if pending > 0 {
            warn!(pending, "sweeper stopped with expiry tickets still queued");
        }
        info!("expiry sweeper stopped");
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(store: CacheStore, shutdown: Arc<AtomicBool>) {
    let bound = store.sweep_bound();
    loop {
        if shutdown.load(Ordering::Acquire) {
            break;
        }
        // sweep_once re-checks the flag under the store's structural
        // lock before parking, so a stop requested between the check
        // above and the wait does not cost a full sweep bound.
        let removed = store.sweep_once(bound, &shutdown);
        if removed > 0 {
            debug!(removed, "sweep pass evicted expired entries");
        }
    }
    debug!("sweeper loop exited");
}
