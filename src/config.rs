//! Store configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for a [`CacheStore`](crate::store::CacheStore).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Upper bound on how long the expiry sweeper sleeps between checks,
    /// even when no entry is due. Keeps the sweeper responsive to
    /// deadlines inserted while it waits.
    pub sweep_bound: Duration,

    /// Initial capacity of the entry map.
    pub initial_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            sweep_bound: Duration::from_secs(5),
            initial_capacity: 1_024,
        }
    }
}

impl CacheConfig {
    /// Set the sweeper's bounded wait (builder pattern).
    #[must_use]
    pub fn sweep_bound(mut self, bound: Duration) -> Self {
        self.sweep_bound = bound;
        self
    }

    /// Set the initial capacity of the entry map.
    #[must_use]
    pub fn initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }

    /// Config for short-lived, rapidly expiring entries.
    /// Tight sweep bound so TTLs in the tens of milliseconds are honored
    /// promptly.
    pub fn responsive() -> Self {
        Self {
            sweep_bound: Duration::from_millis(20),
            initial_capacity: 256,
        }
    }

    /// Config for large, mostly permanent data sets.
    /// Relaxed sweep cadence, bigger initial map.
    pub fn bulk() -> Self {
        Self {
            sweep_bound: Duration::from_secs(30),
            initial_capacity: 16_384,
        }
    }
}
