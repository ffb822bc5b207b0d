//! In-process window store.
//!
//! Keeps one sliding log per key in a sharded map. The shard lock held by
//! `entry()` makes purge + count + insert atomic per key. Suitable for a
//! single process; replicas that must share limits need the Redis store.
//!
//! Idle keys are swept from the check path itself: the first check after
//! each sweep interval (default 60 s) removes every key whose newest entry
//! has left its window, so memory stays bounded by recently active clients.

use crate::application::ports::{Clock, StoreError, WindowStore};
use crate::domain::window::{window_millis, SlidingWindowLog, WindowOutcome};
use dashmap::DashMap;
use std::fmt;
use std::future::{self, Future};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Default time between sweeps of idle keys.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Default)]
struct KeyLog {
    log: SlidingWindowLog,
    window: Duration,
}

/// Sliding-log store backed by DashMap.
pub struct MemoryWindowStore {
    logs: DashMap<String, KeyLog, ahash::RandomState>,
    clock: Arc<dyn Clock>,
    sweep_interval: Duration,
    last_sweep_ms: AtomicU64,
}

impl fmt::Debug for MemoryWindowStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryWindowStore")
            .field("keys", &self.logs.len())
            .field("sweep_interval", &self.sweep_interval)
            .finish_non_exhaustive()
    }
}

impl MemoryWindowStore {
    /// Create a store that timestamps entries with `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let now = clock.now_millis();
        Self {
            logs: DashMap::with_hasher(ahash::RandomState::new()),
            clock,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            last_sweep_ms: AtomicU64::new(now),
        }
    }

    /// Set how often checks sweep idle keys. `Duration::MAX` turns the
    /// sweep off.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Drop keys whose newest entry has left its window.
    ///
    /// Returns the number of keys removed. Checks already do this once per
    /// sweep interval.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(self.clock.now_millis())
    }

    fn purge_expired_at(&self, now: u64) -> usize {
        let before = self.logs.len();
        self.logs.retain(|_, entry| match entry.log.newest() {
            Some(newest) => newest.saturating_add(window_millis(entry.window)) > now,
            None => false,
        });
        before.saturating_sub(self.logs.len())
    }

    // Must not be called while holding a map guard: `retain` locks every shard.
    fn maybe_sweep(&self, now: u64) {
        let last = self.last_sweep_ms.load(Ordering::Acquire);
        if now < last.saturating_add(window_millis(self.sweep_interval)) {
            return;
        }
        if self
            .last_sweep_ms
            .compare_exchange(last, now, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let removed = self.purge_expired_at(now);
        if removed > 0 {
            tracing::debug!(removed, remaining = self.logs.len(), "swept idle rate limit keys");
        }
    }

    /// Number of keys tracked.
    pub fn len(&self) -> usize {
        self.logs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.logs.is_empty()
    }

    /// Entries currently held for `key`, purged or not.
    pub fn entries(&self, key: &str) -> usize {
        self.logs.get(key).map_or(0, |entry| entry.log.len())
    }

    /// Forget every key.
    pub fn clear(&self) {
        self.logs.clear();
    }
}

impl WindowStore for MemoryWindowStore {
    fn check_and_record(
        &self,
        key: &str,
        window: Duration,
        max_requests: u32,
    ) -> impl Future<Output = Result<WindowOutcome, StoreError>> + Send {
        let now = self.clock.now_millis();
        let outcome = {
            let mut entry = self.logs.entry(key.to_string()).or_default();
            entry.window = window;
            entry.log.try_admit(now, window, max_requests)
        };
        self.maybe_sweep(now);
        future::ready(Ok(outcome))
    }
}
