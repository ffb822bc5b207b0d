//! Observability counters for admission and fan-out.
//!
//! All counters are atomics and cheap to clone; read them at any time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters maintained by the `RateLimiter`.
#[derive(Debug, Clone, Default)]
pub struct LimiterMetrics {
    inner: Arc<LimiterCounters>,
}

#[derive(Debug, Default)]
struct LimiterCounters {
    admitted: AtomicU64,
    rejected: AtomicU64,
    store_failures: AtomicU64,
    failed_open: AtomicU64,
    failed_closed: AtomicU64,
}

impl LimiterMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_admitted(&self) {
        self.inner.admitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.inner.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_store_failure(&self) {
        self.inner.store_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed_open(&self) {
        self.inner.failed_open.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed_closed(&self) {
        self.inner.failed_closed.fetch_add(1, Ordering::Relaxed);
    }

    /// Requests admitted, including fail-open admissions.
    pub fn admitted(&self) -> u64 {
        self.inner.admitted.load(Ordering::Relaxed)
    }

    /// Requests rejected because the window was full.
    pub fn rejected(&self) -> u64 {
        self.inner.rejected.load(Ordering::Relaxed)
    }

    /// Store calls that errored or timed out.
    pub fn store_failures(&self) -> u64 {
        self.inner.store_failures.load(Ordering::Relaxed)
    }

    /// Requests admitted because the store was unavailable.
    pub fn failed_open(&self) -> u64 {
        self.inner.failed_open.load(Ordering::Relaxed)
    }

    /// Requests refused because the store was unavailable.
    pub fn failed_closed(&self) -> u64 {
        self.inner.failed_closed.load(Ordering::Relaxed)
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> LimiterSnapshot {
        LimiterSnapshot {
            admitted: self.admitted(),
            rejected: self.rejected(),
            store_failures: self.store_failures(),
            failed_open: self.failed_open(),
            failed_closed: self.failed_closed(),
        }
    }
}

/// Point-in-time copy of `LimiterMetrics`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimiterSnapshot {
    pub admitted: u64,
    pub rejected: u64,
    pub store_failures: u64,
    pub failed_open: u64,
    pub failed_closed: u64,
}

impl LimiterSnapshot {
    /// Share of decided requests that were rejected (0.0 to 1.0).
    pub fn rejection_rate(&self) -> f64 {
        let total = self.admitted.saturating_add(self.rejected);
        if total == 0 {
            0.0
        } else {
            self.rejected as f64 / total as f64
        }
    }
}

/// Counters maintained by the `FanOutHub`.
#[derive(Debug, Clone, Default)]
pub struct HubMetrics {
    inner: Arc<HubCounters>,
}

#[derive(Debug, Default)]
struct HubCounters {
    connects: AtomicU64,
    disconnects: AtomicU64,
    deliveries: AtomicU64,
    delivery_failures: AtomicU64,
    heartbeat_timeouts: AtomicU64,
}

impl HubMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_connect(&self) {
        self.inner.connects.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_disconnect(&self) {
        self.inner.disconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_deliveries(&self, count: usize) {
        self.inner
            .deliveries
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_delivery_failure(&self) {
        self.inner.delivery_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_heartbeat_timeout(&self) {
        self.inner.heartbeat_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Connections registered since start.
    pub fn connects(&self) -> u64 {
        self.inner.connects.load(Ordering::Relaxed)
    }

    /// Connections removed for any reason.
    pub fn disconnects(&self) -> u64 {
        self.inner.disconnects.load(Ordering::Relaxed)
    }

    /// Successful channel writes.
    pub fn deliveries(&self) -> u64 {
        self.inner.deliveries.load(Ordering::Relaxed)
    }

    /// Channel writes that failed and closed their connection.
    pub fn delivery_failures(&self) -> u64 {
        self.inner.delivery_failures.load(Ordering::Relaxed)
    }

    /// Connections removed for missing a pong.
    pub fn heartbeat_timeouts(&self) -> u64 {
        self.inner.heartbeat_timeouts.load(Ordering::Relaxed)
    }
}
