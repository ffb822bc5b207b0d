//! Circuit breaker around the shared counter store.
//!
//! When the store fails repeatedly the breaker opens and the limiter stops
//! sending it traffic for a recovery period. While open, every check is
//! answered by the category's `StoreFailureMode` without a round trip, so an
//! outage costs callers nothing but the decision itself.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::time::{Duration, Instant};

/// Breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Store calls flow normally
    Closed = 0,
    /// Store calls are skipped
    Open = 1,
    /// One trial call is let through to test recovery
    HalfOpen = 2,
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }
}

/// Configuration for circuit breaker behavior.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive store failures before the breaker opens
    pub failure_threshold: u32,
    /// How long to skip the store before probing it again
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(10),
        }
    }
}

/// Lock-free circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    state: AtomicU8,
    consecutive_failures: AtomicU64,
    opened_at_nanos: AtomicU64,
    config: CircuitBreakerConfig,
    epoch: Instant,
}

impl CircuitBreaker {
    /// Breaker with the default threshold (5) and recovery timeout (10 s).
    pub fn new() -> Self {
        Self::with_config(CircuitBreakerConfig::default())
    }

    /// Create a closed breaker with custom configuration.
    pub fn with_config(config: CircuitBreakerConfig) -> Self {
        Self {
            state: AtomicU8::new(CircuitState::Closed as u8),
            consecutive_failures: AtomicU64::new(0),
            opened_at_nanos: AtomicU64::new(0),
            config,
            epoch: Instant::now(),
        }
    }

    /// Current state.
    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::Acquire))
    }

    /// Whether the store should be called for this check.
    ///
    /// Once the recovery timeout has passed, exactly one caller is granted a
    /// trial call and the breaker moves to half-open. A trial call that never
    /// reports back (its future was dropped) does not wedge the breaker: after
    /// another recovery timeout a fresh one is granted.
    pub fn permits_call(&self) -> bool {
        let observed = self.state();
        if observed == CircuitState::Closed {
            return true;
        }

        let stamp = self.opened_at_nanos.load(Ordering::Acquire);
        let elapsed = self.epoch.elapsed().saturating_sub(Duration::from_nanos(stamp));
        if elapsed < self.config.recovery_timeout {
            return false;
        }

        // Restamping claims the trial slot for one recovery period.
        if self
            .opened_at_nanos
            .compare_exchange(
                stamp,
                self.nanos_since_epoch(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return false;
        }

        if observed == CircuitState::Open {
            let _ = self.state.compare_exchange(
                CircuitState::Open as u8,
                CircuitState::HalfOpen as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
        } else {
            tracing::debug!("half-open trial call went unanswered, granting another");
        }
        true
    }

    /// Report a store call that answered. Closes the breaker.
    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Release);
        if self.state() != CircuitState::Closed {
            tracing::info!("counter store recovered, closing circuit");
        }
        self.state
            .store(CircuitState::Closed as u8, Ordering::Release);
    }

    /// Report a failed or timed-out store call.
    ///
    /// Opens the breaker at the failure threshold, or at once after a
    /// failed half-open trial call.
    pub fn record_failure(&self) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;

        let should_open = match self.state() {
            CircuitState::HalfOpen => true,
            CircuitState::Closed => failures >= u64::from(self.config.failure_threshold),
            CircuitState::Open => false,
        };

        if should_open {
            self.opened_at_nanos
                .store(self.nanos_since_epoch(), Ordering::Release);
            self.state.store(CircuitState::Open as u8, Ordering::Release);
            tracing::warn!(
                consecutive_failures = failures,
                recovery_timeout = ?self.config.recovery_timeout,
                "counter store circuit opened"
            );
        }
    }

    pub fn consecutive_failures(&self) -> u64 {
        self.consecutive_failures.load(Ordering::Acquire)
    }

    /// Force the breaker closed.
    pub fn reset(&self) {
        self.consecutive_failures.store(0, Ordering::Release);
        self.state
            .store(CircuitState::Closed as u8, Ordering::Release);
    }

    fn nanos_since_epoch(&self) -> u64 {
        self.epoch
            .elapsed()
            .as_nanos()
            .try_into()
            .unwrap_or(u64::MAX)
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn breaker(threshold: u32, recovery: Duration) -> CircuitBreaker {
        CircuitBreaker::with_config(CircuitBreakerConfig {
            failure_threshold: threshold,
            recovery_timeout: recovery,
        })
    }

    #[test]
    fn test_initial_state() {
        let cb = CircuitBreaker::new();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.permits_call());
    }

    #[test]
    fn test_opens_at_threshold() {
        let cb = breaker(3, Duration::from_secs(10));
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);

        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.permits_call());
    }

    #[test]
    fn test_single_trial_call_after_recovery_timeout() {
        let cb = breaker(1, Duration::from_millis(50));
        cb.record_failure();
        assert!(!cb.permits_call());

        thread::sleep(Duration::from_millis(80));
        assert!(cb.permits_call());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        // Only the first caller gets through
        assert!(!cb.permits_call());
    }

    #[test]
    fn test_abandoned_trial_call_is_regranted_after_recovery() {
        let cb = breaker(1, Duration::from_millis(30));
        cb.record_failure();
        thread::sleep(Duration::from_millis(50));

        // Granted, then never reported back
        assert!(cb.permits_call());
        assert!(!cb.permits_call());
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        thread::sleep(Duration::from_millis(50));
        assert!(cb.permits_call());
        assert!(!cb.permits_call());

        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.permits_call());
    }

    #[test]
    fn test_trial_success_closes() {
        let cb = breaker(1, Duration::from_millis(20));
        cb.record_failure();
        thread::sleep(Duration::from_millis(40));
        assert!(cb.permits_call());

        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.consecutive_failures(), 0);
    }

    #[test]
    fn test_trial_failure_reopens() {
        let cb = breaker(1, Duration::from_millis(20));
        cb.record_failure();
        thread::sleep(Duration::from_millis(40));
        assert!(cb.permits_call());

        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.permits_call());
    }

    #[test]
    fn test_success_resets_failure_count() {
        let cb = breaker(3, Duration::from_secs(10));
        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_reset() {
        let cb = breaker(1, Duration::from_secs(10));
        cb.record_failure();
        cb.reset();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.permits_call());
    }

    #[test]
    fn test_concurrent_failures() {
        let cb = Arc::new(breaker(5, Duration::from_secs(10)));
        let handles: Vec<_> = (0..10)
            .map(|_| {
                let cb = Arc::clone(&cb);
                thread::spawn(move || cb.record_failure())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cb.consecutive_failures(), 10);
        assert_eq!(cb.state(), CircuitState::Open);
    }
}
