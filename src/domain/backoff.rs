//! Reconnect backoff for realtime clients.
//!
//! The server hub never retries a client. Clients reconnect on their own,
//! and this state machine paces those attempts: exponential growth from a
//! base delay, capped, with full jitter and a maximum number of retries.

use rand::Rng;
use std::time::Duration;

/// Bounded exponential backoff with full jitter.
///
/// # Example
/// ```
/// use relay_throttle::ReconnectBackoff;
/// use std::time::Duration;
///
/// let mut backoff = ReconnectBackoff::new(Duration::from_secs(1), Duration::from_secs(8), 3);
/// for _ in 0..3 {
///     let delay = backoff.next_delay().unwrap();
///     assert!(delay <= Duration::from_secs(8));
/// }
/// assert!(backoff.next_delay().is_none());
///
/// backoff.reset();
/// assert!(backoff.next_delay().is_some());
/// ```
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    base: Duration,
    cap: Duration,
    max_retries: u32,
    attempt: u32,
}

impl ReconnectBackoff {
    /// Backoff starting at `base`, doubling per attempt up to `cap`, giving
    /// up after `max_retries` attempts. A `cap` below `base` is raised to it.
    pub fn new(base: Duration, cap: Duration, max_retries: u32) -> Self {
        Self {
            base,
            cap: cap.max(base),
            max_retries,
            attempt: 0,
        }
    }

    /// Upper bound of the delay for the current attempt, before jitter.
    pub fn ceiling(&self) -> Duration {
        let factor = 1u32.checked_shl(self.attempt).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.cap)
    }

    /// Delay before the next attempt, or `None` once retries are exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.max_retries {
            return None;
        }
        let ceiling = self.ceiling();
        self.attempt += 1;

        let millis = u64::try_from(ceiling.as_millis()).unwrap_or(u64::MAX);
        if millis == 0 {
            return Some(Duration::ZERO);
        }
        Some(Duration::from_millis(rand::thread_rng().gen_range(0..=millis)))
    }

    /// Call after a successful connect.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Attempts made since the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempt
    }
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(5), Duration::from_secs(60), 10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ceiling_doubles_until_cap() {
        let mut backoff = ReconnectBackoff::new(Duration::from_secs(5), Duration::from_secs(60), 10);
        let mut ceilings = Vec::new();
        for _ in 0..6 {
            ceilings.push(backoff.ceiling().as_secs());
            backoff.next_delay();
        }
        assert_eq!(ceilings, vec![5, 10, 20, 40, 60, 60]);
    }

    #[test]
    fn test_delays_stay_under_ceiling() {
        let mut backoff = ReconnectBackoff::default();
        for _ in 0..10 {
            let ceiling = backoff.ceiling();
            let delay = backoff.next_delay().unwrap();
            assert!(delay <= ceiling);
        }
        assert!(backoff.next_delay().is_none());
        assert_eq!(backoff.attempts(), 10);
    }

    #[test]
    fn test_large_attempt_counts_do_not_overflow() {
        let mut backoff = ReconnectBackoff::new(Duration::from_secs(1), Duration::from_secs(30), 100);
        for _ in 0..100 {
            assert!(backoff.next_delay().unwrap() <= Duration::from_secs(30));
        }
    }
}
