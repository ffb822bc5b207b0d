//! Sliding-log admission counting.
//!
//! Each key keeps the timestamps of the requests it admitted. A check drops
//! everything older than the window, counts what is left and admits only if
//! the count is below the threshold.

use std::collections::VecDeque;
use std::time::Duration;

/// Result of one purge + count + conditional insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowOutcome {
    /// Whether the request was admitted (and recorded)
    pub admitted: bool,
    /// Entries in the window after the check, including the new one if admitted
    pub count: u32,
    /// Timestamp of the oldest entry still in the window, if any
    pub oldest_ms: Option<u64>,
    /// Store time used for the check, in epoch milliseconds
    pub now_ms: u64,
}

/// Ordered log of admitted request timestamps for one key.
///
/// # Example
/// ```
/// use relay_throttle::domain::window::SlidingWindowLog;
/// use std::time::Duration;
///
/// let mut log = SlidingWindowLog::new();
/// let window = Duration::from_secs(60);
///
/// assert!(log.try_admit(1_000, window, 2).admitted);
/// assert!(log.try_admit(2_000, window, 2).admitted);
/// assert!(!log.try_admit(3_000, window, 2).admitted);
///
/// // The first entry falls out once the window has passed
/// assert!(log.try_admit(61_000, window, 2).admitted);
/// ```
#[derive(Debug, Clone, Default)]
pub struct SlidingWindowLog {
    timestamps: VecDeque<u64>,
}

impl SlidingWindowLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self {
            timestamps: VecDeque::new(),
        }
    }

    /// Drop entries at or before `now - window`.
    ///
    /// Nothing is dropped while `now` is still inside the first window.
    pub fn purge(&mut self, now_ms: u64, window: Duration) {
        let Some(cutoff) = now_ms.checked_sub(window_millis(window)) else {
            return;
        };
        while let Some(&oldest) = self.timestamps.front() {
            if oldest <= cutoff {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// Purge, count and record `now_ms` if the count is below `max_requests`.
    pub fn try_admit(&mut self, now_ms: u64, window: Duration, max_requests: u32) -> WindowOutcome {
        self.purge(now_ms, window);

        let admitted = self.timestamps.len() < max_requests as usize;
        if admitted {
            // Keep the log ordered even if the clock stepped backwards.
            let ts = self.timestamps.back().map_or(now_ms, |&last| last.max(now_ms));
            self.timestamps.push_back(ts);
        }

        WindowOutcome {
            admitted,
            count: u32::try_from(self.timestamps.len()).unwrap_or(u32::MAX),
            oldest_ms: self.timestamps.front().copied(),
            now_ms,
        }
    }

    /// Number of entries currently held (not purged).
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// Whether the log holds no entries.
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Timestamp of the newest entry.
    pub fn newest(&self) -> Option<u64> {
        self.timestamps.back().copied()
    }
}

/// Window length in milliseconds, saturating.
pub(crate) fn window_millis(window: Duration) -> u64 {
    u64::try_from(window.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    #[test]
    fn test_admits_up_to_threshold() {
        let mut log = SlidingWindowLog::new();
        for i in 0..5 {
            let outcome = log.try_admit(1_000 + i, HOUR, 5);
            assert!(outcome.admitted, "request {} should be admitted", i);
            assert_eq!(outcome.count, (i + 1) as u32);
        }

        let outcome = log.try_admit(2_000, HOUR, 5);
        assert!(!outcome.admitted);
        assert_eq!(outcome.count, 5);
        assert_eq!(outcome.oldest_ms, Some(1_000));
    }

    #[test]
    fn test_rejected_requests_are_not_recorded() {
        let mut log = SlidingWindowLog::new();
        log.try_admit(0, HOUR, 1);
        for t in 1..10 {
            assert!(!log.try_admit(t, HOUR, 1).admitted);
        }
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_window_slides() {
        let window = Duration::from_secs(10);
        let mut log = SlidingWindowLog::new();

        assert!(log.try_admit(0, window, 2).admitted);
        assert!(log.try_admit(5_000, window, 2).admitted);
        assert!(!log.try_admit(9_999, window, 2).admitted);

        // Entry at t=0 expires exactly at t=10s
        let outcome = log.try_admit(10_000, window, 2);
        assert!(outcome.admitted);
        assert_eq!(outcome.oldest_ms, Some(5_000));
    }

    #[test]
    fn test_purge_empties_after_idle_window() {
        let window = Duration::from_secs(1);
        let mut log = SlidingWindowLog::new();
        log.try_admit(100, window, 3);
        log.try_admit(200, window, 3);

        log.purge(5_000, window);
        assert!(log.is_empty());
    }

    #[test]
    fn test_entry_at_epoch_start_stays_inside_first_window() {
        let window = Duration::from_secs(10);
        let mut log = SlidingWindowLog::new();
        log.try_admit(0, window, 1);

        log.purge(9_999, window);
        assert_eq!(log.len(), 1);
        assert!(!log.try_admit(9_999, window, 1).admitted);

        log.purge(10_000, window);
        assert!(log.is_empty());
    }

    #[test]
    fn test_backwards_clock_keeps_order() {
        let mut log = SlidingWindowLog::new();
        log.try_admit(5_000, HOUR, 3);
        log.try_admit(4_000, HOUR, 3);
        assert_eq!(log.newest(), Some(5_000));
        assert_eq!(log.len(), 2);
    }
}
