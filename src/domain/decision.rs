//! Admission decisions returned to the request pipeline.

use crate::domain::policy::WindowPolicy;
use crate::domain::window::{window_millis, WindowOutcome};

/// Result of `RateLimiter::check_and_record`.
///
/// The decision is a plain value so callers can branch on it cheaply; a
/// rejection is an expected outcome, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionDecision {
    /// Whether the request may proceed
    pub admitted: bool,
    /// Threshold of the policy that produced this decision
    pub limit: u32,
    /// Requests the client may still make in the current window
    pub remaining: u32,
    /// When the window frees its next slot, in epoch seconds
    pub reset_at_epoch_secs: u64,
    /// True when the store was unavailable and the category fails open
    pub degraded: bool,
}

impl AdmissionDecision {
    /// Build a decision from a store outcome.
    pub fn from_outcome(policy: &WindowPolicy, outcome: &WindowOutcome) -> Self {
        let window_ms = window_millis(policy.window());
        let reset_ms = outcome
            .oldest_ms
            .unwrap_or(outcome.now_ms)
            .saturating_add(window_ms);

        Self {
            admitted: outcome.admitted,
            limit: policy.max_requests(),
            remaining: policy.max_requests().saturating_sub(outcome.count),
            reset_at_epoch_secs: reset_ms.div_ceil(1_000),
            degraded: false,
        }
    }

    /// Admission produced without consulting the store.
    pub fn fail_open(policy: &WindowPolicy, now_epoch_secs: u64) -> Self {
        Self {
            admitted: true,
            limit: policy.max_requests(),
            remaining: policy.max_requests().saturating_sub(1),
            reset_at_epoch_secs: now_epoch_secs.saturating_add(policy.window_secs()),
            degraded: true,
        }
    }

    /// Whole seconds until the client should retry.
    ///
    /// At least one second for a rejected request, zero for an admitted one.
    pub fn retry_after_secs(&self, now_epoch_secs: u64) -> u64 {
        if self.admitted {
            return 0;
        }
        self.reset_at_epoch_secs.saturating_sub(now_epoch_secs).max(1)
    }

    /// `X-RateLimit-*` response headers.
    pub fn rate_limit_headers(&self) -> [(&'static str, String); 3] {
        [
            ("X-RateLimit-Limit", self.limit.to_string()),
            ("X-RateLimit-Remaining", self.remaining.to_string()),
            ("X-RateLimit-Reset", self.reset_at_epoch_secs.to_string()),
        ]
    }

    /// Body for a 429 response.
    pub fn rejection_message(&self, now_epoch_secs: u64) -> String {
        format!(
            "Rate limit exceeded. Try again in {} seconds",
            self.retry_after_secs(now_epoch_secs)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn policy() -> WindowPolicy {
        WindowPolicy::new(5, Duration::from_secs(3600)).unwrap()
    }

    #[test]
    fn test_reset_follows_oldest_entry() {
        let outcome = WindowOutcome {
            admitted: false,
            count: 5,
            oldest_ms: Some(10_000),
            now_ms: 20_000,
        };
        let decision = AdmissionDecision::from_outcome(&policy(), &outcome);
        assert!(!decision.admitted);
        assert_eq!(decision.remaining, 0);
        assert_eq!(decision.reset_at_epoch_secs, 3_610);
        assert_eq!(decision.retry_after_secs(20), 3_590);
    }

    #[test]
    fn test_remaining_counts_down() {
        let outcome = WindowOutcome {
            admitted: true,
            count: 2,
            oldest_ms: Some(1_000),
            now_ms: 2_000,
        };
        let decision = AdmissionDecision::from_outcome(&policy(), &outcome);
        assert!(decision.admitted);
        assert_eq!(decision.remaining, 3);
        assert_eq!(decision.retry_after_secs(2), 0);
    }

    #[test]
    fn test_headers_and_message() {
        let decision = AdmissionDecision {
            admitted: false,
            limit: 100,
            remaining: 0,
            reset_at_epoch_secs: 1_060,
            degraded: false,
        };
        let headers = decision.rate_limit_headers();
        assert_eq!(headers[0], ("X-RateLimit-Limit", "100".to_string()));
        assert_eq!(headers[1], ("X-RateLimit-Remaining", "0".to_string()));
        assert_eq!(headers[2], ("X-RateLimit-Reset", "1060".to_string()));
        assert_eq!(
            decision.rejection_message(1_000),
            "Rate limit exceeded. Try again in 60 seconds"
        );
    }

    #[test]
    fn test_retry_after_is_at_least_one_second() {
        let decision = AdmissionDecision {
            admitted: false,
            limit: 1,
            remaining: 0,
            reset_at_epoch_secs: 500,
            degraded: false,
        };
        assert_eq!(decision.retry_after_secs(900), 1);
    }

    #[test]
    fn test_fail_open_is_marked_degraded() {
        let decision = AdmissionDecision::fail_open(&policy(), 1_000);
        assert!(decision.admitted);
        assert!(decision.degraded);
        assert_eq!(decision.reset_at_epoch_secs, 4_600);
    }
}
