//! Admission policies for rate-limited action categories.
//!
//! A policy names how many requests a single client may make within a
//! trailing window, and what happens when the shared counter store cannot
//! be reached.

use serde::Deserialize;
use std::fmt;
use std::time::Duration;

/// Error returned when a policy is constructed with invalid parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    /// `max_requests` must be greater than zero
    ZeroMaxRequests,
    /// The window must be at least one second long
    ZeroWindow,
    /// A window string such as `"1h"` could not be parsed
    InvalidWindow(String),
    /// Category names must be non-empty and must not contain `:`
    InvalidCategory(String),
}

impl fmt::Display for PolicyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyError::ZeroMaxRequests => write!(f, "max_requests must be greater than 0"),
            PolicyError::ZeroWindow => write!(f, "window must be at least one second"),
            PolicyError::InvalidWindow(raw) => write!(f, "invalid window specification: {raw:?}"),
            PolicyError::InvalidCategory(raw) => {
                write!(f, "invalid category {raw:?}: must be non-empty and contain no ':'")
            }
        }
    }
}

impl std::error::Error for PolicyError {}

/// What the limiter does when the shared store is unreachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoreFailureMode {
    /// Reject the request. The caller sees `LimiterError::StoreUnavailable`.
    #[default]
    FailClosed,
    /// Admit the request, log a warning and mark the decision as degraded.
    FailOpen,
}

/// Sliding-window policy for one action category.
///
/// # Example
/// ```
/// use relay_throttle::{StoreFailureMode, WindowPolicy};
/// use std::time::Duration;
///
/// let policy = WindowPolicy::new(5, Duration::from_secs(3600))
///     .unwrap()
///     .with_store_failure_mode(StoreFailureMode::FailOpen);
/// assert_eq!(policy.max_requests(), 5);
///
/// assert!(WindowPolicy::new(0, Duration::from_secs(60)).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowPolicy {
    max_requests: u32,
    window: Duration,
    on_store_failure: StoreFailureMode,
}

impl WindowPolicy {
    /// Create a fail-closed policy.
    ///
    /// # Errors
    /// Returns `PolicyError::ZeroMaxRequests` if `max_requests` is zero and
    /// `PolicyError::ZeroWindow` if `window` is shorter than one second.
    pub fn new(max_requests: u32, window: Duration) -> Result<Self, PolicyError> {
        if max_requests == 0 {
            return Err(PolicyError::ZeroMaxRequests);
        }
        if window.as_secs() == 0 {
            return Err(PolicyError::ZeroWindow);
        }
        Ok(Self {
            max_requests,
            window: Duration::from_secs(window.as_secs()),
            on_store_failure: StoreFailureMode::FailClosed,
        })
    }

    /// Create a policy from a window string such as `"1h"`.
    pub fn from_spec(max_requests: u32, window: &str) -> Result<Self, PolicyError> {
        Self::new(max_requests, parse_window(window)?)
    }

    /// Set the store failure mode.
    pub fn with_store_failure_mode(mut self, mode: StoreFailureMode) -> Self {
        self.on_store_failure = mode;
        self
    }

    /// Maximum admitted requests per window.
    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Length of the trailing window.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Window length in whole seconds.
    pub fn window_secs(&self) -> u64 {
        self.window.as_secs()
    }

    /// Behaviour when the shared store is unavailable.
    pub fn on_store_failure(&self) -> StoreFailureMode {
        self.on_store_failure
    }
}

/// Parse a window such as `"30s"`, `"1m"`, `"1h"` or `"1d"`.
///
/// A bare number is read as seconds.
pub fn parse_window(raw: &str) -> Result<Duration, PolicyError> {
    let trimmed = raw.trim();
    let invalid = || PolicyError::InvalidWindow(raw.to_string());

    let (digits, multiplier) = match trimmed.char_indices().last() {
        Some((idx, 's')) => (&trimmed[..idx], 1),
        Some((idx, 'm')) => (&trimmed[..idx], 60),
        Some((idx, 'h')) => (&trimmed[..idx], 3_600),
        Some((idx, 'd')) => (&trimmed[..idx], 86_400),
        Some(_) => (trimmed, 1),
        None => return Err(invalid()),
    };

    let value: u64 = digits.parse().map_err(|_| invalid())?;
    let secs = value.checked_mul(multiplier).ok_or_else(invalid)?;
    if secs == 0 {
        return Err(PolicyError::ZeroWindow);
    }
    Ok(Duration::from_secs(secs))
}

/// Check that `category` can be embedded in a counter key.
///
/// Keys have the form `prefix:category:client`. A `:` inside the category
/// would let `("a:b", "c")` and `("a", "b:c")` share a counter.
pub fn validate_category(category: &str) -> Result<(), PolicyError> {
    if category.is_empty() || category.contains(':') {
        return Err(PolicyError::InvalidCategory(category.to_string()));
    }
    Ok(())
}

/// Serialisable policy entry, for loading category tables from configuration.
///
/// ```
/// use relay_throttle::domain::policy::PolicyConfig;
///
/// let entries: Vec<PolicyConfig> = serde_json::from_str(r#"[
///     {"category": "signup", "max_requests": 5, "window": "1h"},
///     {"category": "posts", "max_requests": 100, "window": "1h", "on_store_failure": "fail-open"}
/// ]"#).unwrap();
/// assert_eq!(entries.len(), 2);
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct PolicyConfig {
    pub category: String,
    pub max_requests: u32,
    pub window: String,
    #[serde(default)]
    pub on_store_failure: StoreFailureMode,
}

impl PolicyConfig {
    /// Validate and convert into a `WindowPolicy`.
    pub fn to_policy(&self) -> Result<WindowPolicy, PolicyError> {
        validate_category(&self.category)?;
        Ok(WindowPolicy::from_spec(self.max_requests, &self.window)?
            .with_store_failure_mode(self.on_store_failure))
    }
}
