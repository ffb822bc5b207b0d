//! Request admission.
//!
//! The rate limiter maps a category and a client identity to a counter key
//! in the shared store, asks the store for an atomic sliding-window check and
//! turns the outcome into an `AdmissionDecision`. Store outages go through a
//! circuit breaker and are resolved by each category's `StoreFailureMode`.

use crate::application::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::application::metrics::LimiterMetrics;
use crate::application::ports::{Clock, StoreError, WindowStore};
use crate::domain::decision::AdmissionDecision;
use crate::domain::policy::{
    validate_category, PolicyConfig, PolicyError, StoreFailureMode, WindowPolicy,
};
use crate::infrastructure::clock::SystemClock;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Default time allowed for one store round trip.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(2);

/// Default prefix of counter keys.
pub const DEFAULT_KEY_PREFIX: &str = "ratelimit";

/// Error returned by `RateLimiter::check_and_record`.
///
/// A full window is not an error; it is an `AdmissionDecision` with
/// `admitted == false`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LimiterError {
    /// No policy has been configured for the category
    UnknownCategory(String),
    /// The store is unreachable and the category fails closed
    StoreUnavailable { category: String, source: StoreError },
}

impl fmt::Display for LimiterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimiterError::UnknownCategory(category) => {
                write!(f, "no rate limit policy configured for category {:?}", category)
            }
            LimiterError::StoreUnavailable { category, source } => {
                write!(f, "cannot admit {:?} request: {}", category, source)
            }
        }
    }
}

impl std::error::Error for LimiterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LimiterError::StoreUnavailable { source, .. } => Some(source),
            LimiterError::UnknownCategory(_) => None,
        }
    }
}

/// Error returned when building a `RateLimiter`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// The store timeout must be greater than zero
    ZeroStoreTimeout,
    /// The key prefix must not be empty
    EmptyKeyPrefix,
    /// A configured policy was invalid
    Policy { category: String, source: PolicyError },
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::ZeroStoreTimeout => write!(f, "store timeout must be greater than 0"),
            BuildError::EmptyKeyPrefix => write!(f, "key prefix must not be empty"),
            BuildError::Policy { category, source } => {
                write!(f, "invalid policy for category {:?}: {}", category, source)
            }
        }
    }
}

impl std::error::Error for BuildError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BuildError::Policy { source, .. } => Some(source),
            BuildError::ZeroStoreTimeout | BuildError::EmptyKeyPrefix => None,
        }
    }
}

/// Sliding-window rate limiter over a shared `WindowStore`.
///
/// Cheap to clone; clones share policies, metrics and the circuit breaker.
pub struct RateLimiter<S: WindowStore> {
    store: Arc<S>,
    policies: Arc<DashMap<String, WindowPolicy, ahash::RandomState>>,
    key_prefix: Arc<str>,
    store_timeout: Duration,
    circuit_breaker: Arc<CircuitBreaker>,
    clock: Arc<dyn Clock>,
    metrics: LimiterMetrics,
}

impl<S: WindowStore> Clone for RateLimiter<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            policies: Arc::clone(&self.policies),
            key_prefix: Arc::clone(&self.key_prefix),
            store_timeout: self.store_timeout,
            circuit_breaker: Arc::clone(&self.circuit_breaker),
            clock: Arc::clone(&self.clock),
            metrics: self.metrics.clone(),
        }
    }
}

impl<S: WindowStore> fmt::Debug for RateLimiter<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("store", &self.store)
            .field("key_prefix", &self.key_prefix)
            .field("store_timeout", &self.store_timeout)
            .field("categories", &self.policies.len())
            .finish_non_exhaustive()
    }
}

impl<S: WindowStore> RateLimiter<S> {
    /// Register or replace the policy for `category`.
    ///
    /// A new category fails closed. Replacing an existing category keeps its
    /// store failure mode; use `configure_policy` to change it.
    ///
    /// # Errors
    /// Returns `PolicyError` if `max_requests` or `window_secs` is zero, or
    /// if `category` is empty or contains `:`.
    pub fn configure(
        &self,
        category: &str,
        max_requests: u32,
        window_secs: u64,
    ) -> Result<(), PolicyError> {
        let mut policy = WindowPolicy::new(max_requests, Duration::from_secs(window_secs))?;
        if let Some(mode) = self.policy(category).map(|existing| existing.on_store_failure()) {
            policy = policy.with_store_failure_mode(mode);
        }
        self.configure_policy(category, policy)
    }

    /// Register or replace a fully specified policy.
    ///
    /// # Errors
    /// Returns `PolicyError::InvalidCategory` if `category` is empty or
    /// contains `:`.
    pub fn configure_policy(
        &self,
        category: &str,
        policy: WindowPolicy,
    ) -> Result<(), PolicyError> {
        validate_category(category)?;
        tracing::debug!(
            category,
            max_requests = policy.max_requests(),
            window_secs = policy.window_secs(),
            on_store_failure = ?policy.on_store_failure(),
            "configured rate limit policy"
        );
        self.policies.insert(category.to_string(), policy);
        Ok(())
    }

    /// Policy currently registered for `category`.
    pub fn policy(&self, category: &str) -> Option<WindowPolicy> {
        self.policies.get(category).map(|entry| *entry.value())
    }

    /// Decide whether a request from `client` in `category` may proceed.
    ///
    /// Admitted requests are recorded against the window; rejected ones are
    /// not. Stale entries are purged on every call.
    ///
    /// # Errors
    /// - `LimiterError::UnknownCategory` if no policy is configured.
    /// - `LimiterError::StoreUnavailable` if the store cannot answer and the
    ///   category fails closed. Fail-open categories get an admitted,
    ///   `degraded` decision instead.
    pub async fn check_and_record(
        &self,
        category: &str,
        client: &str,
    ) -> Result<AdmissionDecision, LimiterError> {
        let policy = self
            .policy(category)
            .ok_or_else(|| LimiterError::UnknownCategory(category.to_string()))?;

        if !self.circuit_breaker.permits_call() {
            let error = StoreError::Unavailable("circuit open".to_string());
            return self.resolve_store_failure(category, client, &policy, error);
        }

        let key = self.key(category, client);
        let call = self
            .store
            .check_and_record(&key, policy.window(), policy.max_requests());
        let result = match tokio::time::timeout(self.store_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.store_timeout)),
        };

        match result {
            Ok(outcome) => {
                self.circuit_breaker.record_success();
                let decision = AdmissionDecision::from_outcome(&policy, &outcome);
                if decision.admitted {
                    self.metrics.record_admitted();
                } else {
                    self.metrics.record_rejected();
                    tracing::debug!(
                        category,
                        client,
                        reset_at = decision.reset_at_epoch_secs,
                        "request rejected by rate limit"
                    );
                }
                Ok(decision)
            }
            Err(error) => {
                self.circuit_breaker.record_failure();
                self.metrics.record_store_failure();
                self.resolve_store_failure(category, client, &policy, error)
            }
        }
    }

    fn resolve_store_failure(
        &self,
        category: &str,
        client: &str,
        policy: &WindowPolicy,
        error: StoreError,
    ) -> Result<AdmissionDecision, LimiterError> {
        match policy.on_store_failure() {
            StoreFailureMode::FailOpen => {
                tracing::warn!(
                    category,
                    client,
                    error = %error,
                    "rate limit store unavailable, admitting request"
                );
                self.metrics.record_failed_open();
                self.metrics.record_admitted();
                Ok(AdmissionDecision::fail_open(policy, self.clock.now_secs()))
            }
            StoreFailureMode::FailClosed => {
                tracing::warn!(
                    category,
                    client,
                    error = %error,
                    "rate limit store unavailable, rejecting request"
                );
                self.metrics.record_failed_closed();
                Err(LimiterError::StoreUnavailable {
                    category: category.to_string(),
                    source: error,
                })
            }
        }
    }

    fn key(&self, category: &str, client: &str) -> String {
        format!("{}:{}:{}", self.key_prefix, category, client)
    }

    /// Admission counters shared by every clone of this limiter.
    pub fn metrics(&self) -> &LimiterMetrics {
        &self.metrics
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.circuit_breaker
    }

    /// The backing counter store.
    pub fn store(&self) -> &S {
        &self.store
    }
}

/// Builder for `RateLimiter`.
pub struct RateLimiterBuilder {
    policies: Vec<(String, WindowPolicy)>,
    invalid: Option<BuildError>,
    key_prefix: String,
    store_timeout: Duration,
    breaker: CircuitBreakerConfig,
    clock: Option<Arc<dyn Clock>>,
}

impl RateLimiterBuilder {
    /// Builder with no policies, prefix `"ratelimit"`, a 2 s store timeout
    /// and the default circuit breaker.
    pub fn new() -> Self {
        Self {
            policies: Vec::new(),
            invalid: None,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            store_timeout: DEFAULT_STORE_TIMEOUT,
            breaker: CircuitBreakerConfig::default(),
            clock: None,
        }
    }

    /// Register a policy for `category`.
    pub fn with_policy(mut self, category: impl Into<String>, policy: WindowPolicy) -> Self {
        self.policies.push((category.into(), policy));
        self
    }

    /// Register policies loaded from configuration.
    ///
    /// Invalid entries are reported by `build`.
    pub fn with_policy_configs(mut self, entries: &[PolicyConfig]) -> Self {
        for entry in entries {
            match entry.to_policy() {
                Ok(policy) => self.policies.push((entry.category.clone(), policy)),
                Err(source) => {
                    self.invalid.get_or_insert(BuildError::Policy {
                        category: entry.category.clone(),
                        source,
                    });
                }
            }
        }
        self
    }

    /// Prefix of every counter key (default `"ratelimit"`).
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Time allowed for one store round trip (default 2s).
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// Circuit breaker guarding the store.
    pub fn with_circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.breaker = config;
        self
    }

    /// Clock used to stamp fail-open decisions (default: system clock).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Build the limiter over `store`.
    ///
    /// # Errors
    /// Returns `BuildError` if the configuration is invalid.
    pub fn build<S: WindowStore>(self, store: S) -> Result<RateLimiter<S>, BuildError> {
        if let Some(error) = self.invalid {
            return Err(error);
        }
        if self.store_timeout.is_zero() {
            return Err(BuildError::ZeroStoreTimeout);
        }
        if self.key_prefix.is_empty() {
            return Err(BuildError::EmptyKeyPrefix);
        }

        let policies = DashMap::with_hasher(ahash::RandomState::new());
        for (category, policy) in self.policies {
            if let Err(source) = validate_category(&category) {
                return Err(BuildError::Policy { category, source });
            }
            policies.insert(category, policy);
        }

        Ok(RateLimiter {
            store: Arc::new(store),
            policies: Arc::new(policies),
            key_prefix: Arc::from(self.key_prefix),
            store_timeout: self.store_timeout,
            circuit_breaker: Arc::new(CircuitBreaker::with_config(self.breaker)),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock::new())),
            metrics: LimiterMetrics::new(),
        })
    }
}

impl Default for RateLimiterBuilder {
    fn default() -> Self {
        Self::new()
    }
}
