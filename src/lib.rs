//! # relay-throttle
//!
//! Request admission control and realtime event fan-out for a social web
//! backend.
//!
//! The crate has two halves that share nothing but their ambient stack:
//!
//! - A **sliding-log rate limiter** that decides, per action category and
//!   client identity, whether a request may proceed. Counters live in a
//!   shared store so every server process enforces the same limits.
//! - A **fan-out hub** that tracks which users hold live connections and
//!   pushes events (new message, typing indicator, notification) to all of a
//!   user's connections, or to everyone.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use relay_throttle::{MemoryWindowStore, RateLimiterBuilder, SystemClock, WindowPolicy};
//! use std::sync::Arc;
//!
//! # async fn run() {
//! let limiter = RateLimiterBuilder::new()
//!     .with_policy("signup", WindowPolicy::from_spec(5, "1h").unwrap())
//!     .with_policy("posts", WindowPolicy::from_spec(30, "1m").unwrap())
//!     .build(MemoryWindowStore::new(Arc::new(SystemClock::new())))
//!     .unwrap();
//!
//! match limiter.check_and_record("signup", "203.0.113.7").await {
//!     Ok(decision) if decision.admitted => {
//!         for (name, value) in decision.rate_limit_headers() {
//!             println!("{}: {}", name, value);
//!         }
//!     }
//!     Ok(decision) => println!("{}", decision.rejection_message(0)),
//!     Err(e) => println!("refused: {}", e),
//! }
//! # }
//! ```
//!
//! ## Admission Semantics
//!
//! For each `(category, client)` key the store keeps the timestamps of
//! admitted requests. A check drops entries older than the window, counts
//! the rest and records a new entry only if the count is below the limit.
//! Rejected requests are not recorded, so a client hammering a full window
//! does not push its own reset further out.
//!
//! Purge, count and insert are one atomic step inside the store. With `N`
//! concurrent checks against a key holding `max - 1` entries, exactly one is
//! admitted.
//!
//! ## Store Failures
//!
//! Every category chooses what happens when the store cannot answer:
//!
//! - [`StoreFailureMode::FailClosed`] (default): the check returns
//!   [`LimiterError::StoreUnavailable`] and the caller refuses the request.
//! - [`StoreFailureMode::FailOpen`]: the request is admitted, the decision is
//!   marked `degraded` and a warning is logged.
//!
//! A [`CircuitBreaker`] stops calling a failing store for a recovery period.
//!
//! ## Fan-Out
//!
//! ```rust,no_run
//! use relay_throttle::{EventKind, FanOutHub, MpscChannel, OutboundEvent, UserId};
//! use serde_json::json;
//!
//! # async fn run() {
//! let hub: FanOutHub<MpscChannel> = FanOutHub::new();
//! let heartbeat = hub.start_heartbeat();
//!
//! let (channel, mut frames) = MpscChannel::new();
//! let id = hub.on_connect(UserId::from("alice"), channel);
//!
//! hub.send_to_user(
//!     &UserId::from("alice"),
//!     OutboundEvent::new(EventKind::NEW_MESSAGE, json!({ "conversationId": "c1" })),
//! );
//! let frame = frames.recv().await;
//!
//! hub.on_disconnect(id);
//! heartbeat.shutdown().await.unwrap();
//! # }
//! ```
//!
//! Once `on_disconnect` returns, no delivery reaches that connection. A
//! failed write closes only the failing connection. Connections that miss a
//! heartbeat are removed within two heartbeat intervals.
//!
//! The registry is process-local. Multi-process deployments need a
//! cluster-aware delivery layer in front of it.
//!
//! ## Observability
//!
//! All components log through `tracing`. Counters are exposed by
//! [`RateLimiter::metrics`] and [`FanOutHub::metrics`]:
//!
//! ```rust,no_run
//! # use relay_throttle::{MemoryWindowStore, RateLimiterBuilder, SystemClock};
//! # use std::sync::Arc;
//! # let limiter = RateLimiterBuilder::new()
//! #     .build(MemoryWindowStore::new(Arc::new(SystemClock::new())))
//! #     .unwrap();
//! let snapshot = limiter.metrics().snapshot();
//! println!(
//!     "admitted={} rejected={} failed_open={} rejection_rate={:.1}%",
//!     snapshot.admitted,
//!     snapshot.rejected,
//!     snapshot.failed_open,
//!     snapshot.rejection_rate() * 100.0
//! );
//! ```
//!
//! ## Feature Flags
//!
//! - `redis-store`: [`RedisWindowStore`], a shared store on Redis
//! - `test-helpers`: mocks under `infrastructure::mocks`

// Domain layer - pure business logic
pub mod domain;

// Application layer - orchestration
pub mod application;

// Infrastructure layer - external adapters
pub mod infrastructure;

// Re-export commonly used types for convenience
pub use domain::{
    backoff::ReconnectBackoff,
    connection::{ConnectionId, ConnectionState, UserId},
    decision::AdmissionDecision,
    event::{EventKind, InboundMessage, OutboundEvent},
    policy::{
        parse_window, validate_category, PolicyConfig, PolicyError, StoreFailureMode,
        WindowPolicy,
    },
    window::{SlidingWindowLog, WindowOutcome},
};

pub use application::{
    bus::{EventBus, Subscription},
    circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState},
    hub::{DisconnectReason, FanOutHub, HeartbeatHandle, HeartbeatReport, HubConfig},
    limiter::{BuildError, LimiterError, RateLimiter, RateLimiterBuilder},
    metrics::{HubMetrics, LimiterMetrics, LimiterSnapshot},
    ports::{Channel, ChannelError, Clock, StoreError, WindowStore},
};

pub use infrastructure::{
    channel::{Frame, MpscChannel},
    clock::SystemClock,
    memory_store::MemoryWindowStore,
};

#[cfg(feature = "redis-store")]
pub use infrastructure::redis_store::{RedisWindowStore, RedisWindowStoreConfig};
