//! Application layer - orchestration of domain logic.
//!
//! This layer coordinates the domain logic and manages the runtime behavior:
//! - Rate limiter (admission decisions against a shared store)
//! - Circuit breaker (skipping an unavailable store)
//! - Fan-out hub (connection registry, delivery, heartbeat)
//! - Local event bus (in-process subscribers)
//!
//! ## Ports
//!
//! The application layer defines ports (traits) that infrastructure
//! adapters must implement. This keeps the application layer independent
//! from infrastructure details.

pub mod bus;
pub mod circuit_breaker;
pub mod hub;
pub mod limiter;
pub mod metrics;
pub mod ports;
