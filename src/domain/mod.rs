//! Domain layer - pure logic with no I/O.
//!
//! This layer contains the core concepts of admission control and fan-out:
//! - Window policies and admission decisions
//! - The sliding-log counting algorithm
//! - Event payloads and connection lifecycle
//! - Client reconnect backoff
//!
//! All types in this layer are pure and easily testable.

pub mod backoff;
pub mod connection;
pub mod decision;
pub mod event;
pub mod policy;
pub mod window;
