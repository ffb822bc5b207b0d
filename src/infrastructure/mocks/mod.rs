//! Mock implementations for testing.
//!
//! This module provides test doubles for infrastructure adapters,
//! enabling controlled testing of application logic.

pub mod channel;
pub mod clock;
pub mod layer;
pub mod store;

pub use channel::MockChannel;
pub use clock::MockClock;
pub use layer::{CapturedEvent, MockCaptureLayer};
pub use store::UnavailableStore;
