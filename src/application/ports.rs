//! Ports (interfaces) for the application layer.
//!
//! In hexagonal architecture, ports define the interfaces that the application
//! layer needs. Infrastructure adapters implement these ports.

use crate::domain::event::OutboundEvent;
use crate::domain::window::WindowOutcome;
use std::fmt::{self, Debug};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Port for obtaining wall-clock time.
///
/// Infrastructure provides concrete implementations (SystemClock, MockClock).
pub trait Clock: Send + Sync + Debug {
    /// Milliseconds since the Unix epoch.
    fn now_millis(&self) -> u64;

    /// Seconds since the Unix epoch.
    fn now_secs(&self) -> u64 {
        self.now_millis() / 1_000
    }
}

/// Error raised by a window store that could not complete a check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store could not be reached or returned an error
    Unavailable(String),
    /// The store did not answer within the configured timeout
    Timeout(Duration),
    /// The store answered with something we could not interpret
    Protocol(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Unavailable(reason) => write!(f, "store unavailable: {}", reason),
            StoreError::Timeout(after) => write!(f, "store timed out after {:?}", after),
            StoreError::Protocol(reason) => write!(f, "unexpected store reply: {}", reason),
        }
    }
}

impl std::error::Error for StoreError {}

/// Port for the shared sliding-window counter store.
///
/// Implementations must perform purge, count, conditional insert and expiry
/// refresh as one atomic step per key, and must timestamp entries with the
/// store's own clock so that every process sharing the store agrees on time.
pub trait WindowStore: Send + Sync + Debug {
    /// Admit or reject one request against `key`.
    ///
    /// # Arguments
    /// * `key` - Fully qualified counter key
    /// * `window` - Length of the trailing window
    /// * `max_requests` - Admission threshold
    fn check_and_record(
        &self,
        key: &str,
        window: Duration,
        max_requests: u32,
    ) -> impl Future<Output = Result<WindowOutcome, StoreError>> + Send;
}

/// Error returned by a channel write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelError {
    /// The peer is gone
    Closed,
    /// The outbound buffer is full
    Full,
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelError::Closed => write!(f, "channel closed"),
            ChannelError::Full => write!(f, "channel buffer full"),
        }
    }
}

impl std::error::Error for ChannelError {}

/// Port for one bidirectional client channel supplied by the network layer.
///
/// Every method must return without waiting on the peer: the hub calls them
/// while iterating over many channels and a slow peer must not stall others.
pub trait Channel: Send + Sync + 'static {
    /// Queue an event for the peer.
    fn send(&self, event: &Arc<OutboundEvent>) -> Result<(), ChannelError>;

    /// Queue a liveness ping. The network layer reports the answer through
    /// `FanOutHub::on_pong`.
    fn ping(&self) -> Result<(), ChannelError>;

    /// Close the channel. Must be safe to call more than once.
    fn close(&self);
}
