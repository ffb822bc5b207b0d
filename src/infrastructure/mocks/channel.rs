//! Recording channel for hub tests.

use crate::application::ports::{Channel, ChannelError};
use crate::domain::event::OutboundEvent;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct Recorded {
    sent: Vec<Arc<OutboundEvent>>,
    pings: usize,
    closes: usize,
    send_error: Option<ChannelError>,
    ping_error: Option<ChannelError>,
}

/// Channel that records every call and can be told to fail.
///
/// Clones share the same record, so a test keeps one clone and hands the
/// other to the hub.
#[derive(Debug, Clone, Default)]
pub struct MockChannel {
    inner: Arc<Mutex<Recorded>>,
}

impl MockChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following `send` fail with `error`.
    pub fn fail_sends(&self, error: ChannelError) {
        self.lock().send_error = Some(error);
    }

    /// Make every following `ping` fail with `error`.
    pub fn fail_pings(&self, error: ChannelError) {
        self.lock().ping_error = Some(error);
    }

    /// Events written so far, in order.
    pub fn sent(&self) -> Vec<Arc<OutboundEvent>> {
        self.lock().sent.clone()
    }

    /// Pings received, failed or not.
    pub fn ping_count(&self) -> usize {
        self.lock().pings
    }

    /// Times `close` was called.
    pub fn close_count(&self) -> usize {
        self.lock().closes
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Recorded> {
        self.inner
            .lock()
            .expect("MockChannel mutex poisoned - a test thread panicked while holding the lock")
    }
}

impl Channel for MockChannel {
    fn send(&self, event: &Arc<OutboundEvent>) -> Result<(), ChannelError> {
        let mut recorded = self.lock();
        if let Some(error) = recorded.send_error {
            return Err(error);
        }
        recorded.sent.push(Arc::clone(event));
        Ok(())
    }

    fn ping(&self) -> Result<(), ChannelError> {
        let mut recorded = self.lock();
        if let Some(error) = recorded.ping_error {
            return Err(error);
        }
        recorded.pings += 1;
        Ok(())
    }

    fn close(&self) {
        self.lock().closes += 1;
    }
}
