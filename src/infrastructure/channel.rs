//! Channel adapter over a bounded tokio mpsc queue.
//!
//! The network layer owns the receiving half and turns each `Frame` into a
//! socket write. `send` never waits: a full queue is reported as
//! `ChannelError::Full` and the hub drops the connection.

use crate::application::ports::{Channel, ChannelError};
use crate::domain::event::OutboundEvent;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};

/// Default outbound queue depth per connection.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// One unit of outbound traffic for the network layer.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Event(Arc<OutboundEvent>),
    Ping,
    Close,
}

impl Frame {
    /// JSON text for event frames; control frames have no text body.
    pub fn into_text(self) -> Option<String> {
        match self {
            Frame::Event(event) => Some(event.to_json()),
            Frame::Ping | Frame::Close => None,
        }
    }
}

/// Sending half handed to the hub.
#[derive(Debug, Clone)]
pub struct MpscChannel {
    tx: mpsc::Sender<Frame>,
    closed: Arc<AtomicBool>,
}

impl MpscChannel {
    /// Create a channel with the default capacity.
    pub fn new() -> (Self, mpsc::Receiver<Frame>) {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a channel buffering up to `capacity` frames (at least one).
    pub fn with_capacity(capacity: usize) -> (Self, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let channel = Self {
            tx,
            closed: Arc::new(AtomicBool::new(false)),
        };
        (channel, rx)
    }

    /// Whether `close` was called or the receiving half was dropped.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.tx.is_closed()
    }

    fn push(&self, frame: Frame) -> Result<(), ChannelError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ChannelError::Closed);
        }
        self.tx.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => ChannelError::Full,
            TrySendError::Closed(_) => ChannelError::Closed,
        })
    }
}

impl Channel for MpscChannel {
    fn send(&self, event: &Arc<OutboundEvent>) -> Result<(), ChannelError> {
        self.push(Frame::Event(Arc::clone(event)))
    }

    fn ping(&self) -> Result<(), ChannelError> {
        self.push(Frame::Ping)
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            // Best effort; a full queue is closed by dropping the sender.
            let _ = self.tx.try_send(Frame::Close);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::event::EventKind;
    use serde_json::json;

    fn event() -> Arc<OutboundEvent> {
        Arc::new(OutboundEvent::new(EventKind::NEW_MESSAGE, json!({"id": 1})))
    }

    #[test]
    fn test_frames_arrive_in_order() {
        let (channel, mut rx) = MpscChannel::new();
        channel.send(&event()).unwrap();
        channel.ping().unwrap();
        channel.close();

        assert!(matches!(rx.try_recv().unwrap(), Frame::Event(_)));
        assert_eq!(rx.try_recv().unwrap(), Frame::Ping);
        assert_eq!(rx.try_recv().unwrap(), Frame::Close);
    }

    #[test]
    fn test_full_queue_is_reported() {
        let (channel, _rx) = MpscChannel::with_capacity(1);
        channel.send(&event()).unwrap();
        assert_eq!(channel.send(&event()), Err(ChannelError::Full));
    }

    #[test]
    fn test_dropped_receiver_is_closed() {
        let (channel, rx) = MpscChannel::new();
        drop(rx);
        assert_eq!(channel.ping(), Err(ChannelError::Closed));
        assert!(channel.is_closed());
    }

    #[test]
    fn test_close_is_idempotent() {
        let (channel, mut rx) = MpscChannel::new();
        channel.close();
        channel.close();
        assert_eq!(rx.try_recv().unwrap(), Frame::Close);
        assert!(rx.try_recv().is_err());
        assert_eq!(channel.send(&event()), Err(ChannelError::Closed));
    }

    #[test]
    fn test_event_frame_text() {
        let text = Frame::Event(event()).into_text().unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["kind"], "new-message");
        assert!(Frame::Ping.into_text().is_none());
    }
}
