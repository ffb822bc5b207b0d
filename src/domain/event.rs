//! Realtime event payloads.
//!
//! Outbound events travel from the server to connected clients as
//! `{"kind": ..., "data": ...}`. Inbound frames are the small set of
//! messages clients send over the same socket: `typing`, `read` and
//! `send_message`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;
use std::fmt;

/// Kind tag of an outbound event.
///
/// The set is open: the hub never interprets kinds beyond routing local
/// subscriptions, so applications may use any string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventKind(Cow<'static, str>);

impl EventKind {
    pub const NEW_MESSAGE: EventKind = EventKind(Cow::Borrowed("new-message"));
    pub const TYPING_INDICATOR: EventKind = EventKind(Cow::Borrowed("typing-indicator"));
    pub const READ_RECEIPT: EventKind = EventKind(Cow::Borrowed("read-receipt"));
    pub const NEW_NOTIFICATION: EventKind = EventKind(Cow::Borrowed("new-notification"));
    /// Published locally when a client submits a message over its socket.
    /// The subscriber persists it and delivers `NEW_MESSAGE` to both sides.
    pub const MESSAGE_SUBMITTED: EventKind = EventKind(Cow::Borrowed("message-submitted"));

    /// Create a kind from any string.
    pub fn new(kind: impl Into<String>) -> Self {
        EventKind(Cow::Owned(kind.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EventKind {
    fn from(kind: &str) -> Self {
        EventKind::new(kind)
    }
}

/// Event pushed to connected clients. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundEvent {
    pub kind: EventKind,
    pub data: Value,
}

impl OutboundEvent {
    pub fn new(kind: impl Into<EventKind>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }

    /// Serialise to the JSON text sent over a socket.
    pub fn to_json(&self) -> String {
        // Serialising a `Value` with string keys cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Frame a client sends over its realtime connection.
///
/// The peer field is `recipientId`; `receiverId` is accepted as well.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InboundMessage {
    /// The sender is typing in a conversation with `recipient_id`.
    Typing {
        #[serde(rename = "recipientId", alias = "receiverId")]
        recipient_id: String,
        #[serde(rename = "conversationId")]
        conversation_id: String,
    },
    /// The sender has read a conversation.
    Read {
        #[serde(rename = "conversationId")]
        conversation_id: String,
    },
    /// The sender submits a chat message for `recipient_id`.
    #[serde(rename = "send_message")]
    SendMessage {
        #[serde(rename = "recipientId", alias = "receiverId")]
        recipient_id: String,
        #[serde(rename = "conversationId")]
        conversation_id: String,
        content: String,
    },
}

impl InboundMessage {
    /// Parse a JSON text frame.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_outbound_wire_shape() {
        let event = OutboundEvent::new(EventKind::NEW_MESSAGE, json!({"id": "m1"}));
        let wire: Value = serde_json::from_str(&event.to_json()).unwrap();
        assert_eq!(wire, json!({"kind": "new-message", "data": {"id": "m1"}}));
    }

    #[test]
    fn test_custom_kind_equals_constant() {
        assert_eq!(EventKind::from("read-receipt"), EventKind::READ_RECEIPT);
        assert_eq!(EventKind::new("story-posted").as_str(), "story-posted");
    }

    #[test]
    fn test_parse_typing_frame() {
        let msg = InboundMessage::parse(
            r#"{"type":"typing","recipientId":"u2","conversationId":"c9"}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            InboundMessage::Typing {
                recipient_id: "u2".to_string(),
                conversation_id: "c9".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_typing_frame_with_receiver_id() {
        let msg = InboundMessage::parse(
            r#"{"type":"typing","receiverId":"u2","conversationId":"c9"}"#,
        )
        .unwrap();
        assert!(matches!(
            msg,
            InboundMessage::Typing { ref recipient_id, .. } if recipient_id == "u2"
        ));
    }

    #[test]
    fn test_parse_send_message_frame() {
        let msg = InboundMessage::parse(
            r#"{"type":"send_message","receiverId":"u2","conversationId":"c9","content":"hi"}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            InboundMessage::SendMessage {
                recipient_id: "u2".to_string(),
                conversation_id: "c9".to_string(),
                content: "hi".to_string(),
            }
        );
        assert!(InboundMessage::parse(r#"{"type":"send_message","receiverId":"u2"}"#).is_err());
    }

    #[test]
    fn test_parse_read_frame() {
        let msg = InboundMessage::parse(r#"{"type":"read","conversationId":"c9"}"#).unwrap();
        assert!(matches!(msg, InboundMessage::Read { .. }));
    }

    #[test]
    fn test_parse_rejects_unknown_type() {
        assert!(InboundMessage::parse(r#"{"type":"wave"}"#).is_err());
        assert!(InboundMessage::parse("not json").is_err());
    }
}
