//! Envelope types for the Huddle wire protocol.
//!
//! Every WebSocket frame carries exactly one JSON object. Frames sent by the
//! server are full [`Envelope`]s; frames sent by clients are read as
//! [`Inbound`] and only their `content` survives.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// The kind of an envelope, serialized as the `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Application message submitted by a client.
    Message,
    /// A client joined the room.
    Join,
    /// A client left the room.
    Leave,
}

impl MessageKind {
    /// Wire name of this kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Message => "message",
            MessageKind::Join => "join",
            MessageKind::Leave => "leave",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message exchanged between the hub and connected clients.
///
/// An empty `room` addresses every connected client regardless of room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Envelope kind.
    #[serde(rename = "type")]
    pub kind: MessageKind,
    /// Target room, or empty for all clients.
    #[serde(default)]
    pub room: String,
    /// User the envelope originates from.
    #[serde(default)]
    pub user_id: String,
    /// Opaque payload, forwarded verbatim.
    #[serde(default)]
    pub content: Value,
}

impl Envelope {
    /// Create an application message.
    #[must_use]
    pub fn message(room: impl Into<String>, user_id: impl Into<String>, content: Value) -> Self {
        Self {
            kind: MessageKind::Message,
            room: room.into(),
            user_id: user_id.into(),
            content,
        }
    }

    /// Create a join announcement for `user_id` in `room`.
    #[must_use]
    pub fn join(room: impl Into<String>, user_id: impl Into<String>) -> Self {
        let user_id = user_id.into();
        let content = serde_json::json!({ "message": format!("{user_id} joined") });
        Self {
            kind: MessageKind::Join,
            room: room.into(),
            user_id,
            content,
        }
    }

    /// Create a leave announcement for `user_id` in `room`.
    #[must_use]
    pub fn leave(room: impl Into<String>, user_id: impl Into<String>) -> Self {
        let user_id = user_id.into();
        let content = serde_json::json!({ "message": format!("{user_id} left") });
        Self {
            kind: MessageKind::Leave,
            room: room.into(),
            user_id,
            content,
        }
    }

    /// Whether this envelope targets every connected client.
    #[must_use]
    pub fn is_broadcast(&self) -> bool {
        self.room.is_empty()
    }
}

/// A frame as submitted by a client.
///
/// Identity and room are never read from the wire; any other fields the
/// client sends are ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Inbound {
    /// Opaque payload.
    #[serde(default)]
    pub content: Value,
}

impl Inbound {
    /// Turn this submission into an application message from `user_id` in `room`.
    #[must_use]
    pub fn into_envelope(self, room: impl Into<String>, user_id: impl Into<String>) -> Envelope {
        Envelope::message(room, user_id, self.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_wire_names() {
        assert_eq!(serde_json::to_value(MessageKind::Join).unwrap(), json!("join"));
        assert_eq!(MessageKind::Leave.to_string(), "leave");
        assert_eq!(
            serde_json::from_value::<MessageKind>(json!("message")).unwrap(),
            MessageKind::Message
        );
    }

    #[test]
    fn test_envelope_field_names() {
        let env = Envelope::message("lobby", "alice", json!("hi"));
        let value = serde_json::to_value(&env).unwrap();
        assert_eq!(
            value,
            json!({ "type": "message", "room": "lobby", "user_id": "alice", "content": "hi" })
        );
    }

    #[test]
    fn test_announcements() {
        let join = Envelope::join("lobby", "bob");
        assert_eq!(join.kind, MessageKind::Join);
        assert_eq!(join.content, json!({ "message": "bob joined" }));

        let leave = Envelope::leave("lobby", "bob");
        assert_eq!(leave.kind, MessageKind::Leave);
        assert!(!leave.is_broadcast());
    }

    #[test]
    fn test_inbound_ignores_identity_fields() {
        let inbound: Inbound = serde_json::from_value(json!({
            "type": "join",
            "room": "elsewhere",
            "user_id": "mallory",
            "content": { "text": "hi" }
        }))
        .unwrap();

        let env = inbound.into_envelope("lobby", "alice");
        assert_eq!(env.kind, MessageKind::Message);
        assert_eq!(env.room, "lobby");
        assert_eq!(env.user_id, "alice");
        assert_eq!(env.content, json!({ "text": "hi" }));
    }

    #[test]
    fn test_inbound_missing_content_is_null() {
        let inbound: Inbound = serde_json::from_str("{}").unwrap();
        assert_eq!(inbound.content, Value::Null);
    }
}
