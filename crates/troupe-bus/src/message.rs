//! Message envelope exchanged over the bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::types::AgentId;

/// Free-form message body
pub type Payload = Map<String, Value>;

/// A message sent between bus participants
///
/// Immutable once built. An absent recipient means broadcast to every
/// mailbox except the sender's.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message identifier
    pub id: Uuid,
    /// Who sent it; need not own a mailbox
    pub sender_id: AgentId,
    /// Target mailbox, `None` for broadcast
    pub recipient_id: Option<AgentId>,
    /// Message body
    #[serde(default)]
    pub payload: Payload,
    /// Optional correlation ID for request/reply patterns
    pub correlation_id: Option<String>,
    /// When the message was created
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Point-to-point message
    pub fn direct(sender: AgentId, recipient: AgentId, payload: Payload) -> Self {
        Self::build(sender, Some(recipient), payload)
    }

    /// Broadcast message (every mailbox but the sender's)
    pub fn broadcast(sender: AgentId, payload: Payload) -> Self {
        Self::build(sender, None, payload)
    }

    /// Message with an explicit optional recipient
    pub fn new(sender: AgentId, recipient: Option<AgentId>, payload: Payload) -> Self {
        Self::build(sender, recipient, payload)
    }

    fn build(sender: AgentId, recipient: Option<AgentId>, payload: Payload) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender_id: sender,
            recipient_id: recipient,
            payload,
            correlation_id: None,
            created_at: Utc::now(),
        }
    }

    /// Set correlation ID for request/reply pattern
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Build a reply addressed back to this message's sender
    ///
    /// The correlation ID is carried over unchanged.
    pub fn reply_to(&self, from: AgentId, payload: Payload) -> Self {
        Self {
            correlation_id: self.correlation_id.clone(),
            ..Self::direct(from, self.sender_id.clone(), payload)
        }
    }

    /// Whether the message fans out to all mailboxes
    pub fn is_broadcast(&self) -> bool {
        self.recipient_id.is_none()
    }

    /// Payload field as a string slice
    pub fn text(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }
}

/// Build a [`Payload`] from a `serde_json::json!` object literal
///
/// Non-object values produce an empty payload.
pub fn payload(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        _ => Payload::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn id(s: &str) -> AgentId {
        AgentId::parse(s).unwrap()
    }

    #[test]
    fn test_reply_swaps_route_and_keeps_correlation() {
        let request = Message::direct(id("client"), id("agent"), payload(json!({"content": "ping"})))
            .with_correlation_id("c-1");

        let reply = request.reply_to(id("agent"), payload(json!({"echo": "pong"})));

        assert_eq!(reply.sender_id, id("agent"));
        assert_eq!(reply.recipient_id, Some(id("client")));
        assert_eq!(reply.correlation_id.as_deref(), Some("c-1"));
        assert_ne!(reply.id, request.id);
    }

    #[test]
    fn test_broadcast_has_no_recipient() {
        let msg = Message::broadcast(id("a"), Payload::new());
        assert!(msg.is_broadcast());
        assert!(!Message::direct(id("a"), id("b"), Payload::new()).is_broadcast());
    }

    #[test]
    fn test_text_accessor() {
        let msg = Message::direct(
            id("a"),
            id("b"),
            payload(json!({"content": "hi", "n": 3})),
        );
        assert_eq!(msg.text("content"), Some("hi"));
        assert_eq!(msg.text("n"), None);
        assert_eq!(msg.text("missing"), None);
    }

    #[test]
    fn test_payload_from_non_object_is_empty() {
        assert!(payload(json!("scalar")).is_empty());
    }
}
