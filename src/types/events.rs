// src/types/events.rs
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::error::SyncError;

/// User id of the other party in a one-to-one conversation.
pub type PeerId = String;

/// Peer -> unread message count. A missing peer counts as zero.
pub type UnreadCounts = HashMap<PeerId, u32>;

/// Peer -> "is typing right now".
pub type TypingUsers = HashMap<PeerId, bool>;

pub const UPDATE_UNREAD_COUNT: &str = "update-unread-count";
pub const USER_TYPING: &str = "user-typing";
pub const JOIN_USER: &str = "join-user";
pub const MESSAGES_READ: &str = "messages-read";
pub const TYPING: &str = "typing";
pub const STOP_TYPING: &str = "stop-typing";

// ===== Inbound (channel -> core) =====

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadUpdate {
    #[serde(default)]
    pub sender_id: Option<String>,
    /// Server-side authority: `false` forces the counter back to zero.
    #[serde(default, deserialize_with = "truthy")]
    pub increment: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingUpdate {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default, deserialize_with = "truthy")]
    pub is_typing: bool,
}

/// Read a flag the way the backend's clients do: null, `0`, `""` and
/// `false` are off, anything else is on.
fn truthy<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => false,
        Value::Bool(flag) => flag,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    UnreadUpdate(UnreadUpdate),
    UserTyping(TypingUpdate),
}

impl InboundEvent {
    /// Build an inbound event from a decoded `[name, payload]` frame.
    ///
    /// Returns `Ok(None)` for events this core does not subscribe to.
    pub fn from_parts(name: &str, payload: Value) -> Result<Option<Self>, SyncError> {
        let event = match name {
            UPDATE_UNREAD_COUNT => Self::UnreadUpdate(
                serde_json::from_value(payload)
                    .map_err(|e| SyncError::Protocol(format!("{}: {}", name, e)))?,
            ),
            USER_TYPING => Self::UserTyping(
                serde_json::from_value(payload)
                    .map_err(|e| SyncError::Protocol(format!("{}: {}", name, e)))?,
            ),
            _ => return Ok(None),
        };
        Ok(Some(event))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::UnreadUpdate(_) => UPDATE_UNREAD_COUNT,
            Self::UserTyping(_) => USER_TYPING,
        }
    }
}

// ===== Outbound (core -> channel) =====

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundEvent {
    JoinUser { user_id: PeerId },
    MessagesRead { user_id: PeerId },
    Typing { recipient_id: PeerId, sender_id: PeerId },
    StopTyping { recipient_id: PeerId },
}

impl OutboundEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::JoinUser { .. } => JOIN_USER,
            Self::MessagesRead { .. } => MESSAGES_READ,
            Self::Typing { .. } => TYPING,
            Self::StopTyping { .. } => STOP_TYPING,
        }
    }

    pub fn payload(&self) -> Value {
        match self {
            // The backend reads the room key as a bare string.
            Self::JoinUser { user_id } => Value::String(user_id.clone()),
            Self::MessagesRead { user_id } => json!({ "userId": user_id }),
            Self::Typing {
                recipient_id,
                sender_id,
            } => json!({ "recipientId": recipient_id, "senderId": sender_id }),
            Self::StopTyping { recipient_id } => json!({ "recipientId": recipient_id }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unread_update_defaults_missing_increment_to_false() {
        let event = InboundEvent::from_parts(UPDATE_UNREAD_COUNT, json!({ "senderId": "u1" }))
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            InboundEvent::UnreadUpdate(UnreadUpdate {
                sender_id: Some("u1".to_string()),
                increment: false,
            })
        );
    }

    #[test]
    fn test_unread_update_reads_loose_increment_flags() {
        let increment_of = |value: Value| {
            match InboundEvent::from_parts(
                UPDATE_UNREAD_COUNT,
                json!({ "senderId": "u1", "increment": value }),
            )
            .unwrap()
            .unwrap()
            {
                InboundEvent::UnreadUpdate(update) => update.increment,
                other => panic!("unexpected event {:?}", other),
            }
        };

        assert!(!increment_of(Value::Null));
        assert!(!increment_of(json!(0)));
        assert!(!increment_of(json!("")));
        assert!(increment_of(json!(1)));
        assert!(increment_of(json!("yes")));
        assert!(increment_of(json!(true)));
    }

    #[test]
    fn test_typing_update_uses_camel_case() {
        let event = InboundEvent::from_parts(
            USER_TYPING,
            json!({ "userId": "u7", "isTyping": true }),
        )
        .unwrap()
        .unwrap();
        match event {
            InboundEvent::UserTyping(update) => {
                assert_eq!(update.user_id.as_deref(), Some("u7"));
                assert!(update.is_typing);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_unknown_event_is_skipped() {
        assert!(InboundEvent::from_parts("new-message", json!({}))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_malformed_payload_is_protocol_error() {
        let err = InboundEvent::from_parts(USER_TYPING, json!("u7")).unwrap_err();
        assert!(matches!(err, SyncError::Protocol(_)));
    }

    #[test]
    fn test_outbound_payload_shapes() {
        let join = OutboundEvent::JoinUser {
            user_id: "u1".to_string(),
        };
        assert_eq!(join.payload(), json!("u1"));

        let typing = OutboundEvent::Typing {
            recipient_id: "u2".to_string(),
            sender_id: "me".to_string(),
        };
        assert_eq!(typing.name(), "typing");
        assert_eq!(
            typing.payload(),
            json!({ "recipientId": "u2", "senderId": "me" })
        );

        let stop = OutboundEvent::StopTyping {
            recipient_id: "u2".to_string(),
        };
        assert_eq!(stop.payload(), json!({ "recipientId": "u2" }));
    }
}
