// src/messaging/codec.rs
//! Text framing for the real-time channel: Engine.IO v4 packets carrying
//! Socket.IO v5 packets on the default namespace.

use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use crate::error::SyncError;
use crate::types::events::OutboundEvent;

/// Query the socket endpoint expects for a websocket-only session.
pub const ENGINE_QUERY: [(&str, &str); 2] = [("EIO", "4"), ("transport", "websocket")];

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub sid: String,
    #[serde(default)]
    pub ping_interval: u64,
    #[serde(default)]
    pub ping_timeout: u64,
}

impl Handshake {
    /// Longest gap between server frames before the link counts as dead.
    /// The server pings every `ping_interval`, so nothing for
    /// `ping_interval + ping_timeout` means it is gone. `None` when the
    /// server advertised no heartbeat.
    pub fn silence_limit(&self) -> Option<Duration> {
        match self.ping_interval.saturating_add(self.ping_timeout) {
            0 => None,
            total => Some(Duration::from_millis(total)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Open(Handshake),
    Close,
    Ping,
    Pong,
    Connect(Option<Value>),
    Disconnect,
    Event { name: String, payload: Value },
    ConnectError(Value),
    /// Acks, binary placeholders and engine noops; nothing to act on.
    Ignored,
}

pub fn decode(frame: &str) -> Result<Packet, SyncError> {
    let mut chars = frame.chars();
    let engine = chars
        .next()
        .ok_or_else(|| SyncError::Protocol("empty frame".to_string()))?;
    let rest = chars.as_str();

    match engine {
        '0' => serde_json::from_str(rest)
            .map(Packet::Open)
            .map_err(|e| SyncError::Protocol(format!("bad handshake: {}", e))),
        '1' => Ok(Packet::Close),
        '2' => Ok(Packet::Ping),
        '3' => Ok(Packet::Pong),
        '4' => decode_socket(rest),
        '5' | '6' => Ok(Packet::Ignored),
        other => Err(SyncError::Protocol(format!(
            "unknown engine packet type '{}'",
            other
        ))),
    }
}

fn decode_socket(body: &str) -> Result<Packet, SyncError> {
    let mut chars = body.chars();
    let kind = chars
        .next()
        .ok_or_else(|| SyncError::Protocol("empty message packet".to_string()))?;
    let data = strip_ack_id(strip_namespace(chars.as_str()));

    match kind {
        '0' => Ok(Packet::Connect(parse_optional(data)?)),
        '1' => Ok(Packet::Disconnect),
        '2' => decode_event(data),
        '4' => Ok(Packet::ConnectError(parse_optional(data)?.unwrap_or(Value::Null))),
        '3' | '5' | '6' => Ok(Packet::Ignored),
        other => Err(SyncError::Protocol(format!(
            "unknown socket packet type '{}'",
            other
        ))),
    }
}

fn strip_namespace(data: &str) -> &str {
    if data.starts_with('/') {
        data.split_once(',').map(|(_, rest)| rest).unwrap_or("")
    } else {
        data
    }
}

fn strip_ack_id(data: &str) -> &str {
    data.trim_start_matches(|c: char| c.is_ascii_digit())
}

fn parse_optional(data: &str) -> Result<Option<Value>, SyncError> {
    if data.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(data)
        .map(Some)
        .map_err(|e| SyncError::Protocol(format!("bad packet data: {}", e)))
}

fn decode_event(data: &str) -> Result<Packet, SyncError> {
    let value: Value = serde_json::from_str(data)
        .map_err(|e| SyncError::Protocol(format!("bad event body: {}", e)))?;
    let Value::Array(mut items) = value else {
        return Err(SyncError::Protocol("event body is not an array".to_string()));
    };
    if items.is_empty() {
        return Err(SyncError::Protocol("event without a name".to_string()));
    }

    let name = match items.remove(0) {
        Value::String(name) => name,
        other => {
            return Err(SyncError::Protocol(format!(
                "event name is not a string: {}",
                other
            )))
        }
    };
    let payload = if items.is_empty() {
        Value::Null
    } else {
        items.remove(0)
    };

    Ok(Packet::Event { name, payload })
}

pub fn encode(packet: &Packet) -> String {
    match packet {
        Packet::Open(handshake) => format!(
            "0{}",
            json!({
                "sid": handshake.sid,
                "pingInterval": handshake.ping_interval,
                "pingTimeout": handshake.ping_timeout,
            })
        ),
        Packet::Close => "1".to_string(),
        Packet::Ping => "2".to_string(),
        Packet::Pong => "3".to_string(),
        Packet::Connect(None) => "40".to_string(),
        Packet::Connect(Some(auth)) => format!("40{}", auth),
        Packet::Disconnect => "41".to_string(),
        Packet::Event { name, payload } => format!("42{}", json!([name, payload])),
        Packet::ConnectError(data) => format!("44{}", data),
        Packet::Ignored => "6".to_string(),
    }
}

/// CONNECT packet carrying the bearer credential in its auth payload.
pub fn connect_with_token(token: &str) -> String {
    encode(&Packet::Connect(Some(json!({ "token": token }))))
}

pub fn encode_event(event: &OutboundEvent) -> String {
    encode(&Packet::Event {
        name: event.name().to_string(),
        payload: event.payload(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silence_limit_from_heartbeat() {
        let mut handshake = Handshake {
            sid: "abc".to_string(),
            ping_interval: 25000,
            ping_timeout: 20000,
        };
        assert_eq!(handshake.silence_limit(), Some(Duration::from_millis(45000)));

        handshake.ping_interval = 0;
        handshake.ping_timeout = 0;
        assert_eq!(handshake.silence_limit(), None);
    }

    #[test]
    fn test_decode_handshake() {
        let packet = decode(r#"0{"sid":"abc","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#).unwrap();
        assert_eq!(
            packet,
            Packet::Open(Handshake {
                sid: "abc".to_string(),
                ping_interval: 25000,
                ping_timeout: 20000,
            })
        );
    }

    #[test]
    fn test_decode_event() {
        let packet = decode(r#"42["update-unread-count",{"senderId":"u1","increment":true}]"#).unwrap();
        assert_eq!(
            packet,
            Packet::Event {
                name: "update-unread-count".to_string(),
                payload: json!({ "senderId": "u1", "increment": true }),
            }
        );
    }

    #[test]
    fn test_decode_event_with_namespace_and_ack_id() {
        let packet = decode(r#"42/chat,17["user-typing",{"userId":"u2","isTyping":false}]"#).unwrap();
        match packet {
            Packet::Event { name, payload } => {
                assert_eq!(name, "user-typing");
                assert_eq!(payload["userId"], "u2");
            }
            other => panic!("unexpected packet {:?}", other),
        }
    }

    #[test]
    fn test_decode_event_without_payload() {
        assert_eq!(
            decode(r#"42["ping-me"]"#).unwrap(),
            Packet::Event {
                name: "ping-me".to_string(),
                payload: Value::Null,
            }
        );
    }

    #[test]
    fn test_decode_control_packets() {
        assert_eq!(decode("2").unwrap(), Packet::Ping);
        assert_eq!(decode("40").unwrap(), Packet::Connect(None));
        assert_eq!(
            decode(r#"40{"sid":"s1"}"#).unwrap(),
            Packet::Connect(Some(json!({ "sid": "s1" })))
        );
        assert_eq!(decode("41").unwrap(), Packet::Disconnect);
        assert_eq!(
            decode(r#"44{"message":"invalid token"}"#).unwrap(),
            Packet::ConnectError(json!({ "message": "invalid token" }))
        );
        assert_eq!(decode("43[]").unwrap(), Packet::Ignored);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode("").is_err());
        assert!(decode("9").is_err());
        assert!(decode(r#"42{"not":"array"}"#).is_err());
        assert!(decode("42[]").is_err());
        assert!(decode("42[5,{}]").is_err());
    }

    #[test]
    fn test_encode_outbound() {
        let join = OutboundEvent::JoinUser {
            user_id: "u1".to_string(),
        };
        assert_eq!(encode_event(&join), r#"42["join-user","u1"]"#);

        let read = OutboundEvent::MessagesRead {
            user_id: "u9".to_string(),
        };
        assert_eq!(encode_event(&read), r#"42["messages-read",{"userId":"u9"}]"#);

        assert_eq!(connect_with_token("t0k"), r#"40{"token":"t0k"}"#);
        assert_eq!(encode(&Packet::Pong), "3");
    }
}
