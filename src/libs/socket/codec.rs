// Engine.IO v4 / Socket.IO v5 text framing as spoken by the chat server.
// https://socket.io/docs/v4/engine-io-protocol/
// https://socket.io/docs/v4/socket-io-protocol/

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("empty frame")]
    Empty,
    #[error("unknown packet type '{0}'")]
    UnknownPacketType(char),
    #[error("malformed payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("event payload has no string name")]
    MissingEventName,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    pub ping_interval: u64,
    pub ping_timeout: u64,
    #[serde(default)]
    pub max_payload: Option<u64>,
}

/// Engine.IO level packet.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Open(Handshake),
    Close,
    Ping,
    Pong,
    Noop,
    Message(SocketPacket),
}

/// Socket.IO packet carried inside an Engine.IO message on the default namespace.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect(Option<Value>),
    Disconnect,
    Event { name: String, data: Value },
    ConnectError(Value),
}

impl SocketPacket {
    pub fn event(name: impl Into<String>, data: Value) -> Self {
        SocketPacket::Event {
            name: name.into(),
            data,
        }
    }
}

pub fn encode(packet: &Packet) -> String {
    match packet {
        Packet::Open(handshake) => {
            let body = json!({
                "sid": handshake.sid,
                "upgrades": handshake.upgrades,
                "pingInterval": handshake.ping_interval,
                "pingTimeout": handshake.ping_timeout,
                "maxPayload": handshake.max_payload,
            });
            format!("0{}", body)
        }
        Packet::Close => "1".to_string(),
        Packet::Ping => "2".to_string(),
        Packet::Pong => "3".to_string(),
        Packet::Noop => "6".to_string(),
        Packet::Message(socket_packet) => format!("4{}", encode_socket(socket_packet)),
    }
}

fn encode_socket(packet: &SocketPacket) -> String {
    match packet {
        SocketPacket::Connect(None) => "0".to_string(),
        SocketPacket::Connect(Some(auth)) => format!("0{}", auth),
        SocketPacket::Disconnect => "1".to_string(),
        SocketPacket::Event { name, data } => format!("2{}", json!([name, data])),
        SocketPacket::ConnectError(data) => format!("4{}", data),
    }
}

pub fn decode(frame: &str) -> Result<Packet, CodecError> {
    let mut chars = frame.chars();
    let kind = chars.next().ok_or(CodecError::Empty)?;
    let rest = chars.as_str();
    match kind {
        '0' => Ok(Packet::Open(serde_json::from_str(rest)?)),
        '1' => Ok(Packet::Close),
        '2' => Ok(Packet::Ping),
        '3' => Ok(Packet::Pong),
        '4' => Ok(Packet::Message(decode_socket(rest)?)),
        '6' => Ok(Packet::Noop),
        other => Err(CodecError::UnknownPacketType(other)),
    }
}

fn decode_socket(payload: &str) -> Result<SocketPacket, CodecError> {
    let mut chars = payload.chars();
    let kind = chars.next().ok_or(CodecError::Empty)?;
    let body = strip_namespace(chars.as_str());
    match kind {
        '0' => {
            if body.is_empty() {
                Ok(SocketPacket::Connect(None))
            } else {
                Ok(SocketPacket::Connect(Some(serde_json::from_str(body)?)))
            }
        }
        '1' => Ok(SocketPacket::Disconnect),
        '2' => {
            // an ack id may precede the array
            let body = body.trim_start_matches(|c: char| c.is_ascii_digit());
            let items: Vec<Value> = serde_json::from_str(body)?;
            let mut items = items.into_iter();
            let name = match items.next() {
                Some(Value::String(name)) => name,
                _ => return Err(CodecError::MissingEventName),
            };
            Ok(SocketPacket::Event {
                name,
                data: items.next().unwrap_or(Value::Null),
            })
        }
        '4' => {
            if body.is_empty() {
                Ok(SocketPacket::ConnectError(Value::Null))
            } else {
                Ok(SocketPacket::ConnectError(serde_json::from_str(body)?))
            }
        }
        other => Err(CodecError::UnknownPacketType(other)),
    }
}

fn strip_namespace(body: &str) -> &str {
    if body.starts_with('/') {
        match body.find(',') {
            Some(index) => &body[index + 1..],
            None => "",
        }
    } else {
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_open_handshake() {
        let frame = r#"0{"sid":"abc","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#;
        match decode(frame).unwrap() {
            Packet::Open(handshake) => {
                assert_eq!(handshake.sid, "abc");
                assert_eq!(handshake.ping_interval, 25000);
                assert_eq!(handshake.ping_timeout, 20000);
            }
            other => panic!("unexpected packet {:?}", other),
        }
    }

    #[test]
    fn test_encode_event() {
        let packet = Packet::Message(SocketPacket::event(
            "joinChat",
            json!({ "toId": "r1", "user": "u1" }),
        ));
        assert_eq!(encode(&packet), r#"42["joinChat",{"toId":"r1","user":"u1"}]"#);
    }

    #[test]
    fn test_decode_event_with_namespace_and_ack() {
        let packet = decode(r#"42/chat,17["newMessage",{"id":"u1","message":"hi"}]"#).unwrap();
        assert_eq!(
            packet,
            Packet::Message(SocketPacket::event(
                "newMessage",
                json!({ "id": "u1", "message": "hi" })
            ))
        );
    }

    #[test]
    fn test_decode_connect_and_errors() {
        assert_eq!(
            decode(r#"40{"sid":"xyz"}"#).unwrap(),
            Packet::Message(SocketPacket::Connect(Some(json!({ "sid": "xyz" }))))
        );
        assert_eq!(decode("41").unwrap(), Packet::Message(SocketPacket::Disconnect));
        assert_eq!(
            decode(r#"44{"message":"Session ID unknown"}"#).unwrap(),
            Packet::Message(SocketPacket::ConnectError(
                json!({ "message": "Session ID unknown" })
            ))
        );
        assert_eq!(decode("2").unwrap(), Packet::Ping);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(decode(""), Err(CodecError::Empty)));
        assert!(matches!(decode("9"), Err(CodecError::UnknownPacketType('9'))));
        assert!(matches!(decode("42[1,2]"), Err(CodecError::MissingEventName)));
        assert!(matches!(decode("42[oops"), Err(CodecError::Json(_))));
    }
}
