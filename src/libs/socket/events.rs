use crate::libs::core::models::{ConversationKey, ListenerId};
use crate::libs::socket::codec::SocketPacket;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JOIN_CHAT: &str = "joinChat";
pub const SEND_MESSAGE: &str = "sendMessage";
pub const NEW_MESSAGE: &str = "newMessage";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinChat {
    pub to_id: String,
    pub user: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessage {
    pub to_id: String,
    pub user: String,
    pub message: String,
}

/// Live broadcast; `id` is the sender. The server attaches no timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
    pub id: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundEvent {
    JoinChat(JoinChat),
    SendMessage(SendMessage),
}

impl OutboundEvent {
    pub fn join(key: &ConversationKey) -> Self {
        OutboundEvent::JoinChat(JoinChat {
            to_id: key.remote.to_string(),
            user: key.local.to_string(),
        })
    }

    pub fn send(key: &ConversationKey, message: impl Into<String>) -> Self {
        OutboundEvent::SendMessage(SendMessage {
            to_id: key.remote.to_string(),
            user: key.local.to_string(),
            message: message.into(),
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            OutboundEvent::JoinChat(_) => JOIN_CHAT,
            OutboundEvent::SendMessage(_) => SEND_MESSAGE,
        }
    }

    pub fn to_packet(&self) -> Result<SocketPacket, serde_json::Error> {
        let data = match self {
            OutboundEvent::JoinChat(join) => serde_json::to_value(join)?,
            OutboundEvent::SendMessage(send) => serde_json::to_value(send)?,
        };
        Ok(SocketPacket::event(self.name(), data))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The server closed the namespace (`io server disconnect`).
    ServerInitiated,
    /// `SocketChannel::disconnect` was called locally.
    ClientInitiated,
    TransportClosed,
    PingTimeout,
    /// The driver gave up reconnecting; the channel stays offline until restarted.
    ReconnectExhausted,
}

impl DisconnectReason {
    pub fn invalidates_handle(self) -> bool {
        matches!(self, DisconnectReason::ServerInitiated)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectErrorKind {
    SessionInvalidated,
    Other(String),
}

impl ConnectErrorKind {
    pub fn classify(payload: &Value) -> Self {
        let message = payload
            .get("message")
            .and_then(Value::as_str)
            .or_else(|| payload.as_str())
            .unwrap_or_default();
        let lowered = message.to_ascii_lowercase();
        let invalidated = ["session id unknown", "invalid session", "unauthorized", "authentication"]
            .iter()
            .any(|needle| lowered.contains(needle));
        if invalidated {
            ConnectErrorKind::SessionInvalidated
        } else {
            ConnectErrorKind::Other(message.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Connect,
    Disconnect(DisconnectReason),
    ConnectError(ConnectErrorKind),
    NewMessage(NewMessage),
}

impl ChannelEvent {
    /// Maps an inbound application event; unknown event names yield `None`.
    pub fn from_event(name: &str, data: Value) -> Option<Result<Self, serde_json::Error>> {
        match name {
            NEW_MESSAGE => Some(serde_json::from_value(data).map(ChannelEvent::NewMessage)),
            _ => None,
        }
    }

    pub fn kind(&self) -> ListenerKind {
        match self {
            ChannelEvent::Connect => ListenerKind::Connect,
            ChannelEvent::Disconnect(_) => ListenerKind::Disconnect,
            ChannelEvent::ConnectError(_) => ListenerKind::ConnectError,
            ChannelEvent::NewMessage(_) => ListenerKind::NewMessage,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerKind {
    Connect,
    Disconnect,
    ConnectError,
    NewMessage,
}

/// Delivery of one channel event to one registered listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelNotice {
    pub listener: ListenerId,
    pub event: ChannelEvent,
}
