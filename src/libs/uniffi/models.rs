// Records and enums handed to the native front-end

use crate::libs::chat::session::{MessageView as SessionView, SessionUpdate};
use crate::libs::core::models::Direction;
use crate::libs::socket::channel::ChannelState;
use crate::ClientError;

#[derive(Clone, Eq, PartialEq, uniffi::Record, Debug)]
pub struct MessageView {
    pub sender_id: String,
    pub text: String,
    pub created_at_ms: i64,
    pub is_outgoing: bool,
    pub time_label: String,
}

impl From<SessionView> for MessageView {
    fn from(view: SessionView) -> Self {
        Self {
            sender_id: view.sender_id,
            text: view.text,
            created_at_ms: view.created_at.timestamp_millis(),
            is_outgoing: view.direction == Direction::Outgoing,
            time_label: view.time_label,
        }
    }
}

#[derive(Clone, Eq, PartialEq, uniffi::Enum, Debug)]
pub enum UpdateKind {
    HistoryLoaded { history: u32, kept_live: u32 },
    HistoryFailed { message: String },
    PeerName { name: String },
    MessageAppended,
    DuplicateDropped,
    Joined,
    ConnectionChanged { connected: bool, offline: bool },
    Stale,
}

fn count(value: usize) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

impl From<SessionUpdate> for UpdateKind {
    fn from(update: SessionUpdate) -> Self {
        match update {
            SessionUpdate::HistoryLoaded { history, kept_live } => UpdateKind::HistoryLoaded {
                history: count(history),
                kept_live: count(kept_live),
            },
            SessionUpdate::HistoryFailed(message) => UpdateKind::HistoryFailed { message },
            SessionUpdate::PeerName(name) => UpdateKind::PeerName { name },
            SessionUpdate::MessageAppended => UpdateKind::MessageAppended,
            SessionUpdate::DuplicateDropped => UpdateKind::DuplicateDropped,
            SessionUpdate::Joined => UpdateKind::Joined,
            SessionUpdate::ConnectionChanged { state, offline } => UpdateKind::ConnectionChanged {
                connected: state == ChannelState::Connected,
                offline,
            },
            SessionUpdate::Stale => UpdateKind::Stale,
        }
    }
}

#[derive(Debug, thiserror::Error, uniffi::Error)]
#[uniffi(flat_error)]
pub enum FfiError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("runtime error: {0}")]
    Runtime(String),
    #[error("request failed: {0}")]
    Request(String),
    #[error("session is not authenticated")]
    Unauthorized,
}

impl From<ClientError> for FfiError {
    fn from(err: ClientError) -> Self {
        match err {
            err if err.is_unauthorized() => FfiError::Unauthorized,
            ClientError::Config(err) => FfiError::Config(err.to_string()),
            err => FfiError::Request(err.to_string()),
        }
    }
}
