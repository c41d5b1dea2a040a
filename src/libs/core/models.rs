use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque user identifier as issued by the API server.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Returns `None` for empty or whitespace-only ids, which the server never issues.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies the active chat view. Changing either side invalidates the buffer.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ConversationKey {
    pub local: UserId,
    pub remote: UserId,
}

impl ConversationKey {
    pub fn new(local: Option<&str>, remote: Option<&str>) -> Option<Self> {
        Some(Self {
            local: UserId::parse(local?)?,
            remote: UserId::parse(remote?)?,
        })
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.local, self.remote)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Outgoing,
    Incoming,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub sender_id: UserId,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(sender_id: UserId, text: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            sender_id,
            text: text.into(),
            created_at,
        }
    }

    pub fn direction(&self, local: &UserId) -> Direction {
        if &self.sender_id == local {
            Direction::Outgoing
        } else {
            Direction::Incoming
        }
    }

    /// Render identity: sender, text and the creation time bucketed to whole seconds.
    pub fn display_key(&self) -> (&str, &str, i64) {
        (self.sender_id.as_str(), &self.text, self.created_at.timestamp())
    }

    fn matches_recent(
        &self,
        sender: &UserId,
        text: &str,
        now: DateTime<Utc>,
        window: Duration,
    ) -> bool {
        &self.sender_id == sender && self.text == text && (now - self.created_at).abs() < window
    }
}

/// Insertion-ordered messages of exactly one conversation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MessageBuffer {
    messages: Vec<Message>,
}

impl MessageBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&mut self, messages: Vec<Message>) {
        self.messages = messages;
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    pub fn as_slice(&self) -> &[Message] {
        &self.messages
    }

    /// True when an entry with the same sender and text is stamped within `window` of `now`.
    pub fn contains_recent(
        &self,
        sender: &UserId,
        text: &str,
        now: DateTime<Utc>,
        window: Duration,
    ) -> bool {
        self.messages
            .iter()
            .any(|message| message.matches_recent(sender, text, now, window))
    }
}

/// Handle for one listener registered on a socket channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId {
    pub uuid: Uuid,
}

impl ListenerId {
    pub fn new() -> Self {
        Self {
            uuid: Uuid::now_v7(),
        }
    }
}

impl Default for ListenerId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<[u8; 16]> for ListenerId {
    fn from(bytes: [u8; 16]) -> ListenerId {
        Self {
            uuid: Uuid::from_bytes(bytes),
        }
    }
}
