// Wire shapes returned by the REST API.

use crate::libs::core::models::{Message, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SenderSummary {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

/// History endpoints populate the sender, live records carry the bare id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SenderRef {
    Nested(SenderSummary),
    Plain(String),
}

impl SenderRef {
    pub fn id(&self) -> &str {
        match self {
            SenderRef::Nested(summary) => &summary.id,
            SenderRef::Plain(id) => id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    pub sender_id: SenderRef,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl HistoryRecord {
    /// Records without a usable sender id are unrenderable and map to `None`.
    pub fn into_message(self) -> Option<Message> {
        let sender_id = UserId::parse(self.sender_id.id())?;
        Some(Message::new(sender_id, self.text, self.created_at))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatHistoryResponse {
    #[serde(default)]
    pub messages: Vec<HistoryRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub about: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub skills: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UserProfile {
    pub fn user_id(&self) -> Option<UserId> {
        UserId::parse(&self.id)
    }

    pub fn display_name(&self) -> String {
        match self.last_name.as_deref() {
            Some(last) if !last.trim().is_empty() => format!("{} {}", self.first_name, last),
            _ => self.first_name.clone(),
        }
    }
}

/// `GET /user/profile` answers either `{ user: {...} }` or the bare profile.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ProfileEnvelope {
    Wrapped { user: UserProfile },
    Bare(UserProfile),
}

impl ProfileEnvelope {
    pub fn into_profile(self) -> UserProfile {
        match self {
            ProfileEnvelope::Wrapped { user } => user,
            ProfileEnvelope::Bare(profile) => profile,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
}

impl SignupRequest {
    pub fn missing_field(&self) -> Option<&'static str> {
        [
            ("firstName", &self.first_name),
            ("email", &self.email),
            ("password", &self.password),
        ]
        .into_iter()
        .find(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub data: UserProfile,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedResponse {
    #[serde(default)]
    pub feed: Vec<UserProfile>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectionsResponse {
    #[serde(default, alias = "data")]
    pub connections: Vec<UserProfile>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRequest {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub from_user_id: Option<UserProfile>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestsResponse {
    #[serde(default)]
    pub requests: Vec<ConnectionRequest>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReviewsResponse {
    #[serde(default)]
    pub reviews: Vec<ConnectionRequest>,
}

/// Error body the API sends alongside non-2xx statuses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiMessage {
    #[serde(default)]
    pub message: Option<String>,
}
