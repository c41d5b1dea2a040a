use crate::libs::core::models::UserId;
use crate::libs::models::{HistoryRecord, UserProfile};
use crate::ClientError;
use async_trait::async_trait;

/// Persisted, server-ordered message history of one conversation.
#[async_trait]
pub trait HistorySource: Send + Sync {
    async fn fetch_history(&self, remote: &UserId) -> Result<Vec<HistoryRecord>, ClientError>;
}

#[async_trait]
pub trait ProfileSource: Send + Sync {
    async fn fetch_profile(&self, user: &UserId) -> Result<UserProfile, ClientError>;
}

pub trait ChatBackend: HistorySource + ProfileSource {}

impl<T: HistorySource + ProfileSource> ChatBackend for T {}
