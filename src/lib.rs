pub mod libs;

use crate::libs::config::ConfigError;
use crate::libs::socket::channel::ChannelError;

pub use crate::libs::api::ApiClient;
pub use crate::libs::chat::reconciler::MessageReconciler;
pub use crate::libs::chat::session::{ChatSession, SessionUpdate};
pub use crate::libs::config::ClientConfig;
pub use crate::libs::core::models::{ConversationKey, Message, UserId};
pub use crate::libs::socket::manager::ConnectionManager;
pub use crate::libs::state::AppState;

uniffi::setup_scaffolding!();

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server responded {status}: {message}")]
    Api { status: u16, message: String },
    #[error("session is not authenticated")]
    Unauthorized,
    #[error("could not decode response: {0}")]
    Decode(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Decode(err.to_string())
    }
}

impl ClientError {
    /// Whether the failure means the server no longer recognises the session cookie.
    pub fn is_unauthorized(&self) -> bool {
        match self {
            ClientError::Unauthorized => true,
            ClientError::Api { status, .. } => *status == 401,
            _ => false,
        }
    }
}
