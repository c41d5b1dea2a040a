use crate::libs::chat::source_traits::{HistorySource, ProfileSource};
use crate::libs::config::ClientConfig;
use crate::libs::core::models::UserId;
use crate::libs::models::{
    ApiMessage, ChatHistoryResponse, ConnectionRequest, ConnectionsResponse, FeedResponse,
    HistoryRecord, LoginRequest, LoginResponse, ProfileEnvelope, RequestsResponse,
    ReviewsResponse, SignupRequest, UserProfile,
};
use crate::ClientError;
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectAction {
    Interested,
    Ignored,
}

impl ConnectAction {
    fn as_segment(self) -> &'static str {
        match self {
            ConnectAction::Interested => "interested",
            ConnectAction::Ignored => "ignored",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewAction {
    Accepted,
    Rejected,
}

impl ReviewAction {
    fn as_segment(self) -> &'static str {
        match self {
            ReviewAction::Accepted => "accepted",
            ReviewAction::Rejected => "rejected",
        }
    }
}

/// REST client. The session lives in the cookie store, so one instance per signed-in user.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: Url,
}

impl ApiClient {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let base = Url::parse(&config.api_base_url).map_err(|err| {
            ClientError::InvalidInput(format!("api_base_url '{}': {}", config.api_base_url, err))
        })?;
        if base.cannot_be_a_base() {
            return Err(ClientError::InvalidInput(format!(
                "api_base_url '{}' cannot be a base",
                config.api_base_url
            )));
        }
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self { http, base })
    }

    pub fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty();
            path.extend(segments);
        }
        url
    }

    fn request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        self.http.request(method, self.endpoint(segments))
    }

    async fn check(response: Response) -> Result<Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED {
            return Err(ClientError::Unauthorized);
        }
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiMessage>(&body)
            .ok()
            .and_then(|api| api.message)
            .filter(|message| !message.is_empty())
            .unwrap_or_else(|| {
                if body.trim().is_empty() {
                    status.canonical_reason().unwrap_or("request failed").to_string()
                } else {
                    body
                }
            });
        Err(ClientError::Api {
            status: status.as_u16(),
            message,
        })
    }

    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ClientError> {
        let response = Self::check(request.send().await?).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn submit(&self, request: RequestBuilder) -> Result<(), ClientError> {
        Self::check(request.send().await?).await?;
        Ok(())
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<UserProfile, ClientError> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(ClientError::InvalidInput("email and password are required".into()));
        }
        let request = self
            .request(Method::POST, &["auth", "login"])
            .json(&LoginRequest { email, password });
        let response: LoginResponse = self.fetch(request).await?;
        tracing::info!(user = %response.data.id, "logged in");
        Ok(response.data)
    }

    /// Creates an account. The server does not sign the new user in; returns its
    /// confirmation message.
    pub async fn signup(&self, request: &SignupRequest) -> Result<String, ClientError> {
        if let Some(field) = request.missing_field() {
            return Err(ClientError::InvalidInput(format!("{} is required", field)));
        }
        let response: ApiMessage = self
            .fetch(self.request(Method::POST, &["auth", "signup"]).json(request))
            .await?;
        tracing::info!("account created");
        Ok(response
            .message
            .unwrap_or_else(|| "User created successfully".to_string()))
    }

    pub async fn logout(&self) -> Result<(), ClientError> {
        self.submit(self.request(Method::POST, &["auth", "logout"])).await
    }

    pub async fn current_profile(&self) -> Result<UserProfile, ClientError> {
        let envelope: ProfileEnvelope = self
            .fetch(self.request(Method::GET, &["user", "profile"]))
            .await?;
        Ok(envelope.into_profile())
    }

    pub async fn profile(&self, user: &UserId) -> Result<UserProfile, ClientError> {
        let envelope: ProfileEnvelope = self
            .fetch(self.request(Method::GET, &["user", "profile", user.as_str()]))
            .await?;
        Ok(envelope.into_profile())
    }

    pub async fn chat_history(&self, remote: &UserId) -> Result<Vec<HistoryRecord>, ClientError> {
        let response: ChatHistoryResponse = self
            .fetch(self.request(Method::GET, &["chat", "all", remote.as_str()]))
            .await?;
        tracing::debug!(remote = %remote, count = response.messages.len(), "fetched chat history");
        Ok(response.messages)
    }

    pub async fn feed(&self) -> Result<Vec<UserProfile>, ClientError> {
        let response: FeedResponse = self
            .fetch(self.request(Method::GET, &["connection", "feed"]))
            .await?;
        Ok(response.feed)
    }

    pub async fn send_interest(&self, user: &UserId, action: ConnectAction) -> Result<(), ClientError> {
        let segments = ["connection", "connect", action.as_segment(), user.as_str()];
        self.submit(self.request(Method::POST, &segments)).await
    }

    pub async fn requests(&self) -> Result<Vec<ConnectionRequest>, ClientError> {
        let response: RequestsResponse = self
            .fetch(self.request(Method::GET, &["connection", "requests"]))
            .await?;
        Ok(response.requests)
    }

    pub async fn review_request(&self, request_id: &str, action: ReviewAction) -> Result<(), ClientError> {
        let segments = ["connection", "review", action.as_segment(), request_id];
        self.submit(self.request(Method::POST, &segments)).await
    }

    pub async fn connections(&self) -> Result<Vec<UserProfile>, ClientError> {
        let response: ConnectionsResponse = self
            .fetch(self.request(Method::GET, &["connection", "connections"]))
            .await?;
        Ok(response.connections)
    }

    pub async fn ignored_reviews(&self) -> Result<Vec<ConnectionRequest>, ClientError> {
        let response: ReviewsResponse = self
            .fetch(self.request(Method::GET, &["connection", "review-ignored"]))
            .await?;
        Ok(response.reviews)
    }

    pub async fn review_ignored(&self, request_id: &str, action: ReviewAction) -> Result<(), ClientError> {
        let segments = ["connection", "reviews", action.as_segment(), request_id];
        self.submit(self.request(Method::POST, &segments)).await
    }
}

#[async_trait]
impl HistorySource for ApiClient {
    async fn fetch_history(&self, remote: &UserId) -> Result<Vec<HistoryRecord>, ClientError> {
        self.chat_history(remote).await
    }
}

#[async_trait]
impl ProfileSource for ApiClient {
    async fn fetch_profile(&self, user: &UserId) -> Result<UserProfile, ClientError> {
        self.profile(user).await
    }
}
