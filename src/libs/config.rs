use figment::providers::{Env, Format, Json, Serialized};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:7777";
pub const ENV_PREFIX: &str = "DEVMATCH_";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the REST API; every endpoint path is joined onto it.
    pub api_base_url: String,
    /// Socket server base URL. Falls back to `api_base_url`.
    pub socket_url: Option<String>,
    pub reconnect_attempts: u32,
    pub reconnect_delay_ms: u64,
    pub session_retry_delay_ms: u64,
    pub dedupe_window_ms: u64,
    /// Messages held while the socket is down. 0 disables buffering.
    pub max_buffered_emits: usize,
    pub request_timeout_secs: u64,
    pub log_level: String,
    pub log_json: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            socket_url: None,
            reconnect_attempts: 5,
            reconnect_delay_ms: 1000,
            session_retry_delay_ms: 2000,
            dedupe_window_ms: 1000,
            max_buffered_emits: 64,
            request_timeout_secs: 15,
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}

impl ClientConfig {
    /// Defaults, then the optional JSON file, then `DEVMATCH_*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(ClientConfig::default()));
        if let Some(path) = path {
            if path.exists() {
                figment = figment.merge(Json::file(path));
            } else {
                tracing::info!("config file not found at {:?}, using defaults", path);
            }
        }
        let config: ClientConfig = figment
            .merge(Env::prefixed(ENV_PREFIX))
            .extract()
            .map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("api_base_url must not be empty".to_string()));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be positive".to_string(),
            ));
        }
        if i64::try_from(self.dedupe_window_ms).is_err() {
            return Err(ConfigError::Invalid(format!(
                "dedupe_window_ms must not exceed {}",
                i64::MAX
            )));
        }
        Ok(())
    }

    /// Saturates at the largest representable span.
    pub fn dedupe_window(&self) -> chrono::Duration {
        i64::try_from(self.dedupe_window_ms)
            .ok()
            .and_then(chrono::Duration::try_milliseconds)
            .unwrap_or(chrono::Duration::MAX)
    }

    pub fn socket_url(&self) -> String {
        self.socket_url
            .clone()
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| self.api_base_url.clone())
    }
}
