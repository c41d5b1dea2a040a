pub mod models;

use crate::libs::api::ApiClient;
use crate::libs::chat::session::{ChatSession, SessionInputs};
use crate::libs::config::ClientConfig;
use crate::libs::logging;
use crate::libs::models::SignupRequest;
use crate::libs::socket::channel::EmitOutcome;
use crate::libs::state::{actions, AppState};
use models::{FfiError, MessageView, UpdateKind};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Runtime;

/// Handle owned by the native front-end. Calls block the calling thread, so they must not
/// be made from inside an async runtime.
#[derive(uniffi::Object)]
pub struct ChatClient {
    runtime: Runtime,
    api: Arc<ApiClient>,
    state: Mutex<AppState>,
    session: Mutex<ChatSession<ApiClient>>,
    /// Awaited by `poll_update` while `session` stays free for the other calls.
    inputs: tokio::sync::Mutex<SessionInputs>,
}

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[uniffi::export]
impl ChatClient {
    #[uniffi::constructor]
    pub fn new(config_path: Option<String>) -> Result<Arc<Self>, FfiError> {
        let config = ClientConfig::load(config_path.as_deref().map(Path::new))
            .map_err(|err| FfiError::Config(err.to_string()))?;
        logging::init(&config.log_level, config.log_json)
            .map_err(|err| FfiError::Config(err.to_string()))?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("devmatch-chat")
            .build()
            .map_err(|err| FfiError::Runtime(err.to_string()))?;
        let api = Arc::new(ApiClient::new(&config)?);
        let mut session = ChatSession::from_config(api.clone(), &config, runtime.handle().clone());
        let inputs = session
            .take_inputs()
            .ok_or_else(|| FfiError::Runtime("session inputs already taken".to_string()))?;

        Ok(Arc::new(Self {
            runtime,
            api,
            state: Mutex::new(AppState::new()),
            session: Mutex::new(session),
            inputs: tokio::sync::Mutex::new(inputs),
        }))
    }

    /// Signs in and returns the user id to pass as `local` to `open`.
    pub fn login(&self, email: String, password: String) -> Result<String, FfiError> {
        let mut state = guard(&self.state);
        let profile = self
            .runtime
            .block_on(actions::login(&mut state, self.api.as_ref(), &email, &password))?;
        Ok(profile.id)
    }

    /// Returns the server's confirmation; the user still has to log in.
    pub fn signup(
        &self,
        first_name: String,
        last_name: String,
        email: String,
        password: String,
        password_confirmation: String,
    ) -> Result<String, FfiError> {
        let request = SignupRequest {
            first_name,
            last_name,
            email,
            password,
        };
        let mut state = guard(&self.state);
        Ok(self.runtime.block_on(actions::signup(
            &mut state,
            self.api.as_ref(),
            &request,
            &password_confirmation,
        ))?)
    }

    /// Resumes a cookie session. `None` when the server no longer accepts it.
    pub fn restore_session(&self) -> Result<Option<String>, FfiError> {
        let mut state = guard(&self.state);
        let profile = self
            .runtime
            .block_on(actions::restore_session(&mut state, self.api.as_ref()))?;
        Ok(profile.map(|profile| profile.id))
    }

    pub fn logout(&self) -> Result<(), FfiError> {
        self.close();
        let mut state = guard(&self.state);
        self.runtime
            .block_on(actions::logout(&mut state, self.api.as_ref()))?;
        Ok(())
    }

    /// Returns false when either id is missing.
    pub fn open(&self, local: Option<String>, remote: Option<String>) -> bool {
        guard(&self.session)
            .open(local.as_deref(), remote.as_deref())
            .is_some()
    }

    pub fn close(&self) -> bool {
        guard(&self.session).close()
    }

    /// True when the message was written to the socket or queued for the next connect.
    pub fn send(&self, text: String) -> bool {
        matches!(
            guard(&self.session).send(&text),
            Some(EmitOutcome::Sent | EmitOutcome::Buffered)
        )
    }

    /// Waits up to `timeout_ms` for the next update; `None` on timeout. The session lock is
    /// only taken to apply each input, so other calls proceed while this one waits.
    pub fn poll_update(&self, timeout_ms: u64) -> Option<UpdateKind> {
        self.runtime
            .block_on(async {
                let mut inputs = self.inputs.lock().await;
                let pump = async {
                    loop {
                        let input = inputs.recv().await?;
                        let update = guard(&self.session).apply(input);
                        if update.is_some() {
                            return update;
                        }
                    }
                };
                tokio::time::timeout(Duration::from_millis(timeout_ms), pump).await
            })
            .ok()
            .flatten()
            .map(UpdateKind::from)
    }

    pub fn messages(&self) -> Vec<MessageView> {
        guard(&self.session)
            .views()
            .into_iter()
            .map(MessageView::from)
            .collect()
    }

    pub fn peer_name(&self) -> Option<String> {
        guard(&self.session).peer_name().map(str::to_string)
    }
}

impl Drop for ChatClient {
    fn drop(&mut self) {
        guard(&self.session).shutdown();
    }
}
