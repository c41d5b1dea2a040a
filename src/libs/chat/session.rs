use crate::libs::chat::reconciler::{
    Clock, FetchTicket, HistoryOutcome, MessageReconciler, ReconcileOutcome, SystemClock,
};
use crate::libs::chat::source_traits::ChatBackend;
use crate::libs::config::ClientConfig;
use crate::libs::core::models::{ConversationKey, Direction, Message};
use crate::libs::models::{HistoryRecord, UserProfile};
use crate::libs::socket::channel::{ChannelState, EmitOutcome, NoticeSink};
use crate::libs::socket::events::ChannelNotice;
use crate::libs::socket::manager::ConnectionManager;
use crate::libs::utils::time::format_time_label;
use crate::ClientError;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionUpdate {
    HistoryLoaded { history: usize, kept_live: usize },
    /// Transient notice; live messages keep flowing.
    HistoryFailed(String),
    PeerName(String),
    MessageAppended,
    DuplicateDropped,
    Joined,
    ConnectionChanged { state: ChannelState, offline: bool },
    /// A fetch finished for a conversation that is no longer open.
    Stale,
}

/// One rendered row of the chat view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageView {
    pub sender_id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub direction: Direction,
    pub time_label: String,
}

impl MessageView {
    fn from_message(message: &Message, key: &ConversationKey) -> Self {
        Self {
            sender_id: message.sender_id.to_string(),
            text: message.text.clone(),
            created_at: message.created_at,
            direction: message.direction(&key.local),
            time_label: format_time_label(message.created_at),
        }
    }
}

enum Completion {
    History(FetchTicket, Result<Vec<HistoryRecord>, ClientError>),
    Peer(FetchTicket, Result<UserProfile, ClientError>),
}

enum Input {
    Notice(ChannelNotice),
    Completion(Completion),
}

/// One channel notice or fetch completion, waiting for `ChatSession::apply`.
pub struct SessionInput(Input);

/// Receiving half of a session. Owned apart from the session so a caller can wait for
/// input without holding whatever guards the session state.
pub struct SessionInputs {
    notices: UnboundedReceiver<ChannelNotice>,
    completions: UnboundedReceiver<Completion>,
}

impl SessionInputs {
    /// Resolves with the next notice or completion in arrival order. `None` once the
    /// session that feeds it is gone.
    pub async fn recv(&mut self) -> Option<SessionInput> {
        tokio::select! {
            Some(notice) = self.notices.recv() => Some(SessionInput(Input::Notice(notice))),
            Some(completion) = self.completions.recv() => {
                Some(SessionInput(Input::Completion(completion)))
            }
            else => None,
        }
    }
}

/// Event loop of the chat screen: channel notices and fetch completions are applied to the
/// reconciler one at a time, in arrival order.
pub struct ChatSession<B: ChatBackend + 'static, C: Clock = SystemClock> {
    backend: Arc<B>,
    connections: ConnectionManager,
    reconciler: MessageReconciler<C>,
    runtime: Handle,
    notice_sink: NoticeSink,
    completion_sink: UnboundedSender<Completion>,
    inputs: Option<SessionInputs>,
    peer_name: Option<String>,
}

impl<B: ChatBackend + 'static> ChatSession<B, SystemClock> {
    pub fn from_config(backend: Arc<B>, config: &ClientConfig, runtime: Handle) -> Self {
        let connections = ConnectionManager::from_config(config, runtime.clone());
        let reconciler = MessageReconciler::with_clock(SystemClock, config.dedupe_window());
        Self::new(backend, connections, reconciler, runtime)
    }
}

impl<B: ChatBackend + 'static, C: Clock> ChatSession<B, C> {
    pub fn new(
        backend: Arc<B>,
        connections: ConnectionManager,
        reconciler: MessageReconciler<C>,
        runtime: Handle,
    ) -> Self {
        let (notice_sink, notices) = mpsc::unbounded_channel();
        let (completion_sink, completions) = mpsc::unbounded_channel();
        Self {
            backend,
            connections,
            reconciler,
            runtime,
            notice_sink,
            completion_sink,
            inputs: Some(SessionInputs {
                notices,
                completions,
            }),
            peer_name: None,
        }
    }

    /// Opens the conversation between `local` and `remote`. Returns `None` without side
    /// effects when either id is missing.
    pub fn open(&mut self, local: Option<&str>, remote: Option<&str>) -> Option<FetchTicket> {
        let key = ConversationKey::new(local, remote)?;
        let channel = self.connections.channel();
        let ticket = self.reconciler.open(key, channel, &self.notice_sink);
        self.peer_name = None;
        tracing::info!(conversation = %ticket.key, "opening conversation");

        let backend = self.backend.clone();
        let sink = self.completion_sink.clone();
        let history_ticket = ticket.clone();
        self.runtime.spawn(async move {
            let result = backend.fetch_history(&history_ticket.key.remote).await;
            let _ = sink.send(Completion::History(history_ticket, result));
        });

        let backend = self.backend.clone();
        let sink = self.completion_sink.clone();
        let peer_ticket = ticket.clone();
        self.runtime.spawn(async move {
            let result = backend.fetch_profile(&peer_ticket.key.remote).await;
            let _ = sink.send(Completion::Peer(peer_ticket, result));
        });

        Some(ticket)
    }

    pub fn close(&mut self) -> bool {
        let Some(key) = self.reconciler.active_key().cloned() else {
            return false;
        };
        self.peer_name = None;
        self.reconciler.close(&key)
    }

    pub fn send(&self, text: &str) -> Option<EmitOutcome> {
        self.reconciler.send(text)
    }

    pub fn messages(&self) -> &[Message] {
        self.reconciler.messages()
    }

    pub fn views(&self) -> Vec<MessageView> {
        match self.reconciler.active_key() {
            Some(key) => self
                .messages()
                .iter()
                .map(|message| MessageView::from_message(message, key))
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn active_key(&self) -> Option<&ConversationKey> {
        self.reconciler.active_key()
    }

    pub fn peer_name(&self) -> Option<&str> {
        self.peer_name.as_deref()
    }

    pub fn is_joined(&self) -> bool {
        self.reconciler.is_joined()
    }

    pub fn connection_state(&self) -> Option<(ChannelState, bool)> {
        self.connections
            .current()
            .map(|channel| (channel.state(), channel.is_offline()))
    }

    /// Moves the receiving half out, for callers that share the session behind a lock.
    /// `next_update` stays pending from then on; feed `SessionInputs::recv` into `apply`.
    pub fn take_inputs(&mut self) -> Option<SessionInputs> {
        self.inputs.take()
    }

    /// Applies one input. `None` when it changes nothing the view shows.
    pub fn apply(&mut self, input: SessionInput) -> Option<SessionUpdate> {
        match input.0 {
            Input::Notice(notice) => self.on_notice(notice),
            Input::Completion(completion) => self.on_completion(completion),
        }
    }

    /// Waits for the next input that changes what the view shows.
    pub async fn next_update(&mut self) -> SessionUpdate {
        loop {
            let input = match self.inputs.as_mut() {
                Some(inputs) => inputs.recv().await,
                None => None,
            };
            match input {
                Some(input) => {
                    if let Some(update) = self.apply(input) {
                        return update;
                    }
                }
                None => std::future::pending::<()>().await,
            }
        }
    }

    fn on_notice(&mut self, notice: ChannelNotice) -> Option<SessionUpdate> {
        match self.reconciler.handle_notice(notice) {
            ReconcileOutcome::Appended => Some(SessionUpdate::MessageAppended),
            ReconcileOutcome::DuplicateDropped => Some(SessionUpdate::DuplicateDropped),
            ReconcileOutcome::Joined => Some(SessionUpdate::Joined),
            ReconcileOutcome::Offline => Some(SessionUpdate::ConnectionChanged {
                state: ChannelState::Disconnected,
                offline: true,
            }),
            ReconcileOutcome::JoinPending | ReconcileOutcome::ConnectFailed(_) => {
                let (state, offline) = self
                    .connection_state()
                    .unwrap_or((ChannelState::Disconnected, false));
                Some(SessionUpdate::ConnectionChanged { state, offline })
            }
            ReconcileOutcome::Ignored => None,
        }
    }

    fn on_completion(&mut self, completion: Completion) -> Option<SessionUpdate> {
        match completion {
            Completion::History(ticket, result) => {
                match self.reconciler.apply_history(&ticket, result) {
                    Ok(HistoryOutcome::Loaded { history, kept_live }) => {
                        Some(SessionUpdate::HistoryLoaded { history, kept_live })
                    }
                    Ok(HistoryOutcome::Stale) => Some(SessionUpdate::Stale),
                    Err(err) => Some(SessionUpdate::HistoryFailed(err.to_string())),
                }
            }
            Completion::Peer(ticket, result) => {
                if !self.reconciler.is_current(&ticket) {
                    return Some(SessionUpdate::Stale);
                }
                match result {
                    Ok(profile) => {
                        self.peer_name = Some(profile.first_name.clone());
                        Some(SessionUpdate::PeerName(profile.first_name))
                    }
                    Err(err) => {
                        tracing::warn!(conversation = %ticket.key, "peer profile lookup failed: {}", err);
                        None
                    }
                }
            }
        }
    }

    /// Closes the conversation and drops the shared socket.
    pub fn shutdown(&mut self) {
        self.close();
        self.connections.shutdown();
    }
}
