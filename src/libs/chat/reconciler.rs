use crate::libs::core::models::{ConversationKey, ListenerId, Message, MessageBuffer, UserId};
use crate::libs::models::HistoryRecord;
use crate::libs::socket::channel::{EmitOutcome, NoticeSink, SocketChannel};
use crate::libs::socket::events::{
    ChannelEvent, ChannelNotice, ConnectErrorKind, DisconnectReason, ListenerKind, OutboundEvent,
};
use crate::ClientError;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

pub const DEFAULT_DEDUPE_WINDOW_MS: i64 = 1000;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Issued by `open`; the history result for it is applied only while it is still current.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub key: ConversationKey,
    generation: u64,
}

impl FetchTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryOutcome {
    /// `kept_live` counts live arrivals re-appended after the history.
    Loaded { history: usize, kept_live: usize },
    Stale,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Appended,
    DuplicateDropped,
    Joined,
    JoinPending,
    /// Reconnects ran out; nothing more arrives until the channel is restarted.
    Offline,
    ConnectFailed(ConnectErrorKind),
    Ignored,
}

#[derive(Debug, Clone, Copy)]
struct ConversationListeners {
    connect: ListenerId,
    disconnect: ListenerId,
    connect_error: ListenerId,
    message: ListenerId,
}

impl ConversationListeners {
    fn register(channel: &SocketChannel, sink: &NoticeSink) -> Self {
        Self {
            connect: channel.subscribe(ListenerKind::Connect, sink.clone()),
            disconnect: channel.subscribe(ListenerKind::Disconnect, sink.clone()),
            connect_error: channel.subscribe(ListenerKind::ConnectError, sink.clone()),
            message: channel.subscribe(ListenerKind::NewMessage, sink.clone()),
        }
    }

    fn detach(&self, channel: &SocketChannel) {
        for id in [self.connect, self.disconnect, self.connect_error, self.message] {
            channel.unsubscribe(id);
        }
    }

    fn owns(&self, id: ListenerId) -> bool {
        [self.connect, self.disconnect, self.connect_error, self.message].contains(&id)
    }
}

struct ActiveConversation {
    key: ConversationKey,
    generation: u64,
    channel: Arc<SocketChannel>,
    listeners: ConversationListeners,
    join_pending: bool,
    history_loaded: bool,
}

/// Merges fetched history and live socket events for the open conversation into one
/// ordered, deduplicated buffer, and owns that conversation's join handshake.
pub struct MessageReconciler<C: Clock = SystemClock> {
    clock: C,
    window: Duration,
    generation: u64,
    active: Option<ActiveConversation>,
    buffer: MessageBuffer,
}

impl MessageReconciler<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock, Duration::milliseconds(DEFAULT_DEDUPE_WINDOW_MS))
    }
}

impl Default for MessageReconciler<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> MessageReconciler<C> {
    pub fn with_clock(clock: C, window: Duration) -> Self {
        Self {
            clock,
            window,
            generation: 0,
            active: None,
            buffer: MessageBuffer::new(),
        }
    }

    pub fn messages(&self) -> &[Message] {
        self.buffer.as_slice()
    }

    pub fn active_key(&self) -> Option<&ConversationKey> {
        self.active.as_ref().map(|active| &active.key)
    }

    pub fn channel(&self) -> Option<&Arc<SocketChannel>> {
        self.active.as_ref().map(|active| &active.channel)
    }

    pub fn is_joined(&self) -> bool {
        self.active
            .as_ref()
            .map(|active| !active.join_pending)
            .unwrap_or(false)
    }

    pub fn history_loaded(&self) -> bool {
        self.active
            .as_ref()
            .map(|active| active.history_loaded)
            .unwrap_or(false)
    }

    /// Starts a conversation: resets the buffer, attaches listeners and joins the room now
    /// if the channel is connected, otherwise on its next `connect`. Any previously open
    /// conversation is closed first.
    pub fn open(
        &mut self,
        key: ConversationKey,
        channel: Arc<SocketChannel>,
        sink: &NoticeSink,
    ) -> FetchTicket {
        self.close_active();
        self.generation += 1;

        let listeners = ConversationListeners::register(&channel, sink);
        let mut active = ActiveConversation {
            key: key.clone(),
            generation: self.generation,
            channel,
            listeners,
            join_pending: true,
            history_loaded: false,
        };
        if active.channel.is_connected() {
            Self::try_join(&mut active);
        } else {
            tracing::debug!(conversation = %key, "channel not connected, join deferred");
        }
        self.active = Some(active);

        FetchTicket {
            key,
            generation: self.generation,
        }
    }

    fn try_join(active: &mut ActiveConversation) -> bool {
        match active.channel.emit(OutboundEvent::join(&active.key)) {
            EmitOutcome::Sent => {
                tracing::info!(conversation = %active.key, "joined chat");
                active.join_pending = false;
                let flushed = active.channel.flush_buffered();
                if flushed > 0 {
                    tracing::debug!(conversation = %active.key, flushed, "sent queued messages");
                }
                true
            }
            _ => false,
        }
    }

    /// Detaches this conversation's listeners and clears the buffer. The shared channel
    /// stays connected. Returns `false` when `key` is not the open conversation.
    pub fn close(&mut self, key: &ConversationKey) -> bool {
        match &self.active {
            Some(active) if &active.key == key => {
                self.close_active();
                true
            }
            _ => false,
        }
    }

    fn close_active(&mut self) {
        if let Some(active) = self.active.take() {
            active.listeners.detach(&active.channel);
            tracing::debug!(conversation = %active.key, "closed conversation");
            // a fetch still in flight must not land on the next conversation
            self.generation += 1;
        }
        self.buffer.clear();
    }

    pub fn is_current(&self, ticket: &FetchTicket) -> bool {
        match &self.active {
            Some(active) => active.generation == ticket.generation && active.key == ticket.key,
            None => false,
        }
    }

    pub fn apply_history(
        &mut self,
        ticket: &FetchTicket,
        result: Result<Vec<HistoryRecord>, ClientError>,
    ) -> Result<HistoryOutcome, ClientError> {
        let already_loaded = self.history_loaded();
        if !self.is_current(ticket) || already_loaded {
            tracing::debug!(conversation = %ticket.key, "discarding stale history");
            return Ok(HistoryOutcome::Stale);
        }

        let records = result.inspect_err(|err| {
            tracing::warn!(conversation = %ticket.key, "history fetch failed: {}", err);
        })?;

        let mut history = MessageBuffer::new();
        for record in records {
            match record.into_message() {
                Some(message) => history.push(message),
                None => tracing::warn!(conversation = %ticket.key, "skipping history record without sender"),
            }
        }
        let history_len = history.len();

        // live arrivals that beat the fetch go after the history unless it already has them
        let live = std::mem::take(&mut self.buffer);
        let mut kept_live = 0;
        for message in live.iter() {
            if !history.contains_recent(&message.sender_id, &message.text, message.created_at, self.window) {
                history.push(message.clone());
                kept_live += 1;
            }
        }
        self.buffer = history;

        if let Some(active) = self.active.as_mut() {
            active.history_loaded = true;
        }
        Ok(HistoryOutcome::Loaded {
            history: history_len,
            kept_live,
        })
    }

    pub fn handle_notice(&mut self, notice: ChannelNotice) -> ReconcileOutcome {
        let Some(active) = self.active.as_mut() else {
            return ReconcileOutcome::Ignored;
        };
        if !active.listeners.owns(notice.listener) {
            return ReconcileOutcome::Ignored;
        }

        match notice.event {
            ChannelEvent::Connect => {
                if active.join_pending && Self::try_join(active) {
                    ReconcileOutcome::Joined
                } else {
                    ReconcileOutcome::Ignored
                }
            }
            ChannelEvent::Disconnect(reason) => {
                tracing::debug!(conversation = %active.key, ?reason, "channel dropped, join re-armed");
                active.join_pending = true;
                if reason == DisconnectReason::ReconnectExhausted {
                    ReconcileOutcome::Offline
                } else {
                    ReconcileOutcome::JoinPending
                }
            }
            ChannelEvent::ConnectError(kind) => {
                active.join_pending = true;
                ReconcileOutcome::ConnectFailed(kind)
            }
            ChannelEvent::NewMessage(incoming) => {
                let Some(sender) = UserId::parse(&incoming.id) else {
                    tracing::warn!("dropping live message without sender id");
                    return ReconcileOutcome::Ignored;
                };
                let now = self.clock.now();
                if self
                    .buffer
                    .contains_recent(&sender, &incoming.message, now, self.window)
                {
                    tracing::debug!(sender = %sender, "dropping duplicate live message");
                    return ReconcileOutcome::DuplicateDropped;
                }
                self.buffer.push(Message::new(sender, incoming.message, now));
                ReconcileOutcome::Appended
            }
        }
    }

    /// Emits `sendMessage` for the open conversation. Blank text and a closed conversation
    /// are rejected with `None`. Nothing is appended locally; the server echo does that.
    pub fn send(&self, text: &str) -> Option<EmitOutcome> {
        if text.trim().is_empty() {
            return None;
        }
        let active = self.active.as_ref()?;
        Some(active.channel.emit(OutboundEvent::send(&active.key, text)))
    }
}
