use crate::libs::core::models::ListenerId;
use crate::libs::socket::codec::{self, CodecError, Packet};
use crate::libs::socket::events::{
    ChannelEvent, ChannelNotice, DisconnectReason, ListenerKind, OutboundEvent,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("websocket error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("invalid socket url '{0}'")]
    InvalidUrl(String),
    #[error("handshake failed: {0}")]
    Handshake(String),
    #[error("connection closed")]
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitOutcome {
    Sent,
    /// Held until the room is joined on the next `connect`.
    Buffered,
    Dropped,
}

/// Instructions from a channel handle to the task that owns its socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverCommand {
    Send(String),
    Disconnect,
}

pub type NoticeSink = mpsc::UnboundedSender<ChannelNotice>;

struct Listener {
    id: ListenerId,
    kind: ListenerKind,
    sink: NoticeSink,
}

struct ChannelInner {
    state: ChannelState,
    offline: bool,
    invalidated: bool,
    driver_running: bool,
    commands: mpsc::UnboundedSender<DriverCommand>,
    listeners: Vec<Listener>,
    send_buffer: VecDeque<OutboundEvent>,
}

impl ChannelInner {
    fn send_now(&self, event: &OutboundEvent) -> Result<(), ChannelError> {
        let packet = event
            .to_packet()
            .map_err(|err| ChannelError::Codec(CodecError::Json(err)))?;
        let frame = codec::encode(&Packet::Message(packet));
        self.commands
            .send(DriverCommand::Send(frame))
            .map_err(|_| ChannelError::Closed)
    }
}

/// Shared handle to one socket connection and its listener registry.
pub struct SocketChannel {
    url: String,
    max_buffered: usize,
    inner: Mutex<ChannelInner>,
}

impl std::fmt::Debug for SocketChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("SocketChannel")
            .field("url", &self.url)
            .field("state", &inner.state)
            .field("offline", &inner.offline)
            .field("invalidated", &inner.invalidated)
            .field("driver_running", &inner.driver_running)
            .field("listeners", &inner.listeners.len())
            .finish()
    }
}

impl SocketChannel {
    pub fn new(
        url: impl Into<String>,
        max_buffered: usize,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<DriverCommand>) {
        let (commands, receiver) = mpsc::unbounded_channel();
        let channel = Arc::new(Self {
            url: url.into(),
            max_buffered,
            inner: Mutex::new(ChannelInner {
                state: ChannelState::Disconnected,
                offline: false,
                invalidated: false,
                driver_running: true,
                commands,
                listeners: Vec::new(),
                send_buffer: VecDeque::new(),
            }),
        });
        (channel, receiver)
    }

    fn lock(&self) -> MutexGuard<'_, ChannelInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> ChannelState {
        self.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ChannelState::Connected
    }

    /// Reconnect attempts are exhausted; no live updates until a manual retry.
    pub fn is_offline(&self) -> bool {
        self.lock().offline
    }

    pub fn is_invalidated(&self) -> bool {
        self.lock().invalidated
    }

    /// No task owns this channel's socket; `reattach` hands out a fresh command stream.
    pub fn needs_driver(&self) -> bool {
        let inner = self.lock();
        !inner.driver_running || inner.commands.is_closed()
    }

    /// Replaces the command stream so a new driver can take over. Listeners and queued
    /// messages survive.
    pub fn reattach(&self) -> mpsc::UnboundedReceiver<DriverCommand> {
        let (commands, receiver) = mpsc::unbounded_channel();
        let mut inner = self.lock();
        inner.commands = commands;
        inner.driver_running = true;
        inner.offline = false;
        receiver
    }

    pub fn buffered_len(&self) -> usize {
        self.lock().send_buffer.len()
    }

    pub fn subscribe(&self, kind: ListenerKind, sink: NoticeSink) -> ListenerId {
        let id = ListenerId::new();
        self.lock().listeners.push(Listener { id, kind, sink });
        id
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut inner = self.lock();
        let before = inner.listeners.len();
        inner.listeners.retain(|listener| listener.id != id);
        inner.listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }

    pub fn emit(&self, event: OutboundEvent) -> EmitOutcome {
        let mut inner = self.lock();
        if inner.state == ChannelState::Connected {
            return match inner.send_now(&event) {
                Ok(()) => EmitOutcome::Sent,
                Err(err) => {
                    tracing::warn!(event = event.name(), "failed to hand frame to driver: {}", err);
                    EmitOutcome::Dropped
                }
            };
        }

        match event {
            OutboundEvent::SendMessage(_) if self.max_buffered > 0 => {
                if inner.send_buffer.len() >= self.max_buffered {
                    inner.send_buffer.pop_front();
                    tracing::warn!("send buffer full, dropping oldest queued message");
                }
                inner.send_buffer.push_back(event);
                EmitOutcome::Buffered
            }
            _ => {
                tracing::debug!(event = event.name(), "channel not connected, dropping emit");
                EmitOutcome::Dropped
            }
        }
    }

    pub(crate) fn set_connecting(&self) {
        let mut inner = self.lock();
        inner.state = ChannelState::Connecting;
        inner.offline = false;
    }

    /// Hands queued `sendMessage` frames to the driver, oldest first. Call once the room
    /// join has gone out so the server routes the echo back to this client.
    pub fn flush_buffered(&self) -> usize {
        let mut inner = self.lock();
        if inner.state != ChannelState::Connected {
            return 0;
        }
        let mut flushed = 0;
        while let Some(queued) = inner.send_buffer.pop_front() {
            match inner.send_now(&queued) {
                Ok(()) => flushed += 1,
                Err(err) => tracing::warn!("failed to flush queued message: {}", err),
            }
        }
        flushed
    }

    pub fn invalidate(&self) {
        self.lock().invalidated = true;
    }

    /// Applies the state transition for `event`, then fans it out to listeners of its kind
    /// in registration order. Returns the number of listeners reached.
    pub fn dispatch(&self, event: ChannelEvent) -> usize {
        let mut inner = self.lock();
        match &event {
            ChannelEvent::Connect => {
                inner.state = ChannelState::Connected;
                inner.offline = false;
            }
            ChannelEvent::Disconnect(reason) => {
                inner.state = ChannelState::Disconnected;
                if reason.invalidates_handle() {
                    inner.invalidated = true;
                }
                if *reason == DisconnectReason::ReconnectExhausted {
                    inner.offline = true;
                }
            }
            ChannelEvent::ConnectError(_) => {
                inner.state = ChannelState::Disconnected;
            }
            ChannelEvent::NewMessage(_) => {}
        }

        let kind = event.kind();
        let mut delivered = 0;
        inner.listeners.retain(|listener| {
            if listener.kind != kind {
                return true;
            }
            let notice = ChannelNotice {
                listener: listener.id,
                event: event.clone(),
            };
            match listener.sink.send(notice) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(_) => false,
            }
        });
        delivered
    }

    /// Local teardown. The handle stays valid for reuse.
    pub fn disconnect(&self) {
        {
            let mut inner = self.lock();
            let _ = inner.commands.send(DriverCommand::Disconnect);
            inner.driver_running = false;
        }
        self.dispatch(ChannelEvent::Disconnect(DisconnectReason::ClientInitiated));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::libs::core::models::ConversationKey;
    use crate::libs::socket::events::NewMessage;

    fn key() -> ConversationKey {
        ConversationKey::new(Some("u1"), Some("r1")).unwrap()
    }

    #[test]
    fn test_emit_while_connected_forwards_frame() {
        let (channel, mut commands) = SocketChannel::new("ws://test", 8);
        channel.dispatch(ChannelEvent::Connect);

        assert_eq!(channel.emit(OutboundEvent::join(&key())), EmitOutcome::Sent);
        assert_eq!(
            commands.try_recv().unwrap(),
            DriverCommand::Send(r#"42["joinChat",{"toId":"r1","user":"u1"}]"#.to_string())
        );
    }

    #[test]
    fn test_sends_are_buffered_until_connect() {
        let (channel, mut commands) = SocketChannel::new("ws://test", 2);

        assert_eq!(channel.emit(OutboundEvent::join(&key())), EmitOutcome::Dropped);
        assert_eq!(channel.emit(OutboundEvent::send(&key(), "one")), EmitOutcome::Buffered);
        assert_eq!(channel.emit(OutboundEvent::send(&key(), "two")), EmitOutcome::Buffered);
        assert_eq!(channel.emit(OutboundEvent::send(&key(), "three")), EmitOutcome::Buffered);
        assert_eq!(channel.buffered_len(), 2);
        assert!(commands.try_recv().is_err());

        channel.dispatch(ChannelEvent::Connect);
        assert!(commands.try_recv().is_err());
        assert_eq!(channel.flush_buffered(), 2);
        let first = commands.try_recv().unwrap();
        let second = commands.try_recv().unwrap();
        assert!(matches!(first, DriverCommand::Send(frame) if frame.contains("two")));
        assert!(matches!(second, DriverCommand::Send(frame) if frame.contains("three")));
        assert_eq!(channel.buffered_len(), 0);
    }

    #[test]
    fn test_dispatch_reaches_matching_listeners_only() {
        let (channel, _commands) = SocketChannel::new("ws://test", 0);
        let (sink, mut notices) = mpsc::unbounded_channel();
        let on_message = channel.subscribe(ListenerKind::NewMessage, sink.clone());
        let _on_connect = channel.subscribe(ListenerKind::Connect, sink);

        let event = ChannelEvent::NewMessage(NewMessage {
            id: "r1".to_string(),
            message: "hi".to_string(),
        });
        assert_eq!(channel.dispatch(event.clone()), 1);
        assert_eq!(notices.try_recv().unwrap(), ChannelNotice { listener: on_message, event });

        assert!(channel.unsubscribe(on_message));
        assert!(!channel.unsubscribe(on_message));
        assert_eq!(channel.listener_count(), 1);
    }

    #[test]
    fn test_only_server_disconnect_invalidates() {
        let (channel, _commands) = SocketChannel::new("ws://test", 0);
        channel.dispatch(ChannelEvent::Connect);
        channel.disconnect();
        assert_eq!(channel.state(), ChannelState::Disconnected);
        assert!(!channel.is_invalidated());

        channel.dispatch(ChannelEvent::Connect);
        channel.dispatch(ChannelEvent::Disconnect(DisconnectReason::ServerInitiated));
        assert!(channel.is_invalidated());
    }

    #[test]
    fn test_reattach_after_local_disconnect() {
        let (channel, mut old_commands) = SocketChannel::new("ws://test", 0);
        channel.disconnect();
        assert!(channel.needs_driver());
        assert_eq!(old_commands.try_recv().unwrap(), DriverCommand::Disconnect);

        let mut commands = channel.reattach();
        assert!(!channel.needs_driver());
        channel.dispatch(ChannelEvent::Connect);
        assert_eq!(channel.emit(OutboundEvent::join(&key())), EmitOutcome::Sent);
        assert!(matches!(commands.try_recv().unwrap(), DriverCommand::Send(_)));
    }

    #[test]
    fn test_flush_waits_for_connection() {
        let (channel, mut commands) = SocketChannel::new("ws://test", 4);
        channel.emit(OutboundEvent::send(&key(), "queued"));
        assert_eq!(channel.flush_buffered(), 0);
        assert_eq!(channel.buffered_len(), 1);
        assert!(commands.try_recv().is_err());
    }

    #[test]
    fn test_exhausted_reconnects_mark_offline() {
        let (channel, _commands) = SocketChannel::new("ws://test", 0);
        let (sink, mut notices) = mpsc::unbounded_channel();
        channel.subscribe(ListenerKind::Disconnect, sink);

        channel.dispatch(ChannelEvent::Disconnect(DisconnectReason::ReconnectExhausted));
        assert!(channel.is_offline());
        assert!(!channel.is_invalidated());
        assert_eq!(
            notices.try_recv().unwrap().event,
            ChannelEvent::Disconnect(DisconnectReason::ReconnectExhausted)
        );

        channel.dispatch(ChannelEvent::Connect);
        assert!(!channel.is_offline());
    }

    #[test]
    fn test_closed_sinks_are_pruned() {
        let (channel, _commands) = SocketChannel::new("ws://test", 0);
        let (sink, notices) = mpsc::unbounded_channel();
        channel.subscribe(ListenerKind::Connect, sink);
        drop(notices);
        assert_eq!(channel.dispatch(ChannelEvent::Connect), 0);
        assert_eq!(channel.listener_count(), 0);
    }
}
