use crate::libs::config::ClientConfig;
use crate::libs::socket::channel::{ChannelError, DriverCommand, SocketChannel};
use crate::libs::socket::codec::{self, Handshake, Packet, SocketPacket};
use crate::libs::socket::events::{ChannelEvent, ConnectErrorKind, DisconnectReason};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use reqwest::Url;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{sleep, sleep_until, timeout, Instant};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverSettings {
    /// Consecutive failed attempts tolerated after the first one.
    pub reconnect_attempts: u32,
    pub reconnect_delay: Duration,
    pub session_retry_delay: Duration,
    pub handshake_timeout: Duration,
}

impl From<&ClientConfig> for DriverSettings {
    fn from(config: &ClientConfig) -> Self {
        Self {
            reconnect_attempts: config.reconnect_attempts,
            reconnect_delay: Duration::from_millis(config.reconnect_delay_ms),
            session_retry_delay: Duration::from_millis(config.session_retry_delay_ms),
            handshake_timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }
}

impl Default for DriverSettings {
    fn default() -> Self {
        DriverSettings::from(&ClientConfig::default())
    }
}

/// Turns an http(s) or ws(s) base URL into the Engine.IO websocket endpoint.
pub fn socket_endpoint(base: &str) -> Result<String, ChannelError> {
    let mut url = Url::parse(base).map_err(|_| ChannelError::InvalidUrl(base.to_string()))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        _ => return Err(ChannelError::InvalidUrl(base.to_string())),
    };
    url.set_scheme(scheme)
        .map_err(|_| ChannelError::InvalidUrl(base.to_string()))?;
    url.set_path("/socket.io/");
    url.set_query(Some("EIO=4&transport=websocket"));
    Ok(url.to_string())
}

enum SessionEnd {
    LocalDisconnect,
    HandlesDropped,
    ServerDisconnect,
    Rejected(ConnectErrorKind),
    Lost(DisconnectReason),
    Failed(ChannelError),
}

/// Owns the websocket for `channel` until a local or server disconnect, or until
/// reconnect attempts are exhausted.
pub async fn run(
    channel: Arc<SocketChannel>,
    mut commands: UnboundedReceiver<DriverCommand>,
    settings: DriverSettings,
) {
    let endpoint = match socket_endpoint(channel.url()) {
        Ok(endpoint) => endpoint,
        Err(err) => {
            tracing::error!("cannot start socket driver: {}", err);
            channel.dispatch(ChannelEvent::Disconnect(DisconnectReason::ReconnectExhausted));
            return;
        }
    };

    let mut failures: u32 = 0;
    let mut invalidations: u32 = 0;
    loop {
        channel.set_connecting();
        tracing::debug!(endpoint = %endpoint, failures, "connecting socket");

        let mut connected = false;
        let end = run_session(&endpoint, &channel, &mut commands, &settings, &mut connected).await;
        if connected {
            failures = 0;
            invalidations = 0;
        }

        let delay = match end {
            SessionEnd::LocalDisconnect => {
                tracing::info!("socket closed locally");
                return;
            }
            SessionEnd::HandlesDropped => {
                tracing::debug!("all channel handles dropped, stopping driver");
                return;
            }
            SessionEnd::ServerDisconnect => {
                tracing::info!("server closed the socket, handle invalidated");
                channel.dispatch(ChannelEvent::Disconnect(DisconnectReason::ServerInitiated));
                return;
            }
            SessionEnd::Rejected(ConnectErrorKind::SessionInvalidated) => {
                tracing::warn!("socket session invalidated, scheduling fresh connection");
                channel.dispatch(ChannelEvent::ConnectError(
                    ConnectErrorKind::SessionInvalidated,
                ));
                invalidations += 1;
                if invalidations > settings.reconnect_attempts {
                    break;
                }
                settings.session_retry_delay
            }
            SessionEnd::Rejected(kind) => {
                tracing::warn!("socket connect rejected: {:?}", kind);
                channel.dispatch(ChannelEvent::ConnectError(kind));
                failures += 1;
                settings.reconnect_delay
            }
            SessionEnd::Lost(reason) => {
                tracing::warn!("socket lost: {:?}", reason);
                channel.dispatch(ChannelEvent::Disconnect(reason));
                settings.reconnect_delay
            }
            SessionEnd::Failed(err) => {
                if connected {
                    tracing::warn!("socket transport failed: {}", err);
                    channel.dispatch(ChannelEvent::Disconnect(DisconnectReason::TransportClosed));
                } else {
                    tracing::warn!("socket connect failed: {}", err);
                    channel.dispatch(ChannelEvent::ConnectError(ConnectErrorKind::Other(
                        err.to_string(),
                    )));
                    failures += 1;
                }
                settings.reconnect_delay
            }
        };

        if failures > settings.reconnect_attempts {
            break;
        }

        let wait = sleep(delay);
        tokio::pin!(wait);
        loop {
            tokio::select! {
                _ = &mut wait => break,
                command = commands.recv() => match command {
                    Some(DriverCommand::Disconnect) | None => return,
                    Some(DriverCommand::Send(_)) => {
                        tracing::debug!("dropping frame emitted during reconnect wait");
                    }
                },
            }
        }
    }

    tracing::warn!(
        attempts = settings.reconnect_attempts,
        "reconnect attempts exhausted, socket offline"
    );
    channel.dispatch(ChannelEvent::Disconnect(DisconnectReason::ReconnectExhausted));
}

async fn run_session(
    endpoint: &str,
    channel: &SocketChannel,
    commands: &mut UnboundedReceiver<DriverCommand>,
    settings: &DriverSettings,
    connected: &mut bool,
) -> SessionEnd {
    let (socket, _) = match timeout(settings.handshake_timeout, connect_async(endpoint)).await {
        Ok(Ok(socket)) => socket,
        Ok(Err(err)) => return SessionEnd::Failed(err.into()),
        Err(_) => return SessionEnd::Failed(ChannelError::Handshake("connect timed out".into())),
    };
    let (mut write, mut read) = socket.split();

    let handshake = match timeout(settings.handshake_timeout, open_namespace(&mut write, &mut read)).await {
        Ok(Ok(Ok(handshake))) => handshake,
        Ok(Ok(Err(kind))) => return SessionEnd::Rejected(kind),
        Ok(Err(err)) => return SessionEnd::Failed(err),
        Err(_) => return SessionEnd::Failed(ChannelError::Handshake("handshake timed out".into())),
    };

    *connected = true;
    tracing::info!(sid = %handshake.sid, "socket connected");
    channel.dispatch(ChannelEvent::Connect);

    let heartbeat = Duration::from_millis(handshake.ping_interval + handshake.ping_timeout);
    let mut deadline = Instant::now() + heartbeat;

    loop {
        tokio::select! {
            packet = next_packet(&mut read) => match packet {
                Ok(Some(Packet::Ping)) => {
                    deadline = Instant::now() + heartbeat;
                    if let Err(err) = send_packet(&mut write, &Packet::Pong).await {
                        return SessionEnd::Failed(err);
                    }
                }
                Ok(Some(Packet::Message(SocketPacket::Event { name, data }))) => {
                    match ChannelEvent::from_event(&name, data) {
                        Some(Ok(event)) => {
                            channel.dispatch(event);
                        }
                        Some(Err(err)) => tracing::warn!(event = %name, "malformed event payload: {}", err),
                        None => tracing::trace!(event = %name, "ignoring unhandled event"),
                    }
                }
                Ok(Some(Packet::Message(SocketPacket::Disconnect))) => {
                    return SessionEnd::ServerDisconnect;
                }
                Ok(Some(Packet::Message(SocketPacket::ConnectError(payload)))) => {
                    return SessionEnd::Rejected(ConnectErrorKind::classify(&payload));
                }
                Ok(Some(Packet::Close)) | Ok(None) => {
                    return SessionEnd::Lost(DisconnectReason::TransportClosed);
                }
                Ok(Some(_)) => {}
                Err(err) => return SessionEnd::Failed(err),
            },
            command = commands.recv() => match command {
                Some(DriverCommand::Send(frame)) => {
                    if let Err(err) = write.send(WsMessage::Text(frame)).await {
                        return SessionEnd::Failed(err.into());
                    }
                }
                Some(DriverCommand::Disconnect) => {
                    let _ = send_packet(&mut write, &Packet::Message(SocketPacket::Disconnect)).await;
                    let _ = write.close().await;
                    return SessionEnd::LocalDisconnect;
                }
                None => {
                    let _ = write.close().await;
                    return SessionEnd::HandlesDropped;
                }
            },
            _ = sleep_until(deadline) => {
                return SessionEnd::Lost(DisconnectReason::PingTimeout);
            }
        }
    }
}

/// Reads the Engine.IO open packet and joins the default namespace.
async fn open_namespace<W, R>(
    write: &mut W,
    read: &mut R,
) -> Result<Result<Handshake, ConnectErrorKind>, ChannelError>
where
    W: Sink<WsMessage, Error = WsError> + Unpin,
    R: Stream<Item = Result<WsMessage, WsError>> + Unpin,
{
    let handshake = match next_packet(read).await? {
        Some(Packet::Open(handshake)) => handshake,
        Some(other) => {
            return Err(ChannelError::Handshake(format!(
                "expected open packet, got {:?}",
                other
            )))
        }
        None => return Err(ChannelError::Closed),
    };

    send_packet(write, &Packet::Message(SocketPacket::Connect(None))).await?;

    loop {
        match next_packet(read).await? {
            Some(Packet::Message(SocketPacket::Connect(_))) => return Ok(Ok(handshake)),
            Some(Packet::Message(SocketPacket::ConnectError(payload))) => {
                return Ok(Err(ConnectErrorKind::classify(&payload)))
            }
            Some(Packet::Ping) => send_packet(write, &Packet::Pong).await?,
            Some(Packet::Close) | None => return Err(ChannelError::Closed),
            Some(_) => {}
        }
    }
}

async fn send_packet<W>(write: &mut W, packet: &Packet) -> Result<(), ChannelError>
where
    W: Sink<WsMessage, Error = WsError> + Unpin,
{
    write.send(WsMessage::Text(codec::encode(packet))).await?;
    Ok(())
}

/// Next decodable Engine.IO packet; `None` once the websocket is closed.
async fn next_packet<R>(read: &mut R) -> Result<Option<Packet>, ChannelError>
where
    R: Stream<Item = Result<WsMessage, WsError>> + Unpin,
{
    while let Some(message) = read.next().await {
        match message? {
            WsMessage::Text(text) => match codec::decode(&text) {
                Ok(packet) => return Ok(Some(packet)),
                Err(err) => tracing::warn!("dropping undecodable frame: {}", err),
            },
            WsMessage::Close(_) => return Ok(None),
            _ => {}
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_endpoint_from_http_base() {
        assert_eq!(
            socket_endpoint("http://localhost:7777").unwrap(),
            "ws://localhost:7777/socket.io/?EIO=4&transport=websocket"
        );
        assert_eq!(
            socket_endpoint("https://devmatch.example/api").unwrap(),
            "wss://devmatch.example/socket.io/?EIO=4&transport=websocket"
        );
    }

    #[test]
    fn test_socket_endpoint_rejects_other_schemes() {
        assert!(matches!(
            socket_endpoint("ftp://localhost"),
            Err(ChannelError::InvalidUrl(_))
        ));
        assert!(socket_endpoint("not a url").is_err());
    }
}
