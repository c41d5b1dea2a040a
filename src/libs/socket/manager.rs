use crate::libs::config::ClientConfig;
use crate::libs::socket::channel::{DriverCommand, SocketChannel};
use crate::libs::socket::driver::{self, DriverSettings};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedReceiver;

/// Starts whatever owns the socket behind a channel handle.
pub trait Connector: Send + Sync {
    fn start(&self, channel: Arc<SocketChannel>, commands: UnboundedReceiver<DriverCommand>);
}

/// Spawns the websocket driver on a tokio runtime.
pub struct WsConnector {
    settings: DriverSettings,
    runtime: Handle,
}

impl WsConnector {
    pub fn new(settings: DriverSettings, runtime: Handle) -> Self {
        Self { settings, runtime }
    }
}

impl Connector for WsConnector {
    fn start(&self, channel: Arc<SocketChannel>, commands: UnboundedReceiver<DriverCommand>) {
        self.runtime
            .spawn(driver::run(channel, commands, self.settings.clone()));
    }
}

/// Owns the process-wide channel handle and decides when a fresh one is needed.
pub struct ConnectionManager {
    url: String,
    max_buffered: usize,
    connector: Arc<dyn Connector>,
    current: Option<Arc<SocketChannel>>,
}

impl ConnectionManager {
    pub fn new(url: impl Into<String>, max_buffered: usize, connector: Arc<dyn Connector>) -> Self {
        Self {
            url: url.into(),
            max_buffered,
            connector,
            current: None,
        }
    }

    pub fn from_config(config: &ClientConfig, runtime: Handle) -> Self {
        let connector = WsConnector::new(DriverSettings::from(config), runtime);
        Self::new(config.socket_url(), config.max_buffered_emits, Arc::new(connector))
    }

    /// Returns the live handle, restarting its driver after a local disconnect or exhausted
    /// reconnects. A handle the server invalidated is replaced by a new one.
    pub fn channel(&mut self) -> Arc<SocketChannel> {
        if let Some(channel) = &self.current {
            if !channel.is_invalidated() {
                if channel.needs_driver() || channel.is_offline() {
                    tracing::info!("restarting socket driver for existing channel");
                    let commands = channel.reattach();
                    self.connector.start(channel.clone(), commands);
                }
                return channel.clone();
            }
            tracing::info!("socket channel invalidated, creating a new one");
        }

        let (channel, commands) = SocketChannel::new(self.url.clone(), self.max_buffered);
        self.connector.start(channel.clone(), commands);
        self.current = Some(channel.clone());
        channel
    }

    /// The current handle without creating one.
    pub fn current(&self) -> Option<Arc<SocketChannel>> {
        self.current.clone()
    }

    pub fn shutdown(&mut self) {
        if let Some(channel) = self.current.take() {
            channel.disconnect();
        }
    }
}
