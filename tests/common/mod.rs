#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use devmatch_chat_lib::libs::chat::reconciler::{Clock, MessageReconciler};
use devmatch_chat_lib::libs::chat::session::{ChatSession, SessionUpdate};
use devmatch_chat_lib::libs::chat::source_traits::{HistorySource, ProfileSource};
use devmatch_chat_lib::libs::core::models::UserId;
use devmatch_chat_lib::libs::models::{HistoryRecord, UserProfile};
use devmatch_chat_lib::libs::socket::channel::{DriverCommand, SocketChannel};
use devmatch_chat_lib::libs::socket::manager::{ConnectionManager, Connector};
use devmatch_chat_lib::ClientError;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub type HistoryResult = Result<Vec<HistoryRecord>, ClientError>;

#[derive(Clone)]
pub struct ManualClock(Arc<Mutex<DateTime<Utc>>>);

impl ManualClock {
    pub fn new() -> Self {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        ManualClock(Arc::new(Mutex::new(start)))
    }

    pub fn advance(&self, millis: i64) {
        *self.0.lock().unwrap() += Duration::milliseconds(millis);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

/// History requests block until the test releases the gate for that remote id.
/// Remotes without a gate answer with an empty history.
#[derive(Default)]
pub struct GatedBackend {
    gates: Mutex<HashMap<String, oneshot::Receiver<HistoryResult>>>,
    profiles: Mutex<HashMap<String, UserProfile>>,
    history_calls: Mutex<Vec<String>>,
}

impl GatedBackend {
    pub fn gate(&self, remote: &str) -> oneshot::Sender<HistoryResult> {
        let (release, gate) = oneshot::channel();
        self.gates.lock().unwrap().insert(remote.to_string(), gate);
        release
    }

    pub fn with_profile(self, id: &str, first_name: &str) -> Self {
        self.profiles
            .lock()
            .unwrap()
            .insert(id.to_string(), profile(id, first_name));
        self
    }

    pub fn history_calls(&self) -> Vec<String> {
        self.history_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl HistorySource for GatedBackend {
    async fn fetch_history(&self, remote: &UserId) -> Result<Vec<HistoryRecord>, ClientError> {
        self.history_calls.lock().unwrap().push(remote.to_string());
        let gate = self.gates.lock().unwrap().remove(remote.as_str());
        match gate {
            Some(gate) => gate
                .await
                .unwrap_or_else(|_| Err(ClientError::Decode("gate dropped".into()))),
            None => Ok(Vec::new()),
        }
    }
}

#[async_trait]
impl ProfileSource for GatedBackend {
    async fn fetch_profile(&self, user: &UserId) -> Result<UserProfile, ClientError> {
        self.profiles
            .lock()
            .unwrap()
            .get(user.as_str())
            .cloned()
            .ok_or(ClientError::Api {
                status: 404,
                message: "user not found".into(),
            })
    }
}

#[derive(Default)]
pub struct RecordingConnector {
    started: Mutex<Vec<(Arc<SocketChannel>, UnboundedReceiver<DriverCommand>)>>,
}

impl RecordingConnector {
    pub fn starts(&self) -> usize {
        self.started.lock().unwrap().len()
    }

    pub fn latest(&self) -> Arc<SocketChannel> {
        self.started.lock().unwrap().last().unwrap().0.clone()
    }

    /// Frames written to the latest driver so far.
    pub fn frames(&self) -> Vec<String> {
        let mut started = self.started.lock().unwrap();
        let (_, commands) = started.last_mut().unwrap();
        let mut frames = Vec::new();
        while let Ok(command) = commands.try_recv() {
            if let DriverCommand::Send(frame) = command {
                frames.push(frame);
            }
        }
        frames
    }
}

impl Connector for RecordingConnector {
    fn start(&self, channel: Arc<SocketChannel>, commands: UnboundedReceiver<DriverCommand>) {
        self.started.lock().unwrap().push((channel, commands));
    }
}

pub fn profile(id: &str, first_name: &str) -> UserProfile {
    serde_json::from_value(json!({ "_id": id, "firstName": first_name })).unwrap()
}

pub fn record(sender: &str, text: &str, created_at: &str) -> HistoryRecord {
    serde_json::from_value(json!({
        "senderId": { "_id": sender, "firstName": sender },
        "text": text,
        "createdAt": created_at,
    }))
    .unwrap()
}

pub struct SessionFixture {
    pub backend: Arc<GatedBackend>,
    pub connector: Arc<RecordingConnector>,
    pub clock: ManualClock,
    pub session: ChatSession<GatedBackend, ManualClock>,
}

impl SessionFixture {
    pub fn new(backend: GatedBackend) -> Self {
        let backend = Arc::new(backend);
        let connector = Arc::new(RecordingConnector::default());
        let clock = ManualClock::new();
        let connections = ConnectionManager::new("http://localhost:7777", 8, connector.clone());
        let reconciler = MessageReconciler::with_clock(clock.clone(), Duration::milliseconds(1000));
        let session = ChatSession::new(
            backend.clone(),
            connections,
            reconciler,
            tokio::runtime::Handle::current(),
        );
        Self {
            backend,
            connector,
            clock,
            session,
        }
    }

    pub async fn next(&mut self) -> SessionUpdate {
        tokio::time::timeout(std::time::Duration::from_secs(2), self.session.next_update())
            .await
            .expect("session update did not arrive")
    }

    /// Collects updates until none arrive for `quiet_ms`.
    pub async fn drain(&mut self, quiet_ms: u64) -> Vec<SessionUpdate> {
        let mut updates = Vec::new();
        while let Ok(update) = tokio::time::timeout(
            std::time::Duration::from_millis(quiet_ms),
            self.session.next_update(),
        )
        .await
        {
            updates.push(update);
        }
        updates
    }

    /// Waits for the first update matching `wanted`, returning everything seen before it.
    pub async fn until(&mut self, wanted: impl Fn(&SessionUpdate) -> bool) -> Vec<SessionUpdate> {
        let mut seen = Vec::new();
        loop {
            let update = self.next().await;
            let done = wanted(&update);
            seen.push(update);
            if done {
                return seen;
            }
        }
    }

    pub fn texts(&self) -> Vec<String> {
        self.session
            .messages()
            .iter()
            .map(|message| message.text.clone())
            .collect()
    }
}

/// Serves one HTTP request with a canned response and hands back the raw request text.
pub async fn serve_once(status: &str, body: &str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    let handle = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let request = read_request(&mut stream).await;
        stream.write_all(response.as_bytes()).await.unwrap();
        stream.shutdown().await.ok();
        request
    });
    (base, handle)
}

async fn read_request(stream: &mut tokio::net::TcpStream) -> String {
    let mut raw = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let read = stream.read(&mut chunk).await.unwrap();
        if read == 0 {
            break;
        }
        raw.extend_from_slice(&chunk[..read]);
        let text = String::from_utf8_lossy(&raw).to_string();
        if let Some(head_end) = text.find("\r\n\r\n") {
            let content_length = text[..head_end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if raw.len() >= head_end + 4 + content_length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&raw).to_string()
}
