#![allow(dead_code)]
//! Shared fixtures for chat-link integration tests.
//!
//! - [`MemoryBroker`]: an in-process STOMP broker that plugs into the client
//!   through the `Connector` seam. It records handshakes and published
//!   frames, fans `MESSAGE` frames out to matching subscriptions, and can
//!   drop every session to simulate a network loss.
//! - [`HttpStub`]: a tiny HTTP/1.1 responder on a `TcpListener` that replays
//!   canned responses, for the history endpoint.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chat_link::{
    ChatLinkClient, ChatLinkError, ChatLinkTimeouts, ConnectionOptions, Connector, HistoryFetcher,
    Message, MessagePage, MessageType, PageRequest, Result, StompCommand, StompFrame, Transport,
    UserRef,
};
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

// ── in-memory broker ─────────────────────────────────────────────────────────

struct Session {
    tx: mpsc::UnboundedSender<StompFrame>,
    /// subscription id -> destination
    subs: HashMap<String, String>,
}

#[derive(Default)]
struct BrokerState {
    next_session: u64,
    next_message_id: u64,
    sessions: HashMap<u64, Session>,
    handshakes: usize,
    refuse_connects: bool,
    fail_next_send: bool,
    /// Client SEND frames never complete at the transport.
    stall_sends: bool,
    /// (destination, body) of every client SEND
    published: Vec<(String, String)>,
}

#[derive(Clone, Default)]
pub struct MemoryBroker {
    state: Arc<Mutex<BrokerState>>,
    connect_delay: Duration,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every handshake takes `delay` before it completes.
    pub fn with_connect_delay(delay: Duration) -> Self {
        Self {
            state: Arc::default(),
            connect_delay: delay,
        }
    }

    pub fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(self.clone())
    }

    pub fn handshakes(&self) -> usize {
        self.state.lock().handshakes
    }

    pub fn refuse_connects(&self, refuse: bool) {
        self.state.lock().refuse_connects = refuse;
    }

    /// The next client SEND fails at the transport.
    pub fn fail_next_send(&self) {
        self.state.lock().fail_next_send = true;
    }

    /// Client SEND frames hang until the client's send timeout fires.
    pub fn stall_sends(&self, stall: bool) {
        self.state.lock().stall_sends = stall;
    }

    /// Bodies the client sent to `destination`, in order.
    pub fn published(&self, destination: &str) -> Vec<String> {
        self.state
            .lock()
            .published
            .iter()
            .filter(|(dest, _)| dest == destination)
            .map(|(_, body)| body.clone())
            .collect()
    }

    pub fn subscriber_count(&self, destination: &str) -> usize {
        self.state
            .lock()
            .sessions
            .values()
            .flat_map(|s| s.subs.values())
            .filter(|dest| *dest == destination)
            .count()
    }

    /// Deliver `body` to every subscription on `destination`. Returns the
    /// number of frames sent.
    pub fn deliver(&self, destination: &str, body: &str) -> usize {
        let mut state = self.state.lock();
        state.next_message_id += 1;
        let message_id = format!("m-{}", state.next_message_id);
        let mut delivered = 0;
        for session in state.sessions.values() {
            for (sub_id, dest) in &session.subs {
                if dest == destination {
                    let frame = StompFrame::message(sub_id, destination, &message_id, body);
                    if session.tx.send(frame).is_ok() {
                        delivered += 1;
                    }
                }
            }
        }
        delivered
    }

    /// Close every session from the broker side.
    pub fn drop_sessions(&self) {
        self.state.lock().sessions.clear();
    }

    fn on_client_frame(&self, session_id: u64, frame: StompFrame) -> Result<()> {
        let mut state = self.state.lock();
        match frame.command {
            StompCommand::Subscribe => {
                let id = frame.header("id").unwrap_or_default().to_string();
                let destination = frame.header("destination").unwrap_or_default().to_string();
                if let Some(session) = state.sessions.get_mut(&session_id) {
                    session.subs.insert(id, destination);
                }
            },
            StompCommand::Unsubscribe => {
                let id = frame.header("id").unwrap_or_default().to_string();
                if let Some(session) = state.sessions.get_mut(&session_id) {
                    session.subs.remove(&id);
                }
            },
            StompCommand::Send => {
                if state.fail_next_send {
                    state.fail_next_send = false;
                    return Err(ChatLinkError::WebSocketError("broken pipe".to_string()));
                }
                let destination = frame.header("destination").unwrap_or_default().to_string();
                state.published.push((destination, frame.body));
            },
            StompCommand::Disconnect => {
                state.sessions.remove(&session_id);
            },
            _ => {},
        }
        Ok(())
    }
}

#[async_trait]
impl Connector for MemoryBroker {
    async fn connect(&self) -> Result<Box<dyn Transport>> {
        self.state.lock().handshakes += 1;
        if !self.connect_delay.is_zero() {
            tokio::time::sleep(self.connect_delay).await;
        }

        let mut state = self.state.lock();
        if state.refuse_connects {
            return Err(ChatLinkError::ConnectError("connection refused".to_string()));
        }
        state.next_session += 1;
        let session_id = state.next_session;
        let (tx, rx) = mpsc::unbounded_channel();
        state.sessions.insert(
            session_id,
            Session {
                tx,
                subs: HashMap::new(),
            },
        );
        Ok(Box::new(MemoryTransport {
            session_id,
            broker: self.clone(),
            rx,
        }))
    }
}

struct MemoryTransport {
    session_id: u64,
    broker: MemoryBroker,
    rx: mpsc::UnboundedReceiver<StompFrame>,
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&mut self, frame: StompFrame) -> Result<()> {
        let stalled = frame.command == StompCommand::Send && self.broker.state.lock().stall_sends;
        if stalled {
            std::future::pending::<()>().await;
        }
        self.broker.on_client_frame(self.session_id, frame)
    }

    async fn next_frame(&mut self) -> Option<Result<StompFrame>> {
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) {
        self.broker.state.lock().sessions.remove(&self.session_id);
    }
}

// ── canned history ───────────────────────────────────────────────────────────

/// Serves `total` messages for any chat, newest id first.
pub struct StoredHistory {
    total: i64,
    pub requests: Mutex<Vec<PageRequest>>,
}

impl StoredHistory {
    pub fn new(total: i64) -> Arc<Self> {
        Arc::new(Self {
            total,
            requests: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl HistoryFetcher for StoredHistory {
    async fn fetch_page(&self, chat_id: i64, request: PageRequest) -> Result<MessagePage> {
        self.requests.lock().push(request);
        let start = i64::from(request.page_num) * i64::from(request.page_size);
        let end = (start + i64::from(request.page_size)).min(self.total);
        let content = (start.min(end)..end)
            .map(|i| {
                let id = self.total - i;
                message(id, chat_id, &format!("history {}", id), UserRef::new(2, "bob"))
            })
            .collect();
        Ok(MessagePage {
            content,
            has_next: end < self.total,
        })
    }
}

// ── builders ─────────────────────────────────────────────────────────────────

pub fn alice() -> UserRef {
    UserRef::new(1, "alice")
}

pub fn bob() -> UserRef {
    UserRef::new(2, "bob")
}

pub fn message(id: i64, chat_id: i64, content: &str, sender: UserRef) -> Message {
    Message {
        id,
        content: content.to_string(),
        created_at: id,
        modified_at: id,
        message_type: MessageType::Chat,
        sender,
        chat_id,
        client_msg_id: None,
    }
}

pub fn message_json(id: i64, chat_id: i64, content: &str, sender: &UserRef) -> String {
    serde_json::json!({
        "id": id,
        "content": content,
        "createdAt": id,
        "modifiedAt": id,
        "type": "CHAT",
        "sender": { "id": sender.id, "username": sender.username.as_str() },
        "chatId": chat_id,
    })
    .to_string()
}

/// Client for `alice` on `broker`, reconnecting after 100ms.
pub fn client(broker: &MemoryBroker, history: Arc<dyn HistoryFetcher>) -> ChatLinkClient {
    client_with_timeouts(broker, history, ChatLinkTimeouts::fast())
}

pub fn client_with_timeouts(
    broker: &MemoryBroker,
    history: Arc<dyn HistoryFetcher>,
    timeouts: ChatLinkTimeouts,
) -> ChatLinkClient {
    ChatLinkClient::builder()
        .local_user(alice())
        .connector(broker.connector())
        .history_fetcher(history)
        .connection_options(ConnectionOptions::default().with_reconnect_delay_ms(100))
        .timeouts(timeouts)
        .build()
        .expect("client builds")
}

/// Poll `condition` until it holds, failing the test after two seconds.
pub async fn eventually<F: FnMut() -> bool>(what: &str, mut condition: F) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

// ── HTTP responder ───────────────────────────────────────────────────────────

pub struct CannedResponse {
    pub status: u16,
    pub headers: Vec<(&'static str, String)>,
    pub body: String,
}

impl CannedResponse {
    pub fn json(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            headers: vec![("Content-Type", "application/json".to_string())],
            body: body.into(),
        }
    }

    pub fn too_many_requests(retry_after_secs: u64) -> Self {
        Self {
            status: 429,
            headers: vec![("Retry-After", retry_after_secs.to_string())],
            body: String::new(),
        }
    }
}

/// Replays canned responses in order, one per connection.
pub struct HttpStub {
    pub base_url: String,
    /// Request lines received, e.g. `GET /message/7/get?pageSize=30 HTTP/1.1`.
    pub requests: Arc<Mutex<Vec<String>>>,
}

impl HttpStub {
    pub async fn start(responses: Vec<CannedResponse>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let requests = Arc::new(Mutex::new(Vec::new()));
        let mut queue: VecDeque<CannedResponse> = responses.into();

        let seen = requests.clone();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                loop {
                    let n = match socket.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => n,
                    };
                    buf.extend_from_slice(&chunk[..n]);
                    if buf.windows(4).any(|w| w == b"\r\n\r\n") {
                        break;
                    }
                }
                let head = String::from_utf8_lossy(&buf);
                if let Some(line) = head.lines().next() {
                    seen.lock().push(line.to_string());
                }

                let response = queue.pop_front().unwrap_or(CannedResponse {
                    status: 500,
                    headers: Vec::new(),
                    body: "no canned response left".to_string(),
                });
                let mut raw = format!("HTTP/1.1 {} STUB\r\n", response.status);
                for (name, value) in &response.headers {
                    raw.push_str(&format!("{}: {}\r\n", name, value));
                }
                raw.push_str(&format!(
                    "Content-Length: {}\r\nConnection: close\r\n\r\n{}",
                    response.body.len(),
                    response.body
                ));
                let _ = socket.write_all(raw.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        Self {
            base_url: format!("http://{}", addr),
            requests,
        }
    }
}
