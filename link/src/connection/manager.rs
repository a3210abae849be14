//! The single shared realtime connection.
//!
//! One background task owns the transport and the transport-level
//! subscription table. The public [`ConnectionManager`] handle talks to it
//! over a command channel, so every state transition happens in one place:
//!
//! - Lazy connect: nothing is opened until `ensure_connected` is called
//! - Concurrent `ensure_connected` callers share one handshake
//! - Inbound `MESSAGE` frames are routed by their `subscription` header
//! - Auto-reconnect with a fixed delay, re-subscribing every live entry
//! - `disconnect` drops every subscription and releases the transport

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};

use super::transport::{Connector, Transport};
use super::DEFAULT_FRAME_CHANNEL_CAPACITY;
use crate::error::{ChatLinkError, Result};
use crate::event_handlers::{ConnectionError, DisconnectReason, EventHandlers};
use crate::models::ConnectionOptions;
use crate::stomp::{StompCommand, StompFrame};
use crate::timeouts::ChatLinkTimeouts;

/// Lifecycle of the shared connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// The transport was lost; reconnect attempt `attempt` is pending or
    /// in progress.
    Reconnecting { attempt: u32 },
    /// The last handshake failed. The next `ensure_connected` retries.
    Failed { reason: String },
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Reconnecting { attempt } => write!(f, "reconnecting (attempt {})", attempt),
            ConnectionState::Failed { reason } => write!(f, "failed: {}", reason),
        }
    }
}

/// Body of a `MESSAGE` frame delivered to one transport subscription.
#[derive(Debug, Clone)]
pub(crate) struct InboundFrame {
    pub destination: String,
    pub body: String,
}

// ── Commands ────────────────────────────────────────────────────────────────

enum ConnCmd {
    EnsureConnected {
        result_tx: oneshot::Sender<Result<()>>,
    },
    Publish {
        destination: String,
        body: String,
        result_tx: oneshot::Sender<Result<()>>,
    },
    Subscribe {
        destination: String,
        frame_tx: mpsc::Sender<InboundFrame>,
        result_tx: oneshot::Sender<String>,
    },
    Unsubscribe {
        id: String,
    },
    Disconnect {
        done_tx: oneshot::Sender<()>,
    },
}

struct SubEntry {
    destination: String,
    frame_tx: mpsc::Sender<InboundFrame>,
}

fn task_gone() -> ChatLinkError {
    ChatLinkError::InternalError("Connection task is not running".to_string())
}

// ── ConnectionManager (public handle) ───────────────────────────────────────

/// Handle to the shared connection. Cheap to clone; the background task
/// stops once every handle is dropped.
///
/// Must be created inside a Tokio runtime.
#[derive(Clone)]
pub struct ConnectionManager {
    cmd_tx: mpsc::Sender<ConnCmd>,
    state_rx: watch::Receiver<ConnectionState>,
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &*self.state_rx.borrow())
            .finish()
    }
}

impl ConnectionManager {
    pub fn new(
        connector: Arc<dyn Connector>,
        options: ConnectionOptions,
        timeouts: ChatLinkTimeouts,
        event_handlers: EventHandlers,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(256);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

        let task = ConnectionTask {
            cmd_rx,
            connector,
            options,
            timeouts,
            event_handlers,
            state_tx,
            subs: HashMap::new(),
            next_sub_id: 1,
            waiters: Vec::new(),
        };
        tokio::spawn(task.run());

        Self { cmd_tx, state_rx }
    }

    /// Connect if not already connected. Concurrent callers share a single
    /// in-flight handshake and all receive its outcome.
    pub async fn ensure_connected(&self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }
        let (result_tx, result_rx) = oneshot::channel();
        self.cmd_tx
            .send(ConnCmd::EnsureConnected { result_tx })
            .await
            .map_err(|_| task_gone())?;
        result_rx.await.map_err(|_| task_gone())?
    }

    /// Send a JSON payload to an application destination.
    ///
    /// Fails with [`ChatLinkError::NotConnected`] unless the connection is
    /// up; nothing is queued and no connect is attempted.
    pub async fn publish(&self, destination: &str, body: String) -> Result<()> {
        if !self.is_connected() {
            return Err(ChatLinkError::NotConnected);
        }
        let (result_tx, result_rx) = oneshot::channel();
        self.cmd_tx
            .send(ConnCmd::Publish {
                destination: destination.to_string(),
                body,
                result_tx,
            })
            .await
            .map_err(|_| task_gone())?;
        result_rx.await.map_err(|_| task_gone())?
    }

    /// Register a transport subscription. Returns its id and the channel
    /// that receives its frames. The subscription survives reconnects.
    pub(crate) async fn subscribe(
        &self,
        destination: &str,
    ) -> Result<(String, mpsc::Receiver<InboundFrame>)> {
        let (frame_tx, frame_rx) = mpsc::channel(DEFAULT_FRAME_CHANNEL_CAPACITY);
        let (result_tx, result_rx) = oneshot::channel();
        self.cmd_tx
            .send(ConnCmd::Subscribe {
                destination: destination.to_string(),
                frame_tx,
                result_tx,
            })
            .await
            .map_err(|_| task_gone())?;
        let id = result_rx.await.map_err(|_| task_gone())?;
        Ok((id, frame_rx))
    }

    pub(crate) async fn unsubscribe(&self, id: &str) -> Result<()> {
        self.cmd_tx
            .send(ConnCmd::Unsubscribe { id: id.to_string() })
            .await
            .map_err(|_| task_gone())
    }

    /// Drop every transport subscription, release the transport and return
    /// to `Disconnected`. Idempotent.
    pub async fn disconnect(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.cmd_tx.send(ConnCmd::Disconnect { done_tx }).await.is_ok() {
            let _ = done_rx.await;
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state_rx.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state_rx.borrow().is_connected()
    }

    /// Subscribe to state transitions.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }
}

// ── Background connection task ──────────────────────────────────────────────

enum Flow {
    Continue,
    Disconnected,
    Shutdown,
}

enum Handshake {
    Ready(Box<dyn Transport>),
    Failed(ChatLinkError),
    Aborted(Flow),
}

enum Exit {
    Lost,
    Disconnected,
    Shutdown,
}

struct ConnectionTask {
    cmd_rx: mpsc::Receiver<ConnCmd>,
    connector: Arc<dyn Connector>,
    options: ConnectionOptions,
    timeouts: ChatLinkTimeouts,
    event_handlers: EventHandlers,
    state_tx: watch::Sender<ConnectionState>,
    subs: HashMap<String, SubEntry>,
    next_sub_id: u64,
    /// `ensure_connected` callers waiting on the current or next handshake.
    waiters: Vec<oneshot::Sender<Result<()>>>,
}

impl ConnectionTask {
    async fn run(mut self) {
        loop {
            if let Flow::Shutdown = self.idle().await {
                return;
            }

            // Reconnect attempts since the last live session.
            let mut attempt: u32 = 0;
            let mut was_live = false;
            loop {
                if attempt == 0 {
                    self.set_state(ConnectionState::Connecting);
                }
                match self.handshake().await {
                    Handshake::Ready(transport) => {
                        was_live = true;
                        attempt = 0;
                        match self.go_live(transport).await {
                            Exit::Lost => {},
                            Exit::Disconnected => break,
                            Exit::Shutdown => return,
                        }
                    },
                    Handshake::Failed(err) => {
                        log::warn!("[chat-link] Connection attempt failed: {}", err);
                        self.reply_waiters(Err(err.clone()));
                        let exhausted = !was_live
                            || self
                                .options
                                .max_reconnect_attempts
                                .is_some_and(|max| attempt >= max);
                        if exhausted {
                            if was_live {
                                self.event_handlers.emit_error(ConnectionError::new(
                                    format!("Max reconnection attempts ({}) reached", attempt),
                                    false,
                                ));
                            }
                            self.set_state(ConnectionState::Failed {
                                reason: err.to_string(),
                            });
                            break;
                        }
                    },
                    Handshake::Aborted(Flow::Shutdown) => return,
                    Handshake::Aborted(_) => break,
                }

                if !self.options.auto_reconnect {
                    self.set_state(ConnectionState::Disconnected);
                    break;
                }
                attempt += 1;
                self.set_state(ConnectionState::Reconnecting { attempt });
                self.event_handlers.emit_reconnecting(attempt);
                log::info!(
                    "[chat-link] Attempting reconnection in {}ms (attempt {})",
                    self.options.reconnect_delay_ms,
                    attempt
                );
                match self.backoff().await {
                    Flow::Continue => {},
                    Flow::Disconnected => break,
                    Flow::Shutdown => return,
                }
            }
        }
    }

    /// Wait until someone asks for a connection.
    async fn idle(&mut self) -> Flow {
        while self.waiters.is_empty() {
            let cmd = self.cmd_rx.recv().await;
            if let Flow::Shutdown = self.handle_offline(cmd) {
                return Flow::Shutdown;
            }
        }
        Flow::Continue
    }

    async fn handshake(&mut self) -> Handshake {
        let connector = Arc::clone(&self.connector);
        let connect = connector.connect();
        tokio::pin!(connect);

        loop {
            tokio::select! {
                result = &mut connect => {
                    return match result {
                        Ok(transport) => Handshake::Ready(transport),
                        Err(e) => Handshake::Failed(e),
                    };
                }
                cmd = self.cmd_rx.recv() => {
                    match self.handle_offline(cmd) {
                        Flow::Continue => {},
                        flow => return Handshake::Aborted(flow),
                    }
                }
            }
        }
    }

    async fn backoff(&mut self) -> Flow {
        let sleep = tokio::time::sleep(Duration::from_millis(self.options.reconnect_delay_ms));
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                biased;
                cmd = self.cmd_rx.recv() => {
                    match self.handle_offline(cmd) {
                        Flow::Continue => {},
                        flow => return flow,
                    }
                }
                _ = &mut sleep => return Flow::Continue,
            }
        }
    }

    /// Commands while no transport is live.
    fn handle_offline(&mut self, cmd: Option<ConnCmd>) -> Flow {
        match cmd {
            Some(ConnCmd::EnsureConnected { result_tx }) => {
                self.waiters.push(result_tx);
                Flow::Continue
            },
            Some(ConnCmd::Publish { result_tx, .. }) => {
                let _ = result_tx.send(Err(ChatLinkError::NotConnected));
                Flow::Continue
            },
            Some(ConnCmd::Subscribe {
                destination,
                frame_tx,
                result_tx,
            }) => {
                let id = self.register(destination, frame_tx);
                let _ = result_tx.send(id);
                Flow::Continue
            },
            Some(ConnCmd::Unsubscribe { id }) => {
                self.subs.remove(&id);
                Flow::Continue
            },
            Some(ConnCmd::Disconnect { done_tx }) => {
                self.reset();
                let _ = done_tx.send(());
                Flow::Disconnected
            },
            None => Flow::Shutdown,
        }
    }

    async fn go_live(&mut self, mut transport: Box<dyn Transport>) -> Exit {
        self.set_state(ConnectionState::Connected);
        self.event_handlers.emit_connect();
        log::info!("[chat-link] Connected");

        if let Err(e) = self.resubscribe_all(transport.as_mut()).await {
            self.reply_waiters(Err(ChatLinkError::ConnectError(e.to_string())));
            transport.close().await;
            self.lost(DisconnectReason::new(format!("Failed to re-subscribe: {}", e)));
            return Exit::Lost;
        }
        self.reply_waiters(Ok(()));

        loop {
            tokio::select! {
                biased;

                cmd = self.cmd_rx.recv() => {
                    let Some(cmd) = cmd else {
                        self.close_session(transport.as_mut()).await;
                        return Exit::Shutdown;
                    };
                    if let Some(exit) = self.handle_live(cmd, transport.as_mut()).await {
                        return exit;
                    }
                }

                frame = transport.next_frame() => {
                    if let Some(reason) = self.handle_frame(frame).await {
                        transport.close().await;
                        self.lost(reason);
                        return Exit::Lost;
                    }
                }
            }
        }
    }

    /// Commands while connected. Returns `Some` when the session ends.
    async fn handle_live(&mut self, cmd: ConnCmd, transport: &mut dyn Transport) -> Option<Exit> {
        match cmd {
            ConnCmd::EnsureConnected { result_tx } => {
                let _ = result_tx.send(Ok(()));
            },
            ConnCmd::Publish {
                destination,
                body,
                result_tx,
            } => {
                let frame = StompFrame::send(&destination, body);
                if let Err(e) = self.send_frame(transport, frame).await {
                    let _ = result_tx.send(Err(ChatLinkError::SendFailed(e.to_string())));
                    transport.close().await;
                    self.lost(DisconnectReason::new(format!("Write failed: {}", e)));
                    return Some(Exit::Lost);
                }
                let _ = result_tx.send(Ok(()));
            },
            ConnCmd::Subscribe {
                destination,
                frame_tx,
                result_tx,
            } => {
                let id = self.register(destination.clone(), frame_tx);
                let _ = result_tx.send(id.clone());
                log::debug!("[chat-link] Subscribing {} -> {}", id, destination);
                let frame = StompFrame::subscribe(&id, &destination);
                if let Err(e) = self.send_frame(transport, frame).await {
                    transport.close().await;
                    self.lost(DisconnectReason::new(format!("Failed to subscribe: {}", e)));
                    return Some(Exit::Lost);
                }
            },
            ConnCmd::Unsubscribe { id } => {
                if self.subs.remove(&id).is_some() {
                    log::debug!("[chat-link] Unsubscribing {}", id);
                    if let Err(e) = self.send_frame(transport, StompFrame::unsubscribe(&id)).await {
                        transport.close().await;
                        self.lost(DisconnectReason::new(format!("Failed to unsubscribe: {}", e)));
                        return Some(Exit::Lost);
                    }
                }
            },
            ConnCmd::Disconnect { done_tx } => {
                self.close_session(transport).await;
                self.reset();
                self.event_handlers
                    .emit_disconnect(DisconnectReason::new("Client disconnected"));
                let _ = done_tx.send(());
                return Some(Exit::Disconnected);
            },
        }
        None
    }

    /// Inbound frames. Returns `Some` when the session is over.
    async fn handle_frame(&mut self, frame: Option<Result<StompFrame>>) -> Option<DisconnectReason> {
        match frame {
            None => Some(DisconnectReason::new("Connection closed by broker")),
            Some(Err(e)) => {
                self.event_handlers
                    .emit_error(ConnectionError::new(e.to_string(), true));
                Some(DisconnectReason::new(format!("Transport error: {}", e)))
            },
            Some(Ok(frame)) => match frame.command {
                StompCommand::Message => {
                    self.route(frame).await;
                    None
                },
                StompCommand::Error => {
                    let message = frame.error_message();
                    log::warn!("[chat-link] Broker error: {}", message);
                    self.event_handlers
                        .emit_error(ConnectionError::new(&message, true));
                    Some(DisconnectReason::new(format!("Broker error: {}", message)))
                },
                other => {
                    log::debug!("[chat-link] Ignoring {} frame", other);
                    None
                },
            },
        }
    }

    async fn route(&self, frame: StompFrame) {
        let Some(sub_id) = frame.header("subscription").map(str::to_string) else {
            log::debug!("[chat-link] MESSAGE frame without subscription header");
            return;
        };
        let Some(entry) = self.subs.get(&sub_id) else {
            log::debug!("[chat-link] No subscription found for id: {}", sub_id);
            return;
        };
        let destination = frame
            .header("destination")
            .unwrap_or(&entry.destination)
            .to_string();
        let frame_tx = entry.frame_tx.clone();
        let inbound = InboundFrame {
            destination,
            body: frame.body,
        };
        if frame_tx.send(inbound).await.is_err() {
            log::debug!("[chat-link] Subscription {} receiver dropped", sub_id);
        }
    }

    async fn resubscribe_all(&self, transport: &mut dyn Transport) -> Result<()> {
        if self.subs.is_empty() {
            return Ok(());
        }
        log::info!(
            "[chat-link] Re-subscribing {} active subscription(s)",
            self.subs.len()
        );
        let frames: Vec<StompFrame> = self
            .subs
            .iter()
            .map(|(id, entry)| StompFrame::subscribe(id, &entry.destination))
            .collect();
        for frame in frames {
            self.send_frame(transport, frame).await?;
        }
        Ok(())
    }

    async fn close_session(&self, transport: &mut dyn Transport) {
        for id in self.subs.keys() {
            let _ = self.send_frame(transport, StompFrame::unsubscribe(id)).await;
        }
        let _ = self.send_frame(transport, StompFrame::disconnect()).await;
        transport.close().await;
    }

    async fn send_frame(&self, transport: &mut dyn Transport, frame: StompFrame) -> Result<()> {
        let send_timeout = self.timeouts.send_timeout;
        if ChatLinkTimeouts::is_no_timeout(send_timeout) {
            return transport.send(frame).await;
        }
        match tokio::time::timeout(send_timeout, transport.send(frame)).await {
            Ok(result) => result,
            Err(_) => Err(ChatLinkError::TimeoutError(format!(
                "Frame write timed out ({:?})",
                send_timeout
            ))),
        }
    }

    fn register(&mut self, destination: String, frame_tx: mpsc::Sender<InboundFrame>) -> String {
        let id = format!("sub-{}", self.next_sub_id);
        self.next_sub_id += 1;
        self.subs.insert(
            id.clone(),
            SubEntry {
                destination,
                frame_tx,
            },
        );
        id
    }

    fn lost(&mut self, reason: DisconnectReason) {
        log::warn!("[chat-link] Connection lost: {}", reason);
        self.event_handlers.emit_disconnect(reason);
    }

    fn reset(&mut self) {
        self.subs.clear();
        self.reply_waiters(Err(ChatLinkError::ConnectError(
            "Disconnected by client".to_string(),
        )));
        self.set_state(ConnectionState::Disconnected);
    }

    fn reply_waiters(&mut self, result: Result<()>) {
        for tx in self.waiters.drain(..) {
            let _ = tx.send(result.clone());
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            log::debug!("[chat-link] Connection state: {} -> {}", current, state);
            *current = state.clone();
            true
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct RefusingConnector {
        attempts: Arc<AtomicU32>,
    }

    #[async_trait]
    impl Connector for RefusingConnector {
        async fn connect(&self) -> Result<Box<dyn Transport>> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(ChatLinkError::ConnectError("connection refused".to_string()))
        }
    }

    fn refusing_manager() -> (ConnectionManager, Arc<AtomicU32>) {
        let attempts = Arc::new(AtomicU32::new(0));
        let connector = Arc::new(RefusingConnector {
            attempts: attempts.clone(),
        });
        let manager = ConnectionManager::new(
            connector,
            ConnectionOptions::default(),
            ChatLinkTimeouts::fast(),
            EventHandlers::new(),
        );
        (manager, attempts)
    }

    #[tokio::test]
    async fn test_failed_handshake_allows_retry() {
        let (manager, attempts) = refusing_manager();
        assert_eq!(manager.state(), ConnectionState::Disconnected);

        let err = manager.ensure_connected().await.unwrap_err();
        assert!(matches!(err, ChatLinkError::ConnectError(_)));
        assert!(matches!(manager.state(), ConnectionState::Failed { .. }));

        assert!(manager.ensure_connected().await.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_publish_requires_connection() {
        let (manager, attempts) = refusing_manager();
        let err = manager
            .publish("/app/chat.send", "{}".to_string())
            .await
            .unwrap_err();
        assert_eq!(err, ChatLinkError::NotConnected);
        assert_eq!(attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let (manager, _attempts) = refusing_manager();
        manager.disconnect().await;
        manager.disconnect().await;
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::Connected.to_string(), "connected");
        assert_eq!(
            ConnectionState::Reconnecting { attempt: 2 }.to_string(),
            "reconnecting (attempt 2)"
        );
    }
}
