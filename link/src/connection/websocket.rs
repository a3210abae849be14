//! STOMP over WebSocket, built on `tokio-tungstenite`.
//!
//! [`WebSocketConnector`] resolves the endpoint URL, opens the socket and
//! performs the `CONNECT`/`CONNECTED` exchange. The resulting
//! [`WebSocketTransport`] splits the socket into a reader task (decodes
//! frames, enforces the incoming heart-beat deadline) and a writer task
//! (serializes outbound frames, emits EOL heart-beats).

use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant as TokioInstant;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream as TungsteniteStream};
use url::Url;

use super::transport::{Connector, Transport};
use super::FAR_FUTURE;
use crate::error::{ChatLinkError, Result};
use crate::event_handlers::{ConnectionError, EventHandlers};
use crate::models::ConnectionOptions;
use crate::stomp::{HeartBeat, StompCommand, StompFrame};
use crate::timeouts::ChatLinkTimeouts;

pub type WebSocketStream = TungsteniteStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WebSocketStream, Message>;
type WsSource = SplitStream<WebSocketStream>;

/// Maximum inbound text message size (16 MiB).
const MAX_WS_TEXT_MESSAGE_BYTES: usize = 16 << 20;

/// Buffered frames between the reader task and the connection task.
const INBOUND_CHANNEL_CAPACITY: usize = 1024;

/// Turn a base URL into the WebSocket endpoint URL.
///
/// `http` maps to `ws` and `https` to `wss`; `ws_path` is appended to
/// whatever path the base URL already has.
pub fn resolve_ws_url(base_url: &str, ws_path: &str) -> Result<Url> {
    let base = Url::parse(base_url.trim()).map_err(|e| {
        ChatLinkError::ConfigurationError(format!("Invalid base_url '{}': {}", base_url, e))
    })?;

    if base.host_str().is_none() {
        return Err(ChatLinkError::ConfigurationError(
            "base_url must include a host".to_string(),
        ));
    }
    if !base.username().is_empty() || base.password().is_some() {
        return Err(ChatLinkError::ConfigurationError(
            "base_url must not include username/password credentials".to_string(),
        ));
    }

    let ws_scheme = match base.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(ChatLinkError::ConfigurationError(format!(
                "Unsupported base_url scheme '{}'; expected http(s) or ws(s)",
                other
            )));
        },
    };

    let mut ws_url = base.clone();
    ws_url.set_scheme(ws_scheme).map_err(|_| {
        ChatLinkError::ConfigurationError("Failed to set WebSocket URL scheme".to_string())
    })?;
    let path = format!(
        "{}/{}",
        base.path().trim_end_matches('/'),
        ws_path.trim_start_matches('/')
    );
    ws_url.set_path(&path);
    ws_url.set_query(None);
    ws_url.set_fragment(None);
    Ok(ws_url)
}

/// Opens STOMP sessions over WebSocket.
pub struct WebSocketConnector {
    url: Url,
    host: String,
    heart_beat: HeartBeat,
    timeouts: ChatLinkTimeouts,
    event_handlers: EventHandlers,
}

impl WebSocketConnector {
    pub fn new(
        base_url: &str,
        options: &ConnectionOptions,
        timeouts: ChatLinkTimeouts,
        event_handlers: EventHandlers,
    ) -> Result<Self> {
        let url = resolve_ws_url(base_url, &options.ws_path)?;
        let host = url.host_str().unwrap_or("localhost").to_string();
        Ok(Self {
            url,
            host,
            heart_beat: HeartBeat::new(options.heartbeat_outgoing_ms, options.heartbeat_incoming_ms),
            timeouts,
            event_handlers,
        })
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn open_socket(&self) -> Result<WebSocketStream> {
        let connect = tokio_tungstenite::connect_async(self.url.as_str());
        let result = if ChatLinkTimeouts::is_no_timeout(self.timeouts.connection_timeout) {
            connect.await
        } else {
            match tokio::time::timeout(self.timeouts.connection_timeout, connect).await {
                Ok(result) => result,
                Err(_) => {
                    let msg = format!("Connection timeout ({:?})", self.timeouts.connection_timeout);
                    self.event_handlers.emit_error(ConnectionError::new(&msg, true));
                    return Err(ChatLinkError::ConnectError(msg));
                },
            }
        };

        match result {
            Ok((stream, _response)) => Ok(stream),
            Err(tokio_tungstenite::tungstenite::Error::Http(response)) => {
                let msg = format!("WebSocket upgrade rejected with HTTP {}", response.status().as_u16());
                self.event_handlers.emit_error(ConnectionError::new(&msg, false));
                Err(ChatLinkError::ConnectError(msg))
            },
            Err(e) => {
                let msg = format!("Connection failed: {}", e);
                self.event_handlers.emit_error(ConnectionError::new(&msg, true));
                Err(ChatLinkError::ConnectError(msg))
            },
        }
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self) -> Result<Box<dyn Transport>> {
        log::debug!("[chat-link] Opening WebSocket to {}", self.url);
        let socket = self.open_socket().await?;
        let (mut sink, mut source) = socket.split();

        let connect_frame = StompFrame::connect(&self.host, self.heart_beat).encode();
        self.event_handlers.emit_send(&connect_frame);
        sink.send(Message::Text(connect_frame.into()))
            .await
            .map_err(|e| ChatLinkError::ConnectError(format!("Failed to send CONNECT: {}", e)))?;

        let server_beat = match tokio::time::timeout(
            self.timeouts.handshake_timeout,
            await_connected(&mut source, &self.event_handlers),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(ChatLinkError::ConnectError(format!(
                    "STOMP handshake timeout ({:?})",
                    self.timeouts.handshake_timeout
                )));
            },
        };

        let effective = HeartBeat::negotiate(self.heart_beat, server_beat);
        log::info!(
            "[chat-link] STOMP session established with {} (heart-beat {})",
            self.host,
            effective.header_value()
        );
        Ok(Box::new(WebSocketTransport::start(
            sink,
            source,
            effective,
            self.event_handlers.clone(),
        )))
    }
}

async fn await_connected(source: &mut WsSource, handlers: &EventHandlers) -> Result<HeartBeat> {
    while let Some(message) = source.next().await {
        let message = message
            .map_err(|e| ChatLinkError::ConnectError(format!("WebSocket error during handshake: {}", e)))?;
        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        handlers.emit_receive(text.as_str());
        let frame = match StompFrame::decode(text.as_str()) {
            Ok(Some(frame)) => frame,
            Ok(None) => continue,
            Err(e) => return Err(ChatLinkError::ConnectError(e.to_string())),
        };
        match frame.command {
            StompCommand::Connected => {
                return match frame.header("heart-beat") {
                    Some(value) => HeartBeat::parse(value)
                        .map_err(|e| ChatLinkError::ConnectError(e.to_string())),
                    None => Ok(HeartBeat::default()),
                };
            },
            StompCommand::Error => {
                return Err(ChatLinkError::ConnectError(frame.error_message()));
            },
            other => log::debug!("[chat-link] Ignoring {} before CONNECTED", other),
        }
    }
    Err(ChatLinkError::ConnectError(
        "Connection closed during STOMP handshake".to_string(),
    ))
}

struct Outbound {
    text: String,
    done_tx: oneshot::Sender<Result<()>>,
}

/// A live STOMP-over-WebSocket session.
pub struct WebSocketTransport {
    out_tx: Option<mpsc::Sender<Outbound>>,
    in_rx: mpsc::Receiver<Result<StompFrame>>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl WebSocketTransport {
    fn start(sink: WsSink, source: WsSource, heart_beat: HeartBeat, handlers: EventHandlers) -> Self {
        let (out_tx, out_rx) = mpsc::channel(64);
        let (in_tx, in_rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);
        let reader = tokio::spawn(read_loop(
            source,
            in_tx,
            heart_beat.receive_deadline(),
            handlers.clone(),
        ));
        let writer = tokio::spawn(write_loop(sink, out_rx, heart_beat.send_interval(), handlers));
        Self {
            out_tx: Some(out_tx),
            in_rx,
            reader,
            writer,
        }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, frame: StompFrame) -> Result<()> {
        let out_tx = self
            .out_tx
            .as_ref()
            .ok_or_else(|| ChatLinkError::WebSocketError("Transport is closed".to_string()))?;
        let (done_tx, done_rx) = oneshot::channel();
        out_tx
            .send(Outbound {
                text: frame.encode(),
                done_tx,
            })
            .await
            .map_err(|_| ChatLinkError::WebSocketError("Writer task is not running".to_string()))?;
        done_rx.await.map_err(|_| {
            ChatLinkError::WebSocketError("Writer task exited before confirming write".to_string())
        })?
    }

    async fn next_frame(&mut self) -> Option<Result<StompFrame>> {
        self.in_rx.recv().await
    }

    async fn close(&mut self) {
        // Dropping the sender makes the writer close the socket.
        if self.out_tx.take().is_some() {
            let _ = tokio::time::timeout(Duration::from_secs(1), &mut self.writer).await;
        }
        self.reader.abort();
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}

async fn read_loop(
    mut source: WsSource,
    in_tx: mpsc::Sender<Result<StompFrame>>,
    deadline: Option<Duration>,
    handlers: EventHandlers,
) {
    loop {
        let next = match deadline {
            Some(limit) => match tokio::time::timeout(limit, source.next()).await {
                Ok(next) => next,
                Err(_) => {
                    log::warn!("[chat-link] No data from broker within {:?}", limit);
                    let _ = in_tx
                        .send(Err(ChatLinkError::TimeoutError(format!(
                            "No heart-beat from broker within {:?}",
                            limit
                        ))))
                        .await;
                    return;
                },
            },
            None => source.next().await,
        };

        match next {
            Some(Ok(Message::Text(text))) => {
                if text.len() > MAX_WS_TEXT_MESSAGE_BYTES {
                    log::warn!("[chat-link] Text message too large ({} bytes)", text.len());
                    continue;
                }
                handlers.emit_receive(text.as_str());
                for decoded in StompFrame::decode_all(text.as_str()) {
                    match decoded {
                        Ok(frame) => {
                            if in_tx.send(Ok(frame)).await.is_err() {
                                return;
                            }
                        },
                        Err(e) => log::warn!("[chat-link] Dropping undecodable frame: {}", e),
                    }
                }
            },
            Some(Ok(Message::Close(frame))) => {
                log::debug!("[chat-link] Broker closed the socket: {:?}", frame);
                return;
            },
            Some(Ok(_)) => {},
            Some(Err(e)) => {
                let _ = in_tx.send(Err(e.into())).await;
                return;
            },
            None => return,
        }
    }
}

async fn write_loop(
    mut sink: WsSink,
    mut out_rx: mpsc::Receiver<Outbound>,
    interval: Option<Duration>,
    handlers: EventHandlers,
) {
    let period = interval.unwrap_or(FAR_FUTURE);
    let mut next_beat = TokioInstant::now() + period;

    loop {
        let beat = tokio::time::sleep_until(next_beat);
        tokio::pin!(beat);

        tokio::select! {
            biased;

            outbound = out_rx.recv() => {
                let Some(Outbound { text, done_tx }) = outbound else {
                    let _ = sink.close().await;
                    return;
                };
                handlers.emit_send(&text);
                let result = sink
                    .send(Message::Text(text.into()))
                    .await
                    .map_err(ChatLinkError::from);
                let failed = result.is_err();
                let _ = done_tx.send(result);
                if failed {
                    return;
                }
                next_beat = TokioInstant::now() + period;
            }

            _ = &mut beat, if interval.is_some() => {
                if let Err(e) = sink.send(Message::Text(String::from("\n").into())).await {
                    log::warn!("[chat-link] Heart-beat write failed: {}", e);
                    return;
                }
                next_beat = TokioInstant::now() + period;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_ws_url_schemes() {
        assert_eq!(
            resolve_ws_url("http://localhost:8080", "/ws").unwrap().as_str(),
            "ws://localhost:8080/ws"
        );
        assert_eq!(
            resolve_ws_url("https://chat.example.com", "/ws").unwrap().as_str(),
            "wss://chat.example.com/ws"
        );
    }

    #[test]
    fn test_resolve_ws_url_keeps_base_path() {
        assert_eq!(
            resolve_ws_url("https://example.com/api/", "ws").unwrap().as_str(),
            "wss://example.com/api/ws"
        );
        assert_eq!(
            resolve_ws_url("http://example.com/api?x=1#frag", "/ws").unwrap().as_str(),
            "ws://example.com/api/ws"
        );
    }

    #[test]
    fn test_resolve_ws_url_rejects_bad_input() {
        assert!(matches!(
            resolve_ws_url("ftp://example.com", "/ws"),
            Err(ChatLinkError::ConfigurationError(_))
        ));
        assert!(resolve_ws_url("not a url", "/ws").is_err());
        assert!(resolve_ws_url("http://user:pw@example.com", "/ws").is_err());
    }

    #[test]
    fn test_connector_uses_configured_path() {
        let options = ConnectionOptions::default().with_ws_path("/stomp");
        let connector = WebSocketConnector::new(
            "http://localhost:8080",
            &options,
            ChatLinkTimeouts::fast(),
            EventHandlers::new(),
        )
        .unwrap();
        assert_eq!(connector.url(), "ws://localhost:8080/stomp");
        assert_eq!(connector.heart_beat, HeartBeat::new(4000, 4000));
    }
}
