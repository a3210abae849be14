//! Connection lifecycle event handlers.
//!
//! Callback hooks for observing the shared realtime connection:
//!
//! - [`on_connect`](EventHandlers::on_connect): the STOMP session is established
//! - [`on_disconnect`](EventHandlers::on_disconnect): the session closed
//! - [`on_reconnecting`](EventHandlers::on_reconnecting): a reconnect attempt is scheduled
//! - [`on_error`](EventHandlers::on_error): connection or protocol errors
//! - [`on_receive`](EventHandlers::on_receive) / [`on_send`](EventHandlers::on_send):
//!   debug hooks for every raw frame
//!
//! # Example
//!
//! ```rust,no_run
//! use chat_link::{ChatLinkClient, EventHandlers, UserRef};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let handlers = EventHandlers::new()
//!     .on_connect(|| println!("connected"))
//!     .on_disconnect(|reason| println!("disconnected: {}", reason))
//!     .on_reconnecting(|attempt| println!("reconnecting (attempt {})", attempt));
//!
//! let client = ChatLinkClient::builder()
//!     .base_url("http://localhost:8080")
//!     .local_user(UserRef::new(1, "alice"))
//!     .event_handlers(handlers)
//!     .build()?;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::Arc;

/// Reason for a disconnect event.
#[derive(Debug, Clone)]
pub struct DisconnectReason {
    /// Human-readable description of why the connection closed.
    pub message: String,
    /// WebSocket close code, if available (e.g. 1000 = normal, 1006 = abnormal).
    pub code: Option<u16>,
}

impl DisconnectReason {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    pub fn with_code(message: impl Into<String>, code: u16) -> Self {
        Self {
            message: message.into(),
            code: Some(code),
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(code) = self.code {
            write!(f, "{} (code: {})", self.message, code)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

/// Error information passed to the `on_error` handler.
#[derive(Debug, Clone)]
pub struct ConnectionError {
    pub message: String,
    /// Whether auto-reconnect may recover from this error.
    pub recoverable: bool,
}

impl ConnectionError {
    pub fn new(message: impl Into<String>, recoverable: bool) -> Self {
        Self {
            message: message.into(),
            recoverable,
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

pub type OnConnectCallback = Arc<dyn Fn() + Send + Sync>;
pub type OnDisconnectCallback = Arc<dyn Fn(DisconnectReason) + Send + Sync>;
pub type OnReconnectingCallback = Arc<dyn Fn(u32) + Send + Sync>;
pub type OnErrorCallback = Arc<dyn Fn(ConnectionError) + Send + Sync>;
pub type OnReceiveCallback = Arc<dyn Fn(&str) + Send + Sync>;
pub type OnSendCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Connection lifecycle event handlers.
///
/// All handlers are optional. Handlers run on the connection task, so they
/// must return quickly.
#[derive(Clone, Default)]
pub struct EventHandlers {
    pub(crate) on_connect: Option<OnConnectCallback>,
    pub(crate) on_disconnect: Option<OnDisconnectCallback>,
    pub(crate) on_reconnecting: Option<OnReconnectingCallback>,
    pub(crate) on_error: Option<OnErrorCallback>,
    pub(crate) on_receive: Option<OnReceiveCallback>,
    pub(crate) on_send: Option<OnSendCallback>,
}

impl fmt::Debug for EventHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandlers")
            .field("on_connect", &self.on_connect.is_some())
            .field("on_disconnect", &self.on_disconnect.is_some())
            .field("on_reconnecting", &self.on_reconnecting.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_receive", &self.on_receive.is_some())
            .field("on_send", &self.on_send.is_some())
            .finish()
    }
}

impl EventHandlers {
    /// Create a new empty `EventHandlers` (no callbacks registered).
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback invoked when the STOMP session is established,
    /// including after every successful reconnect.
    pub fn on_connect(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_connect = Some(Arc::new(f));
        self
    }

    /// Register a callback invoked when the session closes.
    pub fn on_disconnect(mut self, f: impl Fn(DisconnectReason) + Send + Sync + 'static) -> Self {
        self.on_disconnect = Some(Arc::new(f));
        self
    }

    /// Register a callback invoked before each reconnect attempt, with the
    /// 1-based attempt number.
    pub fn on_reconnecting(mut self, f: impl Fn(u32) + Send + Sync + 'static) -> Self {
        self.on_reconnecting = Some(Arc::new(f));
        self
    }

    /// Register a callback invoked when a connection error occurs.
    ///
    /// # Example
    /// ```rust
    /// use chat_link::EventHandlers;
    ///
    /// let handlers = EventHandlers::new()
    ///     .on_error(|err| eprintln!("error (recoverable={}): {}", err.recoverable, err));
    /// ```
    pub fn on_error(mut self, f: impl Fn(ConnectionError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// Debug hook: receives every raw inbound frame before parsing.
    pub fn on_receive(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_receive = Some(Arc::new(f));
        self
    }

    /// Debug hook: receives every raw outbound frame.
    pub fn on_send(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_send = Some(Arc::new(f));
        self
    }

    /// Returns `true` if any handler is registered.
    pub fn has_any(&self) -> bool {
        self.on_connect.is_some()
            || self.on_disconnect.is_some()
            || self.on_reconnecting.is_some()
            || self.on_error.is_some()
            || self.on_receive.is_some()
            || self.on_send.is_some()
    }

    // ---------------------------------------------------------------
    // Internal dispatch helpers
    // ---------------------------------------------------------------

    pub(crate) fn emit_connect(&self) {
        if let Some(cb) = &self.on_connect {
            cb();
        }
    }

    pub(crate) fn emit_disconnect(&self, reason: DisconnectReason) {
        if let Some(cb) = &self.on_disconnect {
            cb(reason);
        }
    }

    pub(crate) fn emit_reconnecting(&self, attempt: u32) {
        if let Some(cb) = &self.on_reconnecting {
            cb(attempt);
        }
    }

    pub(crate) fn emit_error(&self, error: ConnectionError) {
        if let Some(cb) = &self.on_error {
            cb(error);
        }
    }

    pub(crate) fn emit_receive(&self, raw: &str) {
        if let Some(cb) = &self.on_receive {
            cb(raw);
        }
    }

    pub(crate) fn emit_send(&self, raw: &str) {
        if let Some(cb) = &self.on_send {
            cb(raw);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_empty_handlers() {
        let handlers = EventHandlers::new();
        assert!(!handlers.has_any());
        // Emitting with nothing registered is a no-op.
        handlers.emit_connect();
        handlers.emit_reconnecting(1);
    }

    #[test]
    fn test_reconnecting_receives_attempt() {
        let last = Arc::new(AtomicU32::new(0));
        let seen = last.clone();
        let handlers = EventHandlers::new().on_reconnecting(move |attempt| {
            seen.store(attempt, Ordering::SeqCst);
        });
        assert!(handlers.has_any());
        handlers.emit_reconnecting(3);
        assert_eq!(last.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_disconnect_reason_display() {
        assert_eq!(DisconnectReason::new("bye").to_string(), "bye");
        assert_eq!(
            DisconnectReason::with_code("going away", 1001).to_string(),
            "going away (code: 1001)"
        );
    }
}
