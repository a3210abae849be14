//! Timeout configuration for chat-link operations.
//!
//! Centralizes the timeouts used by the transport handshake, outbound
//! publishes and history fetches.

use std::time::Duration;

/// Timeout configuration for chat-link operations.
///
/// # Examples
///
/// ```rust
/// use chat_link::ChatLinkTimeouts;
/// use std::time::Duration;
///
/// // Defaults are fine for most deployments
/// let timeouts = ChatLinkTimeouts::default();
///
/// // Slow network
/// let timeouts = ChatLinkTimeouts::builder()
///     .connection_timeout(Duration::from_secs(30))
///     .fetch_timeout(Duration::from_secs(60))
///     .build();
///
/// // Local development
/// let timeouts = ChatLinkTimeouts::fast();
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatLinkTimeouts {
    /// Timeout for opening the WebSocket (TCP + TLS + upgrade).
    /// Default: 10 seconds
    pub connection_timeout: Duration,

    /// Timeout for the STOMP `CONNECT` → `CONNECTED` exchange.
    /// Default: 5 seconds
    pub handshake_timeout: Duration,

    /// Timeout for writing one frame to the transport.
    /// Default: 10 seconds
    pub send_timeout: Duration,

    /// Timeout for a single history page request.
    /// Default: 30 seconds
    pub fetch_timeout: Duration,
}

impl Default for ChatLinkTimeouts {
    fn default() -> Self {
        Self {
            connection_timeout: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(5),
            send_timeout: Duration::from_secs(10),
            fetch_timeout: Duration::from_secs(30),
        }
    }
}

impl ChatLinkTimeouts {
    /// Create a new builder for custom timeout configuration.
    pub fn builder() -> ChatLinkTimeoutsBuilder {
        ChatLinkTimeoutsBuilder::new()
    }

    /// Short timeouts for localhost servers.
    pub fn fast() -> Self {
        Self {
            connection_timeout: Duration::from_secs(2),
            handshake_timeout: Duration::from_secs(2),
            send_timeout: Duration::from_secs(2),
            fetch_timeout: Duration::from_secs(5),
        }
    }

    /// Check if a duration represents "no timeout" (zero or very large).
    pub fn is_no_timeout(duration: Duration) -> bool {
        duration.is_zero() || duration > Duration::from_secs(86400 * 365)
    }
}

/// Builder for [`ChatLinkTimeouts`].
#[derive(Debug, Clone)]
pub struct ChatLinkTimeoutsBuilder {
    timeouts: ChatLinkTimeouts,
}

impl ChatLinkTimeoutsBuilder {
    fn new() -> Self {
        Self {
            timeouts: ChatLinkTimeouts::default(),
        }
    }

    /// Set the connection timeout (TCP + TLS + WebSocket upgrade).
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.connection_timeout = timeout;
        self
    }

    /// Set the connection timeout in seconds.
    pub fn connection_timeout_secs(self, secs: u64) -> Self {
        self.connection_timeout(Duration::from_secs(secs))
    }

    /// Set the STOMP handshake timeout.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.handshake_timeout = timeout;
        self
    }

    /// Set the frame send timeout.
    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.send_timeout = timeout;
        self
    }

    /// Set the history fetch timeout.
    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.fetch_timeout = timeout;
        self
    }

    /// Set the history fetch timeout in seconds.
    pub fn fetch_timeout_secs(self, secs: u64) -> Self {
        self.fetch_timeout(Duration::from_secs(secs))
    }

    /// Build the timeout configuration.
    pub fn build(self) -> ChatLinkTimeouts {
        self.timeouts
    }
}
