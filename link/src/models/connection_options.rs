use serde::{Deserialize, Serialize};

/// Connection-level options for the shared realtime transport.
///
/// These options control:
/// - Automatic reconnection after the transport is lost
/// - The fixed delay between reconnect attempts
/// - STOMP heart-beat intervals
/// - The endpoint path appended to the base URL
///
/// # Example
///
/// ```rust
/// use chat_link::ConnectionOptions;
///
/// let options = ConnectionOptions::default()
///     .with_auto_reconnect(true)
///     .with_reconnect_delay_ms(2000)
///     .with_max_reconnect_attempts(Some(10));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionOptions {
    /// Reconnect automatically when the transport signals terminal failure.
    /// Default: true
    #[serde(default = "default_auto_reconnect")]
    pub auto_reconnect: bool,

    /// Delay in milliseconds before each reconnect attempt. The delay is
    /// fixed; there is no backoff.
    /// Default: 5000ms
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Maximum number of consecutive failed reconnect attempts before the
    /// connection is marked `Failed`.
    /// Default: None (infinite retries)
    #[serde(default)]
    pub max_reconnect_attempts: Option<u32>,

    /// Heart-beat interval the client promises to send, in milliseconds.
    /// Set to 0 to disable. Default: 4000ms
    #[serde(default = "default_heartbeat_ms")]
    pub heartbeat_outgoing_ms: u64,

    /// Heart-beat interval the client wants to receive, in milliseconds.
    /// Set to 0 to disable. Default: 4000ms
    #[serde(default = "default_heartbeat_ms")]
    pub heartbeat_incoming_ms: u64,

    /// Endpoint path appended to the base URL.
    /// Default: `/ws`
    #[serde(default = "default_ws_path")]
    pub ws_path: String,
}

fn default_auto_reconnect() -> bool {
    true
}

fn default_reconnect_delay_ms() -> u64 {
    5000
}

fn default_heartbeat_ms() -> u64 {
    4000
}

fn default_ws_path() -> String {
    "/ws".to_string()
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            auto_reconnect: default_auto_reconnect(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            max_reconnect_attempts: None,
            heartbeat_outgoing_ms: default_heartbeat_ms(),
            heartbeat_incoming_ms: default_heartbeat_ms(),
            ws_path: default_ws_path(),
        }
    }
}

impl ConnectionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether to automatically reconnect on connection loss
    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    /// Set the delay before each reconnect attempt (in milliseconds)
    pub fn with_reconnect_delay_ms(mut self, delay_ms: u64) -> Self {
        self.reconnect_delay_ms = delay_ms;
        self
    }

    /// Set the maximum number of reconnection attempts.
    /// Pass None for infinite retries.
    pub fn with_max_reconnect_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_reconnect_attempts = max_attempts;
        self
    }

    /// Set both heart-beat intervals (in milliseconds). 0 disables.
    pub fn with_heartbeat_ms(mut self, outgoing_ms: u64, incoming_ms: u64) -> Self {
        self.heartbeat_outgoing_ms = outgoing_ms;
        self.heartbeat_incoming_ms = incoming_ms;
        self
    }

    /// Set the endpoint path appended to the base URL.
    pub fn with_ws_path(mut self, path: impl Into<String>) -> Self {
        self.ws_path = path.into();
        self
    }
}
