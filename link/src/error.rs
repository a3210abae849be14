//! Error types for chat-link.
//!
//! Every fallible operation in the crate returns [`Result<T>`], an alias over
//! [`ChatLinkError`]. Errors are `Clone` because a single connection attempt
//! may be awaited by many callers at once and each of them receives the same
//! outcome.

use std::time::Duration;
use thiserror::Error;

/// Result type for chat-link operations.
pub type Result<T> = std::result::Result<T, ChatLinkError>;

/// Errors that can occur in the realtime synchronization core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatLinkError {
    /// The transport handshake failed. The next `ensure_connected` retries.
    #[error("Connection failed: {0}")]
    ConnectError(String),

    /// A publish was attempted while the transport is not connected.
    #[error("Not connected to the realtime endpoint")]
    NotConnected,

    /// A publish was rejected; optimistic state has been rolled back.
    #[error("Failed to send message: {0}")]
    SendFailed(String),

    /// Local send throttle: the previous send was accepted too recently.
    #[error("Sending too fast, retry in {}ms", .retry_in.as_millis())]
    RateLimited { retry_in: Duration },

    /// The message content was empty after trimming.
    #[error("Message is empty")]
    EmptyMessage,

    /// An inbound payload could not be decoded.
    #[error("Malformed frame on {channel}: {reason}")]
    MalformedFrame { channel: String, reason: String },

    /// History fetch failed (network or decoding).
    #[error("Failed to fetch history: {0}")]
    FetchFailed(String),

    /// The server answered 429 twice in a row.
    #[error("Server rate limit exceeded (retry after {}s)", .retry_after.as_secs())]
    ServerRateLimited { retry_after: Duration },

    /// The server answered with a non-success status.
    #[error("Server error ({status_code}): {message}")]
    ServerError { status_code: u16, message: String },

    /// The operation targets a conversation that is not the open one.
    #[error("Conversation {0} is not open")]
    ConversationNotOpen(i64),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Timeout: {0}")]
    TimeoutError(String),

    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl ChatLinkError {
    /// Whether the failure is transient, i.e. retrying the same operation
    /// later may succeed without any change on the caller's side.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ChatLinkError::ConnectError(_)
                | ChatLinkError::NotConnected
                | ChatLinkError::SendFailed(_)
                | ChatLinkError::RateLimited { .. }
                | ChatLinkError::FetchFailed(_)
                | ChatLinkError::ServerRateLimited { .. }
                | ChatLinkError::TimeoutError(_)
                | ChatLinkError::WebSocketError(_)
        )
    }
}

impl From<serde_json::Error> for ChatLinkError {
    fn from(err: serde_json::Error) -> Self {
        ChatLinkError::SerializationError(err.to_string())
    }
}

impl From<reqwest::Error> for ChatLinkError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ChatLinkError::TimeoutError(err.to_string())
        } else if err.is_decode() {
            ChatLinkError::SerializationError(err.to_string())
        } else {
            ChatLinkError::FetchFailed(err.to_string())
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ChatLinkError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        ChatLinkError::WebSocketError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ChatLinkError::NotConnected.is_transient());
        assert!(ChatLinkError::FetchFailed("boom".into()).is_transient());
        assert!(ChatLinkError::RateLimited {
            retry_in: Duration::from_millis(300)
        }
        .is_transient());
        assert!(!ChatLinkError::EmptyMessage.is_transient());
        assert!(!ChatLinkError::ConfigurationError("x".into()).is_transient());
        assert!(!ChatLinkError::ConversationNotOpen(7).is_transient());
    }

    #[test]
    fn test_display_messages() {
        let err = ChatLinkError::RateLimited {
            retry_in: Duration::from_millis(300),
        };
        assert_eq!(err.to_string(), "Sending too fast, retry in 300ms");

        let err = ChatLinkError::ServerError {
            status_code: 503,
            message: "unavailable".into(),
        };
        assert_eq!(err.to_string(), "Server error (503): unavailable");
    }

    #[test]
    fn test_from_serde_json() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: ChatLinkError = parse_err.into();
        assert!(matches!(err, ChatLinkError::SerializationError(_)));
    }
}
