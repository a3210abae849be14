//! Error types for chat-cli
//!
//! Wraps [`ChatLinkError`] and adds the failures that only exist in the
//! terminal client (config files, input parsing, stdin).

use chat_link::ChatLinkError;
use std::fmt;

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CLIError>;

/// Errors that can occur in the CLI
#[derive(Debug)]
pub enum CLIError {
    /// Error from the chat-link library
    LinkError(ChatLinkError),

    /// Configuration file or flag error
    ConfigurationError(String),

    /// File or terminal I/O error
    FileError(String),

    /// Invalid command syntax
    ParseError(String),

    /// Logging could not be initialized
    LoggingError(String),

    /// User ended the session
    Cancelled,
}

impl CLIError {
    fn format_link_error(err: &ChatLinkError) -> String {
        match err {
            ChatLinkError::ConnectError(msg) => {
                format!("Cannot reach the chat server: {}", Self::clean_nested_message(msg))
            },
            ChatLinkError::NotConnected => "Not connected; waiting for the connection".to_string(),
            ChatLinkError::SendFailed(msg) => {
                format!("Message not sent: {}", Self::clean_nested_message(msg))
            },
            ChatLinkError::RateLimited { retry_in } => {
                format!("Slow down, try again in {}ms", retry_in.as_millis())
            },
            ChatLinkError::EmptyMessage => "Nothing to send".to_string(),
            ChatLinkError::ConversationNotOpen(chat_id) => {
                format!("Chat {} is not open (use /open {})", chat_id, chat_id)
            },
            ChatLinkError::ServerRateLimited { retry_after } => {
                format!("Server is busy, retry after {}s", retry_after.as_secs())
            },
            ChatLinkError::ServerError {
                status_code,
                message,
            } => format!("Server error ({}): {}", status_code, message),
            other => other.to_string(),
        }
    }

    fn clean_nested_message(message: &str) -> String {
        let mut cleaned = message.trim();
        let prefixes = [
            "Connection failed:",
            "WebSocket error:",
            "Failed to send message:",
        ];

        loop {
            let mut stripped = false;
            for prefix in &prefixes {
                if let Some(rest) = cleaned.strip_prefix(prefix) {
                    cleaned = rest.trim_start();
                    stripped = true;
                    break;
                }
            }

            if !stripped {
                break;
            }
        }

        cleaned.to_string()
    }
}

impl fmt::Display for CLIError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CLIError::LinkError(e) => write!(f, "{}", Self::format_link_error(e)),
            CLIError::ConfigurationError(msg) => write!(f, "Configuration error: {}", msg),
            CLIError::FileError(msg) => write!(f, "File error: {}", msg),
            CLIError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            CLIError::LoggingError(msg) => write!(f, "Logging error: {}", msg),
            CLIError::Cancelled => write!(f, "Operation cancelled"),
        }
    }
}

impl std::error::Error for CLIError {}

impl From<ChatLinkError> for CLIError {
    fn from(err: ChatLinkError) -> Self {
        CLIError::LinkError(err)
    }
}

impl From<std::io::Error> for CLIError {
    fn from(err: std::io::Error) -> Self {
        CLIError::FileError(err.to_string())
    }
}

impl From<toml::de::Error> for CLIError {
    fn from(err: toml::de::Error) -> Self {
        CLIError::ConfigurationError(format!("TOML parse error: {}", err))
    }
}
