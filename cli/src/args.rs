use clap::Parser;
use std::path::PathBuf;

macro_rules! version_string {
    () => {
        concat!(
            env!("CARGO_PKG_VERSION"),
            "\nCommit: ",
            env!("GIT_COMMIT_HASH"),
            " (",
            env!("GIT_BRANCH"),
            ")"
        )
    };
}

/// chat - terminal client for a chat-link server
#[derive(Parser, Debug, Clone)]
#[command(name = "chat")]
#[command(version = version_string!())]
#[command(about = "Interactive group chat in the terminal", long_about = None)]
pub struct Cli {
    /// Realtime endpoint base URL (e.g., http://localhost:8080)
    #[arg(short = 'u', long = "url", env = "CHAT_LINK_URL")]
    pub url: Option<String>,

    /// REST base URL for history (defaults to --url)
    #[arg(long = "api-url", env = "CHAT_LINK_API_URL")]
    pub api_url: Option<String>,

    /// Id of the local user
    #[arg(long = "user-id")]
    pub user_id: Option<i64>,

    /// Username of the local user
    #[arg(long = "username")]
    pub username: Option<String>,

    /// Conversation to open after connecting
    #[arg(short = 'c', long = "chat")]
    pub chat: Option<i64>,

    /// Chats to receive notifications for (repeatable)
    #[arg(short = 'w', long = "watch", value_name = "CHAT_ID")]
    pub watch: Vec<i64>,

    /// Disable automatic reconnection
    #[arg(long = "no-reconnect")]
    pub no_reconnect: bool,

    /// Disable colored output
    #[arg(long = "no-color")]
    pub no_color: bool,

    /// Configuration file path
    #[arg(long = "config", default_value = "~/.chat-link/config.toml")]
    pub config: PathBuf,

    /// Enable verbose logging
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Connection timeout in seconds (TCP + TLS + upgrade; config default: 10)
    #[arg(long = "connection-timeout", value_name = "SECONDS")]
    pub connection_timeout: Option<u64>,

    /// History request timeout in seconds (config default: 30)
    #[arg(long = "fetch-timeout", value_name = "SECONDS")]
    pub fetch_timeout: Option<u64>,

    /// Use fast timeout preset (local development)
    #[arg(long = "fast-timeouts")]
    pub fast_timeouts: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["chat"]);
        assert_eq!(cli.config, PathBuf::from("~/.chat-link/config.toml"));
        assert_eq!(cli.connection_timeout, None);
        assert!(cli.watch.is_empty());
        assert!(!cli.no_reconnect);
    }

    #[test]
    fn test_repeated_watch_flags() {
        let cli = Cli::parse_from(["chat", "-u", "http://h:1", "-c", "7", "-w", "8", "--watch", "9"]);
        assert_eq!(cli.url.as_deref(), Some("http://h:1"));
        assert_eq!(cli.chat, Some(7));
        assert_eq!(cli.watch, vec![8, 9]);
    }
}
