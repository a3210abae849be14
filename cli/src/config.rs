//! Configuration file management
//!
//! `CLIConfiguration` is read from `~/.chat-link/config.toml`. Every section
//! is optional; missing sections fall back to defaults and command-line flags
//! override whatever the file says.
//!
//! # Configuration Format
//!
//! ```toml
//! [server]
//! url = "http://localhost:8080"      # realtime endpoint base URL
//! api_url = "http://localhost:8080"  # REST base URL (defaults to url)
//! connection_timeout = 10            # seconds
//! fetch_timeout = 30                 # seconds
//!
//! [connection]
//! auto_reconnect = true
//! reconnect_delay_ms = 5000          # fixed delay between attempts
//! max_reconnect_attempts = 0         # 0 = unlimited
//! heartbeat_ms = 4000                # 0 disables heart-beats
//!
//! [user]
//! id = 1
//! username = "alice"
//! display_name = "Alice"
//!
//! [ui]
//! color = true
//! show_timestamps = true
//! log_level = "warn"
//! ```

use chat_link::{ChatLinkTimeouts, ConnectionOptions, UserRef};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{CLIError, Result};

const DEFAULT_CONFIG_PATH: &str = "~/.chat-link/config.toml";

/// CLI configuration loaded from TOML file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CLIConfiguration {
    /// Endpoint settings
    pub server: Option<ServerConfig>,

    /// Reconnection and heart-beat settings
    pub connection: Option<ConnectionConfig>,

    /// Local user identity
    pub user: Option<UserConfig>,

    /// Terminal preferences
    pub ui: Option<UIConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Realtime endpoint base URL (e.g., http://localhost:8080)
    pub url: Option<String>,

    /// REST base URL; the realtime URL is used when absent
    #[serde(default)]
    pub api_url: Option<String>,

    /// Connection timeout in seconds
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout: u64,

    /// History request timeout in seconds
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout: u64,
}

/// Connection settings for reconnection behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Enable automatic reconnection on connection loss (default: true)
    #[serde(default = "default_auto_reconnect")]
    pub auto_reconnect: bool,

    /// Fixed delay between reconnection attempts in milliseconds (default: 5000)
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Maximum number of reconnection attempts (0 = unlimited, default: 0)
    #[serde(default)]
    pub max_reconnect_attempts: u32,

    /// STOMP heart-beat interval in both directions (0 = disabled, default: 4000)
    #[serde(default = "default_heartbeat_ms")]
    pub heartbeat_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserConfig {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UIConfig {
    /// Enable colored output
    #[serde(default = "default_color")]
    pub color: bool,

    /// Prefix messages with their time of day
    #[serde(default = "default_show_timestamps")]
    pub show_timestamps: bool,

    /// Log filter used when --verbose is not given
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_connection_timeout() -> u64 {
    10
}

fn default_fetch_timeout() -> u64 {
    30
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

fn default_color() -> bool {
    true
}

fn default_show_timestamps() -> bool {
    true
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for CLIConfiguration {
    fn default() -> Self {
        Self {
            server: Some(ServerConfig {
                url: Some("http://localhost:8080".to_string()),
                api_url: None,
                connection_timeout: default_connection_timeout(),
                fetch_timeout: default_fetch_timeout(),
            }),
            connection: Some(ConnectionConfig {
                auto_reconnect: default_auto_reconnect(),
                reconnect_delay_ms: default_reconnect_delay_ms(),
                max_reconnect_attempts: 0,
                heartbeat_ms: default_heartbeat_ms(),
            }),
            user: None,
            ui: Some(UIConfig {
                color: default_color(),
                show_timestamps: default_show_timestamps(),
                log_level: default_log_level(),
            }),
        }
    }
}

pub fn expand_config_path(path: &Path) -> PathBuf {
    let path_str = path.to_str().unwrap_or(DEFAULT_CONFIG_PATH);
    if let Some(rest) = path_str.strip_prefix("~/") {
        if let Some(home_dir) = dirs::home_dir() {
            return home_dir.join(rest);
        }
    }
    path.to_path_buf()
}

pub fn default_config_path() -> PathBuf {
    expand_config_path(Path::new(DEFAULT_CONFIG_PATH))
}

impl CLIConfiguration {
    /// Load configuration from file
    ///
    /// Returns default configuration if file doesn't exist.
    pub fn load(path: &Path) -> Result<Self> {
        let path = expand_config_path(path);

        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&path).map_err(|e| {
            CLIError::ConfigurationError(format!("Failed to read config file: {}", e))
        })?;

        let config: CLIConfiguration = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let path = expand_config_path(path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| CLIError::ConfigurationError(format!("Failed to serialize: {}", e)))?;

        std::fs::write(&path, contents)?;
        Ok(())
    }

    /// Build chat-link `ConnectionOptions` from the `[connection]` section
    pub fn to_connection_options(&self) -> ConnectionOptions {
        let conn = self.resolved_connection();

        // 0 means unlimited
        let max_attempts = match conn.max_reconnect_attempts {
            0 => None,
            n => Some(n),
        };

        ConnectionOptions::default()
            .with_auto_reconnect(conn.auto_reconnect)
            .with_reconnect_delay_ms(conn.reconnect_delay_ms)
            .with_max_reconnect_attempts(max_attempts)
            .with_heartbeat_ms(conn.heartbeat_ms, conn.heartbeat_ms)
    }

    /// Build chat-link timeouts from the `[server]` section
    pub fn to_timeouts(&self) -> ChatLinkTimeouts {
        let server = self.resolved_server();
        ChatLinkTimeouts::builder()
            .connection_timeout(Duration::from_secs(server.connection_timeout))
            .fetch_timeout(Duration::from_secs(server.fetch_timeout))
            .build()
    }

    /// The configured local user, if the `[user]` section is complete
    pub fn local_user(&self) -> Option<UserRef> {
        self.user.as_ref().map(|u| {
            let user = UserRef::new(u.id, u.username.as_str());
            match &u.display_name {
                Some(name) => user.with_display_name(name.clone()),
                None => user,
            }
        })
    }

    pub fn resolved_server(&self) -> ServerConfig {
        self.server.clone().unwrap_or(ServerConfig {
            url: None,
            api_url: None,
            connection_timeout: default_connection_timeout(),
            fetch_timeout: default_fetch_timeout(),
        })
    }

    pub fn resolved_connection(&self) -> ConnectionConfig {
        self.connection.clone().unwrap_or(ConnectionConfig {
            auto_reconnect: default_auto_reconnect(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            max_reconnect_attempts: 0,
            heartbeat_ms: default_heartbeat_ms(),
        })
    }

    pub fn resolved_ui(&self) -> UIConfig {
        self.ui.clone().unwrap_or(UIConfig {
            color: default_color(),
            show_timestamps: default_show_timestamps(),
            log_level: default_log_level(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CLIConfiguration::default();
        assert_eq!(
            config.server.as_ref().unwrap().url,
            Some("http://localhost:8080".to_string())
        );
        assert!(config.user.is_none());
        assert!(config.local_user().is_none());
    }

    #[test]
    fn test_to_connection_options() {
        let options = CLIConfiguration::default().to_connection_options();
        assert!(options.auto_reconnect);
        assert_eq!(options.reconnect_delay_ms, 5000);
        assert_eq!(options.max_reconnect_attempts, None);
        assert_eq!(options.heartbeat_outgoing_ms, 4000);
        assert_eq!(options.heartbeat_incoming_ms, 4000);
    }

    #[test]
    fn test_limited_reconnect_attempts() {
        let mut config = CLIConfiguration::default();
        config.connection.as_mut().unwrap().max_reconnect_attempts = 3;
        assert_eq!(config.to_connection_options().max_reconnect_attempts, Some(3));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: CLIConfiguration = toml::from_str(
            r#"
            [server]
            url = "http://chat.local:9000"

            [user]
            id = 4
            username = "dana"
            "#,
        )
        .unwrap();

        let server = config.resolved_server();
        assert_eq!(server.connection_timeout, 10);
        assert_eq!(server.api_url, None);
        assert!(config.resolved_ui().color);

        let user = config.local_user().unwrap();
        assert_eq!(user.id, 4);
        assert_eq!(user.username.as_str(), "dana");
        assert_eq!(config.to_timeouts().fetch_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = CLIConfiguration::default();
        config.user = Some(UserConfig {
            id: 1,
            username: "alice".to_string(),
            display_name: Some("Alice".to_string()),
        });
        config.save(&path).unwrap();

        let loaded = CLIConfiguration::load(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.local_user().unwrap().display_name.as_deref(), Some("Alice"));
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = CLIConfiguration::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(loaded, CLIConfiguration::default());
    }

    #[test]
    fn test_invalid_file_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[server\nurl = ").unwrap();
        assert!(matches!(
            CLIConfiguration::load(&path),
            Err(CLIError::ConfigurationError(_))
        ));
    }
}
