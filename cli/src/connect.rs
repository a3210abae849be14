use crate::args::Cli;
use chat_cli::{CLIConfiguration, CLIError, CLISession, OutputFormatter, Result};
use chat_link::{ChatLinkClient, ChatLinkTimeouts, UserRef};

const DEFAULT_URL: &str = "http://localhost:8080";

/// Build timeouts: preset flag, then individual flags over the config file
fn build_timeouts(cli: &Cli, config: &CLIConfiguration) -> ChatLinkTimeouts {
    if cli.fast_timeouts {
        return ChatLinkTimeouts::fast();
    }

    let server = config.resolved_server();
    ChatLinkTimeouts::builder()
        .connection_timeout_secs(cli.connection_timeout.unwrap_or(server.connection_timeout))
        .fetch_timeout_secs(cli.fetch_timeout.unwrap_or(server.fetch_timeout))
        .build()
}

/// Local user from flags (both required together), else from the config file
fn resolve_local_user(cli: &Cli, config: &CLIConfiguration) -> Result<UserRef> {
    match (cli.user_id, cli.username.as_deref()) {
        (Some(id), Some(username)) => Ok(UserRef::new(id, username)),
        (None, None) => config.local_user().ok_or_else(|| {
            CLIError::ConfigurationError(
                "No local user: pass --user-id and --username or add a [user] section".into(),
            )
        }),
        _ => Err(CLIError::ConfigurationError(
            "--user-id and --username must be given together".into(),
        )),
    }
}

pub async fn create_session(cli: &Cli, config: &CLIConfiguration) -> Result<CLISession> {
    let server = config.resolved_server();

    // Priority: flag/env > config file > localhost
    let base_url = cli
        .url
        .clone()
        .or(server.url)
        .unwrap_or_else(|| DEFAULT_URL.to_string());
    let api_url = cli.api_url.clone().or(server.api_url).unwrap_or_else(|| base_url.clone());

    let mut options = config.to_connection_options();
    if cli.no_reconnect {
        options = options.with_auto_reconnect(false);
    }

    let local_user = resolve_local_user(cli, config)?;
    if cli.verbose {
        eprintln!("Connecting to {} as {}", base_url, local_user.username);
    }

    let client = ChatLinkClient::builder()
        .base_url(base_url)
        .api_url(api_url)
        .local_user(local_user)
        .connection_options(options)
        .timeouts(build_timeouts(cli, config))
        .build()?;

    let ui = config.resolved_ui();
    let formatter = OutputFormatter::new(ui.color && !cli.no_color, ui.show_timestamps);
    let mut session = CLISession::new(client, formatter);

    session.start().await?;
    for chat_id in &cli.watch {
        session.watch(*chat_id, None).await?;
    }
    if let Some(chat_id) = cli.chat {
        session.open(chat_id).await?;
    }

    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::time::Duration;

    #[test]
    fn test_flags_override_config_timeouts() {
        let config = CLIConfiguration::default();
        let cli = Cli::parse_from(["chat", "--fetch-timeout", "5"]);
        let timeouts = build_timeouts(&cli, &config);
        assert_eq!(timeouts.fetch_timeout, Duration::from_secs(5));
        assert_eq!(timeouts.connection_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_local_user_resolution() {
        let config = CLIConfiguration::default();

        let cli = Cli::parse_from(["chat", "--user-id", "3", "--username", "carol"]);
        let user = resolve_local_user(&cli, &config).unwrap();
        assert_eq!((user.id, user.username.as_str()), (3, "carol"));

        let cli = Cli::parse_from(["chat", "--user-id", "3"]);
        assert!(resolve_local_user(&cli, &config).is_err());

        let cli = Cli::parse_from(["chat"]);
        assert!(resolve_local_user(&cli, &config).is_err());
    }
}
