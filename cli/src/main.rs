//! chat - terminal client for chat-link
//!
//! # Usage
//!
//! ```bash
//! # Open chat 7 as alice
//! chat -u http://localhost:8080 --user-id 1 --username alice --chat 7
//!
//! # Identity from ~/.chat-link/config.toml, notifications for chats 8 and 9
//! chat -w 8 -w 9
//! ```

use clap::Parser;

use chat_cli::logging::init_logging;
use chat_cli::{CLIConfiguration, Result};

mod args;
mod connect;

use args::Cli;
use connect::create_session;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = CLIConfiguration::load(&cli.config)?;
    let ui = config.resolved_ui();
    init_logging(&ui.log_level, cli.verbose, ui.color && !cli.no_color)?;
    tracing::debug!(config = %cli.config.display(), "configuration loaded");

    let mut session = create_session(&cli, &config).await?;
    session.run_interactive().await
}
