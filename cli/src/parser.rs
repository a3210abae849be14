//! Command parser for chat input
//!
//! Lines starting with `/` are client commands; anything else is a message
//! for the open conversation.

use crate::error::{CLIError, Result};

/// Parsed input line
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Plain text for the open conversation
    Send(String),

    Open(i64),
    Close,
    /// Load the next page of older history
    Older,
    /// Reprint the open conversation
    Show,
    Watch { chat_id: i64, name: Option<String> },
    Unwatch(i64),
    Notifications,
    Dismiss(u64),
    Status,
    Help,
    Quit,
}

/// Command parser
#[derive(Debug, Default)]
pub struct CommandParser;

impl CommandParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse a command line
    pub fn parse(&self, line: &str) -> Result<Command> {
        let trimmed = line.trim();

        if trimmed.is_empty() {
            return Err(CLIError::ParseError("Empty command".into()));
        }

        // `//text` sends a message that starts with a slash
        if let Some(text) = trimmed.strip_prefix("//") {
            return Ok(Command::Send(format!("/{}", text)));
        }

        if trimmed.starts_with('/') {
            return self.parse_meta_command(trimmed);
        }

        Ok(Command::Send(trimmed.to_string()))
    }

    fn parse_meta_command(&self, line: &str) -> Result<Command> {
        let mut parts = line.splitn(3, char::is_whitespace);
        let command = parts.next().unwrap_or_default();
        let first = parts.next().map(str::trim).filter(|s| !s.is_empty());
        let rest = parts.next().map(str::trim).filter(|s| !s.is_empty());

        match command {
            "/quit" | "/q" | "/exit" => Ok(Command::Quit),
            "/help" | "/?" => Ok(Command::Help),
            "/status" => Ok(Command::Status),
            "/open" | "/o" => Ok(Command::Open(Self::chat_id(command, first)?)),
            "/close" => Ok(Command::Close),
            "/older" | "/more" => Ok(Command::Older),
            "/show" => Ok(Command::Show),
            "/watch" => Ok(Command::Watch {
                chat_id: Self::chat_id(command, first)?,
                name: rest.map(str::to_string),
            }),
            "/unwatch" => Ok(Command::Unwatch(Self::chat_id(command, first)?)),
            "/notifications" | "/n" => Ok(Command::Notifications),
            "/dismiss" => {
                let raw = first.ok_or_else(|| {
                    CLIError::ParseError("/dismiss requires a notification id".into())
                })?;
                raw.parse::<u64>()
                    .map(Command::Dismiss)
                    .map_err(|_| CLIError::ParseError(format!("Invalid notification id: {}", raw)))
            },
            other => Err(CLIError::ParseError(format!(
                "Unknown command {} (try /help)",
                other
            ))),
        }
    }

    fn chat_id(command: &str, arg: Option<&str>) -> Result<i64> {
        let raw = arg
            .ok_or_else(|| CLIError::ParseError(format!("{} requires a chat id", command)))?;
        raw.parse::<i64>()
            .map_err(|_| CLIError::ParseError(format!("Invalid chat id: {}", raw)))
    }
}

pub const HELP_TEXT: &str = "\
Commands:
  /open <chat>              open a conversation (closes the current one)
  /close                    close the open conversation
  /older                    load older messages
  /show                     reprint the open conversation
  /watch <chat> [name]      get notifications for a chat
  /unwatch <chat>           stop notifications for a chat
  /notifications            list notifications
  /dismiss <id>             dismiss a notification
  /status                   connection and conversation status
  /quit                     leave
Anything else is sent to the open conversation (start with // to send a leading slash).";
