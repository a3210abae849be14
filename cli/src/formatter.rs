//! Terminal rendering for messages, notifications and status lines.

use chat_link::{ConnectionState, Message, Notification, UserRef, Username};
use colored::Colorize;

/// Renders chat-link values as terminal lines
#[derive(Debug, Clone)]
pub struct OutputFormatter {
    color: bool,
    show_timestamps: bool,
}

impl OutputFormatter {
    pub fn new(color: bool, show_timestamps: bool) -> Self {
        Self {
            color,
            show_timestamps,
        }
    }

    pub fn color(&self) -> bool {
        self.color
    }

    /// One message line. Pending (optimistic) messages are marked.
    pub fn format_message(&self, message: &Message, local_user: &UserRef) -> String {
        let mut line = String::new();

        if self.show_timestamps && message.created_at > 0 {
            line.push_str(&self.dim(&format!("[{}] ", time_of_day(message.created_at))));
        }

        let sender = display_name(&message.sender);
        let sender = if message.sender.is_same_user(local_user) {
            self.paint(&sender, |s| s.green().bold().to_string())
        } else {
            self.paint(&sender, |s| s.cyan().bold().to_string())
        };
        line.push_str(&sender);
        line.push_str(": ");
        line.push_str(&message.content);

        if message.is_optimistic() {
            line.push(' ');
            line.push_str(&self.dim("(sending)"));
        }
        line
    }

    /// The conversation oldest first, the way a transcript reads.
    pub fn format_transcript(&self, messages: &[Message], local_user: &UserRef) -> Vec<String> {
        messages
            .iter()
            .rev()
            .map(|message| self.format_message(message, local_user))
            .collect()
    }

    pub fn format_notification(&self, notification: &Notification) -> String {
        format!(
            "{} {} {}",
            self.paint(&format!("[#{}]", notification.id), |s| s.yellow().to_string()),
            self.paint(&notification.title, |s| s.bold().to_string()),
            notification.body
        )
    }

    pub fn format_typing(&self, users: &[Username]) -> Option<String> {
        let text = match users {
            [] => return None,
            [one] => format!("{} is typing...", one),
            [first, second] => format!("{} and {} are typing...", first, second),
            [first, rest @ ..] => format!("{} and {} others are typing...", first, rest.len()),
        };
        Some(self.dim(&text))
    }

    pub fn format_connection_state(&self, state: &ConnectionState) -> String {
        let text = format!("connection {}", state);
        match state {
            ConnectionState::Connected => self.paint(&text, |s| s.green().to_string()),
            ConnectionState::Failed { .. } => self.paint(&text, |s| s.red().to_string()),
            _ => self.paint(&text, |s| s.yellow().to_string()),
        }
    }

    pub fn format_error(&self, message: &str) -> String {
        self.paint(&format!("error: {}", message), |s| s.red().to_string())
    }

    pub fn format_info(&self, message: &str) -> String {
        self.dim(message)
    }

    fn dim(&self, text: &str) -> String {
        self.paint(text, |s| s.dimmed().to_string())
    }

    fn paint(&self, text: &str, style: impl Fn(&str) -> String) -> String {
        if self.color {
            style(text)
        } else {
            text.to_string()
        }
    }
}

fn display_name(user: &UserRef) -> String {
    user.display_name
        .clone()
        .unwrap_or_else(|| user.username.to_string())
}

/// `HH:MM` (UTC) for a millisecond epoch timestamp
fn time_of_day(epoch_ms: i64) -> String {
    let secs_of_day = (epoch_ms / 1000).rem_euclid(86_400);
    format!("{:02}:{:02}", secs_of_day / 3600, (secs_of_day % 3600) / 60)
}
