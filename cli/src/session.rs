//! Interactive chat session
//!
//! Reads lines from stdin, turns them into chat-link calls, and prints the
//! client event stream as it arrives. Only messages newer than the last one
//! printed are echoed on `ConversationUpdated`; older history is printed by
//! the `/older` command itself.

use std::sync::Arc;

use chat_link::{ChatLinkClient, ClientEvent, Conversation, UserRef};
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::error::{CLIError, Result};
use crate::formatter::OutputFormatter;
use crate::parser::{Command, CommandParser, HELP_TEXT};

/// What the transcript printer has already shown for the open chat.
#[derive(Debug, Default)]
struct PrintCursor {
    chat_id: Option<i64>,
    /// Highest confirmed id printed so far.
    newest: i64,
}

/// Outcome of one input line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct CLISession {
    client: ChatLinkClient,
    formatter: OutputFormatter,
    parser: CommandParser,
    conversation: Option<Conversation>,
    cursor: Arc<Mutex<PrintCursor>>,
}

impl CLISession {
    pub fn new(client: ChatLinkClient, formatter: OutputFormatter) -> Self {
        Self {
            client,
            formatter,
            parser: CommandParser::new(),
            conversation: None,
            cursor: Arc::new(Mutex::new(PrintCursor::default())),
        }
    }

    pub fn client(&self) -> &ChatLinkClient {
        &self.client
    }

    pub fn conversation(&self) -> Option<&Conversation> {
        self.conversation.as_ref()
    }

    /// Connect and subscribe to the local user's membership feed.
    pub async fn start(&mut self) -> Result<()> {
        self.client.connect().await?;
        let user_id = self.client.local_user().id;
        self.client.watch_membership(user_id).await?;
        log::info!("session started for user {}", user_id);
        Ok(())
    }

    pub async fn watch(&mut self, chat_id: i64, name: Option<String>) -> Result<()> {
        self.client.watch_chat(chat_id, name).await?;
        Ok(())
    }

    /// Open `chat_id`, load its first history page and print it.
    pub async fn open(&mut self, chat_id: i64) -> Result<()> {
        let conversation = self.client.open_conversation(chat_id).await?;
        {
            let mut cursor = self.cursor.lock();
            cursor.chat_id = Some(chat_id);
            cursor.newest = 0;
        }
        self.conversation = Some(conversation.clone());

        println!("{}", self.formatter.format_info(&format!("--- chat {} ---", chat_id)));
        if let Err(e) = conversation.load_older().await {
            println!("{}", self.formatter.format_error(&CLIError::from(e).to_string()));
        }
        self.print_transcript(&conversation);
        Ok(())
    }

    /// Execute one input line.
    pub async fn execute(&mut self, line: &str) -> Result<Flow> {
        match self.parser.parse(line)? {
            Command::Quit => return Ok(Flow::Quit),
            Command::Help => println!("{}", HELP_TEXT),
            Command::Send(text) => {
                let conversation = self.open_conversation()?;
                conversation.send_message(&text).await?;
            },
            Command::Open(chat_id) => self.open(chat_id).await?,
            Command::Close => {
                self.client.close_conversation().await;
                self.conversation = None;
                self.cursor.lock().chat_id = None;
            },
            Command::Older => {
                let conversation = self.open_conversation()?;
                let before = conversation.messages().len();
                match conversation.load_older().await? {
                    Some(page) if page.appended > 0 => {
                        let messages = conversation.messages();
                        let older = &messages[before.min(messages.len())..];
                        println!(
                            "{}",
                            self.formatter
                                .format_info(&format!("--- {} older messages ---", page.appended))
                        );
                        for line in self.formatter.format_transcript(older, self.client.local_user()) {
                            println!("{}", line);
                        }
                    },
                    Some(_) => println!("{}", self.formatter.format_info("no older messages")),
                    None => println!("{}", self.formatter.format_info("already loading")),
                }
            },
            Command::Show => {
                let conversation = self.open_conversation()?.clone();
                self.print_transcript(&conversation);
            },
            Command::Watch { chat_id, name } => {
                self.watch(chat_id, name).await?;
                println!("{}", self.formatter.format_info(&format!("watching chat {}", chat_id)));
            },
            Command::Unwatch(chat_id) => {
                if !self.client.unwatch_chat(chat_id).await {
                    println!("{}", self.formatter.format_info(&format!("chat {} was not watched", chat_id)));
                }
            },
            Command::Notifications => {
                let notifications = self.client.notifications();
                if notifications.is_empty() {
                    println!("{}", self.formatter.format_info("no notifications"));
                }
                for notification in &notifications {
                    println!("{}", self.formatter.format_notification(notification));
                }
            },
            Command::Dismiss(id) => {
                if let Some(notification) = self.client.dismiss_notification(id) {
                    self.open(notification.chat_id).await?;
                } else {
                    println!("{}", self.formatter.format_info(&format!("no notification #{}", id)));
                }
            },
            Command::Status => self.print_status(),
        }
        Ok(Flow::Continue)
    }

    /// Main loop: stdin lines until `/quit` or EOF.
    pub async fn run_interactive(&mut self) -> Result<()> {
        let printer = self.spawn_event_printer();
        println!(
            "{}",
            self.formatter.format_info(&format!(
                "chat {} as {} (type /help for commands)",
                chat_link::VERSION,
                self.client.local_user().username
            ))
        );

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let outcome = loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break Ok(()),
                Err(e) => break Err(CLIError::from(e)),
            };
            if line.trim().is_empty() {
                continue;
            }
            match self.execute(&line).await {
                Ok(Flow::Quit) => break Ok(()),
                Ok(Flow::Continue) => {},
                Err(e) => println!("{}", self.formatter.format_error(&e.to_string())),
            }
        };

        printer.abort();
        self.client.disconnect().await;
        outcome
    }

    fn open_conversation(&self) -> Result<&Conversation> {
        self.conversation
            .as_ref()
            .filter(|c| c.is_open())
            .ok_or_else(|| CLIError::ParseError("No open chat (use /open <chat>)".into()))
    }

    fn print_transcript(&self, conversation: &Conversation) {
        let messages = conversation.messages();
        for line in self.formatter.format_transcript(&messages, self.client.local_user()) {
            println!("{}", line);
        }
        let newest = messages.iter().map(|m| m.id).max().unwrap_or(0);
        let mut cursor = self.cursor.lock();
        cursor.newest = cursor.newest.max(newest);
    }

    fn print_status(&self) {
        println!(
            "{}",
            self.formatter.format_connection_state(&self.client.connection_state())
        );
        match self.conversation.as_ref().filter(|c| c.is_open()) {
            Some(conversation) => {
                let snapshot = conversation.snapshot();
                println!(
                    "chat {}: {} messages, {} pending, {}",
                    snapshot.chat_id,
                    snapshot.messages.len(),
                    snapshot.pending_sends,
                    if snapshot.has_more { "more history available" } else { "history complete" }
                );
            },
            None => println!("no open chat"),
        }
        println!("{} notifications", self.client.notifications().len());
    }

    fn spawn_event_printer(&self) -> JoinHandle<()> {
        let mut events = self.client.events();
        let client = self.client.clone();
        let formatter = self.formatter.clone();
        let cursor = self.cursor.clone();

        tokio::spawn(async move {
            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        log::debug!("event printer skipped {} events", skipped);
                        continue;
                    },
                    Err(RecvError::Closed) => break,
                };
                for line in render_event(&event, &client, &formatter, &cursor) {
                    println!("{}", line);
                }
            }
        })
    }
}

fn render_event(
    event: &ClientEvent,
    client: &ChatLinkClient,
    formatter: &OutputFormatter,
    cursor: &Mutex<PrintCursor>,
) -> Vec<String> {
    match event {
        ClientEvent::ConversationUpdated { chat_id } => {
            let Some(conversation) = client.conversation(*chat_id) else {
                return Vec::new();
            };
            let mut cursor = cursor.lock();
            if cursor.chat_id != Some(*chat_id) {
                return Vec::new();
            }
            new_messages(&conversation, client.local_user(), formatter, &mut cursor)
        },
        ClientEvent::TypingChanged { users, .. } => formatter.format_typing(users).into_iter().collect(),
        ClientEvent::NotificationAdded(notification) => {
            vec![formatter.format_notification(notification)]
        },
        ClientEvent::ConnectionStateChanged(state) => vec![formatter.format_connection_state(state)],
        ClientEvent::ChatListChanged => vec![formatter.format_info("your chat list changed")],
        ClientEvent::NotificationRemoved { .. } => Vec::new(),
    }
}

/// Confirmed messages newer than the cursor, oldest first.
fn new_messages(
    conversation: &Conversation,
    local_user: &UserRef,
    formatter: &OutputFormatter,
    cursor: &mut PrintCursor,
) -> Vec<String> {
    let fresh: Vec<_> = conversation
        .messages()
        .into_iter()
        .filter(|m| !m.is_optimistic() && m.id > cursor.newest)
        .collect();
    if let Some(newest) = fresh.iter().map(|m| m.id).max() {
        cursor.newest = newest;
    }
    formatter.format_transcript(&fresh, local_user)
}
