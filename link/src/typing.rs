//! Typing indicators, both directions.
//!
//! Outbound, each conversation gets a debounce task fed by a channel: the
//! first keystroke publishes `typing=true`, later keystrokes only push the
//! idle deadline out, and `typing=false` goes out once the user has been
//! idle for [`TYPING_IDLE`].
//!
//! Inbound, remote users are tracked per conversation. An entry disappears
//! on `typing=false` or [`REMOTE_TYPING_TTL`] after its last `typing=true`,
//! whichever comes first. Events carrying the local username are ignored.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::connection::ConnectionManager;
use crate::events::{ClientEvent, EventSink};
use crate::models::{TypingEvent, TypingRequest, Username};
use crate::subscription::destinations;

/// Idle time after the last keystroke before `typing=false` is published.
pub const TYPING_IDLE: Duration = Duration::from_millis(2000);

/// How long a remote `typing=true` stays visible without a refresh.
pub const REMOTE_TYPING_TTL: Duration = Duration::from_millis(5000);

struct Debouncer {
    tx: mpsc::UnboundedSender<()>,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct RemoteTyping {
    /// chat id -> username -> stamp of the `typing=true` that armed it
    chats: HashMap<i64, BTreeMap<Username, u64>>,
    next_stamp: u64,
}

impl RemoteTyping {
    fn users(&self, chat_id: i64) -> Vec<Username> {
        self.chats
            .get(&chat_id)
            .map(|users| users.keys().cloned().collect())
            .unwrap_or_default()
    }
}

pub(crate) struct TypingAggregator {
    connection: ConnectionManager,
    local_username: Username,
    events: EventSink,
    debouncers: Mutex<HashMap<i64, Debouncer>>,
    remote: Arc<Mutex<RemoteTyping>>,
}

impl TypingAggregator {
    pub(crate) fn new(connection: ConnectionManager, local_username: Username, events: EventSink) -> Self {
        Self {
            connection,
            local_username,
            events,
            debouncers: Mutex::new(HashMap::new()),
            remote: Arc::new(Mutex::new(RemoteTyping::default())),
        }
    }

    /// Record a local keystroke in `chat_id`.
    pub(crate) fn notify_typing(&self, chat_id: i64) {
        let mut debouncers = self.debouncers.lock();
        if let Some(debouncer) = debouncers.get(&chat_id) {
            if debouncer.tx.send(()).is_ok() {
                return;
            }
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(());
        let task = tokio::spawn(debounce(chat_id, rx, self.connection.clone()));
        debouncers.insert(chat_id, Debouncer { tx, task });
    }

    /// Stop the debouncer for `chat_id`. A pending `typing=false` is
    /// published before this returns.
    pub(crate) async fn stop(&self, chat_id: i64) {
        let debouncer = self.debouncers.lock().remove(&chat_id);
        if let Some(Debouncer { tx, task }) = debouncer {
            drop(tx);
            let _ = task.await;
        }
    }

    pub(crate) async fn stop_all(&self) {
        let chat_ids: Vec<i64> = self.debouncers.lock().keys().copied().collect();
        for chat_id in chat_ids {
            self.stop(chat_id).await;
        }
    }

    /// Apply an inbound typing event for `chat_id`.
    pub(crate) fn apply_remote(&self, chat_id: i64, event: TypingEvent) {
        if event.username == self.local_username {
            return;
        }

        let users = {
            let mut remote = self.remote.lock();
            if event.typing {
                remote.next_stamp += 1;
                let stamp = remote.next_stamp;
                let previous = remote
                    .chats
                    .entry(chat_id)
                    .or_default()
                    .insert(event.username.clone(), stamp);
                tokio::spawn(expire(
                    self.remote.clone(),
                    self.events.clone(),
                    chat_id,
                    event.username,
                    stamp,
                ));
                if previous.is_some() {
                    return;
                }
            } else {
                let removed = match remote.chats.get_mut(&chat_id) {
                    Some(users) => users.remove(&event.username).is_some(),
                    None => false,
                };
                if !removed {
                    return;
                }
            }
            remote.users(chat_id)
        };
        self.events.emit(ClientEvent::TypingChanged { chat_id, users });
    }

    /// Remote users currently typing in `chat_id`, sorted.
    pub(crate) fn typing_users(&self, chat_id: i64) -> Vec<Username> {
        self.remote.lock().users(chat_id)
    }

    /// Forget every remote typer in `chat_id`.
    pub(crate) fn clear(&self, chat_id: i64) {
        let had_users = self
            .remote
            .lock()
            .chats
            .remove(&chat_id)
            .is_some_and(|users| !users.is_empty());
        if had_users {
            self.events.emit(ClientEvent::TypingChanged {
                chat_id,
                users: Vec::new(),
            });
        }
    }
}

async fn debounce(chat_id: i64, mut rx: mpsc::UnboundedReceiver<()>, connection: ConnectionManager) {
    while rx.recv().await.is_some() {
        publish(&connection, chat_id, true).await;

        let mut closed = false;
        loop {
            match tokio::time::timeout(TYPING_IDLE, rx.recv()).await {
                Ok(Some(())) => continue,
                Ok(None) => {
                    closed = true;
                    break;
                },
                Err(_) => break,
            }
        }

        publish(&connection, chat_id, false).await;
        if closed {
            break;
        }
    }
}

async fn publish(connection: &ConnectionManager, chat_id: i64, typing: bool) {
    let body = match serde_json::to_string(&TypingRequest { chat_id, typing }) {
        Ok(body) => body,
        Err(e) => {
            log::warn!("[chat-link] Failed to encode typing event: {}", e);
            return;
        },
    };
    if let Err(e) = connection.publish(destinations::SEND_TYPING, body).await {
        log::debug!(
            "[chat-link] Dropping typing={} for chat {}: {}",
            typing,
            chat_id,
            e
        );
    }
}

async fn expire(
    remote: Arc<Mutex<RemoteTyping>>,
    events: EventSink,
    chat_id: i64,
    username: Username,
    stamp: u64,
) {
    tokio::time::sleep(REMOTE_TYPING_TTL).await;
    let users = {
        let mut remote = remote.lock();
        let Some(users) = remote.chats.get_mut(&chat_id) else {
            return;
        };
        if users.get(&username) != Some(&stamp) {
            return;
        }
        users.remove(&username);
        remote.users(chat_id)
    };
    log::debug!("[chat-link] Typing indicator for {} in chat {} expired", username, chat_id);
    events.emit(ClientEvent::TypingChanged { chat_id, users });
}
