//! Client-level change notifications.
//!
//! Components publish [`ClientEvent`]s on a broadcast channel; hosts
//! subscribe with [`ChatLinkClient::events`](crate::ChatLinkClient::events)
//! and re-render (or re-query) whatever changed.

use tokio::sync::broadcast;

use crate::connection::ConnectionState;
use crate::models::{Notification, Username};

/// Something observable changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    ConnectionStateChanged(ConnectionState),
    /// The open conversation's messages, cursor or draft changed.
    ConversationUpdated { chat_id: i64 },
    /// The set of remote users typing in `chat_id` changed.
    TypingChanged { chat_id: i64, users: Vec<Username> },
    NotificationAdded(Notification),
    NotificationRemoved { id: u64 },
    /// The local user's chat membership changed; refresh the chat list.
    ChatListChanged,
}

/// Sending half of the client event stream, shared by every component.
#[derive(Debug, Clone)]
pub(crate) struct EventSink {
    tx: broadcast::Sender<ClientEvent>,
}

impl EventSink {
    pub(crate) fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub(crate) fn emit(&self, event: ClientEvent) {
        // No receivers is fine.
        let _ = self.tx.send(event);
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.tx.subscribe()
    }
}
