//! Transient notices for activity outside the open conversation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::events::{ClientEvent, EventSink};
use crate::models::{ChatNotificationEvent, MembershipEvent, Notification, NotificationKind};

/// How long a notification stays queued unless dismissed.
pub const NOTIFICATION_TTL: Duration = Duration::from_millis(5000);

#[derive(Default)]
struct NotificationQueue {
    /// Chat currently open; its events are suppressed.
    active_chat: Option<i64>,
    chat_names: HashMap<i64, String>,
    queue: Vec<Notification>,
    next_id: u64,
}

impl NotificationQueue {
    fn chat_label(&self, chat_id: i64) -> String {
        self.chat_names
            .get(&chat_id)
            .cloned()
            .unwrap_or_else(|| format!("chat {}", chat_id))
    }

    fn take(&mut self, id: u64) -> Option<Notification> {
        let index = self.queue.iter().position(|n| n.id == id)?;
        Some(self.queue.remove(index))
    }
}

pub(crate) struct NotificationAggregator {
    inner: Arc<Mutex<NotificationQueue>>,
    events: EventSink,
    ttl: Duration,
}

impl NotificationAggregator {
    pub(crate) fn new(events: EventSink) -> Self {
        Self {
            inner: Arc::new(Mutex::new(NotificationQueue::default())),
            events,
            ttl: NOTIFICATION_TTL,
        }
    }

    pub(crate) fn set_active_chat(&self, chat_id: Option<i64>) {
        self.inner.lock().active_chat = chat_id;
    }

    pub(crate) fn register_chat(&self, chat_id: i64, name: Option<String>) {
        let mut inner = self.inner.lock();
        match name {
            Some(name) => {
                inner.chat_names.insert(chat_id, name);
            },
            None => {
                inner.chat_names.remove(&chat_id);
            },
        }
    }

    pub(crate) fn forget_chat(&self, chat_id: i64) {
        self.inner.lock().chat_names.remove(&chat_id);
    }

    /// Queue a notice for a message in `chat_id`, unless that chat is open.
    pub(crate) fn on_message(&self, chat_id: i64, event: ChatNotificationEvent) -> Option<Notification> {
        self.push(NotificationKind::Message, chat_id, |queue| {
            (
                format!("New message in {}", queue.chat_label(chat_id)),
                format!("{}: {}", event.sender, event.content),
            )
        })
    }

    /// Queue a notice for a membership change, unless its chat is open.
    pub(crate) fn on_membership(&self, event: MembershipEvent) -> Option<Notification> {
        self.push(NotificationKind::Membership, event.chat_id, |_| {
            ("New chat added".to_string(), event.content)
        })
    }

    /// Queued notifications, oldest first.
    pub(crate) fn notifications(&self) -> Vec<Notification> {
        self.inner.lock().queue.clone()
    }

    /// Remove `id` now. Returns the notification if it was still queued.
    pub(crate) fn dismiss(&self, id: u64) -> Option<Notification> {
        let removed = self.inner.lock().take(id)?;
        self.events.emit(ClientEvent::NotificationRemoved { id });
        Some(removed)
    }

    pub(crate) fn clear(&self) {
        let drained: Vec<u64> = {
            let mut inner = self.inner.lock();
            inner.active_chat = None;
            inner.queue.drain(..).map(|n| n.id).collect()
        };
        for id in drained {
            self.events.emit(ClientEvent::NotificationRemoved { id });
        }
    }

    fn push<F>(&self, kind: NotificationKind, chat_id: i64, render: F) -> Option<Notification>
    where
        F: FnOnce(&NotificationQueue) -> (String, String),
    {
        let notification = {
            let mut inner = self.inner.lock();
            if inner.active_chat == Some(chat_id) {
                log::debug!("[chat-link] Suppressing {:?} notification for open chat {}", kind, chat_id);
                return None;
            }
            let (title, body) = render(&inner);
            inner.next_id += 1;
            let notification = Notification {
                id: inner.next_id,
                kind,
                title,
                body,
                chat_id,
            };
            inner.queue.push(notification.clone());
            notification
        };

        let id = notification.id;
        let inner = self.inner.clone();
        let events = self.events.clone();
        let ttl = self.ttl;
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            if inner.lock().take(id).is_some() {
                events.emit(ClientEvent::NotificationRemoved { id });
            }
        });

        self.events.emit(ClientEvent::NotificationAdded(notification.clone()));
        Some(notification)
    }
}
