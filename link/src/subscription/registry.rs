//! Logical channel subscriptions over the shared connection.
//!
//! Every [`ChannelKey`] maps to at most one entry. An entry owns a
//! transport subscription (allocated by the [`ConnectionManager`]) and a
//! dispatcher task that decodes frames into [`ChannelEvent`]s and feeds
//! them to the handler one at a time.
//!
//! Replacing or removing an entry aborts its dispatcher and waits for it
//! to stop before returning, so once `subscribe` / `unsubscribe` returns
//! the old handler is never called again, even for frames that were
//! already queued.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use super::channel_key::{ChannelKey, ChannelKind};
use crate::connection::{ConnectionManager, InboundFrame};
use crate::error::{ChatLinkError, Result};
use crate::models::{ChatNotificationEvent, IncomingMessage, MembershipEvent, Message, TypingEvent};

/// A decoded inbound payload, typed by the channel it arrived on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Message(Message),
    Typing(TypingEvent),
    Notification(ChatNotificationEvent),
    Membership(MembershipEvent),
}

impl ChannelEvent {
    /// Decode a frame body according to the key's kind.
    pub fn decode(key: &ChannelKey, body: &str) -> Result<Self> {
        let malformed = |e: serde_json::Error| ChatLinkError::MalformedFrame {
            channel: key.to_string(),
            reason: e.to_string(),
        };
        let event = match key.kind {
            ChannelKind::Messages => {
                let message: IncomingMessage = serde_json::from_str(body).map_err(malformed)?;
                ChannelEvent::Message(message.into_message(key.id))
            },
            ChannelKind::Typing => {
                ChannelEvent::Typing(serde_json::from_str(body).map_err(malformed)?)
            },
            ChannelKind::Notifications => {
                ChannelEvent::Notification(serde_json::from_str(body).map_err(malformed)?)
            },
            ChannelKind::MembershipFeed => {
                ChannelEvent::Membership(serde_json::from_str(body).map_err(malformed)?)
            },
        };
        Ok(event)
    }
}

type Handler = Box<dyn FnMut(ChannelEvent) + Send>;

struct Entry {
    generation: u64,
    transport_id: String,
    live: Arc<AtomicBool>,
    dispatcher: JoinHandle<()>,
}

struct RegistryInner {
    connection: ConnectionManager,
    entries: Mutex<HashMap<ChannelKey, Entry>>,
    next_generation: AtomicU64,
}

impl RegistryInner {
    /// Stop an entry's dispatcher and wait until it is gone.
    async fn retire(&self, key: &ChannelKey, entry: Entry, release_transport: bool) {
        entry.live.store(false, Ordering::Release);
        entry.dispatcher.abort();
        let _ = entry.dispatcher.await;
        if release_transport {
            if let Err(e) = self.connection.unsubscribe(&entry.transport_id).await {
                log::debug!("[chat-link] Failed to release {} ({}): {}", key, entry.transport_id, e);
            }
        }
    }
}

/// Maps channel keys to live subscriptions.
#[derive(Clone)]
pub struct SubscriptionRegistry {
    inner: Arc<RegistryInner>,
}

impl fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("connection", &self.inner.connection)
            .finish()
    }
}

impl SubscriptionRegistry {
    pub fn new(connection: ConnectionManager) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                connection,
                entries: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(1),
            }),
        }
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.inner.connection
    }

    /// Subscribe `handler` to `key`, connecting first if needed.
    ///
    /// An existing subscription for the same key is cancelled before the
    /// new one is installed. The handler runs on a dedicated task, one event
    /// at a time; it must not block.
    pub async fn subscribe<F>(&self, key: ChannelKey, handler: F) -> Result<Subscription>
    where
        F: FnMut(ChannelEvent) + Send + 'static,
    {
        self.inner.connection.ensure_connected().await?;

        let mut entries = self.inner.entries.lock().await;
        if let Some(old) = entries.remove(&key) {
            log::debug!("[chat-link] Replacing existing subscription for {}", key);
            self.inner.retire(&key, old, true).await;
        }

        let (transport_id, frame_rx) = self.inner.connection.subscribe(&key.topic()).await?;
        let generation = self.inner.next_generation.fetch_add(1, Ordering::SeqCst);
        let live = Arc::new(AtomicBool::new(true));
        let dispatcher = tokio::spawn(dispatch(key, frame_rx, live.clone(), Box::new(handler)));

        log::debug!(
            "[chat-link] Subscribed {} as {} (gen={})",
            key,
            transport_id,
            generation
        );
        entries.insert(
            key,
            Entry {
                generation,
                transport_id,
                live,
                dispatcher,
            },
        );

        Ok(Subscription {
            key,
            generation,
            registry: Arc::downgrade(&self.inner),
        })
    }

    /// Cancel the subscription for `key`. Returns `false` if there was none.
    pub async fn unsubscribe(&self, key: &ChannelKey) -> bool {
        let mut entries = self.inner.entries.lock().await;
        match entries.remove(key) {
            Some(entry) => {
                self.inner.retire(key, entry, true).await;
                true
            },
            None => false,
        }
    }

    async fn unsubscribe_generation(&self, key: &ChannelKey, generation: u64) -> bool {
        let mut entries = self.inner.entries.lock().await;
        if entries.get(key).map(|e| e.generation) != Some(generation) {
            log::debug!(
                "[chat-link] Ignoring stale cancel for {} (gen={})",
                key,
                generation
            );
            return false;
        }
        match entries.remove(key) {
            Some(entry) => {
                self.inner.retire(key, entry, true).await;
                true
            },
            None => false,
        }
    }

    pub async fn is_subscribed(&self, key: &ChannelKey) -> bool {
        self.inner.entries.lock().await.contains_key(key)
    }

    /// Live keys, sorted.
    pub async fn active_keys(&self) -> Vec<ChannelKey> {
        let mut keys: Vec<ChannelKey> = self.inner.entries.lock().await.keys().copied().collect();
        keys.sort();
        keys
    }

    /// Cancel every subscription, then disconnect the shared connection.
    pub async fn disconnect(&self) {
        {
            let mut entries = self.inner.entries.lock().await;
            let drained: Vec<(ChannelKey, Entry)> = entries.drain().collect();
            if !drained.is_empty() {
                log::info!("[chat-link] Cancelling {} subscription(s)", drained.len());
            }
            for (key, entry) in drained {
                // The connection drops its whole table on disconnect.
                self.inner.retire(&key, entry, false).await;
            }
        }
        self.inner.connection.disconnect().await;
    }
}

/// Handle to one registry entry.
///
/// Dropping the handle leaves the subscription running; call
/// [`cancel`](Subscription::cancel) or
/// [`SubscriptionRegistry::unsubscribe`] to stop it.
#[derive(Debug)]
pub struct Subscription {
    key: ChannelKey,
    generation: u64,
    registry: Weak<RegistryInner>,
}

impl Subscription {
    pub fn key(&self) -> ChannelKey {
        self.key
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Cancel this subscription. A handle whose key has since been
    /// re-subscribed does nothing and returns `false`.
    pub async fn cancel(self) -> bool {
        match self.registry.upgrade() {
            Some(inner) => {
                SubscriptionRegistry { inner }
                    .unsubscribe_generation(&self.key, self.generation)
                    .await
            },
            None => false,
        }
    }
}

async fn dispatch(
    key: ChannelKey,
    mut frame_rx: mpsc::Receiver<InboundFrame>,
    live: Arc<AtomicBool>,
    mut handler: Handler,
) {
    while let Some(frame) = frame_rx.recv().await {
        if !live.load(Ordering::Acquire) {
            break;
        }
        match ChannelEvent::decode(&key, &frame.body) {
            Ok(event) => handler(event),
            Err(e) => log::warn!("[chat-link] Dropping frame from {}: {}", frame.destination, e),
        }
    }
    log::debug!("[chat-link] Dispatcher for {} stopped", key);
}
