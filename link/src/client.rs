//! Main chat-link client with builder pattern.
//!
//! Wires the shared connection, the subscription registry and the
//! per-conversation machinery together behind one handle.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::connection::{ConnectionManager, ConnectionState, Connector, WebSocketConnector};
use crate::conversation::paginator::Paginator;
use crate::conversation::reconciler::{reconcile_inbound, MessageReconciler};
use crate::conversation::{
    now_ms, ConversationSnapshot, ConversationState, InboundOutcome, PageResult, SharedConversation,
};
use crate::error::{ChatLinkError, Result};
use crate::event_handlers::EventHandlers;
use crate::events::{ClientEvent, EventSink};
use crate::history::{HistoryFetcher, HttpHistoryClient};
use crate::models::{ConnectionOptions, Message, Notification, UserRef, Username};
use crate::notifications::NotificationAggregator;
use crate::subscription::{ChannelEvent, ChannelKey, SubscriptionRegistry};
use crate::timeouts::ChatLinkTimeouts;
use crate::typing::TypingAggregator;

/// Environment variable holding the realtime base URL.
pub const ENV_BASE_URL: &str = "CHAT_LINK_URL";
/// Environment variable holding the REST base URL.
pub const ENV_API_URL: &str = "CHAT_LINK_API_URL";

const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Realtime chat client.
///
/// Use [`ChatLinkClientBuilder`] to construct instances. Cloning is cheap;
/// all clones share one connection. Must be built inside a Tokio runtime.
///
/// # Examples
///
/// ```rust,no_run
/// use chat_link::{ChatLinkClient, UserRef};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = ChatLinkClient::builder()
///     .base_url("http://localhost:8080")
///     .local_user(UserRef::new(1, "alice"))
///     .build()?;
///
/// client.connect().await?;
/// let conversation = client.open_conversation(7).await?;
/// conversation.load_older().await?;
/// conversation.send_message("hello").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ChatLinkClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    local_user: UserRef,
    connection: ConnectionManager,
    registry: SubscriptionRegistry,
    events: EventSink,
    reconciler: MessageReconciler,
    paginator: Paginator,
    typing: Arc<TypingAggregator>,
    notifications: Arc<NotificationAggregator>,
    /// The open conversation, if any.
    current: Mutex<Option<SharedConversation>>,
    /// Serializes open and close.
    open_lock: tokio::sync::Mutex<()>,
    state_forwarder: JoinHandle<()>,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        self.state_forwarder.abort();
    }
}

impl fmt::Debug for ChatLinkClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatLinkClient")
            .field("local_user", &self.inner.local_user.username)
            .field("connection", &self.inner.connection)
            .finish()
    }
}

impl ChatLinkClient {
    /// Create a new builder for configuring the client
    pub fn builder() -> ChatLinkClientBuilder {
        ChatLinkClientBuilder::new()
    }

    pub fn local_user(&self) -> &UserRef {
        &self.inner.local_user
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.inner.connection
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.inner.registry
    }

    /// Open the shared connection now instead of on first subscribe.
    pub async fn connect(&self) -> Result<()> {
        self.inner.connection.ensure_connected().await
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.connection.state()
    }

    /// Subscribe to client-level change events.
    pub fn events(&self) -> broadcast::Receiver<ClientEvent> {
        self.inner.events.subscribe()
    }

    /// Make `chat_id` the open conversation.
    ///
    /// Any previously open conversation is closed first. The new one starts
    /// empty with its history cursor pinned to now; call
    /// [`Conversation::load_older`] to fetch the first page.
    pub async fn open_conversation(&self, chat_id: i64) -> Result<Conversation> {
        let _guard = self.inner.open_lock.lock().await;
        self.close_current().await;

        let state = ConversationState::shared(chat_id, now_ms());
        self.inner.notifications.set_active_chat(Some(chat_id));

        if let Err(e) = self.subscribe_conversation(chat_id, &state).await {
            log::warn!("[chat-link] Failed to open chat {}: {}", chat_id, e);
            self.inner.notifications.set_active_chat(None);
            self.inner.registry.unsubscribe(&ChannelKey::messages(chat_id)).await;
            return Err(e);
        }

        *self.inner.current.lock() = Some(state.clone());
        log::info!("[chat-link] Opened chat {}", chat_id);
        self.inner.events.emit(ClientEvent::ConversationUpdated { chat_id });

        Ok(Conversation {
            client: self.clone(),
            chat_id,
            state,
        })
    }

    async fn subscribe_conversation(&self, chat_id: i64, state: &SharedConversation) -> Result<()> {
        let messages_state = state.clone();
        let local_user = self.inner.local_user.clone();
        let events = self.inner.events.clone();
        self.inner
            .registry
            .subscribe(ChannelKey::messages(chat_id), move |event| {
                if let ChannelEvent::Message(message) = event {
                    let outcome = reconcile_inbound(&mut messages_state.lock(), message, &local_user);
                    log::debug!("[chat-link] Inbound message for chat {}: {:?}", chat_id, outcome);
                    if matches!(outcome, InboundOutcome::Reconciled { .. } | InboundOutcome::Inserted) {
                        events.emit(ClientEvent::ConversationUpdated { chat_id });
                    }
                }
            })
            .await?;

        let typing = self.inner.typing.clone();
        self.inner
            .registry
            .subscribe(ChannelKey::typing(chat_id), move |event| {
                if let ChannelEvent::Typing(event) = event {
                    typing.apply_remote(chat_id, event);
                }
            })
            .await?;
        Ok(())
    }

    /// Close the open conversation, if any.
    pub async fn close_conversation(&self) {
        let _guard = self.inner.open_lock.lock().await;
        self.close_current().await;
    }

    async fn close_current(&self) {
        let Some(state) = self.inner.current.lock().take() else {
            return;
        };
        let chat_id = {
            let mut st = state.lock();
            st.closed = true;
            st.chat_id()
        };
        self.inner.notifications.set_active_chat(None);
        self.inner.registry.unsubscribe(&ChannelKey::messages(chat_id)).await;
        self.inner.registry.unsubscribe(&ChannelKey::typing(chat_id)).await;
        self.inner.typing.stop(chat_id).await;
        self.inner.typing.clear(chat_id);
        log::info!("[chat-link] Closed chat {}", chat_id);
    }

    /// The open conversation, if it is `chat_id`.
    pub fn conversation(&self, chat_id: i64) -> Option<Conversation> {
        let state = self.inner.current.lock().clone()?;
        if state.lock().chat_id() != chat_id {
            return None;
        }
        Some(Conversation {
            client: self.clone(),
            chat_id,
            state,
        })
    }

    fn open_state(&self, chat_id: i64) -> Result<SharedConversation> {
        let current = self.inner.current.lock();
        match current.as_ref() {
            Some(state) if state.lock().chat_id() == chat_id => Ok(state.clone()),
            _ => Err(ChatLinkError::ConversationNotOpen(chat_id)),
        }
    }

    /// Send `content` to the open conversation `chat_id`.
    pub async fn send_message(&self, chat_id: i64, content: &str) -> Result<Message> {
        let state = self.open_state(chat_id)?;
        self.inner.reconciler.send(&state, content).await
    }

    /// Load the next older history page of the open conversation `chat_id`.
    pub async fn load_older(&self, chat_id: i64) -> Result<Option<PageResult>> {
        let state = self.open_state(chat_id)?;
        self.inner.paginator.load_older(&state).await
    }

    /// Record a local keystroke in the open conversation `chat_id`.
    pub fn notify_typing(&self, chat_id: i64) -> Result<()> {
        let current = self.inner.current.lock();
        match current.as_ref() {
            Some(state) if state.lock().chat_id() == chat_id => {
                // Held under `current` so a concurrent close stops this debouncer.
                self.inner.typing.notify_typing(chat_id);
                Ok(())
            },
            _ => Err(ChatLinkError::ConversationNotOpen(chat_id)),
        }
    }

    /// Receive notifications for `chat_id`. `name` is used in their titles.
    pub async fn watch_chat(&self, chat_id: i64, name: Option<String>) -> Result<()> {
        self.inner.notifications.register_chat(chat_id, name);
        let notifications = self.inner.notifications.clone();
        self.inner
            .registry
            .subscribe(ChannelKey::notifications(chat_id), move |event| {
                if let ChannelEvent::Notification(event) = event {
                    notifications.on_message(chat_id, event);
                }
            })
            .await?;
        Ok(())
    }

    /// Stop receiving notifications for `chat_id`.
    pub async fn unwatch_chat(&self, chat_id: i64) -> bool {
        self.inner.notifications.forget_chat(chat_id);
        self.inner
            .registry
            .unsubscribe(&ChannelKey::notifications(chat_id))
            .await
    }

    /// Follow the membership feed of `user_id`.
    pub async fn watch_membership(&self, user_id: i64) -> Result<()> {
        let notifications = self.inner.notifications.clone();
        let events = self.inner.events.clone();
        self.inner
            .registry
            .subscribe(ChannelKey::membership(user_id), move |event| {
                if let ChannelEvent::Membership(event) = event {
                    notifications.on_membership(event);
                    events.emit(ClientEvent::ChatListChanged);
                }
            })
            .await?;
        Ok(())
    }

    /// Queued notifications, oldest first.
    pub fn notifications(&self) -> Vec<Notification> {
        self.inner.notifications.notifications()
    }

    /// Remove notification `id` now and return it.
    pub fn dismiss_notification(&self, id: u64) -> Option<Notification> {
        self.inner.notifications.dismiss(id)
    }

    /// Log out: close the conversation, cancel every subscription and
    /// release the transport.
    pub async fn disconnect(&self) {
        self.close_conversation().await;
        self.inner.typing.stop_all().await;
        self.inner.registry.disconnect().await;
        self.inner.notifications.clear();
        log::info!("[chat-link] Disconnected");
    }
}

/// Handle to an open conversation.
///
/// Mutating calls fail with [`ChatLinkError::ConversationNotOpen`] once the
/// conversation has been closed or another one opened in its place.
#[derive(Clone)]
pub struct Conversation {
    client: ChatLinkClient,
    chat_id: i64,
    state: SharedConversation,
}

impl fmt::Debug for Conversation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Conversation")
            .field("chat_id", &self.chat_id)
            .finish()
    }
}

impl Conversation {
    pub fn chat_id(&self) -> i64 {
        self.chat_id
    }

    fn ensure_open(&self) -> Result<()> {
        let current = self.client.inner.current.lock();
        match current.as_ref() {
            Some(state) if Arc::ptr_eq(state, &self.state) => Ok(()),
            _ => Err(ChatLinkError::ConversationNotOpen(self.chat_id)),
        }
    }

    pub fn is_open(&self) -> bool {
        self.ensure_open().is_ok()
    }

    /// Send `content` optimistically. See [`ChatLinkClient::send_message`].
    pub async fn send_message(&self, content: &str) -> Result<Message> {
        self.ensure_open()?;
        self.client.inner.reconciler.send(&self.state, content).await
    }

    pub fn set_draft(&self, text: impl Into<String>) {
        self.state.lock().draft = text.into();
    }

    pub fn draft(&self) -> String {
        self.state.lock().draft.clone()
    }

    /// Send the current draft. The draft is cleared only if the send
    /// succeeds.
    pub async fn send_draft(&self) -> Result<Message> {
        let draft = self.draft();
        self.send_message(&draft).await
    }

    /// Fetch the next older page. `Ok(None)` means a load was already in
    /// flight or the conversation closed while fetching.
    pub async fn load_older(&self) -> Result<Option<PageResult>> {
        self.ensure_open()?;
        self.client.inner.paginator.load_older(&self.state).await
    }

    /// Record a local keystroke. Ignored once the conversation is closed.
    pub fn notify_typing(&self) {
        if self.is_open() {
            let _ = self.client.notify_typing(self.chat_id);
        }
    }

    /// Messages, newest first.
    pub fn messages(&self) -> Vec<Message> {
        self.state.lock().view.messages().to_vec()
    }

    pub fn typing_users(&self) -> Vec<Username> {
        self.client.inner.typing.typing_users(self.chat_id)
    }

    pub fn has_more(&self) -> bool {
        self.state.lock().view.has_more()
    }

    pub fn snapshot(&self) -> ConversationSnapshot {
        let typing_users = self.typing_users();
        self.state.lock().snapshot(typing_users)
    }
}

/// Builder for configuring [`ChatLinkClient`] instances.
pub struct ChatLinkClientBuilder {
    base_url: Option<String>,
    api_url: Option<String>,
    local_user: Option<UserRef>,
    connection_options: ConnectionOptions,
    timeouts: ChatLinkTimeouts,
    event_handlers: EventHandlers,
    connector: Option<Arc<dyn Connector>>,
    history_fetcher: Option<Arc<dyn HistoryFetcher>>,
    event_capacity: usize,
}

impl Default for ChatLinkClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatLinkClientBuilder {
    pub fn new() -> Self {
        Self {
            base_url: None,
            api_url: None,
            local_user: None,
            connection_options: ConnectionOptions::default(),
            timeouts: ChatLinkTimeouts::default(),
            event_handlers: EventHandlers::default(),
            connector: None,
            history_fetcher: None,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    /// Start from `CHAT_LINK_URL` and `CHAT_LINK_API_URL`, when set.
    pub fn from_env() -> Self {
        let mut builder = Self::new();
        if let Ok(url) = std::env::var(ENV_BASE_URL) {
            builder = builder.base_url(url);
        }
        if let Ok(url) = std::env::var(ENV_API_URL) {
            builder = builder.api_url(url);
        }
        builder
    }

    /// Base URL of the realtime endpoint (`http(s)://` or `ws(s)://`).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Base URL of the REST API. Defaults to the base URL.
    pub fn api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = Some(url.into());
        self
    }

    pub fn local_user(mut self, user: UserRef) -> Self {
        self.local_user = Some(user);
        self
    }

    pub fn connection_options(mut self, options: ConnectionOptions) -> Self {
        self.connection_options = options;
        self
    }

    pub fn timeouts(mut self, timeouts: ChatLinkTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn event_handlers(mut self, handlers: EventHandlers) -> Self {
        self.event_handlers = handlers;
        self
    }

    /// Replace the WebSocket transport.
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Replace the HTTP history client.
    pub fn history_fetcher(mut self, fetcher: Arc<dyn HistoryFetcher>) -> Self {
        self.history_fetcher = Some(fetcher);
        self
    }

    /// Buffer size of the [`ClientEvent`] stream. Slow receivers that fall
    /// further behind than this observe a lag error.
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Build the client. Must be called inside a Tokio runtime.
    pub fn build(self) -> Result<ChatLinkClient> {
        let local_user = self
            .local_user
            .ok_or_else(|| ChatLinkError::ConfigurationError("local_user is required".into()))?;

        let connector: Arc<dyn Connector> = match self.connector {
            Some(connector) => connector,
            None => {
                let base_url = self.base_url.as_deref().ok_or_else(|| {
                    ChatLinkError::ConfigurationError("base_url is required".into())
                })?;
                Arc::new(WebSocketConnector::new(
                    base_url,
                    &self.connection_options,
                    self.timeouts.clone(),
                    self.event_handlers.clone(),
                )?)
            },
        };

        let history_fetcher: Arc<dyn HistoryFetcher> = match self.history_fetcher {
            Some(fetcher) => fetcher,
            None => {
                let api_url = self
                    .api_url
                    .as_deref()
                    .or(self.base_url.as_deref())
                    .ok_or_else(|| ChatLinkError::ConfigurationError("api_url is required".into()))?;
                Arc::new(HttpHistoryClient::new(api_url, &self.timeouts)?)
            },
        };

        let events = EventSink::new(self.event_capacity);
        let connection = ConnectionManager::new(
            connector,
            self.connection_options,
            self.timeouts,
            self.event_handlers,
        );
        let registry = SubscriptionRegistry::new(connection.clone());

        let mut state_rx = connection.watch_state();
        let forward_events = events.clone();
        let state_forwarder = tokio::spawn(async move {
            while state_rx.changed().await.is_ok() {
                let state = state_rx.borrow_and_update().clone();
                forward_events.emit(ClientEvent::ConnectionStateChanged(state));
            }
        });

        log::debug!(
            "[chat-link] Client built for {} (id={})",
            local_user.username,
            local_user.id
        );

        Ok(ChatLinkClient {
            inner: Arc::new(ClientInner {
                reconciler: MessageReconciler::new(connection.clone(), local_user.clone(), events.clone()),
                paginator: Paginator::new(history_fetcher, events.clone()),
                typing: Arc::new(TypingAggregator::new(
                    connection.clone(),
                    local_user.username.clone(),
                    events.clone(),
                )),
                notifications: Arc::new(NotificationAggregator::new(events.clone())),
                local_user,
                connection,
                registry,
                events,
                current: Mutex::new(None),
                open_lock: tokio::sync::Mutex::new(()),
                state_forwarder,
            }),
        })
    }
}
