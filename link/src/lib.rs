//! # chat-link
//!
//! Realtime synchronization core for a group chat client.
//!
//! One STOMP-over-WebSocket connection is shared by every channel the client
//! listens on. On top of it sit:
//!
//! - [`SubscriptionRegistry`]: one live handler per [`ChannelKey`], with
//!   transparent re-subscription after reconnects
//! - optimistic sends that are reconciled against the server's confirmed
//!   messages, and rolled back if the publish fails
//! - backward history paging over HTTP, pinned to the moment the
//!   conversation was opened
//! - typing indicators (debounced outbound, expiring inbound)
//! - transient notifications for chats that are not open
//!
//! [`ChatLinkClient`] ties these together.
//!
//! ```rust,no_run
//! use chat_link::{ChatLinkClient, ClientEvent, UserRef};
//!
//! # async fn example() -> chat_link::Result<()> {
//! let client = ChatLinkClient::builder()
//!     .base_url("http://localhost:8080")
//!     .local_user(UserRef::new(1, "alice"))
//!     .build()?;
//! let mut events = client.events();
//!
//! let conversation = client.open_conversation(7).await?;
//! conversation.load_older().await?;
//! conversation.send_message("hello").await?;
//!
//! while let Ok(event) = events.recv().await {
//!     if let ClientEvent::ConversationUpdated { .. } = event {
//!         for message in conversation.messages() {
//!             println!("{}: {}", message.sender.username, message.content);
//!         }
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod connection;
pub mod conversation;
pub mod error;
pub mod event_handlers;
pub mod events;
pub mod history;
pub mod models;
pub mod notifications;
pub mod stomp;
pub mod subscription;
pub mod timeouts;
pub mod typing;

pub use client::{ChatLinkClient, ChatLinkClientBuilder, Conversation, ENV_API_URL, ENV_BASE_URL};
pub use connection::{
    resolve_ws_url, ConnectionManager, ConnectionState, Connector, Transport, WebSocketConnector,
};
pub use conversation::{ConversationSnapshot, InboundOutcome, PageResult, MIN_SEND_INTERVAL, PAGE_SIZE};
pub use error::{ChatLinkError, Result};
pub use event_handlers::{ConnectionError, DisconnectReason, EventHandlers};
pub use events::ClientEvent;
pub use history::{HistoryFetcher, HttpHistoryClient};
pub use models::{
    ChatNotificationEvent, ConnectionOptions, MembershipEvent, Message, MessagePage, MessageType,
    Notification, NotificationKind, PageRequest, SendMessageRequest, TypingEvent, TypingRequest,
    UserRef, Username,
};
pub use notifications::NOTIFICATION_TTL;
pub use stomp::{StompCommand, StompFrame};
pub use subscription::{ChannelEvent, ChannelKey, ChannelKind, Subscription, SubscriptionRegistry};
pub use timeouts::{ChatLinkTimeouts, ChatLinkTimeoutsBuilder};
pub use typing::{REMOTE_TYPING_TTL, TYPING_IDLE};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
