//! Per-conversation state: the message view, optimistic sends and history
//! paging.
//!
//! - [`view`]: ordered, duplicate-free message list and pagination cursor
//! - [`pending`]: outbound contents awaiting server confirmation
//! - [`reconciler`]: optimistic send, rollback and inbound reconciliation
//! - [`paginator`]: backward history fetch guarded by an in-flight flag
//!
//! All of it lives in one [`ConversationState`] behind a `parking_lot`
//! mutex. The lock is only ever taken for short synchronous sections and
//! never held across an `.await`.

pub(crate) mod paginator;
pub(crate) mod pending;
pub(crate) mod reconciler;
pub(crate) mod view;

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::models::{Message, Username};

pub use paginator::{PageResult, PAGE_SIZE};
pub use reconciler::{InboundOutcome, MIN_SEND_INTERVAL};

use pending::PendingSends;
use view::ConversationView;

/// Current time in millis since Unix epoch.
#[inline]
pub(crate) fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

#[derive(Debug)]
pub(crate) struct ConversationState {
    pub(crate) view: ConversationView,
    pub(crate) pending: PendingSends,
    /// Input buffer.
    pub(crate) draft: String,
    /// When the last accepted send claimed the rate-limit slot.
    pub(crate) last_send: Option<Instant>,
    /// A history fetch is outstanding.
    pub(crate) loading: bool,
    /// The conversation was closed or re-opened; late results are dropped.
    pub(crate) closed: bool,
}

pub(crate) type SharedConversation = Arc<Mutex<ConversationState>>;

impl ConversationState {
    pub(crate) fn new(chat_id: i64, opened_at_ms: i64) -> Self {
        Self {
            view: ConversationView::new(chat_id, opened_at_ms),
            pending: PendingSends::default(),
            draft: String::new(),
            last_send: None,
            loading: false,
            closed: false,
        }
    }

    pub(crate) fn shared(chat_id: i64, opened_at_ms: i64) -> SharedConversation {
        Arc::new(Mutex::new(Self::new(chat_id, opened_at_ms)))
    }

    pub(crate) fn chat_id(&self) -> i64 {
        self.view.chat_id()
    }

    pub(crate) fn snapshot(&self, typing_users: Vec<Username>) -> ConversationSnapshot {
        ConversationSnapshot {
            chat_id: self.view.chat_id(),
            messages: self.view.messages().to_vec(),
            has_more: self.view.has_more(),
            page_num: self.view.page_num(),
            before: self.view.before(),
            loading: self.loading,
            pending_sends: self.pending.len(),
            draft: self.draft.clone(),
            typing_users,
        }
    }
}

/// Point-in-time copy of an open conversation, for rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationSnapshot {
    pub chat_id: i64,
    /// Newest first.
    pub messages: Vec<Message>,
    pub has_more: bool,
    pub page_num: u32,
    /// History cursor fixed when the conversation was opened.
    pub before: i64,
    pub loading: bool,
    pub pending_sends: usize,
    pub draft: String,
    pub typing_users: Vec<Username>,
}
