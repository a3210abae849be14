use serde::{Deserialize, Serialize};

use super::message::{IncomingMessage, Message};

/// One page of history from `GET /message/{chatId}/get`.
///
/// `content` is ordered newest-first, like the conversation view.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePage {
    #[serde(default)]
    pub content: Vec<Message>,
    #[serde(default)]
    pub has_next: bool,
}

/// Wire form of [`MessagePage`] before messages are stamped with their chat.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct IncomingPage {
    #[serde(default)]
    content: Vec<IncomingMessage>,
    #[serde(default)]
    has_next: bool,
}

impl IncomingPage {
    pub(crate) fn into_page(self, chat_id: i64) -> MessagePage {
        MessagePage {
            content: self
                .content
                .into_iter()
                .map(|m| m.into_message(chat_id))
                .collect(),
            has_next: self.has_next,
        }
    }
}

/// Query parameters for a history page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    pub page_size: u32,
    pub page_num: u32,
    /// Snapshot boundary, milliseconds since the Unix epoch.
    pub before: i64,
}
