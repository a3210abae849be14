use serde::{Deserialize, Serialize};

use super::user_ref::UserRef;

/// Kind of a chat message.
///
/// Serialized with the server's `USER_*` names; the short forms are accepted
/// on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MessageType {
    #[serde(rename = "USER_JOIN", alias = "JOIN")]
    Join,
    #[serde(rename = "USER_LEAVE", alias = "LEAVE")]
    Leave,
    #[default]
    #[serde(rename = "USER_CHAT", alias = "CHAT")]
    Chat,
    #[serde(rename = "USER_RENAME", alias = "RENAME")]
    Rename,
}

/// A chat message, either server-confirmed (`id >= 0`) or optimistic
/// (`id < 0`, created locally and not yet acknowledged).
///
/// Timestamps are milliseconds since the Unix epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: i64,
    pub content: String,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub modified_at: i64,
    #[serde(default, alias = "type")]
    pub message_type: MessageType,
    pub sender: UserRef,
    /// Filled from the topic when the server omits it.
    #[serde(default)]
    pub chat_id: i64,
    /// Client correlation token, echoed back by servers that support it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_msg_id: Option<String>,
}

/// A message as it arrives from the server. Topic frames and history pages
/// may omit `chatId`; the receiver supplies it from context.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct IncomingMessage {
    #[serde(default)]
    chat_id: Option<i64>,
    #[serde(flatten)]
    message: Message,
}

impl IncomingMessage {
    /// The message, stamped with `chat_id` only when the payload had none.
    pub(crate) fn into_message(self, chat_id: i64) -> Message {
        Message {
            chat_id: self.chat_id.unwrap_or(chat_id),
            ..self.message
        }
    }
}

impl Message {
    /// Build a provisional message for a local send.
    pub fn optimistic(
        id: i64,
        chat_id: i64,
        sender: UserRef,
        content: impl Into<String>,
        now_ms: i64,
        client_msg_id: Option<String>,
    ) -> Self {
        debug_assert!(id < 0, "optimistic ids are negative");
        Self {
            id,
            content: content.into(),
            created_at: now_ms,
            modified_at: now_ms,
            message_type: MessageType::Chat,
            sender,
            chat_id,
            client_msg_id,
        }
    }

    /// `true` for locally-generated, unconfirmed messages.
    pub fn is_optimistic(&self) -> bool {
        self.id < 0
    }
}
