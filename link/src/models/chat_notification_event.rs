use serde::{Deserialize, Serialize};

/// Inbound message digest on `/topic/notifications.{chatId}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatNotificationEvent {
    /// Username of the author.
    pub sender: String,
    pub content: String,
}
