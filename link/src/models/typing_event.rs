use serde::{Deserialize, Serialize};

use super::username::Username;

/// Inbound typing signal on `/topic/chat.{chatId}.typing`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingEvent {
    pub username: Username,
    pub typing: bool,
}
