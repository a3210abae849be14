use serde::{Deserialize, Serialize};

/// Outbound payload for `/app/chat.typing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingRequest {
    pub chat_id: i64,
    pub typing: bool,
}
