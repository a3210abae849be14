use serde::{Deserialize, Serialize};

/// Inbound membership change on `/topic/user.{userId}.chats`, e.g. the local
/// user was added to a new chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipEvent {
    pub chat_id: i64,
    pub content: String,
}
