use serde::{Deserialize, Serialize};

/// What produced a [`Notification`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// A message arrived in a chat that is not in view.
    Message,
    /// The local user's chat membership changed.
    Membership,
}

/// Transient, user-facing notice. Removed after its time-to-live or when
/// dismissed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Client-assigned id, used for dismissal.
    pub id: u64,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub chat_id: i64,
}
