use serde::{Deserialize, Serialize};

use super::username::Username;

/// Reference to a chat participant as carried inside messages.
///
/// Only the fields the synchronization core needs are modeled; additional
/// profile fields on the wire are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRef {
    pub id: i64,
    pub username: Username,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl UserRef {
    pub fn new(id: i64, username: impl Into<Username>) -> Self {
        Self {
            id,
            username: username.into(),
            display_name: None,
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    /// Two references denote the same participant when their ids match.
    pub fn is_same_user(&self, other: &UserRef) -> bool {
        self.id == other.id
    }
}
