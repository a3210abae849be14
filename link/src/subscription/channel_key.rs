use std::fmt;

/// Application destinations for outbound frames.
pub mod destinations {
    pub const SEND_MESSAGE: &str = "/app/chat.send";
    pub const SEND_TYPING: &str = "/app/chat.typing";
}

/// What a logical channel carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChannelKind {
    /// Confirmed messages of one conversation.
    Messages,
    /// Typing signals of one conversation.
    Typing,
    /// Message digests of one conversation, used for notifications.
    Notifications,
    /// Chat membership changes of one user.
    MembershipFeed,
}

/// Identity of a logical channel: `(kind, chatId | userId)`.
///
/// The registry keeps at most one live subscription per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelKey {
    pub kind: ChannelKind,
    pub id: i64,
}

impl ChannelKey {
    pub fn new(kind: ChannelKind, id: i64) -> Self {
        Self { kind, id }
    }

    pub fn messages(chat_id: i64) -> Self {
        Self::new(ChannelKind::Messages, chat_id)
    }

    pub fn typing(chat_id: i64) -> Self {
        Self::new(ChannelKind::Typing, chat_id)
    }

    pub fn notifications(chat_id: i64) -> Self {
        Self::new(ChannelKind::Notifications, chat_id)
    }

    pub fn membership(user_id: i64) -> Self {
        Self::new(ChannelKind::MembershipFeed, user_id)
    }

    /// Broker topic this key subscribes to.
    pub fn topic(&self) -> String {
        match self.kind {
            ChannelKind::Messages => format!("/topic/chat.{}", self.id),
            ChannelKind::Typing => format!("/topic/chat.{}.typing", self.id),
            ChannelKind::Notifications => format!("/topic/notifications.{}", self.id),
            ChannelKind::MembershipFeed => format!("/topic/user.{}.chats", self.id),
        }
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ChannelKind::Messages => write!(f, "chat_{}", self.id),
            ChannelKind::Typing => write!(f, "typing_{}", self.id),
            ChannelKind::Notifications => write!(f, "notification_{}", self.id),
            ChannelKind::MembershipFeed => write!(f, "new_chats_{}", self.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topics() {
        assert_eq!(ChannelKey::messages(7).topic(), "/topic/chat.7");
        assert_eq!(ChannelKey::typing(7).topic(), "/topic/chat.7.typing");
        assert_eq!(ChannelKey::notifications(7).topic(), "/topic/notifications.7");
        assert_eq!(ChannelKey::membership(42).topic(), "/topic/user.42.chats");
    }

    #[test]
    fn test_display_names() {
        assert_eq!(ChannelKey::messages(7).to_string(), "chat_7");
        assert_eq!(ChannelKey::membership(42).to_string(), "new_chats_42");
        assert_ne!(ChannelKey::messages(7), ChannelKey::typing(7));
    }
}
