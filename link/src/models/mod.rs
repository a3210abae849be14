//! Data models for chat-link.
//!
//! Defines the wire payloads of the realtime topics and destinations, the
//! history page format, and connection options.

pub mod chat_notification_event;
pub mod connection_options;
pub mod membership_event;
pub mod message;
pub mod message_page;
pub mod notification;
pub mod send_message_request;
pub mod typing_event;
pub mod typing_request;
pub mod user_ref;
pub mod username;

#[cfg(test)]
mod tests;

pub use chat_notification_event::ChatNotificationEvent;
pub use connection_options::ConnectionOptions;
pub use membership_event::MembershipEvent;
pub(crate) use message::IncomingMessage;
pub use message::{Message, MessageType};
pub(crate) use message_page::IncomingPage;
pub use message_page::{MessagePage, PageRequest};
pub use notification::{Notification, NotificationKind};
pub use send_message_request::SendMessageRequest;
pub use typing_event::TypingEvent;
pub use typing_request::TypingRequest;
pub use user_ref::UserRef;
pub use username::Username;
