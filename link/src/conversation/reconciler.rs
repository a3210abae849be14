//! Optimistic sends and their reconciliation with confirmed messages.
//!
//! A send shows up in the view immediately with a negative id. When the
//! broker echoes the confirmed message back on the conversation topic, the
//! provisional entry is swapped for it in place. If the publish fails the
//! provisional entry, its pending record and the rate-limit slot are all
//! rolled back.

use std::time::Duration;

use tokio::time::Instant;
use uuid::Uuid;

use super::pending::PendingSend;
use super::{now_ms, ConversationState, SharedConversation};
use crate::connection::ConnectionManager;
use crate::error::{ChatLinkError, Result};
use crate::events::{ClientEvent, EventSink};
use crate::models::{Message, SendMessageRequest, UserRef};
use crate::subscription::destinations;

/// Minimum spacing between two accepted sends in one conversation.
pub const MIN_SEND_INTERVAL: Duration = Duration::from_millis(500);

/// What happened to an inbound confirmed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundOutcome {
    /// Replaced optimistic message `optimistic_id` at its position.
    Reconciled { optimistic_id: i64 },
    /// Prepended to the view.
    Inserted,
    /// Its id was already in the view.
    Duplicate,
    /// Not for this conversation.
    Ignored,
}

pub(crate) struct MessageReconciler {
    connection: ConnectionManager,
    local_user: UserRef,
    events: EventSink,
}

impl MessageReconciler {
    pub(crate) fn new(connection: ConnectionManager, local_user: UserRef, events: EventSink) -> Self {
        Self {
            connection,
            local_user,
            events,
        }
    }

    /// Send `content` to the conversation held by `state`.
    ///
    /// Returns the optimistic message on success. The confirmed message
    /// replaces it later, when it arrives on the conversation topic.
    pub(crate) async fn send(&self, state: &SharedConversation, content: &str) -> Result<Message> {
        let content = content.trim();

        let (message, claimed_at, previous_send) = {
            let mut st = state.lock();
            let now = Instant::now();
            if let Some(last) = st.last_send {
                let elapsed = now.saturating_duration_since(last);
                if elapsed < MIN_SEND_INTERVAL {
                    return Err(ChatLinkError::RateLimited {
                        retry_in: MIN_SEND_INTERVAL - elapsed,
                    });
                }
            }
            if content.is_empty() {
                return Err(ChatLinkError::EmptyMessage);
            }

            let sent_at = now_ms();
            let id = st.view.free_optimistic_id(-sent_at);
            let client_msg_id = Uuid::new_v4().to_string();
            let message = Message::optimistic(
                id,
                st.chat_id(),
                self.local_user.clone(),
                content,
                sent_at,
                Some(client_msg_id.clone()),
            );
            st.view.insert_head(message.clone());
            st.pending.push(
                content,
                PendingSend {
                    optimistic_id: id,
                    client_msg_id,
                },
            );
            let previous = st.last_send.replace(now);
            (message, now, previous)
        };
        let chat_id = message.chat_id;
        self.events.emit(ClientEvent::ConversationUpdated { chat_id });

        let request = SendMessageRequest {
            chat_id,
            content: content.to_string(),
            client_msg_id: message.client_msg_id.clone(),
        };
        let outbound = OutboundSend {
            state: state.clone(),
            events: self.events.clone(),
            message,
            claimed_at,
            previous_send,
        };
        let connection = self.connection.clone();

        // Publish and compensate on a task of its own; it settles even if the
        // caller stops waiting.
        let settle = tokio::spawn(async move {
            let published = match serde_json::to_string(&request) {
                Ok(body) => connection.publish(destinations::SEND_MESSAGE, body).await,
                Err(e) => Err(e.into()),
            };
            outbound.settle(&request.content, published)
        });
        settle
            .await
            .map_err(|e| ChatLinkError::SendFailed(format!("send task ended: {}", e)))?
    }
}

/// An accepted send whose publish has not settled yet.
struct OutboundSend {
    state: SharedConversation,
    events: EventSink,
    message: Message,
    claimed_at: Instant,
    previous_send: Option<Instant>,
}

impl OutboundSend {
    /// Keep the optimistic entry on success; otherwise remove it, its pending
    /// record and the rate-limit claim.
    fn settle(self, content: &str, published: Result<()>) -> Result<Message> {
        let chat_id = self.message.chat_id;
        match published {
            Ok(()) => {
                self.state.lock().draft.clear();
                log::debug!(
                    "[chat-link] Sent message {} to chat {}",
                    self.message.id,
                    chat_id
                );
                self.events.emit(ClientEvent::ConversationUpdated { chat_id });
                Ok(self.message)
            },
            Err(e) => {
                {
                    let mut st = self.state.lock();
                    st.view.remove(self.message.id);
                    st.pending.remove(content, self.message.id);
                    if st.last_send == Some(self.claimed_at) {
                        st.last_send = self.previous_send;
                    }
                }
                log::warn!("[chat-link] Send to chat {} failed, rolled back: {}", chat_id, e);
                self.events.emit(ClientEvent::ConversationUpdated { chat_id });
                Err(match e {
                    ChatLinkError::SendFailed(_) => e,
                    other => ChatLinkError::SendFailed(other.to_string()),
                })
            },
        }
    }
}

/// Fold a confirmed message into the view.
///
/// A message from the local user first looks for its pending record by
/// the echoed `clientMsgId`, then by content (oldest first). A match
/// replaces the optimistic entry in place; anything else is prepended.
pub(crate) fn reconcile_inbound(
    state: &mut ConversationState,
    message: Message,
    local_user: &UserRef,
) -> InboundOutcome {
    if message.chat_id != state.chat_id() || message.is_optimistic() {
        return InboundOutcome::Ignored;
    }
    if state.view.contains_id(message.id) {
        return InboundOutcome::Duplicate;
    }

    if message.sender.is_same_user(local_user) {
        let matched = message
            .client_msg_id
            .as_deref()
            .and_then(|token| state.pending.take_by_token(token))
            .or_else(|| state.pending.take_oldest(&message.content));
        if let Some(pending) = matched {
            if state.view.contains_id(pending.optimistic_id) {
                state.view.replace(pending.optimistic_id, message);
                return InboundOutcome::Reconciled {
                    optimistic_id: pending.optimistic_id,
                };
            }
        }
    }

    state.view.insert_head(message);
    InboundOutcome::Inserted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessageType;

    fn alice() -> UserRef {
        UserRef::new(1, "alice")
    }

    fn confirmed(id: i64, content: &str, sender: UserRef, token: Option<&str>) -> Message {
        Message {
            id,
            content: content.to_string(),
            created_at: 1_000,
            modified_at: 1_000,
            message_type: MessageType::Chat,
            sender,
            chat_id: 7,
            client_msg_id: token.map(str::to_string),
        }
    }

    fn with_optimistic(state: &mut ConversationState, id: i64, content: &str, token: &str) {
        let message = Message::optimistic(id, 7, alice(), content, 1_000, Some(token.to_string()));
        state.view.insert_head(message);
        state.pending.push(
            content,
            PendingSend {
                optimistic_id: id,
                client_msg_id: token.to_string(),
            },
        );
    }

    #[test]
    fn test_confirmation_replaces_optimistic_in_place() {
        let mut state = ConversationState::new(7, 0);
        state.view.insert_head(confirmed(400, "earlier", UserRef::new(2, "bob"), None));
        with_optimistic(&mut state, -1_000, "hello", "t1");

        let outcome = reconcile_inbound(&mut state, confirmed(501, "hello", alice(), None), &alice());
        assert_eq!(outcome, InboundOutcome::Reconciled { optimistic_id: -1_000 });

        let ids: Vec<i64> = state.view.messages().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![501, 400]);
        assert!(state.pending.is_empty());
    }

    #[test]
    fn test_same_content_from_someone_else_is_prepended() {
        let mut state = ConversationState::new(7, 0);
        with_optimistic(&mut state, -1_000, "hello", "t1");

        let outcome = reconcile_inbound(
            &mut state,
            confirmed(501, "hello", UserRef::new(2, "bob"), None),
            &alice(),
        );
        assert_eq!(outcome, InboundOutcome::Inserted);
        assert_eq!(state.view.messages().len(), 2);
        assert!(state.pending.contains("hello"));
    }

    #[test]
    fn test_echoed_token_wins_over_content_order() {
        let mut state = ConversationState::new(7, 0);
        with_optimistic(&mut state, -1_000, "hi", "first");
        with_optimistic(&mut state, -1_001, "hi", "second");

        let outcome = reconcile_inbound(
            &mut state,
            confirmed(600, "hi", alice(), Some("second")),
            &alice(),
        );
        assert_eq!(outcome, InboundOutcome::Reconciled { optimistic_id: -1_001 });
        assert!(state.view.contains_id(-1_000));
        assert_eq!(state.pending.len(), 1);
    }

    #[test]
    fn test_duplicate_and_foreign_messages() {
        let mut state = ConversationState::new(7, 0);
        let bob = UserRef::new(2, "bob");
        assert_eq!(
            reconcile_inbound(&mut state, confirmed(10, "x", bob.clone(), None), &alice()),
            InboundOutcome::Inserted
        );
        assert_eq!(
            reconcile_inbound(&mut state, confirmed(10, "x", bob.clone(), None), &alice()),
            InboundOutcome::Duplicate
        );
        let mut other_chat = confirmed(11, "y", bob, None);
        other_chat.chat_id = 8;
        assert_eq!(
            reconcile_inbound(&mut state, other_chat, &alice()),
            InboundOutcome::Ignored
        );
        assert_eq!(state.view.messages().len(), 1);
    }
}
