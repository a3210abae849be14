//! Typing debounce and notification routing through the client, on a paused
//! clock.

use std::time::Duration;

use chat_link::{ChatLinkError, ClientEvent, NotificationKind, TypingRequest, Username, NOTIFICATION_TTL};
use tokio::time::sleep;

mod common;
use common::{eventually, MemoryBroker, StoredHistory};

const TYPING: &str = "/app/chat.typing";

fn typing_published(broker: &MemoryBroker) -> Vec<bool> {
    broker
        .published(TYPING)
        .iter()
        .map(|body| serde_json::from_str::<TypingRequest>(body).unwrap().typing)
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_typing_is_debounced() {
    let broker = MemoryBroker::new();
    let client = common::client(&broker, StoredHistory::new(0));
    let conversation = client.open_conversation(7).await.unwrap();

    conversation.notify_typing();
    sleep(Duration::from_millis(500)).await;
    conversation.notify_typing();
    sleep(Duration::from_millis(500)).await;
    conversation.notify_typing();

    sleep(Duration::from_millis(1900)).await;
    assert_eq!(typing_published(&broker), vec![true]);

    sleep(Duration::from_millis(200)).await;
    assert_eq!(typing_published(&broker), vec![true, false]);

    let request: TypingRequest = serde_json::from_str(&broker.published(TYPING)[0]).unwrap();
    assert_eq!(request.chat_id, 7);
}

#[tokio::test(start_paused = true)]
async fn test_closing_conversation_flushes_typing_stop() {
    let broker = MemoryBroker::new();
    let client = common::client(&broker, StoredHistory::new(0));
    let conversation = client.open_conversation(7).await.unwrap();

    conversation.notify_typing();
    sleep(Duration::from_millis(100)).await;
    client.close_conversation().await;

    assert_eq!(typing_published(&broker), vec![true, false]);
    conversation.notify_typing();
    sleep(Duration::from_millis(100)).await;
    assert_eq!(typing_published(&broker).len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_typing_requires_open_conversation() {
    let broker = MemoryBroker::new();
    let client = common::client(&broker, StoredHistory::new(0));
    client.connect().await.unwrap();

    assert_eq!(
        client.notify_typing(9).unwrap_err(),
        ChatLinkError::ConversationNotOpen(9)
    );

    client.open_conversation(7).await.unwrap();
    assert_eq!(
        client.notify_typing(8).unwrap_err(),
        ChatLinkError::ConversationNotOpen(8)
    );
    client.notify_typing(7).unwrap();
    client.close_conversation().await;
    assert_eq!(typing_published(&broker), vec![true, false]);

    assert!(client.notify_typing(7).is_err());
    sleep(Duration::from_secs(5)).await;
    assert_eq!(typing_published(&broker), vec![true, false]);
}

#[tokio::test(start_paused = true)]
async fn test_remote_typing_excludes_local_user() {
    let broker = MemoryBroker::new();
    let client = common::client(&broker, StoredHistory::new(0));
    let conversation = client.open_conversation(7).await.unwrap();

    broker.deliver("/topic/chat.7.typing", r#"{"username":"alice","typing":true}"#);
    broker.deliver("/topic/chat.7.typing", r#"{"username":"bob","typing":true}"#);
    eventually("bob typing", || conversation.typing_users() == vec![Username::new("bob")]).await;

    broker.deliver("/topic/chat.7.typing", r#"{"username":"bob","typing":false}"#);
    eventually("bob stopped", || conversation.typing_users().is_empty()).await;
}

#[tokio::test(start_paused = true)]
async fn test_notifications_skip_open_chat_and_expire() {
    let broker = MemoryBroker::new();
    let client = common::client(&broker, StoredHistory::new(0));
    let mut events = client.events();

    client.watch_chat(7, Some("General".into())).await.unwrap();
    client.watch_chat(8, Some("Lunch".into())).await.unwrap();
    client.open_conversation(7).await.unwrap();

    broker.deliver("/topic/notifications.7", r#"{"sender":"bob","content":"in view"}"#);
    broker.deliver("/topic/notifications.8", r#"{"sender":"bob","content":"pizza?"}"#);
    eventually("one notification", || client.notifications().len() == 1).await;

    let notification = client.notifications().remove(0);
    assert_eq!(notification.chat_id, 8);
    assert_eq!(notification.kind, NotificationKind::Message);
    assert_eq!(notification.title, "New message in Lunch");
    assert_eq!(notification.body, "bob: pizza?");

    sleep(NOTIFICATION_TTL + Duration::from_millis(10)).await;
    assert!(client.notifications().is_empty());

    let mut added = 0;
    let mut removed = 0;
    while let Ok(event) = events.try_recv() {
        match event {
            ClientEvent::NotificationAdded(_) => added += 1,
            ClientEvent::NotificationRemoved { id } if id == notification.id => removed += 1,
            _ => {},
        }
    }
    assert_eq!((added, removed), (1, 1));
}

#[tokio::test(start_paused = true)]
async fn test_membership_event_refreshes_chat_list() {
    let broker = MemoryBroker::new();
    let client = common::client(&broker, StoredHistory::new(0));
    let mut events = client.events();
    client.watch_membership(1).await.unwrap();

    broker.deliver("/topic/user.1.chats", r#"{"chatId":12,"content":"bob added you to Lunch"}"#);
    eventually("membership notification", || client.notifications().len() == 1).await;

    let notification = client.notifications().remove(0);
    assert_eq!(notification.kind, NotificationKind::Membership);
    assert_eq!(notification.title, "New chat added");

    let mut saw_refresh = false;
    while let Ok(event) = events.try_recv() {
        saw_refresh |= event == ClientEvent::ChatListChanged;
    }
    assert!(saw_refresh);

    assert_eq!(client.dismiss_notification(notification.id), Some(notification));
    assert!(client.notifications().is_empty());
}
