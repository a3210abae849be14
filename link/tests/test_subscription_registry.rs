//! SubscriptionRegistry lifecycle against the in-memory broker.
//!
//! - Subscribing twice to one key leaves exactly one live handler
//! - Frames arriving after cancel never reach the cancelled handler
//! - A stale handle cannot cancel a newer subscription
//! - Malformed payloads are dropped without ending the subscription

use std::sync::Arc;

use chat_link::{
    ChannelEvent, ChannelKey, ChatLinkTimeouts, ConnectionManager, ConnectionOptions, EventHandlers,
    SubscriptionRegistry,
};
use parking_lot::Mutex;

mod common;
use common::{bob, eventually, message_json, MemoryBroker};

fn registry(broker: &MemoryBroker) -> SubscriptionRegistry {
    SubscriptionRegistry::new(ConnectionManager::new(
        broker.connector(),
        ConnectionOptions::default(),
        ChatLinkTimeouts::fast(),
        EventHandlers::new(),
    ))
}

fn collector() -> (Arc<Mutex<Vec<ChannelEvent>>>, impl FnMut(ChannelEvent) + Send + 'static) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    (events, move |event| sink.lock().push(event))
}

#[tokio::test]
async fn test_resubscribe_replaces_previous_handler() {
    let broker = MemoryBroker::new();
    let registry = registry(&broker);
    let key = ChannelKey::messages(7);

    let (first_events, first) = collector();
    let (second_events, second) = collector();
    registry.subscribe(key, first).await.unwrap();
    registry.subscribe(key, second).await.unwrap();

    assert_eq!(registry.active_keys().await, vec![key]);
    assert_eq!(broker.subscriber_count("/topic/chat.7"), 1);

    broker.deliver("/topic/chat.7", &message_json(1, 7, "hi", &bob()));
    eventually("second handler", || second_events.lock().len() == 1).await;
    assert!(first_events.lock().is_empty());
}

#[tokio::test]
async fn test_cancelled_handler_sees_no_more_frames() {
    let broker = MemoryBroker::new();
    let registry = registry(&broker);
    let key = ChannelKey::typing(7);

    let (events, handler) = collector();
    let subscription = registry.subscribe(key, handler).await.unwrap();

    broker.deliver("/topic/chat.7.typing", r#"{"username":"bob","typing":true}"#);
    eventually("first frame", || events.lock().len() == 1).await;

    assert!(subscription.cancel().await);
    assert!(!registry.is_subscribed(&key).await);

    broker.deliver("/topic/chat.7.typing", r#"{"username":"bob","typing":false}"#);
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(events.lock().len(), 1);
}

#[tokio::test]
async fn test_stale_handle_does_not_cancel_newer_subscription() {
    let broker = MemoryBroker::new();
    let registry = registry(&broker);
    let key = ChannelKey::notifications(3);

    let (_old_events, old_handler) = collector();
    let (_new_events, new_handler) = collector();
    let old = registry.subscribe(key, old_handler).await.unwrap();
    let new = registry.subscribe(key, new_handler).await.unwrap();
    assert!(new.generation() > old.generation());

    assert!(!old.cancel().await);
    assert!(registry.is_subscribed(&key).await);

    assert!(registry.unsubscribe(&key).await);
    assert!(!registry.unsubscribe(&key).await);
    eventually("broker unsubscribe", || broker.subscriber_count("/topic/notifications.3") == 0).await;
}

#[tokio::test]
async fn test_malformed_frame_is_dropped() {
    let broker = MemoryBroker::new();
    let registry = registry(&broker);
    let (events, handler) = collector();
    registry.subscribe(ChannelKey::messages(7), handler).await.unwrap();

    broker.deliver("/topic/chat.7", "{not json");
    broker.deliver("/topic/chat.7", r#"{"id":"wrong type"}"#);
    broker.deliver("/topic/chat.7", &message_json(2, 7, "still alive", &bob()));

    eventually("valid frame", || events.lock().len() == 1).await;
    match &events.lock()[0] {
        ChannelEvent::Message(message) => assert_eq!(message.content, "still alive"),
        other => panic!("unexpected event {:?}", other),
    }
    assert!(registry.connection().is_connected());
}
