use serde_json::json;

use super::*;

// ==================== ConnectionOptions Tests ====================

#[test]
fn test_connection_options_default() {
    let opts = ConnectionOptions::default();

    assert!(opts.auto_reconnect, "auto_reconnect should default to true");
    assert_eq!(opts.reconnect_delay_ms, 5000, "reconnect delay is a fixed 5s");
    assert!(opts.max_reconnect_attempts.is_none());
    assert_eq!(opts.heartbeat_outgoing_ms, 4000);
    assert_eq!(opts.heartbeat_incoming_ms, 4000);
    assert_eq!(opts.ws_path, "/ws");
}

#[test]
fn test_connection_options_builder_pattern() {
    let opts = ConnectionOptions::new()
        .with_auto_reconnect(false)
        .with_reconnect_delay_ms(250)
        .with_max_reconnect_attempts(Some(5))
        .with_heartbeat_ms(0, 10_000)
        .with_ws_path("/stomp");

    assert!(!opts.auto_reconnect);
    assert_eq!(opts.reconnect_delay_ms, 250);
    assert_eq!(opts.max_reconnect_attempts, Some(5));
    assert_eq!(opts.heartbeat_outgoing_ms, 0);
    assert_eq!(opts.heartbeat_incoming_ms, 10_000);
    assert_eq!(opts.ws_path, "/stomp");
}

#[test]
fn test_connection_options_deserialization_with_defaults() {
    let json = r#"{"auto_reconnect": false}"#;
    let opts: ConnectionOptions = serde_json::from_str(json).unwrap();

    assert!(!opts.auto_reconnect);
    assert_eq!(opts.reconnect_delay_ms, 5000);
    assert_eq!(opts.heartbeat_incoming_ms, 4000);
    assert_eq!(opts.ws_path, "/ws");
}

// ==================== Message Tests ====================

#[test]
fn test_message_deserialize_server_shape() {
    let value = json!({
        "id": 501,
        "content": "hello",
        "createdAt": 1_700_000_000_000i64,
        "modifiedAt": 1_700_000_000_000i64,
        "messageType": "USER_CHAT",
        "sender": { "id": 1, "username": "alice", "displayName": "Alice", "role": "USER" },
        "groupChat": { "id": 7, "name": "general" }
    });

    let message: Message = serde_json::from_value(value).unwrap();
    assert_eq!(message.id, 501);
    assert_eq!(message.message_type, MessageType::Chat);
    assert_eq!(message.sender.username.as_str(), "alice");
    assert_eq!(message.sender.display_name.as_deref(), Some("Alice"));
    // chatId absent on the wire: left at 0 for the dispatcher to fill in
    assert_eq!(message.chat_id, 0);
    assert!(message.client_msg_id.is_none());
    assert!(!message.is_optimistic());
}

#[test]
fn test_message_type_accepts_short_names() {
    let value = json!({
        "id": 3,
        "content": "bob joined",
        "type": "JOIN",
        "sender": { "id": 2, "username": "bob" },
        "chatId": 7
    });
    let message: Message = serde_json::from_value(value).unwrap();
    assert_eq!(message.message_type, MessageType::Join);
    assert_eq!(message.chat_id, 7);

    let out = serde_json::to_value(&message).unwrap();
    assert_eq!(out["messageType"], "USER_JOIN");
}

#[test]
fn test_optimistic_message() {
    let sender = UserRef::new(1, "alice");
    let message = Message::optimistic(-42, 7, sender.clone(), "hi", 1_000, Some("tok".into()));

    assert!(message.is_optimistic());
    assert_eq!(message.created_at, 1_000);
    assert_eq!(message.modified_at, 1_000);
    assert_eq!(message.message_type, MessageType::Chat);
    assert_eq!(message.sender, sender);
    assert_eq!(message.client_msg_id.as_deref(), Some("tok"));
}

// ==================== Payload Tests ====================

#[test]
fn test_outbound_payload_shapes() {
    let send = SendMessageRequest {
        chat_id: 7,
        content: "hello".into(),
        client_msg_id: None,
    };
    assert_eq!(
        serde_json::to_value(&send).unwrap(),
        json!({ "chatId": 7, "content": "hello" })
    );

    let typing = TypingRequest {
        chat_id: 7,
        typing: true,
    };
    assert_eq!(
        serde_json::to_value(typing).unwrap(),
        json!({ "chatId": 7, "typing": true })
    );
}

#[test]
fn test_inbound_payload_shapes() {
    let typing: TypingEvent =
        serde_json::from_str(r#"{"username":"bob","typing":false}"#).unwrap();
    assert_eq!(typing.username, Username::new("bob"));
    assert!(!typing.typing);

    let digest: ChatNotificationEvent =
        serde_json::from_str(r#"{"sender":"bob","content":"hey"}"#).unwrap();
    assert_eq!(digest.sender, "bob");

    let membership: MembershipEvent =
        serde_json::from_str(r#"{"chatId":12,"content":"You were added to design"}"#).unwrap();
    assert_eq!(membership.chat_id, 12);
}

#[test]
fn test_message_page_defaults() {
    let page: MessagePage = serde_json::from_str(r#"{"content":[]}"#).unwrap();
    assert!(page.content.is_empty());
    assert!(!page.has_next);

    let query = serde_json::to_value(PageRequest {
        page_size: 30,
        page_num: 2,
        before: 99,
    })
    .unwrap();
    assert_eq!(query, json!({ "pageSize": 30, "pageNum": 2, "before": 99 }));
}

#[test]
fn test_user_ref_identity_is_by_id() {
    let a = UserRef::new(1, "alice");
    let renamed = UserRef::new(1, "alice2").with_display_name("Alice");
    let b = UserRef::new(2, "alice");

    assert!(a.is_same_user(&renamed));
    assert!(!a.is_same_user(&b));
}

#[test]
fn test_incoming_page_fills_only_missing_chat_ids() {
    let page: IncomingPage = serde_json::from_value(json!({
        "content": [
            { "id": 3, "content": "a", "sender": { "id": 2, "username": "bob" } },
            { "id": 2, "content": "b", "sender": { "id": 2, "username": "bob" }, "chatId": 0 },
            { "id": 1, "content": "c", "type": "CHAT", "sender": { "id": 2, "username": "bob" }, "chatId": 7 }
        ],
        "hasNext": true
    }))
    .unwrap();

    let page = page.into_page(7);
    let chats: Vec<(i64, i64)> = page.content.iter().map(|m| (m.id, m.chat_id)).collect();
    assert_eq!(chats, vec![(3, 7), (2, 0), (1, 7)]);
    assert_eq!(page.content[2].message_type, MessageType::Chat);
    assert!(page.has_next);
}
