//! HttpHistoryClient against a local HTTP stub.

use chat_link::{ChatLinkError, ChatLinkTimeouts, HistoryFetcher, HttpHistoryClient, PageRequest};

mod common;
use common::{bob, message_json, CannedResponse, HttpStub};

fn page_body(ids: &[i64], has_next: bool) -> String {
    let content: Vec<serde_json::Value> = ids
        .iter()
        .map(|id| serde_json::from_str(&message_json(*id, 0, "hi", &bob())).unwrap())
        .collect();
    serde_json::json!({ "content": content, "hasNext": has_next }).to_string()
}

fn request() -> PageRequest {
    PageRequest {
        page_size: 30,
        page_num: 2,
        before: 1_700_000_000_000,
    }
}

#[tokio::test]
async fn test_fetch_page_sends_cursor_and_fills_chat_id() {
    let stub = HttpStub::start(vec![CannedResponse::json(page_body(&[9, 8], true))]).await;
    let client = HttpHistoryClient::new(&stub.base_url, &ChatLinkTimeouts::fast()).unwrap();

    let page = client.fetch_page(7, request()).await.unwrap();
    assert!(page.has_next);
    assert_eq!(page.content.len(), 2);
    assert!(page.content.iter().all(|m| m.chat_id == 7));

    let requests = stub.requests.lock();
    let line = &requests[0];
    assert!(line.starts_with("GET /message/7/get?"));
    assert!(line.contains("pageSize=30"));
    assert!(line.contains("pageNum=2"));
    assert!(line.contains("before=1700000000000"));
}

#[tokio::test]
async fn test_rate_limited_fetch_is_retried_once() {
    let stub = HttpStub::start(vec![
        CannedResponse::too_many_requests(0),
        CannedResponse::json(page_body(&[5], false)),
    ])
    .await;
    let client = HttpHistoryClient::new(&stub.base_url, &ChatLinkTimeouts::fast()).unwrap();

    let page = client.fetch_page(7, request()).await.unwrap();
    assert_eq!(page.content.len(), 1);
    assert_eq!(stub.requests.lock().len(), 2);
}

#[tokio::test]
async fn test_second_rate_limit_is_terminal() {
    let stub = HttpStub::start(vec![
        CannedResponse::too_many_requests(0),
        CannedResponse::too_many_requests(0),
        CannedResponse::json(page_body(&[5], false)),
    ])
    .await;
    let client = HttpHistoryClient::new(&stub.base_url, &ChatLinkTimeouts::fast()).unwrap();

    let err = client.fetch_page(7, request()).await.unwrap_err();
    assert!(matches!(err, ChatLinkError::ServerRateLimited { .. }));
    assert_eq!(stub.requests.lock().len(), 2);
}

#[tokio::test]
async fn test_server_error_is_reported() {
    let stub = HttpStub::start(vec![CannedResponse {
        status: 503,
        headers: Vec::new(),
        body: "maintenance".to_string(),
    }])
    .await;
    let client = HttpHistoryClient::new(&stub.base_url, &ChatLinkTimeouts::fast()).unwrap();

    match client.fetch_page(7, request()).await.unwrap_err() {
        ChatLinkError::ServerError { status_code, message } => {
            assert_eq!(status_code, 503);
            assert_eq!(message, "maintenance");
        },
        other => panic!("unexpected error {:?}", other),
    }
}
