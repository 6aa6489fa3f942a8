//! End-to-end flows over real HTTP against a wiremock server.

use std::sync::Arc;

use mirai_client::{
    ChatBackend, HistoryDirectory, HistorySelector, HttpChatBackend, HttpConfig, SessionController,
};
use mirai_core::{ConversationId, Role, SendOutcome};
use mirai_store::{Database, DraftCache};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const HELLO_BODY: &str = concat!(
    "data: {\"choices\":[{\"delta\":{\"content\":\"hi\"}}]}\n",
    "data: {\"choices\":[{\"delta\":{\"content\":\" there\"}}]}\n",
    "data: [DONE]\n",
);

fn controller(server: &MockServer) -> SessionController {
    let backend: Arc<dyn ChatBackend> =
        Arc::new(HttpChatBackend::new(HttpConfig::new(server.uri())).unwrap());
    SessionController::new(backend)
}

fn stream_response(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/event-stream")
        .set_body_string(body.to_string())
}

#[tokio::test]
async fn hello_round_trip_with_header_id_and_title() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat/stream"))
        .and(body_partial_json(json!({"conversation_id": 0})))
        .respond_with(stream_response(HELLO_BODY).insert_header("X-Conversation-Id", "42"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/chat/conversations/42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 42,
            "title": "Small talk",
            "created_at": "2026-01-01T00:00:00Z",
            "updated_at": "2026-01-01T00:00:00Z",
            "messages": []
        })))
        .expect(1)
        .mount(&server)
        .await;

    let drafts = DraftCache::new(Database::in_memory().unwrap());
    let controller = controller(&server).with_drafts(drafts.clone());
    let outcome = controller.send("hello").await;

    assert_eq!(outcome, SendOutcome::Completed { reply: "hi there".into() });
    let state = controller.state();
    assert_eq!(state.conversation_id, ConversationId::new(42));
    assert_eq!(state.title.as_deref(), Some("Small talk"));
    let messages: Vec<(Role, &str)> = state
        .messages
        .iter()
        .map(|m| (m.role, m.content.as_str()))
        .collect();
    assert_eq!(messages, vec![(Role::User, "hello"), (Role::Assistant, "hi there")]);
    controller.drafts_settled().await;
    assert_eq!(drafts.load().unwrap(), Some(state));
}

#[tokio::test]
async fn malformed_line_between_deltas() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat/stream"))
        .respond_with(stream_response(concat!(
            ": ok\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"hi\"}}]}\n",
            "data: {not-json}\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\" there\"}}]}\n",
            "data: [DONE]\n",
        )))
        .mount(&server)
        .await;

    let controller = controller(&server);
    let outcome = controller.send("hello").await;
    assert_eq!(outcome, SendOutcome::Completed { reply: "hi there".into() });
    assert_eq!(controller.state().messages.len(), 2);
}

#[tokio::test]
async fn server_error_becomes_error_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat/stream"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let controller = controller(&server);
    let outcome = controller.send("hello").await;
    assert!(matches!(outcome, SendOutcome::Failed(ref e) if e.status() == Some(502)));
    let state = controller.state();
    assert_eq!(state.messages.len(), 2);
    assert_eq!(state.messages[1].content, "Error: HTTP 502");
    assert!(!controller.is_sending());
}

#[tokio::test]
async fn history_selection_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/chat/conversations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 8, "title": "Recipes", "message_count": 2,
             "created_at": "2026-01-01T00:00:00Z", "updated_at": "2026-01-02T00:00:00Z"}
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/chat/conversations/8"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 8,
            "title": "Recipes",
            "created_at": "2026-01-01T00:00:00Z",
            "updated_at": "2026-01-02T00:00:00Z",
            "messages": [
                {"role": "user", "content": "soup?", "created_at": "2026-01-01T00:00:00Z"},
                {"role": "assistant", "content": "tomato", "created_at": "2026-01-01T00:00:01Z"}
            ]
        })))
        .mount(&server)
        .await;

    let controller = controller(&server);
    let mut selector = HistorySelector::new(HistoryDirectory::new(controller.backend().clone()));

    selector.toggle().await;
    assert_eq!(selector.entries.len(), 1);
    assert_eq!(selector.entries[0].label(), "Recipes");

    let id = selector.entries[0].id;
    selector.select(id, &controller).await.unwrap();
    assert!(!selector.open);
    let state = controller.state();
    assert_eq!(state.conversation_id, ConversationId::new(8));
    assert_eq!(state.messages[1].content, "tomato");
}
