use std::time::Duration;

use client_test_support::FakeBackend;
use client_test_support::detail_json;
use client_test_support::document_list_json;
use client_test_support::message_json;
use client_test_support::message_list_json;
use client_test_support::query_json;
use client_test_support::session_json;
use client_test_support::session_list_json;
use docchat_client::ApiError;
use docchat_client::SessionController;
use docchat_protocol::MessageRole;
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::Mock;
use wiremock::ResponseTemplate;
use wiremock::matchers::body_json;
use wiremock::matchers::method;
use wiremock::matchers::path;

async fn signed_in_controller(backend: &FakeBackend) -> SessionController {
    backend.mount_login("token-1").await;
    Mock::given(method("GET"))
        .and(path("/sessions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(session_list_json(&[])))
        .mount(&backend.server)
        .await;
    let controller = SessionController::new(backend.client());
    controller.login("a@b.com", "Secret123").await.unwrap();
    controller
}

#[tokio::test]
async fn create_session_then_ask_a_question() {
    let backend = FakeBackend::start().await;
    Mock::given(method("POST"))
        .and(path("/sessions"))
        .and(body_json(json!({"name": "Thesis"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(session_json(
            "session_a1b2",
            "Thesis",
            0,
        )))
        .expect(1)
        .mount(&backend.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/sessions/session_a1b2/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(query_json(
            "session_a1b2",
            "What is the claim?",
            "A neural network architecture.",
        )))
        .mount(&backend.server)
        .await;
    let controller = signed_in_controller(&backend).await;
    assert_eq!(controller.user().unwrap().user_id, "user_1");

    let session = controller.create_session("  Thesis ", None).await.unwrap();

    assert_eq!(session.document_count, 0);
    assert_eq!(controller.current_session_id(), Some("session_a1b2".to_string()));
    assert_eq!(controller.sessions().snapshot().items[0].session_id, "session_a1b2");
    assert!(controller.documents().snapshot().items.is_empty());

    let answer = controller.ask("What is the claim?").await.unwrap();

    assert_eq!(answer.role, MessageRole::Assistant);
    assert!(answer.citations().is_empty());
    let history = controller.messages().snapshot().items;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, MessageRole::User);
    assert_eq!(history[0].content, "What is the claim?");
    assert_eq!(history[1].role, MessageRole::Assistant);
    assert_eq!(history[1].content, "A neural network architecture.");
    backend.server.verify().await;
}

#[tokio::test]
async fn blank_session_name_never_reaches_the_server() {
    let backend = FakeBackend::start().await;
    let controller = signed_in_controller(&backend).await;

    let err = controller.create_session("   ", None).await.unwrap_err();

    assert!(matches!(err, ApiError::InvalidRequest(_)));
    assert_eq!(
        controller.sessions().snapshot().error,
        Some("Session name cannot be empty.".to_string())
    );
    assert!(backend.requests_to("POST", "/sessions").await.is_empty());
    assert_eq!(controller.current_session_id(), None);
}

#[tokio::test]
async fn selecting_a_session_loads_documents_and_history() {
    let backend = FakeBackend::start().await;
    Mock::given(method("GET"))
        .and(path("/sessions/s1/documents"))
        .respond_with(ResponseTemplate::new(200).set_body_json(document_list_json(&[
            client_test_support::document_json("doc_1", "s1", "paper.pdf", "indexed"),
        ])))
        .mount(&backend.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/sessions/s1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(message_list_json(
            "s1",
            &[
                message_json("m1", "s1", "user", "hi"),
                message_json("m2", "s1", "assistant", "hello"),
            ],
        )))
        .mount(&backend.server)
        .await;
    let controller = signed_in_controller(&backend).await;

    controller.select_session("s1").await.unwrap();

    assert_eq!(controller.documents().snapshot().items.len(), 1);
    let roles: Vec<MessageRole> = controller
        .messages()
        .snapshot()
        .items
        .iter()
        .map(|m| m.role)
        .collect();
    assert_eq!(roles, vec![MessageRole::User, MessageRole::Assistant]);
}

#[tokio::test]
async fn deleting_current_session_clears_selection() {
    let backend = FakeBackend::start().await;
    Mock::given(method("POST"))
        .and(path("/sessions"))
        .respond_with(ResponseTemplate::new(201).set_body_json(session_json("s9", "Scratch", 0)))
        .mount(&backend.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/sessions/s9/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(query_json("s9", "q", "a")))
        .mount(&backend.server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/sessions/s9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "message": "Session 's9' deleted successfully"
        })))
        .mount(&backend.server)
        .await;
    let controller = signed_in_controller(&backend).await;
    controller.create_session("Scratch", None).await.unwrap();
    controller.ask("q").await.unwrap();

    controller.delete_session("s9").await.unwrap();

    assert_eq!(controller.current_session_id(), None);
    assert!(controller.sessions().snapshot().items.is_empty());
    assert!(controller.messages().snapshot().items.is_empty());
    assert!(controller.documents().snapshot().items.is_empty());
    assert!(matches!(
        controller.ask("anyone there?").await,
        Err(ApiError::InvalidRequest(_))
    ));
}

#[tokio::test]
async fn forced_sign_out_is_observed_and_clears_state() {
    let backend = FakeBackend::start().await;
    Mock::given(method("POST"))
        .and(path("/sessions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(detail_json("Token expired")))
        .mount(&backend.server)
        .await;
    backend
        .mount_refresh_status(401, "Refresh token expired", Duration::ZERO)
        .await;
    let controller = signed_in_controller(&backend).await;
    let watcher = tokio::spawn(SessionController::watch_sign_out(controller.subscribe()));

    let err = controller.create_session("Thesis", None).await.unwrap_err();
    assert!(err.is_terminal_auth());

    let reason = tokio::time::timeout(Duration::from_secs(2), watcher)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reason, Some("Refresh token expired".to_string()));

    controller.handle_forced_sign_out();
    assert_eq!(controller.user(), None);
    assert!(!controller.client().is_signed_in());
    assert!(controller.sessions().snapshot().items.is_empty());
}

#[tokio::test]
async fn deleting_another_session_keeps_the_selection() {
    let backend = FakeBackend::start().await;
    Mock::given(method("POST"))
        .and(path("/sessions"))
        .and(body_json(json!({"name": "Keep"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(session_json("s_keep", "Keep", 0)))
        .mount(&backend.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/sessions"))
        .and(body_json(json!({"name": "Drop"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(session_json("s_drop", "Drop", 0)))
        .mount(&backend.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/sessions/s_keep/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(query_json("s_keep", "q", "a")))
        .mount(&backend.server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/sessions/s_drop"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "message": "Session 's_drop' deleted successfully"
        })))
        .mount(&backend.server)
        .await;
    let controller = signed_in_controller(&backend).await;
    controller.create_session("Drop", None).await.unwrap();
    controller.create_session("Keep", None).await.unwrap();
    controller.ask("q").await.unwrap();

    controller.delete_session("s_drop").await.unwrap();

    assert_eq!(controller.current_session_id(), Some("s_keep".to_string()));
    assert_eq!(controller.messages().snapshot().items.len(), 2);
    let remaining: Vec<String> = controller
        .sessions()
        .snapshot()
        .items
        .iter()
        .map(|s| s.session_id.clone())
        .collect();
    assert_eq!(remaining, vec!["s_keep".to_string()]);
}

#[tokio::test]
async fn store_sees_refreshed_request_as_plain_success() {
    let backend = FakeBackend::start().await;
    backend.mount_login("token-1").await;
    backend
        .mount_guarded_get(
            "/sessions",
            "token-1",
            "token-2",
            session_list_json(&[session_json("s1", "Thesis", 0)]),
        )
        .await;
    backend
        .mount_refresh("token-2", Duration::ZERO, 1)
        .await;
    let controller = SessionController::new(backend.client());

    controller.login("a@b.com", "Secret123").await.unwrap();

    let snapshot = controller.sessions().snapshot();
    assert_eq!(snapshot.items.len(), 1);
    assert_eq!(snapshot.error, None);
    assert!(!snapshot.loading);
    backend.server.verify().await;
}
