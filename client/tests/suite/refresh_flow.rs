use std::time::Duration;

use client_test_support::FakeBackend;
use client_test_support::auth_json;
use client_test_support::authorization;
use client_test_support::detail_json;
use client_test_support::document_list_json;
use client_test_support::message_list_json;
use client_test_support::session_list_json;
use docchat_client::ApiError;
use docchat_client::AuthEvent;
use docchat_client::AuthFailure;
use docchat_client::Credential;
use pretty_assertions::assert_eq;
use tokio::sync::broadcast;
use wiremock::Mock;
use wiremock::ResponseTemplate;
use wiremock::matchers::header;
use wiremock::matchers::method;
use wiremock::matchers::path;

fn drain(rx: &mut broadcast::Receiver<AuthEvent>) -> Vec<AuthEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn forced_sign_outs(events: &[AuthEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, AuthEvent::ForcedSignOut { .. }))
        .count()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_unauthorized_requests_share_one_refresh() {
    let backend = FakeBackend::start().await;
    backend
        .mount_guarded_get("/sessions", "stale", "fresh", session_list_json(&[]))
        .await;
    backend
        .mount_guarded_get(
            "/sessions/session_a/documents",
            "stale",
            "fresh",
            document_list_json(&[]),
        )
        .await;
    backend
        .mount_guarded_get(
            "/sessions/session_a/messages",
            "stale",
            "fresh",
            message_list_json("session_a", &[]),
        )
        .await;
    backend
        .mount_refresh("fresh", Duration::from_millis(200), 1)
        .await;

    let client = backend.client();
    client.credentials().set(Some(Credential::new("stale")));

    let (sessions, documents, messages) = tokio::join!(
        client.list_sessions(),
        client.list_documents("session_a"),
        client.list_messages("session_a"),
    );
    sessions.unwrap();
    documents.unwrap();
    messages.unwrap();

    assert_eq!(backend.requests_to("POST", "/auth/refresh").await.len(), 1);
    assert_eq!(client.coordinator().refresh_count(), 1);
    assert_eq!(
        client.credentials().get().map(|c| c.access_token().to_string()),
        Some("fresh".to_string())
    );

    let sent: Vec<Option<String>> = backend
        .requests_to("GET", "/sessions")
        .await
        .iter()
        .map(authorization)
        .collect();
    assert_eq!(
        sent,
        vec![
            Some("Bearer stale".to_string()),
            Some("Bearer fresh".to_string())
        ]
    );
    backend.server.verify().await;
}

#[tokio::test]
async fn replay_is_attempted_only_once() {
    let backend = FakeBackend::start().await;
    Mock::given(method("GET"))
        .and(path("/sessions"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(detail_json("Could not validate credentials")),
        )
        .mount(&backend.server)
        .await;
    backend.mount_refresh("fresh", Duration::ZERO, 1).await;

    let client = backend.client();
    client.credentials().set(Some(Credential::new("stale")));
    let mut rx = client.subscribe();

    let err = client.list_sessions().await.unwrap_err();

    assert!(matches!(
        err,
        ApiError::Unauthorized {
            kind: AuthFailure::Terminal,
            ..
        }
    ));
    assert_eq!(err.user_message(), "Could not validate credentials");
    assert_eq!(backend.requests_to("GET", "/sessions").await.len(), 2);
    assert_eq!(client.credentials().get(), None);

    let events = drain(&mut rx);
    assert_eq!(events.first(), Some(&AuthEvent::Refreshed));
    assert_eq!(forced_sign_outs(&events), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn rejected_refresh_signs_out_exactly_once() {
    let backend = FakeBackend::start().await;
    for route in ["/sessions", "/sessions/s1/documents", "/sessions/s1/messages"] {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(401).set_body_json(detail_json("Token expired")))
            .mount(&backend.server)
            .await;
    }
    backend
        .mount_refresh_status(401, "Refresh token not found", Duration::from_millis(100))
        .await;

    let client = backend.client();
    client.credentials().set(Some(Credential::new("stale")));
    let mut rx = client.subscribe();

    let (a, b, c) = tokio::join!(
        client.list_sessions(),
        client.list_documents("s1"),
        client.list_messages("s1"),
    );

    for err in [a.unwrap_err(), b.unwrap_err(), c.unwrap_err()] {
        assert!(err.is_terminal_auth(), "unexpected error: {err:?}");
    }
    assert_eq!(backend.requests_to("POST", "/auth/refresh").await.len(), 1);
    assert_eq!(client.credentials().get(), None);

    let events = drain(&mut rx);
    assert_eq!(
        events,
        vec![AuthEvent::ForcedSignOut {
            reason: "Refresh token not found".to_string()
        }]
    );
}

#[tokio::test]
async fn unavailable_refresh_keeps_the_user_signed_in() {
    let backend = FakeBackend::start().await;
    Mock::given(method("GET"))
        .and(path("/sessions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(detail_json("Token expired")))
        .mount(&backend.server)
        .await;
    backend
        .mount_refresh_status(503, "Service unavailable", Duration::ZERO)
        .await;

    let client = backend.client();
    client.credentials().set(Some(Credential::new("stale")));
    let mut rx = client.subscribe();

    let err = client.list_sessions().await.unwrap_err();

    assert!(matches!(
        err,
        ApiError::Unauthorized {
            kind: AuthFailure::RefreshUnavailable,
            ..
        }
    ));
    assert!(!err.is_terminal_auth());
    assert_eq!(client.credentials().get(), Some(Credential::new("stale")));
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn other_errors_pass_through_without_refresh() {
    let backend = FakeBackend::start().await;
    Mock::given(method("GET"))
        .and(path("/sessions/session_missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(detail_json("Session not found")))
        .mount(&backend.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/sessions/session_boom"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&backend.server)
        .await;
    backend.mount_refresh("unused", Duration::ZERO, 0).await;

    let client = backend.client();
    client.credentials().set(Some(Credential::new("valid")));

    match client.get_session("session_missing").await {
        Err(ApiError::Status { status, detail }) => {
            assert_eq!(status, 404);
            assert_eq!(detail, "Session not found");
        }
        other => panic!("unexpected result: {other:?}"),
    }
    let err = client.get_session("session_boom").await.unwrap_err();
    assert_eq!(err.status(), Some(500));
    assert_eq!(err.user_message(), "HTTP 500 Internal Server Error");

    backend.server.verify().await;
}

#[tokio::test]
async fn bad_login_is_not_treated_as_expired_session() {
    let backend = FakeBackend::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(detail_json("Incorrect email or password")),
        )
        .mount(&backend.server)
        .await;
    backend.mount_refresh("unused", Duration::ZERO, 0).await;

    let client = backend.client();
    let mut rx = client.subscribe();

    let err = client
        .login("reader@example.com", "wrong")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ApiError::Unauthorized {
            kind: AuthFailure::Anonymous,
            ..
        }
    ));
    assert_eq!(err.user_message(), "Incorrect email or password");
    assert!(drain(&mut rx).is_empty());
    backend.server.verify().await;
}

#[tokio::test]
async fn refresh_uses_cookie_from_login_and_no_bearer() {
    let backend = FakeBackend::start().await;
    backend.mount_login("from-login").await;
    backend
        .mount_guarded_get("/sessions", "from-login", "fresh", session_list_json(&[]))
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .and(header("cookie", "refresh_token=rt-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(auth_json("fresh", "user_1")))
        .expect(1)
        .mount(&backend.server)
        .await;

    let client = backend.client();
    client.login("reader@example.com", "secret").await.unwrap();
    client.list_sessions().await.unwrap();

    let refreshes = backend.requests_to("POST", "/auth/refresh").await;
    assert_eq!(refreshes.len(), 1);
    assert_eq!(authorization(&refreshes[0]), None);

    let logins = backend.requests_to("POST", "/auth/login").await;
    assert_eq!(authorization(&logins[0]), None);
    backend.server.verify().await;
}

#[tokio::test]
async fn refresh_with_oversized_lifetime_still_renews() {
    let backend = FakeBackend::start().await;
    backend
        .mount_guarded_get("/sessions", "stale", "fresh", session_list_json(&[]))
        .await;
    let mut body = auth_json("fresh", "user_1");
    body["token"]["expires_in"] = serde_json::json!(10_000_000_000_000_u64);
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(1)
        .mount(&backend.server)
        .await;

    let client = backend.client();
    client.credentials().set(Some(Credential::new("stale")));

    client.list_sessions().await.unwrap();

    let credential = client.credentials().get().unwrap();
    assert_eq!(credential.access_token(), "fresh");
    assert_eq!(credential.expires_at(), None);
    assert!(!client.coordinator().is_refreshing());
}
