#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Shared fixtures for the client integration tests: a mock backend plus
//! JSON builders shaped like real server responses.

use std::time::Duration;

use docchat_client::ClientConfig;
use docchat_client::DocChatClient;
use serde_json::Value;
use serde_json::json;
use wiremock::Mock;
use wiremock::MockServer;
use wiremock::Request;
use wiremock::ResponseTemplate;
use wiremock::matchers::header;
use wiremock::matchers::method;
use wiremock::matchers::path;

pub const TIMESTAMP: &str = "2025-01-15T10:30:00Z";

pub struct FakeBackend {
    pub server: MockServer,
}

impl FakeBackend {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn config(&self) -> ClientConfig {
        ClientConfig {
            request_timeout_secs: 5,
            connect_timeout_secs: 2,
            ..ClientConfig::default()
        }
        .with_base_url(self.server.uri())
    }

    pub fn client(&self) -> DocChatClient {
        DocChatClient::new(&self.config()).expect("client")
    }

    /// `POST /auth/login` answering with `token` and setting a refresh cookie.
    pub async fn mount_login(&self, token: &str) {
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("set-cookie", "refresh_token=rt-1; HttpOnly; Path=/")
                    .set_body_json(auth_json(token, "user_1")),
            )
            .mount(&self.server)
            .await;
    }

    /// `POST /auth/refresh` answering with `token` after `delay`, expected
    /// exactly `times` times.
    pub async fn mount_refresh(&self, token: &str, delay: Duration, times: u64) {
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(delay)
                    .set_body_json(auth_json(token, "user_1")),
            )
            .expect(times)
            .mount(&self.server)
            .await;
    }

    pub async fn mount_refresh_status(&self, status: u16, detail: &str, delay: Duration) {
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(
                ResponseTemplate::new(status)
                    .set_delay(delay)
                    .set_body_json(detail_json(detail)),
            )
            .mount(&self.server)
            .await;
    }

    /// `GET {route}` answering 401 to `Bearer {stale}` and `body` to
    /// `Bearer {fresh}`.
    pub async fn mount_guarded_get(&self, route: &str, stale: &str, fresh: &str, body: Value) {
        Mock::given(method("GET"))
            .and(path(route))
            .and(header("authorization", format!("Bearer {stale}").as_str()))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_json(detail_json("Could not validate credentials")),
            )
            .mount(&self.server)
            .await;
        Mock::given(method("GET"))
            .and(path(route))
            .and(header("authorization", format!("Bearer {fresh}").as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    pub async fn requests_to(&self, http_method: &str, route: &str) -> Vec<Request> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|r| r.method.as_str() == http_method && r.url.path() == route)
            .collect()
    }
}

pub fn authorization(request: &Request) -> Option<String> {
    request
        .headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

pub fn detail_json(detail: &str) -> Value {
    json!({ "detail": detail })
}

pub fn auth_json(token: &str, user_id: &str) -> Value {
    json!({
        "token": {
            "access_token": token,
            "token_type": "bearer",
            "expires_in": 900
        },
        "user_id": user_id,
        "email": "reader@example.com"
    })
}

pub fn session_json(session_id: &str, name: &str, document_count: u32) -> Value {
    json!({
        "id": format!("id_{session_id}"),
        "session_id": session_id,
        "name": name,
        "description": null,
        "document_count": document_count,
        "created_at": TIMESTAMP,
        "last_activity_at": TIMESTAMP,
        "is_active": true
    })
}

pub fn session_list_json(sessions: &[Value]) -> Value {
    json!({ "sessions": sessions, "total": sessions.len() })
}

pub fn document_json(id: &str, session_id: &str, file_name: &str, status: &str) -> Value {
    json!({
        "id": id,
        "session_id": session_id,
        "file_name": file_name,
        "file_size": 2048,
        "content_type": "application/pdf",
        "status": status,
        "chunk_count": null,
        "page_count": null,
        "error_message": null,
        "created_at": TIMESTAMP,
        "processed_at": null
    })
}

pub fn document_list_json(documents: &[Value]) -> Value {
    json!({ "documents": documents, "total": documents.len() })
}

pub fn message_json(id: &str, session_id: &str, role: &str, content: &str) -> Value {
    json!({
        "id": id,
        "session_id": session_id,
        "role": role,
        "content": content,
        "metadata": null,
        "created_at": TIMESTAMP
    })
}

pub fn message_list_json(session_id: &str, messages: &[Value]) -> Value {
    json!({ "session_id": session_id, "messages": messages, "total": messages.len() })
}

pub fn query_json(session_id: &str, query: &str, answer: &str) -> Value {
    json!({
        "success": true,
        "query": query,
        "answer": answer,
        "citations": [],
        "routing": {
            "route": "llm",
            "reasoning": "general knowledge question",
            "confidence": 0.9,
            "fallback_route": null
        },
        "visual_decision": null,
        "processing_time_ms": 42.0,
        "session_id": session_id
    })
}
