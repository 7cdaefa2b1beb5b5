//! Typed client for the DocChat backend.
//!
//! Every call goes through one [`RequestPipeline`], so all of them share the
//! credential store, the cookie jar and the refresh coordinator.

use std::sync::Arc;

use bytes::Bytes;
use docchat_protocol::AuthResponse;
use docchat_protocol::Credentials;
use docchat_protocol::Document;
use docchat_protocol::QueryRequest;
use docchat_protocol::QueryResponse;
use docchat_protocol::Session;
use docchat_protocol::SessionCreate;
use docchat_protocol::SessionUpdate;
use docchat_protocol::StatusResponse;
use docchat_protocol::document::DocumentList;
use docchat_protocol::document::DocumentUpload;
use docchat_protocol::message::MessageList;
use docchat_protocol::session::SessionList;
use tokio::sync::broadcast;
use tracing::info;
use tracing::warn;

use crate::config::ClientConfig;
use crate::credentials::Credential;
use crate::credentials::CredentialStore;
use crate::error::ApiError;
use crate::error::ApiResult;
use crate::events::AuthEvent;
use crate::events::AuthEvents;
use crate::pipeline::FilePart;
use crate::pipeline::RequestPipeline;
use crate::pipeline::RequestSpec;
use crate::refresh::HttpRefresher;
use crate::refresh::RefreshCoordinator;
use crate::refresh::Refresher;

pub const MAX_SESSION_NAME_LEN: usize = 255;
pub const MAX_SESSION_DESCRIPTION_LEN: usize = 1000;
pub const MAX_QUERY_LEN: usize = 5000;

#[derive(Clone)]
pub struct DocChatClient {
    pipeline: Arc<RequestPipeline>,
    credentials: CredentialStore,
    coordinator: RefreshCoordinator,
    events: AuthEvents,
    session_page_size: u32,
}

impl DocChatClient {
    /// Build a client whose refresh goes to `POST {base_url}/auth/refresh`.
    pub fn new(config: &ClientConfig) -> ApiResult<Self> {
        let (http, base_url) = http_client(config)?;
        let refresh_url = RequestSpec::post(["auth", "refresh"]).url_for(&base_url)?;
        let refresher = Arc::new(HttpRefresher::new(http.clone(), refresh_url));
        Ok(Self::assemble(http, base_url, refresher, config.session_page_size))
    }

    /// Like [`new`](Self::new) with a custom refresh implementation.
    pub fn with_refresher(config: &ClientConfig, refresher: Arc<dyn Refresher>) -> ApiResult<Self> {
        let (http, base_url) = http_client(config)?;
        Ok(Self::assemble(http, base_url, refresher, config.session_page_size))
    }

    fn assemble(
        http: reqwest::Client,
        base_url: url::Url,
        refresher: Arc<dyn Refresher>,
        session_page_size: u32,
    ) -> Self {
        let credentials = CredentialStore::new();
        let events = AuthEvents::new();
        let coordinator = RefreshCoordinator::new(refresher, credentials.clone(), events.clone());
        let pipeline =
            RequestPipeline::new(http, base_url, credentials.clone(), coordinator.clone());
        Self {
            pipeline: Arc::new(pipeline),
            credentials,
            coordinator,
            events,
            session_page_size,
        }
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    pub fn is_signed_in(&self) -> bool {
        self.credentials.is_present()
    }

    // ---- auth ----

    pub async fn signup(&self, email: &str, password: &str) -> ApiResult<AuthResponse> {
        let body = validate_credentials(email, password)?;
        let spec = RequestSpec::post(["auth", "signup"]).json(&body)?.anonymous();
        self.authenticate(spec).await
    }

    pub async fn login(&self, email: &str, password: &str) -> ApiResult<AuthResponse> {
        let body = validate_credentials(email, password)?;
        let spec = RequestSpec::post(["auth", "login"]).json(&body)?.anonymous();
        self.authenticate(spec).await
    }

    async fn authenticate(&self, spec: RequestSpec) -> ApiResult<AuthResponse> {
        let auth: AuthResponse = self.pipeline.call_json(&spec).await?;
        self.credentials.set(Some(Credential::from_token(&auth.token)));
        info!(user_id = %auth.user_id, "signed in");
        self.events.emit(AuthEvent::SignedIn {
            user_id: auth.user_id.clone(),
        });
        Ok(auth)
    }

    /// Ask the server to drop the refresh cookie, then forget the credential.
    /// Local state is cleared even if the server call fails.
    pub async fn logout(&self) -> ApiResult<()> {
        let spec = RequestSpec::post(["auth", "logout"]).anonymous();
        if let Err(err) = self.pipeline.call(&spec).await {
            warn!(error = %err, "logout request failed; clearing local credential anyway");
        }
        self.credentials.clear();
        self.events.emit(AuthEvent::SignedOut);
        Ok(())
    }

    // ---- sessions ----

    pub async fn list_sessions(&self) -> ApiResult<SessionList> {
        let spec = RequestSpec::get(["sessions"])
            .query_param("skip", 0)
            .query_param("limit", self.session_page_size);
        self.pipeline.call_json(&spec).await
    }

    pub async fn create_session(&self, body: &SessionCreate) -> ApiResult<Session> {
        let spec = RequestSpec::post(["sessions"]).json(body)?;
        self.pipeline.call_json(&spec).await
    }

    pub async fn get_session(&self, session_id: &str) -> ApiResult<Session> {
        self.pipeline
            .call_json(&RequestSpec::get(["sessions", session_id]))
            .await
    }

    pub async fn update_session(
        &self,
        session_id: &str,
        body: &SessionUpdate,
    ) -> ApiResult<Session> {
        let spec = RequestSpec::patch(["sessions", session_id]).json(body)?;
        self.pipeline.call_json(&spec).await
    }

    pub async fn delete_session(&self, session_id: &str) -> ApiResult<StatusResponse> {
        self.pipeline
            .call_json(&RequestSpec::delete(["sessions", session_id]))
            .await
    }

    /// Conversation history, oldest first.
    pub async fn list_messages(&self, session_id: &str) -> ApiResult<MessageList> {
        self.pipeline
            .call_json(&RequestSpec::get(["sessions", session_id, "messages"]))
            .await
    }

    // ---- documents ----

    pub async fn upload_document(
        &self,
        session_id: &str,
        file_name: &str,
        content_type: &str,
        bytes: Bytes,
    ) -> ApiResult<DocumentUpload> {
        let spec = RequestSpec::post(["sessions", session_id, "upload"]).file(FilePart {
            field: "file".to_string(),
            file_name: file_name.to_string(),
            content_type: content_type.to_string(),
            bytes,
        });
        self.pipeline.call_json(&spec).await
    }

    pub async fn list_documents(&self, session_id: &str) -> ApiResult<DocumentList> {
        self.pipeline
            .call_json(&RequestSpec::get(["sessions", session_id, "documents"]))
            .await
    }

    pub async fn get_document(&self, document_id: &str) -> ApiResult<Document> {
        self.pipeline
            .call_json(&RequestSpec::get(["documents", document_id]))
            .await
    }

    pub async fn delete_document(&self, document_id: &str) -> ApiResult<StatusResponse> {
        self.pipeline
            .call_json(&RequestSpec::delete(["documents", document_id]))
            .await
    }

    /// Re-run processing for a document in the `failed` state.
    pub async fn retry_document(&self, document_id: &str) -> ApiResult<Document> {
        self.pipeline
            .call_json(&RequestSpec::post(["documents", document_id, "retry"]))
            .await
    }

    // ---- query ----

    pub async fn query(
        &self,
        session_id: &str,
        request: &QueryRequest,
    ) -> ApiResult<QueryResponse> {
        let spec = RequestSpec::post(["sessions", session_id, "query"]).json(request)?;
        self.pipeline.call_json(&spec).await
    }
}

/// One HTTP client per `DocChatClient`; its cookie jar holds the refresh
/// cookie set at login.
fn http_client(config: &ClientConfig) -> ApiResult<(reqwest::Client, url::Url)> {
    let base_url = config
        .base_url()
        .map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
    let http = reqwest::Client::builder()
        .cookie_store(true)
        .timeout(config.request_timeout())
        .connect_timeout(config.connect_timeout())
        .user_agent(config.user_agent.clone())
        .build()?;
    Ok((http, base_url))
}

fn validate_credentials(email: &str, password: &str) -> ApiResult<Credentials> {
    let email = email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(ApiError::InvalidRequest(
            "Enter a valid email address.".to_string(),
        ));
    }
    if password.is_empty() {
        return Err(ApiError::InvalidRequest("Password is required.".to_string()));
    }
    Ok(Credentials {
        email: email.to_string(),
        password: password.to_string(),
    })
}
