//! Ties the three stores to a single selected session and to the
//! authentication lifecycle.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use bytes::Bytes;
use docchat_protocol::AuthResponse;
use docchat_protocol::Document;
use docchat_protocol::Message;
use docchat_protocol::Session;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::info;

use crate::api::DocChatClient;
use crate::error::ApiError;
use crate::error::ApiResult;
use crate::events::AuthEvent;
use crate::store::DocumentStore;
use crate::store::MessageStore;
use crate::store::SessionStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedInUser {
    pub user_id: String,
    pub email: Option<String>,
}

#[derive(Debug, Default)]
struct Selection {
    user: Option<SignedInUser>,
    current_session: Option<String>,
}

#[derive(Clone)]
pub struct SessionController {
    client: DocChatClient,
    sessions: SessionStore,
    documents: DocumentStore,
    messages: MessageStore,
    selection: Arc<Mutex<Selection>>,
}

impl SessionController {
    pub fn new(client: DocChatClient) -> Self {
        Self {
            sessions: SessionStore::new(client.clone()),
            documents: DocumentStore::new(client.clone()),
            messages: MessageStore::new(client.clone()),
            client,
            selection: Arc::new(Mutex::new(Selection::default())),
        }
    }

    pub fn client(&self) -> &DocChatClient {
        &self.client
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn documents(&self) -> &DocumentStore {
        &self.documents
    }

    pub fn messages(&self) -> &MessageStore {
        &self.messages
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.client.subscribe()
    }

    pub fn user(&self) -> Option<SignedInUser> {
        self.lock().user.clone()
    }

    pub fn current_session_id(&self) -> Option<String> {
        self.lock().current_session.clone()
    }

    pub fn current_session(&self) -> Option<Session> {
        self.current_session_id()
            .and_then(|id| self.sessions.get(&id))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Selection> {
        self.selection.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn require_session(&self) -> ApiResult<String> {
        self.current_session_id().ok_or_else(|| {
            ApiError::InvalidRequest("Select or create a session first.".to_string())
        })
    }

    // ---- auth ----

    pub async fn login(&self, email: &str, password: &str) -> ApiResult<AuthResponse> {
        let auth = self.client.login(email, password).await?;
        self.signed_in(&auth).await;
        Ok(auth)
    }

    pub async fn signup(&self, email: &str, password: &str) -> ApiResult<AuthResponse> {
        let auth = self.client.signup(email, password).await?;
        self.signed_in(&auth).await;
        Ok(auth)
    }

    async fn signed_in(&self, auth: &AuthResponse) {
        self.reset_all();
        self.lock().user = Some(SignedInUser {
            user_id: auth.user_id.clone(),
            email: auth.email.clone(),
        });
        // A failed initial load is recorded in the session store; the
        // sign-in itself still succeeded.
        let _ = self.sessions.list().await;
    }

    pub async fn logout(&self) -> ApiResult<()> {
        self.client.logout().await?;
        self.reset_all();
        Ok(())
    }

    /// Drop every piece of per-user state after the credential was revoked.
    pub fn handle_forced_sign_out(&self) {
        info!("clearing client state after forced sign-out");
        self.reset_all();
    }

    /// Resolves with the reason of the next forced sign-out, or `None` once
    /// the event channel is closed.
    pub async fn watch_sign_out(mut events: broadcast::Receiver<AuthEvent>) -> Option<String> {
        loop {
            match events.recv().await {
                Ok(AuthEvent::ForcedSignOut { reason }) => return Some(reason),
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => return None,
            }
        }
    }

    fn reset_all(&self) {
        {
            let mut selection = self.lock();
            selection.user = None;
            selection.current_session = None;
        }
        self.sessions.clear();
        self.documents.reset(None);
        self.messages.reset(None);
    }

    // ---- sessions ----

    pub async fn load_sessions(&self) -> ApiResult<Vec<Session>> {
        self.sessions.list().await
    }

    /// Make `session_id` current and load its documents and history.
    pub async fn select_session(&self, session_id: &str) -> ApiResult<()> {
        self.bind(session_id);
        let (documents, messages) = tokio::join!(
            self.documents.list(session_id),
            self.messages.list(session_id)
        );
        documents?;
        messages?;
        Ok(())
    }

    pub async fn create_session(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> ApiResult<Session> {
        let session = self.sessions.create(name, description).await?;
        // A new session has nothing to load yet.
        self.bind(&session.session_id);
        Ok(session)
    }

    pub async fn rename_session(&self, session_id: &str, name: &str) -> ApiResult<Session> {
        self.sessions.rename(session_id, name).await
    }

    /// Delete a session. Deleting the current one clears the selection
    /// together with the documents and messages shown for it.
    pub async fn delete_session(&self, session_id: &str) -> ApiResult<()> {
        self.sessions.delete(session_id).await?;
        let was_current = {
            let mut selection = self.lock();
            let was_current = selection.current_session.as_deref() == Some(session_id);
            if was_current {
                selection.current_session = None;
            }
            was_current
        };
        if was_current {
            self.documents.reset(None);
            self.messages.reset(None);
        }
        Ok(())
    }

    fn bind(&self, session_id: &str) {
        self.lock().current_session = Some(session_id.to_string());
        self.documents.reset(Some(session_id));
        self.messages.reset(Some(session_id));
    }

    // ---- documents ----

    pub async fn refresh_documents(&self) -> ApiResult<Vec<Document>> {
        let session_id = self.require_session()?;
        self.documents.list(&session_id).await
    }

    pub async fn upload_document(&self, file_name: &str, bytes: Bytes) -> ApiResult<Document> {
        let session_id = self.require_session()?;
        self.documents.upload(&session_id, file_name, bytes).await
    }

    pub async fn refresh_document(&self, document_id: &str) -> ApiResult<Document> {
        self.documents.refresh(document_id).await
    }

    pub async fn retry_document(&self, document_id: &str) -> ApiResult<Document> {
        self.documents.retry(document_id).await
    }

    pub async fn delete_document(&self, document_id: &str) -> ApiResult<()> {
        self.documents.delete(document_id).await
    }

    // ---- messages ----

    pub async fn refresh_messages(&self) -> ApiResult<Vec<Message>> {
        let session_id = self.require_session()?;
        self.messages.list(&session_id).await
    }

    pub async fn ask(&self, query: &str) -> ApiResult<Message> {
        let session_id = self.require_session()?;
        self.messages.ask(&session_id, query).await
    }
}
