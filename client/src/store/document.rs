use std::fmt;

use bytes::Bytes;
use chrono::DateTime;
use chrono::Utc;
use docchat_protocol::Document;
use docchat_protocol::DocumentStatus;
use tracing::debug;
use uuid::Uuid;

use super::Entity;
use super::EntityStore;
use super::StoreSnapshot;
use crate::api::DocChatClient;
use crate::error::ApiError;
use crate::error::ApiResult;

const LOCAL_ID_PREFIX: &str = "local-";
const PDF_CONTENT_TYPE: &str = "application/pdf";

/// Placeholder shown while an upload is in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingUpload {
    pub local_id: String,
    pub session_id: String,
    pub file_name: String,
    pub file_size: u64,
    pub started_at: DateTime<Utc>,
}

/// Status as shown to the user. `Uploading` exists only on this side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalStatus {
    Uploading,
    Server(DocumentStatus),
}

impl fmt::Display for LocalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocalStatus::Uploading => f.write_str("uploading"),
            LocalStatus::Server(status) => write!(f, "{status}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrackedDocument {
    Uploading(PendingUpload),
    Stored(Document),
}

impl TrackedDocument {
    pub fn id(&self) -> &str {
        match self {
            TrackedDocument::Uploading(pending) => &pending.local_id,
            TrackedDocument::Stored(doc) => &doc.id,
        }
    }

    pub fn file_name(&self) -> &str {
        match self {
            TrackedDocument::Uploading(pending) => &pending.file_name,
            TrackedDocument::Stored(doc) => &doc.file_name,
        }
    }

    pub fn status(&self) -> LocalStatus {
        match self {
            TrackedDocument::Uploading(_) => LocalStatus::Uploading,
            TrackedDocument::Stored(doc) => LocalStatus::Server(doc.status),
        }
    }

    pub fn document(&self) -> Option<&Document> {
        match self {
            TrackedDocument::Uploading(_) => None,
            TrackedDocument::Stored(doc) => Some(doc),
        }
    }

    pub fn is_uploading(&self) -> bool {
        matches!(self, TrackedDocument::Uploading(_))
    }
}

impl Entity for TrackedDocument {
    fn entity_id(&self) -> &str {
        self.id()
    }
}

/// Documents of the selected session, newest first.
#[derive(Clone)]
pub struct DocumentStore {
    client: DocChatClient,
    store: EntityStore<TrackedDocument>,
}

impl DocumentStore {
    pub fn new(client: DocChatClient) -> Self {
        Self {
            client,
            store: EntityStore::new(),
        }
    }

    pub fn store(&self) -> &EntityStore<TrackedDocument> {
        &self.store
    }

    pub fn snapshot(&self) -> StoreSnapshot<TrackedDocument> {
        self.store.snapshot()
    }

    /// Bind to a session (or to none), dropping whatever was shown.
    pub fn reset(&self, session_id: Option<&str>) {
        self.store.reset(session_id.map(str::to_string));
    }

    /// Load the session's documents. In-flight placeholders survive.
    pub async fn list(&self, session_id: &str) -> ApiResult<Vec<Document>> {
        let _op = self.store.begin();
        let list = self
            .store
            .record(self.client.list_documents(session_id).await)?;
        let items = list
            .documents
            .iter()
            .cloned()
            .map(TrackedDocument::Stored)
            .collect();
        self.store
            .replace_all_in(session_id, items, TrackedDocument::is_uploading);
        Ok(list.documents)
    }

    /// Upload a PDF. A placeholder with status `uploading` is shown right
    /// away and swapped for the server's record on success, or removed on
    /// failure.
    pub async fn upload(
        &self,
        session_id: &str,
        file_name: &str,
        bytes: Bytes,
    ) -> ApiResult<Document> {
        self.store.record(validate_upload(file_name, &bytes))?;

        let pending = PendingUpload {
            local_id: format!("{LOCAL_ID_PREFIX}{}", Uuid::new_v4()),
            session_id: session_id.to_string(),
            file_name: file_name.to_string(),
            file_size: bytes.len() as u64,
            started_at: Utc::now(),
        };
        let local_id = pending.local_id.clone();
        let _op = self.store.begin_entity(&local_id);
        if self.store.in_scope(session_id) {
            self.store.prepend(TrackedDocument::Uploading(pending));
        }

        let result = self
            .client
            .upload_document(session_id, file_name, PDF_CONTENT_TYPE, bytes)
            .await;
        match result {
            Ok(upload) => {
                debug!(document_id = %upload.document.id, "upload accepted");
                if self.store.in_scope(&upload.document.session_id) {
                    self.store
                        .replace_id(&local_id, TrackedDocument::Stored(upload.document.clone()));
                } else {
                    self.store.remove(&local_id);
                }
                Ok(upload.document)
            }
            Err(err) => {
                self.store.remove(&local_id);
                self.store.record_error(&err);
                Err(err)
            }
        }
    }

    /// Re-read a document to pick up processing progress.
    pub async fn refresh(&self, document_id: &str) -> ApiResult<Document> {
        ensure_stored(document_id)?;
        let _op = self.store.begin_entity(document_id);
        let doc = self
            .store
            .record(self.client.get_document(document_id).await)?;
        self.apply(doc.clone());
        Ok(doc)
    }

    /// Re-run processing of a failed document.
    pub async fn retry(&self, document_id: &str) -> ApiResult<Document> {
        ensure_stored(document_id)?;
        let _op = self.store.begin_entity(document_id);
        let doc = self
            .store
            .record(self.client.retry_document(document_id).await)?;
        self.apply(doc.clone());
        Ok(doc)
    }

    pub async fn delete(&self, document_id: &str) -> ApiResult<()> {
        ensure_stored(document_id)?;
        let _op = self.store.begin_entity(document_id);
        self.store
            .record(self.client.delete_document(document_id).await)?;
        self.store.remove(document_id);
        Ok(())
    }

    fn apply(&self, doc: Document) {
        if self.store.in_scope(&doc.session_id) {
            self.store.upsert(TrackedDocument::Stored(doc));
        }
    }
}

fn validate_upload(file_name: &str, bytes: &[u8]) -> ApiResult<()> {
    if !file_name.to_ascii_lowercase().ends_with(".pdf") {
        return Err(ApiError::InvalidRequest(
            "Only PDF files are supported.".to_string(),
        ));
    }
    if bytes.is_empty() {
        return Err(ApiError::InvalidRequest("File is empty.".to_string()));
    }
    Ok(())
}

fn ensure_stored(document_id: &str) -> ApiResult<()> {
    if document_id.starts_with(LOCAL_ID_PREFIX) {
        return Err(ApiError::InvalidRequest(
            "Document is still uploading.".to_string(),
        ));
    }
    Ok(())
}
