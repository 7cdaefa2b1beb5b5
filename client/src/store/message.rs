use chrono::Utc;
use docchat_protocol::Message;
use docchat_protocol::MessageMetadata;
use docchat_protocol::MessageRole;
use docchat_protocol::QueryRequest;
use docchat_protocol::QueryResponse;
use uuid::Uuid;

use super::Entity;
use super::EntityStore;
use super::StoreSnapshot;
use crate::api::DocChatClient;
use crate::api::MAX_QUERY_LEN;
use crate::error::ApiError;
use crate::error::ApiResult;

impl Entity for Message {
    fn entity_id(&self) -> &str {
        &self.id
    }
}

/// Conversation of the selected session, oldest first.
#[derive(Clone)]
pub struct MessageStore {
    client: DocChatClient,
    store: EntityStore<Message>,
}

impl MessageStore {
    pub fn new(client: DocChatClient) -> Self {
        Self {
            client,
            store: EntityStore::new(),
        }
    }

    pub fn store(&self) -> &EntityStore<Message> {
        &self.store
    }

    pub fn snapshot(&self) -> StoreSnapshot<Message> {
        self.store.snapshot()
    }

    pub fn reset(&self, session_id: Option<&str>) {
        self.store.reset(session_id.map(str::to_string));
    }

    pub async fn list(&self, session_id: &str) -> ApiResult<Vec<Message>> {
        let _op = self.store.begin();
        let list = self
            .store
            .record(self.client.list_messages(session_id).await)?;
        self.store
            .replace_all_in(session_id, list.messages.clone(), |_| false);
        Ok(list.messages)
    }

    /// Add a message locally without contacting the server.
    pub fn append(&self, message: Message) {
        self.store.append(message);
    }

    /// Send a question. The user's message is shown immediately and the
    /// assistant's answer is appended when it arrives. On failure the user's
    /// message is withdrawn and the error is recorded.
    pub async fn ask(&self, session_id: &str, query: &str) -> ApiResult<Message> {
        let query = self.store.record(validate_query(query))?;
        let _op = self.store.begin();
        let question_id = local_id();
        if self.store.in_scope(session_id) {
            self.store.append(Message {
                id: question_id.clone(),
                session_id: session_id.to_string(),
                role: MessageRole::User,
                content: query.clone(),
                metadata: None,
                created_at: Utc::now(),
            });
        }

        let response = match self
            .client
            .query(session_id, &QueryRequest::new(query))
            .await
        {
            Ok(response) => response,
            Err(err) => {
                self.store.remove(&question_id);
                self.store.record_error(&err);
                return Err(err);
            }
        };
        let answer = assistant_message(session_id, response);
        if self.store.in_scope(session_id) {
            self.store.append(answer.clone());
        }
        Ok(answer)
    }
}

fn local_id() -> String {
    format!("local-{}", Uuid::new_v4())
}

fn validate_query(query: &str) -> ApiResult<String> {
    let query = query.trim();
    if query.is_empty() {
        return Err(ApiError::InvalidRequest(
            "Question cannot be empty.".to_string(),
        ));
    }
    if query.chars().count() > MAX_QUERY_LEN {
        return Err(ApiError::InvalidRequest(format!(
            "Question must be at most {MAX_QUERY_LEN} characters."
        )));
    }
    Ok(query.to_string())
}

fn assistant_message(session_id: &str, response: QueryResponse) -> Message {
    Message {
        id: local_id(),
        session_id: session_id.to_string(),
        role: MessageRole::Assistant,
        content: response.answer,
        metadata: Some(MessageMetadata {
            citations: response.citations,
            routing: response.routing,
            visual_decision: response.visual_decision,
            processing_time_ms: Some(response.processing_time_ms),
        }),
        created_at: Utc::now(),
    }
}
