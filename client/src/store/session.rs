use docchat_protocol::Session;
use docchat_protocol::SessionCreate;
use docchat_protocol::SessionUpdate;

use super::Entity;
use super::EntityStore;
use super::StoreSnapshot;
use crate::api::DocChatClient;
use crate::api::MAX_SESSION_DESCRIPTION_LEN;
use crate::api::MAX_SESSION_NAME_LEN;
use crate::error::ApiError;
use crate::error::ApiResult;

impl Entity for Session {
    fn entity_id(&self) -> &str {
        &self.session_id
    }
}

/// The signed-in user's sessions, most recently active first.
#[derive(Clone)]
pub struct SessionStore {
    client: DocChatClient,
    store: EntityStore<Session>,
}

impl SessionStore {
    pub fn new(client: DocChatClient) -> Self {
        Self {
            client,
            store: EntityStore::new(),
        }
    }

    pub fn store(&self) -> &EntityStore<Session> {
        &self.store
    }

    pub fn snapshot(&self) -> StoreSnapshot<Session> {
        self.store.snapshot()
    }

    pub fn get(&self, session_id: &str) -> Option<Session> {
        self.store.get(session_id)
    }

    pub async fn list(&self) -> ApiResult<Vec<Session>> {
        let _op = self.store.begin();
        let list = self.store.record(self.client.list_sessions().await)?;
        self.store.replace_all(list.sessions.clone());
        Ok(list.sessions)
    }

    /// Create a session and put it at the top of the list. The name is
    /// trimmed and checked before anything is sent.
    pub async fn create(&self, name: &str, description: Option<&str>) -> ApiResult<Session> {
        let body = SessionCreate {
            name: self.store.record(validate_name(name))?,
            description: self.store.record(validate_description(description))?,
        };
        let _op = self.store.begin();
        let session = self.store.record(self.client.create_session(&body).await)?;
        self.store.prepend(session.clone());
        Ok(session)
    }

    pub async fn rename(&self, session_id: &str, name: &str) -> ApiResult<Session> {
        self.update(session_id, Some(name), None).await
    }

    /// Partial update; `None` fields are left as they are on the server.
    pub async fn update(
        &self,
        session_id: &str,
        name: Option<&str>,
        description: Option<&str>,
    ) -> ApiResult<Session> {
        let update = SessionUpdate {
            name: self.store.record(name.map(validate_name).transpose())?,
            description: self.store.record(validate_description(description))?,
        };
        if update.is_empty() {
            return self.store.record(Err(ApiError::InvalidRequest(
                "Nothing to update.".to_string(),
            )));
        }
        let _op = self.store.begin_entity(session_id);
        let session = self
            .store
            .record(self.client.update_session(session_id, &update).await)?;
        self.store.upsert(session.clone());
        Ok(session)
    }

    /// Re-read one session, e.g. to pick up a new document count.
    pub async fn refresh(&self, session_id: &str) -> ApiResult<Session> {
        let _op = self.store.begin_entity(session_id);
        let session = self.store.record(self.client.get_session(session_id).await)?;
        self.store.upsert(session.clone());
        Ok(session)
    }

    /// Remove on server confirmation only; a failed delete leaves the entry.
    pub async fn delete(&self, session_id: &str) -> ApiResult<()> {
        let _op = self.store.begin_entity(session_id);
        self.store
            .record(self.client.delete_session(session_id).await)?;
        self.store.remove(session_id);
        Ok(())
    }

    pub fn clear(&self) {
        self.store.clear();
    }
}

fn validate_name(name: &str) -> ApiResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ApiError::InvalidRequest(
            "Session name cannot be empty.".to_string(),
        ));
    }
    if name.chars().count() > MAX_SESSION_NAME_LEN {
        return Err(ApiError::InvalidRequest(format!(
            "Session name must be at most {MAX_SESSION_NAME_LEN} characters."
        )));
    }
    Ok(name.to_string())
}

fn validate_description(description: Option<&str>) -> ApiResult<Option<String>> {
    let Some(description) = description.map(str::trim).filter(|d| !d.is_empty()) else {
        return Ok(None);
    };
    if description.chars().count() > MAX_SESSION_DESCRIPTION_LEN {
        return Err(ApiError::InvalidRequest(format!(
            "Description must be at most {MAX_SESSION_DESCRIPTION_LEN} characters."
        )));
    }
    Ok(Some(description.to_string()))
}
