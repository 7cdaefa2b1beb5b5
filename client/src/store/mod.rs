//! Client-side caches of server entities.
//!
//! Each store owns an ordered list plus a loading flag and the last error.
//! Reconciliation is always by id, never by position, so results that land
//! out of order cannot overwrite the wrong entry. A store is also scoped to
//! the session it was last loaded for; results for any other session are
//! discarded on arrival.

mod document;
mod message;
mod session;

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

pub use document::DocumentStore;
pub use document::LocalStatus;
pub use document::PendingUpload;
pub use document::TrackedDocument;
pub use message::MessageStore;
pub use session::SessionStore;

use crate::error::ApiError;
use crate::error::ApiResult;

/// Anything a store can hold: cloneable and keyed by a stable id.
pub trait Entity: Clone + Send + 'static {
    fn entity_id(&self) -> &str;
}

/// Point-in-time copy of a store, for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreSnapshot<T> {
    pub items: Vec<T>,
    pub loading: bool,
    pub error: Option<String>,
    pub scope: Option<String>,
}

#[derive(Debug)]
struct StoreState<T> {
    items: Vec<T>,
    in_flight: usize,
    error: Option<String>,
    scope: Option<String>,
    /// Operations in flight per entity id.
    pending: HashMap<String, usize>,
}

impl<T> Default for StoreState<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            in_flight: 0,
            error: None,
            scope: None,
            pending: HashMap::new(),
        }
    }
}

/// Shared, lock-protected list of entities. The lock is never held across an
/// await point.
#[derive(Debug)]
pub struct EntityStore<T> {
    state: Arc<Mutex<StoreState<T>>>,
}

impl<T> Clone for EntityStore<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T: Entity> Default for EntityStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Marks an operation as in flight until dropped.
#[must_use]
pub struct OperationGuard<T: Entity> {
    store: EntityStore<T>,
    entity_id: Option<String>,
}

impl<T: Entity> Drop for OperationGuard<T> {
    fn drop(&mut self) {
        let mut state = self.store.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        if let Some(id) = self.entity_id.take() {
            let remaining = state.pending.get(&id).map_or(0, |count| count.saturating_sub(1));
            if remaining == 0 {
                state.pending.remove(&id);
            } else {
                state.pending.insert(id, remaining);
            }
        }
    }
}

impl<T: Entity> EntityStore<T> {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(StoreState::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> StoreSnapshot<T> {
        let state = self.lock();
        StoreSnapshot {
            items: state.items.clone(),
            loading: state.in_flight > 0,
            error: state.error.clone(),
            scope: state.scope.clone(),
        }
    }

    pub fn items(&self) -> Vec<T> {
        self.lock().items.clone()
    }

    pub fn get(&self, id: &str) -> Option<T> {
        self.lock()
            .items
            .iter()
            .find(|item| item.entity_id() == id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    pub fn is_loading(&self) -> bool {
        self.lock().in_flight > 0
    }

    /// True while an operation on this particular entity is in flight.
    pub fn is_pending(&self, id: &str) -> bool {
        self.lock().pending.contains_key(id)
    }

    pub fn error(&self) -> Option<String> {
        self.lock().error.clone()
    }

    pub fn scope(&self) -> Option<String> {
        self.lock().scope.clone()
    }

    pub fn in_scope(&self, scope: &str) -> bool {
        self.lock().scope.as_deref() == Some(scope)
    }

    /// Start an operation: sets the loading flag and clears the last error.
    pub fn begin(&self) -> OperationGuard<T> {
        let mut state = self.lock();
        state.in_flight += 1;
        state.error = None;
        OperationGuard {
            store: self.clone(),
            entity_id: None,
        }
    }

    /// Like [`begin`](Self::begin), also marking `id` as pending.
    pub fn begin_entity(&self, id: &str) -> OperationGuard<T> {
        let mut state = self.lock();
        state.in_flight += 1;
        state.error = None;
        *state.pending.entry(id.to_string()).or_default() += 1;
        OperationGuard {
            store: self.clone(),
            entity_id: Some(id.to_string()),
        }
    }

    pub fn set_error(&self, message: impl Into<String>) {
        self.lock().error = Some(message.into());
    }

    pub fn clear_error(&self) {
        self.lock().error = None;
    }

    /// Record the failure of `result`, if any, and pass it through.
    pub fn record<R>(&self, result: ApiResult<R>) -> ApiResult<R> {
        if let Err(err) = &result {
            self.record_error(err);
        }
        result
    }

    pub fn record_error(&self, err: &ApiError) {
        tracing::debug!(error = %err, "store operation failed");
        self.set_error(err.user_message());
    }

    /// Drop all items and errors and rebind the store to `scope`. Operations
    /// still in flight keep their pending marks until their guards drop.
    pub fn reset(&self, scope: Option<String>) {
        let mut state = self.lock();
        state.items.clear();
        state.error = None;
        state.scope = scope;
    }

    pub fn clear(&self) {
        self.reset(None);
    }

    pub fn replace_all(&self, items: Vec<T>) {
        self.lock().items = items;
    }

    /// Replace the contents if the store is still bound to `scope`. Items
    /// for which `keep` holds survive in front of the new list. Returns
    /// whether the result was applied.
    pub fn replace_all_in(&self, scope: &str, items: Vec<T>, keep: impl Fn(&T) -> bool) -> bool {
        let mut state = self.lock();
        if state.scope.as_deref() != Some(scope) {
            tracing::debug!(scope, "discarding result for a scope no longer shown");
            return false;
        }
        let incoming: HashSet<&str> = items.iter().map(Entity::entity_id).collect();
        let mut merged: Vec<T> = state
            .items
            .iter()
            .filter(|item| keep(item) && !incoming.contains(item.entity_id()))
            .cloned()
            .collect();
        merged.extend(items);
        state.items = merged;
        true
    }

    pub fn prepend(&self, item: T) {
        let mut state = self.lock();
        state.items.retain(|existing| existing.entity_id() != item.entity_id());
        state.items.insert(0, item);
    }

    pub fn append(&self, item: T) {
        let mut state = self.lock();
        state.items.retain(|existing| existing.entity_id() != item.entity_id());
        state.items.push(item);
    }

    /// Replace the entry with the same id in place. Returns false if absent.
    pub fn update(&self, item: T) -> bool {
        let mut state = self.lock();
        match state
            .items
            .iter_mut()
            .find(|existing| existing.entity_id() == item.entity_id())
        {
            Some(slot) => {
                *slot = item;
                true
            }
            None => false,
        }
    }

    /// Update in place, or prepend when absent.
    pub fn upsert(&self, item: T) {
        if !self.update(item.clone()) {
            self.prepend(item);
        }
    }

    /// Swap the entry keyed `old_id` for `item`, keeping its position.
    /// Prepends `item` if `old_id` is gone. Returns false if absent.
    pub fn replace_id(&self, old_id: &str, item: T) -> bool {
        let mut state = self.lock();
        state.items.retain(|existing| {
            existing.entity_id() == old_id || existing.entity_id() != item.entity_id()
        });
        match state.items.iter().position(|existing| existing.entity_id() == old_id) {
            Some(index) => {
                state.items[index] = item;
                true
            }
            None => {
                state.items.insert(0, item);
                false
            }
        }
    }

    pub fn remove(&self, id: &str) -> Option<T> {
        let mut state = self.lock();
        let index = state.items.iter().position(|item| item.entity_id() == id)?;
        Some(state.items.remove(index))
    }
}
