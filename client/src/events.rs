//! Authentication lifecycle notifications.
//!
//! The access layer never navigates anywhere itself. It publishes events and
//! whoever owns the user-facing flow subscribes.

use tokio::sync::broadcast;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn { user_id: String },
    Refreshed,
    /// Voluntary logout.
    SignedOut,
    /// Credentials were rejected for good; the user must sign in again.
    /// Published once per rejection no matter how many requests observed it.
    ForcedSignOut { reason: String },
}

#[derive(Debug, Clone)]
pub struct AuthEvents {
    tx: broadcast::Sender<AuthEvent>,
}

const DEFAULT_CAPACITY: usize = 64;

impl AuthEvents {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(DEFAULT_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.tx.subscribe()
    }

    pub(crate) fn emit(&self, event: AuthEvent) {
        tracing::debug!(?event, "auth event");
        // No subscribers is fine.
        let _ = self.tx.send(event);
    }
}

impl Default for AuthEvents {
    fn default() -> Self {
        Self::new()
    }
}
