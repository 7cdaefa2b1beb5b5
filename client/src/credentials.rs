//! In-memory holder of the current access credential.
//!
//! The store is an explicit handle shared by the pipeline, the refresh
//! coordinator and the auth endpoints. Values are only ever replaced whole.
//! Nothing is persisted; the credential lives as long as the process.

use std::fmt;
use std::sync::Arc;
use std::sync::PoisonError;
use std::sync::RwLock;

use chrono::DateTime;
use chrono::Utc;
use docchat_protocol::TokenInfo;

/// Bearer access token plus the expiry the server advertised when issuing it.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    access_token: String,
    token_type: String,
    expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: "bearer".to_string(),
            expires_at: None,
        }
    }

    /// Build from a token block, anchoring `expires_in` at the current time.
    /// A lifetime too large to represent leaves the expiry unknown.
    pub fn from_token(token: &TokenInfo) -> Self {
        let expires_at = token.expires_in.and_then(|secs| {
            i64::try_from(secs)
                .ok()
                .and_then(chrono::Duration::try_seconds)
                .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
        });
        Self {
            access_token: token.access_token.clone(),
            token_type: token.token_type.clone(),
            expires_at,
        }
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn token_type(&self) -> &str {
        &self.token_type
    }

    /// Informational only. The server remains the authority on expiry.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Value for the `Authorization` header.
    pub fn authorization(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// The credential together with the generation it was read at.
///
/// The generation increases on every `set` and `clear`, so a caller can tell
/// whether the store changed after it sent a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialSnapshot {
    pub credential: Option<Credential>,
    pub generation: u64,
}

#[derive(Debug, Default)]
struct Slot {
    current: Option<Credential>,
    generation: u64,
}

#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    slot: Arc<RwLock<Slot>>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<Credential> {
        self.read(|slot| slot.current.clone())
    }

    pub fn snapshot(&self) -> CredentialSnapshot {
        self.read(|slot| CredentialSnapshot {
            credential: slot.current.clone(),
            generation: slot.generation,
        })
    }

    pub fn generation(&self) -> u64 {
        self.read(|slot| slot.generation)
    }

    pub fn is_present(&self) -> bool {
        self.read(|slot| slot.current.is_some())
    }

    /// Replace the current value; `None` is equivalent to [`clear`](Self::clear).
    pub fn set(&self, credential: Option<Credential>) {
        self.write(|slot| {
            slot.current = credential;
            slot.generation += 1;
        });
    }

    pub fn clear(&self) {
        self.set(None);
    }

    /// Clear only if nothing has changed since `generation` was observed and a
    /// credential is still present. Returns whether this call cleared it.
    pub fn clear_if_generation(&self, generation: u64) -> bool {
        self.write(|slot| {
            if slot.generation != generation || slot.current.is_none() {
                return false;
            }
            slot.current = None;
            slot.generation += 1;
            true
        })
    }

    fn read<R>(&self, f: impl FnOnce(&Slot) -> R) -> R {
        let guard = self.slot.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    fn write<R>(&self, f: impl FnOnce(&mut Slot) -> R) -> R {
        let mut guard = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}
