//! Single-flight credential renewal.
//!
//! At most one refresh call is outstanding at any time. Every request that
//! hits a 401 while a refresh is running waits on that same attempt instead
//! of starting its own. The attempt runs on its own task, so it finishes and
//! updates the credential store even when every waiter has been dropped.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use docchat_protocol::AuthResponse;
use futures::FutureExt;
use futures::future::BoxFuture;
use futures::future::Shared;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::credentials::Credential;
use crate::credentials::CredentialStore;
use crate::events::AuthEvent;
use crate::events::AuthEvents;
use crate::pipeline::error_detail;

/// Why a refresh did not produce a credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshRejection {
    /// The refresh endpoint answered 401. The session is over.
    Terminal(String),
    /// Network failure or a server error. Nothing changes.
    Transient(String),
}

impl RefreshRejection {
    pub fn reason(&self) -> &str {
        match self {
            RefreshRejection::Terminal(reason) | RefreshRejection::Transient(reason) => reason,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Renewed(Credential),
    Rejected(RefreshRejection),
}

/// Performs the actual renewal call.
#[async_trait]
pub trait Refresher: Send + Sync {
    async fn refresh(&self) -> Result<Credential, RefreshRejection>;
}

/// Calls `POST /auth/refresh`, relying on the cookie jar of the shared HTTP
/// client to carry the refresh cookie. Never attaches a bearer header.
#[derive(Debug, Clone)]
pub struct HttpRefresher {
    http: reqwest::Client,
    url: url::Url,
}

impl HttpRefresher {
    pub fn new(http: reqwest::Client, url: url::Url) -> Self {
        Self { http, url }
    }
}

#[async_trait]
impl Refresher for HttpRefresher {
    async fn refresh(&self) -> Result<Credential, RefreshRejection> {
        let response = self
            .http
            .post(self.url.clone())
            .send()
            .await
            .map_err(|e| RefreshRejection::Transient(format!("refresh request failed: {e}")))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| RefreshRejection::Transient(format!("refresh body unreadable: {e}")))?;

        if status.as_u16() == 401 {
            return Err(RefreshRejection::Terminal(error_detail(status.as_u16(), &body)));
        }
        if !status.is_success() {
            return Err(RefreshRejection::Transient(error_detail(status.as_u16(), &body)));
        }

        let auth: AuthResponse = serde_json::from_slice(&body)
            .map_err(|e| RefreshRejection::Transient(format!("malformed refresh response: {e}")))?;
        Ok(Credential::from_token(&auth.token))
    }
}

type SharedRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;

/// Coordinates renewal for every request that shares one credential store.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    refresher: Arc<dyn Refresher>,
    credentials: CredentialStore,
    events: AuthEvents,
    /// `Some` while a refresh is in flight.
    in_flight: Mutex<Option<InFlight>>,
    started: AtomicU64,
}

struct InFlight {
    attempt: u64,
    refresh: SharedRefresh,
}

/// Returns the slot to idle when the refresh task ends, including by panic.
struct SlotReset {
    inner: Arc<Inner>,
    attempt: u64,
}

impl Drop for SlotReset {
    fn drop(&mut self) {
        self.inner.reset(self.attempt);
    }
}

enum Pending {
    Ready(RefreshOutcome),
    Join(SharedRefresh),
}

impl RefreshCoordinator {
    pub fn new(
        refresher: Arc<dyn Refresher>,
        credentials: CredentialStore,
        events: AuthEvents,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                refresher,
                credentials,
                events,
                in_flight: Mutex::new(None),
                started: AtomicU64::new(0),
            }),
        }
    }

    pub fn is_refreshing(&self) -> bool {
        self.inner.slot().is_some()
    }

    /// Number of refresh calls issued over the coordinator's lifetime.
    pub fn refresh_count(&self) -> u64 {
        self.inner.started.load(Ordering::SeqCst)
    }

    /// Join the in-flight refresh or start one.
    pub async fn request_refresh(&self) -> RefreshOutcome {
        match self.join_or_start(None) {
            Pending::Ready(outcome) => outcome,
            Pending::Join(shared) => shared.await,
        }
    }

    /// Like [`request_refresh`](Self::request_refresh), for a request that was
    /// sent while the store was at `seen_generation`.
    ///
    /// If the store has moved on since then, the rejection is stale: a newer
    /// credential is returned without a network call, or the terminal outcome
    /// is reported again if the user has already been signed out.
    pub async fn refresh_stale(&self, seen_generation: u64) -> RefreshOutcome {
        match self.join_or_start(Some(seen_generation)) {
            Pending::Ready(outcome) => outcome,
            Pending::Join(shared) => shared.await,
        }
    }

    /// Clear credentials after a replayed request was rejected again.
    ///
    /// Compare-and-clear: only acts if the store still holds what the replay
    /// used, so concurrent replays produce a single forced sign-out.
    pub fn sign_out_rejected(&self, seen_generation: u64, reason: &str) -> bool {
        let cleared = self.inner.credentials.clear_if_generation(seen_generation);
        if cleared {
            warn!("replayed request rejected; signing out");
            self.inner.events.emit(AuthEvent::ForcedSignOut {
                reason: reason.to_string(),
            });
        }
        cleared
    }

    fn join_or_start(&self, seen_generation: Option<u64>) -> Pending {
        let mut slot = self.inner.slot();
        if let Some(in_flight) = slot.as_ref() {
            debug!("joining in-flight refresh");
            return Pending::Join(in_flight.refresh.clone());
        }

        if let Some(seen) = seen_generation {
            let snapshot = self.inner.credentials.snapshot();
            if snapshot.generation != seen {
                return Pending::Ready(match snapshot.credential {
                    Some(current) => {
                        debug!("credential changed since request was sent; skipping refresh");
                        RefreshOutcome::Renewed(current)
                    }
                    None => RefreshOutcome::Rejected(RefreshRejection::Terminal(
                        "signed out".to_string(),
                    )),
                });
            }
        }

        let attempt = self.inner.started.fetch_add(1, Ordering::SeqCst) + 1;
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            let _reset = SlotReset {
                inner: Arc::clone(&inner),
                attempt,
            };
            inner.run().await
        });
        let inner = Arc::clone(&self.inner);
        let shared = async move {
            task.await.unwrap_or_else(|e| {
                // A task cancelled before its first poll never ran its reset.
                inner.reset(attempt);
                warn!(error = %e, "refresh task ended abnormally");
                RefreshOutcome::Rejected(RefreshRejection::Transient(format!(
                    "refresh task failed: {e}"
                )))
            })
        }
        .boxed()
        .shared();
        *slot = Some(InFlight {
            attempt,
            refresh: shared.clone(),
        });
        Pending::Join(shared)
    }
}

impl Inner {
    fn slot(&self) -> std::sync::MutexGuard<'_, Option<InFlight>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clear the slot if it still belongs to `attempt`.
    fn reset(&self, attempt: u64) {
        let mut slot = self.slot();
        if slot.as_ref().is_some_and(|in_flight| in_flight.attempt == attempt) {
            *slot = None;
        }
    }

    async fn run(&self) -> RefreshOutcome {
        info!("refreshing access token");
        match self.refresher.refresh().await {
            Ok(credential) => {
                self.credentials.set(Some(credential.clone()));
                self.events.emit(AuthEvent::Refreshed);
                RefreshOutcome::Renewed(credential)
            }
            Err(RefreshRejection::Terminal(reason)) => {
                warn!(%reason, "refresh rejected; signing out");
                self.credentials.clear();
                self.events.emit(AuthEvent::ForcedSignOut {
                    reason: reason.clone(),
                });
                RefreshOutcome::Rejected(RefreshRejection::Terminal(reason))
            }
            Err(RefreshRejection::Transient(reason)) => {
                warn!(%reason, "refresh unavailable");
                RefreshOutcome::Rejected(RefreshRejection::Transient(reason))
            }
        }
    }
}
