//! Client-side access layer for the DocChat document Q&A service.
//!
//! [`DocChatClient`] is the typed HTTP surface. Every request runs through a
//! [`RequestPipeline`] that attaches the bearer credential and, on a 401,
//! waits for the single in-flight refresh before replaying once. The stores
//! under [`store`] keep client-side lists in sync with server results, and
//! [`SessionController`] ties them to one selected session.

mod api;
mod config;
mod controller;
mod credentials;
mod error;
mod events;
mod pipeline;
mod refresh;
pub mod store;

pub use api::DocChatClient;
pub use api::MAX_QUERY_LEN;
pub use api::MAX_SESSION_DESCRIPTION_LEN;
pub use api::MAX_SESSION_NAME_LEN;
pub use config::ClientConfig;
pub use config::ConfigError;
pub use config::ConfigLoader;
pub use controller::SessionController;
pub use controller::SignedInUser;
pub use credentials::Credential;
pub use credentials::CredentialSnapshot;
pub use credentials::CredentialStore;
pub use error::ApiError;
pub use error::ApiResult;
pub use error::AuthFailure;
pub use error::ErrorClass;
pub use events::AuthEvent;
pub use events::AuthEvents;
pub use pipeline::Attempt;
pub use pipeline::AuthMode;
pub use pipeline::FilePart;
pub use pipeline::RawResponse;
pub use pipeline::RequestBody;
pub use pipeline::RequestPipeline;
pub use pipeline::RequestSpec;
pub use refresh::HttpRefresher;
pub use refresh::RefreshCoordinator;
pub use refresh::RefreshOutcome;
pub use refresh::RefreshRejection;
pub use refresh::Refresher;
