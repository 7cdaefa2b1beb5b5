//! Wire types exchanged with the docchat backend.
//!
//! Everything here is plain serde data: no I/O and no client state. The
//! field names follow the backend's snake_case JSON exactly.

pub mod auth;
pub mod document;
pub mod envelope;
pub mod message;
pub mod query;
pub mod session;

pub use auth::AuthResponse;
pub use auth::Credentials;
pub use auth::TokenInfo;
pub use document::Document;
pub use document::DocumentStatus;
pub use envelope::ErrorBody;
pub use envelope::StatusResponse;
pub use message::Message;
pub use message::MessageMetadata;
pub use message::MessageRole;
pub use query::Citation;
pub use query::QueryRequest;
pub use query::QueryResponse;
pub use query::RoutingDecision;
pub use query::SourceType;
pub use query::VisualDecision;
pub use session::Session;
pub use session::SessionCreate;
pub use session::SessionUpdate;
