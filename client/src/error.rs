//! Error taxonomy for every call that goes through the request pipeline.

use thiserror::Error;

/// Why a request ended with HTTP 401.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    /// Rejected by an endpoint that never triggers refresh (login, signup,
    /// refresh itself). Usually wrong credentials or a missing cookie.
    Anonymous,
    /// The refresh endpoint could not be reached or failed with 5xx. The
    /// credential was left untouched and nobody was signed out.
    RefreshUnavailable,
    /// Refresh was rejected, or the replayed request was rejected again.
    /// Credentials have been cleared and a forced sign-out was emitted.
    Terminal,
}

/// Coarse classification used to decide how a failure is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Connection failure, timeout, 5xx. No credential change.
    Transient,
    /// 401 on a request that has not been replayed yet. Only ever observed
    /// inside the pipeline; callers never receive it.
    UnauthorizedRetryable,
    /// Re-authentication is required.
    UnauthorizedTerminal,
    /// 4xx other than 401, or rejected locally before sending.
    Validation,
}

impl ErrorClass {
    /// Classify a non-success HTTP status on a bearer-authenticated request.
    pub fn of_status(status: u16, replayed: bool) -> Self {
        match status {
            401 if replayed => ErrorClass::UnauthorizedTerminal,
            401 => ErrorClass::UnauthorizedRetryable,
            408 | 429 => ErrorClass::Transient,
            s if s >= 500 => ErrorClass::Transient,
            _ => ErrorClass::Validation,
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    /// Connection failure or timeout.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Any non-401 error status. `detail` is the server's message verbatim.
    #[error("{detail}")]
    Status { status: u16, detail: String },

    #[error("{detail}")]
    Unauthorized { kind: AuthFailure, detail: String },

    /// A success response whose body did not match the expected shape.
    #[error("unexpected response: {0}")]
    Decode(String),

    /// Rejected locally; nothing was sent.
    #[error("{0}")]
    InvalidRequest(String),

    #[error("not signed in")]
    NotSignedIn,
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ApiError::Network(_) | ApiError::Decode(_) => ErrorClass::Transient,
            ApiError::Status { status, .. } => ErrorClass::of_status(*status, false),
            ApiError::Unauthorized { kind, .. } => match kind {
                AuthFailure::Anonymous => ErrorClass::Validation,
                AuthFailure::RefreshUnavailable => ErrorClass::Transient,
                AuthFailure::Terminal => ErrorClass::UnauthorizedTerminal,
            },
            ApiError::InvalidRequest(_) => ErrorClass::Validation,
            ApiError::NotSignedIn => ErrorClass::UnauthorizedTerminal,
        }
    }

    /// True when the user has to sign in again.
    pub fn is_terminal_auth(&self) -> bool {
        self.class() == ErrorClass::UnauthorizedTerminal
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Unauthorized { .. } => Some(401),
            ApiError::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Text suitable for an entity store's error slot.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Status { detail, .. } | ApiError::Unauthorized { detail, .. } => {
                detail.clone()
            }
            ApiError::Network(e) if e.is_timeout() => {
                "The server took too long to respond.".to_string()
            }
            ApiError::Network(e) if e.is_connect() => "Could not reach the server.".to_string(),
            ApiError::Network(e) => format!("Network error: {e}"),
            ApiError::Decode(_) => "Unexpected response from the server.".to_string(),
            ApiError::InvalidRequest(msg) => msg.clone(),
            ApiError::NotSignedIn => "You are not signed in.".to_string(),
        }
    }
}
