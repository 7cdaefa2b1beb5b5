//! Authentication payloads for `/auth/*`.

use serde::Deserialize;
use serde::Serialize;

/// Body of `POST /auth/login` and `POST /auth/signup`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// Access token block nested in every auth response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Lifetime in seconds, as reported by the server.
    #[serde(default)]
    pub expires_in: Option<u64>,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

/// Response of signup, login and refresh.
///
/// The refresh token itself never appears here; the server keeps it in an
/// HTTP-only cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: TokenInfo,
    pub user_id: String,
    #[serde(default)]
    pub email: Option<String>,
}
