//! Request pipeline: attaches the bearer credential, recovers from a single
//! 401 through the refresh coordinator, and replays the request at most once.

use std::fmt;

use bytes::Bytes;
use docchat_protocol::ErrorBody;
use reqwest::Method;
use reqwest::StatusCode;
use reqwest::header::AUTHORIZATION;
use reqwest::multipart;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use tracing::warn;
use url::Url;

use crate::credentials::Credential;
use crate::credentials::CredentialStore;
use crate::error::ApiError;
use crate::error::ApiResult;
use crate::error::AuthFailure;
use crate::refresh::RefreshCoordinator;
use crate::refresh::RefreshOutcome;
use crate::refresh::RefreshRejection;

/// Which send this is. A request is sent once and replayed at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    Initial,
    Replay,
}

impl Attempt {
    pub fn next(self) -> Option<Attempt> {
        match self {
            Attempt::Initial => Some(Attempt::Replay),
            Attempt::Replay => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// Attach the current credential and recover from 401 through refresh.
    Bearer,
    /// Never attach a credential; 401 is returned as is.
    Anonymous,
}

/// A file carried in a multipart body. Kept as bytes so the form can be
/// rebuilt for a replay.
#[derive(Clone)]
pub struct FilePart {
    pub field: String,
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

impl fmt::Debug for FilePart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilePart")
            .field("field", &self.field)
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub enum RequestBody {
    Empty,
    Json(serde_json::Value),
    Multipart(FilePart),
}

/// Immutable description of a request. Each attempt builds a fresh
/// `reqwest` request from it.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    method: Method,
    segments: Vec<String>,
    query: Vec<(String, String)>,
    body: RequestBody,
    auth: AuthMode,
}

impl RequestSpec {
    pub fn new<I, S>(method: Method, segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            method,
            segments: segments.into_iter().map(Into::into).collect(),
            query: Vec::new(),
            body: RequestBody::Empty,
            auth: AuthMode::Bearer,
        }
    }

    pub fn get<I: IntoIterator<Item = S>, S: Into<String>>(segments: I) -> Self {
        Self::new(Method::GET, segments)
    }

    pub fn post<I: IntoIterator<Item = S>, S: Into<String>>(segments: I) -> Self {
        Self::new(Method::POST, segments)
    }

    pub fn patch<I: IntoIterator<Item = S>, S: Into<String>>(segments: I) -> Self {
        Self::new(Method::PATCH, segments)
    }

    pub fn delete<I: IntoIterator<Item = S>, S: Into<String>>(segments: I) -> Self {
        Self::new(Method::DELETE, segments)
    }

    pub fn json<T: Serialize>(mut self, body: &T) -> ApiResult<Self> {
        let value = serde_json::to_value(body)
            .map_err(|e| ApiError::InvalidRequest(format!("could not encode request: {e}")))?;
        self.body = RequestBody::Json(value);
        Ok(self)
    }

    pub fn file(mut self, part: FilePart) -> Self {
        self.body = RequestBody::Multipart(part);
        self
    }

    pub fn query_param(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn anonymous(mut self) -> Self {
        self.auth = AuthMode::Anonymous;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn auth(&self) -> AuthMode {
        self.auth
    }

    /// Display path, e.g. `/sessions/session_1/documents`.
    pub fn path(&self) -> String {
        format!("/{}", self.segments.join("/"))
    }

    pub(crate) fn url_for(&self, base: &Url) -> ApiResult<Url> {
        let mut url = base.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidRequest(format!("invalid base url: {base}")))?
            .pop_if_empty()
            .extend(&self.segments);
        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&self.query);
        }
        Ok(url)
    }
}

/// Status and body of a completed exchange.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: Bytes,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> ApiResult<T> {
        serde_json::from_slice(&self.body).map_err(|e| ApiError::Decode(e.to_string()))
    }

    pub fn detail(&self) -> String {
        error_detail(self.status, &self.body)
    }

    fn into_result(self) -> ApiResult<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(ApiError::Status {
                status: self.status,
                detail: self.detail(),
            })
        }
    }
}

/// Human-readable message for an error response: the server's `detail`
/// verbatim when present, otherwise the status reason.
pub(crate) fn error_detail(status: u16, body: &[u8]) -> String {
    if let Some(message) = serde_json::from_slice::<ErrorBody>(body)
        .ok()
        .and_then(|parsed| parsed.message())
    {
        return message;
    }
    let reason = StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown status");
    format!("HTTP {status} {reason}")
}

pub struct RequestPipeline {
    http: reqwest::Client,
    base_url: Url,
    credentials: CredentialStore,
    coordinator: RefreshCoordinator,
}

impl RequestPipeline {
    pub fn new(
        http: reqwest::Client,
        base_url: Url,
        credentials: CredentialStore,
        coordinator: RefreshCoordinator,
    ) -> Self {
        Self {
            http,
            base_url,
            credentials,
            coordinator,
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Send `spec`, replaying once after a successful refresh.
    ///
    /// Only 401 is intercepted; every other status is returned to the caller
    /// unchanged as [`ApiError::Status`].
    pub async fn call(&self, spec: &RequestSpec) -> ApiResult<RawResponse> {
        let mut attempt = Attempt::Initial;
        loop {
            let snapshot = self.credentials.snapshot();
            let credential = match spec.auth {
                AuthMode::Bearer => Some(
                    snapshot
                        .credential
                        .as_ref()
                        .ok_or(ApiError::NotSignedIn)?,
                ),
                AuthMode::Anonymous => None,
            };
            let response = self.send(spec, attempt, credential).await?;
            if response.status != StatusCode::UNAUTHORIZED.as_u16() {
                return response.into_result();
            }

            let detail = response.detail();
            if spec.auth == AuthMode::Anonymous {
                return Err(ApiError::Unauthorized {
                    kind: AuthFailure::Anonymous,
                    detail,
                });
            }

            let Some(next) = attempt.next() else {
                warn!(path = %spec.path(), "request rejected after refresh");
                self.coordinator.sign_out_rejected(snapshot.generation, &detail);
                return Err(ApiError::Unauthorized {
                    kind: AuthFailure::Terminal,
                    detail,
                });
            };

            match self.coordinator.refresh_stale(snapshot.generation).await {
                RefreshOutcome::Renewed(_) => attempt = next,
                RefreshOutcome::Rejected(RefreshRejection::Terminal(_)) => {
                    return Err(ApiError::Unauthorized {
                        kind: AuthFailure::Terminal,
                        detail,
                    });
                }
                RefreshOutcome::Rejected(RefreshRejection::Transient(_)) => {
                    return Err(ApiError::Unauthorized {
                        kind: AuthFailure::RefreshUnavailable,
                        detail,
                    });
                }
            }
        }
    }

    /// [`call`](Self::call) and decode the success body.
    pub async fn call_json<T: DeserializeOwned>(&self, spec: &RequestSpec) -> ApiResult<T> {
        self.call(spec).await?.json()
    }

    async fn send(
        &self,
        spec: &RequestSpec,
        attempt: Attempt,
        credential: Option<&Credential>,
    ) -> ApiResult<RawResponse> {
        let url = spec.url_for(&self.base_url)?;
        debug!(method = %spec.method, path = %spec.path(), ?attempt, "sending request");

        let mut request = self.http.request(spec.method.clone(), url);
        if let Some(credential) = credential {
            request = request.header(AUTHORIZATION, credential.authorization());
        }
        request = match &spec.body {
            RequestBody::Empty => request,
            RequestBody::Json(value) => request.json(value),
            RequestBody::Multipart(part) => {
                let file = multipart::Part::bytes(part.bytes.to_vec())
                    .file_name(part.file_name.clone())
                    .mime_str(&part.content_type)
                    .map_err(|e| {
                        ApiError::InvalidRequest(format!(
                            "invalid content type {}: {e}",
                            part.content_type
                        ))
                    })?;
                request.multipart(multipart::Form::new().part(part.field.clone(), file))
            }
        };

        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;
        debug!(status, path = %spec.path(), "response received");
        Ok(RawResponse { status, body })
    }
}
