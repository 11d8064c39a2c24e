//! Typed access to the session REST backend.
//!
//! [`SessionApi`] is the seam the sync engine and controller are written
//! against; [`HttpSessionClient`] is the `reqwest` implementation. Each
//! client handle carries its own [`Credentials`], so there is no ambient
//! auth state shared between unrelated call sites.

use std::future::Future;
use std::sync::{Arc, RwLock};

use quoridor_core::protocol::{CreateSession, MoveIntent, Pawn, Session, SessionId, Wall};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::config::ClientConfig;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A failed backend call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// The server answered with a non-success status.
    #[error("server returned {code}: {message}")]
    Status { code: u16, message: String },

    /// The request never got a response (connect, timeout, reset).
    #[error("request failed: {0}")]
    Transport(String),

    /// The response body did not have the expected shape.
    #[error("invalid response: {0}")]
    Decode(String),
}

/// How the sync engine should react to an [`ApiError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Retry on the next natural trigger.
    Transient,
    /// The session is gone; the view must close.
    NotFound,
    /// Credentials were refused (and have been cleared).
    Unauthorized,
    /// The server refused the request itself (e.g. an illegal move).
    Rejected,
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Status { code, .. } => match *code {
                404 | 410 => ErrorKind::NotFound,
                401 | 403 => ErrorKind::Unauthorized,
                408 | 429 => ErrorKind::Transient,
                400..=499 => ErrorKind::Rejected,
                _ => ErrorKind::Transient,
            },
            ApiError::Transport(_) | ApiError::Decode(_) => ErrorKind::Transient,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else {
            ApiError::Transport(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Backend operations consumed by the client.
pub trait SessionApi: Send + Sync + 'static {
    fn list_sessions(&self) -> impl Future<Output = Result<Vec<Session>, ApiError>> + Send;

    fn fetch_session(
        &self,
        id: &SessionId,
    ) -> impl Future<Output = Result<Session, ApiError>> + Send;

    fn fetch_pawns(
        &self,
        id: &SessionId,
    ) -> impl Future<Output = Result<Vec<Pawn>, ApiError>> + Send;

    fn fetch_walls(
        &self,
        id: &SessionId,
    ) -> impl Future<Output = Result<Vec<Wall>, ApiError>> + Send;

    /// Submit a move; the response is the authoritative session afterwards.
    fn submit_move(
        &self,
        id: &SessionId,
        intent: &MoveIntent,
    ) -> impl Future<Output = Result<Session, ApiError>> + Send;

    fn abort_session(&self, id: &SessionId) -> impl Future<Output = Result<(), ApiError>> + Send;

    fn create_session(
        &self,
        request: CreateSession,
    ) -> impl Future<Output = Result<Session, ApiError>> + Send;

    fn join_session(
        &self,
        id: &SessionId,
    ) -> impl Future<Output = Result<Session, ApiError>> + Send;
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Bearer token scoped to one client handle (and its clones).
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    token: Arc<RwLock<Option<String>>>,
}

impl Credentials {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: Arc::new(RwLock::new(token)),
        }
    }

    pub fn token(&self) -> Option<String> {
        self.token.read().ok().and_then(|t| t.clone())
    }

    pub fn set(&self, token: Option<String>) {
        if let Ok(mut t) = self.token.write() {
            *t = token;
        }
    }

    /// Forget the token, e.g. after the server answered 401.
    pub fn invalidate(&self) {
        self.set(None);
    }
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct HttpSessionClient {
    base_url: String,
    client: reqwest::Client,
    credentials: Credentials,
}

impl HttpSessionClient {
    pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            base_url: config.api_url.clone(),
            client,
            credentials: Credentials::new(config.token.clone()),
        })
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send_json(self.request(Method::GET, path)).await
    }

    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.send_json(self.request(Method::POST, path).json(body))
            .await
    }

    pub async fn put<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.send_json(self.request(Method::PUT, path).json(body))
            .await
    }

    /// `DELETE`, ignoring any response body.
    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.send(self.request(Method::DELETE, path)).await?;
        Ok(())
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.client.request(method, self.endpoint(path));
        match self.credentials.token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ApiError> {
        let response = self.send(builder).await?;
        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn send(&self, builder: RequestBuilder) -> Result<reqwest::Response, ApiError> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED {
            warn!("credentials rejected, clearing token");
            self.credentials.invalidate();
        }
        let body = response.text().await.unwrap_or_default();
        debug!(%status, body = %body, "request failed");
        Err(ApiError::Status {
            code: status.as_u16(),
            message: error_message(status, &body),
        })
    }
}

/// Pull a human-readable message out of an error body.
///
/// Accepts `{"message": ..}` or `{"error": ..}` JSON, falls back to the raw
/// text, and finally to the status' canonical reason.
fn error_message(status: StatusCode, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["message", "error"] {
            if let Some(msg) = value.get(key).and_then(|m| m.as_str()) {
                return msg.to_string();
            }
        }
    }
    let trimmed = body.trim();
    if !trimmed.is_empty() {
        return trimmed.to_string();
    }
    status
        .canonical_reason()
        .unwrap_or("request failed")
        .to_string()
}

impl SessionApi for HttpSessionClient {
    async fn list_sessions(&self) -> Result<Vec<Session>, ApiError> {
        self.get("games").await
    }

    #[instrument(skip(self), fields(session = %id))]
    async fn fetch_session(&self, id: &SessionId) -> Result<Session, ApiError> {
        self.get(&format!("games/{id}")).await
    }

    #[instrument(skip(self), fields(session = %id))]
    async fn fetch_pawns(&self, id: &SessionId) -> Result<Vec<Pawn>, ApiError> {
        self.get(&format!("games/{id}/pawns")).await
    }

    #[instrument(skip(self), fields(session = %id))]
    async fn fetch_walls(&self, id: &SessionId) -> Result<Vec<Wall>, ApiError> {
        self.get(&format!("games/{id}/walls")).await
    }

    #[instrument(skip(self, intent), fields(session = %id, participant = %intent.participant))]
    async fn submit_move(&self, id: &SessionId, intent: &MoveIntent) -> Result<Session, ApiError> {
        self.post(&format!("games/{id}/moves"), intent).await
    }

    #[instrument(skip(self), fields(session = %id))]
    async fn abort_session(&self, id: &SessionId) -> Result<(), ApiError> {
        self.delete(&format!("games/{id}")).await
    }

    async fn create_session(&self, request: CreateSession) -> Result<Session, ApiError> {
        self.post("games", &request).await
    }

    #[instrument(skip(self), fields(session = %id))]
    async fn join_session(&self, id: &SessionId) -> Result<Session, ApiError> {
        self.put(&format!("games/{id}/players"), &serde_json::json!({}))
            .await
    }
}
