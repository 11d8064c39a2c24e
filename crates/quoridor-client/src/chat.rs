//! Lifecycle of the per-session chat channel.
//!
//! The chat itself lives in an external real-time store keyed by session id;
//! this module only opens and removes the channel. Message content is never
//! read or written here.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Mutex;

use quoridor_core::protocol::SessionId;
use reqwest::StatusCode;
use reqwest::header;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    #[error("chat provider failed: {0}")]
    Provider(String),
}

impl From<reqwest::Error> for ChatError {
    fn from(e: reqwest::Error) -> Self {
        ChatError::Provider(e.to_string())
    }
}

/// Keyed, hierarchical store holding chat channels.
pub trait ChatProvider: Send + Sync + 'static {
    /// Write an empty channel marker at `key` unless something is already
    /// there. Returns `true` if the marker was written.
    fn initialize_if_absent(&self, key: &str)
    -> impl Future<Output = Result<bool, ChatError>> + Send;

    /// Remove `key` and everything below it.
    fn delete(&self, key: &str) -> impl Future<Output = Result<(), ChatError>> + Send;
}

/// Key under which a session's channel lives.
pub fn channel_key(session_id: &SessionId) -> String {
    format!("chats/{session_id}")
}

/// Opens and closes chat channels for sessions.
pub struct ChatChannelLifecycle<P> {
    provider: P,
}

impl<P: ChatProvider> ChatChannelLifecycle<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Open a fresh, empty channel for `session_id`.
    ///
    /// Leftovers under the same id (a reused id, an earlier crash) are
    /// removed first, so calling this twice simply re-initializes.
    pub async fn start(&self, session_id: &SessionId) -> Result<(), ChatError> {
        let key = channel_key(session_id);
        self.provider.delete(&key).await?;
        let created = self.provider.initialize_if_absent(&key).await?;
        info!(session = %session_id, created, "chat channel opened");
        Ok(())
    }

    /// Remove the channel and all its messages.
    pub async fn stop(&self, session_id: &SessionId) -> Result<(), ChatError> {
        self.provider.delete(&channel_key(session_id)).await?;
        info!(session = %session_id, "chat channel removed");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-memory provider
// ---------------------------------------------------------------------------

/// Process-local provider. Keys are `/`-separated paths.
#[derive(Debug, Default)]
pub struct MemoryChatProvider {
    nodes: Mutex<BTreeMap<String, serde_json::Value>>,
}

impl MemoryChatProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.nodes.lock().is_ok_and(|nodes| nodes.contains_key(key))
    }

    /// Store a value at `key`, as another client posting a message would.
    pub fn insert(&self, key: &str, value: serde_json::Value) {
        if let Ok(mut nodes) = self.nodes.lock() {
            nodes.insert(key.to_string(), value);
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.lock().map(|nodes| nodes.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, serde_json::Value>>, ChatError> {
        self.nodes
            .lock()
            .map_err(|_| ChatError::Provider("chat store poisoned".to_string()))
    }
}

impl ChatProvider for MemoryChatProvider {
    async fn initialize_if_absent(&self, key: &str) -> Result<bool, ChatError> {
        let mut nodes = self.lock()?;
        if nodes.contains_key(key) {
            return Ok(false);
        }
        nodes.insert(key.to_string(), channel_marker());
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<(), ChatError> {
        let prefix = format!("{key}/");
        let mut nodes = self.lock()?;
        nodes.retain(|k, _| k != key && !k.starts_with(&prefix));
        Ok(())
    }
}

fn channel_marker() -> serde_json::Value {
    serde_json::json!({ "open": true })
}

// ---------------------------------------------------------------------------
// REST provider
// ---------------------------------------------------------------------------

/// Asks the store to return an ETag with a read.
const ETAG_REQUEST: &str = "x-firebase-etag";

/// Provider for a JSON tree store exposing `{base}/{key}.json` over REST.
#[derive(Debug, Clone)]
pub struct RestChatProvider {
    base_url: String,
    client: reqwest::Client,
}

impl RestChatProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    fn endpoint(&self, key: &str) -> String {
        format!(
            "{}/{}.json",
            self.base_url.trim_end_matches('/'),
            key.trim_matches('/')
        )
    }
}

impl ChatProvider for RestChatProvider {
    /// Read the node with its ETag, then write only if it is still unchanged.
    ///
    /// A concurrent writer between the two requests makes the store answer
    /// 412, which counts as "already present". Stores that return no ETag get
    /// a plain write; both writers then store the same marker.
    async fn initialize_if_absent(&self, key: &str) -> Result<bool, ChatError> {
        let url = self.endpoint(key);
        let response = self
            .client
            .get(&url)
            .header(ETAG_REQUEST, "true")
            .send()
            .await?
            .error_for_status()?;
        let etag = response
            .headers()
            .get(header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let existing: serde_json::Value = response.json().await?;
        if !existing.is_null() {
            debug!(key, "chat channel already present");
            return Ok(false);
        }

        let mut put = self.client.put(&url).json(&channel_marker());
        if let Some(etag) = &etag {
            put = put.header(header::IF_MATCH, etag);
        }
        let response = put.send().await?;
        if response.status() == StatusCode::PRECONDITION_FAILED {
            debug!(key, "chat channel created concurrently");
            return Ok(false);
        }
        response.error_for_status()?;
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<(), ChatError> {
        self.client
            .delete(self.endpoint(key))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
