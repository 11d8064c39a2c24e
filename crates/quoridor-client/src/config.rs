//! Client configuration.
//!
//! Defaults suit a backend running locally. [`ClientConfig::from_env`] reads
//! overrides from `QUORIDOR_*` variables; binaries layer CLI flags on top via
//! the `with_*` setters.

use std::time::Duration;

/// How often the running session is polled.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Per-request timeout for REST calls.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:3000/api";
pub const DEFAULT_PUSH_URL: &str = "ws://127.0.0.1:3000/ws";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL of the REST backend (no trailing slash needed).
    pub api_url: String,
    /// WebSocket URL of the push-notification channel. `None` disables push
    /// and leaves polling as the only trigger.
    pub push_url: Option<String>,
    /// Base URL of the chat store. `None` keeps chat channels in memory.
    pub chat_url: Option<String>,
    /// Bearer token for the REST backend.
    pub token: Option<String>,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            push_url: Some(DEFAULT_PUSH_URL.to_string()),
            chat_url: None,
            token: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl ClientConfig {
    /// Defaults overlaid with `QUORIDOR_API_URL`, `QUORIDOR_PUSH_URL`,
    /// `QUORIDOR_CHAT_URL`, `QUORIDOR_TOKEN` and `QUORIDOR_POLL_SECS`.
    ///
    /// Unset or blank variables keep the default; an unparseable poll
    /// interval is ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();
        if let Some(url) = var("QUORIDOR_API_URL") {
            config.api_url = url;
        }
        if let Some(url) = var("QUORIDOR_PUSH_URL") {
            config.push_url = Some(url);
        }
        if let Some(url) = var("QUORIDOR_CHAT_URL") {
            config.chat_url = Some(url);
        }
        config.token = var("QUORIDOR_TOKEN");
        if let Some(secs) = var("QUORIDOR_POLL_SECS").and_then(|s| s.trim().parse::<u64>().ok())
        {
            config = config.with_poll_interval(Duration::from_secs(secs));
        }
        config
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    pub fn with_push_url(mut self, url: Option<String>) -> Self {
        self.push_url = url;
        self
    }

    pub fn with_chat_url(mut self, url: Option<String>) -> Self {
        self.chat_url = url;
        self
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    /// Set the poll interval. Values below one second are clamped up.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_secs(1));
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}
