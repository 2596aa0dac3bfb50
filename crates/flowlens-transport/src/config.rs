//! Transport configuration

use crate::backoff::BackoffPolicy;
use crate::error::Result;
use std::time::Duration;
use url::Url;

/// Default WebSocket endpoint
pub const DEFAULT_WS_URL: &str = "ws://localhost:8000/ws";

/// Default REST base URL
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Heartbeat intervals below this are raised to it
pub const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(100);

/// Connection and request settings
#[derive(Debug, Clone, PartialEq)]
pub struct TransportConfig {
    /// WebSocket endpoint
    pub ws_url: String,
    /// REST base URL
    pub api_url: String,
    /// Bearer token sent on both channels
    pub token: Option<String>,
    /// Reconnect schedule of the socket
    pub reconnect: BackoffPolicy,
    /// Retry schedule of idempotent requests
    pub request_retry: BackoffPolicy,
    /// Interval between client pings
    pub heartbeat_interval: Duration,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            ws_url: DEFAULT_WS_URL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            token: None,
            reconnect: BackoffPolicy::default(),
            request_retry: BackoffPolicy::default().with_max_attempts(3),
            heartbeat_interval: Duration::from_secs(30),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl TransportConfig {
    /// Create a new configuration with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the WebSocket endpoint
    #[must_use]
    pub fn with_ws_url(mut self, url: impl Into<String>) -> Self {
        self.ws_url = url.into();
        self
    }

    /// Set the REST base URL
    #[must_use]
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    /// Set the bearer token
    #[must_use]
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.is_empty());
        self
    }

    /// Set the reconnect schedule
    #[must_use]
    pub fn with_reconnect(mut self, policy: BackoffPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// Set the request retry schedule
    #[must_use]
    pub fn with_request_retry(mut self, policy: BackoffPolicy) -> Self {
        self.request_retry = policy;
        self
    }

    /// Set the heartbeat interval
    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Set the request timeout
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Heartbeat interval, never below [`MIN_HEARTBEAT_INTERVAL`]
    #[must_use]
    pub fn effective_heartbeat(&self) -> Duration {
        self.heartbeat_interval.max(MIN_HEARTBEAT_INTERVAL)
    }

    /// Socket URL scoped to a project
    pub fn ws_url_for(&self, project_id: Option<&str>) -> Result<Url> {
        let mut url = Url::parse(&self.ws_url)?;
        if let Some(project_id) = project_id.filter(|p| !p.is_empty()) {
            url.query_pairs_mut().append_pair("project_id", project_id);
        }
        Ok(url)
    }

    /// REST URL for a path relative to the API base
    pub fn api_endpoint(&self, path: &str) -> Result<Url> {
        let base = if self.api_url.ends_with('/') {
            Url::parse(&self.api_url)?
        } else {
            Url::parse(&format!("{}/", self.api_url))?
        };
        Ok(base.join(path.trim_start_matches('/'))?)
    }
}
