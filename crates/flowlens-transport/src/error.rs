//! Error types for flowlens-transport

use thiserror::Error;

/// Transport error type
#[derive(Debug, Error)]
pub enum Error {
    /// URL could not be parsed
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// WebSocket handshake or stream failure
    #[error("websocket error: {0}")]
    WebSocket(String),

    /// HTTP request failed before a response arrived
    #[error("network error: {0}")]
    Network(String),

    /// Server answered with a non-success status
    #[error("server returned status {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body (truncated)
        body: String,
    },

    /// Request timed out
    #[error("timeout after {0}ms")]
    Timeout(u64),

    /// Response body could not be decoded
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Reconnect policy gave up
    #[error("gave up reconnecting after {0} attempts")]
    ReconnectExhausted(u32),

    /// Error from the session core
    #[error(transparent)]
    Core(#[from] flowlens_core::Error),
}

impl Error {
    /// Whether retrying the same request may succeed
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) | Self::WebSocket(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::InvalidResponse(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(e.to_string())
    }
}

impl From<Error> for flowlens_core::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::Core(inner) => inner,
            other => flowlens_core::Error::Backend(other.to_string()),
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
