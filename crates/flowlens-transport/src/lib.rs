//! Flowlens Transport - Network plumbing for the flowlens session
//!
//! This crate connects a [`flowlens_core::SessionHandle`] to a server:
//! - WebSocket: connection lifecycle, heartbeat, reconnect with backoff
//! - HTTP: the REST implementation of [`flowlens_core::ChatBackend`]

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod backoff;
pub mod config;
pub mod error;
pub mod http;
pub mod websocket;

pub use backoff::{retry_with_backoff, BackoffPolicy, RetryError};
pub use config::TransportConfig;
pub use error::{Error, Result};
pub use http::HttpChatBackend;
pub use websocket::{ConnectionManager, PING_FRAME};
