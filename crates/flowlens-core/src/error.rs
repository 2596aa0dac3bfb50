//! Error types for flowlens-core
//!
//! This module provides error types and user-friendly error formatting.

use crate::envelope::EnvelopeKind;
use thiserror::Error;

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    /// Envelope kind has no route (unknown on the wire or unregistered)
    #[error("unroutable envelope: {kind}")]
    Unroutable {
        /// Kind tag as received
        kind: String,
    },

    /// Frame could not be decoded into an envelope
    #[error("malformed envelope: {0}")]
    Malformed(String),

    /// Envelope kind requires a field that was absent
    #[error("{kind} envelope is missing '{field}'")]
    MissingField {
        /// Envelope kind
        kind: EnvelopeKind,
        /// Missing field name
        field: &'static str,
    },

    /// Step could not be attributed to any workflow
    #[error("step {step_id} has no workflow and no workflow is active")]
    UnattributedStep {
        /// Step identifier
        step_id: String,
    },

    /// A chat exchange was started while another one is still loading
    #[error("chat exchange already loading for workflow {active:?}, refused start for {requested:?}")]
    ConcurrentChat {
        /// Workflow of the exchange that is still loading
        active: Option<String>,
        /// Workflow of the rejected start
        requested: Option<String>,
    },

    /// A send is already in flight
    #[error("a message send is already in progress")]
    SendInProgress,

    /// Chat message text is empty
    #[error("message is empty")]
    EmptyMessage,

    /// A handler failed while applying an envelope
    #[error("handler for {kind} failed: {message}")]
    Handler {
        /// Envelope kind
        kind: EnvelopeKind,
        /// Failure description
        message: String,
    },

    /// Chat backend (network) error
    #[error("backend error: {0}")]
    Backend(String),

    /// Chat backend is not available in this mode
    #[error("chat backend unavailable")]
    BackendUnavailable,

    /// The session task has stopped
    #[error("session closed")]
    SessionClosed,

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Trait for user-friendly error messages
///
/// Provides human-readable error messages and suggestions for fixing.
pub trait UserFriendlyError {
    /// Get a user-friendly error message
    fn user_message(&self) -> String;

    /// Get a suggestion for how to fix the error
    fn suggestion(&self) -> Option<String>;
}

impl UserFriendlyError for Error {
    fn user_message(&self) -> String {
        match self {
            Error::Unroutable { kind } => format!("Ignored an event of unknown type '{}'.", kind),
            Error::Malformed(_) => "Received an event that could not be read.".to_string(),
            Error::MissingField { kind, field } => {
                format!("A {} event arrived without '{}'.", kind, field)
            }
            Error::UnattributedStep { step_id } => {
                format!("Step '{}' does not belong to any workflow.", step_id)
            }
            Error::ConcurrentChat { .. } => {
                "Another chat request is still waiting for its answer.".to_string()
            }
            Error::SendInProgress => "A message is already being sent.".to_string(),
            Error::EmptyMessage => "Cannot send an empty message.".to_string(),
            Error::Handler { kind, message } => {
                format!("Failed to apply {} event: {}", kind, message)
            }
            Error::Backend(msg) => format!("Server request failed: {}", msg),
            Error::BackendUnavailable => "Chat is not available in offline mode.".to_string(),
            Error::SessionClosed => "The session has been closed.".to_string(),
            Error::Serialization(e) => format!("Could not encode data: {}", e),
        }
    }

    fn suggestion(&self) -> Option<String> {
        match self {
            Error::ConcurrentChat { .. } | Error::SendInProgress => {
                Some("Wait for the current response before sending again.".to_string())
            }
            Error::UnattributedStep { .. } => {
                Some("Select a workflow with `--workflow` so steps can be attributed.".to_string())
            }
            Error::Backend(_) => Some("Check the server URL and your connection.".to_string()),
            Error::BackendUnavailable => {
                Some("Use `flowlens send` against a live server instead.".to_string())
            }
            _ => None,
        }
    }
}

/// Format an error for display in the CLI
pub fn format_error_for_cli(error: &Error) -> String {
    let mut output = error.user_message();

    if let Some(suggestion) = error.suggestion() {
        output.push('\n');
        output.push_str(&suggestion);
    }

    output
}
