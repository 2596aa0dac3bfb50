//! Chat correlation state machine
//!
//! Phases move `Idle -> Loading -> {Responded, Errored} -> Idle`. Responses
//! are identified by their server id, or by a content fingerprint when the
//! server sends none, and each identity is applied at most once per project
//! scope.

use crate::envelope::ChatResponse;
use crate::error::{Error, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use tracing::{debug, error};

/// Default number of content characters fed into the fingerprint
pub const DEFAULT_FINGERPRINT_CHARS: usize = 100;

/// Phase of the current exchange
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatPhase {
    /// Nothing outstanding
    #[default]
    Idle,
    /// Waiting for a response
    Loading,
    /// A response arrived
    Responded,
    /// The request failed
    Errored,
}

/// Serializable view of the current exchange
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChatExchange {
    /// Workflow the exchange belongs to
    pub workflow_id: Option<String>,
    /// Current phase
    pub phase: ChatPhase,
    /// Whether a response is awaited
    pub is_loading: bool,
    /// Last applied response
    pub last_response: Option<ChatResponse>,
    /// Last error text
    pub error: Option<String>,
    /// Number of response identities seen in this project scope
    pub processed_responses: usize,
}

/// Correlates chat requests with their responses.
#[derive(Debug, Clone)]
pub struct ChatCorrelation {
    workflow_id: Option<String>,
    phase: ChatPhase,
    last_response: Option<ChatResponse>,
    error: Option<String>,
    processed_response_ids: HashSet<String>,
    fingerprint_chars: usize,
}

impl Default for ChatCorrelation {
    fn default() -> Self {
        Self::new(DEFAULT_FINGERPRINT_CHARS)
    }
}

impl ChatCorrelation {
    /// Create an idle state machine
    #[must_use]
    pub fn new(fingerprint_chars: usize) -> Self {
        Self {
            workflow_id: None,
            phase: ChatPhase::Idle,
            last_response: None,
            error: None,
            processed_response_ids: HashSet::new(),
            fingerprint_chars,
        }
    }

    /// Current phase
    #[must_use]
    pub fn phase(&self) -> ChatPhase {
        self.phase
    }

    /// Whether a response is awaited
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.phase == ChatPhase::Loading
    }

    /// Workflow of the current exchange
    #[must_use]
    pub fn workflow_id(&self) -> Option<&str> {
        self.workflow_id.as_deref()
    }

    /// Whether a response identity was already applied
    #[must_use]
    pub fn is_processed(&self, response_id: &str) -> bool {
        self.processed_response_ids.contains(response_id)
    }

    /// Serializable view of the exchange
    #[must_use]
    pub fn exchange(&self) -> ChatExchange {
        ChatExchange {
            workflow_id: self.workflow_id.clone(),
            phase: self.phase,
            is_loading: self.is_loading(),
            last_response: self.last_response.clone(),
            error: self.error.clone(),
            processed_responses: self.processed_response_ids.len(),
        }
    }

    /// Begin an exchange.
    ///
    /// A finished exchange is reset first. Starting while another exchange is
    /// loading is refused with [`Error::ConcurrentChat`].
    pub fn start(&mut self, workflow_id: Option<String>) -> Result<()> {
        match self.phase {
            ChatPhase::Loading => {
                error!(
                    active = ?self.workflow_id,
                    requested = ?workflow_id,
                    "Chat exchange started while another is loading"
                );
                return Err(Error::ConcurrentChat {
                    active: self.workflow_id.clone(),
                    requested: workflow_id,
                });
            }
            ChatPhase::Responded | ChatPhase::Errored => self.reset(),
            ChatPhase::Idle => {}
        }

        debug!(workflow_id = ?workflow_id, "Chat exchange loading");
        self.workflow_id = workflow_id;
        self.phase = ChatPhase::Loading;
        Ok(())
    }

    /// Server acknowledgement of a request.
    ///
    /// Returns `Ok(false)` when the matching exchange is already loading.
    pub fn acknowledge(&mut self, workflow_id: Option<String>) -> Result<bool> {
        if self.is_loading() {
            let same = match (&self.workflow_id, &workflow_id) {
                (Some(active), Some(acked)) => active == acked,
                _ => true,
            };
            if same {
                if self.workflow_id.is_none() {
                    self.workflow_id = workflow_id;
                }
                return Ok(false);
            }
        }
        self.start(workflow_id).map(|()| true)
    }

    /// Apply a response. Returns `true` when it was new and recorded, in which
    /// case the caller appends exactly one assistant message.
    ///
    /// `fallback_workflow` is used when the response does not name its
    /// workflow (typically the envelope's `workflow_id`).
    pub fn apply_response(&mut self, response: &ChatResponse, fallback_workflow: Option<&str>) -> bool {
        let workflow_id = response.workflow_id.as_deref().or(fallback_workflow);

        if self.is_loading() {
            if let (Some(active), Some(incoming)) = (self.workflow_id.as_deref(), workflow_id) {
                if active != incoming {
                    debug!(active, incoming, "Ignoring response for another workflow");
                    return false;
                }
            }
        }

        let response_id = self.response_id(response, workflow_id);
        if !self.processed_response_ids.insert(response_id.clone()) {
            debug!(response_id = %response_id, "Duplicate chat response ignored");
            return false;
        }

        if self.workflow_id.is_none() {
            self.workflow_id = workflow_id.map(ToString::to_string);
        }
        self.last_response = Some(response.clone());
        self.error = None;
        self.phase = ChatPhase::Responded;
        true
    }

    /// Record a failure of the current exchange
    pub fn apply_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        debug!(error = %message, "Chat exchange errored");
        self.error = Some(message);
        self.phase = ChatPhase::Errored;
    }

    /// Back to idle. Processed response ids are kept.
    pub fn reset(&mut self) {
        self.workflow_id = None;
        self.phase = ChatPhase::Idle;
        self.last_response = None;
        self.error = None;
    }

    /// Stop waiting after a workflow cancel. Returns whether anything was loading.
    pub fn cancel(&mut self) -> bool {
        if !self.is_loading() {
            return false;
        }
        self.phase = if self.last_response.is_some() {
            ChatPhase::Responded
        } else {
            ChatPhase::Idle
        };
        true
    }

    /// Full reset on project switch, including processed response ids
    pub fn reset_scope(&mut self) {
        self.reset();
        self.processed_response_ids.clear();
    }

    /// Identity of a response: its id, else a fingerprint of its content
    #[must_use]
    pub fn response_id(&self, response: &ChatResponse, workflow_id: Option<&str>) -> String {
        if let Some(id) = response.id.as_deref().filter(|id| !id.is_empty()) {
            return id.to_string();
        }

        let prefix: String = response.content.chars().take(self.fingerprint_chars).collect();
        let timestamp = response
            .timestamp
            .map(|t| t.to_rfc3339())
            .unwrap_or_default();

        let mut hasher = Sha256::new();
        for part in [workflow_id.unwrap_or_default(), prefix.as_str(), timestamp.as_str()] {
            hasher.update(part.as_bytes());
            hasher.update([0u8]);
        }
        format!("fp:{:x}", hasher.finalize())
    }
}

#[cfg(test)]
mod tests;
