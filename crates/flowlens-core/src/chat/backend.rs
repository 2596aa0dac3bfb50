//! Chat backend seam
//!
//! The session never performs network I/O itself. Sends, history loads and
//! cancels go through a [`ChatBackend`] in spawned tasks, and their results
//! are handed back to the session task.

use super::log::ChatMessage;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

/// Message handed to the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    /// Local message id
    pub message_id: String,
    /// Text
    pub content: String,
    /// Project in focus when the message was sent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    /// Workflow the message continues, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,
}

/// Server acknowledgement of a send
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SendReceipt {
    /// Workflow the server started or continued
    #[serde(default)]
    pub workflow_id: Option<String>,
    /// Server-side message id
    #[serde(default)]
    pub message_id: Option<String>,
}

/// Network operations of the chat
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Submit a message
    async fn send_message(&self, message: OutgoingMessage) -> Result<SendReceipt>;

    /// Load the conversation of a workflow
    async fn load_history(
        &self,
        project_id: Option<&str>,
        workflow_id: &str,
    ) -> Result<Vec<ChatMessage>>;

    /// Ask the server to cancel a workflow. Advisory.
    async fn cancel_workflow(&self, project_id: Option<&str>, workflow_id: &str) -> Result<()>;
}

/// Backend with no server behind it
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineBackend;

#[async_trait]
impl ChatBackend for OfflineBackend {
    fn name(&self) -> &str {
        "offline"
    }

    async fn send_message(&self, _message: OutgoingMessage) -> Result<SendReceipt> {
        Err(Error::BackendUnavailable)
    }

    async fn load_history(
        &self,
        _project_id: Option<&str>,
        _workflow_id: &str,
    ) -> Result<Vec<ChatMessage>> {
        Err(Error::BackendUnavailable)
    }

    async fn cancel_workflow(&self, _project_id: Option<&str>, _workflow_id: &str) -> Result<()> {
        Err(Error::BackendUnavailable)
    }
}

/// A mock backend that returns queued results or defaults.
///
/// Failures are queued as strings and surface as [`Error::Backend`].
#[derive(Default)]
pub struct MockChatBackend {
    sends: Mutex<VecDeque<std::result::Result<SendReceipt, String>>>,
    histories: Mutex<VecDeque<std::result::Result<Vec<ChatMessage>, String>>>,
    sent: Mutex<Vec<OutgoingMessage>>,
    cancelled: Mutex<Vec<String>>,
    gate: Option<Arc<Semaphore>>,
}

impl MockChatBackend {
    /// Create a new mock backend
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold sends and history loads until the gate grants a permit, one
    /// permit per call
    #[must_use]
    pub fn with_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Queue the result of the next send
    pub fn push_send(&self, result: std::result::Result<SendReceipt, String>) {
        lock(&self.sends).push_back(result);
    }

    /// Queue the result of the next history load
    pub fn push_history(&self, result: std::result::Result<Vec<ChatMessage>, String>) {
        lock(&self.histories).push_back(result);
    }

    /// Messages submitted so far
    #[must_use]
    pub fn sent(&self) -> Vec<OutgoingMessage> {
        lock(&self.sent).clone()
    }

    /// Workflows cancelled so far
    #[must_use]
    pub fn cancelled(&self) -> Vec<String> {
        lock(&self.cancelled).clone()
    }

    async fn wait(&self) {
        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[async_trait]
impl ChatBackend for MockChatBackend {
    fn name(&self) -> &str {
        "mock"
    }

    async fn send_message(&self, message: OutgoingMessage) -> Result<SendReceipt> {
        lock(&self.sent).push(message.clone());
        self.wait().await;

        let next = lock(&self.sends).pop_front();
        match next {
            Some(result) => result.map_err(Error::Backend),
            None => Ok(SendReceipt {
                workflow_id: message.workflow_id,
                message_id: Some(message.message_id),
            }),
        }
    }

    async fn load_history(
        &self,
        _project_id: Option<&str>,
        _workflow_id: &str,
    ) -> Result<Vec<ChatMessage>> {
        self.wait().await;

        let next = lock(&self.histories).pop_front();
        next.unwrap_or_else(|| Ok(Vec::new()))
            .map_err(Error::Backend)
    }

    async fn cancel_workflow(&self, _project_id: Option<&str>, workflow_id: &str) -> Result<()> {
        lock(&self.cancelled).push(workflow_id.to_string());
        Ok(())
    }
}
