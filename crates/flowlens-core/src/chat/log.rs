//! Operator-visible conversation

use crate::envelope::ChatResponse;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::VecDeque;
use uuid::Uuid;

/// Default number of messages kept
pub const DEFAULT_HISTORY_CAP: usize = 500;

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    /// The operator
    User,
    /// The agent system
    Assistant,
    /// Local notices
    System,
}

/// Delivery status of a message
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    /// Created locally, not yet accepted by the server
    #[default]
    Pending,
    /// Accepted by the server
    Sent,
    /// Send failed
    Failed,
    /// Received from the server
    Delivered,
}

/// One conversation entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message id
    pub id: String,
    /// Author
    pub role: MessageRole,
    /// Text
    pub content: String,
    /// Creation time
    pub timestamp: DateTime<Utc>,
    /// Workflow the message belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,
    /// Delivery status
    #[serde(default)]
    pub status: MessageStatus,
    /// Extra payload
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl ChatMessage {
    fn new(role: MessageRole, content: impl Into<String>, status: MessageStatus) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            workflow_id: None,
            status,
            metadata: Map::new(),
        }
    }

    /// Pending operator message
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content, MessageStatus::Pending)
    }

    /// Local notice
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content, MessageStatus::Delivered)
    }

    /// Assistant message built from a server response
    #[must_use]
    pub fn assistant(response: &ChatResponse, workflow_id: Option<&str>) -> Self {
        let mut message = Self::new(
            MessageRole::Assistant,
            response.content.clone(),
            MessageStatus::Delivered,
        );
        if let Some(id) = &response.id {
            message.id = id.clone();
        }
        if let Some(timestamp) = response.timestamp {
            message.timestamp = timestamp;
        }
        message.workflow_id = response
            .workflow_id
            .clone()
            .or_else(|| workflow_id.map(ToString::to_string));
        message.metadata = response.metadata.clone();
        message
    }

    /// Set the workflow
    #[must_use]
    pub fn with_workflow(mut self, workflow_id: Option<String>) -> Self {
        self.workflow_id = workflow_id;
        self
    }
}

/// Bounded, ordered conversation
#[derive(Debug, Clone)]
pub struct ChatLog {
    messages: VecDeque<ChatMessage>,
    capacity: usize,
}

impl Default for ChatLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAP)
    }
}

impl ChatLog {
    /// Create a log keeping at most `capacity` messages
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            messages: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Append, evicting the oldest messages beyond capacity
    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push_back(message);
        while self.messages.len() > self.capacity {
            self.messages.pop_front();
        }
    }

    /// Update the status of a message. Returns whether it was found.
    pub fn set_status(&mut self, id: &str, status: MessageStatus) -> bool {
        match self.messages.iter_mut().find(|m| m.id == id) {
            Some(message) => {
                message.status = status;
                true
            }
            None => false,
        }
    }

    /// Replace the whole conversation with loaded history.
    ///
    /// Messages still pending locally are kept after the loaded ones.
    pub fn replace_history(&mut self, history: Vec<ChatMessage>) {
        let pending: Vec<ChatMessage> = self
            .messages
            .drain(..)
            .filter(|m| m.status == MessageStatus::Pending)
            .collect();
        for message in history.into_iter().chain(pending) {
            self.push(message);
        }
    }

    /// Look up a message
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&ChatMessage> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// Messages in order
    pub fn iter(&self) -> impl Iterator<Item = &ChatMessage> {
        self.messages.iter()
    }

    /// Number of messages
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the log is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Drop everything
    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

#[cfg(test)]
mod tests;
