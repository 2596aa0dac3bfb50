//! Session configuration

use crate::bus::DEFAULT_BUS_CAPACITY;
use crate::chat::correlation::DEFAULT_FINGERPRINT_CHARS;
use crate::chat::log::DEFAULT_HISTORY_CAP;
use serde::{Deserialize, Serialize};

/// Configuration for a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Changes buffered per subscriber before it lags
    pub bus_capacity: usize,
    /// Commands buffered in the session mailbox
    pub mailbox_capacity: usize,
    /// Content characters fed into response fingerprints
    pub fingerprint_chars: usize,
    /// Conversation messages kept
    pub history_cap: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            bus_capacity: DEFAULT_BUS_CAPACITY,
            mailbox_capacity: 1024,
            fingerprint_chars: DEFAULT_FINGERPRINT_CHARS,
            history_cap: DEFAULT_HISTORY_CAP,
        }
    }
}

impl CoreConfig {
    /// Create a new configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the change bus capacity
    #[must_use]
    pub fn with_bus_capacity(mut self, capacity: usize) -> Self {
        self.bus_capacity = capacity;
        self
    }

    /// Set the mailbox capacity
    #[must_use]
    pub fn with_mailbox_capacity(mut self, capacity: usize) -> Self {
        self.mailbox_capacity = capacity;
        self
    }

    /// Set the fingerprint prefix length
    #[must_use]
    pub fn with_fingerprint_chars(mut self, chars: usize) -> Self {
        self.fingerprint_chars = chars;
        self
    }

    /// Set the conversation cap
    #[must_use]
    pub fn with_history_cap(mut self, cap: usize) -> Self {
        self.history_cap = cap;
        self
    }
}
