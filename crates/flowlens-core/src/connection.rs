//! Connection status as seen by the session
//!
//! The transport reports lifecycle events; the session folds them into a
//! [`ConnectionStatus`] that is published with every snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Transport state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Opening the socket
    Connecting,
    /// Socket open
    Connected,
    /// Socket closed, no retry scheduled
    #[default]
    Disconnected,
    /// Waiting before the next attempt
    Reconnecting,
    /// Gave up
    Error,
}

/// Lifecycle event reported by the transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ConnectionEvent {
    /// Attempting to connect
    Connecting,
    /// Connected
    Connected,
    /// Connection closed
    Disconnected {
        /// Close reason, if known
        reason: Option<String>,
    },
    /// Retry scheduled
    Reconnecting {
        /// Attempt number, starting at 1
        attempt: u32,
    },
    /// Unrecoverable failure
    Failed {
        /// Error description
        error: String,
    },
    /// Liveness observed (pong, heartbeat)
    Alive {
        /// When it was observed
        at: DateTime<Utc>,
    },
}

/// Connection state plus bookkeeping
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    /// Current state
    pub state: ConnectionState,
    /// Attempts since the last successful connect
    pub reconnect_attempts: u32,
    /// Last liveness signal
    pub last_ping: Option<DateTime<Utc>>,
    /// Last error reported
    pub last_error: Option<String>,
}

impl ConnectionStatus {
    /// Fold an event in. Returns whether the status changed.
    pub fn apply(&mut self, event: &ConnectionEvent) -> bool {
        let before = self.clone();

        match event {
            ConnectionEvent::Connecting => self.state = ConnectionState::Connecting,
            ConnectionEvent::Connected => {
                self.state = ConnectionState::Connected;
                self.reconnect_attempts = 0;
                self.last_error = None;
            }
            ConnectionEvent::Disconnected { reason } => {
                self.state = ConnectionState::Disconnected;
                if reason.is_some() {
                    self.last_error.clone_from(reason);
                }
            }
            ConnectionEvent::Reconnecting { attempt } => {
                self.state = ConnectionState::Reconnecting;
                self.reconnect_attempts = *attempt;
            }
            ConnectionEvent::Failed { error } => {
                self.state = ConnectionState::Error;
                self.last_error = Some(error.clone());
            }
            ConnectionEvent::Alive { at } => self.last_ping = Some(*at),
        }

        *self != before
    }

    /// Whether the socket is open
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}
