//! Send-side sequencing guard
//!
//! One state value and a generation counter. A history load is applied only
//! if no send started after it was issued.

use crate::error::{Error, Result};
use serde::Serialize;
use tracing::debug;

/// What the chat input is currently doing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardState {
    /// Free
    #[default]
    Idle,
    /// A message send is in flight
    Sending,
    /// A history load is in flight
    LoadingHistory,
}

/// Proof that a history load was issued at a given generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryTicket {
    generation: u64,
}

impl HistoryTicket {
    /// Generation the ticket was issued at
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Serializes sends against history loads
#[derive(Debug, Clone, Default)]
pub struct SendGuard {
    state: GuardState,
    generation: u64,
}

impl SendGuard {
    /// Create an idle guard
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> GuardState {
        self.state
    }

    /// Current generation
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Enter `Sending`. Invalidates any outstanding history ticket.
    pub fn begin_send(&mut self) -> Result<()> {
        if self.state == GuardState::Sending {
            return Err(Error::SendInProgress);
        }
        if self.state == GuardState::LoadingHistory {
            debug!(generation = self.generation, "Send supersedes history load");
        }
        self.state = GuardState::Sending;
        self.generation += 1;
        Ok(())
    }

    /// Leave `Sending`, on success or failure
    pub fn finish_send(&mut self) {
        if self.state == GuardState::Sending {
            self.state = GuardState::Idle;
        }
    }

    /// Enter `LoadingHistory`. Refused while a send is in flight.
    pub fn begin_history_load(&mut self) -> Option<HistoryTicket> {
        if self.state == GuardState::Sending {
            debug!("History load refused while sending");
            return None;
        }
        self.generation += 1;
        self.state = GuardState::LoadingHistory;
        Some(HistoryTicket {
            generation: self.generation,
        })
    }

    /// Whether a history result may be applied; if so the guard returns to
    /// `Idle`. Stale tickets leave the state untouched.
    pub fn finish_history(&mut self, ticket: HistoryTicket) -> bool {
        if self.state != GuardState::LoadingHistory || ticket.generation != self.generation {
            debug!(
                ticket = ticket.generation,
                current = self.generation,
                state = ?self.state,
                "Discarding stale history result"
            );
            return false;
        }
        self.state = GuardState::Idle;
        true
    }

    /// Release a history load whose result will not be applied
    pub fn abandon_history(&mut self, ticket: HistoryTicket) {
        if self.state == GuardState::LoadingHistory && ticket.generation == self.generation {
            self.state = GuardState::Idle;
        }
    }
}
