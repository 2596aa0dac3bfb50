use super::types::StateChange;
use tokio::sync::broadcast;

/// Default number of buffered changes per subscriber
pub const DEFAULT_BUS_CAPACITY: usize = 256;

/// Broadcast channel of [`StateChange`]s.
///
/// Slow subscribers observe `RecvError::Lagged` instead of blocking the
/// session task.
#[derive(Debug, Clone)]
pub struct ChangeBus {
    sender: broadcast::Sender<StateChange>,
}

impl ChangeBus {
    /// Create a bus buffering up to `capacity` changes per subscriber
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to future changes
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.sender.subscribe()
    }

    /// Publish a change. Returns the number of subscribers reached.
    pub fn publish(&self, change: StateChange) -> usize {
        // no receivers is not an error
        self.sender.send(change).unwrap_or(0)
    }

    /// Number of live subscribers
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}
