//! ChangeBus - broadcast of state changes applied by the session.
//!
//! Renderers subscribe here to learn *that* something changed and then read
//! the latest snapshot. Dropping a receiver unsubscribes it.

mod channel;
mod types;

pub use channel::{ChangeBus, DEFAULT_BUS_CAPACITY};
pub use types::StateChange;
