//! Chat side of the session
//!
//! - [`correlation`]: matches asynchronous responses to the exchange that
//!   requested them and deduplicates redelivered responses
//! - [`guard`]: serializes sends against history loads
//! - [`log`]: the operator-visible conversation
//! - [`backend`]: network seam for sending and loading history

pub mod backend;
pub mod correlation;
pub mod guard;
pub mod log;

pub use backend::{ChatBackend, MockChatBackend, OfflineBackend, OutgoingMessage, SendReceipt};
pub use correlation::{ChatCorrelation, ChatExchange, ChatPhase};
pub use guard::{GuardState, HistoryTicket, SendGuard};
pub use log::{ChatLog, ChatMessage, MessageRole, MessageStatus};
