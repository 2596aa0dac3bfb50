//! Flowlens Core - Event Routing and Workflow Aggregation
//!
//! This crate keeps a live, consistent view of a multi-agent workflow fed by
//! an unordered, possibly duplicated stream of server events, including:
//! - Envelope: decoding of inbound events
//! - Router: kind-to-handler routing with runtime overrides
//! - Scope: dropping events that belong to another project
//! - Aggregator: idempotent per-workflow step timelines
//! - Chat: response correlation, send sequencing, conversation log
//! - Session: the single task that owns all of the above
//!
//! No network I/O happens here; see `flowlens-transport`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod aggregator;
pub mod bus;
pub mod chat;
pub mod config;
pub mod connection;
pub mod envelope;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod router;
pub mod scope;
pub mod session;

pub use aggregator::{ProgressState, Termination, WorkflowAggregator, WorkflowGroup};
pub use bus::{ChangeBus, StateChange};
pub use chat::{
    ChatBackend, ChatCorrelation, ChatExchange, ChatLog, ChatMessage, ChatPhase, GuardState,
    MessageRole, MessageStatus, MockChatBackend, OfflineBackend, OutgoingMessage, SendGuard,
    SendReceipt,
};
pub use config::CoreConfig;
pub use connection::{ConnectionEvent, ConnectionState, ConnectionStatus};
pub use envelope::{ChatResponse, Envelope, EnvelopeBody, EnvelopeKind, ProgressDelta, Step, StepKind};
pub use error::{format_error_for_cli, Error, Result, UserFriendlyError};
pub use metrics::{StatusMetrics, StatusReport};
pub use router::{DispatchOutcome, Handler, Route, Router};
pub use scope::{ProjectScope, ScopeDecision, ScopeRejection};
pub use session::{Session, SessionHandle, Snapshot, Workspace};
