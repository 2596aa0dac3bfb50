use crate::aggregator::{ProgressState, Termination};
use crate::chat::{ChatPhase, GuardState, MessageRole, MessageStatus};
use crate::connection::ConnectionState;
use serde::Serialize;

/// A state change applied by the session task.
///
/// Changes carry identifiers, not full payloads; read the snapshot for the
/// current values.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateChange {
    /// A step was inserted or replaced
    StepUpserted {
        /// Owning workflow
        workflow_id: String,
        /// Step identifier
        step_id: String,
        /// `false` when an existing step was replaced
        inserted: bool,
    },
    /// Progress counters changed
    ProgressChanged {
        /// Workflow the update was attributed to
        workflow_id: Option<String>,
        /// New aggregate values
        progress: ProgressState,
    },
    /// A workflow took its terminal transition
    WorkflowTerminated {
        /// Workflow identifier
        workflow_id: String,
        /// How it ended
        termination: Termination,
    },
    /// Steps, groups and progress were cleared
    WorkflowsCleared,
    /// The workflow used for attribution changed
    ActiveWorkflowChanged {
        /// New active workflow
        workflow_id: Option<String>,
    },
    /// The project in focus changed
    ProjectChanged {
        /// New project
        project_id: Option<String>,
    },
    /// The chat exchange moved to another phase
    ChatPhaseChanged {
        /// New phase
        phase: ChatPhase,
        /// Workflow of the exchange
        workflow_id: Option<String>,
    },
    /// A message was appended to the conversation
    MessageAppended {
        /// Message id
        message_id: String,
        /// Author
        role: MessageRole,
    },
    /// A message changed delivery status
    MessageStatusChanged {
        /// Message id
        message_id: String,
        /// New status
        status: MessageStatus,
    },
    /// Conversation replaced by loaded history
    HistoryLoaded {
        /// Workflow the history belongs to
        workflow_id: String,
        /// Number of loaded messages
        count: usize,
    },
    /// Suggested follow-up questions replaced
    FollowUpsChanged {
        /// Number of questions
        count: usize,
    },
    /// The send guard changed state
    GuardChanged {
        /// New state
        state: GuardState,
    },
    /// The transport changed state
    ConnectionChanged {
        /// New state
        state: ConnectionState,
    },
    /// The server reported an error
    ServerError {
        /// Error text
        message: String,
    },
}
