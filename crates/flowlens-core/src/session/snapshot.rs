use crate::aggregator::{ProgressState, WorkflowGroup};
use crate::chat::{ChatExchange, ChatMessage, GuardState};
use crate::connection::ConnectionStatus;
use crate::envelope::Step;
use crate::metrics::StatusReport;
use serde::Serialize;

/// Point-in-time copy of everything a renderer shows.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Snapshot {
    /// Incremented whenever a command produced at least one change
    pub version: u64,
    /// Project in focus
    pub project_id: Option<String>,
    /// Workflow used for attribution
    pub active_workflow_id: Option<String>,
    /// Flat step list
    pub steps: Vec<Step>,
    /// Per-workflow timelines
    pub groups: Vec<WorkflowGroup>,
    /// Aggregate progress
    pub progress: ProgressState,
    /// Current chat exchange
    pub chat: ChatExchange,
    /// Conversation
    pub messages: Vec<ChatMessage>,
    /// Suggested follow-up questions
    pub follow_up_questions: Vec<String>,
    /// Send guard state, for disabling inputs
    pub guard: GuardState,
    /// Transport state
    pub connection: ConnectionStatus,
    /// Last error event pushed by the server
    pub last_server_error: Option<String>,
    /// Counters
    pub status: StatusReport,
}

impl Snapshot {
    /// Whether any workflow is still running
    #[must_use]
    pub fn has_active_workflow(&self) -> bool {
        self.groups.iter().any(|g| g.is_active)
    }

    /// Pretty JSON rendering
    pub fn to_json_pretty(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
