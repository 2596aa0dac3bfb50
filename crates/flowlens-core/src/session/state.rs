//! State owned by the session task

use super::snapshot::Snapshot;
use crate::aggregator::{Termination, UpsertOutcome, WorkflowAggregator};
use crate::bus::StateChange;
use crate::chat::{ChatCorrelation, ChatLog, ChatMessage, MessageStatus, SendGuard};
use crate::config::CoreConfig;
use crate::connection::{ConnectionEvent, ConnectionStatus};
use crate::envelope::{ChatResponse, ProgressDelta, Step};
use crate::error::Result;
use crate::metrics::StatusMetrics;
use crate::scope::ProjectScope;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

/// All mutable state of a session.
///
/// Only the session task holds a `&mut Workspace`. Handlers registered on the
/// router receive it for the duration of one envelope. Every mutation records
/// a [`StateChange`], drained and broadcast after the command completes.
#[derive(Debug)]
pub struct Workspace {
    scope: ProjectScope,
    aggregator: WorkflowAggregator,
    chat: ChatCorrelation,
    guard: SendGuard,
    log: ChatLog,
    follow_ups: Vec<String>,
    connection: ConnectionStatus,
    last_server_error: Option<String>,
    metrics: StatusMetrics,
    changes: Vec<StateChange>,
}

impl Workspace {
    /// Create an empty workspace
    #[must_use]
    pub fn new(config: &CoreConfig, metrics: StatusMetrics) -> Self {
        Self {
            scope: ProjectScope::new(),
            aggregator: WorkflowAggregator::new(),
            chat: ChatCorrelation::new(config.fingerprint_chars),
            guard: SendGuard::new(),
            log: ChatLog::with_capacity(config.history_cap),
            follow_ups: Vec::new(),
            connection: ConnectionStatus::default(),
            last_server_error: None,
            metrics,
            changes: Vec::new(),
        }
    }

    /// Project scope filter
    #[must_use]
    pub fn scope(&self) -> &ProjectScope {
        &self.scope
    }

    /// Project in focus
    #[must_use]
    pub fn current_project(&self) -> Option<&str> {
        self.scope.current()
    }

    /// Workflow aggregator
    #[must_use]
    pub fn aggregator(&self) -> &WorkflowAggregator {
        &self.aggregator
    }

    /// Chat correlation state
    #[must_use]
    pub fn chat(&self) -> &ChatCorrelation {
        &self.chat
    }

    /// Send guard
    #[must_use]
    pub fn guard(&self) -> &SendGuard {
        &self.guard
    }

    pub(crate) fn guard_mut(&mut self) -> &mut SendGuard {
        &mut self.guard
    }

    /// Conversation
    #[must_use]
    pub fn log(&self) -> &ChatLog {
        &self.log
    }

    /// Connection status
    #[must_use]
    pub fn connection(&self) -> &ConnectionStatus {
        &self.connection
    }

    /// Counters
    #[must_use]
    pub fn metrics(&self) -> &StatusMetrics {
        &self.metrics
    }

    /// Record a change for subscribers
    pub fn record(&mut self, change: StateChange) {
        self.changes.push(change);
    }

    /// Drain recorded changes
    pub fn take_changes(&mut self) -> Vec<StateChange> {
        std::mem::take(&mut self.changes)
    }

    /// Change the project in focus and drop everything scoped to the old one.
    /// Returns whether the project changed.
    pub fn set_current_project(&mut self, project_id: Option<String>) -> bool {
        if !self.scope.set_current_project(project_id) {
            return false;
        }
        info!(project_id = ?self.scope.current(), "Project scope changed");

        self.aggregator.clear_all();
        self.aggregator.switch_workflow(None);
        self.chat.reset_scope();
        self.log.clear();
        self.follow_ups.clear();

        self.record(StateChange::ProjectChanged {
            project_id: self.scope.current().map(ToString::to_string),
        });
        self.record(StateChange::WorkflowsCleared);
        self.record(StateChange::ActiveWorkflowChanged { workflow_id: None });
        self.record_chat_phase();
        self.record(StateChange::FollowUpsChanged { count: 0 });
        true
    }

    /// Set the workflow used for attribution
    pub fn switch_workflow(&mut self, workflow_id: Option<String>) -> bool {
        if !self.aggregator.switch_workflow(workflow_id) {
            return false;
        }
        self.record(StateChange::ActiveWorkflowChanged {
            workflow_id: self.aggregator.active_workflow().map(ToString::to_string),
        });
        true
    }

    /// Merge a step, attributing it to `fallback_workflow` when it names none
    pub fn apply_step(
        &mut self,
        mut step: Step,
        fallback_workflow: Option<&str>,
        observed_at: DateTime<Utc>,
    ) -> Result<()> {
        if step.workflow_id.is_none() {
            step.workflow_id = fallback_workflow.map(ToString::to_string);
        }
        let step_id = step.id.clone();
        let outcome = self.aggregator.upsert_step(step, observed_at)?;

        let workflow_id = self
            .aggregator
            .steps()
            .iter()
            .find(|s| s.id == step_id)
            .and_then(|s| s.workflow_id.clone())
            .unwrap_or_default();
        self.record(StateChange::StepUpserted {
            workflow_id,
            step_id,
            inserted: outcome == UpsertOutcome::Inserted,
        });
        Ok(())
    }

    /// Merge a partial progress update
    pub fn apply_progress(&mut self, delta: ProgressDelta, workflow_id: Option<&str>) {
        if self.aggregator.update_progress(delta, workflow_id) {
            self.record(StateChange::ProgressChanged {
                workflow_id: self.aggregator.resolve_workflow(workflow_id),
                progress: self.aggregator.progress(),
            });
        }
    }

    /// Terminal transition of a workflow. Returns the workflow id when one
    /// could be resolved.
    ///
    /// Cancelling also stops waiting for a chat response.
    pub fn terminate(
        &mut self,
        workflow_id: Option<&str>,
        termination: Termination,
        at: DateTime<Utc>,
    ) -> Option<String> {
        let Some(workflow_id) = self.aggregator.resolve_workflow(workflow_id) else {
            debug!(?termination, "Termination without a workflow to apply it to");
            return None;
        };

        let transitioned = match termination {
            Termination::Completed => self.aggregator.mark_completed(&workflow_id, at),
            Termination::Cancelled => self.aggregator.mark_cancelled(&workflow_id, at),
        };
        if transitioned {
            self.record(StateChange::WorkflowTerminated {
                workflow_id: workflow_id.clone(),
                termination,
            });
        }

        if termination == Termination::Cancelled && self.chat.cancel() {
            self.record_chat_phase();
        }
        Some(workflow_id)
    }

    /// Clear steps, groups and progress, and stop waiting on the chat
    pub fn clear_workflows(&mut self) {
        self.aggregator.clear_all();
        self.record(StateChange::WorkflowsCleared);
        if self.chat.cancel() {
            self.record_chat_phase();
        }
    }

    /// Server accepted a chat request
    pub fn acknowledge_chat(&mut self, workflow_id: Option<&str>) -> Result<()> {
        if self.chat.acknowledge(workflow_id.map(ToString::to_string))? {
            self.record_chat_phase();
        }
        Ok(())
    }

    /// Begin an exchange for a locally sent message
    pub fn start_chat(&mut self, workflow_id: Option<String>) -> Result<()> {
        self.chat.start(workflow_id)?;
        self.record_chat_phase();
        Ok(())
    }

    /// Apply a chat response; appends one assistant message when it is new
    pub fn apply_chat_response(&mut self, response: &ChatResponse, fallback_workflow: Option<&str>) {
        if !self.chat.apply_response(response, fallback_workflow) {
            return;
        }
        let message = ChatMessage::assistant(response, self.chat.workflow_id());
        self.push_message(message);
        self.record_chat_phase();
    }

    /// Mark the current exchange failed
    pub fn apply_chat_error(&mut self, error: impl Into<String>) {
        let error = error.into();
        warn!(error = %error, "Chat request failed");
        self.metrics.errors.inc();
        self.chat.apply_error(error);
        self.record_chat_phase();
    }

    /// Back to idle, keeping processed response ids
    pub fn reset_chat(&mut self) {
        self.chat.reset();
        self.record_chat_phase();
    }

    /// Append a conversation message
    pub fn push_message(&mut self, message: ChatMessage) {
        let change = StateChange::MessageAppended {
            message_id: message.id.clone(),
            role: message.role,
        };
        self.log.push(message);
        self.record(change);
    }

    /// Update a message's delivery status
    pub fn set_message_status(&mut self, message_id: &str, status: MessageStatus) {
        if self.log.set_status(message_id, status) {
            self.record(StateChange::MessageStatusChanged {
                message_id: message_id.to_string(),
                status,
            });
        }
    }

    /// Replace the conversation with loaded history
    pub fn replace_history(&mut self, workflow_id: &str, history: Vec<ChatMessage>) {
        let count = history.len();
        self.log.replace_history(history);
        self.record(StateChange::HistoryLoaded {
            workflow_id: workflow_id.to_string(),
            count,
        });
    }

    /// Replace the suggested follow-up questions
    pub fn set_follow_ups(&mut self, questions: Vec<String>) {
        let count = questions.len();
        self.follow_ups = questions;
        self.record(StateChange::FollowUpsChanged { count });
    }

    /// Record an error pushed by the server
    pub fn server_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!(error = %message, "Server reported an error");
        self.metrics.errors.inc();
        self.last_server_error = Some(message.clone());
        self.record(StateChange::ServerError { message });
    }

    /// Fold a transport lifecycle event
    pub fn apply_connection_event(&mut self, event: &ConnectionEvent) {
        let before = self.connection.state;
        if self.connection.apply(event) && self.connection.state != before {
            self.record(StateChange::ConnectionChanged {
                state: self.connection.state,
            });
        }
    }

    /// Record the current guard state
    pub(crate) fn record_guard(&mut self) {
        self.record(StateChange::GuardChanged {
            state: self.guard.state(),
        });
    }

    fn record_chat_phase(&mut self) {
        self.record(StateChange::ChatPhaseChanged {
            phase: self.chat.phase(),
            workflow_id: self.chat.workflow_id().map(ToString::to_string),
        });
    }

    /// Copy of the current state
    #[must_use]
    pub fn snapshot(&self, version: u64) -> Snapshot {
        Snapshot {
            version,
            project_id: self.scope.current().map(ToString::to_string),
            active_workflow_id: self.aggregator.active_workflow().map(ToString::to_string),
            steps: self.aggregator.steps().to_vec(),
            groups: self.aggregator.groups().to_vec(),
            progress: self.aggregator.progress(),
            chat: self.chat.exchange(),
            messages: self.log.iter().cloned().collect(),
            follow_up_questions: self.follow_ups.clone(),
            guard: self.guard.state(),
            connection: self.connection.clone(),
            last_server_error: self.last_server_error.clone(),
            status: self.metrics.report(),
        }
    }
}

#[cfg(test)]
mod tests;
