//! Workflow aggregation
//!
//! Folds step events, which may arrive duplicated and out of order, into a
//! flat step list and a per-workflow timeline. Both views are maintained
//! independently: the flat list and each group keep their own ordering over
//! the same logical steps, because they are rendered separately.
//!
//! Every mutation is an idempotent merge keyed by step id, never an append.

use crate::envelope::{ProgressDelta, Step};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

/// How a workflow ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// Finished normally
    Completed,
    /// Cancelled by the operator or the server
    Cancelled,
}

/// Ordered timeline of one workflow
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowGroup {
    /// Workflow identifier
    pub workflow_id: String,
    /// Steps in timeline order
    pub steps: Vec<Step>,
    /// Timestamp of the first step seen
    pub start_time: DateTime<Utc>,
    /// Set on termination
    pub end_time: Option<DateTime<Utc>>,
    /// Whether the workflow is still running
    pub is_active: bool,
    /// Percentage (0-100)
    pub progress: f64,
    /// Terminal transition, if any
    pub termination: Option<Termination>,
}

impl WorkflowGroup {
    fn new(workflow_id: String, start_time: DateTime<Utc>) -> Self {
        Self {
            workflow_id,
            steps: Vec::new(),
            start_time,
            end_time: None,
            is_active: false,
            progress: 0.0,
            termination: None,
        }
    }

    /// Whether a terminal transition already happened
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.termination.is_some()
    }

    /// Ids of the steps in timeline order
    #[must_use]
    pub fn step_ids(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.id.as_str()).collect()
    }
}

/// Aggregate progress counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ProgressState {
    /// Percentage (0-100)
    pub progress: f64,
    /// Index of the current step
    pub current_step: Option<u32>,
    /// Total number of steps
    pub total_steps: Option<u32>,
}

/// Result of an upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// The step was new
    Inserted,
    /// A step with the same id was replaced in place
    Replaced,
}

/// Flat step list plus per-workflow groups.
#[derive(Debug, Clone, Default)]
pub struct WorkflowAggregator {
    steps: Vec<Step>,
    groups: Vec<WorkflowGroup>,
    progress: ProgressState,
    active_workflow_id: Option<String>,
}

impl WorkflowAggregator {
    /// Create an empty aggregator
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Flat, deduplicated step list
    #[must_use]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Workflow groups in creation order
    #[must_use]
    pub fn groups(&self) -> &[WorkflowGroup] {
        &self.groups
    }

    /// Look up a group
    #[must_use]
    pub fn group(&self, workflow_id: &str) -> Option<&WorkflowGroup> {
        self.groups.iter().find(|g| g.workflow_id == workflow_id)
    }

    /// Aggregate progress counters
    #[must_use]
    pub fn progress(&self) -> ProgressState {
        self.progress
    }

    /// Workflow that step-less context is attributed to
    #[must_use]
    pub fn active_workflow(&self) -> Option<&str> {
        self.active_workflow_id.as_deref()
    }

    /// Set the workflow used for attribution. Returns whether it changed.
    pub fn switch_workflow(&mut self, workflow_id: Option<String>) -> bool {
        let workflow_id = workflow_id.filter(|w| !w.is_empty());
        if self.active_workflow_id == workflow_id {
            return false;
        }
        debug!(workflow_id = ?workflow_id, "Active workflow switched");
        self.active_workflow_id = workflow_id;
        true
    }

    /// Resolve an explicit workflow id, falling back to the active one
    #[must_use]
    pub fn resolve_workflow(&self, workflow_id: Option<&str>) -> Option<String> {
        workflow_id
            .or(self.active_workflow())
            .map(ToString::to_string)
    }

    /// Merge a step into both views.
    ///
    /// `observed_at` stamps steps that carry no timestamp of their own and
    /// becomes the start time of a newly created group. A redelivered step
    /// without a timestamp keeps the one already recorded, so repeating the
    /// same delivery never changes the observable state.
    pub fn upsert_step(&mut self, mut step: Step, observed_at: DateTime<Utc>) -> Result<UpsertOutcome> {
        let Some(workflow_id) = self.resolve_workflow(step.workflow_id.as_deref()) else {
            warn!(step_id = %step.id, "Dropping step with no workflow to attribute it to");
            return Err(Error::UnattributedStep { step_id: step.id });
        };
        step.workflow_id = Some(workflow_id.clone());

        if step.timestamp.is_none() {
            step.timestamp = self
                .steps
                .iter()
                .find(|s| s.id == step.id)
                .and_then(|s| s.timestamp)
                .or(Some(observed_at));
        }
        let start_time = step.timestamp.unwrap_or(observed_at);
        let completes = step.kind.is_completion();

        let outcome = upsert_into(&mut self.steps, step.clone());

        let index = match self.groups.iter().position(|g| g.workflow_id == workflow_id) {
            Some(index) => index,
            None => {
                debug!(workflow_id = %workflow_id, "Creating workflow group");
                self.groups
                    .push(WorkflowGroup::new(workflow_id.clone(), start_time));
                self.groups.len() - 1
            }
        };
        let group = &mut self.groups[index];
        upsert_into(&mut group.steps, step);

        if !completes && !group.is_terminated() {
            group.is_active = true;
        }

        Ok(outcome)
    }

    /// Merge a partial progress update. Returns whether anything was present.
    ///
    /// The percentage is mirrored onto the group of `workflow_id` (or the
    /// active workflow) when that group exists.
    pub fn update_progress(&mut self, delta: ProgressDelta, workflow_id: Option<&str>) -> bool {
        if delta.is_empty() {
            return false;
        }

        if let Some(progress) = delta.progress {
            let progress = progress.clamp(0.0, 100.0);
            self.progress.progress = progress;
            if let Some(workflow_id) = self.resolve_workflow(workflow_id) {
                if let Some(group) = self.group_mut(&workflow_id) {
                    group.progress = progress;
                }
            }
        }
        if let Some(current_step) = delta.current_step {
            self.progress.current_step = Some(current_step);
        }
        if let Some(total_steps) = delta.total_steps {
            self.progress.total_steps = Some(total_steps);
        }

        true
    }

    /// Mark a workflow completed. Returns whether a transition happened.
    pub fn mark_completed(&mut self, workflow_id: &str, at: DateTime<Utc>) -> bool {
        let transitioned = self.terminate(workflow_id, Termination::Completed, at);
        if transitioned {
            if let Some(group) = self.group_mut(workflow_id) {
                group.progress = 100.0;
            }
        }
        transitioned
    }

    /// Mark a workflow cancelled. Already-applied steps are kept.
    pub fn mark_cancelled(&mut self, workflow_id: &str, at: DateTime<Utc>) -> bool {
        self.terminate(workflow_id, Termination::Cancelled, at)
    }

    /// Reset steps, groups and progress. There is no partial clear.
    pub fn clear_all(&mut self) {
        debug!(
            steps = self.steps.len(),
            groups = self.groups.len(),
            "Clearing workflow view"
        );
        self.steps.clear();
        self.groups.clear();
        self.progress = ProgressState::default();
    }

    fn group_mut(&mut self, workflow_id: &str) -> Option<&mut WorkflowGroup> {
        self.groups.iter_mut().find(|g| g.workflow_id == workflow_id)
    }

    fn terminate(&mut self, workflow_id: &str, termination: Termination, at: DateTime<Utc>) -> bool {
        let Some(group) = self.group_mut(workflow_id) else {
            debug!(workflow_id = %workflow_id, ?termination, "Termination for unknown workflow");
            return false;
        };
        if let Some(previous) = group.termination {
            debug!(workflow_id = %workflow_id, ?previous, ?termination, "Workflow already terminated");
            return false;
        }

        group.is_active = false;
        group.end_time = Some(at);
        group.termination = Some(termination);
        true
    }
}

/// Upsert by id: replace in place, or insert before the first step with a
/// strictly greater step number, or append.
fn upsert_into(steps: &mut Vec<Step>, step: Step) -> UpsertOutcome {
    if let Some(existing) = steps.iter_mut().find(|s| s.id == step.id) {
        *existing = step;
        return UpsertOutcome::Replaced;
    }

    let index = step
        .step_number
        .and_then(|number| {
            steps
                .iter()
                .position(|s| s.step_number.is_some_and(|n| n > number))
        })
        .unwrap_or(steps.len());
    steps.insert(index, step);
    UpsertOutcome::Inserted
}
