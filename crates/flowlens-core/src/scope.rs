//! Project scope filtering
//!
//! Decides whether an inbound envelope belongs to the project currently in
//! focus. The `project_id` check is authoritative. Envelopes that carry only a
//! `workflow_id` fall back to matching the `project_{id}_` naming convention
//! of workflow ids; that path is a weaker, string-based guarantee and is kept
//! only for servers that still omit `project_id`. It is deprecated: every
//! decision it takes is reported as [`ScopeDecision::LegacyAccept`] or
//! [`ScopeRejection::ForeignWorkflowNamespace`] so callers can measure whether
//! anything still depends on it.

use crate::envelope::Envelope;
use serde::Serialize;

/// Prefix of workflow ids namespaced by project
pub const WORKFLOW_NAMESPACE_PREFIX: &str = "project_";

/// Why an envelope was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeRejection {
    /// `project_id` names another project
    ForeignProject,
    /// `workflow_id` is namespaced under another project (fallback path)
    ForeignWorkflowNamespace,
}

/// Outcome of [`ProjectScope::check`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeDecision {
    /// Accepted on `project_id`, or no project is in focus
    Accept,
    /// Accepted by the workflow-id namespace fallback
    LegacyAccept,
    /// Carries no scoping information; passed through
    Unscoped,
    /// Belongs to another project
    Reject(ScopeRejection),
}

impl ScopeDecision {
    /// Whether the envelope should reach its handler
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        !matches!(self, Self::Reject(_))
    }

    /// Whether the decision came from the deprecated fallback
    #[must_use]
    pub fn is_legacy(&self) -> bool {
        matches!(
            self,
            Self::LegacyAccept | Self::Reject(ScopeRejection::ForeignWorkflowNamespace)
        )
    }
}

/// Filter holding the project currently in focus.
#[derive(Debug, Clone, Default)]
pub struct ProjectScope {
    current_project_id: Option<String>,
}

impl ProjectScope {
    /// Create a filter with no project in focus
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Project currently in focus
    #[must_use]
    pub fn current(&self) -> Option<&str> {
        self.current_project_id.as_deref()
    }

    /// Change the project in focus. Returns whether it actually changed.
    pub fn set_current_project(&mut self, project_id: Option<String>) -> bool {
        let project_id = project_id.filter(|p| !p.is_empty());
        if self.current_project_id == project_id {
            return false;
        }
        self.current_project_id = project_id;
        true
    }

    /// Check an envelope against the project in focus.
    ///
    /// Without a `project_id`, both the envelope's workflow and the one named
    /// in its payload must pass the namespace check.
    #[must_use]
    pub fn check(&self, envelope: &Envelope) -> ScopeDecision {
        let project_id = envelope.project_id.as_deref();
        let outer = self.check_ids(project_id, envelope.workflow_id.as_deref());
        if project_id.is_some() {
            return outer;
        }

        let inner = match envelope.body.workflow_id() {
            Some(workflow_id) if envelope.workflow_id.as_deref() != Some(workflow_id) => {
                self.check_ids(None, Some(workflow_id))
            }
            _ => return outer,
        };
        match (outer, inner) {
            (ScopeDecision::Reject(rejection), _) | (_, ScopeDecision::Reject(rejection)) => {
                ScopeDecision::Reject(rejection)
            }
            (ScopeDecision::Unscoped, decision) => decision,
            (decision, _) => decision,
        }
    }

    /// Check raw scoping fields against the project in focus
    #[must_use]
    pub fn check_ids(&self, project_id: Option<&str>, workflow_id: Option<&str>) -> ScopeDecision {
        if let Some(project_id) = project_id {
            return match self.current() {
                Some(current) if current != project_id => {
                    ScopeDecision::Reject(ScopeRejection::ForeignProject)
                }
                _ => ScopeDecision::Accept,
            };
        }

        match (self.current(), workflow_id) {
            (Some(current), Some(workflow_id))
                if workflow_id.starts_with(WORKFLOW_NAMESPACE_PREFIX) =>
            {
                if workflow_id.contains(&namespace_for(current)) {
                    ScopeDecision::LegacyAccept
                } else {
                    ScopeDecision::Reject(ScopeRejection::ForeignWorkflowNamespace)
                }
            }
            _ => ScopeDecision::Unscoped,
        }
    }
}

/// Workflow-id namespace marker for a project, e.g. `project_42_`
#[must_use]
pub fn namespace_for(project_id: &str) -> String {
    format!("{}{}_", WORKFLOW_NAMESPACE_PREFIX, project_id)
}

#[cfg(test)]
mod tests;
