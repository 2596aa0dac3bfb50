use super::*;
use crate::envelope::{ChatResponse, Envelope, EnvelopeBody, Step, StepKind};

fn focused(project: &str) -> ProjectScope {
    let mut scope = ProjectScope::new();
    scope.set_current_project(Some(project.to_string()));
    scope
}

fn heartbeat() -> Envelope {
    Envelope::new(EnvelopeBody::Heartbeat)
}

#[test]
fn test_matching_project_is_accepted() {
    let scope = focused("A");
    let decision = scope.check(&heartbeat().with_project("A"));
    assert_eq!(decision, ScopeDecision::Accept);
    assert!(!decision.is_legacy());
}

#[test]
fn test_foreign_project_is_rejected() {
    let scope = focused("A");
    let decision = scope.check(&heartbeat().with_project("B").with_workflow("project_A_1"));
    assert_eq!(decision, ScopeDecision::Reject(ScopeRejection::ForeignProject));
    assert!(!decision.is_accepted());
}

#[test]
fn test_no_focus_accepts_everything() {
    let scope = ProjectScope::new();
    assert_eq!(
        scope.check(&heartbeat().with_project("B")),
        ScopeDecision::Accept
    );
    assert_eq!(
        scope.check(&heartbeat().with_workflow("project_B_7")),
        ScopeDecision::Unscoped
    );
}

#[test]
fn test_workflow_namespace_fallback() {
    let scope = focused("42");

    let own = scope.check(&heartbeat().with_workflow("project_42_run"));
    assert_eq!(own, ScopeDecision::LegacyAccept);
    assert!(own.is_legacy());

    let foreign = scope.check(&heartbeat().with_workflow("project_7_run"));
    assert_eq!(
        foreign,
        ScopeDecision::Reject(ScopeRejection::ForeignWorkflowNamespace)
    );
    assert!(foreign.is_legacy());
}

#[test]
fn test_payload_workflow_is_checked() {
    let scope = focused("A");

    let step = Step::new("sB", StepKind::ToolCall).with_workflow("project_B_w9");
    let bare = Envelope::new(EnvelopeBody::WorkflowStep { step });
    assert_eq!(
        scope.check(&bare),
        ScopeDecision::Reject(ScopeRejection::ForeignWorkflowNamespace)
    );

    let response = ChatResponse::new("hi").with_workflow("project_B_w9");
    let completed = Envelope::new(EnvelopeBody::ChatCompleted { response });
    assert!(!scope.check(&completed).is_accepted());

    // a plain envelope workflow does not mask a foreign payload
    let step = Step::new("sB", StepKind::ToolCall).with_workflow("project_B_w9");
    let masked = Envelope::new(EnvelopeBody::WorkflowStep { step }).with_workflow("w9");
    assert!(!scope.check(&masked).is_accepted());

    let step = Step::new("sA", StepKind::ToolCall).with_workflow("project_A_w1");
    let own = Envelope::new(EnvelopeBody::WorkflowStep { step });
    assert_eq!(scope.check(&own), ScopeDecision::LegacyAccept);
}

#[test]
fn test_project_id_overrides_payload_workflow() {
    let scope = focused("A");
    let step = Step::new("s1", StepKind::ToolCall).with_workflow("project_B_w9");
    let envelope = Envelope::new(EnvelopeBody::WorkflowStep { step }).with_project("A");
    assert_eq!(scope.check(&envelope), ScopeDecision::Accept);
}

#[test]
fn test_prefix_collision_does_not_match() {
    // "project_4_" must not be satisfied by "project_42_"
    let scope = focused("4");
    assert!(!scope
        .check(&heartbeat().with_workflow("project_42_run"))
        .is_accepted());
}

#[test]
fn test_unscoped_envelopes_fail_open() {
    let scope = focused("A");
    assert_eq!(scope.check(&heartbeat()), ScopeDecision::Unscoped);
    assert_eq!(
        scope.check(&heartbeat().with_workflow("wf-123")),
        ScopeDecision::Unscoped
    );
}

#[test]
fn test_set_current_project_reports_change() {
    let mut scope = ProjectScope::new();
    assert!(scope.set_current_project(Some("A".to_string())));
    assert!(!scope.set_current_project(Some("A".to_string())));
    assert!(scope.set_current_project(Some(String::new())));
    assert_eq!(scope.current(), None);
}
