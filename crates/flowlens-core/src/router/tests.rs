use super::*;
use crate::config::CoreConfig;
use crate::envelope::{EnvelopeBody, Step, StepKind};
use crate::metrics::StatusMetrics;

fn workspace() -> Workspace {
    Workspace::new(&CoreConfig::default(), StatusMetrics::new())
}

fn step_envelope(id: &str, number: u32) -> Envelope {
    Envelope::step(
        Step::new(id, StepKind::AgentExecution)
            .with_workflow("w1")
            .with_number(number),
    )
}

#[test]
fn test_builtin_routes_cover_every_kind() {
    let router = Router::new();
    for kind in EnvelopeKind::ALL {
        assert!(router.is_routable(kind), "{} has no route", kind);
        assert!(matches!(router.route(kind), Some(Route::Builtin)));
    }
}

#[test]
fn test_dispatch_applies_step() {
    let router = Router::new();
    let mut ws = workspace();

    let outcome = router.dispatch(&mut ws, &step_envelope("s1", 1));
    assert!(matches!(outcome, DispatchOutcome::Applied));
    assert_eq!(ws.aggregator().steps().len(), 1);
    assert_eq!(ws.metrics().messages.get(), 1);
    assert_eq!(ws.metrics().handler_latency.count(), 1);
}

#[test]
fn test_unregistered_kind_is_unroutable() {
    let mut router = Router::new();
    let mut ws = workspace();

    assert!(router.unregister(EnvelopeKind::WorkflowStep));
    let outcome = router.dispatch(&mut ws, &step_envelope("s1", 1));
    assert!(matches!(outcome, DispatchOutcome::Unroutable));
    assert!(ws.aggregator().steps().is_empty());
    assert_eq!(ws.metrics().unroutable.get(), 1);

    router.restore_default(EnvelopeKind::WorkflowStep);
    let outcome = router.dispatch(&mut ws, &step_envelope("s1", 1));
    assert!(matches!(outcome, DispatchOutcome::Applied));
}

#[test]
fn test_custom_handler_overrides_builtin() {
    let mut router = Router::new();
    let mut ws = workspace();

    router.register(
        EnvelopeKind::Heartbeat,
        Arc::new(|ws: &mut Workspace, _env: &Envelope| -> Result<()> {
            ws.server_error("custom");
            Ok(())
        }),
    );
    router.dispatch(&mut ws, &Envelope::new(EnvelopeBody::Heartbeat));

    assert_eq!(ws.snapshot(0).last_server_error.as_deref(), Some("custom"));
}

#[test]
fn test_failing_handler_is_contained() {
    let mut router = Router::new();
    let mut ws = workspace();

    router.register(
        EnvelopeKind::Pong,
        Arc::new(|_ws: &mut Workspace, _env: &Envelope| -> Result<()> {
            Err(Error::Backend("nope".to_string()))
        }),
    );
    router.register(
        EnvelopeKind::Heartbeat,
        Arc::new(|_ws: &mut Workspace, _env: &Envelope| -> Result<()> {
            panic!("handler exploded")
        }),
    );

    let failed = router.dispatch(&mut ws, &Envelope::new(EnvelopeBody::Pong));
    assert!(matches!(failed, DispatchOutcome::Failed(Error::Backend(_))));

    let panicked = router.dispatch(&mut ws, &Envelope::new(EnvelopeBody::Heartbeat));
    match panicked {
        DispatchOutcome::Failed(Error::Handler { kind, message }) => {
            assert_eq!(kind, EnvelopeKind::Heartbeat);
            assert_eq!(message, "handler exploded");
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(ws.metrics().errors.get(), 2);

    // later envelopes still flow
    let outcome = router.dispatch(&mut ws, &step_envelope("s1", 1));
    assert!(matches!(outcome, DispatchOutcome::Applied));
}

#[test]
fn test_out_of_scope_envelope_is_dropped_silently() {
    let router = Router::new();
    let mut ws = workspace();
    ws.set_current_project(Some("A".to_string()));

    let outcome = router.dispatch(&mut ws, &step_envelope("s1", 1).with_project("B"));
    assert!(matches!(
        outcome,
        DispatchOutcome::OutOfScope(ScopeRejection::ForeignProject)
    ));
    assert!(ws.aggregator().steps().is_empty());
    assert_eq!(ws.metrics().scope_dropped.get(), 1);
    assert_eq!(ws.metrics().errors.get(), 0);
}

#[test]
fn test_legacy_scope_decisions_are_counted() {
    let router = Router::new();
    let mut ws = workspace();
    ws.set_current_project(Some("42".to_string()));

    let own = Envelope::step(Step::new("s1", StepKind::ToolCall).with_workflow("project_42_a"));
    let foreign = Envelope::step(Step::new("s2", StepKind::ToolCall).with_workflow("project_7_a"));

    assert!(matches!(router.dispatch(&mut ws, &own), DispatchOutcome::Applied));
    assert!(matches!(
        router.dispatch(&mut ws, &foreign),
        DispatchOutcome::OutOfScope(ScopeRejection::ForeignWorkflowNamespace)
    ));
    assert_eq!(ws.metrics().legacy_scope_matches.get(), 2);
    assert_eq!(ws.metrics().scope_dropped.get(), 1);
}

#[test]
fn test_dispatch_text_classifies_bad_frames() {
    let router = Router::new();
    let mut ws = workspace();

    let unknown = router.dispatch_text(&mut ws, r#"{"kind":"telemetry"}"#);
    assert!(matches!(unknown, DispatchOutcome::Unroutable));

    let garbage = router.dispatch_text(&mut ws, "not json");
    assert!(matches!(garbage, DispatchOutcome::Malformed(_)));

    let missing = router.dispatch_text(&mut ws, r#"{"kind":"workflow_step"}"#);
    assert!(matches!(
        missing,
        DispatchOutcome::Malformed(Error::MissingField { .. })
    ));

    assert_eq!(ws.metrics().unroutable.get(), 1);
    assert_eq!(ws.metrics().malformed.get(), 2);
    assert_eq!(ws.metrics().messages.get(), 3);
}

#[test]
fn test_unattributed_step_counts_as_handler_error() {
    let router = Router::new();
    let mut ws = workspace();

    let orphan = Envelope::step(Step::new("s1", StepKind::ToolCall));
    let outcome = router.dispatch(&mut ws, &orphan);
    assert!(matches!(
        outcome,
        DispatchOutcome::Failed(Error::UnattributedStep { .. })
    ));
    assert_eq!(ws.metrics().errors.get(), 1);
}
