use super::*;
use crate::chat::{ChatPhase, MessageRole};
use crate::envelope::StepKind;

fn workspace() -> Workspace {
    Workspace::new(&CoreConfig::default(), StatusMetrics::new())
}

fn step(id: &str) -> Step {
    Step::new(id, StepKind::ToolCall).with_workflow("w1")
}

#[test]
fn test_project_switch_drops_scoped_state() {
    let mut ws = workspace();
    ws.set_current_project(Some("A".to_string()));
    ws.switch_workflow(Some("w1".to_string()));
    ws.apply_step(step("s1"), None, Utc::now()).unwrap();
    ws.apply_chat_response(&ChatResponse::new("hi").with_id("r1"), Some("w1"));
    ws.set_follow_ups(vec!["why?".to_string()]);
    ws.take_changes();

    assert!(ws.set_current_project(Some("B".to_string())));

    let snapshot = ws.snapshot(1);
    assert_eq!(snapshot.project_id.as_deref(), Some("B"));
    assert_eq!(snapshot.active_workflow_id, None);
    assert!(snapshot.steps.is_empty());
    assert!(snapshot.groups.is_empty());
    assert!(snapshot.messages.is_empty());
    assert!(snapshot.follow_up_questions.is_empty());
    assert_eq!(snapshot.chat.processed_responses, 0);

    let changes = ws.take_changes();
    assert!(changes.contains(&StateChange::ProjectChanged {
        project_id: Some("B".to_string())
    }));
    assert!(changes.contains(&StateChange::WorkflowsCleared));
}

#[test]
fn test_same_project_is_not_a_switch() {
    let mut ws = workspace();
    ws.set_current_project(Some("A".to_string()));
    ws.apply_step(step("s1"), None, Utc::now()).unwrap();
    ws.take_changes();

    assert!(!ws.set_current_project(Some("A".to_string())));
    assert_eq!(ws.aggregator().steps().len(), 1);
    assert!(ws.take_changes().is_empty());
}

#[test]
fn test_chat_response_appends_one_message() {
    let mut ws = workspace();
    ws.start_chat(Some("w1".to_string())).unwrap();

    let response = ChatResponse::new("answer").with_id("r1");
    ws.apply_chat_response(&response, Some("w1"));
    ws.apply_chat_response(&response, Some("w1"));

    assert_eq!(ws.log().len(), 1);
    let message = ws.log().iter().next().unwrap();
    assert_eq!(message.role, MessageRole::Assistant);
    assert_eq!(message.workflow_id.as_deref(), Some("w1"));
    assert_eq!(ws.chat().exchange().processed_responses, 1);
    assert_eq!(ws.chat().phase(), ChatPhase::Responded);
}

#[test]
fn test_step_falls_back_to_envelope_workflow() {
    let mut ws = workspace();
    ws.apply_step(Step::new("s1", StepKind::AgentStart), Some("w5"), Utc::now())
        .unwrap();

    let changes = ws.take_changes();
    assert_eq!(
        changes,
        vec![StateChange::StepUpserted {
            workflow_id: "w5".to_string(),
            step_id: "s1".to_string(),
            inserted: true,
        }]
    );
}

#[test]
fn test_cancel_stops_loading_and_keeps_steps() {
    let mut ws = workspace();
    ws.switch_workflow(Some("w1".to_string()));
    ws.apply_step(step("s1"), None, Utc::now()).unwrap();
    ws.start_chat(Some("w1".to_string())).unwrap();

    let cancelled = ws.terminate(None, Termination::Cancelled, Utc::now());
    assert_eq!(cancelled.as_deref(), Some("w1"));

    let snapshot = ws.snapshot(0);
    assert!(!snapshot.chat.is_loading);
    assert!(!snapshot.groups[0].is_active);
    assert_eq!(snapshot.steps.len(), 1);
}

#[test]
fn test_terminate_without_workflow_is_ignored() {
    let mut ws = workspace();
    assert_eq!(ws.terminate(None, Termination::Completed, Utc::now()), None);
    assert!(ws.take_changes().is_empty());
}

#[test]
fn test_chat_and_server_errors_are_counted() {
    let mut ws = workspace();
    ws.start_chat(None).unwrap();
    ws.apply_chat_error("timeout");
    ws.server_error("overloaded");

    let snapshot = ws.snapshot(0);
    assert_eq!(snapshot.chat.phase, ChatPhase::Errored);
    assert_eq!(snapshot.chat.error.as_deref(), Some("timeout"));
    assert_eq!(snapshot.last_server_error.as_deref(), Some("overloaded"));
    assert_eq!(snapshot.status.errors, 2);
}

#[test]
fn test_connection_change_recorded_on_state_change_only() {
    let mut ws = workspace();
    ws.apply_connection_event(&ConnectionEvent::Connected);
    ws.apply_connection_event(&ConnectionEvent::Alive { at: Utc::now() });

    assert_eq!(
        ws.take_changes(),
        vec![StateChange::ConnectionChanged {
            state: crate::connection::ConnectionState::Connected
        }]
    );
    assert!(ws.connection().last_ping.is_some());
}
