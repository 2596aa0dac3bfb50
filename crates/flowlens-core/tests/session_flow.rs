//! End-to-end flows through a running session

use flowlens_core::{
    ChatPhase, CoreConfig, Envelope, EnvelopeBody, MockChatBackend, ProgressDelta, Session,
    SessionHandle, StateChange, Step, StepKind, Termination,
};
use std::sync::Arc;

fn spawn() -> SessionHandle {
    Session::spawn(CoreConfig::default(), Arc::new(MockChatBackend::new()))
}

#[tokio::test]
async fn test_redelivered_step_updates_in_place() {
    let handle = spawn();

    let frames = [
        r#"{"kind":"workflow_step","workflow_id":"w1","step":{"id":"s1","workflow_id":"w1","step_number":1,"type":"agent_start","title":"Plan","description":"first"}}"#,
        r#"{"kind":"workflow_step","workflow_id":"w1","step":{"id":"s2","workflow_id":"w1","step_number":2,"type":"tool_call","title":"Search"}}"#,
        r#"{"kind":"workflow_step","workflow_id":"w1","step":{"id":"s1","workflow_id":"w1","step_number":1,"type":"agent_start","title":"Plan","description":"revised"}}"#,
    ];
    for frame in frames {
        handle.ingest_text(frame).await.unwrap();
    }
    handle.flush().await.unwrap();

    let snapshot = handle.snapshot();
    let group = &snapshot.groups[0];
    assert_eq!(group.workflow_id, "w1");
    assert_eq!(group.step_ids(), vec!["s1", "s2"]);
    assert_eq!(group.steps[0].description, "revised");
    assert_eq!(snapshot.steps.len(), 2);
}

#[tokio::test]
async fn test_workflow_lifecycle() {
    let handle = spawn();
    let mut changes = handle.subscribe();
    handle.switch_workflow(Some("w1".to_string())).await.unwrap();

    let step = |id: &str, n: u32, kind: StepKind| {
        Envelope::step(Step::new(id, kind).with_workflow("w1").with_number(n))
    };
    handle.dispatch(step("s3", 3, StepKind::Synthesis)).await.unwrap();
    handle.dispatch(step("s1", 1, StepKind::AgentStart)).await.unwrap();
    handle
        .dispatch(Envelope::new(EnvelopeBody::ProgressUpdate(ProgressDelta {
            progress: Some(60.0),
            current_step: Some(3),
            total_steps: Some(4),
        })))
        .await
        .unwrap();
    handle.dispatch(step("s2", 2, StepKind::ToolCall)).await.unwrap();
    handle
        .dispatch(Envelope::new(EnvelopeBody::WorkflowCompleted).with_workflow("w1"))
        .await
        .unwrap();
    // late redelivery after completion
    handle.dispatch(step("s2", 2, StepKind::ToolCall)).await.unwrap();
    handle.flush().await.unwrap();

    let snapshot = handle.snapshot();
    let group = &snapshot.groups[0];
    assert_eq!(group.step_ids(), vec!["s1", "s2", "s3"]);
    assert!(!group.is_active);
    assert_eq!(group.termination, Some(Termination::Completed));
    assert_eq!(group.progress, 100.0);
    assert_eq!(snapshot.progress.total_steps, Some(4));
    assert!(!snapshot.has_active_workflow());

    let mut terminated = 0;
    while let Ok(change) = changes.try_recv() {
        if matches!(change, StateChange::WorkflowTerminated { .. }) {
            terminated += 1;
        }
    }
    assert_eq!(terminated, 1);

    handle
        .dispatch(Envelope::new(EnvelopeBody::WorkflowCleared))
        .await
        .unwrap();
    handle.flush().await.unwrap();
    let snapshot = handle.snapshot();
    assert!(snapshot.steps.is_empty());
    assert!(snapshot.groups.is_empty());
    assert_eq!(snapshot.progress.progress, 0.0);
}

#[tokio::test]
async fn test_clear_stops_chat_loading() {
    let handle = spawn();

    handle
        .ingest_text(r#"{"kind":"chat_started","workflow_id":"w1"}"#)
        .await
        .unwrap();
    handle
        .dispatch(Envelope::step(
            Step::new("s1", StepKind::AgentStart).with_workflow("w1"),
        ))
        .await
        .unwrap();
    handle.flush().await.unwrap();
    assert!(handle.snapshot().chat.is_loading);

    handle
        .dispatch(Envelope::new(EnvelopeBody::WorkflowCleared))
        .await
        .unwrap();
    handle.flush().await.unwrap();

    let snapshot = handle.snapshot();
    assert!(snapshot.steps.is_empty());
    assert!(snapshot.groups.is_empty());
    assert_eq!(snapshot.progress.progress, 0.0);
    assert!(!snapshot.chat.is_loading);
}

#[tokio::test]
async fn test_chat_round_trip_with_follow_ups() {
    let handle = spawn();
    handle.set_current_project(Some("p1".to_string())).await.unwrap();

    handle.send_message("what changed?").await.unwrap();
    handle
        .ingest_text(r#"{"kind":"chat_started","project_id":"p1","workflow_id":"w1"}"#)
        .await
        .unwrap();
    handle
        .ingest_text(
            r#"{"kind":"chat_completed","project_id":"p1","workflow_id":"w1","response":{"content":"Three files.","timestamp":"2024-05-01T10:00:00Z"}}"#,
        )
        .await
        .unwrap();
    handle
        .ingest_text(
            r#"{"kind":"follow_up_questions","project_id":"p1","follow_up_questions":["Which files?","Why?"]}"#,
        )
        .await
        .unwrap();
    // redelivered response without an id is deduplicated by fingerprint
    handle
        .ingest_text(
            r#"{"kind":"chat_completed","project_id":"p1","workflow_id":"w1","response":{"content":"Three files.","timestamp":"2024-05-01T10:00:00Z"}}"#,
        )
        .await
        .unwrap();
    handle.flush().await.unwrap();

    let snapshot = handle.snapshot();
    assert_eq!(snapshot.chat.phase, ChatPhase::Responded);
    assert_eq!(snapshot.chat.workflow_id.as_deref(), Some("w1"));
    assert_eq!(snapshot.messages.len(), 2);
    assert_eq!(snapshot.messages[1].content, "Three files.");
    assert_eq!(snapshot.follow_up_questions, vec!["Which files?", "Why?"]);
    assert_eq!(snapshot.status.errors, 0);
}

#[tokio::test]
async fn test_project_switch_isolates_views() {
    let handle = spawn();
    handle.set_current_project(Some("A".to_string())).await.unwrap();
    handle
        .dispatch(
            Envelope::step(Step::new("a1", StepKind::AgentStart).with_workflow("wa"))
                .with_project("A"),
        )
        .await
        .unwrap();

    handle.set_current_project(Some("B".to_string())).await.unwrap();
    // traffic still in flight for A
    handle
        .dispatch(
            Envelope::step(Step::new("a2", StepKind::ToolCall).with_workflow("wa"))
                .with_project("A"),
        )
        .await
        .unwrap();
    handle
        .dispatch(
            Envelope::step(Step::new("b1", StepKind::AgentStart).with_workflow("wb"))
                .with_project("B"),
        )
        .await
        .unwrap();
    handle.flush().await.unwrap();

    let snapshot = handle.snapshot();
    let ids: Vec<&str> = snapshot.steps.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["b1"]);
    assert_eq!(snapshot.status.scope_dropped, 1);
}

#[tokio::test]
async fn test_foreign_payload_workflow_is_dropped() {
    let handle = spawn();
    handle.set_current_project(Some("A".to_string())).await.unwrap();

    handle
        .ingest_text(r#"{"kind":"workflow_step","step":{"id":"sB","workflow_id":"project_B_w9","step_number":1,"type":"tool_call"}}"#)
        .await
        .unwrap();
    handle
        .ingest_text(r#"{"kind":"chat_completed","response":{"id":"rB","workflow_id":"project_B_w9","content":"not yours"}}"#)
        .await
        .unwrap();
    handle
        .ingest_text(r#"{"kind":"workflow_step","step":{"id":"sA","workflow_id":"project_A_w1","step_number":1,"type":"agent_start"}}"#)
        .await
        .unwrap();
    handle.flush().await.unwrap();

    let snapshot = handle.snapshot();
    let ids: Vec<&str> = snapshot.steps.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["sA"]);
    assert_eq!(snapshot.groups.len(), 1);
    assert_eq!(snapshot.groups[0].workflow_id, "project_A_w1");
    assert!(snapshot.messages.is_empty());
    assert_eq!(snapshot.status.scope_dropped, 2);
    assert_eq!(snapshot.status.legacy_scope_matches, 3);
}

#[tokio::test]
async fn test_unsubscribed_receivers_do_not_block() {
    let handle = Session::spawn(
        CoreConfig::default().with_bus_capacity(2),
        Arc::new(MockChatBackend::new()),
    );
    let lagging = handle.subscribe();

    for i in 0..10 {
        handle
            .dispatch(Envelope::step(
                Step::new(format!("s{}", i), StepKind::ToolCall).with_workflow("w1"),
            ))
            .await
            .unwrap();
    }
    drop(lagging);
    handle.flush().await.unwrap();

    assert_eq!(handle.snapshot().steps.len(), 10);
}

#[tokio::test]
async fn test_prometheus_export_reflects_traffic() {
    let handle = spawn();
    handle.ingest_text(r#"{"kind":"pong"}"#).await.unwrap();
    handle.ingest_text("garbage").await.unwrap();
    handle.flush().await.unwrap();

    let text = handle.export_prometheus();
    assert!(text.contains("flowlens_messages_total 2"));
    assert!(text.contains("flowlens_malformed_total 1"));
}
