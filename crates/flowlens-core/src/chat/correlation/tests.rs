use super::*;
use chrono::{TimeZone, Utc};

fn response(content: &str) -> ChatResponse {
    ChatResponse::new(content).with_workflow("w1")
}

#[test]
fn test_full_cycle() {
    let mut chat = ChatCorrelation::default();
    assert_eq!(chat.phase(), ChatPhase::Idle);

    chat.start(Some("w1".to_string())).unwrap();
    assert!(chat.is_loading());

    assert!(chat.apply_response(&response("hello").with_id("r1"), None));
    assert_eq!(chat.phase(), ChatPhase::Responded);
    assert!(!chat.is_loading());

    chat.reset();
    assert_eq!(chat.phase(), ChatPhase::Idle);
    assert!(chat.is_processed("r1"));
}

#[test]
fn test_duplicate_response_applied_once() {
    let mut chat = ChatCorrelation::default();
    chat.start(Some("w1".to_string())).unwrap();

    let r = response("answer").with_id("r1");
    assert!(chat.apply_response(&r, None));
    assert!(!chat.apply_response(&r, None));
    assert_eq!(chat.exchange().processed_responses, 1);
}

#[test]
fn test_fingerprint_dedup_without_id() {
    let mut chat = ChatCorrelation::default();
    let mut r = response("same text");
    r.timestamp = Some(Utc.timestamp_opt(1_700_000_000, 0).unwrap());

    assert!(chat.apply_response(&r, None));
    assert!(!chat.apply_response(&r, None));

    let mut other = r.clone();
    other.content = "different text".to_string();
    assert!(chat.apply_response(&other, None));
    assert_eq!(chat.exchange().processed_responses, 2);
}

#[test]
fn test_fingerprint_only_reads_prefix() {
    let chat = ChatCorrelation::new(4);
    let a = response("abcd-first");
    let b = response("abcd-second");
    assert_eq!(chat.response_id(&a, None), chat.response_id(&b, None));
    assert_ne!(chat.response_id(&a, None), chat.response_id(&a, Some("w2")));
    assert!(chat.response_id(&a, None).starts_with("fp:"));
}

#[test]
fn test_concurrent_start_is_refused() {
    let mut chat = ChatCorrelation::default();
    chat.start(Some("w1".to_string())).unwrap();

    let err = chat.start(Some("w2".to_string())).unwrap_err();
    assert!(matches!(
        err,
        Error::ConcurrentChat { ref active, ref requested }
            if active.as_deref() == Some("w1") && requested.as_deref() == Some("w2")
    ));
    assert_eq!(chat.workflow_id(), Some("w1"));
}

#[test]
fn test_start_after_response_resets() {
    let mut chat = ChatCorrelation::default();
    chat.start(Some("w1".to_string())).unwrap();
    chat.apply_error("boom");
    assert_eq!(chat.phase(), ChatPhase::Errored);

    chat.start(Some("w1".to_string())).unwrap();
    let exchange = chat.exchange();
    assert_eq!(exchange.phase, ChatPhase::Loading);
    assert_eq!(exchange.error, None);
}

#[test]
fn test_response_for_other_workflow_ignored_while_loading() {
    let mut chat = ChatCorrelation::default();
    chat.start(Some("w1".to_string())).unwrap();

    let stray = ChatResponse::new("late").with_id("r9").with_workflow("w0");
    assert!(!chat.apply_response(&stray, None));
    assert!(chat.is_loading());
    assert!(!chat.is_processed("r9"));

    // envelope workflow used when the response names none
    let own = ChatResponse::new("mine").with_id("r1");
    assert!(chat.apply_response(&own, Some("w1")));
}

#[test]
fn test_acknowledge() {
    let mut chat = ChatCorrelation::default();
    assert!(chat.acknowledge(Some("w1".to_string())).unwrap());
    assert!(!chat.acknowledge(Some("w1".to_string())).unwrap());
    assert!(!chat.acknowledge(None).unwrap());
    assert!(chat.acknowledge(Some("w2".to_string())).is_err());
}

#[test]
fn test_cancel_keeps_last_response() {
    let mut chat = ChatCorrelation::default();
    assert!(!chat.cancel());

    chat.start(Some("w1".to_string())).unwrap();
    assert!(chat.cancel());
    assert_eq!(chat.phase(), ChatPhase::Idle);

    chat.start(Some("w1".to_string())).unwrap();
    chat.apply_response(&response("kept").with_id("r1"), None);
    chat.start(Some("w1".to_string())).unwrap();
    // implicit reset dropped it
    assert!(chat.exchange().last_response.is_none());
}

#[test]
fn test_reset_scope_forgets_processed_ids() {
    let mut chat = ChatCorrelation::default();
    chat.apply_response(&response("x").with_id("r1"), None);
    chat.reset();
    assert!(chat.is_processed("r1"));

    chat.reset_scope();
    assert!(!chat.is_processed("r1"));
    assert_eq!(chat.exchange(), ChatExchange::default());
}
