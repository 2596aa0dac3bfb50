use super::*;

#[test]
fn test_capacity_evicts_oldest() {
    let mut log = ChatLog::with_capacity(2);
    log.push(ChatMessage::user("one"));
    log.push(ChatMessage::user("two"));
    log.push(ChatMessage::user("three"));

    let contents: Vec<&str> = log.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["two", "three"]);
}

#[test]
fn test_set_status() {
    let mut log = ChatLog::default();
    let message = ChatMessage::user("hi");
    let id = message.id.clone();
    log.push(message);

    assert!(log.set_status(&id, MessageStatus::Sent));
    assert_eq!(log.get(&id).unwrap().status, MessageStatus::Sent);
    assert!(!log.set_status("missing", MessageStatus::Failed));
}

#[test]
fn test_assistant_from_response() {
    let response = ChatResponse::new("answer").with_id("r1");
    let message = ChatMessage::assistant(&response, Some("w1"));

    assert_eq!(message.id, "r1");
    assert_eq!(message.role, MessageRole::Assistant);
    assert_eq!(message.status, MessageStatus::Delivered);
    assert_eq!(message.workflow_id.as_deref(), Some("w1"));
}

#[test]
fn test_replace_history_keeps_pending() {
    let mut log = ChatLog::default();
    let mut delivered = ChatMessage::system("old");
    delivered.status = MessageStatus::Delivered;
    log.push(delivered);
    log.push(ChatMessage::user("typing"));

    log.replace_history(vec![ChatMessage::system("h1"), ChatMessage::system("h2")]);

    let contents: Vec<&str> = log.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["h1", "h2", "typing"]);
}
