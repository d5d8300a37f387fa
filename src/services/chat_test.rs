use super::*;

fn log() -> ChatLog {
    ChatLog::new(1000)
}

#[test]
fn new_log_has_empty_history() {
    assert!(log().history().is_empty());
}

#[test]
fn append_assigns_increasing_ids() {
    let mut chat = log();
    let a = chat.append("u1", "Ada", "first", 10).expect("accepted");
    let b = chat.append("u2", "Bob", "second", 11).expect("accepted");
    assert!(b.id > a.id);
    assert_eq!(chat.history(), vec![a, b]);
}

#[test]
fn append_trims_content() {
    let mut chat = log();
    let msg = chat.append("u1", "Ada", "  hi there \n", 10).expect("accepted");
    assert_eq!(msg.content, "hi there");
}

#[test]
fn blank_content_is_dropped() {
    let mut chat = log();
    assert!(chat.append("u1", "Ada", "", 10).is_none());
    assert!(chat.append("u1", "Ada", "   \t\n", 10).is_none());
    assert!(chat.history().is_empty());
}

#[test]
fn dropped_content_does_not_consume_an_id() {
    let mut chat = log();
    let a = chat.append("u1", "Ada", "one", 10).expect("accepted");
    chat.append("u1", "Ada", " ", 11);
    let b = chat.append("u1", "Ada", "two", 12).expect("accepted");
    assert_eq!(b.id, a.id + 1);
}

#[test]
fn long_content_is_truncated_on_char_boundary() {
    let mut chat = ChatLog::new(5);
    let msg = chat.append("u1", "Ada", "héllo wörld", 10).expect("accepted");
    assert_eq!(msg.content, "héllo");

    let exact = chat.append("u1", "Ada", "abcde", 11).expect("accepted");
    assert_eq!(exact.content, "abcde");
}

#[test]
fn history_is_capped_and_evicts_oldest_first() {
    let mut chat = log();
    for i in 1..=HISTORY_CAPACITY + 1 {
        chat.append("u1", "Ada", &format!("m{i}"), 0);
    }

    let history = chat.history();
    assert_eq!(history.len(), HISTORY_CAPACITY);
    assert_eq!(history.first().map(|m| m.content.as_str()), Some("m2"));
    assert_eq!(history.last().map(|m| m.content.as_str()), Some("m101"));
    assert!(history.windows(2).all(|w| w[0].id < w[1].id));
}

#[test]
fn chat_message_serializes_camel_case() {
    let mut chat = log();
    let msg = chat.append("u1", "Ada", "hi", 10).expect("accepted");
    let json = serde_json::to_value(&msg).expect("serialize");
    assert_eq!(json["userId"], "u1");
    assert_eq!(json["displayName"], "Ada");
    assert_eq!(json["createdAt"], 10);
}
