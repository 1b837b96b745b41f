use groupchat::termination::{
    AndTermination, MaxMessagesTermination, OrTermination, StopSignal, TerminationCondition,
    TextMentionTermination,
};
use groupchat::{ChatMessage, History, MessageDraft};

/// Feed `texts` one message at a time, like the team does, and return the first signal.
fn first_signal(condition: &mut dyn TerminationCondition, texts: &[&str]) -> Option<(usize, StopSignal)> {
    let mut history = History::new();
    for (index, text) in texts.iter().enumerate() {
        let draft = if index == 0 {
            MessageDraft::task(*text)
        } else {
            MessageDraft::text("agent", *text)
        };
        history.append(draft).unwrap();
        if let Some(signal) = condition.evaluate(history.snapshot()) {
            return Some((index + 1, signal));
        }
    }
    None
}

fn messages(texts: &[&str]) -> Vec<ChatMessage> {
    let mut history = History::new();
    for text in texts {
        history.append(MessageDraft::text("agent", *text)).unwrap();
    }
    history.snapshot().to_vec()
}

#[test]
fn test_text_mention_checks_only_the_last_message() {
    let mut stop = TextMentionTermination::new("TERMINATE");
    assert!(stop.evaluate(&messages(&["TERMINATE", "carry on"])).is_none());
    assert!(stop.evaluate(&messages(&["terminate"])).is_none());

    let signal = stop.evaluate(&messages(&["Done. TERMINATE"])).unwrap();
    assert_eq!(signal.condition, "TextMentionTermination");
    assert_eq!(signal.reason, "Text 'TERMINATE' mentioned by agent");
}

#[test]
fn test_max_messages_counts_every_message() {
    let mut stop = MaxMessagesTermination::new(1);
    assert_eq!(first_signal(&mut stop, &["task", "reply"]).unwrap().0, 1);

    let mut stop = MaxMessagesTermination::new(3);
    let (at, signal) = first_signal(&mut stop, &["task", "a", "b", "c"]).unwrap();
    assert_eq!(at, 3);
    assert_eq!(
        signal.reason,
        "Maximum number of messages 3 reached, current message count: 3"
    );
}

#[test]
fn test_or_reports_the_child_that_fired() {
    let mut stop = TextMentionTermination::new("TERMINATE").or(MaxMessagesTermination::new(5));
    let (at, signal) = first_signal(&mut stop, &["task", "a", "TERMINATE", "b", "c"]).unwrap();
    assert_eq!(at, 3);
    assert_eq!(signal.condition, "TextMentionTermination");
    assert_eq!(stop.fired_index(), Some(0));

    stop.reset();
    assert_eq!(stop.fired_index(), None);
    let (at, signal) = first_signal(&mut stop, &["task", "a", "b", "c", "d", "TERMINATE"]).unwrap();
    assert_eq!(at, 5);
    assert_eq!(signal.condition, "MaxMessagesTermination");
    assert_eq!(stop.fired_index(), Some(1));
}

#[test]
fn test_or_tie_break_follows_insertion_order() {
    let texts = ["task", "a", "b", "c", "TERMINATE"];

    let mut mention_first = TextMentionTermination::new("TERMINATE").or(MaxMessagesTermination::new(5));
    assert_eq!(
        first_signal(&mut mention_first, &texts).unwrap().1.condition,
        "TextMentionTermination"
    );

    let mut max_first = MaxMessagesTermination::new(5).or(TextMentionTermination::new("TERMINATE"));
    assert_eq!(
        first_signal(&mut max_first, &texts).unwrap().1.condition,
        "MaxMessagesTermination"
    );
}

#[test]
fn test_or_chains_with_push() {
    let mut stop = OrTermination::new(vec![Box::new(TextMentionTermination::new("APPROVE"))])
        .push(TextMentionTermination::new("TERMINATE"))
        .push(MaxMessagesTermination::new(10));
    assert_eq!(
        stop.name(),
        "TextMentionTermination | TextMentionTermination | MaxMessagesTermination"
    );
    first_signal(&mut stop, &["task", "TERMINATE"]).unwrap();
    assert_eq!(stop.fired_index(), Some(1));
}

#[test]
fn test_and_waits_for_every_child() {
    let mut stop = TextMentionTermination::new("TERMINATE").and(MaxMessagesTermination::new(4));
    let (at, signal) = first_signal(&mut stop, &["task", "TERMINATE", "a", "b"]).unwrap();
    assert_eq!(at, 4);
    assert_eq!(signal.condition, "TextMentionTermination & MaxMessagesTermination");

    let mut empty = AndTermination::new(vec![]);
    assert!(first_signal(&mut empty, &["task"]).is_none());
}
