//! Append-only conversation log.
//!
//! [`History`] is owned by exactly one [`Team`](crate::Team); selectors and agents only ever
//! see it as a `&[ChatMessage]` snapshot. Sequence numbers start at 1 and have no gaps.

use crate::groupchat::error::{CapKind, TeamError};
use crate::groupchat::message::{ChatMessage, MessageDraft};
use std::error::Error;
use std::fmt;

/// Errors raised by [`History`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryError {
    /// Appending `attempted` more messages would exceed the configured cap.
    CapacityExceeded { limit: usize, attempted: usize },
}

impl fmt::Display for HistoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HistoryError::CapacityExceeded { limit, attempted } => write!(
                f,
                "History capacity of {} messages exceeded while appending {} message(s)",
                limit, attempted
            ),
        }
    }
}

impl Error for HistoryError {}

impl From<HistoryError> for TeamError {
    fn from(err: HistoryError) -> Self {
        match err {
            HistoryError::CapacityExceeded { limit, .. } => TeamError::CapacityExceeded {
                cap: CapKind::Messages,
                limit,
            },
        }
    }
}

/// Ordered, append-only sequence of [`ChatMessage`]s.
///
/// # Example
///
/// ```rust
/// use groupchat::{History, MessageDraft};
///
/// let mut history = History::with_capacity_limit(2);
/// assert_eq!(history.append(MessageDraft::task("hi")).unwrap(), 1);
/// assert_eq!(history.append(MessageDraft::text("bot", "hello")).unwrap(), 2);
/// assert!(history.append(MessageDraft::text("bot", "again")).is_err());
/// assert_eq!(history.len(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct History {
    messages: Vec<ChatMessage>,
    capacity: Option<usize>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity_limit(limit: usize) -> Self {
        Self {
            messages: Vec::new(),
            capacity: Some(limit),
        }
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Append one message and return its sequence number.
    pub fn append(&mut self, draft: MessageDraft) -> Result<u64, HistoryError> {
        self.ensure_room(1)?;
        Ok(self.push(draft))
    }

    /// Append a whole turn. Either every draft is appended or none is.
    ///
    /// Returns the newly appended messages.
    pub fn append_turn(&mut self, drafts: Vec<MessageDraft>) -> Result<&[ChatMessage], HistoryError> {
        self.ensure_room(drafts.len())?;
        let start = self.messages.len();
        for draft in drafts {
            self.push(draft);
        }
        Ok(&self.messages[start..])
    }

    /// Immutable view of every appended message in order.
    pub fn snapshot(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    /// `sender: text` lines, one per message.
    pub fn render_transcript(&self) -> String {
        render_transcript(&self.messages)
    }

    /// One JSON object per line, in append order.
    pub fn to_json_lines(&self) -> Result<String, serde_json::Error> {
        let mut out = String::new();
        for message in &self.messages {
            out.push_str(&serde_json::to_string(message)?);
            out.push('\n');
        }
        Ok(out)
    }

    fn ensure_room(&self, incoming: usize) -> Result<(), HistoryError> {
        match self.capacity {
            Some(limit) if self.messages.len() + incoming > limit => {
                Err(HistoryError::CapacityExceeded {
                    limit,
                    attempted: incoming,
                })
            }
            _ => Ok(()),
        }
    }

    fn push(&mut self, draft: MessageDraft) -> u64 {
        let sequence_number = self.messages.len() as u64 + 1;
        self.messages.push(ChatMessage {
            sequence_number,
            sender: draft.sender,
            content: draft.content,
        });
        sequence_number
    }
}

/// Render a message slice the way selector prompts expect it.
pub fn render_transcript(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", m.sender, m.text()))
        .collect::<Vec<_>>()
        .join("\n")
}
