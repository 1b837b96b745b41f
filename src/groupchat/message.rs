//! Conversation messages.
//!
//! A [`MessageDraft`] is what agents and the team produce; it becomes an immutable
//! [`ChatMessage`] once [`History`](crate::History) assigns it a sequence number. Messages
//! carry no wall-clock data so a replayed run serializes byte-for-byte identically.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Who produced a message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "role", content = "name", rename_all = "snake_case")]
pub enum Sender {
    /// The host that submitted the task.
    User,
    /// A named team participant.
    Agent(String),
    /// A tool invoked on behalf of an agent.
    Tool,
}

impl Sender {
    pub fn agent(name: impl Into<String>) -> Self {
        Sender::Agent(name.into())
    }

    /// The display name: `user`, `tool`, or the agent's name.
    pub fn as_str(&self) -> &str {
        match self {
            Sender::User => "user",
            Sender::Agent(name) => name,
            Sender::Tool => "tool",
        }
    }

    pub fn is_agent(&self, name: &str) -> bool {
        matches!(self, Sender::Agent(n) if n == name)
    }
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The three message kinds that can appear in a History.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    ToolCall,
    ToolResult,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::Text => write!(f, "TextMessage"),
            MessageKind::ToolCall => write!(f, "ToolCallRequestEvent"),
            MessageKind::ToolResult => write!(f, "ToolCallExecutionEvent"),
        }
    }
}

/// A tool invocation requested by an agent's reasoning backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Correlates the request with its [`ToolCallOutcome`].
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

impl ToolCallRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// The outcome of one tool invocation, successful or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallOutcome {
    pub call_id: String,
    pub name: String,
    /// Tool output on success, the error description otherwise.
    pub content: String,
    pub is_error: bool,
}

/// Typed message payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum MessageContent {
    Text(String),
    ToolCall(ToolCallRequest),
    ToolResult(ToolCallOutcome),
}

impl MessageContent {
    pub fn kind(&self) -> MessageKind {
        match self {
            MessageContent::Text(_) => MessageKind::Text,
            MessageContent::ToolCall(_) => MessageKind::ToolCall,
            MessageContent::ToolResult(_) => MessageKind::ToolResult,
        }
    }

    /// Plain-text rendering used by termination conditions, prompts and the console.
    pub fn render(&self) -> String {
        match self {
            MessageContent::Text(text) => text.clone(),
            MessageContent::ToolCall(call) => format!("{}({})", call.name, call.arguments),
            MessageContent::ToolResult(outcome) if outcome.is_error => {
                format!("Error: {}", outcome.content)
            }
            MessageContent::ToolResult(outcome) => outcome.content.clone(),
        }
    }
}

/// A message that has not been appended yet.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageDraft {
    pub sender: Sender,
    pub content: MessageContent,
}

impl MessageDraft {
    pub fn new(sender: Sender, content: MessageContent) -> Self {
        Self { sender, content }
    }

    /// The task message that opens every run.
    pub fn task(text: impl Into<String>) -> Self {
        Self::new(Sender::User, MessageContent::Text(text.into()))
    }

    pub fn text(agent: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(Sender::agent(agent), MessageContent::Text(text.into()))
    }

    pub fn tool_call(agent: impl Into<String>, call: ToolCallRequest) -> Self {
        Self::new(Sender::agent(agent), MessageContent::ToolCall(call))
    }

    pub fn tool_result(outcome: ToolCallOutcome) -> Self {
        Self::new(Sender::Tool, MessageContent::ToolResult(outcome))
    }

    pub fn kind(&self) -> MessageKind {
        self.content.kind()
    }
}

/// An appended, immutable message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub sequence_number: u64,
    pub sender: Sender,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn kind(&self) -> MessageKind {
        self.content.kind()
    }

    pub fn text(&self) -> String {
        self.content.render()
    }
}
