//! Reasoning backend abstraction.
//!
//! A [`ClientWrapper`] turns a prompt (a list of role-tagged [`Message`]s) plus the tool
//! schemas the agent may call into a [`Completion`]: either final text or a batch of tool
//! calls. Backends without native function calling can still request tools by emitting the
//! `{"tool_call": {"name": "...", "parameters": {...}}}` convention in plain text; see
//! [`Completion::from_text`].

use crate::groupchat::message::ToolCallRequest;
use crate::groupchat::tool_protocol::ToolMetadata;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::sync::Mutex;

/// Prompt roles understood by chat-completion style backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One prompt entry sent to a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Token accounting reported by a backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub total_tokens: usize,
}

/// What a backend produced for one request.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    /// Final text for this turn.
    Text(String),
    /// Tools to run before asking again.
    ToolCalls(Vec<ToolCallRequest>),
}

impl Completion {
    /// Interpret plain text, detecting an embedded `{"tool_call": ...}` request.
    ///
    /// Detected calls get an empty id; the agent assigns one.
    ///
    /// ```rust
    /// use groupchat::Completion;
    ///
    /// let reply = r#"Let me check. {"tool_call": {"name": "search_web_tool", "parameters": {"query": "x"}}}"#;
    /// match Completion::from_text(reply) {
    ///     Completion::ToolCalls(calls) => assert_eq!(calls[0].name, "search_web_tool"),
    ///     Completion::Text(_) => unreachable!(),
    /// }
    /// assert_eq!(Completion::from_text("done"), Completion::Text("done".into()));
    /// ```
    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        match parse_tool_call(&text) {
            Some(call) => Completion::ToolCalls(vec![call]),
            None => Completion::Text(text),
        }
    }
}

/// Locate a `{"tool_call": {...}}` fragment and decode it.
pub fn parse_tool_call(response: &str) -> Option<ToolCallRequest> {
    let start = response.find("{\"tool_call\"")?;

    // Brace counting over the fragment to find its closing brace.
    let mut depth = 0usize;
    let mut end = None;
    for (offset, ch) in response[start..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    end = Some(start + offset + 1);
                    break;
                }
            }
            _ => {}
        }
    }

    let parsed: serde_json::Value = serde_json::from_str(&response[start..end?]).ok()?;
    let call = parsed.get("tool_call")?;
    let name = call.get("name")?.as_str()?;
    let parameters = call
        .get("parameters")
        .cloned()
        .unwrap_or_else(|| serde_json::json!({}));
    Some(ToolCallRequest::new("", name, parameters))
}

/// A reasoning backend.
#[async_trait]
pub trait ClientWrapper: Send + Sync {
    /// Send a prompt with the tools the caller may use.
    async fn send_message(
        &self,
        messages: &[Message],
        tools: &[ToolMetadata],
    ) -> Result<Completion, Box<dyn Error + Send + Sync>>;

    fn model_name(&self) -> &str;

    /// Usage of the most recent request, when the backend reports it.
    fn get_last_usage(&self) -> Option<TokenUsage> {
        self.usage_slot()
            .and_then(|slot| slot.lock().ok().and_then(|usage| *usage))
    }

    /// Storage a backend writes its last usage into.
    fn usage_slot(&self) -> Option<&Mutex<Option<TokenUsage>>> {
        None
    }
}
