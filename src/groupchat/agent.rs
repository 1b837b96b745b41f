//! Team participants.
//!
//! [`Participant`] is the capability the scheduler needs: a name, a description for speaker
//! selection, and [`take_turn`](Participant::take_turn). [`Agent`] is the LLM-backed
//! implementation with a tool loop.
//!
//! # Turn shape
//!
//! ```text
//! take_turn(history)
//!   └─ backend call (iteration 1)
//!       ├─ Completion::Text        → text message, turn ends
//!       └─ Completion::ToolCalls   → per call: tool_call message, tool_result message
//!           └─ backend call (iteration 2) with the results ... up to max_tool_iterations
//! ```

use crate::groupchat::bridge::ToolBridge;
use crate::groupchat::client_wrapper::{ClientWrapper, Completion, Message, Role, TokenUsage};
use crate::groupchat::error::TeamError;
use crate::groupchat::event::{AgentEvent, EventDispatcher};
use crate::groupchat::message::{
    ChatMessage, MessageContent, MessageDraft, Sender, ToolCallOutcome, ToolCallRequest,
};
use crate::groupchat::tool_protocol::{ToolMetadata, ToolRegistry};
use async_trait::async_trait;
use std::sync::Arc;

/// Text that ends a turn whose backend kept requesting tools past the limit.
pub const MAX_TOOL_ITERATIONS_WARNING: &str = "[Warning: Maximum tool iterations reached]";

/// Something that can take a turn in a team.
#[async_trait]
pub trait Participant: Send + Sync {
    /// Unique within a team.
    fn name(&self) -> &str;

    /// Used by selectors to describe the participant's role.
    fn description(&self) -> &str;

    /// Produce this turn's messages from the History so far.
    ///
    /// Messages are appended in the returned order, all at once, after the turn completes.
    async fn take_turn(&self, history: &[ChatMessage]) -> Result<Vec<MessageDraft>, TeamError>;

    /// Receive the team's event dispatcher when a run starts.
    fn set_event_dispatcher(&mut self, _dispatcher: EventDispatcher) {}
}

/// An LLM-backed participant with optional tools.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use groupchat::Agent;
/// use groupchat::clients::openai::OpenAIClient;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let client = Arc::new(OpenAIClient::from_env("gpt-4o")?);
/// let analyst = Agent::new("DataAnalystAgent", "Performs calculations.", client)
///     .with_system_message("You are a data analyst. Use the tools provided to compute numeric results.")
///     .with_max_tool_iterations(3);
/// # Ok(())
/// # }
/// ```
pub struct Agent {
    name: String,
    description: String,
    system_message: String,
    client: Arc<dyn ClientWrapper>,
    bridge: ToolBridge,
    max_tool_iterations: usize,
    reflect_on_tool_use: bool,
    events: Option<EventDispatcher>,
}

impl Agent {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        client: Arc<dyn ClientWrapper>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            system_message: "You are a helpful AI assistant.".to_string(),
            client,
            bridge: ToolBridge::default(),
            max_tool_iterations: 5,
            reflect_on_tool_use: true,
            events: None,
        }
    }

    pub fn with_system_message(mut self, system_message: impl Into<String>) -> Self {
        self.system_message = system_message.into();
        self
    }

    pub fn with_tools(mut self, registry: ToolRegistry) -> Self {
        self.bridge = ToolBridge::new(registry);
        self
    }

    /// Maximum number of tool rounds within one turn.
    pub fn with_max_tool_iterations(mut self, max: usize) -> Self {
        self.max_tool_iterations = max;
        self
    }

    /// When disabled, a turn ends right after its first batch of tool calls with a text message
    /// summarizing the tool outputs, instead of asking the backend again.
    pub fn with_reflect_on_tool_use(mut self, reflect: bool) -> Self {
        self.reflect_on_tool_use = reflect;
        self
    }

    pub fn tools(&self) -> Vec<ToolMetadata> {
        self.bridge.tool_metadata()
    }

    async fn emit(&self, event: AgentEvent) {
        if let Some(events) = &self.events {
            events.agent(&event).await;
        }
    }

    fn system_prompt(&self, tools: &[ToolMetadata]) -> String {
        let mut prompt = format!("You are {}.\n\n{}", self.name, self.system_message);
        if !tools.is_empty() {
            prompt.push_str("\n\nYou have access to the following tools:\n");
            for tool in tools {
                prompt.push_str(&tool.prompt_line());
                prompt.push('\n');
            }
            prompt.push_str(
                "\nTo use a tool, respond with a JSON object in the following format:\n\
                 {\"tool_call\": {\"name\": \"tool_name\", \"parameters\": {...}}}\n\
                 After tool execution, I'll provide the result and you can continue.\n",
            );
        }
        prompt
    }

    /// How a History message looks from this agent's point of view.
    fn prompt_message(&self, message: &ChatMessage) -> Message {
        let own = message.sender.is_agent(&self.name);
        match &message.content {
            MessageContent::Text(text) if own => Message::new(Role::Assistant, text.clone()),
            MessageContent::ToolCall(call) if own => Message::new(Role::Assistant, tool_call_json(call)),
            MessageContent::ToolResult(outcome) => Message::new(Role::User, tool_result_text(outcome)),
            _ => match &message.sender {
                Sender::User => Message::new(Role::User, message.text()),
                sender => Message::new(Role::User, format!("[{}]: {}", sender, message.text())),
            },
        }
    }

    fn turn_failed(&self, cause: impl Into<String>) -> TeamError {
        TeamError::AgentTurnFailed {
            agent: self.name.clone(),
            cause: cause.into(),
        }
    }
}

#[async_trait]
impl Participant for Agent {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn take_turn(&self, history: &[ChatMessage]) -> Result<Vec<MessageDraft>, TeamError> {
        self.emit(AgentEvent::TurnStarted {
            agent_name: self.name.clone(),
            history_len: history.len(),
        })
        .await;

        let tools = self.bridge.tool_metadata();
        let mut prompt = Vec::with_capacity(history.len() + 1);
        prompt.push(Message::new(Role::System, self.system_prompt(&tools)));
        prompt.extend(history.iter().map(|m| self.prompt_message(m)));

        let mut drafts = Vec::new();
        let mut iteration = 0;
        let mut tool_calls_made = 0;
        let mut usage = TokenUsage::default();

        loop {
            iteration += 1;
            self.emit(AgentEvent::LLMCallStarted {
                agent_name: self.name.clone(),
                iteration,
            })
            .await;

            let completion = self
                .client
                .send_message(&prompt, &tools)
                .await
                .map_err(|e| self.turn_failed(e.to_string()))?;

            let tokens_used = self.client.get_last_usage().map(|u| {
                usage.input_tokens += u.input_tokens;
                usage.output_tokens += u.output_tokens;
                usage.total_tokens += u.total_tokens;
                usage
            });
            self.emit(AgentEvent::LLMCallCompleted {
                agent_name: self.name.clone(),
                iteration,
                tokens_used,
            })
            .await;

            let calls = match completion {
                Completion::Text(text) => {
                    drafts.push(MessageDraft::text(self.name.clone(), text));
                    break;
                }
                Completion::ToolCalls(calls) if calls.is_empty() => {
                    return Err(self.turn_failed("backend returned an empty tool call batch"));
                }
                Completion::ToolCalls(calls) => calls,
            };

            if iteration > self.max_tool_iterations {
                log::warn!(
                    "agent '{}' exceeded {} tool iterations",
                    self.name,
                    self.max_tool_iterations
                );
                self.emit(AgentEvent::ToolMaxIterationsReached {
                    agent_name: self.name.clone(),
                    max_iterations: self.max_tool_iterations,
                })
                .await;
                drafts.push(MessageDraft::text(
                    self.name.clone(),
                    MAX_TOOL_ITERATIONS_WARNING,
                ));
                break;
            }

            let mut outputs = Vec::with_capacity(calls.len());
            for mut call in calls {
                if call.id.is_empty() {
                    call.id = format!("call_{}_{}", history.len(), tool_calls_made);
                }
                tool_calls_made += 1;

                self.emit(AgentEvent::ToolCallDetected {
                    agent_name: self.name.clone(),
                    tool_name: call.name.clone(),
                    arguments: call.arguments.clone(),
                    iteration,
                })
                .await;

                let result = self.bridge.invoke(&call).await;
                if let MessageContent::ToolResult(outcome) = &result.content {
                    self.emit(AgentEvent::ToolExecutionCompleted {
                        agent_name: self.name.clone(),
                        tool_name: call.name.clone(),
                        success: !outcome.is_error,
                        error: if outcome.is_error {
                            Some(outcome.content.clone())
                        } else {
                            None
                        },
                        iteration,
                    })
                    .await;
                    prompt.push(Message::new(Role::Assistant, tool_call_json(&call)));
                    prompt.push(Message::new(Role::User, tool_result_text(outcome)));
                    outputs.push(outcome.content.clone());
                }

                drafts.push(MessageDraft::tool_call(self.name.clone(), call));
                drafts.push(result);
            }

            if !self.reflect_on_tool_use {
                drafts.push(MessageDraft::text(self.name.clone(), outputs.join("\n")));
                break;
            }
        }

        self.emit(AgentEvent::TurnCompleted {
            agent_name: self.name.clone(),
            messages: drafts.len(),
            tool_calls_made,
        })
        .await;
        Ok(drafts)
    }

    fn set_event_dispatcher(&mut self, dispatcher: EventDispatcher) {
        self.events = Some(dispatcher);
    }
}

fn tool_call_json(call: &ToolCallRequest) -> String {
    serde_json::json!({
        "tool_call": { "name": call.name, "parameters": call.arguments }
    })
    .to_string()
}

fn tool_result_text(outcome: &ToolCallOutcome) -> String {
    if outcome.is_error {
        format!("Tool '{}' failed. Error: {}", outcome.name, outcome.content)
    } else {
        format!(
            "Tool '{}' executed successfully. Result: {}",
            outcome.name, outcome.content
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::error::Error;

    struct Silent;

    #[async_trait]
    impl ClientWrapper for Silent {
        async fn send_message(
            &self,
            _messages: &[Message],
            _tools: &[ToolMetadata],
        ) -> Result<Completion, Box<dyn Error + Send + Sync>> {
            Ok(Completion::Text(String::new()))
        }

        fn model_name(&self) -> &str {
            "silent"
        }
    }

    fn message(seq: u64, sender: Sender, content: MessageContent) -> ChatMessage {
        ChatMessage {
            sequence_number: seq,
            sender,
            content,
        }
    }

    #[test]
    fn history_is_rendered_from_the_agents_point_of_view() {
        let agent = Agent::new("searcher", "Searches", Arc::new(Silent));

        let task = agent.prompt_message(&message(1, Sender::User, MessageContent::Text("task".into())));
        assert_eq!(task, Message::new(Role::User, "task"));

        let other = agent.prompt_message(&message(
            2,
            Sender::agent("planner"),
            MessageContent::Text("1. searcher : look".into()),
        ));
        assert_eq!(other, Message::new(Role::User, "[planner]: 1. searcher : look"));

        let own_call = agent.prompt_message(&message(
            3,
            Sender::agent("searcher"),
            MessageContent::ToolCall(ToolCallRequest::new("c", "search_web_tool", json!({"query": "q"}))),
        ));
        assert_eq!(own_call.role, Role::Assistant);
        assert!(own_call.content.contains("\"tool_call\""));

        let result = agent.prompt_message(&message(
            4,
            Sender::Tool,
            MessageContent::ToolResult(ToolCallOutcome {
                call_id: "c".into(),
                name: "search_web_tool".into(),
                content: "No data found.".into(),
                is_error: false,
            }),
        ));
        assert_eq!(
            result.content,
            "Tool 'search_web_tool' executed successfully. Result: No data found."
        );
    }

    #[test]
    fn system_prompt_lists_tools_only_when_present() {
        let agent = Agent::new("a", "d", Arc::new(Silent)).with_system_message("Be brief.");
        let bare = agent.system_prompt(&[]);
        assert!(bare.starts_with("You are a.\n\nBe brief."));
        assert!(!bare.contains("tool_call"));

        let with_tools = agent.system_prompt(&[ToolMetadata::new("now", "Current time")]);
        assert!(with_tools.contains("- now: Current time"));
        assert!(with_tools.contains("{\"tool_call\""));
    }
}
