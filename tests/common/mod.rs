#![allow(dead_code)]

use async_trait::async_trait;
use groupchat::client_wrapper::{ClientWrapper, Completion, Message};
use groupchat::event::{EventHandler, TeamEvent};
use groupchat::selector::{Roster, Selector};
use groupchat::tool_protocol::{ToolMetadata, ToolParameter, ToolParameterType, ToolRegistry, ToolResult};
use groupchat::tool_protocols::CustomToolProtocol;
use groupchat::{Agent, ChatMessage, RetryPolicy, TeamConfig, TeamError, ToolCallRequest};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::error::Error;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One scripted backend reply.
pub enum Reply {
    Text(String),
    Calls(Vec<ToolCallRequest>),
    Fail(String),
}

pub fn text(s: &str) -> Reply {
    Reply::Text(s.to_string())
}

pub fn call(id: &str, name: &str, arguments: Value) -> Reply {
    Reply::Calls(vec![ToolCallRequest::new(id, name, arguments)])
}

pub fn fail(cause: &str) -> Reply {
    Reply::Fail(cause.to_string())
}

/// Backend that plays replies in order, then repeats `fallback` forever.
pub struct ScriptedClient {
    replies: Mutex<VecDeque<Reply>>,
    fallback: String,
    prompts: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedClient {
    pub fn new(replies: Vec<Reply>, fallback: &str) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            fallback: fallback.to_string(),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn prompts(&self) -> Vec<Vec<Message>> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl ClientWrapper for ScriptedClient {
    async fn send_message(
        &self,
        messages: &[Message],
        _tools: &[ToolMetadata],
    ) -> Result<Completion, Box<dyn Error + Send + Sync>> {
        self.prompts.lock().unwrap().push(messages.to_vec());
        let next = self.replies.lock().unwrap().pop_front();
        match next {
            Some(Reply::Text(t)) => Ok(Completion::Text(t)),
            Some(Reply::Calls(calls)) => Ok(Completion::ToolCalls(calls)),
            Some(Reply::Fail(cause)) => Err(cause.into()),
            None => Ok(Completion::Text(self.fallback.clone())),
        }
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// Agent whose backend says `replies` in order, then `fallback`.
pub fn scripted_agent(name: &str, replies: Vec<Reply>, fallback: &str) -> (Agent, Arc<ScriptedClient>) {
    let client = ScriptedClient::new(replies, fallback);
    let agent = Agent::new(name, format!("{} description", name), client.clone());
    (agent, client)
}

/// Agent that always answers `reply`.
pub fn echo_agent(name: &str, reply: &str) -> Agent {
    scripted_agent(name, vec![], reply).0
}

/// Team config without backoff so retries do not slow tests down.
pub fn fast_config() -> TeamConfig {
    TeamConfig {
        retry: RetryPolicy {
            max_retries: 2,
            initial_backoff: Duration::from_millis(0),
            ..RetryPolicy::default()
        },
        ..TeamConfig::default()
    }
}

/// Selector that replays names, failing once the script is exhausted.
pub struct ScriptedSelector {
    names: Mutex<VecDeque<Result<String, TeamError>>>,
    pub calls: AtomicUsize,
}

impl ScriptedSelector {
    pub fn new(names: Vec<Result<&str, TeamError>>) -> Arc<Self> {
        Arc::new(Self {
            names: Mutex::new(names.into_iter().map(|r| r.map(str::to_string)).collect()),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Selector for ScriptedSelector {
    async fn select_next(&self, _roster: &Roster<'_>, _history: &[ChatMessage]) -> Result<String, TeamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.names
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TeamError::SelectionFailed("script exhausted".into())))
    }
}

/// Lets tests hand an `Arc` to the team and keep inspecting it.
pub struct Shared<S>(pub Arc<S>);

#[async_trait]
impl<S: Selector> Selector for Shared<S> {
    async fn select_next(&self, roster: &Roster<'_>, history: &[ChatMessage]) -> Result<String, TeamError> {
        self.0.select_next(roster, history).await
    }
}

/// Records every team event.
#[derive(Default)]
pub struct Recorder {
    pub events: Mutex<Vec<TeamEvent>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<TeamEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn appended(&self) -> Vec<ChatMessage> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                TeamEvent::MessageAppended(m) => Some(m),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl EventHandler for Recorder {
    async fn on_team_event(&self, event: &TeamEvent) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

pub fn search_web(query: &str) -> &'static str {
    if query.contains("2006-2007") {
        "Dwayne Wade: 1397 points"
    } else if query.contains("2007-2008") {
        "Dwayne Wade rebounds 2007-2008: 214"
    } else if query.contains("2008-2009") {
        "Dwayne Wade rebounds 2008-2009: 398"
    } else {
        "No data found."
    }
}

pub async fn search_registry() -> ToolRegistry {
    let protocol = Arc::new(CustomToolProtocol::new());
    protocol
        .register_tool(
            ToolMetadata::new("search_web_tool", "Search the web").with_parameter(
                ToolParameter::new("query", ToolParameterType::String).required(),
            ),
            Arc::new(|params: Value| {
                let query = params["query"].as_str().unwrap_or_default();
                Ok(ToolResult::success(json!(search_web(query))))
            }),
        )
        .await;
    ToolRegistry::from_protocol(protocol).await.unwrap()
}

pub async fn math_registry() -> ToolRegistry {
    let protocol = Arc::new(CustomToolProtocol::new());
    protocol
        .register_tool(
            ToolMetadata::new("percentage_change_tool", "Percentage change")
                .with_parameter(ToolParameter::new("start", ToolParameterType::Number).required())
                .with_parameter(ToolParameter::new("end", ToolParameterType::Number).required()),
            Arc::new(|params: Value| {
                let start = params["start"].as_f64().unwrap_or(0.0);
                let end = params["end"].as_f64().unwrap_or(0.0);
                if start == 0.0 {
                    return Ok(ToolResult::failure("start must not be zero".into()));
                }
                Ok(ToolResult::success(json!((end - start) / start * 100.0)))
            }),
        )
        .await;
    protocol
        .register_tool(
            ToolMetadata::new("explode", "Always panics"),
            Arc::new(|_: Value| -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
                panic!("boom")
            }),
        )
        .await;
    ToolRegistry::from_protocol(protocol).await.unwrap()
}

/// Sequence numbers are 1, 2, 3, ... with no gaps.
pub fn assert_gap_free(messages: &[ChatMessage]) {
    for (index, message) in messages.iter().enumerate() {
        assert_eq!(message.sequence_number, index as u64 + 1, "gap at {}", index);
    }
}
