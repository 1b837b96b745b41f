//! Team and agent event system.
//!
//! Implement [`EventHandler`] to observe a run as it happens:
//!
//! - [`TeamEvent`]s from the scheduler: run start, speaker selection, every appended message,
//!   failed attempts and the final stop reason
//! - [`AgentEvent`]s from inside a turn: LLM round-trips and tool executions
//!
//! Both methods have default no-op implementations, so you only override what you care about.
//! Handlers are registered on a [`Team`](crate::Team) with
//! [`with_event_handler`](crate::Team::with_event_handler) and handed to every participant when
//! the run starts.
//!
//! Delivery is synchronous: the team awaits each handler before moving on, so a consumer sees
//! `MessageAppended` events in sequence order. A handler that returns an error, panics or
//! exceeds the team's `event_timeout` is logged and skipped; it never affects the run.
//!
//! # Example
//!
//! ```rust,no_run
//! use groupchat::event::{EventHandler, TeamEvent};
//! use async_trait::async_trait;
//! use std::error::Error;
//!
//! struct Printer;
//!
//! #[async_trait]
//! impl EventHandler for Printer {
//!     async fn on_team_event(&self, event: &TeamEvent) -> Result<(), Box<dyn Error + Send + Sync>> {
//!         if let TeamEvent::MessageAppended(message) = event {
//!             println!("#{} {}: {}", message.sequence_number, message.sender, message.text());
//!         }
//!         Ok(())
//!     }
//! }
//! ```

use crate::groupchat::bridge::panic_message;
use crate::groupchat::client_wrapper::TokenUsage;
use crate::groupchat::error::TeamError;
use crate::groupchat::message::ChatMessage;
use crate::groupchat::team::StopReason;
use async_trait::async_trait;
use futures_util::FutureExt;
use std::error::Error;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Events emitted by the team scheduler.
#[derive(Debug, Clone)]
pub enum TeamEvent {
    /// The run left `Idle`. Emitted before the task message is appended.
    RunStarted {
        team_id: String,
        task: String,
        participants: Vec<String>,
    },
    /// The selector picked the speaker for `turn` (1-based).
    SpeakerSelected { turn: usize, agent: String },
    /// One message was appended to the History.
    MessageAppended(ChatMessage),
    /// Selecting a speaker or taking a turn failed.
    TurnFailed {
        turn: usize,
        /// `None` when selection failed.
        agent: Option<String>,
        error: TeamError,
        /// 1-based attempt number that failed.
        attempt: u32,
        will_retry: bool,
    },
    /// The run reached `Terminated`. Always the last event of a run.
    Terminated {
        stop_reason: StopReason,
        message_count: usize,
        turns: usize,
    },
}

/// Events emitted by an [`Agent`](crate::Agent) while it takes a turn.
///
/// ```text
/// TurnStarted
///   └─ LLMCallStarted { iteration: 1 }
///   └─ LLMCallCompleted { iteration: 1 }
///   └─ (for each requested tool)
///       ├─ ToolCallDetected
///       └─ ToolExecutionCompleted
///   └─ LLMCallStarted { iteration: 2 } ...
/// TurnCompleted
/// ```
#[derive(Debug, Clone)]
pub enum AgentEvent {
    TurnStarted {
        agent_name: String,
        history_len: usize,
    },
    /// Fired before each backend round-trip. Iteration 1 is the initial call.
    LLMCallStarted { agent_name: String, iteration: usize },
    LLMCallCompleted {
        agent_name: String,
        iteration: usize,
        tokens_used: Option<TokenUsage>,
    },
    ToolCallDetected {
        agent_name: String,
        tool_name: String,
        arguments: serde_json::Value,
        iteration: usize,
    },
    ToolExecutionCompleted {
        agent_name: String,
        tool_name: String,
        success: bool,
        error: Option<String>,
        iteration: usize,
    },
    /// The backend kept requesting tools past the agent's limit.
    ToolMaxIterationsReached {
        agent_name: String,
        max_iterations: usize,
    },
    TurnCompleted {
        agent_name: String,
        messages: usize,
        tool_calls_made: usize,
    },
}

/// Receives events from teams and agents.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn on_team_event(&self, _event: &TeamEvent) -> Result<(), Box<dyn Error + Send + Sync>> {
        Ok(())
    }

    async fn on_agent_event(&self, _event: &AgentEvent) -> Result<(), Box<dyn Error + Send + Sync>> {
        Ok(())
    }
}

/// Fans events out to handlers, isolating the caller from their failures.
#[derive(Clone)]
pub struct EventDispatcher {
    handlers: Vec<Arc<dyn EventHandler>>,
    timeout: Duration,
}

impl EventDispatcher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            handlers: Vec::new(),
            timeout,
        }
    }

    pub fn add_handler(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers.push(handler);
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub async fn team(&self, event: &TeamEvent) {
        for handler in &self.handlers {
            deliver("team", self.timeout, handler.on_team_event(event)).await;
        }
    }

    pub async fn agent(&self, event: &AgentEvent) {
        for handler in &self.handlers {
            deliver("agent", self.timeout, handler.on_agent_event(event)).await;
        }
    }
}

async fn deliver<F>(kind: &str, timeout: Duration, delivery: F)
where
    F: Future<Output = Result<(), Box<dyn Error + Send + Sync>>>,
{
    match tokio::time::timeout(timeout, AssertUnwindSafe(delivery).catch_unwind()).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => log::warn!("{} event handler failed, event dropped: {}", kind, e),
        Ok(Err(panic)) => log::error!(
            "{} event handler panicked, event dropped: {}",
            kind,
            panic_message(&panic)
        ),
        Err(_) => log::warn!(
            "{} event handler timed out after {:?}, event dropped",
            kind,
            timeout
        ),
    }
}

/// Forwards team events into a bounded channel.
///
/// Backs [`Team::run_stream`](crate::Team::run_stream). A full channel applies backpressure up
/// to the dispatcher timeout; a dropped receiver turns deliveries into logged failures.
pub struct ChannelHandler {
    sender: mpsc::Sender<TeamEvent>,
}

impl ChannelHandler {
    pub fn new(sender: mpsc::Sender<TeamEvent>) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl EventHandler for ChannelHandler {
    async fn on_team_event(&self, event: &TeamEvent) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.sender
            .send(event.clone())
            .await
            .map_err(|_| "event stream receiver dropped".into())
    }
}
