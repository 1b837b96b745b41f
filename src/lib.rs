//! # groupchat
//!
//! groupchat runs a small, fixed team of LLM-backed agents through turn-based dialogue until a
//! composable stopping condition is met.
//!
//! The crate provides carefully layered abstractions for:
//!
//! * **Shared History**: [`History`] is an append-only, gap-free ordered log of every
//!   [`ChatMessage`] produced during a run
//! * **Speaker Selection**: [`selector::Selector`] implementations decide who speaks next,
//!   from a deterministic rotation to an LLM-driven [`selector::ModelSelector`]
//! * **Tool Round-Trips**: [`Agent`]s call tools through a [`bridge::ToolBridge`] that turns
//!   unknown tools and tool failures into `tool_result` messages instead of aborting the run
//! * **Termination**: [`termination::TerminationCondition`]s such as
//!   [`termination::TextMentionTermination`] and [`termination::MaxMessagesTermination`],
//!   combinable with `.or(..)` / `.and(..)`
//! * **Observability**: every appended message is published as a [`TeamEvent`] to
//!   [`EventHandler`]s, and the [`telemetry::Telemetry`] recorder traces runs and turns
//!
//! ## Getting Started
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use groupchat::clients::openai::OpenAIClient;
//! use groupchat::termination::{MaxMessagesTermination, TerminationCondition, TextMentionTermination};
//! use groupchat::{Agent, Team};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     groupchat::init_logger();
//!
//!     let client = Arc::new(OpenAIClient::from_env("gpt-4o")?);
//!
//!     let writer = Agent::new("writer", "Drafts answers", client.clone())
//!         .with_system_message("You write short answers.");
//!     let critic = Agent::new("critic", "Reviews drafts", client)
//!         .with_system_message("Review the draft. Reply TERMINATE when it is good.");
//!
//!     let mut team = Team::new("review", "Review Team")
//!         .with_termination(TextMentionTermination::new("TERMINATE").or(MaxMessagesTermination::new(10)));
//!     team.add_participant(writer)?;
//!     team.add_participant(critic)?;
//!
//!     let result = team.run(Some("Explain ownership in Rust in one paragraph.")).await?;
//!     println!("stopped: {}", result.stop_reason);
//!     Ok(())
//! }
//! ```

use std::sync::Once;

static INIT_LOGGER: Once = Once::new();

/// Initialise the global [`env_logger`] subscriber exactly once.
///
/// Applications embedding groupchat opt in to `RUST_LOG` driven diagnostics with this call;
/// the library itself only talks to the [`log`] facade.
///
/// ```rust
/// groupchat::init_logger();
/// log::info!("Logger is ready");
/// ```
pub fn init_logger() {
    INIT_LOGGER.call_once(|| {
        env_logger::init();
    });
}

pub mod groupchat;

pub use crate::groupchat::agent;
pub use crate::groupchat::agent::{Agent, Participant};
pub use crate::groupchat::bridge;
pub use crate::groupchat::client_wrapper;
pub use crate::groupchat::client_wrapper::{ClientWrapper, Completion, Message, Role};
pub use crate::groupchat::clients;
pub use crate::groupchat::config;
pub use crate::groupchat::config::{RetryPolicy, TeamConfig, DEFAULT_TASK};
pub use crate::groupchat::console::ConsoleRenderer;
pub use crate::groupchat::error;
pub use crate::groupchat::error::{TeamError, TeamResult};
pub use crate::groupchat::event;
pub use crate::groupchat::event::{AgentEvent, EventHandler, TeamEvent};
pub use crate::groupchat::history;
pub use crate::groupchat::history::History;
pub use crate::groupchat::message;
pub use crate::groupchat::message::{
    ChatMessage, MessageContent, MessageDraft, MessageKind, Sender, ToolCallOutcome,
    ToolCallRequest,
};
pub use crate::groupchat::selector;
pub use crate::groupchat::team::{CancellationHandle, StopReason, TaskResult, Team, TeamState};
pub use crate::groupchat::telemetry;
pub use crate::groupchat::termination;
pub use crate::groupchat::tool_protocol;
pub use crate::groupchat::tool_protocols;
