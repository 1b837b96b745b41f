//! Error taxonomy shared by the turn scheduler and its collaborators.
//!
//! [`TeamError`] covers everything a run can encounter. Only some variants stop a run:
//!
//! - `UnknownTool` and `ToolExecutionError` are recovered inside a turn and surface as
//!   `tool_result` messages.
//! - `SelectionFailed` and `AgentTurnFailed` are retried according to the team's
//!   [`RetryPolicy`](crate::RetryPolicy) and abort the run once retries are exhausted.
//! - `CapacityExceeded` ends the run with
//!   [`StopReason::SafetyCapReached`](crate::StopReason::SafetyCapReached).
//! - `NoParticipants`, `DuplicateParticipant` and `InvalidState` are configuration errors
//!   returned directly to the caller.

use std::error::Error;
use std::fmt;

/// Which safety cap was hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapKind {
    /// The History message cap ([`TeamConfig::max_messages`](crate::TeamConfig::max_messages)).
    Messages,
    /// The turn cap ([`TeamConfig::max_turns`](crate::TeamConfig::max_turns)).
    Turns,
}

impl fmt::Display for CapKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapKind::Messages => write!(f, "messages"),
            CapKind::Turns => write!(f, "turns"),
        }
    }
}

/// Errors raised while running a team.
#[derive(Debug, Clone, PartialEq)]
pub enum TeamError {
    /// The selector could not produce a valid next speaker.
    SelectionFailed(String),
    /// An agent's reasoning backend failed or returned something unusable.
    AgentTurnFailed { agent: String, cause: String },
    /// A tool call named a tool the agent does not have.
    UnknownTool(String),
    /// A tool rejected its arguments, returned an error, or panicked.
    ToolExecutionError { tool: String, cause: String },
    /// A safety cap would be exceeded.
    CapacityExceeded { cap: CapKind, limit: usize },
    /// The run was cancelled by the host.
    Cancelled,
    /// A team cannot run without participants.
    NoParticipants,
    /// Participant names must be unique within a team.
    DuplicateParticipant(String),
    /// The operation is not allowed in the team's current state.
    InvalidState(String),
}

impl TeamError {
    /// Whether the scheduler retries a step that failed with this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TeamError::SelectionFailed(_) | TeamError::AgentTurnFailed { .. }
        )
    }
}

impl fmt::Display for TeamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TeamError::SelectionFailed(msg) => write!(f, "Speaker selection failed: {}", msg),
            TeamError::AgentTurnFailed { agent, cause } => {
                write!(f, "Agent '{}' failed to take its turn: {}", agent, cause)
            }
            TeamError::UnknownTool(name) => write!(f, "Unknown tool: {}", name),
            TeamError::ToolExecutionError { tool, cause } => {
                write!(f, "Tool '{}' failed: {}", tool, cause)
            }
            TeamError::CapacityExceeded { cap, limit } => {
                write!(f, "Capacity exceeded: at most {} {} allowed", limit, cap)
            }
            TeamError::Cancelled => write!(f, "Run cancelled"),
            TeamError::NoParticipants => write!(f, "No participants in team"),
            TeamError::DuplicateParticipant(name) => {
                write!(f, "A participant named '{}' already exists", name)
            }
            TeamError::InvalidState(msg) => write!(f, "Invalid team state: {}", msg),
        }
    }
}

impl Error for TeamError {}

/// Result alias used across the crate.
pub type TeamResult<T> = Result<T, TeamError>;
