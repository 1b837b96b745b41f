//! Tool invocation bridge.
//!
//! Maps an agent's [`ToolCallRequest`] onto its [`ToolRegistry`] and always hands a
//! `tool_result` draft back to the conversation. An unknown tool, invalid arguments, a tool
//! error or a tool panic never aborts the run; the agent sees the error text on its next
//! step and can correct itself.

use crate::groupchat::error::TeamError;
use crate::groupchat::message::{MessageDraft, ToolCallOutcome, ToolCallRequest};
use crate::groupchat::tool_protocol::{ToolMetadata, ToolRegistry};
use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Executes tool calls for one agent.
#[derive(Clone, Default)]
pub struct ToolBridge {
    registry: Arc<ToolRegistry>,
}

impl ToolBridge {
    pub fn new(registry: ToolRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Schemas of every tool, in registration order.
    pub fn tool_metadata(&self) -> Vec<ToolMetadata> {
        self.registry.list_tools().into_iter().cloned().collect()
    }

    /// Run a tool call and return its textual output.
    ///
    /// Fails with [`TeamError::UnknownTool`] when no tool has that name and with
    /// [`TeamError::ToolExecutionError`] for invalid arguments, tool errors and panics.
    pub async fn execute(&self, call: &ToolCallRequest) -> Result<String, TeamError> {
        let tool = self
            .registry
            .get_tool(&call.name)
            .ok_or_else(|| TeamError::UnknownTool(call.name.clone()))?;

        tool.metadata()
            .validate_arguments(&call.arguments)
            .map_err(|e| execution_error(call, e.to_string()))?;

        let outcome = AssertUnwindSafe(tool.execute(call.arguments.clone()))
            .catch_unwind()
            .await
            .map_err(|panic| execution_error(call, format!("tool panicked: {}", panic_message(&panic))))?;

        match outcome {
            Ok(result) if result.success => Ok(result.output_text()),
            Ok(result) => Err(execution_error(
                call,
                result
                    .error
                    .unwrap_or_else(|| "tool reported failure without a message".to_string()),
            )),
            Err(e) => Err(execution_error(call, e.to_string())),
        }
    }

    /// Run a tool call and wrap the outcome, success or failure, as a `tool_result` draft.
    pub async fn invoke(&self, call: &ToolCallRequest) -> MessageDraft {
        let outcome = match self.execute(call).await {
            Ok(content) => ToolCallOutcome {
                call_id: call.id.clone(),
                name: call.name.clone(),
                content,
                is_error: false,
            },
            Err(err) => {
                log::warn!("tool call '{}' ({}) recovered: {}", call.name, call.id, err);
                ToolCallOutcome {
                    call_id: call.id.clone(),
                    name: call.name.clone(),
                    content: err.to_string(),
                    is_error: true,
                }
            }
        };
        MessageDraft::tool_result(outcome)
    }
}

fn execution_error(call: &ToolCallRequest, cause: String) -> TeamError {
    TeamError::ToolExecutionError {
        tool: call.name.clone(),
        cause,
    }
}

pub(crate) fn panic_message(panic: &Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
