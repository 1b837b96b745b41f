//! In-process tool protocol backed by Rust closures.

use crate::groupchat::tool_protocol::{ToolError, ToolMetadata, ToolProtocol, ToolResult};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::error::Error;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Synchronous tool function.
pub type ToolFunction =
    Arc<dyn Fn(JsonValue) -> Result<ToolResult, Box<dyn Error + Send + Sync>> + Send + Sync>;

/// Future returned by an [`AsyncToolFunction`].
pub type ToolFuture =
    Pin<Box<dyn Future<Output = Result<ToolResult, Box<dyn Error + Send + Sync>>> + Send>>;

/// Asynchronous tool function.
pub type AsyncToolFunction = Arc<dyn Fn(JsonValue) -> ToolFuture + Send + Sync>;

#[derive(Clone)]
enum Handler {
    Sync(ToolFunction),
    Async(AsyncToolFunction),
}

struct Entry {
    metadata: ToolMetadata,
    handler: Handler,
}

/// Registers Rust functions as tools.
///
/// Tools are listed in registration order, so prompts built from them are stable across runs.
///
/// # Example
///
/// ```rust
/// use groupchat::tool_protocols::CustomToolProtocol;
/// use groupchat::tool_protocol::{ToolMetadata, ToolParameter, ToolParameterType, ToolResult};
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() {
/// let protocol = CustomToolProtocol::new();
/// protocol
///     .register_tool(
///         ToolMetadata::new("add", "Adds two numbers")
///             .with_parameter(ToolParameter::new("a", ToolParameterType::Number).required())
///             .with_parameter(ToolParameter::new("b", ToolParameterType::Number).required()),
///         Arc::new(|params| {
///             let a = params["a"].as_f64().unwrap_or(0.0);
///             let b = params["b"].as_f64().unwrap_or(0.0);
///             Ok(ToolResult::success(serde_json::json!(a + b)))
///         }),
///     )
///     .await;
/// # }
/// ```
pub struct CustomToolProtocol {
    entries: RwLock<Vec<Entry>>,
}

impl CustomToolProtocol {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Register a synchronous tool function, replacing any tool with the same name.
    pub async fn register_tool(&self, metadata: ToolMetadata, function: ToolFunction) {
        self.insert(metadata, Handler::Sync(function)).await;
    }

    /// Register an asynchronous tool function, replacing any tool with the same name.
    pub async fn register_async_tool(&self, metadata: ToolMetadata, function: AsyncToolFunction) {
        self.insert(metadata, Handler::Async(function)).await;
    }

    pub async fn unregister_tool(&self, name: &str) {
        self.entries.write().await.retain(|e| e.metadata.name != name);
    }

    async fn insert(&self, metadata: ToolMetadata, handler: Handler) {
        let mut entries = self.entries.write().await;
        match entries.iter_mut().find(|e| e.metadata.name == metadata.name) {
            Some(existing) => {
                existing.metadata = metadata;
                existing.handler = handler;
            }
            None => entries.push(Entry { metadata, handler }),
        }
    }
}

impl Default for CustomToolProtocol {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolProtocol for CustomToolProtocol {
    async fn execute(
        &self,
        tool_name: &str,
        parameters: JsonValue,
    ) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
        // Clone the handler out so the lock is not held while the tool runs.
        let handler = {
            let entries = self.entries.read().await;
            entries
                .iter()
                .find(|e| e.metadata.name == tool_name)
                .map(|e| e.handler.clone())
        };

        match handler {
            Some(Handler::Async(func)) => func(parameters).await,
            Some(Handler::Sync(func)) => func(parameters),
            None => Err(Box::new(ToolError::NotFound(tool_name.to_string()))),
        }
    }

    async fn list_tools(&self) -> Result<Vec<ToolMetadata>, Box<dyn Error + Send + Sync>> {
        let entries = self.entries.read().await;
        Ok(entries.iter().map(|e| e.metadata.clone()).collect())
    }

    fn protocol_name(&self) -> &str {
        "custom"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn sync_and_async_tools_run() {
        let protocol = CustomToolProtocol::new();
        protocol
            .register_tool(
                ToolMetadata::new("echo", "Echo"),
                Arc::new(|params| Ok(ToolResult::success(params))),
            )
            .await;
        protocol
            .register_async_tool(
                ToolMetadata::new("later", "Async echo"),
                Arc::new(|params| Box::pin(async move { Ok(ToolResult::success(params)) })),
            )
            .await;

        let out = protocol.execute("echo", json!({"x": 1})).await.unwrap();
        assert_eq!(out.output, json!({"x": 1}));
        let out = protocol.execute("later", json!("hi")).await.unwrap();
        assert_eq!(out.output_text(), "hi");
        assert!(protocol.execute("nope", json!({})).await.is_err());
    }

    #[tokio::test]
    async fn reregistering_keeps_position() {
        let protocol = CustomToolProtocol::new();
        for name in &["a", "b", "c"] {
            protocol
                .register_tool(
                    ToolMetadata::new(*name, "first"),
                    Arc::new(|_| Ok(ToolResult::success(json!(null)))),
                )
                .await;
        }
        protocol
            .register_tool(
                ToolMetadata::new("a", "second"),
                Arc::new(|_| Ok(ToolResult::success(json!(null)))),
            )
            .await;
        protocol.unregister_tool("b").await;

        let tools = protocol.list_tools().await.unwrap();
        let names: Vec<_> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["a", "c"]);
        assert_eq!(tools[0].description, "second");
    }
}
