//! Tool abstraction used by agents.
//!
//! ```text
//! Agent → ToolBridge → ToolRegistry → Tool → ToolProtocol (trait) → [Custom | user-defined]
//! ```
//!
//! Tools describe their arguments with [`ToolMetadata`]; the same description is rendered
//! into the agent's prompt, sent to function-calling backends as a JSON schema, and used to
//! validate arguments before a tool runs.
//!
//! # Example
//!
//! ```rust
//! use groupchat::tool_protocol::{ToolMetadata, ToolParameter, ToolParameterType};
//! use serde_json::json;
//!
//! let meta = ToolMetadata::new("percentage_change_tool", "Calculate percentage change")
//!     .with_parameter(ToolParameter::new("start", ToolParameterType::Number).required())
//!     .with_parameter(ToolParameter::new("end", ToolParameterType::Number).required());
//!
//! assert!(meta.validate_arguments(&json!({"start": 10, "end": 12})).is_ok());
//! assert!(meta.validate_arguments(&json!({"start": 10})).is_err());
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// Represents the result of a tool execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub output: Value,
    pub error: Option<String>,
}

impl ToolResult {
    pub fn success(output: Value) -> Self {
        Self {
            success: true,
            output,
            error: None,
        }
    }

    pub fn failure(error: String) -> Self {
        Self {
            success: false,
            output: Value::Null,
            error: Some(error),
        }
    }

    /// Text handed back to the conversation: strings verbatim, anything else as JSON.
    pub fn output_text(&self) -> String {
        match &self.output {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Defines the type of a tool parameter
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ToolParameterType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
}

impl ToolParameterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolParameterType::String => "string",
            ToolParameterType::Number => "number",
            ToolParameterType::Integer => "integer",
            ToolParameterType::Boolean => "boolean",
            ToolParameterType::Array => "array",
            ToolParameterType::Object => "object",
        }
    }

    /// Whether a JSON value is acceptable for this type.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            ToolParameterType::String => value.is_string(),
            ToolParameterType::Number => value.is_number(),
            ToolParameterType::Integer => value.is_i64() || value.is_u64(),
            ToolParameterType::Boolean => value.is_boolean(),
            ToolParameterType::Array => value.is_array(),
            ToolParameterType::Object => value.is_object(),
        }
    }
}

/// Defines a parameter for a tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ToolParameterType,
    pub description: Option<String>,
    pub required: bool,
    /// For array types, the type of the items
    pub items: Option<ToolParameterType>,
}

impl ToolParameter {
    pub fn new(name: impl Into<String>, param_type: ToolParameterType) -> Self {
        Self {
            name: name.into(),
            param_type,
            description: None,
            required: false,
            items: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_items(mut self, item_type: ToolParameterType) -> Self {
        self.items = Some(item_type);
        self
    }

    fn json_schema(&self) -> Value {
        let mut schema = Map::new();
        schema.insert("type".into(), json!(self.param_type.as_str()));
        if let Some(description) = &self.description {
            schema.insert("description".into(), json!(description));
        }
        if let Some(items) = &self.items {
            schema.insert("items".into(), json!({ "type": items.as_str() }));
        }
        Value::Object(schema)
    }
}

/// Metadata about a tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolMetadata {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ToolParameter>,
}

impl ToolMetadata {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
        }
    }

    pub fn with_parameter(mut self, param: ToolParameter) -> Self {
        self.parameters.push(param);
        self
    }

    /// JSON schema of the argument object, in the shape function-calling APIs expect.
    pub fn parameters_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for param in &self.parameters {
            properties.insert(param.name.clone(), param.json_schema());
            if param.required {
                required.push(json!(param.name));
            }
        }
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Check that required parameters are present and typed values match.
    ///
    /// Unknown keys are tolerated.
    pub fn validate_arguments(&self, arguments: &Value) -> Result<(), ToolError> {
        let empty = Map::new();
        let object = match arguments {
            Value::Object(map) => map,
            Value::Null => &empty,
            other => {
                return Err(ToolError::InvalidParameters(format!(
                    "expected a JSON object, got {}",
                    other
                )))
            }
        };

        for param in &self.parameters {
            match object.get(&param.name) {
                None | Some(Value::Null) if param.required => {
                    return Err(ToolError::InvalidParameters(format!(
                        "missing required parameter '{}'",
                        param.name
                    )))
                }
                Some(value) if !value.is_null() && !param.param_type.accepts(value) => {
                    return Err(ToolError::InvalidParameters(format!(
                        "parameter '{}' must be of type {}",
                        param.name,
                        param.param_type.as_str()
                    )))
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// One-line description used when listing tools in a system prompt.
    pub fn prompt_line(&self) -> String {
        let params = self
            .parameters
            .iter()
            .map(|p| {
                let mut line = format!("{} ({}", p.name, p.param_type.as_str());
                if p.required {
                    line.push_str(", required");
                }
                line.push(')');
                if let Some(d) = &p.description {
                    line.push_str(": ");
                    line.push_str(d);
                }
                line
            })
            .collect::<Vec<_>>()
            .join("; ");
        if params.is_empty() {
            format!("- {}: {}", self.name, self.description)
        } else {
            format!("- {}: {} Parameters: {}", self.name, self.description, params)
        }
    }
}

/// Trait for implementing tool execution protocols
#[async_trait]
pub trait ToolProtocol: Send + Sync {
    /// Execute a tool with the given parameters
    async fn execute(
        &self,
        tool_name: &str,
        parameters: Value,
    ) -> Result<ToolResult, Box<dyn Error + Send + Sync>>;

    /// Metadata for every tool the protocol offers
    async fn list_tools(&self) -> Result<Vec<ToolMetadata>, Box<dyn Error + Send + Sync>>;

    /// Protocol identifier (e.g. "custom")
    fn protocol_name(&self) -> &str;
}

/// Error types for tool operations
#[derive(Debug, Clone, PartialEq)]
pub enum ToolError {
    /// Requested tool is not registered.
    NotFound(String),
    /// The provided JSON parameters failed validation.
    InvalidParameters(String),
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolError::NotFound(name) => write!(f, "Tool not found: {}", name),
            ToolError::InvalidParameters(msg) => write!(f, "Invalid parameters: {}", msg),
        }
    }
}

impl Error for ToolError {}

/// A tool bound to the protocol that executes it.
#[derive(Clone)]
pub struct Tool {
    metadata: ToolMetadata,
    protocol: Arc<dyn ToolProtocol>,
}

impl Tool {
    pub fn new(metadata: ToolMetadata, protocol: Arc<dyn ToolProtocol>) -> Self {
        Self { metadata, protocol }
    }

    pub fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    pub async fn execute(&self, parameters: Value) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
        self.protocol.execute(&self.metadata.name, parameters).await
    }
}

/// Named tools available to one agent, listed in registration order.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Tool>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry holding every tool a protocol lists.
    pub async fn from_protocol(
        protocol: Arc<dyn ToolProtocol>,
    ) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let mut registry = Self::empty();
        registry.add_protocol(protocol).await?;
        Ok(registry)
    }

    /// Register every tool a protocol lists. Returns how many were added.
    pub async fn add_protocol(
        &mut self,
        protocol: Arc<dyn ToolProtocol>,
    ) -> Result<usize, Box<dyn Error + Send + Sync>> {
        let tools = protocol.list_tools().await?;
        let count = tools.len();
        for metadata in tools {
            self.add_tool(Tool::new(metadata, protocol.clone()));
        }
        log::debug!(
            "registered {} tool(s) from protocol '{}'",
            count,
            protocol.protocol_name()
        );
        Ok(count)
    }

    /// Insert or replace a tool definition. Replacing keeps the original position.
    pub fn add_tool(&mut self, tool: Tool) {
        let name = tool.metadata.name.clone();
        if self.tools.insert(name.clone(), tool).is_none() {
            self.order.push(name);
        }
    }

    pub fn remove_tool(&mut self, name: &str) -> Option<Tool> {
        self.order.retain(|n| n != name);
        self.tools.remove(name)
    }

    pub fn get_tool(&self, name: &str) -> Option<&Tool> {
        self.tools.get(name)
    }

    pub fn list_tools(&self) -> Vec<&ToolMetadata> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|t| &t.metadata)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }
}
