//! The `OpenAIClient` struct implements `ClientWrapper` for OpenAI-compatible Chat Completions
//! endpoints, with native function calling and token usage capture.
//!
//! # Example
//!
//! ```rust,no_run
//! use groupchat::clients::openai::OpenAIClient;
//! use groupchat::client_wrapper::{ClientWrapper, Message, Role};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let client = OpenAIClient::from_env("gpt-4o")?;
//!     let reply = client
//!         .send_message(
//!             &[
//!                 Message::new(Role::System, "You are an assistant."),
//!                 Message::new(Role::User, "Hello!"),
//!             ],
//!             &[],
//!         )
//!         .await?;
//!     println!("{:?}", reply);
//!     if let Some(usage) = client.get_last_usage() {
//!         println!("tokens: {}", usage.total_tokens);
//!     }
//!     Ok(())
//! }
//! ```

use crate::groupchat::client_wrapper::{ClientWrapper, Completion, Message, TokenUsage};
use crate::groupchat::clients::http_pool::get_http_client;
use crate::groupchat::message::ToolCallRequest;
use crate::groupchat::tool_protocol::ToolMetadata;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::error::Error;
use std::fmt;
use std::sync::Mutex;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Errors raised by [`OpenAIClient`].
#[derive(Debug)]
pub enum ClientError {
    /// A required environment variable is not set.
    MissingEnv(String),
    /// Transport-level failure.
    Http(reqwest::Error),
    /// The endpoint answered with a non-success status.
    Api { status: u16, body: String },
    /// The response could not be interpreted.
    Malformed(String),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::MissingEnv(var) => write!(f, "environment variable {} is not set", var),
            ClientError::Http(e) => write!(f, "HTTP error: {}", e),
            ClientError::Api { status, body } => write!(f, "API error {}: {}", status, body),
            ClientError::Malformed(msg) => write!(f, "malformed response: {}", msg),
        }
    }
}

impl Error for ClientError {}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        ClientError::Http(e)
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ResponseToolCall>,
}

#[derive(Debug, Deserialize)]
struct ResponseToolCall {
    id: String,
    function: ResponseFunction,
}

#[derive(Debug, Deserialize)]
struct ResponseFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct Usage {
    prompt_tokens: usize,
    completion_tokens: usize,
    total_tokens: usize,
}

/// Client for OpenAI's Chat Completions API and compatible servers.
pub struct OpenAIClient {
    api_key: String,
    model: String,
    base_url: String,
    token_usage: Mutex<Option<TokenUsage>>,
}

impl OpenAIClient {
    pub fn new(api_key: &str, model: &str) -> Self {
        Self::new_with_base_url(api_key, model, DEFAULT_BASE_URL)
    }

    /// Target a custom OpenAI-compatible base URL (e.g. a self-hosted deployment).
    pub fn new_with_base_url(api_key: &str, model: &str, base_url: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token_usage: Mutex::new(None),
        }
    }

    /// Read `OPENAI_API_KEY` and, if set, `OPENAI_BASE_URL`.
    pub fn from_env(model: &str) -> Result<Self, ClientError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| ClientError::MissingEnv("OPENAI_API_KEY".to_string()))?;
        let base_url =
            std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Ok(Self::new_with_base_url(&api_key, model, &base_url))
    }

    fn request_body(&self, messages: &[Message], tools: &[ToolMetadata]) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": messages
                .iter()
                .map(|m| json!({ "role": m.role.as_str(), "content": m.content }))
                .collect::<Vec<_>>(),
        });
        if !tools.is_empty() {
            body["tools"] = Value::Array(
                tools
                    .iter()
                    .map(|t| {
                        json!({
                            "type": "function",
                            "function": {
                                "name": t.name,
                                "description": t.description,
                                "parameters": t.parameters_schema(),
                            }
                        })
                    })
                    .collect(),
            );
        }
        body
    }

    fn record_usage(&self, usage: Option<Usage>) {
        if let Ok(mut slot) = self.token_usage.lock() {
            *slot = usage.map(|u| TokenUsage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            });
        }
    }
}

fn into_completion(response: ChatResponse) -> Result<Completion, ClientError> {
    let message = response
        .choices
        .into_iter()
        .next()
        .map(|c| c.message)
        .ok_or_else(|| ClientError::Malformed("no choices returned".to_string()))?;

    if !message.tool_calls.is_empty() {
        let calls = message
            .tool_calls
            .into_iter()
            .map(|call| -> Result<ToolCallRequest, ClientError> {
                let arguments = if call.function.arguments.trim().is_empty() {
                    json!({})
                } else {
                    serde_json::from_str(&call.function.arguments).map_err(|e| {
                        ClientError::Malformed(format!(
                            "arguments for '{}' are not JSON: {}",
                            call.function.name, e
                        ))
                    })?
                };
                Ok(ToolCallRequest::new(call.id, call.function.name, arguments))
            })
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(Completion::ToolCalls(calls));
    }

    match message.content {
        Some(text) => Ok(Completion::from_text(text)),
        None => Err(ClientError::Malformed(
            "response carries neither content nor tool calls".to_string(),
        )),
    }
}

#[async_trait]
impl ClientWrapper for OpenAIClient {
    async fn send_message(
        &self,
        messages: &[Message],
        tools: &[ToolMetadata],
    ) -> Result<Completion, Box<dyn Error + Send + Sync>> {
        let client = get_http_client(&self.base_url).map_err(ClientError::from)?;
        let body = self.request_body(messages, tools);
        log::trace!("request: {}", body);

        let response = client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(ClientError::from)?;

        let status = response.status();
        let text = response.text().await.map_err(ClientError::from)?;
        if !status.is_success() {
            log::error!("chat completion failed with status {}", status);
            return Err(Box::new(ClientError::Api {
                status: status.as_u16(),
                body: text,
            }));
        }

        let parsed: ChatResponse =
            serde_json::from_str(&text).map_err(|e| ClientError::Malformed(e.to_string()))?;
        self.record_usage(parsed.usage);
        Ok(into_completion(parsed)?)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn usage_slot(&self) -> Option<&Mutex<Option<TokenUsage>>> {
        Some(&self.token_usage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::groupchat::client_wrapper::Role;
    use crate::groupchat::tool_protocol::{ToolParameter, ToolParameterType};

    #[test]
    fn request_body_lists_tools_as_functions() {
        let client = OpenAIClient::new_with_base_url("k", "gpt-4o", "http://localhost:8080/v1/");
        assert_eq!(client.base_url, "http://localhost:8080/v1");

        let tools = vec![ToolMetadata::new("search_web_tool", "Search")
            .with_parameter(ToolParameter::new("query", ToolParameterType::String).required())];
        let body = client.request_body(&[Message::new(Role::User, "hi")], &tools);

        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "search_web_tool");
        assert_eq!(body["tools"][0]["function"]["parameters"]["required"][0], "query");

        let no_tools = client.request_body(&[], &[]);
        assert!(no_tools.get("tools").is_none());
    }

    #[test]
    fn native_tool_calls_win_over_content() {
        let response: ChatResponse = serde_json::from_value(json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": { "name": "percentage_change_tool", "arguments": "{\"start\": 1, \"end\": 2}" }
                    }]
                }
            }],
            "usage": { "prompt_tokens": 5, "completion_tokens": 3, "total_tokens": 8 }
        }))
        .unwrap();

        match into_completion(response).unwrap() {
            Completion::ToolCalls(calls) => {
                assert_eq!(calls[0].id, "call_1");
                assert_eq!(calls[0].arguments["end"], 2);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn empty_choices_are_malformed() {
        let response: ChatResponse = serde_json::from_value(json!({ "choices": [] })).unwrap();
        assert!(matches!(into_completion(response), Err(ClientError::Malformed(_))));
    }
}
