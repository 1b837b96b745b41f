//! Planning / web search / data analyst team answering a basketball statistics question.
//!
//! ```text
//! OPENAI_API_KEY=... RUST_LOG=info cargo run --example demo_bot -- "optional task"
//! ```
//!
//! Set `OTEL_SERVICE_NAME` to name the telemetry service (defaults to `groupchat`).

use groupchat::clients::openai::OpenAIClient;
use groupchat::selector::ModelSelector;
use groupchat::telemetry::{Telemetry, TelemetryConfig};
use groupchat::termination::{MaxMessagesTermination, TerminationCondition, TextMentionTermination};
use groupchat::tool_protocol::{ToolMetadata, ToolParameter, ToolParameterType, ToolRegistry, ToolResult};
use groupchat::tool_protocols::CustomToolProtocol;
use groupchat::{Agent, ConsoleRenderer, Team, TeamConfig};
use serde_json::{json, Value};
use std::error::Error;
use std::sync::Arc;

const SELECTOR_PROMPT: &str = "Select an agent to perform task.\n\n{roles}\n\nCurrent conversation context:\n{history}\n\nRead the above conversation, then select an agent from {participants} to perform the next task.\nMake sure the planner agent has assigned tasks before other agents start working.\nOnly select one agent.";

fn search_web(query: &str) -> &'static str {
    if query.contains("2006-2007") {
        "Here are the total points scored by Miami Heat players in the 2006-2007 season:\n\
         Udonis Haslem: 844 points\n\
         Dwayne Wade: 1397 points\n\
         James Posey: 550 points\n\
         ...\n"
    } else if query.contains("2007-2008") {
        "The number of total rebounds for Dwayne Wade in the Miami Heat season 2007-2008 is 214."
    } else if query.contains("2008-2009") {
        "The number of total rebounds for Dwayne Wade in the Miami Heat season 2008-2009 is 398."
    } else {
        "No data found."
    }
}

fn percentage_change(params: &Value) -> Result<f64, String> {
    let start = params["start"].as_f64().ok_or("start must be a number")?;
    let end = params["end"].as_f64().ok_or("end must be a number")?;
    if start == 0.0 {
        return Err("start must not be zero".to_string());
    }
    Ok((end - start) / start * 100.0)
}

async fn search_tools() -> Result<ToolRegistry, Box<dyn Error + Send + Sync>> {
    let protocol = Arc::new(CustomToolProtocol::new());
    protocol
        .register_tool(
            ToolMetadata::new("search_web_tool", "Search the web for information.").with_parameter(
                ToolParameter::new("query", ToolParameterType::String)
                    .with_description("The search query")
                    .required(),
            ),
            Arc::new(|params: Value| {
                let query = params["query"].as_str().unwrap_or_default();
                Ok(ToolResult::success(json!(search_web(query))))
            }),
        )
        .await;
    ToolRegistry::from_protocol(protocol).await
}

async fn analysis_tools() -> Result<ToolRegistry, Box<dyn Error + Send + Sync>> {
    let protocol = Arc::new(CustomToolProtocol::new());
    protocol
        .register_tool(
            ToolMetadata::new(
                "percentage_change_tool",
                "Calculate the percentage change between two values.",
            )
            .with_parameter(ToolParameter::new("start", ToolParameterType::Number).required())
            .with_parameter(ToolParameter::new("end", ToolParameterType::Number).required()),
            Arc::new(|params: Value| match percentage_change(&params) {
                Ok(change) => Ok(ToolResult::success(json!(change))),
                Err(e) => Ok(ToolResult::failure(e)),
            }),
        )
        .await;
    ToolRegistry::from_protocol(protocol).await
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    groupchat::init_logger();
    let telemetry = Telemetry::init(TelemetryConfig::from_env());

    let client = Arc::new(OpenAIClient::from_env("gpt-4o")?);

    let planning_agent = Agent::new("PlanningAgent", "Plans tasks and delegates.", client.clone())
        .with_system_message(
            "You are a planning agent. You only plan and delegate tasks; do not execute them.\n\
             When assigning tasks, use this format: 1. <agent> : <task>\n\
             After all tasks are complete, summarize the findings and end with \"TERMINATE\".",
        );

    let web_search_agent = Agent::new(
        "WebSearchAgent",
        "Searches information using tools.",
        client.clone(),
    )
    .with_system_message(
        "You are a web search agent. Your only tool is search_web_tool - use it to find information.\n\
         You make only one search call at a time. Once you have the results, you never do calculations.",
    )
    .with_tools(search_tools().await?);

    let data_analyst_agent = Agent::new("DataAnalystAgent", "Performs calculations.", client.clone())
        .with_system_message("You are a data analyst. Use the tools provided to compute numeric results.")
        .with_tools(analysis_tools().await?);

    let mut team = Team::new("demo-bot", "Demo Bot")
        .with_selector(ModelSelector::new(client).with_prompt(SELECTOR_PROMPT))
        .with_termination(TextMentionTermination::new("TERMINATE").or(MaxMessagesTermination::new(25)))
        .with_config(TeamConfig {
            allow_repeated_speaker: true,
            ..TeamConfig::default()
        })
        .with_event_handler(Arc::new(ConsoleRenderer::new()))
        .with_telemetry(telemetry.clone());
    team.add_participant(planning_agent)?;
    team.add_participant(web_search_agent)?;
    team.add_participant(data_analyst_agent)?;

    let cancel = team.cancellation_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let task = std::env::args().nth(1);
    let result = team.run(task.as_deref()).await?;
    log::info!(
        "run finished after {} turns and {} messages: {}",
        result.turns,
        result.messages.len(),
        result.stop_reason
    );

    let spans = telemetry.shutdown();
    log::info!("flushed {} spans", spans.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canned_search_results() {
        assert!(search_web("Miami Heat 2006-2007 points").contains("Dwayne Wade: 1397 points"));
        assert!(search_web("Wade rebounds 2008-2009").ends_with("398."));
        assert_eq!(search_web("weather"), "No data found.");
    }

    #[test]
    fn percentage_change_of_rebounds() {
        let change = percentage_change(&json!({"start": 214, "end": 398})).unwrap();
        assert!((change - 85.98130841121495).abs() < 1e-9);
        assert!(percentage_change(&json!({"start": 0, "end": 1})).is_err());
        assert!(percentage_change(&json!({"start": "x", "end": 1})).is_err());
    }
}
