mod common;

use common::*;
use groupchat::selector::{ModelSelector, ParticipantInfo, RoundRobinSelector, Roster, Selector};
use groupchat::termination::MaxMessagesTermination;
use groupchat::{
    ChatMessage, History, MessageDraft, MessageKind, Team, TeamConfig, TeamError, TeamEvent,
};

fn team_roster() -> Vec<ParticipantInfo> {
    vec![
        ParticipantInfo::new("PlanningAgent", "Plans tasks and delegates."),
        ParticipantInfo::new("WebSearchAgent", "Searches information using tools."),
        ParticipantInfo::new("DataAnalystAgent", "Performs calculations."),
    ]
}

fn task_history() -> Vec<ChatMessage> {
    let mut history = History::new();
    history.append(MessageDraft::task("find X")).unwrap();
    history
        .append(MessageDraft::text("PlanningAgent", "1. WebSearchAgent : find X"))
        .unwrap();
    history.snapshot().to_vec()
}

#[tokio::test]
async fn test_round_robin_rotates_in_insertion_order() {
    let infos = team_roster();
    let history = task_history();

    let first = Roster::new(&infos, None, false);
    assert_eq!(
        RoundRobinSelector.select_next(&first, &history).await.unwrap(),
        "PlanningAgent"
    );

    let last = Roster::new(&infos, Some("DataAnalystAgent"), false);
    assert_eq!(
        RoundRobinSelector.select_next(&last, &history).await.unwrap(),
        "PlanningAgent"
    );
}

#[tokio::test]
async fn test_model_selector_prompt_describes_everyone_but_offers_candidates() {
    let infos = team_roster();
    let roster = Roster::new(&infos, Some("PlanningAgent"), false);
    let selector = ModelSelector::new(ScriptedClient::new(vec![], "WebSearchAgent"))
        .with_prompt("{roles}\n--\n{history}\n--\n{participants}");

    assert_eq!(
        selector.render_prompt(&roster, &task_history()),
        "PlanningAgent: Plans tasks and delegates.\n\
         WebSearchAgent: Searches information using tools.\n\
         DataAnalystAgent: Performs calculations.\n--\n\
         user: find X\nPlanningAgent: 1. WebSearchAgent : find X\n--\n\
         [WebSearchAgent, DataAnalystAgent]"
    );
}

#[tokio::test]
async fn test_model_selector_parses_a_single_mention() {
    let infos = team_roster();
    let roster = Roster::new(&infos, Some("PlanningAgent"), false);
    let client = ScriptedClient::new(vec![text("I pick WebSearchAgent.")], "unused");
    let selector = ModelSelector::new(client.clone());

    let name = selector.select_next(&roster, &task_history()).await.unwrap();

    assert_eq!(name, "WebSearchAgent");
    assert_eq!(client.calls(), 1);
    assert!(client.prompts()[0][0].content.contains("DataAnalystAgent: Performs calculations."));
}

#[tokio::test]
async fn test_model_selector_rejects_ambiguous_or_missing_names() {
    let infos = team_roster();
    let roster = Roster::new(&infos, None, true);
    let selector = ModelSelector::new(ScriptedClient::new(
        vec![
            text("Either WebSearchAgent or DataAnalystAgent."),
            text("Nobody in particular."),
            text("WebSearchAgents"),
            fail("backend down"),
        ],
        "unused",
    ));

    for _ in 0..4 {
        assert!(matches!(
            selector.select_next(&roster, &task_history()).await,
            Err(TeamError::SelectionFailed(_))
        ));
    }
}

#[tokio::test]
async fn test_model_selector_prefers_the_longest_matching_name() {
    let infos = vec![
        ParticipantInfo::new("Agent", "First."),
        ParticipantInfo::new("Agent-2", "Second."),
    ];
    let roster = Roster::new(&infos, None, true);
    let selector = ModelSelector::new(ScriptedClient::new(
        vec![text("Agent-2"), text("Agent"), text("Agent or Agent-2")],
        "unused",
    ));

    assert_eq!(selector.select_next(&roster, &[]).await.unwrap(), "Agent-2");
    assert_eq!(selector.select_next(&roster, &[]).await.unwrap(), "Agent");
    assert!(matches!(
        selector.select_next(&roster, &[]).await,
        Err(TeamError::SelectionFailed(_))
    ));
}

#[tokio::test]
async fn test_model_selector_skips_the_backend_for_one_candidate() {
    let infos = vec![
        ParticipantInfo::new("PlanningAgent", "Plans."),
        ParticipantInfo::new("WebSearchAgent", "Searches."),
    ];
    let roster = Roster::new(&infos, Some("PlanningAgent"), false);
    let client = ScriptedClient::new(vec![], "PlanningAgent");
    let selector = ModelSelector::new(client.clone());

    let name = selector.select_next(&roster, &[]).await.unwrap();

    assert_eq!(name, "WebSearchAgent");
    assert_eq!(client.calls(), 0);
}

#[tokio::test]
async fn test_team_with_model_selector_follows_the_plan() {
    let selector_client = ScriptedClient::new(
        vec![
            text("PlanningAgent"),
            text("WebSearchAgent"),
            text("PlanningAgent"),
        ],
        "unused",
    );
    let recorder = Recorder::new();
    let mut team = Team::new("t", "Team")
        .with_selector(ModelSelector::new(selector_client.clone()))
        .with_termination(MaxMessagesTermination::new(6))
        .with_event_handler(recorder.clone())
        .with_config(TeamConfig {
            allow_repeated_speaker: true,
            ..fast_config()
        });
    team.add_participant(echo_agent("PlanningAgent", "1. WebSearchAgent : find X"))
        .unwrap();
    let (searcher, _) = scripted_agent(
        "WebSearchAgent",
        vec![call("s1", "search_web_tool", serde_json::json!({"query": "2006-2007"}))],
        "Dwayne Wade: 1397 points",
    );
    team.add_participant(searcher.with_tools(search_registry().await)).unwrap();

    let result = team.run(Some("find X")).await.unwrap();

    let selected: Vec<String> = recorder
        .events()
        .into_iter()
        .filter_map(|e| match e {
            TeamEvent::SpeakerSelected { agent, .. } => Some(agent),
            _ => None,
        })
        .collect();
    assert_eq!(selected, vec!["PlanningAgent", "WebSearchAgent", "PlanningAgent"]);
    assert_eq!(
        result.messages.iter().map(|m| m.kind()).collect::<Vec<_>>(),
        vec![
            MessageKind::Text,
            MessageKind::Text,
            MessageKind::ToolCall,
            MessageKind::ToolResult,
            MessageKind::Text,
            MessageKind::Text,
        ]
    );
    assert_eq!(selector_client.calls(), 3);
}
