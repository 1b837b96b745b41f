//! Speaker selection.
//!
//! Before each turn the [`Team`](crate::Team) builds a [`Roster`]: every participant, the
//! previous speaker, and the candidates allowed to speak next. With
//! `allow_repeated_speaker = false` the previous speaker is not a candidate, unless it is the
//! only participant. A selector returns a candidate's name; the team rejects anything else
//! with [`TeamError::SelectionFailed`], whatever the selector's mechanism.
//!
//! - [`RoundRobinSelector`]: rotates through participants in order.
//! - [`ModelSelector`]: asks a reasoning backend, using a prompt template.
//! - [`FnSelector`]: a host closure, deferring to another selector when it declines.

use crate::groupchat::client_wrapper::{ClientWrapper, Completion, Message, Role};
use crate::groupchat::error::TeamError;
use crate::groupchat::history::render_transcript;
use crate::groupchat::message::ChatMessage;
use async_trait::async_trait;
use std::sync::Arc;

/// Default prompt for [`ModelSelector`].
pub const DEFAULT_SELECTOR_PROMPT: &str = "You are in a role play game. The following roles are available:\n{roles}.\nRead the following conversation. Then select the next role from {participants} to play. Only return the role.\n\n{history}\n\nRead the above conversation. Then select the next role from {participants} to play. Only return the role.";

/// Name and description of a participant, as selectors see it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantInfo {
    pub name: String,
    pub description: String,
}

impl ParticipantInfo {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// Who may speak next.
#[derive(Debug, Clone)]
pub struct Roster<'a> {
    pub participants: &'a [ParticipantInfo],
    pub previous_speaker: Option<&'a str>,
    pub candidates: Vec<&'a ParticipantInfo>,
}

impl<'a> Roster<'a> {
    pub fn new(
        participants: &'a [ParticipantInfo],
        previous_speaker: Option<&'a str>,
        allow_repeated_speaker: bool,
    ) -> Self {
        let mut candidates: Vec<&ParticipantInfo> = participants
            .iter()
            .filter(|p| allow_repeated_speaker || Some(p.name.as_str()) != previous_speaker)
            .collect();
        // A lone participant always speaks again.
        if candidates.is_empty() {
            candidates = participants.iter().collect();
        }
        Self {
            participants,
            previous_speaker,
            candidates,
        }
    }

    pub fn is_candidate(&self, name: &str) -> bool {
        self.candidates.iter().any(|c| c.name == name)
    }

    pub fn candidate_names(&self) -> Vec<&'a str> {
        self.candidates.iter().map(|c| c.name.as_str()).collect()
    }
}

/// Decides who speaks next.
#[async_trait]
pub trait Selector: Send + Sync {
    async fn select_next(&self, roster: &Roster<'_>, history: &[ChatMessage]) -> Result<String, TeamError>;
}

/// Rotates through participants in the order they were added, skipping non-candidates.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoundRobinSelector;

#[async_trait]
impl Selector for RoundRobinSelector {
    async fn select_next(&self, roster: &Roster<'_>, _history: &[ChatMessage]) -> Result<String, TeamError> {
        let count = roster.participants.len();
        let start = roster
            .previous_speaker
            .and_then(|prev| roster.participants.iter().position(|p| p.name == prev))
            .map_or(0, |i| i + 1);

        (0..count)
            .map(|offset| &roster.participants[(start + offset) % count])
            .find(|p| roster.is_candidate(&p.name))
            .map(|p| p.name.clone())
            .ok_or_else(|| TeamError::SelectionFailed("no candidates".to_string()))
    }
}

/// Lets a reasoning backend pick the next speaker.
///
/// The prompt template may use `{roles}` (one `name: description` line per participant),
/// `{participants}` (the names of the current candidates as a list) and `{history}` (one `sender: text` line
/// per message). The reply must mention exactly one candidate by name.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use groupchat::clients::openai::OpenAIClient;
/// use groupchat::selector::ModelSelector;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let selector = ModelSelector::new(Arc::new(OpenAIClient::from_env("gpt-4o")?))
///     .with_prompt("Select an agent to perform task.\n\n{roles}\n\nCurrent conversation context:\n{history}\n\nOnly select one agent from {participants}.");
/// # Ok(())
/// # }
/// ```
pub struct ModelSelector {
    client: Arc<dyn ClientWrapper>,
    prompt: String,
}

impl ModelSelector {
    pub fn new(client: Arc<dyn ClientWrapper>) -> Self {
        Self {
            client,
            prompt: DEFAULT_SELECTOR_PROMPT.to_string(),
        }
    }

    pub fn with_prompt(mut self, template: impl Into<String>) -> Self {
        self.prompt = template.into();
        self
    }

    /// The template with every placeholder filled in.
    pub fn render_prompt(&self, roster: &Roster<'_>, history: &[ChatMessage]) -> String {
        let roles = roster
            .participants
            .iter()
            .map(|c| format!("{}: {}", c.name, c.description))
            .collect::<Vec<_>>()
            .join("\n");
        let participants = format!("[{}]", roster.candidate_names().join(", "));
        self.prompt
            .replace("{roles}", &roles)
            .replace("{participants}", &participants)
            .replace("{history}", &render_transcript(history))
    }
}

#[async_trait]
impl Selector for ModelSelector {
    async fn select_next(&self, roster: &Roster<'_>, history: &[ChatMessage]) -> Result<String, TeamError> {
        if roster.candidates.len() == 1 {
            return Ok(roster.candidates[0].name.clone());
        }

        let prompt = [Message::new(Role::System, self.render_prompt(roster, history))];
        let reply = match self.client.send_message(&prompt, &[]).await {
            Ok(Completion::Text(text)) => text,
            Ok(Completion::ToolCalls(_)) => {
                return Err(TeamError::SelectionFailed(
                    "selector model requested a tool instead of naming a speaker".to_string(),
                ))
            }
            Err(e) => return Err(TeamError::SelectionFailed(e.to_string())),
        };

        let mentioned = mentioned_candidates(&reply, &roster.candidate_names());
        match mentioned.as_slice() {
            [only] => {
                log::debug!("selector model picked '{}'", only);
                Ok((*only).to_string())
            }
            [] => Err(TeamError::SelectionFailed(format!(
                "reply names no candidate: {}",
                reply
            ))),
            several => Err(TeamError::SelectionFailed(format!(
                "reply names several candidates ({}): {}",
                several.join(", "),
                reply
            ))),
        }
    }
}

/// Candidates mentioned as whole words in `reply`, in candidate order.
///
/// A match lying inside a match of a longer candidate does not count, so `Agent-2` names only
/// `Agent-2` even when `Agent` is also a candidate.
pub fn mentioned_candidates<'a>(reply: &str, candidates: &[&'a str]) -> Vec<&'a str> {
    let matches: Vec<(&'a str, Vec<(usize, usize)>)> = candidates
        .iter()
        .map(|name| (*name, word_matches(reply, name)))
        .collect();
    matches
        .iter()
        .filter(|(name, spans)| {
            spans.iter().any(|&(start, end)| {
                !matches.iter().any(|(other, others)| {
                    other.len() > name.len()
                        && others.iter().any(|&(s, e)| s <= start && end <= e)
                })
            })
        })
        .map(|(name, _)| *name)
        .collect()
}

/// Byte ranges where `name` occurs in `text` as a whole word.
fn word_matches(text: &str, name: &str) -> Vec<(usize, usize)> {
    if name.is_empty() {
        return Vec::new();
    }
    let is_word = |c: char| c.is_alphanumeric() || c == '_';
    text.match_indices(name)
        .filter(|(start, _)| {
            let before = text[..*start].chars().next_back();
            let after = text[start + name.len()..].chars().next();
            !before.map_or(false, is_word) && !after.map_or(false, is_word)
        })
        .map(|(start, _)| (start, start + name.len()))
        .collect()
}

/// Host-supplied selection function.
pub type SelectorFunction =
    Arc<dyn Fn(&Roster<'_>, &[ChatMessage]) -> Option<String> + Send + Sync>;

/// Runs a closure first and defers to `fallback` when it returns `None`.
///
/// ```rust
/// use std::sync::Arc;
/// use groupchat::selector::{FnSelector, RoundRobinSelector, Roster};
/// use groupchat::{ChatMessage, Sender};
///
/// // The planner speaks after anyone else; otherwise rotate.
/// let selector = FnSelector::new(
///     Arc::new(|_roster: &Roster<'_>, history: &[ChatMessage]| match history.last().map(|m| &m.sender) {
///         Some(Sender::Agent(name)) if name != "PlanningAgent" => Some("PlanningAgent".to_string()),
///         _ => None,
///     }),
///     RoundRobinSelector,
/// );
/// ```
pub struct FnSelector {
    function: SelectorFunction,
    fallback: Box<dyn Selector>,
}

impl FnSelector {
    pub fn new<S: Selector + 'static>(function: SelectorFunction, fallback: S) -> Self {
        Self {
            function,
            fallback: Box::new(fallback),
        }
    }
}

#[async_trait]
impl Selector for FnSelector {
    async fn select_next(&self, roster: &Roster<'_>, history: &[ChatMessage]) -> Result<String, TeamError> {
        match (self.function)(roster, history) {
            Some(name) => Ok(name),
            None => self.fallback.select_next(roster, history).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_word_mentions_only() {
        let candidates = ["WebSearchAgent", "DataAnalystAgent", "Search"];
        assert_eq!(
            mentioned_candidates("I pick WebSearchAgent.", &candidates),
            vec!["WebSearchAgent"]
        );
        assert_eq!(
            mentioned_candidates("DataAnalystAgent, then Search", &candidates),
            vec!["DataAnalystAgent", "Search"]
        );
        assert!(mentioned_candidates("nobody", &candidates).is_empty());
        assert!(mentioned_candidates("Searching", &["Search"]).is_empty());
    }

    #[test]
    fn longer_names_shadow_their_prefixes() {
        let candidates = ["Agent", "Agent-2"];
        assert_eq!(mentioned_candidates("Agent-2", &candidates), vec!["Agent-2"]);
        assert_eq!(mentioned_candidates("Agent-2 should go.", &candidates), vec!["Agent-2"]);
        assert_eq!(mentioned_candidates("Agent", &candidates), vec!["Agent"]);
        assert_eq!(
            mentioned_candidates("Agent, not Agent-2", &candidates),
            vec!["Agent", "Agent-2"]
        );
        assert_eq!(mentioned_candidates("data.Agent", &["Agent", "data.Agent"]), vec!["data.Agent"]);
    }

    #[test]
    fn roster_excludes_previous_speaker_unless_alone() {
        let team = vec![ParticipantInfo::new("a", ""), ParticipantInfo::new("b", "")];
        let roster = Roster::new(&team, Some("a"), false);
        assert_eq!(roster.candidate_names(), vec!["b"]);

        let roster = Roster::new(&team, Some("a"), true);
        assert_eq!(roster.candidate_names(), vec!["a", "b"]);

        let solo = vec![ParticipantInfo::new("only", "")];
        let roster = Roster::new(&solo, Some("only"), false);
        assert_eq!(roster.candidate_names(), vec!["only"]);
    }
}
