//! The turn scheduler.
//!
//! A [`Team`] owns a fixed, ordered set of participants, a [`Selector`], an optional
//! [`TerminationCondition`] and the run's [`History`]. It moves through
//! `Idle → Running → Terminated` exactly once.
//!
//! # Run loop
//!
//! ```text
//! append task message (sender: user) ── evaluate termination
//! loop:
//!   cancelled?            → Terminated(Cancelled)
//!   turn cap reached?     → Terminated(SafetyCapReached)
//!   select speaker        (retry with backoff, then Aborted)
//!   speaker.take_turn     (retry with backoff, then Aborted)
//!   append the turn       (message cap → SafetyCapReached)
//!     per message: emit MessageAppended, evaluate termination
//!   condition met?        → Terminated(ConditionMet)
//! ```
//!
//! Turns are strictly sequential. A turn is appended all at once after it completes, so a
//! cancelled or failed turn never leaves part of itself in the History.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use groupchat::clients::openai::OpenAIClient;
//! use groupchat::selector::ModelSelector;
//! use groupchat::termination::{MaxMessagesTermination, TerminationCondition, TextMentionTermination};
//! use groupchat::{Agent, Team, TeamConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Arc::new(OpenAIClient::from_env("gpt-4o")?);
//!
//!     let mut team = Team::new("research", "Research Team")
//!         .with_selector(ModelSelector::new(client.clone()))
//!         .with_termination(TextMentionTermination::new("TERMINATE").or(MaxMessagesTermination::new(25)))
//!         .with_config(TeamConfig { allow_repeated_speaker: true, ..TeamConfig::default() });
//!     team.add_participant(Agent::new("PlanningAgent", "Plans tasks and delegates.", client.clone()))?;
//!     team.add_participant(Agent::new("WebSearchAgent", "Searches information using tools.", client))?;
//!
//!     let cancel = team.cancellation_handle();
//!     tokio::spawn(async move {
//!         tokio::signal::ctrl_c().await.ok();
//!         cancel.cancel();
//!     });
//!
//!     let result = team.run(None).await?;
//!     println!("{} after {} turns", result.stop_reason, result.turns);
//!     Ok(())
//! }
//! ```

use crate::groupchat::agent::Participant;
use crate::groupchat::config::TeamConfig;
use crate::groupchat::error::{CapKind, TeamError};
use crate::groupchat::event::{ChannelHandler, EventDispatcher, EventHandler, TeamEvent};
use crate::groupchat::history::History;
use crate::groupchat::message::{ChatMessage, MessageDraft};
use crate::groupchat::selector::{ParticipantInfo, RoundRobinSelector, Roster, Selector};
use crate::groupchat::telemetry::{self, Telemetry};
use crate::groupchat::termination::{StopSignal, TerminationCondition};
use futures_util::stream::{self, Stream};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// Why a run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum StopReason {
    /// The termination condition fired.
    ConditionMet(StopSignal),
    /// The host cancelled the run.
    Cancelled,
    /// A step kept failing after every retry. Carries the last error.
    Aborted(TeamError),
    /// A message or turn cap was hit. Carries the `CapacityExceeded` error.
    SafetyCapReached(TeamError),
}

impl StopReason {
    /// The signal of the condition that fired, if that is why the run ended.
    pub fn signal(&self) -> Option<&StopSignal> {
        match self {
            StopReason::ConditionMet(signal) => Some(signal),
            _ => None,
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::ConditionMet(signal) => write!(f, "{}: {}", signal.condition, signal.reason),
            StopReason::Cancelled => write!(f, "Cancelled"),
            StopReason::Aborted(err) => write!(f, "Aborted: {}", err),
            StopReason::SafetyCapReached(err) => write!(f, "Safety cap reached: {}", err),
        }
    }
}

/// Lifecycle of a team.
#[derive(Debug, Clone, PartialEq)]
pub enum TeamState {
    Idle,
    Running,
    Terminated(StopReason),
}

/// Outcome of [`Team::run`].
#[derive(Debug, Clone)]
pub struct TaskResult {
    /// The full History, task message first.
    pub messages: Vec<ChatMessage>,
    pub stop_reason: StopReason,
    /// Completed turns, not counting the task message.
    pub turns: usize,
}

/// Requests cancellation of a run from outside it.
///
/// Cancellation takes effect between turns. A selection, turn or retry backoff that is in
/// flight is abandoned and contributes nothing to the History.
#[derive(Clone)]
pub struct CancellationHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl CancellationHandle {
    fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    async fn cancelled(&self) {
        let mut receiver = self.sender.subscribe();
        let closed = receiver.wait_for(|cancelled| *cancelled).await.is_err();
        if closed {
            futures_util::future::pending::<()>().await;
        }
    }

    /// Run `work` unless cancellation arrives first.
    async fn race<F: Future>(&self, work: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            _ = self.cancelled() => None,
            output = work => Some(output),
        }
    }
}

/// A single-use team of participants taking turns on a shared History.
pub struct Team {
    id: String,
    name: String,
    participants: Vec<Box<dyn Participant>>,
    infos: Vec<ParticipantInfo>,
    selector: Box<dyn Selector>,
    termination: Option<Box<dyn TerminationCondition>>,
    config: TeamConfig,
    history: History,
    state: TeamState,
    events: EventDispatcher,
    telemetry: Arc<Telemetry>,
    cancellation: CancellationHandle,
    previous_speaker: Option<usize>,
    turns: usize,
}

impl Team {
    /// An idle team with round-robin selection, no termination condition and default config.
    pub fn new(id: &str, name: &str) -> Self {
        let config = TeamConfig::default();
        Self {
            id: id.to_string(),
            name: name.to_string(),
            participants: Vec::new(),
            infos: Vec::new(),
            selector: Box::new(RoundRobinSelector),
            termination: None,
            events: EventDispatcher::new(config.event_timeout),
            config,
            history: History::new(),
            state: TeamState::Idle,
            telemetry: Telemetry::disabled(),
            cancellation: CancellationHandle::new(),
            previous_speaker: None,
            turns: 0,
        }
    }

    pub fn with_selector<S: Selector + 'static>(mut self, selector: S) -> Self {
        self.selector = Box::new(selector);
        self
    }

    /// Set the stopping condition. Its state is reset here and nowhere else.
    pub fn with_termination<T: TerminationCondition + 'static>(mut self, mut condition: T) -> Self {
        condition.reset();
        self.termination = Some(Box::new(condition));
        self
    }

    pub fn with_config(mut self, config: TeamConfig) -> Self {
        self.events.set_timeout(config.event_timeout);
        self.config = config;
        self
    }

    /// Register a handler for team and agent events. May be called several times.
    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.events.add_handler(handler);
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<Telemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Add a participant. Names must be unique and the team must not have started.
    pub fn add_participant<P: Participant + 'static>(&mut self, participant: P) -> Result<(), TeamError> {
        if self.state != TeamState::Idle {
            return Err(TeamError::InvalidState(
                "participants are fixed once a run has started".to_string(),
            ));
        }
        if self.infos.iter().any(|p| p.name == participant.name()) {
            return Err(TeamError::DuplicateParticipant(participant.name().to_string()));
        }
        self.infos.push(ParticipantInfo::new(
            participant.name(),
            participant.description(),
        ));
        self.participants.push(Box::new(participant));
        Ok(())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn participants(&self) -> &[ParticipantInfo] {
        &self.infos
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn state(&self) -> &TeamState {
        &self.state
    }

    pub fn turns(&self) -> usize {
        self.turns
    }

    pub fn cancellation_handle(&self) -> CancellationHandle {
        self.cancellation.clone()
    }

    /// Run the team on `task` until it terminates.
    ///
    /// `None` or a blank task uses [`TeamConfig::default_task`]. Only configuration problems
    /// are returned as `Err`; every way a started run can end is a [`StopReason`].
    pub async fn run(&mut self, task: Option<&str>) -> Result<TaskResult, TeamError> {
        match self.state {
            TeamState::Idle => {}
            TeamState::Running => {
                return Err(TeamError::InvalidState("the team is already running".to_string()))
            }
            TeamState::Terminated(_) => {
                return Err(TeamError::InvalidState(
                    "a team runs only once; build a new team for another task".to_string(),
                ))
            }
        }
        if self.participants.is_empty() {
            return Err(TeamError::NoParticipants);
        }

        self.state = TeamState::Running;
        if let Some(limit) = self.config.max_messages {
            self.history = History::with_capacity_limit(limit);
        }
        for participant in self.participants.iter_mut() {
            participant.set_event_dispatcher(self.events.clone());
        }

        let task = task
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| self.config.default_task.as_str())
            .to_string();
        let participant_names: Vec<String> = self.infos.iter().map(|p| p.name.clone()).collect();

        let span = self.telemetry.run_span(&self.id, &participant_names);
        log::info!("team '{}' starting with {} participants", self.name, participant_names.len());

        self.events
            .team(&TeamEvent::RunStarted {
                team_id: self.id.clone(),
                task: task.clone(),
                participants: participant_names,
            })
            .await;

        let stop_reason = self.drive(task, &span).await;

        match &stop_reason {
            StopReason::Aborted(err) => log::error!("team '{}' aborted: {}", self.name, err),
            other => log::info!("team '{}' terminated: {}", self.name, other),
        }
        span.record("team.turns", self.turns as u64);
        span.record("team.stop_reason", tracing::field::display(&stop_reason));
        telemetry::record_status(
            &span,
            !matches!(stop_reason, StopReason::Aborted(_) | StopReason::SafetyCapReached(_)),
        );
        drop(span);

        self.state = TeamState::Terminated(stop_reason.clone());
        self.events
            .team(&TeamEvent::Terminated {
                stop_reason: stop_reason.clone(),
                message_count: self.history.len(),
                turns: self.turns,
            })
            .await;

        Ok(TaskResult {
            messages: self.history.snapshot().to_vec(),
            stop_reason,
            turns: self.turns,
        })
    }

    /// Start the run in a background task and stream its [`TeamEvent`]s.
    ///
    /// The stream ends after [`TeamEvent::Terminated`]. Must be called within a Tokio runtime.
    /// Take a [`cancellation_handle`](Team::cancellation_handle) first if the run may need
    /// cancelling.
    pub fn run_stream(mut self, task: Option<String>) -> impl Stream<Item = TeamEvent> + Send + 'static {
        let (sender, receiver) = mpsc::channel(self.config.stream_buffer.max(1));
        self.events.add_handler(Arc::new(ChannelHandler::new(sender)));

        tokio::spawn(async move {
            if let Err(e) = self.run(task.as_deref()).await {
                log::error!("team '{}' could not start: {}", self.name, e);
            }
        });

        stream::unfold(receiver, |mut receiver| async move {
            receiver.recv().await.map(|event| (event, receiver))
        })
    }

    async fn drive(&mut self, task: String, run_span: &tracing::Span) -> StopReason {
        match self.append(vec![MessageDraft::task(task)]).await {
            Ok(Some(signal)) => return StopReason::ConditionMet(signal),
            Ok(None) => {}
            Err(err) => return StopReason::SafetyCapReached(err),
        }

        loop {
            if self.cancellation.is_cancelled() {
                return StopReason::Cancelled;
            }
            if let Some(max) = self.config.max_turns {
                if self.turns >= max {
                    return StopReason::SafetyCapReached(TeamError::CapacityExceeded {
                        cap: CapKind::Turns,
                        limit: max,
                    });
                }
            }

            let turn = self.turns + 1;
            let speaker = match self.select_speaker(turn).await {
                Ok(index) => index,
                Err(stop) => return stop,
            };

            let span = self.telemetry.turn_span(run_span, turn, &self.infos[speaker].name);
            let drafts = match self.take_turn(turn, speaker).await {
                Ok(drafts) => drafts,
                Err(stop) => {
                    telemetry::record_status(&span, false);
                    return stop;
                }
            };
            span.record("messages", drafts.len() as u64);
            telemetry::record_status(&span, true);
            drop(span);

            let appended = self.append(drafts).await;
            if appended.is_ok() {
                self.turns = turn;
                self.previous_speaker = Some(speaker);
            }
            match appended {
                Ok(Some(signal)) => return StopReason::ConditionMet(signal),
                Ok(None) => {}
                Err(err) => return StopReason::SafetyCapReached(err),
            }
        }
    }

    async fn select_speaker(&self, turn: usize) -> Result<usize, StopReason> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let previous = self.previous_speaker.map(|i| self.infos[i].name.as_str());
            let roster = Roster::new(&self.infos, previous, self.config.allow_repeated_speaker);

            let selection = self
                .cancellation
                .race(self.selector.select_next(&roster, self.history.snapshot()))
                .await
                .ok_or(StopReason::Cancelled)?;

            let error = match selection {
                Ok(name) if roster.is_candidate(&name) => {
                    log::debug!("turn {}: '{}' selected", turn, name);
                    self.events
                        .team(&TeamEvent::SpeakerSelected {
                            turn,
                            agent: name.clone(),
                        })
                        .await;
                    let index = self.infos.iter().position(|p| p.name == name);
                    match index {
                        Some(index) => return Ok(index),
                        None => TeamError::SelectionFailed(format!("unknown participant '{}'", name)),
                    }
                }
                Ok(name) => TeamError::SelectionFailed(format!(
                    "'{}' is not an eligible speaker (candidates: {})",
                    name,
                    roster.candidate_names().join(", ")
                )),
                Err(err) => err,
            };

            self.retry_or_stop(turn, None, error, attempt).await?;
        }
    }

    async fn take_turn(&self, turn: usize, speaker: usize) -> Result<Vec<MessageDraft>, StopReason> {
        let participant = &self.participants[speaker];
        let mut attempt = 0;
        loop {
            attempt += 1;
            let outcome = self
                .cancellation
                .race(participant.take_turn(self.history.snapshot()))
                .await
                .ok_or(StopReason::Cancelled)?;

            match outcome {
                Ok(drafts) => return Ok(drafts),
                Err(error) => {
                    self.retry_or_stop(turn, Some(participant.name().to_string()), error, attempt)
                        .await?
                }
            }
        }
    }

    /// Report a failed attempt and wait out the backoff, or say how the run stops.
    async fn retry_or_stop(
        &self,
        turn: usize,
        agent: Option<String>,
        error: TeamError,
        attempt: u32,
    ) -> Result<(), StopReason> {
        if error == TeamError::Cancelled {
            return Err(StopReason::Cancelled);
        }
        let policy = &self.config.retry;
        let will_retry = error.is_retryable() && attempt <= policy.max_retries;

        self.events
            .team(&TeamEvent::TurnFailed {
                turn,
                agent: agent.clone(),
                error: error.clone(),
                attempt,
                will_retry,
            })
            .await;

        if !will_retry {
            return Err(match error {
                TeamError::CapacityExceeded { .. } => StopReason::SafetyCapReached(error),
                _ => StopReason::Aborted(error),
            });
        }

        let delay = policy.delay_for(attempt - 1);
        log::warn!(
            "turn {} attempt {} failed ({}), retrying in {:?}: {}",
            turn,
            attempt,
            agent.as_deref().unwrap_or("selection"),
            delay,
            error
        );
        if !delay.is_zero() {
            self.cancellation
                .race(tokio::time::sleep(delay))
                .await
                .ok_or(StopReason::Cancelled)?;
        }
        Ok(())
    }

    /// Append a turn atomically, then publish and evaluate each message in order.
    async fn append(&mut self, drafts: Vec<MessageDraft>) -> Result<Option<StopSignal>, TeamError> {
        let appended = self.history.append_turn(drafts)?.to_vec();
        let mut signal = None;
        for message in appended {
            self.events
                .team(&TeamEvent::MessageAppended(message.clone()))
                .await;
            if let Some(condition) = self.termination.as_mut() {
                let prefix = &self.history.snapshot()[..message.sequence_number as usize];
                if let Some(fired) = condition.evaluate(prefix) {
                    if signal.is_none() {
                        log::debug!(
                            "message #{} met {}: {}",
                            message.sequence_number,
                            fired.condition,
                            fired.reason
                        );
                        signal = Some(fired);
                    }
                }
            }
        }
        Ok(signal)
    }
}
