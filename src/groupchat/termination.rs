//! Composable stopping conditions.
//!
//! The [`Team`](crate::Team) evaluates its condition exactly once after every appended
//! message, in append order, before requesting the next turn. The first [`StopSignal`] ends
//! the run.
//!
//! ```rust
//! use groupchat::termination::{MaxMessagesTermination, TerminationCondition, TextMentionTermination};
//!
//! let stop = TextMentionTermination::new("TERMINATE").or(MaxMessagesTermination::new(25));
//! assert_eq!(stop.name(), "TextMentionTermination | MaxMessagesTermination");
//! ```

use crate::groupchat::message::ChatMessage;

/// Why a condition fired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopSignal {
    /// Name of the condition that fired. For composites, the child's name.
    pub condition: String,
    pub reason: String,
}

impl StopSignal {
    pub fn new(condition: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            condition: condition.into(),
            reason: reason.into(),
        }
    }
}

/// A predicate over the History that may hold internal state between evaluations.
pub trait TerminationCondition: Send + Sync {
    fn name(&self) -> String;

    /// Evaluate after a message was appended. `history` ends with that message.
    fn evaluate(&mut self, history: &[ChatMessage]) -> Option<StopSignal>;

    /// Clear internal state.
    fn reset(&mut self);

    /// Met when either `self` or `other` is met; `self` is evaluated first.
    fn or<T>(self, other: T) -> OrTermination
    where
        Self: Sized + 'static,
        T: TerminationCondition + 'static,
    {
        OrTermination::new(vec![Box::new(self), Box::new(other)])
    }

    /// Met once both `self` and `other` have been met.
    fn and<T>(self, other: T) -> AndTermination
    where
        Self: Sized + 'static,
        T: TerminationCondition + 'static,
    {
        AndTermination::new(vec![Box::new(self), Box::new(other)])
    }
}

impl TerminationCondition for Box<dyn TerminationCondition> {
    fn name(&self) -> String {
        (**self).name()
    }

    fn evaluate(&mut self, history: &[ChatMessage]) -> Option<StopSignal> {
        (**self).evaluate(history)
    }

    fn reset(&mut self) {
        (**self).reset()
    }
}

/// Fires when the last appended message contains a marker (case-sensitive).
#[derive(Debug, Clone)]
pub struct TextMentionTermination {
    marker: String,
}

impl TextMentionTermination {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
        }
    }
}

impl TerminationCondition for TextMentionTermination {
    fn name(&self) -> String {
        "TextMentionTermination".to_string()
    }

    fn evaluate(&mut self, history: &[ChatMessage]) -> Option<StopSignal> {
        let last = history.last()?;
        if last.text().contains(&self.marker) {
            Some(StopSignal::new(
                self.name(),
                format!("Text '{}' mentioned by {}", self.marker, last.sender),
            ))
        } else {
            None
        }
    }

    fn reset(&mut self) {}
}

/// Fires when the History holds at least `max` messages, the task message included.
#[derive(Debug, Clone)]
pub struct MaxMessagesTermination {
    max: usize,
}

impl MaxMessagesTermination {
    pub fn new(max: usize) -> Self {
        Self { max }
    }
}

impl TerminationCondition for MaxMessagesTermination {
    fn name(&self) -> String {
        "MaxMessagesTermination".to_string()
    }

    fn evaluate(&mut self, history: &[ChatMessage]) -> Option<StopSignal> {
        if history.len() >= self.max {
            Some(StopSignal::new(
                self.name(),
                format!("Maximum number of messages {} reached, current message count: {}", self.max, history.len()),
            ))
        } else {
            None
        }
    }

    fn reset(&mut self) {}
}

/// Met when any child is met.
///
/// Every child sees every message, in insertion order, so stateful children stay current.
/// When several fire on the same message the lowest-index child is reported.
pub struct OrTermination {
    children: Vec<Box<dyn TerminationCondition>>,
    fired: Option<usize>,
}

impl OrTermination {
    pub fn new(children: Vec<Box<dyn TerminationCondition>>) -> Self {
        Self {
            children,
            fired: None,
        }
    }

    /// Append another child, evaluated after the existing ones.
    pub fn push<T: TerminationCondition + 'static>(mut self, child: T) -> Self {
        self.children.push(Box::new(child));
        self
    }

    /// Index of the child that fired, if any.
    pub fn fired_index(&self) -> Option<usize> {
        self.fired
    }
}

impl TerminationCondition for OrTermination {
    fn name(&self) -> String {
        self.children
            .iter()
            .map(|c| c.name())
            .collect::<Vec<_>>()
            .join(" | ")
    }

    fn evaluate(&mut self, history: &[ChatMessage]) -> Option<StopSignal> {
        let mut first = None;
        for (index, child) in self.children.iter_mut().enumerate() {
            if let Some(signal) = child.evaluate(history) {
                if first.is_none() {
                    first = Some((index, signal));
                }
            }
        }
        let (index, signal) = first?;
        if self.fired.is_none() {
            self.fired = Some(index);
        }
        Some(signal)
    }

    fn reset(&mut self) {
        self.fired = None;
        for child in &mut self.children {
            child.reset();
        }
    }
}

/// Met once every child has been met at least once.
pub struct AndTermination {
    children: Vec<Box<dyn TerminationCondition>>,
    signals: Vec<Option<StopSignal>>,
}

impl AndTermination {
    pub fn new(children: Vec<Box<dyn TerminationCondition>>) -> Self {
        let signals = vec![None; children.len()];
        Self { children, signals }
    }
}

impl TerminationCondition for AndTermination {
    fn name(&self) -> String {
        self.children
            .iter()
            .map(|c| c.name())
            .collect::<Vec<_>>()
            .join(" & ")
    }

    fn evaluate(&mut self, history: &[ChatMessage]) -> Option<StopSignal> {
        for (child, slot) in self.children.iter_mut().zip(self.signals.iter_mut()) {
            if slot.is_none() {
                *slot = child.evaluate(history);
            }
        }
        if self.children.is_empty() || self.signals.iter().any(Option::is_none) {
            return None;
        }
        let reason = self
            .signals
            .iter()
            .flatten()
            .map(|s| s.reason.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        Some(StopSignal::new(self.name(), reason))
    }

    fn reset(&mut self) {
        for (child, slot) in self.children.iter_mut().zip(self.signals.iter_mut()) {
            child.reset();
            *slot = None;
        }
    }
}
