//! Team configuration.
//!
//! Plain structs with sensible defaults; construct them in code however you like.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use groupchat::{RetryPolicy, TeamConfig};
//!
//! let config = TeamConfig {
//!     allow_repeated_speaker: true,
//!     max_turns: Some(20),
//!     retry: RetryPolicy {
//!         max_retries: 1,
//!         initial_backoff: Duration::from_millis(0),
//!         ..RetryPolicy::default()
//!     },
//!     ..TeamConfig::default()
//! };
//! assert_eq!(config.max_messages, None);
//! ```

use std::time::Duration;

/// Task used when a run is started without one.
pub const DEFAULT_TASK: &str =
    "Who was the Miami Heat player with the highest points in the 2006-2007 season, and what was the percentage change in his total rebounds between the 2007-2008 and 2008-2009 seasons?";

/// Bounded retry with exponential backoff for selection and turn failures.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt. `0` disables retrying.
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub backoff_multiplier: u32,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (0-based).
    ///
    /// ```rust
    /// use std::time::Duration;
    /// use groupchat::RetryPolicy;
    ///
    /// let policy = RetryPolicy::default();
    /// assert_eq!(policy.delay_for(0), Duration::from_millis(500));
    /// assert_eq!(policy.delay_for(1), Duration::from_secs(1));
    /// assert_eq!(policy.delay_for(10), Duration::from_secs(10));
    /// ```
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.saturating_pow(attempt);
        self.initial_backoff
            .checked_mul(factor)
            .map_or(self.max_backoff, |d| d.min(self.max_backoff))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff: Duration::from_millis(500),
            backoff_multiplier: 2,
            max_backoff: Duration::from_secs(10),
        }
    }
}

/// Scheduler settings for a [`Team`](crate::Team).
#[derive(Debug, Clone)]
pub struct TeamConfig {
    /// Whether the same agent may speak in consecutive turns.
    pub allow_repeated_speaker: bool,
    /// Hard cap on the number of turns, a last-resort guard against a condition that never fires.
    pub max_turns: Option<usize>,
    /// Hard cap on the number of History messages.
    pub max_messages: Option<usize>,
    pub retry: RetryPolicy,
    /// Upper bound on one event delivery to one handler.
    pub event_timeout: Duration,
    /// Capacity of the channel behind [`Team::run_stream`](crate::Team::run_stream).
    pub stream_buffer: usize,
    /// Used when `run` receives no task or a blank one.
    pub default_task: String,
}

impl Default for TeamConfig {
    fn default() -> Self {
        Self {
            allow_repeated_speaker: false,
            max_turns: Some(100),
            max_messages: None,
            retry: RetryPolicy::default(),
            event_timeout: Duration::from_secs(5),
            stream_buffer: 64,
            default_task: DEFAULT_TASK.to_string(),
        }
    }
}
