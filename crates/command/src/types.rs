//! Command and priority types

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Pending commands older than this are re-keyed to `Priority::Expired`
/// when the queue is next inspected.
pub const COMMAND_EXPIRY: Duration = Duration::from_secs(5);

/// What the user asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    /// Stop speaking / cancel the current response
    Stop,
    /// Keep going with the current topic
    Continue,
    /// Move to the next item
    Skip,
    /// Say the last response again
    Repeat,
    /// Expand on the last response
    DeepDive,
    /// News query (also the fallback for unmatched text)
    NewsRequest,
    /// Stock/market query
    StockRequest,
    /// Weather query
    WeatherRequest,
    VolumeUp,
    VolumeDown,
    SpeedUp,
    SpeedDown,
    Help,
    Settings,
}

impl CommandKind {
    /// Base priority for this kind, before lexical cues are applied
    pub fn base_priority(&self) -> Priority {
        match self {
            CommandKind::Stop => Priority::Immediate,
            CommandKind::Continue
            | CommandKind::Skip
            | CommandKind::Repeat
            | CommandKind::DeepDive => Priority::Contextual,
            CommandKind::NewsRequest
            | CommandKind::StockRequest
            | CommandKind::WeatherRequest
            | CommandKind::VolumeUp
            | CommandKind::VolumeDown
            | CommandKind::SpeedUp
            | CommandKind::SpeedDown
            | CommandKind::Help
            | CommandKind::Settings => Priority::Normal,
        }
    }

    /// Kinds that set the session interrupt flag at dispatch, aborting a
    /// previous turn's in-flight generation before the command is queued.
    pub fn interrupts_playback(&self) -> bool {
        matches!(self, CommandKind::Stop | CommandKind::DeepDive)
    }
}

/// Command urgency, most urgent first
///
/// Lower discriminant wins at the queue head; ties break on enqueue order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Barge-in class commands (stop)
    Immediate = 1,
    /// "actually / instead / wait" - supersedes pending normal work
    Refinement = 2,
    /// Meaning depends on recently produced content (deep-dive, skip)
    Contextual = 3,
    /// Fresh requests
    Normal = 4,
    /// Aged out (> 5s in queue), delivered last
    Expired = 5,
}

/// A classified user command
#[derive(Debug, Clone)]
pub struct Command {
    pub kind: CommandKind,
    /// Extracted argument, e.g. the query text for a request kind
    pub payload: Option<String>,
    /// The raw utterance this command came from
    pub origin_text: String,
    /// When the command was constructed
    pub created_at: Instant,
    /// Fixed at construction; re-keyed to Expired at dequeue if aged out
    pub priority: Priority,
}

impl Command {
    /// Create a command with the kind's base priority
    pub fn new(kind: CommandKind, origin_text: impl Into<String>) -> Self {
        Self {
            kind,
            payload: None,
            origin_text: origin_text.into(),
            created_at: Instant::now(),
            priority: kind.base_priority(),
        }
    }

    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Age of the command since construction
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Whether this command has aged past the expiry window
    pub fn is_expired(&self) -> bool {
        self.age() > COMMAND_EXPIRY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::Immediate < Priority::Refinement);
        assert!(Priority::Refinement < Priority::Contextual);
        assert!(Priority::Contextual < Priority::Normal);
        assert!(Priority::Normal < Priority::Expired);
    }

    #[test]
    fn test_base_priorities() {
        assert_eq!(CommandKind::Stop.base_priority(), Priority::Immediate);
        assert_eq!(CommandKind::DeepDive.base_priority(), Priority::Contextual);
        assert_eq!(CommandKind::NewsRequest.base_priority(), Priority::Normal);
        assert_eq!(CommandKind::VolumeUp.base_priority(), Priority::Normal);
    }

    #[test]
    fn test_interrupting_kinds() {
        assert!(CommandKind::Stop.interrupts_playback());
        assert!(CommandKind::DeepDive.interrupts_playback());
        assert!(!CommandKind::Skip.interrupts_playback());
        assert!(!CommandKind::NewsRequest.interrupts_playback());
    }
}
