//! Per-session dialog state
//!
//! Owned by the session, borrowed by the pipeline for the duration of a
//! turn. The interrupt flag is deliberately *not* here - it is the only
//! cross-thread field and lives in `InterruptFlag`.

use voice_assistant_core::{Message, VoiceOptions};

/// Conversation turns kept for LLM context
const HISTORY_CAP: usize = 16;

/// Mutable conversation state for one session
#[derive(Debug, Default)]
pub struct DialogState {
    /// Recent conversation messages (user/assistant alternating)
    pub history: Vec<Message>,
    /// Last full response spoken, for Repeat/DeepDive
    pub last_response: Option<String>,
    /// Cursor into the current news briefing, advanced by Skip
    pub current_news_item_index: usize,
    /// Voice rendering options mutated by volume/speed commands
    pub voice: VoiceOptions,
}

impl DialogState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed exchange, trimming history to the context cap
    pub fn record_exchange(&mut self, user_text: &str, response: &str) {
        self.history.push(Message::user(user_text));
        self.history.push(Message::assistant(response));
        if self.history.len() > HISTORY_CAP {
            let excess = self.history.len() - HISTORY_CAP;
            self.history.drain(..excess);
        }
        self.last_response = Some(response.to_string());
    }
}
