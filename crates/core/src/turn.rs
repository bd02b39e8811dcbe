//! Per-turn telemetry

use std::time::Duration;

/// Outcome of one user-utterance-to-response cycle
///
/// Produced once per non-cancelled turn and consumed by telemetry only;
/// nothing in the core persists it.
#[derive(Debug, Clone, Default)]
pub struct TurnResult {
    /// What the user said (final transcript)
    pub transcription: String,
    /// Full assistant response text (all streamed chunks joined)
    pub response_text: String,
    /// Number of TTS audio chunks emitted to the transport
    pub audio_chunks_emitted: usize,
    /// Wall-clock time for the whole turn
    pub processing_time: Duration,
    /// Wire error type, if the turn ended in a stage failure
    pub error: Option<String>,
    /// Whether the turn was cut short by an interrupt
    pub interrupted: bool,
}

impl TurnResult {
    /// Whether the turn completed with a spoken response
    pub fn completed(&self) -> bool {
        self.error.is_none() && !self.interrupted
    }
}
