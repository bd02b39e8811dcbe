//! Error taxonomy for the voice pipeline
//!
//! Every stage converts its own faults into one of these variants; nothing
//! escapes to kill the process. Each variant maps to a stable wire
//! `error_type` string so clients can branch on it.

use thiserror::Error;

/// Result alias used across the workspace
pub type Result<T> = std::result::Result<T, Error>;

/// Reason the audio-quality gate rejected an utterance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// RMS energy below the floor - likely silence or line noise
    LowEnergy,
    /// Too few frames above the activity floor - no sustained speech
    LowVoiceActivity,
    /// Buffer too short to contain an utterance
    TooShort,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::LowEnergy => write!(f, "low_energy"),
            RejectReason::LowVoiceActivity => write!(f, "low_voice_activity"),
            RejectReason::TooShort => write!(f, "too_short"),
        }
    }
}

/// Pipeline errors
#[derive(Error, Debug)]
pub enum Error {
    /// Connection dropped or unsendable. The send is dropped locally; the
    /// session survives until the transport is proven dead.
    #[error("transport error: {0}")]
    Transport(String),

    /// Audio rejected by the quality gate before ASR. Benign - the turn
    /// short-circuits with a "no speech" signal, not an error event.
    #[error("audio rejected: {0}")]
    AudioRejected(RejectReason),

    /// Both the remote ASR path and the local fallback failed
    #[error("ASR unavailable: {0}")]
    AsrUnavailable(String),

    /// LLM collaborator failed mid-turn
    #[error("LLM failure: {0}")]
    Llm(String),

    /// TTS collaborator failed mid-turn
    #[error("TTS failure: {0}")]
    Tts(String),

    /// External transcoder failed; carries the tool diagnostics
    #[error("audio conversion failed: {0}")]
    Conversion(String),

    /// Malformed inbound message - logged and ignored, never fatal
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Session bookkeeping error (unknown id, capacity, handshake exhausted)
    #[error("session error: {0}")]
    Session(String),

    /// Configuration error
    #[error("config error: {0}")]
    Config(String),
}

impl Error {
    /// Stable wire identifier for `error{error_type, message}` events
    pub fn error_type(&self) -> &'static str {
        match self {
            Error::Transport(_) => "transport_error",
            Error::AudioRejected(_) => "no_speech",
            Error::AsrUnavailable(_) => "asr_processing_failed",
            Error::Llm(_) => "llm_generation_failed",
            Error::Tts(_) => "tts_synthesis_failed",
            Error::Conversion(_) => "audio_conversion_failed",
            Error::InvalidMessage(_) => "invalid_message",
            Error::Session(_) => "session_error",
            Error::Config(_) => "config_error",
        }
    }

    /// Whether this error should terminate the current turn only,
    /// leaving the session open
    pub fn is_turn_scoped(&self) -> bool {
        matches!(
            self,
            Error::AsrUnavailable(_)
                | Error::Llm(_)
                | Error::Tts(_)
                | Error::Conversion(_)
                | Error::AudioRejected(_)
        )
    }
}
