//! Pipeline events
//!
//! Typed events emitted by the turn pipeline and translated by a transport
//! adapter into wire frames (networked) or playback actions (local).

use voice_assistant_core::{AudioFormat, SampleRate};

/// Events produced while driving one turn
#[derive(Debug, Clone)]
pub enum TurnEvent {
    /// Final transcript for the utterance that started the turn
    Transcription { text: String, confidence: f32 },
    /// Streamed response text fragment
    ResponseChunk { text: String },
    /// Synthesized audio chunk, in generation order
    TtsChunk {
        audio: Vec<u8>,
        chunk_index: usize,
        format: AudioFormat,
        sample_rate: SampleRate,
    },
    /// Response finished cleanly
    StreamingComplete { total_chunks: usize },
    /// Response cut short by the interrupt controller
    StreamingInterrupted { total_chunks: usize },
    /// Quality gate rejected the audio; benign
    NoSpeech { reason: String },
    /// A stage failed; the turn is over, the session is not
    TurnError {
        error_type: &'static str,
        message: String,
    },
}
