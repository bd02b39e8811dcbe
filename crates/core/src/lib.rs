//! Core traits and types for the voice assistant
//!
//! This crate provides foundational types used across all other crates:
//! - Collaborator traits (STT, TTS, LLM, session store, transcoder)
//! - Audio format types and PCM helpers
//! - Transcript and turn-result types
//! - Error taxonomy

pub mod audio;
pub mod error;
pub mod llm_types;
pub mod traits;
pub mod transcript;
pub mod turn;

pub use audio::{f32_to_pcm16, pcm16_to_f32, rms_energy_db, AudioFormat, SampleRate};
pub use error::{Error, RejectReason, Result};
pub use llm_types::{FinishReason, GenerateRequest, GenerateResponse, Message, Role, StreamChunk};
pub use transcript::TranscriptResult;
pub use turn::TurnResult;

pub use traits::{
    AudioChunk, LanguageModel, SessionStore, SpeechToText, TextToSpeech, Transcoder, VoiceOptions,
};
