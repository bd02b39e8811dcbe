//! Collaborator traits
//!
//! The pipeline calls these services but does not implement them; concrete
//! adapters live in the pipeline/llm crates, mocks live in tests.

mod llm;
mod speech;
mod store;
mod transcode;

pub use llm::LanguageModel;
pub use speech::{AudioChunk, SpeechToText, TextToSpeech, VoiceOptions};
pub use store::SessionStore;
pub use transcode::Transcoder;
