//! Turn pipeline
//!
//! Drives one user-utterance-to-response cycle with cancellation
//! checkpoints:
//!
//! `Idle -> Transcribing -> Classifying -> Dispatching -> Generating ->
//! Synthesizing -> Idle`, with `Interrupted -> Idle` reachable from
//! Generating/Synthesizing at every checkpoint.
//!
//! The crate also owns the pieces the pipeline is built from: the audio
//! intake buffer, the quality gate, the interrupt controller, the sentence
//! segmenter, the command dispatcher, and the concrete ASR/TTS/transcoder
//! adapters.

pub mod dialog;
pub mod dispatch;
pub mod events;
pub mod gate;
pub mod intake;
pub mod interrupt;
pub mod segment;
pub mod stt;
pub mod transcode;
pub mod tts;
pub mod turn;

pub use dialog::DialogState;
pub use dispatch::{Dispatcher, ResponsePlan};
pub use events::TurnEvent;
pub use gate::QualityGate;
pub use intake::AudioIntakeBuffer;
pub use interrupt::InterruptFlag;
pub use segment::SentenceSegmenter;
pub use stt::{HttpStt, HttpSttConfig, SttEngine};
pub use transcode::{pcm16_to_wav, FfmpegTranscoder};
pub use tts::{HttpTts, HttpTtsConfig};
pub use turn::{TurnPipeline, TurnPipelineConfig};
