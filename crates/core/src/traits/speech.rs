//! Speech processing traits

use crate::transcript::TranscriptResult;
use crate::{AudioFormat, Result, SampleRate};
use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// Speech-to-Text interface
///
/// Implementations:
/// - `HttpStt` - remote transcription service (primary path)
/// - local fallback engines, enabled by configuration
///
/// # Example
///
/// ```ignore
/// let stt: Arc<dyn SpeechToText> = Arc::new(HttpStt::new(config)?);
/// let transcript = stt.transcribe(&pcm, SampleRate::Hz16000, AudioFormat::Pcm16).await?;
/// println!("Transcribed: {}", transcript.text);
/// ```
#[async_trait]
pub trait SpeechToText: Send + Sync + 'static {
    /// Transcribe one buffered utterance
    ///
    /// # Arguments
    /// * `audio` - encoded audio bytes in `format`
    /// * `sample_rate` - sample rate of the audio
    /// * `format` - container/encoding of `audio`
    async fn transcribe(
        &self,
        audio: &[u8],
        sample_rate: SampleRate,
        format: AudioFormat,
    ) -> Result<TranscriptResult>;

    /// Engine name for logging
    fn engine_name(&self) -> &str;
}

/// Voice rendering options, mutable per session
///
/// The volume/speed voice commands adjust these between turns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceOptions {
    /// Voice/speaker ID understood by the TTS backend
    pub voice_id: Option<String>,
    /// Speaking rate multiplier (1.0 = normal), clamped to [0.5, 2.0]
    pub speaking_rate: f32,
    /// Output gain multiplier (1.0 = normal), clamped to [0.1, 2.0]
    pub volume: f32,
}

impl Default for VoiceOptions {
    fn default() -> Self {
        Self {
            voice_id: None,
            speaking_rate: 1.0,
            volume: 1.0,
        }
    }
}

impl VoiceOptions {
    /// Step size used by the speed-up/slow-down commands
    pub const RATE_STEP: f32 = 0.25;
    /// Step size used by the volume-up/volume-down commands
    pub const VOLUME_STEP: f32 = 0.25;

    pub fn adjust_rate(&mut self, delta: f32) {
        self.speaking_rate = (self.speaking_rate + delta).clamp(0.5, 2.0);
    }

    pub fn adjust_volume(&mut self, delta: f32) {
        self.volume = (self.volume + delta).clamp(0.1, 2.0);
    }
}

/// One chunk of synthesized audio
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Encoded audio bytes
    pub data: Vec<u8>,
    /// Format of `data`
    pub format: AudioFormat,
    /// Sample rate of `data`
    pub sample_rate: SampleRate,
}

/// Text-to-Speech interface
///
/// Synthesis is streaming-only: the caller consumes chunks as they arrive
/// and checks its interrupt flag between chunks.
pub trait TextToSpeech: Send + Sync + 'static {
    /// Stream synthesized audio for one text segment
    ///
    /// The returned stream is lazy, finite, and forward-only.
    fn synthesize_stream(
        &self,
        text: &str,
        voice: &VoiceOptions,
    ) -> Pin<Box<dyn Stream<Item = Result<AudioChunk>> + Send>>;

    /// Engine name for logging
    fn engine_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voice_options_clamping() {
        let mut voice = VoiceOptions::default();
        for _ in 0..10 {
            voice.adjust_rate(VoiceOptions::RATE_STEP);
        }
        assert_eq!(voice.speaking_rate, 2.0);

        for _ in 0..20 {
            voice.adjust_volume(-VoiceOptions::VOLUME_STEP);
        }
        assert_eq!(voice.volume, 0.1);
    }
}
