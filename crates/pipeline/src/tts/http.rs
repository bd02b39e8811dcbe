//! HTTP streaming TTS backend
//!
//! Posts a text segment to the synthesis service and forwards the chunked
//! PCM16 response body as audio chunks, so playback starts before the
//! segment is fully rendered.

use futures::{Stream, StreamExt};
use serde::Serialize;
use std::pin::Pin;
use std::time::Duration;

use voice_assistant_core::{
    AudioChunk, AudioFormat, Error, Result, SampleRate, TextToSpeech, VoiceOptions,
};

/// HTTP TTS configuration
#[derive(Debug, Clone)]
pub struct HttpTtsConfig {
    /// Base URL of the synthesis service
    pub url: String,
    /// Output sample rate requested from the service
    pub sample_rate: SampleRate,
    /// Request timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for HttpTtsConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8092".to_string(),
            sample_rate: SampleRate::Hz22050,
            timeout_ms: 20_000,
        }
    }
}

#[derive(Serialize)]
struct SynthesizeRequest {
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    voice_id: Option<String>,
    speaking_rate: f32,
    volume: f32,
    sample_rate: u32,
    format: &'static str,
}

/// HTTP text-to-speech backend
pub struct HttpTts {
    config: HttpTtsConfig,
    client: reqwest::Client,
}

impl HttpTts {
    pub fn new(config: HttpTtsConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }
}

impl TextToSpeech for HttpTts {
    fn synthesize_stream(
        &self,
        text: &str,
        voice: &VoiceOptions,
    ) -> Pin<Box<dyn Stream<Item = Result<AudioChunk>> + Send>> {
        let client = self.client.clone();
        let url = format!("{}/synthesize", self.config.url);
        let sample_rate = self.config.sample_rate;
        let body = SynthesizeRequest {
            text: text.to_string(),
            voice_id: voice.voice_id.clone(),
            speaking_rate: voice.speaking_rate,
            volume: voice.volume,
            sample_rate: sample_rate.as_u32(),
            format: "pcm16",
        };

        Box::pin(async_stream::try_stream! {
            let response = client
                .post(&url)
                .json(&body)
                .send()
                .await
                .map_err(|e| Error::Tts(format!("request failed: {e}")))?;

            if !response.status().is_success() {
                Err(Error::Tts(format!(
                    "backend returned status {}",
                    response.status()
                )))?;
            }

            let mut bytes = response.bytes_stream();
            while let Some(piece) = bytes.next().await {
                let piece = piece.map_err(|e| Error::Tts(format!("stream read failed: {e}")))?;
                if piece.is_empty() {
                    continue;
                }
                yield AudioChunk {
                    data: piece.to_vec(),
                    format: AudioFormat::Pcm16,
                    sample_rate,
                };
            }
        })
    }

    fn engine_name(&self) -> &str {
        "http-tts"
    }
}
