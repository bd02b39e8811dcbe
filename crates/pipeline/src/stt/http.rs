//! HTTP STT backend
//!
//! Sends buffered utterances to an external transcription service as a
//! multipart upload. Used for both the remote-first path and the local
//! fallback sidecar; only the URL differs.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use voice_assistant_core::{
    AudioFormat, Error, Result, SampleRate, SpeechToText, TranscriptResult,
};

/// HTTP STT configuration
#[derive(Debug, Clone)]
pub struct HttpSttConfig {
    /// Base URL of the transcription service
    pub url: String,
    /// Language hint (e.g. "en")
    pub language: String,
    /// Request timeout in milliseconds
    pub timeout_ms: u64,
    /// Name used in logs and transcript metadata
    pub name: String,
}

impl Default for HttpSttConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8090".to_string(),
            language: "en".to_string(),
            timeout_ms: 15_000,
            name: "http-stt".to_string(),
        }
    }
}

/// Response from the transcription service
#[derive(Debug, Deserialize)]
struct SttResponse {
    text: String,
    #[serde(default)]
    confidence: f32,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// HTTP speech-to-text backend
pub struct HttpStt {
    config: HttpSttConfig,
    client: reqwest::Client,
}

impl HttpStt {
    pub fn new(config: HttpSttConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    pub fn with_url(url: impl Into<String>, name: impl Into<String>) -> Result<Self> {
        Self::new(HttpSttConfig {
            url: url.into(),
            name: name.into(),
            ..Default::default()
        })
    }

    /// Probe the service's health endpoint; failures are reported, not fatal
    pub async fn check_health(&self) -> bool {
        let url = format!("{}/health", self.config.url);
        match self.client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                tracing::warn!(
                    backend = %self.config.name,
                    status = %resp.status(),
                    "STT service health check returned non-success"
                );
                false
            }
            Err(e) => {
                tracing::warn!(
                    backend = %self.config.name,
                    error = %e,
                    "STT service not reachable"
                );
                false
            }
        }
    }
}

#[async_trait]
impl SpeechToText for HttpStt {
    async fn transcribe(
        &self,
        audio: &[u8],
        sample_rate: SampleRate,
        format: AudioFormat,
    ) -> Result<TranscriptResult> {
        let url = format!("{}/transcribe", self.config.url);

        let part = reqwest::multipart::Part::bytes(audio.to_vec())
            .file_name(format!("utterance.{}", format.as_str()))
            .mime_str("application/octet-stream")
            .map_err(|e| Error::AsrUnavailable(format!("multipart: {e}")))?;

        let form = reqwest::multipart::Form::new()
            .part("audio", part)
            .text("language", self.config.language.clone())
            .text("sample_rate", sample_rate.as_u32().to_string())
            .text("format", format.as_str());

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::AsrUnavailable(format!("{}: {e}", self.config.name)))?;

        if !response.status().is_success() {
            return Err(Error::AsrUnavailable(format!(
                "{} returned status {}",
                self.config.name,
                response.status()
            )));
        }

        let parsed: SttResponse = response
            .json()
            .await
            .map_err(|e| Error::AsrUnavailable(format!("malformed response: {e}")))?;

        if let Some(service_error) = parsed.error {
            return Err(Error::AsrUnavailable(format!(
                "{}: {service_error}",
                self.config.name
            )));
        }

        Ok(TranscriptResult {
            text: parsed.text,
            confidence: parsed.confidence,
            is_final: true,
            language: parsed.language,
            backend: Some(self.config.name.clone()),
        })
    }

    fn engine_name(&self) -> &str {
        &self.config.name
    }
}
