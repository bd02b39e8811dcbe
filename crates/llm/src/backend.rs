//! LLM backend implementation
//!
//! Talks to an Ollama-style `/api/chat` endpoint. Blocking generation
//! retries transient failures with jittered exponential backoff; streaming
//! generation yields fragments as NDJSON lines arrive so the caller can
//! poll its interrupt flag between increments.

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use rand::Rng;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::time::Duration;
use unicode_segmentation::UnicodeSegmentation;

use voice_assistant_config::LlmSettings;
use voice_assistant_core::{
    Error, FinishReason, GenerateRequest, GenerateResponse, LanguageModel, Message, Result,
    StreamChunk,
};

/// Backend configuration
#[derive(Debug, Clone)]
pub struct LlmBackendConfig {
    /// Model name/ID
    pub model: String,
    /// API endpoint
    pub endpoint: String,
    /// Request timeout
    pub timeout: Duration,
    /// Maximum retry attempts for transient failures
    pub max_retries: u32,
    /// Initial backoff duration (doubles each retry)
    pub initial_backoff: Duration,
}

impl Default for LlmBackendConfig {
    fn default() -> Self {
        Self {
            model: "qwen3:4b-instruct-2507-q4_K_M".to_string(),
            endpoint: "http://localhost:11434".to_string(),
            timeout: Duration::from_secs(30),
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
        }
    }
}

impl From<&LlmSettings> for LlmBackendConfig {
    fn from(settings: &LlmSettings) -> Self {
        Self {
            model: settings.model.clone(),
            endpoint: settings.endpoint.clone(),
            timeout: Duration::from_secs(settings.timeout_secs),
            max_retries: settings.max_retries,
            ..Default::default()
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
    options: ChatOptions,
}

#[derive(Serialize)]
struct ChatOptions {
    num_predict: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    message: Option<ChatMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    eval_count: Option<usize>,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: String,
}

/// Ollama-style HTTP backend
#[derive(Clone)]
pub struct OllamaBackend {
    client: Client,
    config: LlmBackendConfig,
}

impl OllamaBackend {
    pub fn new(config: LlmBackendConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api{}", self.config.endpoint, path)
    }

    async fn chat_once(&self, request: &GenerateRequest) -> Result<GenerateResponse> {
        let body = ChatRequest {
            model: &self.config.model,
            messages: &request.messages,
            stream: false,
            options: ChatOptions {
                num_predict: request.max_tokens,
                temperature: request.temperature,
            },
        };

        let response = self
            .client
            .post(self.api_url("/chat"))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Llm(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::Llm(format!(
                "backend returned status {}",
                response.status()
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::Llm(format!("malformed response: {e}")))?;

        let finish_reason = match parsed.done_reason.as_deref() {
            Some("length") => FinishReason::Length,
            _ => FinishReason::Stop,
        };

        Ok(GenerateResponse {
            text: parsed.message.map(|m| m.content).unwrap_or_default(),
            finish_reason,
            tokens: parsed.eval_count,
        })
    }
}

#[async_trait]
impl LanguageModel for OllamaBackend {
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse> {
        let mut backoff = self.config.initial_backoff;
        let mut last_err = None;

        for attempt in 0..=self.config.max_retries {
            match self.chat_once(&request).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    tracing::warn!(
                        attempt,
                        error = %e,
                        model = %self.config.model,
                        "LLM generation attempt failed"
                    );
                    last_err = Some(e);
                }
            }

            if attempt < self.config.max_retries {
                let jitter = rand::thread_rng().gen_range(0..backoff.as_millis().max(1) as u64);
                tokio::time::sleep(backoff + Duration::from_millis(jitter / 4)).await;
                backoff *= 2;
            }
        }

        Err(last_err.unwrap_or_else(|| Error::Llm("generation failed".into())))
    }

    fn generate_stream(
        &self,
        request: GenerateRequest,
    ) -> Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>> {
        let client = self.client.clone();
        let url = self.api_url("/chat");
        let model = self.config.model.clone();

        Box::pin(async_stream::try_stream! {
            let body = serde_json::json!({
                "model": model,
                "messages": request.messages,
                "stream": true,
                "options": {
                    "num_predict": request.max_tokens,
                    "temperature": request.temperature,
                },
            });

            let response = client
                .post(&url)
                .json(&body)
                .send()
                .await
                .map_err(|e| Error::Llm(format!("stream request failed: {e}")))?;

            if !response.status().is_success() {
                Err(Error::Llm(format!(
                    "backend returned status {}",
                    response.status()
                )))?;
            }

            let mut bytes = response.bytes_stream();
            let mut line_buf = String::new();
            let mut done = false;

            while let Some(piece) = bytes.next().await {
                let piece = piece.map_err(|e| Error::Llm(format!("stream read failed: {e}")))?;
                line_buf.push_str(&String::from_utf8_lossy(&piece));

                // NDJSON: one object per line
                while let Some(pos) = line_buf.find('\n') {
                    let line: String = line_buf.drain(..=pos).collect();
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }

                    let parsed: ChatResponse = serde_json::from_str(line)
                        .map_err(|e| Error::Llm(format!("malformed stream line: {e}")))?;

                    let text = parsed.message.map(|m| m.content).unwrap_or_default();
                    if parsed.done {
                        done = true;
                        yield StreamChunk { text, is_final: true };
                    } else if !text.is_empty() {
                        yield StreamChunk { text, is_final: false };
                    }
                }

                if done {
                    break;
                }
            }

            if !done {
                // Stream ended without a done marker; close it out so
                // downstream segmenters flush.
                yield StreamChunk { text: String::new(), is_final: true };
            }
        })
    }

    async fn is_available(&self) -> bool {
        match self.client.get(self.api_url("/tags")).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(error = %e, "LLM backend not reachable");
                false
            }
        }
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }

    fn estimate_tokens(&self, text: &str) -> usize {
        // Grapheme count handles combining marks better than chars
        text.graphemes(true).count().max(1) / 4
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_settings() {
        let settings = LlmSettings::default();
        let config = LlmBackendConfig::from(&settings);
        assert_eq!(config.model, settings.model);
        assert_eq!(config.timeout, Duration::from_secs(settings.timeout_secs));
    }

    #[test]
    fn test_api_url() {
        let backend = OllamaBackend::new(LlmBackendConfig {
            endpoint: "http://example:11434".into(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(backend.api_url("/chat"), "http://example:11434/api/chat");
    }

    #[tokio::test]
    async fn test_unreachable_backend_reports_unavailable() {
        let backend = OllamaBackend::new(LlmBackendConfig {
            endpoint: "http://127.0.0.1:1".into(),
            timeout: Duration::from_millis(200),
            ..Default::default()
        })
        .unwrap();
        assert!(!backend.is_available().await);
    }
}
