//! Application state
//!
//! Shared state across all handlers.

use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;

use voice_assistant_config::Settings;
use voice_assistant_core::{LanguageModel, SessionStore, TextToSpeech};
use voice_assistant_llm::{LlmBackendConfig, OllamaBackend};
use voice_assistant_pipeline::{
    Dispatcher, HttpTts, HttpTtsConfig, QualityGate, SttEngine, TurnPipeline, TurnPipelineConfig,
};

use crate::session::SessionRegistry;
use crate::store::InMemorySessionStore;
use crate::ServerError;

/// Application state
#[derive(Clone)]
pub struct AppState {
    /// Configuration behind a lock for future hot-reload
    pub config: Arc<RwLock<Settings>>,
    /// Session registry
    pub registry: Arc<SessionRegistry>,
    /// Shared turn pipeline
    pub pipeline: Arc<TurnPipeline>,
}

impl AppState {
    /// Wire collaborators from settings with the in-memory store
    pub fn from_settings(settings: Settings) -> Result<Self, ServerError> {
        let store: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
        Self::with_store(settings, store)
    }

    /// Wire collaborators from settings with a caller-provided store
    pub fn with_store(
        settings: Settings,
        store: Arc<dyn SessionStore>,
    ) -> Result<Self, ServerError> {
        let stt = SttEngine::from_config(&settings.asr)
            .map_err(|e| ServerError::Internal(format!("STT engine: {e}")))?;

        let llm: Arc<dyn LanguageModel> = Arc::new(
            OllamaBackend::new(LlmBackendConfig::from(&settings.llm))
                .map_err(|e| ServerError::Internal(format!("LLM backend: {e}")))?,
        );

        let tts: Arc<dyn TextToSpeech> = Arc::new(
            HttpTts::new(HttpTtsConfig {
                url: settings.tts.endpoint.clone(),
                sample_rate: voice_assistant_core::SampleRate::from_u32(settings.tts.sample_rate)
                    .unwrap_or_default(),
                timeout_ms: settings.tts.timeout_ms,
            })
            .map_err(|e| ServerError::Internal(format!("TTS backend: {e}")))?,
        );

        let dispatcher = Dispatcher::new(
            settings.llm.system_prompt.clone(),
            settings.llm.max_tokens,
            settings.llm.temperature,
        );

        let pipeline = TurnPipeline::new(
            Arc::new(stt),
            llm,
            tts,
            dispatcher,
            QualityGate::new(settings.pipeline.quality.clone()),
            TurnPipelineConfig {
                segment_max_chars: settings.pipeline.segment_max_chars,
                ..Default::default()
            },
        )
        .with_store(store.clone());

        let registry = Arc::new(SessionRegistry::new(
            settings.server.max_sessions,
            Duration::from_secs(settings.server.session_timeout_secs),
            Duration::from_secs(settings.server.cleanup_interval_secs),
            store,
            settings.pipeline.intake_threshold_bytes,
        ));

        Ok(Self {
            config: Arc::new(RwLock::new(settings)),
            registry,
            pipeline: Arc::new(pipeline),
        })
    }

    /// Bounded dequeue wait used by per-session responder tasks
    pub fn dequeue_timeout(&self) -> Duration {
        Duration::from_millis(self.config.read().queue.dequeue_timeout_ms)
    }
}
