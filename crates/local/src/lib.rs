//! Local two-unit transport
//!
//! A Listener unit samples the microphone, gates on voice activity, and
//! enqueues classified commands; a Speaker unit drains the shared queue
//! and plays synthesized turns on the local output device. Both units
//! share the priority queue and mutex-guarded session state; the
//! interrupt flag is the only cross-thread field.

pub mod device;
pub mod listener;
pub mod speaker;

pub use device::{AudioInput, AudioOutput, CpalInput, CpalOutput};
pub use listener::{Listener, ListenerConfig, UtteranceDetector};
pub use speaker::Speaker;

use parking_lot::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

use voice_assistant_config::Settings;
use voice_assistant_core::{LanguageModel, Result, TextToSpeech};
use voice_assistant_command::CommandQueue;
use voice_assistant_llm::{LlmBackendConfig, OllamaBackend};
use voice_assistant_pipeline::{
    DialogState, Dispatcher, HttpTts, HttpTtsConfig, InterruptFlag, QualityGate, SttEngine,
    TurnPipeline, TurnPipelineConfig,
};

/// Session state shared by the two units
pub struct LocalSession {
    pub id: String,
    pub interrupt: InterruptFlag,
    pub queue: Arc<CommandQueue>,
    pub dialog: Mutex<DialogState>,
    pub total_turns: AtomicUsize,
    output: Arc<dyn AudioOutput>,
}

impl LocalSession {
    pub fn new(output: Arc<dyn AudioOutput>) -> Self {
        Self {
            id: "local".to_string(),
            interrupt: InterruptFlag::new(),
            queue: Arc::new(CommandQueue::new()),
            dialog: Mutex::new(DialogState::new()),
            total_turns: AtomicUsize::new(0),
            output,
        }
    }

    /// Silence queued playback immediately (Stop/DeepDive dispatch)
    pub fn cancel_playback(&self) {
        self.output.stop();
    }
}

/// The assembled local assistant
pub struct LocalAssistant {
    listener: Listener,
    speaker: Speaker,
}

impl LocalAssistant {
    /// Wire collaborators from settings onto the given devices
    pub fn new(
        settings: &Settings,
        input: Arc<dyn AudioInput>,
        output: Arc<dyn AudioOutput>,
    ) -> Result<Self> {
        let stt = SttEngine::from_config(&settings.asr)?;

        let llm: Arc<dyn LanguageModel> =
            Arc::new(OllamaBackend::new(LlmBackendConfig::from(&settings.llm))?);

        let tts: Arc<dyn TextToSpeech> = Arc::new(HttpTts::new(HttpTtsConfig {
            url: settings.tts.endpoint.clone(),
            sample_rate: voice_assistant_core::SampleRate::from_u32(settings.tts.sample_rate)
                .unwrap_or_default(),
            timeout_ms: settings.tts.timeout_ms,
        })?);

        let dispatcher = Dispatcher::new(
            settings.llm.system_prompt.clone(),
            settings.llm.max_tokens,
            settings.llm.temperature,
        );

        let pipeline = Arc::new(TurnPipeline::new(
            Arc::new(stt),
            llm,
            tts,
            dispatcher,
            QualityGate::new(settings.pipeline.quality.clone()),
            TurnPipelineConfig {
                segment_max_chars: settings.pipeline.segment_max_chars,
                ..Default::default()
            },
        ));

        let session = Arc::new(LocalSession::new(output.clone()));

        // The listener's ingest path shares the speaker's event channel
        // only for transcripts; each unit otherwise drives its own side.
        let (listener_events, mut listener_events_rx) = mpsc::channel(64);
        tokio::spawn(async move {
            // Transcription/no-speech events from ingest are log-only here
            while let Some(event) = listener_events_rx.recv().await {
                if let voice_assistant_pipeline::TurnEvent::Transcription { text, .. } = event {
                    tracing::info!(%text, "heard");
                }
            }
        });

        let listener = Listener::new(
            input,
            pipeline.clone(),
            session.clone(),
            listener_events,
            ListenerConfig::default(),
        );

        let speaker = Speaker::new(
            output,
            pipeline,
            session,
            Duration::from_millis(settings.queue.dequeue_timeout_ms),
        );

        Ok(Self { listener, speaker })
    }

    /// Run both units until the shutdown signal flips
    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        let listener = tokio::spawn(self.listener.run(shutdown.clone()));
        let speaker = tokio::spawn(self.speaker.run(shutdown));

        let _ = tokio::join!(listener, speaker);
    }
}
