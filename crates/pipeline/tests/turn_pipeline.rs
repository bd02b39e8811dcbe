//! Integration tests for the turn pipeline (ASR -> classify -> LLM -> TTS)
//!
//! Mock collaborators drive the pipeline end to end and verify the
//! interrupt, completion, and failure contracts.

use async_trait::async_trait;
use futures::Stream;
use parking_lot::Mutex;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

use voice_assistant_command::{Command, CommandKind};
use voice_assistant_core::{
    AudioChunk, AudioFormat, Error, GenerateRequest, GenerateResponse, LanguageModel, Result,
    SampleRate, SpeechToText, StreamChunk, TextToSpeech, TranscriptResult, VoiceOptions,
};
use voice_assistant_pipeline::{
    DialogState, Dispatcher, FfmpegTranscoder, InterruptFlag, QualityGate, SttEngine, TurnEvent,
    TurnPipeline, TurnPipelineConfig,
};

// ---------------------------------------------------------------------------
// Mock collaborators
// ---------------------------------------------------------------------------

/// STT that fails a configurable number of times, then succeeds
struct FlakyStt {
    text: &'static str,
    failures_remaining: AtomicUsize,
}

impl FlakyStt {
    fn reliable(text: &'static str) -> Self {
        Self {
            text,
            failures_remaining: AtomicUsize::new(0),
        }
    }

    fn failing_once(text: &'static str) -> Self {
        Self {
            text,
            failures_remaining: AtomicUsize::new(1),
        }
    }
}

#[async_trait]
impl SpeechToText for FlakyStt {
    async fn transcribe(
        &self,
        _audio: &[u8],
        _sample_rate: SampleRate,
        _format: AudioFormat,
    ) -> Result<TranscriptResult> {
        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(Error::AsrUnavailable("mock outage".into()));
        }
        Ok(TranscriptResult::final_text(self.text, 0.93))
    }

    fn engine_name(&self) -> &str {
        "flaky-stt"
    }
}

/// LLM that streams fixed fragments; can raise the interrupt flag while
/// producing a given fragment, or fail at a given fragment.
#[derive(Clone, Default)]
struct ScriptedLlm {
    fragments: Vec<&'static str>,
    interrupt_at: Option<(usize, InterruptFlag)>,
    fail_at: Option<usize>,
}

impl ScriptedLlm {
    fn speaking(fragments: Vec<&'static str>) -> Self {
        Self {
            fragments,
            ..Default::default()
        }
    }
}

#[async_trait]
impl LanguageModel for ScriptedLlm {
    async fn generate(&self, _request: GenerateRequest) -> Result<GenerateResponse> {
        Ok(GenerateResponse::text(self.fragments.concat()))
    }

    fn generate_stream(
        &self,
        _request: GenerateRequest,
    ) -> Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>> {
        let fragments = self.fragments.clone();
        let interrupt_at = self.interrupt_at.clone();
        let fail_at = self.fail_at;

        Box::pin(async_stream::stream! {
            for (i, fragment) in fragments.iter().enumerate() {
                if let Some(fail) = fail_at {
                    if i == fail {
                        yield Err(Error::Llm("mock generation failure".into()));
                        return;
                    }
                }
                if let Some((at, flag)) = &interrupt_at {
                    if i == *at {
                        flag.set();
                    }
                }
                yield Ok(StreamChunk {
                    text: fragment.to_string(),
                    is_final: false,
                });
            }
            yield Ok(StreamChunk { text: String::new(), is_final: true });
        })
    }

    async fn is_available(&self) -> bool {
        true
    }

    fn model_name(&self) -> &str {
        "scripted-llm"
    }
}

/// TTS that yields a fixed number of chunks per segment; can raise the
/// interrupt flag while producing a given chunk.
#[derive(Clone)]
struct ScriptedTts {
    chunks_per_segment: usize,
    interrupt_at_chunk: Option<(usize, InterruptFlag)>,
    chunks_produced: Arc<AtomicUsize>,
}

impl ScriptedTts {
    fn new(chunks_per_segment: usize) -> Self {
        Self {
            chunks_per_segment,
            interrupt_at_chunk: None,
            chunks_produced: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn interrupting_at(mut self, chunk: usize, flag: InterruptFlag) -> Self {
        self.interrupt_at_chunk = Some((chunk, flag));
        self
    }
}

impl TextToSpeech for ScriptedTts {
    fn synthesize_stream(
        &self,
        _text: &str,
        _voice: &VoiceOptions,
    ) -> Pin<Box<dyn Stream<Item = Result<AudioChunk>> + Send>> {
        let count = self.chunks_per_segment;
        let interrupt = self.interrupt_at_chunk.clone();
        let produced = self.chunks_produced.clone();

        Box::pin(async_stream::stream! {
            for _ in 0..count {
                let index = produced.fetch_add(1, Ordering::SeqCst);
                if let Some((at, flag)) = &interrupt {
                    if index == *at {
                        flag.set();
                    }
                }
                yield Ok(AudioChunk {
                    data: vec![0u8; 640],
                    format: AudioFormat::Pcm16,
                    sample_rate: SampleRate::Hz22050,
                });
            }
        })
    }

    fn engine_name(&self) -> &str {
        "scripted-tts"
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

fn pipeline_with(
    stt: Arc<dyn SpeechToText>,
    llm: Arc<dyn LanguageModel>,
    tts: Arc<dyn TextToSpeech>,
) -> TurnPipeline {
    let engine = SttEngine::new(stt, None, Arc::new(FfmpegTranscoder::new()));
    TurnPipeline::new(
        Arc::new(engine),
        llm,
        tts,
        Dispatcher::new("You are a test assistant.", 128, 0.7),
        QualityGate::default(),
        TurnPipelineConfig::default(),
    )
}

/// Loud-enough PCM16 so the quality gate passes
fn speech_audio() -> Vec<u8> {
    let samples: Vec<f32> = (0..16_000).map(|i| (i as f32 * 0.05).sin() * 0.4).collect();
    voice_assistant_core::f32_to_pcm16(&samples)
}

async fn drain_events(rx: &mut mpsc::Receiver<TurnEvent>) -> Vec<TurnEvent> {
    let mut events = Vec::new();
    while let Ok(Some(event)) = timeout(Duration::from_millis(50), rx.recv()).await {
        events.push(event);
    }
    events
}

fn count_tts_chunks(events: &[TurnEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, TurnEvent::TtsChunk { .. }))
        .count()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_complete_turn_streams_and_records() {
    let llm = Arc::new(ScriptedLlm::speaking(vec![
        "The markets are up today. ",
        "Tech led the gains.",
    ]));
    let tts = Arc::new(ScriptedTts::new(2));
    let pipeline = pipeline_with(Arc::new(FlakyStt::reliable("unused")), llm, tts);

    let state = Mutex::new(DialogState::new());
    let flag = InterruptFlag::new();
    let (tx, mut rx) = mpsc::channel(64);

    let command = Command::new(CommandKind::StockRequest, "how are the markets")
        .with_payload("how are the markets");
    let result = pipeline
        .run_turn("s1", command, &state, &flag, &tx)
        .await;

    assert!(result.completed());
    assert!(result.response_text.contains("markets are up"));
    // Two sentences -> two segments -> four chunks
    assert_eq!(result.audio_chunks_emitted, 4);

    let events = drain_events(&mut rx).await;
    assert_eq!(count_tts_chunks(&events), 4);
    assert!(events
        .iter()
        .any(|e| matches!(e, TurnEvent::StreamingComplete { total_chunks: 4 })));

    // Completed exchange lands in the dialog history
    let dialog = state.lock();
    assert_eq!(dialog.history.len(), 2);
    assert!(dialog.last_response.as_deref().unwrap().contains("Tech led"));
}

#[tokio::test]
async fn test_interrupt_during_synthesis_stops_after_two_chunks() {
    // Scenario: interrupt lands after chunk 2 of an expected 9. Exactly
    // two tts_chunk events plus streaming_interrupted{2}; never complete.
    let flag = InterruptFlag::new();
    let llm = Arc::new(ScriptedLlm::speaking(vec!["One long sentence to speak."]));
    let tts = Arc::new(ScriptedTts::new(9).interrupting_at(2, flag.clone()));
    let pipeline = pipeline_with(Arc::new(FlakyStt::reliable("unused")), llm, tts);

    let state = Mutex::new(DialogState::new());
    let (tx, mut rx) = mpsc::channel(64);

    let command =
        Command::new(CommandKind::NewsRequest, "the news").with_payload("the news");
    let result = pipeline
        .run_turn("s1", command, &state, &flag, &tx)
        .await;

    assert!(result.interrupted);
    assert_eq!(result.audio_chunks_emitted, 2);

    let events = drain_events(&mut rx).await;
    assert_eq!(count_tts_chunks(&events), 2);
    assert!(events
        .iter()
        .any(|e| matches!(e, TurnEvent::StreamingInterrupted { total_chunks: 2 })));
    assert!(!events
        .iter()
        .any(|e| matches!(e, TurnEvent::StreamingComplete { .. })));

    // Interrupted exchanges are not recorded
    assert!(state.lock().history.is_empty());
}

#[tokio::test]
async fn test_interrupt_during_generation() {
    let flag = InterruptFlag::new();
    let llm = Arc::new(ScriptedLlm {
        fragments: vec!["First part. ", "Second part. ", "Third part."],
        interrupt_at: Some((1, flag.clone())),
        fail_at: None,
    });
    let tts = Arc::new(ScriptedTts::new(1));
    let pipeline = pipeline_with(Arc::new(FlakyStt::reliable("unused")), llm, tts);

    let state = Mutex::new(DialogState::new());
    let (tx, mut rx) = mpsc::channel(64);

    let command = Command::new(CommandKind::NewsRequest, "news").with_payload("news");
    let result = pipeline.run_turn("s1", command, &state, &flag, &tx).await;

    assert!(result.interrupted);

    let events = drain_events(&mut rx).await;
    assert!(events
        .iter()
        .any(|e| matches!(e, TurnEvent::StreamingInterrupted { .. })));
    assert!(!events
        .iter()
        .any(|e| matches!(e, TurnEvent::StreamingComplete { .. })));
}

#[tokio::test]
async fn test_llm_failure_aborts_turn_with_typed_error() {
    let llm = Arc::new(ScriptedLlm {
        fragments: vec!["Partial. ", "unreached"],
        interrupt_at: None,
        fail_at: Some(1),
    });
    let tts = Arc::new(ScriptedTts::new(1));
    let pipeline = pipeline_with(Arc::new(FlakyStt::reliable("unused")), llm, tts);

    let state = Mutex::new(DialogState::new());
    let flag = InterruptFlag::new();
    let (tx, mut rx) = mpsc::channel(64);

    let command = Command::new(CommandKind::NewsRequest, "news").with_payload("news");
    let result = pipeline.run_turn("s1", command, &state, &flag, &tx).await;

    assert_eq!(result.error.as_deref(), Some("llm_generation_failed"));

    let events = drain_events(&mut rx).await;
    assert!(events.iter().any(|e| matches!(
        e,
        TurnEvent::TurnError { error_type: "llm_generation_failed", .. }
    )));
}

#[tokio::test]
async fn test_asr_failure_then_recovery_on_same_session() {
    // Scenario: ASR fails with the fallback disabled - the turn ends with
    // a typed error and the next utterance on the same session succeeds.
    let stt = Arc::new(FlakyStt::failing_once("what's the weather"));
    let llm = Arc::new(ScriptedLlm::speaking(vec!["Sunny."]));
    let tts = Arc::new(ScriptedTts::new(1));
    let pipeline = pipeline_with(stt, llm, tts);

    let (tx, mut rx) = mpsc::channel(64);
    let audio = speech_audio();

    let err = pipeline
        .ingest("s1", &audio, AudioFormat::Pcm16, &tx)
        .await
        .unwrap_err();
    assert_eq!(err.error_type(), "asr_processing_failed");

    let events = drain_events(&mut rx).await;
    assert!(events.iter().any(|e| matches!(
        e,
        TurnEvent::TurnError { error_type: "asr_processing_failed", .. }
    )));

    // Next chunk on the same session still works
    let command = pipeline
        .ingest("s1", &audio, AudioFormat::Pcm16, &tx)
        .await
        .unwrap()
        .expect("second utterance should classify");
    assert_eq!(command.kind, CommandKind::WeatherRequest);

    let events = drain_events(&mut rx).await;
    assert!(events
        .iter()
        .any(|e| matches!(e, TurnEvent::Transcription { .. })));
}

#[tokio::test]
async fn test_quality_gate_rejection_is_benign() {
    let pipeline = pipeline_with(
        Arc::new(FlakyStt::reliable("should not be called")),
        Arc::new(ScriptedLlm::speaking(vec!["unused"])),
        Arc::new(ScriptedTts::new(1)),
    );

    let (tx, mut rx) = mpsc::channel(64);
    let silence = voice_assistant_core::f32_to_pcm16(&vec![0.0f32; 16_000]);

    let outcome = pipeline
        .ingest("s1", &silence, AudioFormat::Pcm16, &tx)
        .await
        .unwrap();
    assert!(outcome.is_none());

    let events = drain_events(&mut rx).await;
    assert!(events.iter().any(|e| matches!(e, TurnEvent::NoSpeech { .. })));
    assert!(!events.iter().any(|e| matches!(e, TurnEvent::TurnError { .. })));
}

#[tokio::test]
async fn test_stop_command_produces_no_events() {
    let pipeline = pipeline_with(
        Arc::new(FlakyStt::reliable("unused")),
        Arc::new(ScriptedLlm::speaking(vec!["unused"])),
        Arc::new(ScriptedTts::new(3)),
    );

    let state = Mutex::new(DialogState::new());
    let flag = InterruptFlag::new();
    let (tx, mut rx) = mpsc::channel(64);

    let result = pipeline
        .run_turn("s1", Command::new(CommandKind::Stop, "stop"), &state, &flag, &tx)
        .await;

    assert!(result.completed());
    assert_eq!(result.audio_chunks_emitted, 0);
    assert!(drain_events(&mut rx).await.is_empty());
}

#[tokio::test]
async fn test_new_turn_clears_stale_interrupt_flag() {
    let flag = InterruptFlag::new();
    flag.set(); // left over from a previous turn's Stop

    let pipeline = pipeline_with(
        Arc::new(FlakyStt::reliable("unused")),
        Arc::new(ScriptedLlm::speaking(vec!["Fresh response."])),
        Arc::new(ScriptedTts::new(2)),
    );

    let state = Mutex::new(DialogState::new());
    let (tx, mut rx) = mpsc::channel(64);

    let command = Command::new(CommandKind::NewsRequest, "news").with_payload("news");
    let result = pipeline.run_turn("s1", command, &state, &flag, &tx).await;

    // The stale flag was cleared at turn start, so the turn completes
    assert!(result.completed());
    let events = drain_events(&mut rx).await;
    assert!(events
        .iter()
        .any(|e| matches!(e, TurnEvent::StreamingComplete { .. })));
}
