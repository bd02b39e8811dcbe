//! Turn pipeline orchestrator
//!
//! Two entry points matching the system flow:
//! - [`TurnPipeline::ingest`] - buffered audio in, classified command out
//!   (Transcribing -> Classifying)
//! - [`TurnPipeline::run_turn`] - command in, streamed response out
//!   (Dispatching -> Generating -> Synthesizing)
//!
//! Generation and synthesis are pipelined one segment deep: text segments
//! cross a capacity-1 channel so audio for the first sentence starts while
//! the model is still writing the second. The session's interrupt flag is
//! polled after every LLM increment and before every TTS chunk; a set flag
//! ends the turn with `StreamingInterrupted` and never emits further
//! chunks.

use futures::StreamExt;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

use voice_assistant_command::{classify, Command};
use voice_assistant_core::{
    AudioFormat, Error, LanguageModel, Result, SampleRate, SessionStore, TextToSpeech, TurnResult,
    VoiceOptions,
};

use crate::dialog::DialogState;
use crate::dispatch::{Dispatcher, ResponsePlan};
use crate::events::TurnEvent;
use crate::gate::QualityGate;
use crate::interrupt::InterruptFlag;
use crate::segment::SentenceSegmenter;
use crate::stt::SttEngine;

/// Turn pipeline configuration
#[derive(Debug, Clone)]
pub struct TurnPipelineConfig {
    /// Segment cap for the generation-to-synthesis handoff
    pub segment_max_chars: usize,
    /// Expected inbound audio sample rate
    pub sample_rate: SampleRate,
}

impl Default for TurnPipelineConfig {
    fn default() -> Self {
        Self {
            segment_max_chars: 100,
            sample_rate: SampleRate::Hz16000,
        }
    }
}

struct SynthOutcome {
    chunks_emitted: usize,
    interrupted: bool,
    error: Option<Error>,
}

/// Orchestrates ASR -> classify -> dispatch -> LLM -> TTS for one session
/// at a time. The pipeline only borrows session state per turn; sessions
/// are owned by the registry.
pub struct TurnPipeline {
    stt: Arc<SttEngine>,
    llm: Arc<dyn LanguageModel>,
    tts: Arc<dyn TextToSpeech>,
    dispatcher: Dispatcher,
    gate: QualityGate,
    store: Option<Arc<dyn SessionStore>>,
    config: TurnPipelineConfig,
}

impl TurnPipeline {
    pub fn new(
        stt: Arc<SttEngine>,
        llm: Arc<dyn LanguageModel>,
        tts: Arc<dyn TextToSpeech>,
        dispatcher: Dispatcher,
        gate: QualityGate,
        config: TurnPipelineConfig,
    ) -> Self {
        Self {
            stt,
            llm,
            tts,
            dispatcher,
            gate,
            store: None,
            config,
        }
    }

    /// Attach the external store for fire-and-forget transcript persistence
    pub fn with_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Transcribe a flushed utterance and classify it into a command.
    ///
    /// Returns `Ok(None)` when there is nothing to act on (quality gate
    /// rejection or an empty transcript) - both are benign. ASR failure
    /// emits a typed error event and surfaces as `Err`; the session stays
    /// open and the next utterance starts fresh.
    pub async fn ingest(
        &self,
        session_id: &str,
        audio: &[u8],
        format: AudioFormat,
        events: &mpsc::Sender<TurnEvent>,
    ) -> Result<Option<Command>> {
        // Quality gate only understands raw PCM; container formats go
        // straight to the engine.
        if format == AudioFormat::Pcm16 {
            if let Err(reason) = self.gate.check(audio) {
                tracing::debug!(session_id, %reason, "quality gate rejected audio");
                let _ = events
                    .send(TurnEvent::NoSpeech {
                        reason: reason.to_string(),
                    })
                    .await;
                return Ok(None);
            }
        }

        let transcript = match self
            .stt
            .transcribe(audio, self.config.sample_rate, format)
            .await
        {
            Ok(transcript) => transcript,
            Err(e) => {
                tracing::warn!(session_id, error = %e, "transcription failed");
                let _ = events
                    .send(TurnEvent::TurnError {
                        error_type: e.error_type(),
                        message: e.to_string(),
                    })
                    .await;
                return Err(e);
            }
        };

        if transcript.is_empty() {
            tracing::debug!(session_id, "empty transcript, returning to idle");
            return Ok(None);
        }

        let _ = events
            .send(TurnEvent::Transcription {
                text: transcript.text.clone(),
                confidence: transcript.confidence,
            })
            .await;

        Ok(Some(classify(&transcript.text)))
    }

    /// Drive one turn for a dequeued command.
    ///
    /// Clears the session's interrupt flag first: the flag belongs to the
    /// *previous* turn once a new one starts.
    pub async fn run_turn(
        &self,
        session_id: &str,
        command: Command,
        state: &Mutex<DialogState>,
        flag: &InterruptFlag,
        events: &mpsc::Sender<TurnEvent>,
    ) -> TurnResult {
        let started = Instant::now();
        flag.clear();

        let (plan, voice) = {
            let mut dialog = state.lock();
            let plan = self.dispatcher.plan(&command, &mut dialog);
            (plan, dialog.voice.clone())
        };

        let mut result = TurnResult {
            transcription: command.origin_text.clone(),
            ..Default::default()
        };

        if matches!(plan, ResponsePlan::Silent) {
            result.processing_time = started.elapsed();
            return result;
        }

        // One-segment-deep pipelining between generation and synthesis
        let (seg_tx, seg_rx) = mpsc::channel::<String>(1);
        let synth = tokio::spawn(Self::synthesize_segments(
            self.tts.clone(),
            seg_rx,
            voice,
            flag.clone(),
            events.clone(),
        ));

        let mut response_text = String::new();
        let mut gen_interrupted = false;
        let mut turn_error: Option<Error> = None;

        match plan {
            ResponsePlan::Silent => unreachable!("handled above"),

            ResponsePlan::Speak(text) => {
                if flag.is_set() {
                    gen_interrupted = true;
                } else {
                    let _ = events
                        .send(TurnEvent::ResponseChunk { text: text.clone() })
                        .await;
                    response_text = text.clone();
                    let _ = seg_tx.send(text).await;
                }
            }

            ResponsePlan::Generate(request) => {
                let mut segmenter = SentenceSegmenter::new(self.config.segment_max_chars);
                let mut stream = self.llm.generate_stream(request);

                while let Some(item) = stream.next().await {
                    match item {
                        Ok(chunk) => {
                            // Checkpoint: after every increment
                            if flag.is_set() {
                                gen_interrupted = true;
                                break;
                            }
                            if !chunk.text.is_empty() {
                                response_text.push_str(&chunk.text);
                                let _ = events
                                    .send(TurnEvent::ResponseChunk {
                                        text: chunk.text.clone(),
                                    })
                                    .await;
                                for segment in segmenter.push(&chunk.text) {
                                    if seg_tx.send(segment).await.is_err() {
                                        // Synthesis side already stopped
                                        break;
                                    }
                                }
                            }
                            if chunk.is_final {
                                break;
                            }
                        }
                        Err(e) => {
                            turn_error = Some(e);
                            break;
                        }
                    }
                }

                if turn_error.is_none() && !gen_interrupted {
                    if let Some(rest) = segmenter.flush() {
                        let _ = seg_tx.send(rest).await;
                    }
                }
            }
        }

        drop(seg_tx);
        let outcome = synth.await.unwrap_or_else(|e| SynthOutcome {
            chunks_emitted: 0,
            interrupted: false,
            error: Some(Error::Tts(format!("synthesis task failed: {e}"))),
        });

        result.response_text = response_text.clone();
        result.audio_chunks_emitted = outcome.chunks_emitted;

        if let Some(e) = turn_error.or(outcome.error) {
            tracing::warn!(session_id, error = %e, "turn aborted by stage failure");
            let _ = events
                .send(TurnEvent::TurnError {
                    error_type: e.error_type(),
                    message: e.to_string(),
                })
                .await;
            result.error = Some(e.error_type().to_string());
        } else if gen_interrupted || outcome.interrupted {
            tracing::debug!(
                session_id,
                chunks = outcome.chunks_emitted,
                "turn interrupted"
            );
            let _ = events
                .send(TurnEvent::StreamingInterrupted {
                    total_chunks: outcome.chunks_emitted,
                })
                .await;
            result.interrupted = true;
        } else {
            let _ = events
                .send(TurnEvent::StreamingComplete {
                    total_chunks: outcome.chunks_emitted,
                })
                .await;
            if !response_text.is_empty() {
                state.lock().record_exchange(&command.origin_text, &response_text);
                self.persist_exchange(session_id, &command.origin_text, &response_text);
            }
        }

        result.processing_time = started.elapsed();
        result
    }

    /// Consume text segments and stream their synthesized audio out.
    ///
    /// The interrupt flag is checked before every emitted chunk; at worst
    /// one chunk already in flight is delivered after the flag is raised.
    async fn synthesize_segments(
        tts: Arc<dyn TextToSpeech>,
        mut segments: mpsc::Receiver<String>,
        voice: VoiceOptions,
        flag: InterruptFlag,
        events: mpsc::Sender<TurnEvent>,
    ) -> SynthOutcome {
        let mut outcome = SynthOutcome {
            chunks_emitted: 0,
            interrupted: false,
            error: None,
        };

        'segments: while let Some(segment) = segments.recv().await {
            if flag.is_set() {
                outcome.interrupted = true;
                break;
            }

            let mut stream = tts.synthesize_stream(&segment, &voice);
            while let Some(item) = stream.next().await {
                match item {
                    Ok(chunk) => {
                        // Checkpoint: between chunks
                        if flag.is_set() {
                            outcome.interrupted = true;
                            break 'segments;
                        }
                        let event = TurnEvent::TtsChunk {
                            audio: chunk.data,
                            chunk_index: outcome.chunks_emitted,
                            format: chunk.format,
                            sample_rate: chunk.sample_rate,
                        };
                        if events.send(event).await.is_err() {
                            // Transport is gone; stop synthesizing
                            break 'segments;
                        }
                        outcome.chunks_emitted += 1;
                    }
                    Err(e) => {
                        outcome.error = Some(e);
                        break 'segments;
                    }
                }
            }
        }

        outcome
    }

    /// Fire-and-forget transcript persistence; failures are logged only
    fn persist_exchange(&self, session_id: &str, user_text: &str, response: &str) {
        let Some(store) = self.store.clone() else {
            return;
        };
        let session_id = session_id.to_string();
        let user_text = user_text.to_string();
        let response = response.to_string();

        tokio::spawn(async move {
            if let Err(e) = store.append_message(&session_id, "user", &user_text, None).await {
                tracing::warn!(session_id, error = %e, "failed to persist user message");
            }
            if let Err(e) = store
                .append_message(&session_id, "assistant", &response, None)
                .await
            {
                tracing::warn!(session_id, error = %e, "failed to persist assistant message");
            }
        });
    }
}
