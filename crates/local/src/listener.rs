//! Listener unit
//!
//! Continuously drains the microphone, gates on voice activity, and on a
//! completed utterance runs it through the pipeline's ingest path. The
//! resulting command lands on the shared queue; Stop/DeepDive additionally
//! raise the interrupt flag and cancel current playback before the command
//! is processed.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

use voice_assistant_core::{f32_to_pcm16, rms_energy_db, AudioFormat};
use voice_assistant_pipeline::{TurnEvent, TurnPipeline};

use crate::device::AudioInput;
use crate::LocalSession;

/// Listener configuration
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Mic poll interval
    pub poll_interval: Duration,
    /// Energy floor for a speech frame (dB)
    pub energy_threshold_db: f32,
    /// Speech run length confirming an utterance start (ms)
    pub min_speech_ms: u32,
    /// Silence run length confirming an utterance end (ms)
    pub min_silence_ms: u32,
    /// Hard cap on utterance length (ms)
    pub max_utterance_ms: u32,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(20),
            energy_threshold_db: -45.0,
            min_speech_ms: 200,
            min_silence_ms: 600,
            max_utterance_ms: 15_000,
        }
    }
}

/// Energy run-length voice activity gating
///
/// Pure state machine over fixed 20ms frames; feeds frames in, complete
/// utterances out.
pub struct UtteranceDetector {
    config: ListenerConfig,
    in_speech: bool,
    speech_ms: u32,
    silence_ms: u32,
    /// Rolling pre-speech context prepended to each utterance
    prelude: Vec<f32>,
    utterance: Vec<f32>,
}

/// 20ms at 16kHz
const FRAME_SAMPLES: usize = 320;
const FRAME_MS: u32 = 20;
/// Pre-speech context kept, in frames (200ms)
const PRELUDE_FRAMES: usize = 10;

impl UtteranceDetector {
    pub fn new(config: ListenerConfig) -> Self {
        Self {
            config,
            in_speech: false,
            speech_ms: 0,
            silence_ms: 0,
            prelude: Vec::new(),
            utterance: Vec::new(),
        }
    }

    /// Feed one 20ms frame; returns a finished utterance when the trailing
    /// silence window closes it (or the length cap force-closes it).
    pub fn push_frame(&mut self, frame: &[f32]) -> Option<Vec<f32>> {
        let loud = rms_energy_db(frame) >= self.config.energy_threshold_db;

        if !self.in_speech {
            self.prelude.extend_from_slice(frame);
            let max_prelude = PRELUDE_FRAMES * FRAME_SAMPLES;
            if self.prelude.len() > max_prelude {
                let excess = self.prelude.len() - max_prelude;
                self.prelude.drain(..excess);
            }

            if loud {
                self.speech_ms += FRAME_MS;
                if self.speech_ms >= self.config.min_speech_ms {
                    self.in_speech = true;
                    self.silence_ms = 0;
                    self.utterance = std::mem::take(&mut self.prelude);
                }
            } else {
                self.speech_ms = 0;
            }
            return None;
        }

        self.utterance.extend_from_slice(frame);

        if loud {
            self.silence_ms = 0;
        } else {
            self.silence_ms += FRAME_MS;
        }

        let utterance_ms = (self.utterance.len() / FRAME_SAMPLES) as u32 * FRAME_MS;
        let silence_closed = self.silence_ms >= self.config.min_silence_ms;
        let capped = utterance_ms >= self.config.max_utterance_ms;

        if silence_closed || capped {
            self.reset_run();
            return Some(std::mem::take(&mut self.utterance));
        }
        None
    }

    fn reset_run(&mut self) {
        self.in_speech = false;
        self.speech_ms = 0;
        self.silence_ms = 0;
        self.prelude.clear();
    }
}

/// The listening execution unit
pub struct Listener {
    input: Arc<dyn AudioInput>,
    pipeline: Arc<TurnPipeline>,
    session: Arc<LocalSession>,
    events: mpsc::Sender<TurnEvent>,
    config: ListenerConfig,
}

impl Listener {
    pub fn new(
        input: Arc<dyn AudioInput>,
        pipeline: Arc<TurnPipeline>,
        session: Arc<LocalSession>,
        events: mpsc::Sender<TurnEvent>,
        config: ListenerConfig,
    ) -> Self {
        Self {
            input,
            pipeline,
            session,
            events,
            config,
        }
    }

    /// Run until shutdown flips
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        if let Err(e) = self.input.start() {
            tracing::error!(error = %e, "listener could not start capture");
            return;
        }
        tracing::info!("listener started");

        let mut detector = UtteranceDetector::new(self.config.clone());
        let mut residue: Vec<f32> = Vec::new();
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            residue.extend(self.input.take_samples());
            while residue.len() >= FRAME_SAMPLES {
                let frame: Vec<f32> = residue.drain(..FRAME_SAMPLES).collect();
                if let Some(utterance) = detector.push_frame(&frame) {
                    self.handle_utterance(utterance).await;
                }
            }
        }

        self.input.stop();
        tracing::info!("listener stopped");
    }

    async fn handle_utterance(&self, samples: Vec<f32>) {
        let pcm = f32_to_pcm16(&samples);
        tracing::debug!(bytes = pcm.len(), "utterance captured");

        match self
            .pipeline
            .ingest(&self.session.id, &pcm, AudioFormat::Pcm16, &self.events)
            .await
        {
            Ok(Some(command)) => {
                if command.kind.interrupts_playback() {
                    // Abort the speaker's current turn and silence queued
                    // audio before the new command is processed.
                    self.session.interrupt.set();
                    self.session.cancel_playback();
                }
                tracing::debug!(kind = ?command.kind, "command enqueued");
                self.session.queue.enqueue(command);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, "utterance discarded");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ListenerConfig {
        ListenerConfig {
            energy_threshold_db: -45.0,
            min_speech_ms: 40,
            min_silence_ms: 60,
            max_utterance_ms: 2_000,
            ..Default::default()
        }
    }

    fn loud_frame() -> Vec<f32> {
        (0..FRAME_SAMPLES).map(|i| (i as f32 * 0.1).sin() * 0.5).collect()
    }

    fn quiet_frame() -> Vec<f32> {
        vec![0.0; FRAME_SAMPLES]
    }

    #[test]
    fn test_detects_utterance_after_trailing_silence() {
        let mut detector = UtteranceDetector::new(config());

        // Speech run (2 frames = 40ms >= min_speech)
        assert!(detector.push_frame(&loud_frame()).is_none());
        assert!(detector.push_frame(&loud_frame()).is_none());
        assert!(detector.push_frame(&loud_frame()).is_none());

        // Trailing silence closes the utterance (3 frames = 60ms)
        assert!(detector.push_frame(&quiet_frame()).is_none());
        assert!(detector.push_frame(&quiet_frame()).is_none());
        let utterance = detector.push_frame(&quiet_frame()).expect("utterance");

        // Utterance carries speech and the closing silence
        assert!(utterance.len() >= 3 * FRAME_SAMPLES);
    }

    #[test]
    fn test_ignores_short_blips() {
        let mut detector = UtteranceDetector::new(config());

        // One loud frame (20ms < min_speech 40ms) then silence
        assert!(detector.push_frame(&loud_frame()).is_none());
        for _ in 0..10 {
            assert!(detector.push_frame(&quiet_frame()).is_none());
        }
    }

    #[test]
    fn test_length_cap_closes_utterance() {
        let mut detector = UtteranceDetector::new(ListenerConfig {
            max_utterance_ms: 100,
            ..config()
        });

        let mut result = None;
        for _ in 0..20 {
            result = detector.push_frame(&loud_frame());
            if result.is_some() {
                break;
            }
        }
        assert!(result.is_some(), "cap should force-close a long utterance");
    }

    #[test]
    fn test_prelude_is_included() {
        let mut detector = UtteranceDetector::new(config());

        // Quiet context before speech
        detector.push_frame(&quiet_frame());
        detector.push_frame(&quiet_frame());

        detector.push_frame(&loud_frame());
        detector.push_frame(&loud_frame());
        detector.push_frame(&loud_frame());
        detector.push_frame(&quiet_frame());
        detector.push_frame(&quiet_frame());
        let utterance = detector.push_frame(&quiet_frame()).expect("utterance");

        // Includes pre-speech context plus speech plus closing silence
        assert!(utterance.len() > 3 * FRAME_SAMPLES);
    }
}
