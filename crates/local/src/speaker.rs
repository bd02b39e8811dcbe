//! Speaker unit
//!
//! Drains the shared command queue with a bounded (~10ms) wait and drives
//! the turn pipeline, playing synthesized audio on the local output device
//! instead of a socket. Playback is cancellable: an interrupt both stops
//! the turn at its next checkpoint and silences already-queued samples.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

use voice_assistant_core::pcm16_to_f32;
use voice_assistant_pipeline::{TurnEvent, TurnPipeline};

use crate::device::AudioOutput;
use crate::LocalSession;

/// The speaking execution unit
pub struct Speaker {
    output: Arc<dyn AudioOutput>,
    pipeline: Arc<TurnPipeline>,
    session: Arc<LocalSession>,
    dequeue_timeout: Duration,
}

impl Speaker {
    pub fn new(
        output: Arc<dyn AudioOutput>,
        pipeline: Arc<TurnPipeline>,
        session: Arc<LocalSession>,
        dequeue_timeout: Duration,
    ) -> Self {
        Self {
            output,
            pipeline,
            session,
            dequeue_timeout,
        }
    }

    /// Run until shutdown flips
    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        tracing::info!("speaker started");

        // Playback task: turn events -> output device
        let (event_tx, event_rx) = mpsc::channel::<TurnEvent>(64);
        let playback = tokio::spawn(play_events(event_rx, self.output.clone()));

        loop {
            if *shutdown.borrow() {
                break;
            }

            let Some(command) = self.session.queue.dequeue(self.dequeue_timeout).await else {
                continue;
            };

            tracing::debug!(kind = ?command.kind, "speaker picked up command");
            let result = self
                .pipeline
                .run_turn(
                    &self.session.id,
                    command,
                    &self.session.dialog,
                    &self.session.interrupt,
                    &event_tx,
                )
                .await;

            if result.error.is_none() {
                self.session.total_turns.fetch_add(1, Ordering::SeqCst);
            }
            if result.interrupted {
                // Cut whatever the device still has queued
                self.output.stop();
            }
        }

        drop(event_tx);
        let _ = playback.await;
        tracing::info!("speaker stopped");
    }
}

/// Forward turn events to the output device
async fn play_events(mut events: mpsc::Receiver<TurnEvent>, output: Arc<dyn AudioOutput>) {
    while let Some(event) = events.recv().await {
        match event {
            TurnEvent::TtsChunk {
                audio, sample_rate, ..
            } => {
                let samples = pcm16_to_f32(&audio);
                if let Err(e) = output.play(&samples, sample_rate) {
                    tracing::warn!(error = %e, "playback failed");
                }
            }
            TurnEvent::Transcription { text, .. } => {
                tracing::info!(%text, "heard");
            }
            TurnEvent::ResponseChunk { .. } => {}
            TurnEvent::StreamingComplete { total_chunks } => {
                tracing::debug!(total_chunks, "response playback queued");
            }
            TurnEvent::StreamingInterrupted { total_chunks } => {
                tracing::debug!(total_chunks, "response interrupted");
                output.stop();
            }
            TurnEvent::NoSpeech { reason } => {
                tracing::debug!(%reason, "no speech detected");
            }
            TurnEvent::TurnError {
                error_type,
                message,
            } => {
                tracing::warn!(error_type, %message, "turn failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use voice_assistant_core::{f32_to_pcm16, Result, SampleRate};

    #[derive(Default)]
    struct RecordingOutput {
        played: Mutex<Vec<f32>>,
        stops: Mutex<usize>,
    }

    impl AudioOutput for RecordingOutput {
        fn play(&self, samples: &[f32], _sample_rate: SampleRate) -> Result<()> {
            self.played.lock().extend_from_slice(samples);
            Ok(())
        }

        fn stop(&self) {
            *self.stops.lock() += 1;
            self.played.lock().clear();
        }

        fn pending(&self) -> usize {
            self.played.lock().len()
        }
    }

    #[tokio::test]
    async fn test_tts_chunks_reach_the_device() {
        let output = Arc::new(RecordingOutput::default());
        let (tx, rx) = mpsc::channel(8);
        let task = tokio::spawn(play_events(rx, output.clone()));

        let chunk = f32_to_pcm16(&vec![0.25f32; 320]);
        tx.send(TurnEvent::TtsChunk {
            audio: chunk,
            chunk_index: 0,
            format: voice_assistant_core::AudioFormat::Pcm16,
            sample_rate: SampleRate::Hz16000,
        })
        .await
        .unwrap();
        tx.send(TurnEvent::StreamingComplete { total_chunks: 1 })
            .await
            .unwrap();
        drop(tx);
        task.await.unwrap();

        assert_eq!(output.pending(), 320);
    }

    #[tokio::test]
    async fn test_interrupt_event_silences_playback() {
        let output = Arc::new(RecordingOutput::default());
        let (tx, rx) = mpsc::channel(8);
        let task = tokio::spawn(play_events(rx, output.clone()));

        let chunk = f32_to_pcm16(&vec![0.25f32; 320]);
        tx.send(TurnEvent::TtsChunk {
            audio: chunk,
            chunk_index: 0,
            format: voice_assistant_core::AudioFormat::Pcm16,
            sample_rate: SampleRate::Hz16000,
        })
        .await
        .unwrap();
        tx.send(TurnEvent::StreamingInterrupted { total_chunks: 1 })
            .await
            .unwrap();
        drop(tx);
        task.await.unwrap();

        assert_eq!(output.pending(), 0);
        assert_eq!(*output.stops.lock(), 1);
    }
}
