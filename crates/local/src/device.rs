//! Audio device abstraction
//!
//! The Listener and Speaker units talk to traits so they are testable
//! without hardware. The cpal implementations keep the (non-Send) cpal
//! streams on dedicated threads and expose only channel/buffer handles.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate as CpalSampleRate, StreamConfig};

use voice_assistant_core::{Error, Result, SampleRate};

/// Capture sample rate (16kHz mono for speech recognition)
pub const CAPTURE_SAMPLE_RATE: u32 = 16_000;

/// Microphone-side device
pub trait AudioInput: Send + Sync {
    /// Begin capturing
    fn start(&self) -> Result<()>;
    /// Pause capturing
    fn stop(&self);
    /// Samples captured since the last call, drained
    fn take_samples(&self) -> Vec<f32>;
}

/// Speaker-side device
pub trait AudioOutput: Send + Sync {
    /// Queue samples for playback
    fn play(&self, samples: &[f32], sample_rate: SampleRate) -> Result<()>;
    /// Drop all queued audio immediately (playback cancellation)
    fn stop(&self);
    /// Samples still queued
    fn pending(&self) -> usize;
}

enum InputControl {
    Start,
    Stop,
}

/// cpal microphone capture
///
/// The stream lives on its own thread; this handle only holds the shared
/// sample buffer and a control channel.
pub struct CpalInput {
    buffer: Arc<Mutex<Vec<f32>>>,
    control: std_mpsc::Sender<InputControl>,
}

impl CpalInput {
    pub fn new() -> Result<Self> {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let (control_tx, control_rx) = std_mpsc::channel();
        let (ready_tx, ready_rx) = std_mpsc::channel();

        let thread_buffer = buffer.clone();
        std::thread::Builder::new()
            .name("audio-capture".into())
            .spawn(move || input_thread(thread_buffer, control_rx, ready_tx))
            .map_err(|e| Error::Transport(format!("capture thread: {e}")))?;

        ready_rx
            .recv()
            .map_err(|_| Error::Transport("capture thread died during init".into()))??;

        Ok(Self {
            buffer,
            control: control_tx,
        })
    }
}

impl AudioInput for CpalInput {
    fn start(&self) -> Result<()> {
        self.control
            .send(InputControl::Start)
            .map_err(|_| Error::Transport("capture thread gone".into()))
    }

    fn stop(&self) {
        let _ = self.control.send(InputControl::Stop);
    }

    fn take_samples(&self) -> Vec<f32> {
        std::mem::take(&mut *self.buffer.lock())
    }
}

fn input_thread(
    buffer: Arc<Mutex<Vec<f32>>>,
    control: std_mpsc::Receiver<InputControl>,
    ready: std_mpsc::Sender<Result<()>>,
) {
    let built = (|| {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Transport("no input device available".into()))?;

        let supported = device
            .supported_input_configs()
            .map_err(|e| Error::Transport(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= CpalSampleRate(CAPTURE_SAMPLE_RATE)
                    && c.max_sample_rate() >= CpalSampleRate(CAPTURE_SAMPLE_RATE)
            })
            .ok_or_else(|| Error::Transport("no suitable capture config found".into()))?;

        let config: StreamConfig = supported
            .with_sample_rate(CpalSampleRate(CAPTURE_SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = CAPTURE_SAMPLE_RATE,
            "audio capture initialized"
        );

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    buffer.lock().extend_from_slice(data);
                },
                |err| {
                    tracing::error!(error = %err, "audio capture error");
                },
                None,
            )
            .map_err(|e| Error::Transport(e.to_string()))?;

        Ok(stream)
    })();

    match built {
        Ok(stream) => {
            let _ = ready.send(Ok(()));
            // Stream stays alive (and paused/playing) until the handle drops
            for message in control {
                let result = match message {
                    InputControl::Start => stream.play().map_err(|e| e.to_string()),
                    InputControl::Stop => stream.pause().map_err(|e| e.to_string()),
                };
                if let Err(e) = result {
                    tracing::error!(error = %e, "capture stream control failed");
                }
            }
        }
        Err(e) => {
            let _ = ready.send(Err(e));
        }
    }
}

/// cpal speaker playback
///
/// A persistent output stream pulls from a shared sample queue; `stop`
/// clears the queue, which silences playback within one device buffer.
pub struct CpalOutput {
    queue: Arc<Mutex<VecDeque<f32>>>,
    sample_rate: SampleRate,
    // Keeps the playback thread alive; nothing is ever sent
    _control: std_mpsc::Sender<()>,
}

impl CpalOutput {
    pub fn new(sample_rate: SampleRate) -> Result<Self> {
        let queue = Arc::new(Mutex::new(VecDeque::new()));
        let (control_tx, control_rx) = std_mpsc::channel();
        let (ready_tx, ready_rx) = std_mpsc::channel();

        let thread_queue = queue.clone();
        std::thread::Builder::new()
            .name("audio-playback".into())
            .spawn(move || output_thread(thread_queue, control_rx, ready_tx, sample_rate))
            .map_err(|e| Error::Transport(format!("playback thread: {e}")))?;

        ready_rx
            .recv()
            .map_err(|_| Error::Transport("playback thread died during init".into()))??;

        Ok(Self {
            queue,
            sample_rate,
            _control: control_tx,
        })
    }
}

impl AudioOutput for CpalOutput {
    fn play(&self, samples: &[f32], sample_rate: SampleRate) -> Result<()> {
        let samples = if sample_rate == self.sample_rate {
            samples.to_vec()
        } else {
            resample(samples, sample_rate, self.sample_rate)
        };
        self.queue.lock().extend(samples);
        Ok(())
    }

    fn stop(&self) {
        self.queue.lock().clear();
    }

    fn pending(&self) -> usize {
        self.queue.lock().len()
    }
}

fn output_thread(
    queue: Arc<Mutex<VecDeque<f32>>>,
    control: std_mpsc::Receiver<()>,
    ready: std_mpsc::Sender<Result<()>>,
    sample_rate: SampleRate,
) {
    let built = (|| {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Transport("no output device available".into()))?;

        let target = CpalSampleRate(sample_rate.as_u32());
        let supported = device
            .supported_output_configs()
            .map_err(|e| Error::Transport(e.to_string()))?
            .find(|c| {
                c.channels() == 1 && c.min_sample_rate() <= target && c.max_sample_rate() >= target
            })
            .or_else(|| {
                // Fallback: stereo, duplicating the mono signal
                device.supported_output_configs().ok()?.find(|c| {
                    c.channels() == 2
                        && c.min_sample_rate() <= target
                        && c.max_sample_rate() >= target
                })
            })
            .ok_or_else(|| Error::Transport("no suitable playback config found".into()))?;

        let config: StreamConfig = supported.with_sample_rate(target).config();
        let channels = config.channels as usize;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = sample_rate.as_u32(),
            channels,
            "audio playback initialized"
        );

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut pending = queue.lock();
                    for frame in data.chunks_mut(channels) {
                        let sample = pending.pop_front().unwrap_or(0.0);
                        for out in frame.iter_mut() {
                            *out = sample;
                        }
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio playback error");
                },
                None,
            )
            .map_err(|e| Error::Transport(e.to_string()))?;

        stream
            .play()
            .map_err(|e| Error::Transport(e.to_string()))?;
        Ok(stream)
    })();

    match built {
        Ok(_stream) => {
            let _ = ready.send(Ok(()));
            // Park until the handle drops
            let _ = control.recv();
        }
        Err(e) => {
            let _ = ready.send(Err(e));
        }
    }
}

/// Resample mono audio between device rates
///
/// FFT resampler in fixed-size blocks with a linear-interpolation fallback
/// for very short buffers or resampler failures.
pub fn resample(samples: &[f32], from: SampleRate, to: SampleRate) -> Vec<f32> {
    use rubato::{FftFixedIn, Resampler};

    if from == to {
        return samples.to_vec();
    }
    if samples.len() < 64 {
        return resample_linear(samples, from, to);
    }

    const CHUNK: usize = 1024;
    let mut resampler =
        match FftFixedIn::<f64>::new(from.as_u32() as usize, to.as_u32() as usize, CHUNK, 2, 1) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "resampler init failed, using linear fallback");
                return resample_linear(samples, from, to);
            }
        };

    let mut output = Vec::with_capacity(
        samples.len() * to.as_u32() as usize / from.as_u32() as usize + CHUNK,
    );
    for chunk in samples.chunks(CHUNK) {
        let mut block: Vec<f64> = chunk.iter().map(|&s| s as f64).collect();
        block.resize(CHUNK, 0.0); // zero-pad the tail block
        match resampler.process(&[block], None) {
            Ok(frames) => output.extend(frames[0].iter().map(|&s| s as f32)),
            Err(e) => {
                tracing::warn!(error = %e, "resampling failed, using linear fallback");
                return resample_linear(samples, from, to);
            }
        }
    }
    output
}

fn resample_linear(samples: &[f32], from: SampleRate, to: SampleRate) -> Vec<f32> {
    let ratio = to.as_u32() as f64 / from.as_u32() as f64;
    let new_len = (samples.len() as f64 * ratio) as usize;

    let mut resampled = Vec::with_capacity(new_len);
    for i in 0..new_len {
        let src_idx = i as f64 / ratio;
        let idx_floor = src_idx.floor() as usize;
        let idx_ceil = (idx_floor + 1).min(samples.len().saturating_sub(1));
        let frac = (src_idx - idx_floor as f64) as f32;

        let sample = samples[idx_floor] * (1.0 - frac) + samples[idx_ceil] * frac;
        resampled.push(sample);
    }
    resampled
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resample_identity() {
        let samples = vec![0.5f32; 160];
        let out = resample(&samples, SampleRate::Hz16000, SampleRate::Hz16000);
        assert_eq!(out.len(), 160);
    }

    #[test]
    fn test_resample_halves_rate() {
        let samples = vec![0.1f32; 1600];
        let out = resample(&samples, SampleRate::Hz16000, SampleRate::Hz8000);
        // FFT blocks are zero-padded, so allow one block of slack
        assert!(out.len() >= 800 && out.len() <= 800 + 512);
    }

    #[test]
    fn test_short_buffer_uses_linear() {
        let samples = vec![0.2f32; 32];
        let out = resample(&samples, SampleRate::Hz22050, SampleRate::Hz16000);
        assert!(!out.is_empty());
        assert!(out.len() < 32);
    }
}
