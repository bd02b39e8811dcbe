//! Audio-quality gate
//!
//! Cheap energy and voice-activity screening applied before the ASR
//! collaborator is called. Rejection is benign: the turn short-circuits
//! back to idle with a "no speech" signal instead of an error.

use voice_assistant_config::QualityGateConfig;
use voice_assistant_core::{pcm16_to_f32, rms_energy_db, RejectReason};

/// Frame size used for the activity ratio: 20ms of 16kHz mono
const FRAME_SAMPLES: usize = 320;

/// Pre-ASR audio screening
#[derive(Debug, Clone)]
pub struct QualityGate {
    config: QualityGateConfig,
}

impl Default for QualityGate {
    fn default() -> Self {
        Self::new(QualityGateConfig::default())
    }
}

impl QualityGate {
    pub fn new(config: QualityGateConfig) -> Self {
        Self { config }
    }

    /// Screen a PCM16 utterance. `Ok(())` means worth transcribing.
    pub fn check(&self, pcm: &[u8]) -> Result<(), RejectReason> {
        if pcm.len() < self.config.min_bytes {
            return Err(RejectReason::TooShort);
        }

        let samples = pcm16_to_f32(pcm);
        let overall_db = rms_energy_db(&samples);
        if overall_db < self.config.min_energy_db {
            return Err(RejectReason::LowEnergy);
        }

        let frames: Vec<&[f32]> = samples.chunks(FRAME_SAMPLES).collect();
        let active = frames
            .iter()
            .filter(|frame| rms_energy_db(frame) >= self.config.min_energy_db)
            .count();
        let ratio = active as f32 / frames.len().max(1) as f32;

        if ratio < self.config.min_voice_ratio {
            return Err(RejectReason::LowVoiceActivity);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voice_assistant_core::f32_to_pcm16;

    fn gate() -> QualityGate {
        QualityGate::new(QualityGateConfig {
            min_energy_db: -50.0,
            min_voice_ratio: 0.1,
            min_bytes: 3200,
        })
    }

    #[test]
    fn test_rejects_short_buffer() {
        assert_eq!(gate().check(&vec![0u8; 100]), Err(RejectReason::TooShort));
    }

    #[test]
    fn test_rejects_silence() {
        let silence = f32_to_pcm16(&vec![0.0f32; 16_000]);
        assert_eq!(gate().check(&silence), Err(RejectReason::LowEnergy));
    }

    #[test]
    fn test_accepts_speech_like_signal() {
        // A sustained tone clears both the energy and activity checks
        let tone: Vec<f32> = (0..16_000)
            .map(|i| (i as f32 * 0.05).sin() * 0.3)
            .collect();
        let pcm = f32_to_pcm16(&tone);
        assert!(gate().check(&pcm).is_ok());
    }

    #[test]
    fn test_rejects_sparse_activity() {
        // One loud frame in two seconds of silence: energetic overall
        // frames, but activity ratio stays under the floor.
        let mut samples = vec![0.0f32; 32_000];
        for (i, s) in samples.iter_mut().enumerate().take(320) {
            *s = (i as f32 * 0.05).sin() * 0.9;
        }
        let pcm = f32_to_pcm16(&samples);
        let verdict = gate().check(&pcm);
        assert!(matches!(
            verdict,
            Err(RejectReason::LowVoiceActivity) | Err(RejectReason::LowEnergy)
        ));
    }
}
