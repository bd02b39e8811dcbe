//! Audio format types and PCM utilities

use serde::{Deserialize, Serialize};

/// PCM16 normalization constant (i16 -> f32)
const PCM16_NORMALIZE: f32 = 32768.0;
/// PCM16 scaling constant (f32 -> i16)
const PCM16_SCALE: f32 = 32767.0;

/// Supported audio sample rates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SampleRate {
    /// 8kHz - Telephony
    Hz8000,
    /// 16kHz - Standard speech recognition
    #[default]
    Hz16000,
    /// 22.05kHz - TTS output
    Hz22050,
    /// 24kHz - TTS output (neural vocoders)
    Hz24000,
    /// 48kHz - Professional audio
    Hz48000,
}

impl SampleRate {
    /// Get sample rate as u32
    pub fn as_u32(&self) -> u32 {
        match self {
            SampleRate::Hz8000 => 8000,
            SampleRate::Hz16000 => 16000,
            SampleRate::Hz22050 => 22050,
            SampleRate::Hz24000 => 24000,
            SampleRate::Hz48000 => 48000,
        }
    }

    /// PCM16 mono bytes per second at this rate
    pub fn pcm16_bytes_per_sec(&self) -> usize {
        self.as_u32() as usize * 2
    }

    /// Parse from a plain integer rate, if supported
    pub fn from_u32(rate: u32) -> Option<Self> {
        match rate {
            8000 => Some(SampleRate::Hz8000),
            16000 => Some(SampleRate::Hz16000),
            22050 => Some(SampleRate::Hz22050),
            24000 => Some(SampleRate::Hz24000),
            48000 => Some(SampleRate::Hz48000),
            _ => None,
        }
    }
}

/// Audio container/encoding formats seen on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AudioFormat {
    /// Raw 16-bit signed PCM (little-endian), no container
    #[default]
    Pcm16,
    /// RIFF WAV container with PCM16 payload
    Wav,
    /// WebM/Opus (browser MediaRecorder default)
    Webm,
    /// Ogg/Opus
    Ogg,
    /// MP3
    Mp3,
}

impl AudioFormat {
    /// Whether the ASR collaborator accepts this format without transcoding
    pub fn is_asr_ready(&self) -> bool {
        matches!(self, AudioFormat::Pcm16 | AudioFormat::Wav)
    }

    /// Format name as used by the external transcoder tool
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioFormat::Pcm16 => "pcm16",
            AudioFormat::Wav => "wav",
            AudioFormat::Webm => "webm",
            AudioFormat::Ogg => "ogg",
            AudioFormat::Mp3 => "mp3",
        }
    }
}

impl std::str::FromStr for AudioFormat {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pcm16" | "pcm" | "raw" => Ok(AudioFormat::Pcm16),
            "wav" | "wave" => Ok(AudioFormat::Wav),
            "webm" => Ok(AudioFormat::Webm),
            "ogg" | "opus" => Ok(AudioFormat::Ogg),
            "mp3" => Ok(AudioFormat::Mp3),
            other => Err(crate::Error::InvalidMessage(format!(
                "unknown audio format: {other}"
            ))),
        }
    }
}

/// Convert PCM16 bytes (little-endian) to normalized f32 samples
pub fn pcm16_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|chunk| {
            let sample = i16::from_le_bytes([chunk[0], chunk[1]]);
            sample as f32 / PCM16_NORMALIZE
        })
        .collect()
}

/// Convert normalized f32 samples to PCM16 bytes (little-endian)
pub fn f32_to_pcm16(samples: &[f32]) -> Vec<u8> {
    samples
        .iter()
        .flat_map(|&sample| {
            let clamped = sample.clamp(-1.0, 1.0);
            let pcm16 = (clamped * PCM16_SCALE) as i16;
            pcm16.to_le_bytes()
        })
        .collect()
}

/// RMS energy of f32 samples in decibels
///
/// Returns -96.0 dB (floor) for empty or all-zero input.
pub fn rms_energy_db(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return -96.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    let rms = (sum_squares / samples.len() as f32).sqrt();

    if rms > 0.0 {
        20.0 * rms.log10()
    } else {
        -96.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_rate_conversions() {
        assert_eq!(SampleRate::Hz16000.as_u32(), 16000);
        assert_eq!(SampleRate::Hz16000.pcm16_bytes_per_sec(), 32000);
        assert_eq!(SampleRate::from_u32(22050), Some(SampleRate::Hz22050));
        assert_eq!(SampleRate::from_u32(44100), None);
    }

    #[test]
    fn test_pcm16_round_trip_signs() {
        let pcm16: Vec<u8> = vec![0x00, 0x40, 0x00, 0xC0]; // Two samples
        let samples = pcm16_to_f32(&pcm16);

        assert_eq!(samples.len(), 2);
        assert!(samples[0] > 0.0);
        assert!(samples[1] < 0.0);

        let back = f32_to_pcm16(&samples);
        assert_eq!(back.len(), 4);
    }

    #[test]
    fn test_energy_calculation() {
        // Silence
        assert!(rms_energy_db(&vec![0.0; 160]) < -90.0);
        // Loud constant signal
        assert!(rms_energy_db(&vec![0.5; 160]) > -10.0);
        // Empty
        assert_eq!(rms_energy_db(&[]), -96.0);
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("wav".parse::<AudioFormat>().unwrap(), AudioFormat::Wav);
        assert_eq!("PCM".parse::<AudioFormat>().unwrap(), AudioFormat::Pcm16);
        assert!("flac".parse::<AudioFormat>().is_err());
        assert!(AudioFormat::Pcm16.is_asr_ready());
        assert!(!AudioFormat::Webm.is_asr_ready());
    }
}
