//! Audio transcoding
//!
//! PCM16 gets a WAV header written in-process with `hound`; container
//! formats (webm/ogg/mp3) are handed to the external `ffmpeg` tool, whose
//! stderr comes back in `Error::Conversion` diagnostics.

use async_trait::async_trait;
use std::io::Cursor;
use tokio::process::Command as ProcessCommand;

use voice_assistant_core::{AudioFormat, Error, Result, SampleRate, Transcoder};

/// Wrap raw PCM16 bytes in a mono WAV container
pub fn pcm16_to_wav(pcm: &[u8], sample_rate: SampleRate) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: sample_rate.as_u32(),
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| Error::Conversion(format!("wav writer: {e}")))?;
        for chunk in pcm.chunks_exact(2) {
            let sample = i16::from_le_bytes([chunk[0], chunk[1]]);
            writer
                .write_sample(sample)
                .map_err(|e| Error::Conversion(format!("wav write: {e}")))?;
        }
        writer
            .finalize()
            .map_err(|e| Error::Conversion(format!("wav finalize: {e}")))?;
    }
    Ok(cursor.into_inner())
}

/// ffmpeg-backed transcoder for container formats
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    /// Binary to invoke; overridable for test doubles
    binary: String,
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self {
            binary: "ffmpeg".to_string(),
        }
    }
}

impl FfmpegTranscoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn to_wav(
        &self,
        audio: &[u8],
        format: AudioFormat,
        sample_rate: SampleRate,
    ) -> Result<Vec<u8>> {
        match format {
            AudioFormat::Wav => Ok(audio.to_vec()),
            AudioFormat::Pcm16 => pcm16_to_wav(audio, sample_rate),
            AudioFormat::Webm | AudioFormat::Ogg | AudioFormat::Mp3 => {
                let input = tempfile::Builder::new()
                    .suffix(&format!(".{}", format.as_str()))
                    .tempfile()
                    .map_err(|e| Error::Conversion(format!("temp file: {e}")))?;
                tokio::fs::write(input.path(), audio)
                    .await
                    .map_err(|e| Error::Conversion(format!("temp write: {e}")))?;

                let output = tempfile::Builder::new()
                    .suffix(".wav")
                    .tempfile()
                    .map_err(|e| Error::Conversion(format!("temp file: {e}")))?;

                let result = ProcessCommand::new(&self.binary)
                    .arg("-y")
                    .arg("-i")
                    .arg(input.path())
                    .arg("-ar")
                    .arg(sample_rate.as_u32().to_string())
                    .arg("-ac")
                    .arg("1")
                    .arg("-f")
                    .arg("wav")
                    .arg(output.path())
                    .output()
                    .await
                    .map_err(|e| Error::Conversion(format!("failed to run {}: {e}", self.binary)))?;

                if !result.status.success() {
                    let stderr = String::from_utf8_lossy(&result.stderr);
                    let diagnostics: String = stderr.lines().rev().take(4).collect::<Vec<_>>()
                        .into_iter()
                        .rev()
                        .collect::<Vec<_>>()
                        .join(" | ");
                    return Err(Error::Conversion(format!(
                        "{} exited with {}: {diagnostics}",
                        self.binary, result.status
                    )));
                }

                tokio::fs::read(output.path())
                    .await
                    .map_err(|e| Error::Conversion(format!("temp read: {e}")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pcm16_to_wav_header() {
        let pcm = vec![0u8; 3200]; // 100ms of 16kHz mono
        let wav = pcm16_to_wav(&pcm, SampleRate::Hz16000).unwrap();

        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert!(wav.len() > pcm.len());
    }

    #[tokio::test]
    async fn test_wav_passthrough() {
        let transcoder = FfmpegTranscoder::new();
        let wav = pcm16_to_wav(&vec![0u8; 320], SampleRate::Hz16000).unwrap();
        let out = transcoder
            .to_wav(&wav, AudioFormat::Wav, SampleRate::Hz16000)
            .await
            .unwrap();
        assert_eq!(out, wav);
    }

    #[tokio::test]
    async fn test_missing_tool_reports_diagnostics() {
        let transcoder = FfmpegTranscoder::with_binary("ffmpeg-definitely-not-installed");
        let err = transcoder
            .to_wav(&[0u8; 16], AudioFormat::Webm, SampleRate::Hz16000)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conversion(_)));
        assert_eq!(err.error_type(), "audio_conversion_failed");
    }
}
