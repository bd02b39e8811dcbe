//! Speech-to-text engine
//!
//! Remote-first with an optional local fallback, consulted only when the
//! fallback is enabled by configuration. Both paths failing is a hard
//! `AsrUnavailable` - never a silent empty transcript. Non-ASR-ready
//! containers are transcoded to WAV first.

mod http;

pub use http::{HttpStt, HttpSttConfig};

use std::sync::Arc;

use voice_assistant_config::AsrConfig;
use voice_assistant_core::{
    AudioFormat, Error, Result, SampleRate, SpeechToText, Transcoder, TranscriptResult,
};

use crate::transcode::FfmpegTranscoder;

/// Remote-first / local-fallback transcription engine
pub struct SttEngine {
    remote: Arc<dyn SpeechToText>,
    local: Option<Arc<dyn SpeechToText>>,
    transcoder: Arc<dyn Transcoder>,
}

impl SttEngine {
    pub fn new(
        remote: Arc<dyn SpeechToText>,
        local: Option<Arc<dyn SpeechToText>>,
        transcoder: Arc<dyn Transcoder>,
    ) -> Self {
        Self {
            remote,
            local,
            transcoder,
        }
    }

    /// Build from settings: HTTP remote, optional HTTP local sidecar,
    /// ffmpeg transcoder.
    pub fn from_config(config: &AsrConfig) -> Result<Self> {
        let remote = Arc::new(HttpStt::new(HttpSttConfig {
            url: config.remote_url.clone(),
            language: config.language.clone(),
            timeout_ms: config.timeout_ms,
            name: "remote-stt".to_string(),
        })?);

        let local: Option<Arc<dyn SpeechToText>> = if config.local_fallback_enabled {
            Some(Arc::new(HttpStt::new(HttpSttConfig {
                url: config.local_url.clone(),
                language: config.language.clone(),
                timeout_ms: config.timeout_ms,
                name: "local-stt".to_string(),
            })?))
        } else {
            None
        };

        Ok(Self::new(remote, local, Arc::new(FfmpegTranscoder::new())))
    }

    /// Transcribe one utterance
    pub async fn transcribe(
        &self,
        audio: &[u8],
        sample_rate: SampleRate,
        format: AudioFormat,
    ) -> Result<TranscriptResult> {
        let (bytes, wire_format) = if format.is_asr_ready() {
            (std::borrow::Cow::Borrowed(audio), format)
        } else {
            let wav = self.transcoder.to_wav(audio, format, sample_rate).await?;
            (std::borrow::Cow::Owned(wav), AudioFormat::Wav)
        };

        match self.remote.transcribe(&bytes, sample_rate, wire_format).await {
            Ok(transcript) => Ok(transcript),
            Err(remote_err) => {
                let Some(local) = &self.local else {
                    return Err(Error::AsrUnavailable(format!(
                        "remote failed and local fallback disabled: {remote_err}"
                    )));
                };

                tracing::warn!(
                    error = %remote_err,
                    fallback = local.engine_name(),
                    "remote STT failed, trying local fallback"
                );

                local
                    .transcribe(&bytes, sample_rate, wire_format)
                    .await
                    .map_err(|local_err| {
                        Error::AsrUnavailable(format!(
                            "both paths failed - remote: {remote_err}; local: {local_err}"
                        ))
                    })
            }
        }
    }
}
