//! Audio transcoding trait
//!
//! Container conversion is delegated to an external tool; this trait is the
//! seam. Failures carry the tool's diagnostics in `Error::Conversion`.

use crate::{AudioFormat, Result, SampleRate};
use async_trait::async_trait;

/// Converts encoded audio into WAV for the ASR collaborator
#[async_trait]
pub trait Transcoder: Send + Sync + 'static {
    /// Convert `audio` from `format` into a 16-bit mono WAV at `sample_rate`
    async fn to_wav(
        &self,
        audio: &[u8],
        format: AudioFormat,
        sample_rate: SampleRate,
    ) -> Result<Vec<u8>>;
}
