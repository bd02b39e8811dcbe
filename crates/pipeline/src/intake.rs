//! Audio intake buffer
//!
//! Per-session byte accumulator between the transport and the ASR stage.
//! A push flushes the buffer (returns its contents, cleared) when the chunk
//! carries the final flag, or when the buffer already held at least the
//! threshold before the chunk arrived. The pre-append threshold check keeps
//! a final chunk in the same flush as the utterance it terminates.

/// Default flush threshold: ~1s of 16kHz mono 16-bit audio
pub const DEFAULT_THRESHOLD_BYTES: usize = 32_000;

/// Accumulates audio fragments until ready for transcription
#[derive(Debug)]
pub struct AudioIntakeBuffer {
    data: Vec<u8>,
    threshold: usize,
}

impl Default for AudioIntakeBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD_BYTES)
    }
}

impl AudioIntakeBuffer {
    pub fn new(threshold: usize) -> Self {
        Self {
            data: Vec::with_capacity(threshold),
            threshold,
        }
    }

    /// Append a fragment; returns the accumulated bytes when the buffer
    /// flushes, leaving it empty.
    pub fn push(&mut self, chunk: &[u8], is_final: bool) -> Option<Vec<u8>> {
        let held_before = self.data.len();
        self.data.extend_from_slice(chunk);

        if is_final || held_before >= self.threshold {
            if self.data.is_empty() {
                return None;
            }
            return Some(std::mem::take(&mut self.data));
        }
        None
    }

    /// Force a flush regardless of thresholds (stop_listening, teardown)
    pub fn flush(&mut self) -> Option<Vec<u8>> {
        if self.data.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.data))
        }
    }

    /// Bytes currently held
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Discard everything held
    pub fn clear(&mut self) {
        self.data.clear();
    }
}
