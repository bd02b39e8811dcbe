//! Transcription result types

use serde::{Deserialize, Serialize};

/// Result of transcribing one utterance
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TranscriptResult {
    /// Transcribed text
    pub text: String,
    /// Confidence score (0.0 - 1.0)
    pub confidence: f32,
    /// Is this a final transcript (vs. a partial)
    pub is_final: bool,
    /// Language code reported by the engine, if any
    pub language: Option<String>,
    /// Backend that produced the transcript (for logging)
    pub backend: Option<String>,
}

impl TranscriptResult {
    /// Create a final transcript
    pub fn final_text(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence,
            is_final: true,
            ..Default::default()
        }
    }

    /// Whether the transcript carries any usable text
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_final_text() {
        let t = TranscriptResult::final_text("hello", 0.92);
        assert!(t.is_final);
        assert!(!t.is_empty());
        assert_eq!(t.confidence, 0.92);
    }

    #[test]
    fn test_whitespace_is_empty() {
        let t = TranscriptResult::final_text("   ", 0.5);
        assert!(t.is_empty());
    }
}
