//! Sentence segmentation for streaming generation
//!
//! Buffers LLM fragments and emits speakable segments at sentence
//! boundaries, or at a character cap so time-to-first-audio stays bounded
//! when the model writes one long sentence.

/// Sentence terminators recognized as segment boundaries
const TERMINATORS: &[char] = &['.', '!', '?', ';', ':', '\n'];

/// Accumulates streamed text and yields segments for synthesis
#[derive(Debug)]
pub struct SentenceSegmenter {
    buffer: String,
    max_chars: usize,
}

impl SentenceSegmenter {
    pub fn new(max_chars: usize) -> Self {
        Self {
            buffer: String::new(),
            max_chars,
        }
    }

    /// Append a fragment, returning any segments it completed
    pub fn push(&mut self, fragment: &str) -> Vec<String> {
        self.buffer.push_str(fragment);

        let mut segments = Vec::new();
        loop {
            if let Some(boundary) = self.find_boundary() {
                let segment: String = self.buffer.drain(..boundary).collect();
                let segment = segment.trim().to_string();
                if !segment.is_empty() {
                    segments.push(segment);
                }
                continue;
            }

            // No boundary: cut at a word break once past the cap
            if self.buffer.chars().count() >= self.max_chars {
                if let Some(cut) = self.buffer.rfind(char::is_whitespace) {
                    if cut > 0 {
                        let segment: String = self.buffer.drain(..cut).collect();
                        let segment = segment.trim().to_string();
                        if !segment.is_empty() {
                            segments.push(segment);
                        }
                        continue;
                    }
                }
            }
            break;
        }
        segments
    }

    /// Byte index just past the first terminator run, if any
    fn find_boundary(&self) -> Option<usize> {
        let mut iter = self.buffer.char_indices().peekable();
        while let Some((i, c)) = iter.next() {
            if TERMINATORS.contains(&c) {
                // Swallow consecutive terminators ("..." / "?!")
                let mut end = i + c.len_utf8();
                while let Some(&(j, next)) = iter.peek() {
                    if TERMINATORS.contains(&next) {
                        end = j + next.len_utf8();
                        iter.next();
                    } else {
                        break;
                    }
                }
                return Some(end);
            }
        }
        None
    }

    /// Drain whatever remains (end of generation)
    pub fn flush(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        let rest = rest.trim().to_string();
        if rest.is_empty() {
            None
        } else {
            Some(rest)
        }
    }

    /// Characters currently buffered
    pub fn buffered(&self) -> usize {
        self.buffer.chars().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentence_boundaries() {
        let mut seg = SentenceSegmenter::new(100);
        let out = seg.push("Hello world. How are you?");
        assert_eq!(out, vec!["Hello world.", "How are you?"]);
        assert_eq!(seg.buffered(), 0);
    }

    #[test]
    fn test_partial_fragment_buffers() {
        let mut seg = SentenceSegmenter::new(100);
        assert!(seg.push("The markets are ").is_empty());
        let out = seg.push("up today.");
        assert_eq!(out, vec!["The markets are up today."]);
    }

    #[test]
    fn test_char_cap_cuts_at_word_break() {
        let mut seg = SentenceSegmenter::new(20);
        let out = seg.push("one two three four five six seven");
        assert!(!out.is_empty());
        for piece in &out {
            // Cut lands on a word boundary, never mid-word
            assert!(!piece.starts_with(' ') && !piece.ends_with(' '));
        }
    }

    #[test]
    fn test_ellipsis_is_one_boundary() {
        let mut seg = SentenceSegmenter::new(100);
        let out = seg.push("Wait... there's more.");
        assert_eq!(out, vec!["Wait...", "there's more."]);
    }

    #[test]
    fn test_flush_returns_remainder() {
        let mut seg = SentenceSegmenter::new(100);
        seg.push("trailing words without a terminator");
        assert_eq!(
            seg.flush().as_deref(),
            Some("trailing words without a terminator")
        );
        assert!(seg.flush().is_none());
    }
}
