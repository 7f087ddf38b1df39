//! Bounded, overlapping text chunker.
//!
//! Splits document text into chunks of at most `size` characters where
//! consecutive chunks share exactly `overlap` characters. Cuts prefer a
//! paragraph or sentence boundary found within `slack` characters before the
//! hard limit. Spans are character offsets into the input, so concatenating
//! chunk 0 with the non-overlapping tails of the following chunks reproduces
//! the input exactly.

use std::ops::Range;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChunkerError {
    #[error("document text is empty or whitespace-only")]
    EmptyInput,

    #[error("chunk overlap {overlap} must be smaller than chunk size {size}")]
    InvalidOverlap { size: usize, overlap: usize },
}

/// One bounded slice of a document.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkSlice {
    pub text: String,
    pub ordinal: usize,
    /// Character offsets `[start, end)` into the source text.
    pub span: Range<usize>,
}

#[derive(Debug, Clone)]
pub struct Chunker {
    size: usize,
    overlap: usize,
    slack: usize,
}

impl Chunker {
    pub fn new(size: usize, overlap: usize, slack: usize) -> Result<Self, ChunkerError> {
        if overlap >= size {
            return Err(ChunkerError::InvalidOverlap { size, overlap });
        }
        // The boundary search may never back up past the overlap of the
        // previous chunk, or the cursor would stop advancing.
        let slack = slack.min(size - overlap - 1);
        Ok(Self {
            size,
            overlap,
            slack,
        })
    }

    /// Split `text` into ordered, overlapping chunks covering the whole input.
    pub fn split(&self, text: &str) -> Result<Vec<ChunkSlice>, ChunkerError> {
        if text.trim().is_empty() {
            return Err(ChunkerError::EmptyInput);
        }

        let chars: Vec<char> = text.chars().collect();
        let total = chars.len();

        if total <= self.size {
            return Ok(vec![ChunkSlice {
                text: text.to_string(),
                ordinal: 0,
                span: 0..total,
            }]);
        }

        let mut chunks = Vec::new();
        let mut start = 0;
        loop {
            let hard_end = (start + self.size).min(total);
            let end = if hard_end == total {
                total
            } else {
                self.find_cut(&chars, start, hard_end)
            };

            chunks.push(ChunkSlice {
                text: chars[start..end].iter().collect(),
                ordinal: chunks.len(),
                span: start..end,
            });

            if end == total {
                break;
            }
            start = end - self.overlap;
        }

        Ok(chunks)
    }

    /// Pick a cut point in `(start, hard_end]`, preferring a paragraph break,
    /// then a sentence end, within the slack window. Falls back to the hard
    /// limit. The floor keeps every chunk longer than the overlap so the
    /// cursor always advances.
    fn find_cut(&self, chars: &[char], start: usize, hard_end: usize) -> usize {
        let floor = hard_end.saturating_sub(self.slack).max(start + self.overlap + 1);

        for end in (floor..=hard_end).rev() {
            if end >= 2 && chars[end - 1] == '\n' && chars[end - 2] == '\n' {
                return end;
            }
        }

        for end in (floor..=hard_end).rev() {
            if matches!(chars[end - 1], '.' | '!' | '?' | '\n' | '。') {
                return end;
            }
        }

        hard_end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Rebuild the original text from chunk 0 plus the non-overlapping tail
    /// of each following chunk.
    fn reconstruct(chunks: &[ChunkSlice], overlap: usize) -> String {
        let mut out = String::new();
        for (i, chunk) in chunks.iter().enumerate() {
            if i == 0 {
                out.push_str(&chunk.text);
            } else {
                out.extend(chunk.text.chars().skip(overlap));
            }
        }
        out
    }

    #[test]
    fn test_short_text_is_one_chunk() {
        let chunker = Chunker::new(100, 20, 10).unwrap();
        let chunks = chunker.split("A short requirement.").unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].span, 0..20);
        assert_eq!(chunks[0].text, "A short requirement.");
    }

    #[test]
    fn test_empty_input_is_an_error() {
        let chunker = Chunker::new(100, 20, 10).unwrap();
        assert!(matches!(chunker.split(""), Err(ChunkerError::EmptyInput)));
        assert!(matches!(
            chunker.split("   \n\n \t "),
            Err(ChunkerError::EmptyInput)
        ));
    }

    #[test]
    fn test_invalid_overlap_rejected() {
        assert!(matches!(
            Chunker::new(100, 100, 10),
            Err(ChunkerError::InvalidOverlap { .. })
        ));
        assert!(matches!(
            Chunker::new(100, 150, 10),
            Err(ChunkerError::InvalidOverlap { .. })
        ));
    }

    #[test]
    fn test_round_trip_reconstruction() {
        let chunker = Chunker::new(80, 16, 24).unwrap();
        let text = "The checkout page lets a signed-in user apply a discount code. \
                    Invalid codes show an inline error.\n\n\
                    The cart keeps its contents for thirty days. Removing the last \
                    item disables the checkout button until a product is added again.\n\n\
                    Payments are handled by an external provider.";
        let chunks = chunker.split(text).unwrap();
        assert!(chunks.len() >= 3);
        assert_eq!(reconstruct(&chunks, 16), text);
    }

    #[test]
    fn test_size_and_overlap_bounds() {
        let chunker = Chunker::new(50, 10, 15).unwrap();
        let text = "word ".repeat(100);
        let chunks = chunker.split(&text).unwrap();

        for chunk in &chunks {
            assert!(chunk.text.chars().count() <= 50, "chunk exceeds size");
            assert!(chunk.text.chars().count() > 10 || chunk.ordinal == chunks.len() - 1);
        }
        for pair in chunks.windows(2) {
            // Consecutive chunks share exactly the overlap
            assert_eq!(pair[1].span.start, pair[0].span.end - 10);
            let tail: String = pair[0].text.chars().skip(pair[0].text.chars().count() - 10).collect();
            let head: String = pair[1].text.chars().take(10).collect();
            assert_eq!(tail, head);
        }
        assert_eq!(reconstruct(&chunks, 10), text);
    }

    #[test]
    fn test_prefers_paragraph_boundary() {
        let chunker = Chunker::new(60, 10, 30).unwrap();
        let text = format!("{}\n\n{}", "a".repeat(45), "b".repeat(45));
        let chunks = chunker.split(&text).unwrap();
        // First cut should land right after the blank line, not at char 60
        assert_eq!(chunks[0].span.end, 47);
        assert!(chunks[0].text.ends_with("\n\n"));
    }

    #[test]
    fn test_prefers_sentence_boundary_over_hard_cut() {
        let chunker = Chunker::new(60, 10, 30).unwrap();
        let text = format!("{}. {}", "a".repeat(40), "b".repeat(60));
        let chunks = chunker.split(&text).unwrap();
        assert_eq!(chunks[0].span.end, 41);
        assert!(chunks[0].text.ends_with('.'));
    }

    #[test]
    fn test_hard_cut_when_no_boundary() {
        let chunker = Chunker::new(50, 10, 20).unwrap();
        let text = "x".repeat(200);
        let chunks = chunker.split(&text).unwrap();
        assert_eq!(chunks[0].span, 0..50);
        assert_eq!(chunks[1].span.start, 40);
        assert_eq!(reconstruct(&chunks, 10), text);
    }

    #[test]
    fn test_spans_stay_within_bounds_and_ordinals_are_contiguous() {
        let chunker = Chunker::new(64, 8, 16).unwrap();
        let text = "Sentences everywhere. ".repeat(40);
        let chunks = chunker.split(&text).unwrap();
        let total = text.chars().count();
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.ordinal, i);
            assert!(chunk.span.start < chunk.span.end);
            assert!(chunk.span.end <= total);
        }
        assert_eq!(chunks[0].span.start, 0);
        assert_eq!(chunks.last().unwrap().span.end, total);
    }

    #[test]
    fn test_multibyte_text() {
        let chunker = Chunker::new(30, 5, 10).unwrap();
        let text = "要件定義はここにある。".repeat(10);
        let chunks = chunker.split(&text).unwrap();
        assert!(chunks.len() >= 2);
        assert_eq!(reconstruct(&chunks, 5), text);
    }
}
