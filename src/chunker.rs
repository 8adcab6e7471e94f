//! Sentence-based document chunking with tail overlap.
//!
//! Splitting is a pure function of `(text, max_chunk_size, overlap_size)`:
//! identical inputs always produce identical chunks, which keeps ingestion
//! deterministic and testable.

use serde::Serialize;
use tracing::debug;

/// Tuning knobs for the chunker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkerConfig {
    /// Maximum chunk length in bytes before the running buffer is flushed.
    pub max_chunk_size: usize,
    /// Trailing bytes of a closed chunk carried into the next one.
    pub overlap_size: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: 500,
            overlap_size: 50,
        }
    }
}

/// Summary of how a text would be (or was) chunked.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkingReport {
    /// Number of chunks produced.
    pub total_chunks: usize,
    /// Mean chunk length in bytes, `0.0` when no chunks were produced.
    pub average_chunk_size: f64,
    /// Length of the raw input text.
    pub original_size: usize,
    /// Configured maximum chunk size.
    pub max_chunk_size: usize,
    /// Configured overlap size.
    pub overlap_size: usize,
}

/// Splits documents into ordered, overlapping chunks bounded by a maximum
/// size. Stateless; cheap to clone.
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    /// Builds a chunker with the given configuration.
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    /// Returns the active configuration.
    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Splits `text` into overlapping chunks.
    ///
    /// Whitespace runs are collapsed to single spaces and the ends trimmed
    /// before any size checks. Empty or all-whitespace input yields an empty
    /// vector. Text that fits within `max_chunk_size` is returned as a single
    /// chunk. Longer text is split at sentence boundaries and sentences are
    /// accumulated greedily; each closed chunk seeds the next with its
    /// trailing `overlap_size` bytes so adjacent chunks share context.
    ///
    /// A single sentence longer than `max_chunk_size` is emitted as one
    /// oversized chunk rather than split mid-sentence.
    pub fn chunk_text(&self, text: &str) -> Vec<String> {
        let text = collapse_whitespace(text);
        if text.is_empty() {
            debug!("empty text provided for chunking");
            return Vec::new();
        }

        if text.len() <= self.config.max_chunk_size {
            return vec![text];
        }

        let sentences = split_sentences(&text);
        let mut chunks = Vec::new();
        let mut current = String::new();
        let mut overlap = String::new();

        for sentence in sentences {
            if current.len() + sentence.len() > self.config.max_chunk_size && !current.is_empty() {
                chunks.push(current.trim().to_string());
                // Seed the next chunk with the tail of the one just closed.
                current = overlap.clone();
                overlap.clear();
            }

            current.push_str(sentence);
            current.push(' ');
            overlap = tail_bytes(&current, self.config.overlap_size).to_string();
        }

        if !current.trim().is_empty() {
            chunks.push(current.trim().to_string());
        }

        debug!(chunks = chunks.len(), "split text into chunks");
        chunks
    }

    /// Reports chunk statistics for `text` without retaining the chunks.
    pub fn report(&self, text: &str) -> ChunkingReport {
        let chunks = self.chunk_text(text);
        let average = if chunks.is_empty() {
            0.0
        } else {
            chunks.iter().map(|c| c.len()).sum::<usize>() as f64 / chunks.len() as f64
        };
        ChunkingReport {
            total_chunks: chunks.len(),
            average_chunk_size: average,
            original_size: text.len(),
            max_chunk_size: self.config.max_chunk_size,
            overlap_size: self.config.overlap_size,
        }
    }
}

/// Collapses whitespace runs to single spaces and trims both ends.
fn collapse_whitespace(input: &str) -> String {
    let mut buf = String::with_capacity(input.len());
    let mut last_space = false;
    for ch in input.chars() {
        if ch.is_whitespace() {
            if !last_space && !buf.is_empty() {
                buf.push(' ');
            }
            last_space = true;
        } else {
            buf.push(ch);
            last_space = false;
        }
    }
    buf.trim_end().to_string()
}

/// Splits normalized text at sentence boundaries.
///
/// A boundary is one of `.`, `!`, `?` followed by whitespace and an ASCII
/// uppercase letter. This is a heuristic, not a tokenizer: abbreviations
/// like "Dr." before a capitalized name are split, and boundaries without a
/// following capital are missed. Kept as-is for deterministic output.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut start = 0usize;
    let mut i = 0usize;

    while i < chars.len() {
        let (pos, ch) = chars[i];
        if matches!(ch, '.' | '!' | '?') {
            let mut j = i + 1;
            while j < chars.len() && chars[j].1.is_whitespace() {
                j += 1;
            }
            if j > i + 1 && j < chars.len() && chars[j].1.is_ascii_uppercase() {
                let sentence = text[start..pos + ch.len_utf8()].trim();
                if !sentence.is_empty() {
                    sentences.push(sentence);
                }
                start = chars[j].0;
                i = j;
                continue;
            }
        }
        i += 1;
    }

    let last = text[start..].trim();
    if !last.is_empty() {
        sentences.push(last);
    }
    sentences
}

/// Returns the trailing `n` bytes of `s`, snapped forward to a character
/// boundary, or the whole string when shorter.
fn tail_bytes(s: &str, n: usize) -> &str {
    if s.len() <= n {
        return s;
    }
    let mut idx = s.len() - n;
    while !s.is_char_boundary(idx) {
        idx += 1;
    }
    &s[idx..]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker(max: usize, overlap: usize) -> Chunker {
        Chunker::new(ChunkerConfig {
            max_chunk_size: max,
            overlap_size: overlap,
        })
    }

    #[test]
    fn short_text_returns_single_chunk() {
        let text = "This is a short text.";
        let chunks = chunker(100, 20).chunk_text(text);
        assert_eq!(chunks, vec![text.to_string()]);
    }

    #[test]
    fn blank_input_returns_no_chunks() {
        assert!(chunker(100, 20).chunk_text("").is_empty());
        assert!(chunker(100, 20).chunk_text("   \n\t  ").is_empty());
    }

    #[test]
    fn whitespace_runs_are_collapsed() {
        let chunks = chunker(100, 20).chunk_text("  Hello   world.\n\nMore\ttext.  ");
        assert_eq!(chunks, vec!["Hello world. More text.".to_string()]);
    }

    #[test]
    fn long_text_produces_bounded_chunks() {
        let text = "This is a long text. It has multiple sentences. \
                    Each sentence should be properly handled. \
                    The chunking service should split this correctly. \
                    We want to ensure overlapping works too.";
        let chunks = chunker(100, 20).chunk_text(text);
        assert!(chunks.len() > 1, "long text should produce multiple chunks");
        for chunk in &chunks {
            assert!(!chunk.is_empty());
            assert_eq!(chunk, chunk.trim());
            // Overlap seeding allows up to max + overlap before a flush.
            assert!(chunk.len() <= 120, "chunk too long: {}", chunk.len());
        }
    }

    #[test]
    fn chunking_is_deterministic() {
        let text = "First sentence here. Second sentence follows. Third one too. \
                    Fourth keeps going. Fifth wraps it up nicely for everyone involved.";
        let splitter = chunker(60, 15);
        assert_eq!(splitter.chunk_text(text), splitter.chunk_text(text));
    }

    #[test]
    fn adjacent_chunks_share_overlap() {
        let text = "Alpha sentence number one is right here. Beta sentence number two lands. \
                    Gamma sentence number three arrives. Delta sentence number four closes.";
        let chunks = chunker(80, 20).chunk_text(text);
        assert!(chunks.len() >= 2);
        // The second chunk opens with the tail of the first.
        let tail = &chunks[0][chunks[0].len().saturating_sub(19)..];
        assert!(
            chunks[1].starts_with(tail.trim_start()),
            "expected {:?} to start with {:?}",
            chunks[1],
            tail
        );
    }

    #[test]
    fn oversized_sentence_is_emitted_whole() {
        let long_sentence = format!("{} end.", "word ".repeat(40).trim());
        let text = format!("Short lead-in. {long_sentence} Trailing bit.");
        let chunks = chunker(50, 10).chunk_text(&text);
        assert!(
            chunks.iter().any(|c| c.len() > 50),
            "oversized sentence should survive unsplit"
        );
        assert!(chunks.iter().all(|c| !c.is_empty()));
    }

    #[test]
    fn sentences_preserve_original_order() {
        let text = "One starts here. Two comes after. Three follows that. \
                    Four nears the end. Five finishes everything off completely.";
        let chunks = chunker(60, 0).chunk_text(text);
        let joined = chunks.join(" ");
        let mut pos = 0;
        for marker in ["One", "Two", "Three", "Four", "Five"] {
            let found = joined[pos..]
                .find(marker)
                .unwrap_or_else(|| panic!("{marker} missing or out of order"));
            pos += found;
        }
    }

    #[test]
    fn boundary_requires_following_capital() {
        // "e.g. lowercase" must not split; "End. Next" must.
        let text = "This mentions e.g. lowercase things. Next sentence starts.";
        let sentences = split_sentences(text);
        assert_eq!(sentences.len(), 2);
        assert!(sentences[0].ends_with("things."));
    }

    #[test]
    fn report_for_short_text() {
        let text = "Test text for metadata calculation.";
        let report = chunker(100, 20).report(text);
        assert_eq!(report.total_chunks, 1);
        assert_eq!(report.original_size, text.len());
        assert_eq!(report.average_chunk_size, text.len() as f64);
        assert_eq!(report.max_chunk_size, 100);
        assert_eq!(report.overlap_size, 20);
    }

    #[test]
    fn report_for_blank_text() {
        let report = chunker(100, 20).report("   ");
        assert_eq!(report.total_chunks, 0);
        assert_eq!(report.average_chunk_size, 0.0);
    }
}
