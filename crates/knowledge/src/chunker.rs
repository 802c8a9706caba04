//! Sentence-aware text chunking with fixed character overlap.

use docqa_core::config::PipelineSettings;
use docqa_core::{AppError, AppResult};

use crate::types::Chunk;

/// Chunking parameters, all in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkerConfig {
    /// Maximum chunk length
    pub chunk_size: usize,

    /// Characters shared by adjacent chunks
    pub overlap: usize,

    /// How far before the size limit to look for a sentence end
    pub lookback: usize,
}

impl ChunkerConfig {
    pub fn new(chunk_size: usize, overlap: usize, lookback: usize) -> AppResult<Self> {
        if chunk_size == 0 {
            return Err(AppError::Config("chunk size must be positive".to_string()));
        }
        if overlap >= chunk_size {
            return Err(AppError::Config(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                overlap, chunk_size
            )));
        }

        Ok(Self {
            chunk_size,
            overlap,
            lookback,
        })
    }

    pub fn from_settings(settings: &PipelineSettings) -> AppResult<Self> {
        Self::new(
            settings.chunk_size,
            settings.chunk_overlap,
            settings.sentence_lookback,
        )
    }
}

/// Split normalized text into overlapping chunks.
///
/// Each chunk ends at the last sentence boundary (`.`, `!` or `?` followed by
/// whitespace or end of text) inside the lookback window before the size
/// limit, or exactly at the limit when there is none. The next chunk starts
/// `overlap` characters before the previous end, so the chunks cover the text
/// without gaps.
///
/// Returns `AppError::NoContent` for empty or whitespace-only input.
pub fn chunk_text(text: &str, config: &ChunkerConfig) -> AppResult<Vec<Chunk>> {
    if text.trim().is_empty() {
        return Err(AppError::NoContent(
            "Document has no text to chunk".to_string(),
        ));
    }

    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    let mut chunks = Vec::new();
    let mut start = 0;

    loop {
        let hard_end = (start + config.chunk_size).min(len);
        let end = if hard_end == len {
            len
        } else {
            sentence_end(&chars, start, hard_end, config).unwrap_or(hard_end)
        };

        let span: String = chars[start..end].iter().collect();
        if !span.trim().is_empty() {
            chunks.push(Chunk {
                index: chunks.len(),
                char_len: end - start,
                text: span,
                start,
                end,
            });
        }

        if end == len {
            break;
        }

        // The sentence search never ends within `overlap` of `start`, so this
        // always moves forward.
        start = end - config.overlap;
    }

    tracing::debug!(
        chunks = chunks.len(),
        chars = len,
        chunk_size = config.chunk_size,
        overlap = config.overlap,
        "Chunked text"
    );

    Ok(chunks)
}

/// Latest sentence boundary in the lookback window ending at `hard_end`.
fn sentence_end(
    chars: &[char],
    start: usize,
    hard_end: usize,
    config: &ChunkerConfig,
) -> Option<usize> {
    let earliest = (start + config.overlap + 1).max(hard_end.saturating_sub(config.lookback));

    (earliest..=hard_end).rev().find(|&pos| {
        matches!(chars[pos - 1], '.' | '!' | '?')
            && chars.get(pos).map_or(true, |c| c.is_whitespace())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(size: usize, overlap: usize, lookback: usize) -> ChunkerConfig {
        ChunkerConfig::new(size, overlap, lookback).unwrap()
    }

    /// Chunks cover the text, stay within the size and overlap by the configured amount.
    fn assert_covering(text: &str, chunks: &[Chunk], cfg: &ChunkerConfig) {
        let len = text.chars().count();
        assert_eq!(chunks.first().unwrap().start, 0);
        assert_eq!(chunks.last().unwrap().end, len);

        for chunk in chunks {
            assert!(chunk.char_len <= cfg.chunk_size);
            assert!(chunk.is_valid(cfg.chunk_size));
            let expected: String = text.chars().skip(chunk.start).take(chunk.char_len).collect();
            assert_eq!(chunk.text, expected);
        }

        for pair in chunks.windows(2) {
            assert!(pair[1].start <= pair[0].end, "gap between chunks");
            assert_eq!(pair[0].end - pair[1].start, cfg.overlap);
            assert_eq!(pair[1].index, pair[0].index + 1);
        }
    }

    #[test]
    fn test_short_text_is_single_chunk() {
        let text = "Cats are mammals. Dogs are mammals too. Fish are not.";
        let chunks = chunk_text(text, &config(1000, 100, 200)).unwrap();

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, text);
        assert_eq!(chunks[0].char_len, text.chars().count());
    }

    #[test]
    fn test_empty_text_is_no_content() {
        assert!(matches!(
            chunk_text("   ", &config(100, 10, 20)),
            Err(AppError::NoContent(_))
        ));
    }

    #[test]
    fn test_prefers_sentence_boundary() {
        let text = "One two three. Four five six seven eight nine ten.";
        let cfg = config(30, 5, 20);
        let chunks = chunk_text(text, &cfg).unwrap();

        assert_eq!(chunks[0].text, "One two three.");
        assert_covering(text, &chunks, &cfg);
    }

    #[test]
    fn test_hard_cut_without_sentence_boundary() {
        let text = "a".repeat(250);
        let cfg = config(100, 10, 30);
        let chunks = chunk_text(&text, &cfg).unwrap();

        assert_eq!(chunks[0].char_len, 100);
        assert_eq!(chunks[1].start, 90);
        assert_covering(&text, &chunks, &cfg);
    }

    #[test]
    fn test_abbreviation_without_space_is_not_a_boundary() {
        let text = "Version 1.5 of the policy covers floods and fire damage";
        let cfg = config(12, 2, 10);
        let chunks = chunk_text(text, &cfg).unwrap();

        // "1." is followed by '5', so the first cut is a hard one
        assert_eq!(chunks[0].char_len, 12);
        assert_covering(text, &chunks, &cfg);
    }

    #[test]
    fn test_coverage_on_mixed_text() {
        let text = "Wer? Ich! Das Haus ist grün. ".repeat(40);
        let text = text.trim();
        for cfg in [config(50, 10, 20), config(97, 0, 40), config(13, 12, 5)] {
            let chunks = chunk_text(text, &cfg).unwrap();
            assert_covering(text, &chunks, &cfg);
        }
    }

    #[test]
    fn test_invalid_config() {
        assert!(ChunkerConfig::new(0, 0, 0).is_err());
        assert!(ChunkerConfig::new(10, 10, 0).is_err());
    }
}
