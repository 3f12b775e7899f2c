//! Semantic chunking with a sliding overlap.
//!
//! Text is split on semantic boundaries (paragraphs, lines, words, characters) by
//! `semchunk-rs`, then each chunk is prefixed with the tail of its predecessor so passages
//! that straddle a boundary stay retrievable.
//!
//! Sizes are measured in characters by default. Setting `TEXT_SPLITTER_TOKENIZER` to a
//! `tiktoken` model or encoding name measures them in tokens instead.

use crate::config::ChunkingSettings;
use anyhow::Error as TokenizerError;
use semchunk_rs::Chunker;
use std::sync::Arc;
use tiktoken_rs::{
    CoreBPE, cl100k_base, get_bpe_from_model, o200k_base, p50k_base, p50k_edit, r50k_base,
};

use super::types::ChunkingError;

pub(crate) type SizeCounter = Arc<dyn Fn(&str) -> usize + Send + Sync>;

/// Splits extracted text into overlapping passages under a size budget.
#[derive(Clone)]
pub struct TextChunker {
    chunk_size: usize,
    overlap: usize,
    counter: SizeCounter,
}

impl std::fmt::Debug for TextChunker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextChunker")
            .field("chunk_size", &self.chunk_size)
            .field("overlap", &self.overlap)
            .finish_non_exhaustive()
    }
}

impl TextChunker {
    /// Character-budget chunker.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, ChunkingError> {
        Self::with_counter(chunk_size, overlap, character_counter())
    }

    /// Build a chunker from configuration, loading a tokenizer when one is named.
    pub fn from_settings(settings: &ChunkingSettings) -> Result<Self, ChunkingError> {
        let counter = match settings.tokenizer.as_deref() {
            Some(name) => build_tiktoken_counter(name)?,
            None => character_counter(),
        };
        tracing::debug!(
            chunk_size = settings.chunk_size,
            overlap = settings.chunk_overlap,
            tokenizer = settings.tokenizer.as_deref().unwrap_or("characters"),
            "Configured text chunker"
        );
        Self::with_counter(settings.chunk_size, settings.chunk_overlap, counter)
    }

    pub(crate) fn with_counter(
        chunk_size: usize,
        overlap: usize,
        counter: SizeCounter,
    ) -> Result<Self, ChunkingError> {
        if chunk_size == 0 {
            return Err(ChunkingError::InvalidChunkSize);
        }
        Ok(Self {
            chunk_size,
            overlap,
            counter,
        })
    }

    /// Upper bound on each chunk's size.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Split `text` into passages. Whitespace-only input yields no passages.
    ///
    /// Base chunks are cut with room left for the overlap, so prefixing a chunk with its
    /// predecessor's tail never pushes it past `chunk_size` and never drops its own text.
    pub fn split(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        let overlap = self.effective_overlap();
        let base = self.base_chunks(text);
        if overlap == 0 || base.len() < 2 {
            return base;
        }

        let mut overlapped = Vec::with_capacity(base.len());
        overlapped.push(base[0].clone());
        for pair in base.windows(2) {
            overlapped.push(self.join_with_tail(&pair[0], &pair[1], overlap));
        }
        overlapped
    }

    fn effective_overlap(&self) -> usize {
        self.overlap.min(self.chunk_size.saturating_sub(1))
    }

    /// Chunks before the overlap is applied, each within `chunk_size - overlap`.
    fn base_chunks(&self, text: &str) -> Vec<String> {
        let budget = self.chunk_size - self.effective_overlap();
        let counter = self.counter.clone();
        let chunker = Chunker::new(
            budget,
            Box::new(move |segment: &str| counter.as_ref()(segment)),
        );

        // semchunk may admit one split past the budget; cut those back on word boundaries.
        let mut fitted = Vec::new();
        for chunk in chunker.chunk(text) {
            let mut rest = chunk.trim();
            while !rest.is_empty() {
                let head = self.prefix_within(rest, budget);
                fitted.push(head.to_string());
                rest = rest[head.len()..].trim_start();
            }
        }
        fitted
    }

    fn measure(&self, text: &str) -> usize {
        self.counter.as_ref()(text)
    }

    /// Prefix `current` with as much of `previous`'s tail as fits. Only the tail is shortened.
    fn join_with_tail(&self, previous: &str, current: &str, overlap: usize) -> String {
        let mut budget = overlap;
        loop {
            let tail = self.suffix_within(previous, budget);
            let combined = join_pair(tail, current);
            if tail.is_empty() || self.measure(&combined) <= self.chunk_size {
                return combined;
            }
            budget -= 1;
        }
    }

    /// Longest prefix of `text` that fits in `budget`, preferring a word boundary.
    /// Always returns at least one character of non-empty input.
    fn prefix_within<'a>(&self, text: &'a str, budget: usize) -> &'a str {
        let mut candidate = text;
        while self.measure(candidate) > budget {
            let shorter = match candidate.rfind(char::is_whitespace) {
                Some(idx) if !candidate[..idx].trim_end().is_empty() => {
                    candidate[..idx].trim_end()
                }
                _ => {
                    let mut chars = candidate.chars();
                    chars.next_back();
                    chars.as_str()
                }
            };
            if shorter.is_empty() {
                break;
            }
            candidate = shorter;
        }
        candidate
    }

    /// Longest left-trimmed suffix of `text` that fits in `budget`, starting on a word
    /// when the suffix holds more than one.
    fn suffix_within<'a>(&self, text: &'a str, budget: usize) -> &'a str {
        if budget == 0 {
            return "";
        }
        let mut candidate = text.trim_start();
        while !candidate.is_empty() && self.measure(candidate) > budget {
            let mut chars = candidate.chars();
            chars.next();
            candidate = chars.as_str().trim_start();
        }

        let start = text.len() - candidate.len();
        if start > 0 && !ends_with_whitespace(&text[..start]) {
            if let Some(idx) = candidate.find(char::is_whitespace) {
                let whole_words = candidate[idx..].trim_start();
                if !whole_words.is_empty() {
                    candidate = whole_words;
                }
            }
        }
        candidate
    }
}

fn join_pair(tail: &str, current: &str) -> String {
    let mut combined = String::with_capacity(tail.len() + current.len() + 1);
    if !tail.is_empty() {
        combined.push_str(tail);
        if !ends_with_whitespace(tail) && !starts_with_whitespace(current) {
            combined.push(' ');
        }
    }
    combined.push_str(current);
    combined
}

fn character_counter() -> SizeCounter {
    Arc::new(|segment: &str| segment.chars().count())
}

fn build_tiktoken_counter(name: &str) -> Result<SizeCounter, ChunkingError> {
    let target = match name.trim() {
        "" => "cl100k_base",
        trimmed => trimmed,
    };
    let encoding = resolve_encoding(target).map_err(|source| ChunkingError::Tokenizer {
        model: target.to_string(),
        source,
    })?;
    let encoding = Arc::new(encoding);
    Ok(Arc::new(move |segment: &str| {
        encoding.encode_ordinary(segment).len()
    }))
}

fn resolve_encoding(name: &str) -> Result<CoreBPE, TokenizerError> {
    if let Some(encoding) = encoding_from_name(name) {
        return encoding;
    }
    get_bpe_from_model(name)
}

fn encoding_from_name(name: &str) -> Option<Result<CoreBPE, TokenizerError>> {
    match name {
        "cl100k_base" => Some(cl100k_base()),
        "o200k_base" => Some(o200k_base()),
        "p50k_base" => Some(p50k_base()),
        "p50k_edit" => Some(p50k_edit()),
        "r50k_base" | "gpt2" => Some(r50k_base()),
        _ => None,
    }
}

fn starts_with_whitespace(text: &str) -> bool {
    text.chars().next().is_some_and(char::is_whitespace)
}

fn ends_with_whitespace(text: &str) -> bool {
    text.chars().next_back().is_some_and(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn whitespace_counter() -> SizeCounter {
        Arc::new(|segment: &str| {
            let words = segment.split_whitespace().count();
            if words == 0 && !segment.is_empty() { 1 } else { words }
        })
    }

    #[test]
    fn split_respects_word_budget() {
        let chunker = TextChunker::with_counter(2, 0, whitespace_counter()).expect("chunker");
        let chunks = chunker.split("one two three four five");
        assert_eq!(chunks, vec!["one two", "three four", "five"]);
    }

    #[test]
    fn split_applies_overlap_within_budget() {
        let counter = whitespace_counter();
        let chunker = TextChunker::with_counter(3, 1, counter.clone()).expect("chunker");
        let chunks = chunker.split("one two three four five");
        assert_eq!(chunks, vec!["one two", "two three four", "four five"]);
        for chunk in &chunks {
            assert!(counter.as_ref()(chunk) <= 3);
        }
    }

    const SENTENCE: &str = "Retrieval grounded answers must cite passages carefully and precisely. ";

    #[test]
    fn default_overlap_keeps_every_base_chunk_intact() {
        let text = SENTENCE.repeat(60);
        let chunker = TextChunker::new(900, 150).expect("chunker");
        let base = chunker.base_chunks(&text);
        let chunks = chunker.split(&text);

        assert!(chunks.len() > 1);
        assert_eq!(base.len(), chunks.len());
        for (base_chunk, chunk) in base.iter().zip(&chunks) {
            assert!(
                chunk.ends_with(base_chunk.as_str()),
                "base text lost from chunk: {chunk:?}"
            );
            assert!(chunk.chars().count() <= 900, "chunk too long: {}", chunk.len());
        }

        let base_words: Vec<&str> = base.iter().flat_map(|c| c.split_whitespace()).collect();
        assert_eq!(base_words, text.split_whitespace().collect::<Vec<_>>());
    }

    #[test]
    fn default_overlap_starts_with_previous_tail() {
        let text = SENTENCE.repeat(60);
        let vocabulary: Vec<&str> = SENTENCE.split_whitespace().collect();
        let chunker = TextChunker::new(900, 150).expect("chunker");
        let base = chunker.base_chunks(&text);
        let chunks = chunker.split(&text);

        for index in 1..chunks.len() {
            let tail = chunks[index][..chunks[index].len() - base[index].len()].trim_end();
            assert!(tail.chars().count() >= 100, "overlap too short: {tail:?}");
            assert!(tail.chars().count() <= 150, "overlap too long: {tail:?}");
            assert!(base[index - 1].ends_with(tail), "tail not from predecessor: {tail:?}");
            let first_word = tail.split_whitespace().next().unwrap_or_default();
            assert!(vocabulary.contains(&first_word), "starts mid-word: {first_word:?}");
        }
    }

    #[test]
    fn overlap_only_adds_text() {
        let text = SENTENCE.repeat(60);
        let overlapped = TextChunker::new(900, 150).expect("chunker").split(&text);
        let plain = TextChunker::new(900, 0).expect("chunker").split(&text);

        for chunk in &plain {
            assert!(chunk.chars().count() <= 900);
        }
        let plain_text = plain.join(" ");
        let overlapped_text = overlapped.join(" ");
        assert!(overlapped_text.len() > plain_text.len());
    }

    #[test]
    fn whitespace_only_input_yields_nothing() {
        let chunker = TextChunker::new(900, 150).expect("chunker");
        assert!(chunker.split("").is_empty());
        assert!(chunker.split(" \n\t ").is_empty());
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        assert!(matches!(
            TextChunker::new(0, 0),
            Err(ChunkingError::InvalidChunkSize)
        ));
    }

    #[test]
    fn short_text_stays_whole() {
        let chunker = TextChunker::new(900, 150).expect("chunker");
        assert_eq!(
            chunker.split("Paris is the capital of France."),
            vec!["Paris is the capital of France."]
        );
    }

    #[test]
    fn long_text_respects_character_budget() {
        let paragraph = "Grounded answers cite their passages. ".repeat(80);
        let chunker = TextChunker::new(200, 40).expect("chunker");
        let chunks = chunker.split(&paragraph);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 200, "chunk too long: {}", chunk.len());
        }
    }

    #[test]
    fn tokenizer_mode_counts_tokens() {
        let settings = ChunkingSettings {
            chunk_size: 5,
            chunk_overlap: 0,
            tokenizer: Some("cl100k_base".into()),
        };
        let chunker = TextChunker::from_settings(&settings).expect("chunker");
        let text = "The quick brown fox jumps over the lazy dog.";
        let chunks = chunker.split(text);
        for chunk in &chunks {
            assert!(chunker.measure(chunk) <= 5);
        }
        let words: Vec<&str> = chunks.iter().flat_map(|c| c.split_whitespace()).collect();
        assert_eq!(words, text.split_whitespace().collect::<Vec<_>>());
    }
}
