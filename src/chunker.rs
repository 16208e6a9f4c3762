//! Sliding-window text chunker.
//!
//! Splits document text into fixed-size overlapping character windows:
//! the first chunk starts at offset 0, each subsequent chunk starts
//! `chunk_size - overlap` characters after the previous one, and the final
//! chunk may be shorter than `chunk_size`. Chunk count and boundaries are
//! deterministic given the text and configuration.
//!
//! Each chunk receives a deterministic identifier derived from its
//! document id and position, so re-ingesting the same document upserts
//! the same records instead of duplicating them.

use sha2::{Digest, Sha256};

/// Invalid (chunk_size, overlap) configuration.
#[derive(Debug)]
pub struct InvalidConfiguration(String);

impl std::fmt::Display for InvalidConfiguration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid chunker configuration: {}", self.0)
    }
}

impl std::error::Error for InvalidConfiguration {}

/// A bounded contiguous slice of a document's text. Offsets are in
/// characters, not bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub index: usize,
    pub text: String,
    pub start: usize,
    pub end: usize,
}

/// Deterministic chunk identity: same document and position always map
/// to the same record id, which is what makes index upserts idempotent.
pub fn chunk_id(document_id: &str, index: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document_id.as_bytes());
    hasher.update(b":");
    hasher.update(index.to_le_bytes());
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
}

impl Chunker {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, InvalidConfiguration> {
        if chunk_size == 0 || overlap == 0 {
            return Err(InvalidConfiguration(
                "chunk_size and overlap must be > 0".to_string(),
            ));
        }
        if overlap >= chunk_size {
            return Err(InvalidConfiguration(format!(
                "overlap ({}) must be < chunk_size ({})",
                overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    /// Lazy chunk sequence over `text`. Calling this again yields a fresh
    /// iterator over the same deterministic chunks.
    pub fn chunks<'a>(&self, document_id: &'a str, text: &'a str) -> Chunks<'a> {
        // Byte offset of every char, plus a terminal sentinel, so windows
        // expressed in characters can slice the original str.
        let mut byte_offsets: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
        byte_offsets.push(text.len());

        Chunks {
            document_id,
            text,
            byte_offsets,
            chunk_size: self.chunk_size,
            step: self.chunk_size - self.overlap,
            start: 0,
            index: 0,
            done: false,
        }
    }
}

pub struct Chunks<'a> {
    document_id: &'a str,
    text: &'a str,
    byte_offsets: Vec<usize>,
    chunk_size: usize,
    step: usize,
    start: usize,
    index: usize,
    done: bool,
}

impl<'a> Chunks<'a> {
    fn char_count(&self) -> usize {
        self.byte_offsets.len() - 1
    }
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        let total = self.char_count();
        if self.done || self.start >= total {
            return None;
        }

        let start = self.start;
        let end = (start + self.chunk_size).min(total);
        let slice = &self.text[self.byte_offsets[start]..self.byte_offsets[end]];

        let chunk = Chunk {
            id: chunk_id(self.document_id, self.index),
            document_id: self.document_id.to_string(),
            index: self.index,
            text: slice.to_string(),
            start,
            end,
        };

        self.index += 1;
        if end == total {
            self.done = true;
        } else {
            self.start = start + self.step;
        }

        Some(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundaries_for_1200_chars_at_500_50() {
        let text = "x".repeat(1200);
        let chunker = Chunker::new(500, 50).unwrap();
        let chunks: Vec<Chunk> = chunker.chunks("doc1", &text).collect();

        assert_eq!(chunks.len(), 3);
        assert_eq!((chunks[0].start, chunks[0].end), (0, 500));
        assert_eq!((chunks[1].start, chunks[1].end), (450, 950));
        assert_eq!((chunks[2].start, chunks[2].end), (900, 1200));
        assert_eq!(chunks[2].text.len(), 300);
    }

    #[test]
    fn exact_multiple_has_no_empty_tail() {
        let text = "y".repeat(500);
        let chunker = Chunker::new(500, 50).unwrap();
        let chunks: Vec<Chunk> = chunker.chunks("doc1", &text).collect();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].end, 500);
    }

    #[test]
    fn short_text_single_chunk() {
        let chunker = Chunker::new(500, 50).unwrap();
        let chunks: Vec<Chunk> = chunker.chunks("doc1", "hello world").collect();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "hello world");
        assert_eq!(chunks[0].index, 0);
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        let chunker = Chunker::new(500, 50).unwrap();
        assert_eq!(chunker.chunks("doc1", "").count(), 0);
    }

    #[test]
    fn consecutive_chunks_overlap_by_configured_amount() {
        let text: String = ('a'..='z').cycle().take(1000).collect();
        let chunker = Chunker::new(300, 60).unwrap();
        let chunks: Vec<Chunk> = chunker.chunks("doc1", &text).collect();

        for pair in chunks.windows(2) {
            let tail: String = pair[0].text.chars().skip(pair[0].text.chars().count() - 60).collect();
            let head: String = pair[1].text.chars().take(60).collect();
            assert_eq!(tail, head);
        }
    }

    #[test]
    fn offsets_are_character_not_byte_offsets() {
        // Multi-byte chars; 10 chars is 30 bytes here.
        let text = "日本語テキストの分割処理".to_string() + &"あ".repeat(100);
        let chunker = Chunker::new(40, 10).unwrap();
        let chunks: Vec<Chunk> = chunker.chunks("doc1", &text).collect();

        assert_eq!(chunks[0].start, 0);
        assert_eq!(chunks[1].start, 30);
        for c in &chunks {
            assert_eq!(c.text.chars().count(), c.end - c.start);
        }
    }

    #[test]
    fn restartable_and_deterministic() {
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(40);
        let chunker = Chunker::new(200, 40).unwrap();
        let first: Vec<Chunk> = chunker.chunks("doc1", &text).collect();
        let second: Vec<Chunk> = chunker.chunks("doc1", &text).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn ids_are_stable_per_position_and_distinct_per_document() {
        assert_eq!(chunk_id("doc1", 3), chunk_id("doc1", 3));
        assert_ne!(chunk_id("doc1", 3), chunk_id("doc1", 4));
        assert_ne!(chunk_id("doc1", 3), chunk_id("doc2", 3));
    }

    #[test]
    fn overlap_equal_to_chunk_size_rejected() {
        let err = Chunker::new(100, 100).unwrap_err();
        assert!(err.to_string().contains("overlap"));
    }

    #[test]
    fn non_positive_values_rejected() {
        assert!(Chunker::new(0, 1).is_err());
        assert!(Chunker::new(100, 0).is_err());
    }
}
