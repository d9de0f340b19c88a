// src/ingest/chunker.rs
//! Document chunking on paragraph, sentence and word boundaries

use serde::{Deserialize, Serialize};

use crate::config::IngestConfig;
use crate::error::{MemoryError, Result};
use crate::text::split_sentences;

/// How a document is split into chunks. Sizes are in characters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChunkingStrategy {
    /// Fixed windows with overlap
    FixedSize { chunk_size: usize, overlap: usize },
    /// Pack whole paragraphs up to `target_size`, splitting only what exceeds `max_size`
    Semantic {
        target_size: usize,
        max_size: usize,
        min_size: usize,
    },
}

impl Default for ChunkingStrategy {
    fn default() -> Self {
        ChunkingStrategy::Semantic {
            target_size: 1000,
            max_size: 1500,
            min_size: 200,
        }
    }
}

impl ChunkingStrategy {
    pub fn validate(&self) -> Result<()> {
        match *self {
            ChunkingStrategy::FixedSize { chunk_size, overlap } => {
                if chunk_size == 0 || overlap >= chunk_size {
                    return Err(MemoryError::InvalidInput(format!(
                        "fixed-size chunking needs chunk_size > overlap (got {} and {})",
                        chunk_size, overlap
                    )));
                }
            }
            ChunkingStrategy::Semantic {
                target_size,
                max_size,
                min_size,
            } => {
                if target_size == 0 || min_size > target_size || target_size > max_size {
                    return Err(MemoryError::InvalidInput(format!(
                        "semantic chunking needs min <= target <= max (got {}, {}, {})",
                        min_size, target_size, max_size
                    )));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct DocumentChunker {
    strategy: ChunkingStrategy,
}

impl DocumentChunker {
    pub fn with_strategy(strategy: ChunkingStrategy) -> Result<Self> {
        strategy.validate()?;
        Ok(Self { strategy })
    }

    /// Semantic chunker sized from the ingest settings
    pub fn from_config(config: &IngestConfig) -> Result<Self> {
        Self::with_strategy(ChunkingStrategy::Semantic {
            target_size: config.chunk_target_size,
            max_size: config.chunk_max_size,
            min_size: config.chunk_min_size,
        })
    }

    pub fn strategy(&self) -> &ChunkingStrategy {
        &self.strategy
    }

    /// Split a document. Empty input yields no chunks; nothing non-blank is dropped.
    pub fn chunk_document(&self, content: &str) -> Vec<String> {
        if content.trim().is_empty() {
            return Vec::new();
        }
        match self.strategy {
            ChunkingStrategy::FixedSize { chunk_size, overlap } => {
                chunk_fixed_size(content, chunk_size, overlap)
            }
            ChunkingStrategy::Semantic {
                target_size,
                max_size,
                min_size,
            } => chunk_semantic(content, target_size, max_size, min_size),
        }
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn chunk_fixed_size(content: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = content.chars().collect();
    let step = chunk_size - overlap;
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let end = (start + chunk_size).min(chars.len());
        let chunk: String = chars[start..end].iter().collect();
        if !chunk.trim().is_empty() {
            chunks.push(chunk);
        }
        if end == chars.len() {
            break;
        }
        start += step;
    }
    chunks
}

fn chunk_semantic(content: &str, target: usize, max: usize, min: usize) -> Vec<String> {
    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();

    let flush = |current: &mut String, chunks: &mut Vec<String>| {
        let chunk = current.trim();
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }
        current.clear();
    };

    for paragraph in split_paragraphs(content) {
        let para_len = char_len(&paragraph);
        let current_len = char_len(&current);

        if para_len > max {
            flush(&mut current, &mut chunks);
            for piece in split_oversized(&paragraph, max) {
                let piece_len = char_len(&piece);
                let current_len = char_len(&current);
                if current_len > 0 && current_len + 1 + piece_len > max {
                    flush(&mut current, &mut chunks);
                }
                if !current.is_empty() {
                    current.push(' ');
                }
                current.push_str(&piece);
            }
        } else if current_len > 0 && current_len + 2 + para_len > target {
            // Past the target: close the chunk unless it is still undersized
            // and the paragraph fits under the hard cap
            if current_len >= min || current_len + 2 + para_len > max {
                flush(&mut current, &mut chunks);
                current.push_str(&paragraph);
            } else {
                current.push_str("\n\n");
                current.push_str(&paragraph);
            }
        } else {
            if !current.is_empty() {
                current.push_str("\n\n");
            }
            current.push_str(&paragraph);
        }
    }
    flush(&mut current, &mut chunks);

    merge_small_tail(chunks, max, min)
}

/// Fold an undersized last chunk into its predecessor when the result fits
fn merge_small_tail(mut chunks: Vec<String>, max: usize, min: usize) -> Vec<String> {
    if chunks.len() < 2 {
        return chunks;
    }
    let last_len = chunks.last().map(|c| char_len(c)).unwrap_or_default();
    let prev_len = char_len(&chunks[chunks.len() - 2]);
    if last_len < min && prev_len + 2 + last_len <= max {
        if let Some(last) = chunks.pop() {
            if let Some(prev) = chunks.last_mut() {
                prev.push_str("\n\n");
                prev.push_str(&last);
            }
        }
    }
    chunks
}

/// Paragraphs separated by blank lines, trimmed, blanks dropped
fn split_paragraphs(content: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in content.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                paragraphs.push(current.join("\n"));
                current.clear();
            }
        } else {
            current.push(line.trim_end());
        }
    }
    if !current.is_empty() {
        paragraphs.push(current.join("\n"));
    }
    paragraphs
}

/// Sentences of an oversized paragraph, with any sentence still over `max`
/// broken on word boundaries
fn split_oversized(paragraph: &str, max: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    for sentence in split_sentences(paragraph) {
        if char_len(&sentence) <= max {
            pieces.push(sentence);
        } else {
            pieces.extend(split_words(&sentence, max));
        }
    }
    pieces
}

fn split_words(text: &str, max: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let word_len = char_len(word);
        if current_len > 0 && current_len + 1 + word_len > max {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if word_len > max {
            // A single run with no whitespace: hard split on chars
            let chars: Vec<char> = word.chars().collect();
            for window in chars.chunks(max) {
                chunks.push(window.iter().collect());
            }
            continue;
        }
        if current_len > 0 {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(word);
        current_len += word_len;
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn semantic(target: usize, max: usize, min: usize) -> DocumentChunker {
        DocumentChunker::with_strategy(ChunkingStrategy::Semantic {
            target_size: target,
            max_size: max,
            min_size: min,
        })
        .unwrap()
    }

    #[test]
    fn test_fixed_size_chunking_overlaps() {
        let chunker = DocumentChunker::with_strategy(ChunkingStrategy::FixedSize {
            chunk_size: 10,
            overlap: 2,
        })
        .unwrap();

        let chunks = chunker.chunk_document("abcdefghijklmnopqrstuvwxyz");
        assert_eq!(chunks, vec!["abcdefghij", "ijklmnopqr", "qrstuvwxyz"]);
    }

    #[test]
    fn test_invalid_strategies_rejected() {
        assert!(DocumentChunker::with_strategy(ChunkingStrategy::FixedSize {
            chunk_size: 10,
            overlap: 10
        })
        .is_err());
        assert!(DocumentChunker::with_strategy(ChunkingStrategy::Semantic {
            target_size: 100,
            max_size: 50,
            min_size: 10
        })
        .is_err());
    }

    #[test]
    fn test_small_document_is_one_chunk() {
        let chunker = DocumentChunker::default();
        let content = "First paragraph here.\n\nSecond paragraph here.\n\nThird paragraph.";
        let chunks = chunker.chunk_document(content);
        assert_eq!(chunks, vec![content.to_string()]);
    }

    #[test]
    fn test_paragraphs_packed_to_target() {
        let chunker = semantic(50, 80, 10);
        let para = "x".repeat(30);
        let content = format!("{para}\n\n{para}\n\n{para}");
        let chunks = chunker.chunk_document(&content);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c == &para));
    }

    #[test]
    fn test_oversized_paragraph_split_on_sentences() {
        let chunker = semantic(40, 60, 5);
        let content = "Alpha beta gamma delta epsilon. Zeta eta theta iota kappa. \
                       Lambda mu nu xi omicron pi rho. Sigma tau upsilon.";
        let chunks = chunker.chunk_document(content);
        assert!(chunks.len() >= 2);
        assert!(chunks.iter().all(|c| c.chars().count() <= 60));
        assert!(chunks[0].starts_with("Alpha beta"));
        assert!(chunks.last().unwrap().ends_with("Sigma tau upsilon."));
    }

    #[test]
    fn test_long_word_hard_split() {
        let chunker = semantic(10, 20, 1);
        let chunks = chunker.chunk_document(&"y".repeat(45));
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.len() <= 20));
    }

    #[test]
    fn test_small_tail_merged_not_dropped() {
        let chunker = semantic(50, 80, 20);
        let big = "z".repeat(45);
        let content = format!("{big}\n\n{big}\n\ntail");
        let chunks = chunker.chunk_document(&content);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[1].ends_with("tail"));
    }

    #[test]
    fn test_blank_document() {
        assert!(DocumentChunker::default().chunk_document("  \n\n ").is_empty());
    }
}
