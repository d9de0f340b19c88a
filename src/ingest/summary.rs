// src/ingest/summary.rs
// Extractive summaries for ingested documents

use std::collections::HashMap;

use crate::memory::limits::SUMMARY_MAX_CHARS;
use crate::text::{content_terms, split_sentences};

/// Pick the `max_sentences` highest-scoring sentences, keep them in document
/// order and cap the result at `SUMMARY_MAX_CHARS` characters.
///
/// A sentence scores the mean normalized frequency of its content terms, so
/// long sentences don't win just by being long.
pub fn summarize(text: &str, max_sentences: usize) -> String {
    if max_sentences == 0 {
        return String::new();
    }
    let sentences = split_sentences(text);
    if sentences.is_empty() {
        return String::new();
    }

    let mut frequency: HashMap<String, usize> = HashMap::new();
    for sentence in &sentences {
        for term in content_terms(sentence) {
            *frequency.entry(term).or_default() += 1;
        }
    }
    let top = frequency.values().copied().max().unwrap_or(1) as f32;

    let mut scored: Vec<(usize, f32)> = sentences
        .iter()
        .enumerate()
        .map(|(idx, sentence)| {
            let terms = content_terms(sentence);
            let score = if terms.is_empty() {
                0.0
            } else {
                terms
                    .iter()
                    .map(|t| frequency.get(t).copied().unwrap_or_default() as f32 / top)
                    .sum::<f32>()
                    / terms.len() as f32
            };
            (idx, score)
        })
        .collect();

    // Highest score first; earlier sentences win ties
    scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    let mut picked: Vec<usize> = scored.into_iter().take(max_sentences).map(|(i, _)| i).collect();
    picked.sort_unstable();

    let summary = picked
        .into_iter()
        .map(|i| sentences[i].as_str())
        .collect::<Vec<_>>()
        .join(" ");
    cap_chars(&summary, SUMMARY_MAX_CHARS)
}

fn cap_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => text[..end].trim_end().to_string(),
        None => text.to_string(),
    }
}
