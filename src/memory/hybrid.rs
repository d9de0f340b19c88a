// src/memory/hybrid.rs
//! Hybrid scoring - vector similarity blended with keyword overlap.
//!
//! Single responsibility: score and rerank already-retrieved results.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::types::MemorySearchResult;
use crate::query::optimizer::normalized_weights;
use crate::text::{content_terms, tokenize};

/// Bonus when the whole query appears verbatim in the text
const PHRASE_BONUS: f32 = 0.2;

/// Blend weights, always normalized to sum to 1
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HybridWeights {
    pub vector: f32,
    pub text: f32,
}

impl HybridWeights {
    pub fn new(vector: f32, text: f32) -> Self {
        let (vector, text) = normalized_weights(vector, text);
        Self { vector, text }
    }

    pub fn combine(&self, vector_score: f32, keyword_score: f32) -> f32 {
        self.vector * vector_score + self.text * keyword_score
    }
}

impl Default for HybridWeights {
    fn default() -> Self {
        Self::new(0.7, 0.3)
    }
}

/// Keyword match score in `[0, 1]`: share of distinct query terms found in
/// `text`, plus a bonus when the query's tokens occur in order as a phrase.
pub fn keyword_score(query: &str, text: &str) -> f32 {
    let unquoted = query.replace('"', " ");
    let terms: HashSet<String> = content_terms(&unquoted).into_iter().collect();
    let text_tokens: HashSet<String> = tokenize(text).into_iter().collect();

    let coverage = if terms.is_empty() {
        0.0
    } else {
        let matched = terms.iter().filter(|t| text_tokens.contains(*t)).count();
        matched as f32 / terms.len() as f32
    };

    // Compare whole tokens so "cat" does not match inside "concatenate"
    let phrase = tokenize(&unquoted).join(" ");
    let haystack = format!(" {} ", tokenize(text).join(" "));
    let bonus = if !phrase.is_empty() && haystack.contains(&format!(" {} ", phrase)) {
        PHRASE_BONUS
    } else {
        0.0
    };

    (coverage + bonus).min(1.0)
}

/// Rescore results in place with keyword scores and re-sort them
pub fn rerank(results: &mut [MemorySearchResult], query: &str, weights: HybridWeights) {
    for result in results.iter_mut() {
        let vector = result.vector_score.unwrap_or(result.score);
        let text = keyword_score(query, &result.record.text);
        result.text_score = Some(text);
        result.score = weights.combine(vector, text);
    }
    sort_results(results);
}

/// Best score first, newer first on ties
pub fn sort_results(results: &mut [MemorySearchResult]) {
    results.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| b.record.timestamp.cmp(&a.record.timestamp))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::types::{MemoryRecord, MemoryType};

    fn result(text: &str, vector: f32) -> MemorySearchResult {
        MemorySearchResult {
            record: MemoryRecord::new(MemoryType::Document, text),
            score: vector,
            vector_score: Some(vector),
            text_score: None,
        }
    }

    #[test]
    fn test_keyword_score_coverage() {
        assert_eq!(keyword_score("rust borrow checker", "The borrow checker"), 2.0 / 3.0);
        assert_eq!(keyword_score("rust", "python only"), 0.0);
        // Stop-words don't count as terms
        assert_eq!(keyword_score("the rust", "rust"), 1.0);
    }

    #[test]
    fn test_phrase_bonus() {
        let partial = keyword_score("\"blue green\" rollout", "blue green deploys");
        assert!((partial - (2.0 / 3.0)).abs() < 1e-6);

        // Full coverage plus phrase stays capped at 1
        assert_eq!(keyword_score("blue green", "we use blue green deploys"), 1.0);

        // Stop-word-only queries score on the phrase alone
        let only_bonus = keyword_score("to be", "to be or not");
        assert!((only_bonus - 0.2).abs() < 1e-6);
        assert_eq!(keyword_score("to be", "not this one"), 0.0);
    }

    #[test]
    fn test_phrase_bonus_needs_whole_tokens() {
        assert_eq!(keyword_score("cat", "concatenate strings"), 0.0);
        assert_eq!(keyword_score("to be", "toby be"), 0.0);
        // Punctuation between the words doesn't break the phrase
        assert_eq!(keyword_score("cat food", "Cat, food and water"), 1.0);
        let only_bonus = keyword_score("to be", "(To be) continued");
        assert!((only_bonus - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_weights_normalized() {
        let w = HybridWeights::new(7.0, 3.0);
        assert!((w.vector - 0.7).abs() < 1e-6);
        assert!((w.text - 0.3).abs() < 1e-6);
        assert!((w.combine(1.0, 0.0) - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_rerank_promotes_keyword_matches() {
        let mut results = vec![
            result("unrelated gardening notes", 0.62),
            result("rotate the postgres credentials", 0.55),
        ];
        rerank(&mut results, "postgres credentials", HybridWeights::default());
        assert_eq!(results[0].record.text, "rotate the postgres credentials");
        assert_eq!(results[0].text_score, Some(1.0));
        assert_eq!(results[0].vector_score, Some(0.55));
        assert!((results[0].score - (0.7 * 0.55 + 0.3)).abs() < 1e-6);
    }
}
