// src/embeddings/hashed.rs
// Deterministic offline embedder: feature hashing over tokens and trigrams

use async_trait::async_trait;

use super::{EmbeddingProvider, normalize_embedding};
use crate::error::Result;
use crate::text::{content_terms, tokenize};

pub const DEFAULT_HASHED_DIMENSIONS: usize = 384;

const TOKEN_WEIGHT: f32 = 1.0;
const TRIGRAM_WEIGHT: f32 = 0.35;

/// Embeds text without any network call. Similar wording gives similar
/// vectors; there is no semantic understanding beyond shared terms.
#[derive(Debug, Clone)]
pub struct HashedEmbeddings {
    dimensions: usize,
}

impl HashedEmbeddings {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(8),
        }
    }

    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];

        let mut terms = content_terms(text);
        if terms.is_empty() {
            terms = tokenize(text);
        }

        for term in &terms {
            self.add_feature(&mut vector, term.as_bytes(), TOKEN_WEIGHT);

            let padded: Vec<char> = format!("#{}#", term).chars().collect();
            for window in padded.windows(3) {
                let trigram: String = window.iter().collect();
                self.add_feature(&mut vector, trigram.as_bytes(), TRIGRAM_WEIGHT);
            }
        }

        normalize_embedding(&mut vector);
        vector
    }

    fn add_feature(&self, vector: &mut [f32], feature: &[u8], weight: f32) {
        let hash = fnv1a(feature);
        let bucket = (hash % self.dimensions as u64) as usize;
        // High bit picks the sign so collisions cancel instead of pile up
        let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

impl Default for HashedEmbeddings {
    fn default() -> Self {
        Self::new(DEFAULT_HASHED_DIMENSIONS)
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes
        .iter()
        .fold(OFFSET, |hash, b| (hash ^ *b as u64).wrapping_mul(PRIME))
}

#[async_trait]
impl EmbeddingProvider for HashedEmbeddings {
    fn model_name(&self) -> &str {
        "hashed-trigram"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_sync(t)).collect())
    }
}
