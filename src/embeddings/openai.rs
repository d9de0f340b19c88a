// src/embeddings/openai.rs
// OpenAI embeddings API client (text-embedding-3-small / -large)

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::EmbeddingProvider;
use crate::config::EmbeddingConfig;
use crate::error::{MemoryError, Result};
use crate::text::truncate_at_boundary;

/// Token ceiling of a single embedding input
const MAX_INPUT_TOKENS: usize = 8192;

/// Rough English ratio; memory text is cut before it reaches the API
const CHARS_PER_TOKEN: usize = 4;

/// Longer memory text is truncated on a char boundary before embedding
const MAX_TEXT_CHARS: usize = MAX_INPUT_TOKENS * CHARS_PER_TOKEN;

/// Max texts per batch request (OpenAI allows 2048; we stay well under the
/// per-request token ceiling)
const MAX_BATCH_SIZE: usize = 256;

/// Supported `/v1/embeddings` models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum OpenAiEmbeddingModel {
    /// text-embedding-3-small: 1536 default dims
    #[default]
    TextEmbedding3Small,
    /// text-embedding-3-large: 3072 default dims
    TextEmbedding3Large,
}

impl OpenAiEmbeddingModel {
    pub fn model_name(&self) -> &'static str {
        match self {
            Self::TextEmbedding3Small => "text-embedding-3-small",
            Self::TextEmbedding3Large => "text-embedding-3-large",
        }
    }

    pub fn default_dimensions(&self) -> usize {
        match self {
            Self::TextEmbedding3Small => 1536,
            Self::TextEmbedding3Large => 3072,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim() {
            "text-embedding-3-small" => Some(Self::TextEmbedding3Small),
            "text-embedding-3-large" => Some(Self::TextEmbedding3Large),
            _ => None,
        }
    }
}

impl std::fmt::Display for OpenAiEmbeddingModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.model_name())
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
    #[serde(default)]
    usage: Option<EmbeddingUsage>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Deserialize)]
struct EmbeddingUsage {
    total_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
    #[serde(default)]
    r#type: Option<String>,
}

/// Embeds memory text through the OpenAI API, with batching and retries
pub struct OpenAiEmbeddings {
    api_key: String,
    model: OpenAiEmbeddingModel,
    dimensions: usize,
    endpoint: String,
    retry_attempts: usize,
    http_client: reqwest::Client,
}

impl OpenAiEmbeddings {
    /// Client with default model and dimensions
    pub fn new(api_key: String) -> Result<Self> {
        Self::with_config(api_key, &EmbeddingConfig::default())
    }

    pub fn with_config(api_key: String, config: &EmbeddingConfig) -> Result<Self> {
        let model = OpenAiEmbeddingModel::from_name(&config.model).ok_or_else(|| {
            MemoryError::Config(format!("unsupported embedding model '{}'", config.model))
        })?;
        let dimensions = config
            .dimensions
            .unwrap_or_else(|| model.default_dimensions());
        if dimensions == 0 || dimensions > model.default_dimensions() {
            return Err(MemoryError::Config(format!(
                "{} supports 1..={} dimensions, got {}",
                model,
                model.default_dimensions(),
                dimensions
            )));
        }

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            api_key,
            model,
            dimensions,
            endpoint: format!("{}/embeddings", config.base_url.trim_end_matches('/')),
            retry_attempts: config.retry_attempts,
            http_client,
        })
    }

    pub fn model(&self) -> OpenAiEmbeddingModel {
        self.model
    }

    /// Core embedding call for at most MAX_BATCH_SIZE texts
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let inputs: Vec<&str> = texts
            .iter()
            .map(|t| {
                if t.len() > MAX_TEXT_CHARS {
                    debug!("Truncating text from {} to {} chars", t.len(), MAX_TEXT_CHARS);
                    truncate_at_boundary(t, MAX_TEXT_CHARS)
                } else {
                    t.as_str()
                }
            })
            .collect();

        let body = serde_json::json!({
            "input": inputs,
            "model": self.model.model_name(),
            "dimensions": self.dimensions,
            "encoding_format": "float"
        });

        let mut last_error = None;
        for attempt in 0..=self.retry_attempts {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(500 * attempt as u64)).await;
            }

            let response = match self
                .http_client
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    warn!(attempt, error = %e, "Embedding request failed");
                    last_error = Some(MemoryError::Http(e));
                    continue;
                }
            };

            let status = response.status();
            if status.is_success() {
                let resp: EmbeddingResponse = response.json().await?;
                if let Some(usage) = resp.usage {
                    debug!(
                        tokens = usage.total_tokens,
                        texts = texts.len(),
                        "Embedded batch"
                    );
                }
                return self.collect_embeddings(resp.data, texts.len());
            }

            let error_text = response.text().await.unwrap_or_default();
            let msg = serde_json::from_str::<ErrorResponse>(&error_text)
                .map(|e| match e.error.r#type {
                    Some(kind) => format!("{} ({})", e.error.message, kind),
                    None => e.error.message,
                })
                .unwrap_or(error_text);
            let err = MemoryError::Embedding(format!("OpenAI API error {}: {}", status, msg));

            // Client errors other than rate limiting won't succeed on retry
            if status.is_client_error() && status.as_u16() != 429 {
                return Err(err);
            }
            warn!(attempt, status = %status, "Embedding API error, retrying");
            last_error = Some(err);
        }

        Err(last_error.unwrap_or_else(|| MemoryError::Embedding("unknown error".to_string())))
    }

    fn collect_embeddings(
        &self,
        mut data: Vec<EmbeddingData>,
        expected: usize,
    ) -> Result<Vec<Vec<f32>>> {
        if data.len() != expected {
            return Err(MemoryError::Embedding(format!(
                "expected {} embeddings, got {}",
                expected,
                data.len()
            )));
        }

        // The API may answer out of order; `index` maps back to the input
        data.sort_by_key(|d| d.index);

        let embeddings: Vec<Vec<f32>> = data.into_iter().map(|d| d.embedding).collect();
        if let Some(bad) = embeddings.iter().find(|e| e.len() != self.dimensions) {
            return Err(MemoryError::Embedding(format!(
                "dimension mismatch: expected {}, got {}",
                self.dimensions,
                bad.len()
            )));
        }
        Ok(embeddings)
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddings {
    fn model_name(&self) -> &str {
        self.model.model_name()
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        if texts.len() <= MAX_BATCH_SIZE {
            return self.embed_texts(texts).await;
        }

        let chunks: Vec<&[String]> = texts.chunks(MAX_BATCH_SIZE).collect();
        debug!(
            "Embedding {} texts in {} parallel batches",
            texts.len(),
            chunks.len()
        );

        let futures: Vec<_> = chunks
            .into_iter()
            .map(|chunk| self.embed_texts(chunk))
            .collect();
        let results = futures::future::join_all(futures).await;

        let mut all_results = Vec::with_capacity(texts.len());
        for result in results {
            all_results.extend(result?);
        }
        Ok(all_results)
    }
}
