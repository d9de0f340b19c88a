// src/config/mod.rs
// Central configuration for the memory layer

mod env;
mod file;

pub use env::{apply_env_overrides, env_bool, env_list, env_or, env_parsed};
pub use file::{config_path, load_file};

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cache::EvictionPolicy;
use crate::logging::LogFormat;
use crate::memory::limits;

/// Main configuration structure - composes all domain configs
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub qdrant: QdrantConfig,
    pub embedding: EmbeddingConfig,
    pub cache: CacheConfig,
    pub search: SearchConfig,
    pub ingest: IngestConfig,
    pub dual_field: DualFieldConfig,
    pub logging: LoggingConfig,
}

/// Qdrant connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QdrantConfig {
    /// gRPC URL, e.g. http://localhost:6334. `None` selects the in-memory store.
    pub url: Option<String>,
    pub api_key: Option<String>,
    /// Prepended to every collection name as `{prefix}_{collection}`
    pub collection_prefix: String,
    pub timeout_secs: u64,
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            collection_prefix: String::new(),
            timeout_secs: 30,
        }
    }
}

/// Embedding API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// OpenAI API key. `None` selects the offline hashed embedder.
    pub api_key: Option<String>,
    pub model: String,
    /// Custom output dimensions (text-embedding-3 models support shortening)
    pub dimensions: Option<usize>,
    pub base_url: String,
    pub timeout_secs: u64,
    pub retry_attempts: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "text-embedding-3-small".to_string(),
            dimensions: None,
            base_url: "https://api.openai.com/v1".to_string(),
            timeout_secs: 30,
            retry_attempts: 2,
        }
    }
}

/// Query/result cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_entries: usize,
    pub default_ttl_secs: u64,
    pub min_ttl_secs: u64,
    pub max_ttl_secs: u64,
    /// Tune entry TTLs by importance and hit count
    pub adaptive_ttl: bool,
    pub eviction: EvictionPolicy,
    /// Interval for the background maintenance loop (0 disables it)
    pub warming_interval_secs: u64,
    pub warm_top_n: usize,
    /// Queries seen fewer times than this are never warmed
    pub warm_min_hits: u64,
    /// Max distinct queries remembered for warming
    pub tracker_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 1000,
            default_ttl_secs: 300,
            min_ttl_secs: 30,
            max_ttl_secs: 3600,
            adaptive_ttl: true,
            eviction: EvictionPolicy::Priority,
            warming_interval_secs: 600,
            warm_top_n: 20,
            warm_min_hits: 2,
            tracker_capacity: 500,
        }
    }
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    pub fn min_ttl(&self) -> Duration {
        Duration::from_secs(self.min_ttl_secs)
    }

    pub fn max_ttl(&self) -> Duration {
        Duration::from_secs(self.max_ttl_secs)
    }
}

/// Search defaults and hybrid weights
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub default_limit: usize,
    pub max_limit: usize,
    /// Similarity floor for balanced searches (0.0-1.0)
    pub min_score: f32,
    pub hybrid_vector_weight: f32,
    pub hybrid_text_weight: f32,
    /// Strategies slower than this on average get downgraded
    pub slow_query_ms: u64,
    pub query_timeout_ms: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: limits::SEARCH_DEFAULT_LIMIT,
            max_limit: limits::SEARCH_MAX_LIMIT,
            min_score: limits::SEARCH_MIN_SCORE,
            hybrid_vector_weight: 0.7,
            hybrid_text_weight: 0.3,
            slow_query_ms: 1500,
            query_timeout_ms: 10_000,
        }
    }
}

/// File ingestion settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub chunk_target_size: usize,
    pub chunk_max_size: usize,
    pub chunk_min_size: usize,
    /// Overlap for fixed-size chunking
    pub chunk_overlap: usize,
    pub max_file_bytes: u64,
    pub summary_sentences: usize,
    pub max_tags: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            chunk_target_size: 1000,
            chunk_max_size: 1500,
            chunk_min_size: 200,
            chunk_overlap: 100,
            max_file_bytes: 20 * 1024 * 1024,
            summary_sentences: 3,
            max_tags: 8,
        }
    }
}

/// Metadata fields duplicated at the top level of stored payloads
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DualFieldConfig {
    pub fields: Vec<String>,
}

impl Default for DualFieldConfig {
    fn default() -> Self {
        Self {
            fields: limits::DEFAULT_DUAL_FIELDS
                .iter()
                .map(|f| f.to_string())
                .collect(),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Full,
        }
    }
}

impl AppConfig {
    /// Load config: defaults, then the TOML file (if any), then env vars.
    ///
    /// A `.env` file in the working directory is loaded first when present.
    pub fn load() -> Self {
        dotenvy::dotenv().ok();

        let mut config = load_file(&config_path()).unwrap_or_default();
        apply_env_overrides(&mut config);
        debug!(
            qdrant = config.qdrant.url.is_some(),
            openai = config.embedding.api_key.is_some(),
            "Configuration loaded"
        );
        config
    }

    /// Validate config on startup
    pub fn validate(&self) -> ConfigValidation {
        let mut v = ConfigValidation::new();

        if self.qdrant.url.is_none() {
            v.add_warning("QDRANT_URL not set - using in-memory store (data is not persisted)");
        }
        if self.embedding.api_key.is_none() {
            v.add_warning("OPENAI_API_KEY not set - using offline hashed embeddings");
        }
        if self.cache.min_ttl_secs > self.cache.max_ttl_secs {
            v.add_error(format!(
                "cache.min_ttl_secs ({}) exceeds cache.max_ttl_secs ({})",
                self.cache.min_ttl_secs, self.cache.max_ttl_secs
            ));
        }
        if self.cache.enabled && self.cache.max_entries == 0 {
            v.add_error("cache.max_entries must be > 0 when the cache is enabled");
        }
        if !(0.0..=1.0).contains(&self.search.min_score) {
            v.add_error(format!(
                "search.min_score must be within 0.0-1.0, got {}",
                self.search.min_score
            ));
        }
        if self.search.hybrid_vector_weight < 0.0
            || self.search.hybrid_text_weight < 0.0
            || self.search.hybrid_vector_weight + self.search.hybrid_text_weight <= 0.0
        {
            v.add_error("hybrid weights must be non-negative and not both zero");
        }
        if self.search.default_limit == 0 || self.search.default_limit > self.search.max_limit {
            v.add_error("search.default_limit must be within 1..=search.max_limit");
        }
        if self.ingest.chunk_min_size > self.ingest.chunk_target_size
            || self.ingest.chunk_target_size > self.ingest.chunk_max_size
        {
            v.add_error("chunk sizes must satisfy min <= target <= max");
        }
        if self.ingest.chunk_overlap >= self.ingest.chunk_target_size {
            v.add_warning("chunk_overlap >= chunk_target_size; fixed-size chunking will crawl");
        }
        if let Some(dims) = self.embedding.dimensions {
            if dims == 0 {
                v.add_error("embedding.dimensions must be > 0");
            }
        }
        if self.dual_field.fields.is_empty() {
            v.add_warning("no dual fields configured - every filter hits nested metadata");
        }

        for w in &v.warnings {
            warn!("{}", w);
        }
        v
    }
}

/// Configuration validation result
#[derive(Debug, Default)]
pub struct ConfigValidation {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ConfigValidation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    pub fn add_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    /// Format as a human-readable report
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        if !self.errors.is_empty() {
            lines.push("Errors:".to_string());
            for err in &self.errors {
                lines.push(format!("  - {}", err));
            }
        }

        if !self.warnings.is_empty() {
            lines.push("Warnings:".to_string());
            for w in &self.warnings {
                lines.push(format!("  - {}", w));
            }
        }

        if lines.is_empty() {
            "Configuration OK".to_string()
        } else {
            lines.join("\n")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        let v = config.validate();
        assert!(v.is_valid(), "{}", v.report());
        // No Qdrant and no API key by default
        assert_eq!(v.warnings.len(), 2);
    }

    #[test]
    fn test_invalid_ttl_range() {
        let mut config = AppConfig::default();
        config.cache.min_ttl_secs = 100;
        config.cache.max_ttl_secs = 10;
        let v = config.validate();
        assert!(!v.is_valid());
        assert!(v.report().contains("min_ttl_secs"));
    }

    #[test]
    fn test_invalid_chunk_sizes() {
        let mut config = AppConfig::default();
        config.ingest.chunk_min_size = 2000;
        assert!(!config.validate().is_valid());
    }

    #[test]
    fn test_zero_hybrid_weights_rejected() {
        let mut config = AppConfig::default();
        config.search.hybrid_vector_weight = 0.0;
        config.search.hybrid_text_weight = 0.0;
        assert!(!config.validate().is_valid());
    }

    #[test]
    fn test_report_ok() {
        assert_eq!(ConfigValidation::new().report(), "Configuration OK");
    }
}
