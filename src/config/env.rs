// src/config/env.rs
// Environment overrides - single source of truth for all env vars

use std::str::FromStr;

use tracing::{debug, warn};

use super::AppConfig;
use crate::cache::EvictionPolicy;
use crate::logging::LogFormat;

/// Read an env var, filtering empty values
pub fn env_or(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Parse an env var, logging and ignoring values that don't parse
pub fn env_parsed<T: FromStr>(name: &str) -> Option<T> {
    let raw = env_or(name)?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(var = name, value = %raw, "Ignoring unparsable environment value");
            None
        }
    }
}

/// Parse a boolean env var ("1", "true", "yes", "on" / "0", "false", "no", "off")
pub fn env_bool(name: &str) -> Option<bool> {
    let raw = env_or(name)?;
    parse_bool(&raw).or_else(|| {
        warn!(var = name, value = %raw, "Ignoring unparsable boolean");
        None
    })
}

/// Parse a comma-separated env var into trimmed, non-empty items
pub fn env_list(name: &str) -> Option<Vec<String>> {
    env_or(name).map(|raw| split_list(&raw))
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Apply environment variables on top of an already-loaded config
pub fn apply_env_overrides(config: &mut AppConfig) {
    // Qdrant
    if let Some(url) = env_or("QDRANT_URL") {
        config.qdrant.url = Some(url);
    }
    if let Some(key) = env_or("QDRANT_API_KEY") {
        config.qdrant.api_key = Some(key);
    }
    if let Some(prefix) = env_or("MEMORY_COLLECTION_PREFIX") {
        config.qdrant.collection_prefix = prefix;
    }
    if let Some(secs) = env_parsed("QDRANT_TIMEOUT_SECS") {
        config.qdrant.timeout_secs = secs;
    }

    // Embeddings
    if let Some(key) = env_or("OPENAI_API_KEY") {
        config.embedding.api_key = Some(key);
    }
    if let Some(model) = env_or("OPENAI_EMBEDDING_MODEL") {
        config.embedding.model = model;
    }
    if let Some(dims) = env_parsed("OPENAI_EMBEDDING_DIMENSIONS") {
        config.embedding.dimensions = Some(dims);
    }
    if let Some(url) = env_or("OPENAI_BASE_URL") {
        config.embedding.base_url = url;
    }

    // Cache
    if let Some(enabled) = env_bool("MEMORY_CACHE_ENABLED") {
        config.cache.enabled = enabled;
    }
    if let Some(max) = env_parsed("MEMORY_CACHE_MAX_ENTRIES") {
        config.cache.max_entries = max;
    }
    if let Some(ttl) = env_parsed("MEMORY_CACHE_TTL_SECS") {
        config.cache.default_ttl_secs = ttl;
    }
    if let Some(adaptive) = env_bool("MEMORY_CACHE_ADAPTIVE_TTL") {
        config.cache.adaptive_ttl = adaptive;
    }
    if let Some(policy) = env_parsed::<EvictionPolicy>("MEMORY_CACHE_EVICTION") {
        config.cache.eviction = policy;
    }
    if let Some(secs) = env_parsed("MEMORY_CACHE_WARMING_INTERVAL_SECS") {
        config.cache.warming_interval_secs = secs;
    }

    // Search
    if let Some(limit) = env_parsed("MEMORY_SEARCH_DEFAULT_LIMIT") {
        config.search.default_limit = limit;
    }
    if let Some(score) = env_parsed("MEMORY_SEARCH_MIN_SCORE") {
        config.search.min_score = score;
    }
    if let Some(w) = env_parsed("MEMORY_HYBRID_VECTOR_WEIGHT") {
        config.search.hybrid_vector_weight = w;
    }
    if let Some(w) = env_parsed("MEMORY_HYBRID_TEXT_WEIGHT") {
        config.search.hybrid_text_weight = w;
    }

    // Ingestion
    if let Some(size) = env_parsed("MEMORY_CHUNK_TARGET_SIZE") {
        config.ingest.chunk_target_size = size;
    }
    if let Some(bytes) = env_parsed("MEMORY_MAX_FILE_BYTES") {
        config.ingest.max_file_bytes = bytes;
    }

    if let Some(fields) = env_list("MEMORY_DUAL_FIELDS") {
        config.dual_field.fields = fields;
    }

    // Logging
    if let Some(level) = env_or("MEMORY_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(format) = env_parsed::<LogFormat>("MEMORY_LOG_FORMAT") {
        config.logging.format = format;
    }

    debug!("Environment overrides applied");
}
