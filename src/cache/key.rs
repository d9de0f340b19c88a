// src/cache/key.rs
// SHA-256 cache keys over canonical JSON

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::memory::types::SearchRequest;
use crate::text::normalize;

/// Hash `namespace` plus the JSON form of `value`.
///
/// serde_json objects serialize with sorted keys, so equal values always
/// produce equal keys.
pub fn cache_key<T: Serialize + ?Sized>(namespace: &str, value: &T) -> String {
    let json = serde_json::to_value(value)
        .map(|v| v.to_string())
        .unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(namespace.as_bytes());
    hasher.update([0u8]);
    hasher.update(json.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Key for a search request after normalization: whitespace/case-folded
/// query, resolved types, concrete limit, sorted tags. Requests that differ
/// only in those respects share a cache entry.
pub fn search_key(request: &SearchRequest, limit: usize) -> String {
    let mut normalized = request.clone();
    normalized.query = normalize(&request.query);
    normalized.memory_types = request.resolved_types();
    normalized.limit = Some(limit);
    normalized.use_cache = true;
    normalized.filter.tags.sort();
    normalized.filter.tags.dedup();
    cache_key("search", &normalized)
}

/// Key for a query embedding
pub fn embedding_key(model: &str, text: &str) -> String {
    cache_key("embedding", &(model, normalize(text)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::filter::MemoryFilter;
    use crate::memory::types::MemoryType;

    #[test]
    fn test_key_is_hex_sha256() {
        let key = cache_key("ns", &"value");
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(key, cache_key("other", &"value"));
    }

    #[test]
    fn test_search_key_normalizes() {
        let a = SearchRequest::new("  Rust   Borrow checker ");
        let b = SearchRequest::new("rust borrow checker").with_types(MemoryType::ALL);
        assert_eq!(search_key(&a, 10), search_key(&b, 10));
        assert_ne!(search_key(&a, 10), search_key(&a, 20));
    }

    #[test]
    fn test_search_key_sorts_tags() {
        let a = SearchRequest::new("q").with_filter(MemoryFilter::new().tag("b").tag("a"));
        let b = SearchRequest::new("q").with_filter(MemoryFilter::new().tag("a").tag("b").tag("a"));
        assert_eq!(search_key(&a, 5), search_key(&b, 5));
    }

    #[test]
    fn test_search_key_respects_filters() {
        let a = SearchRequest::new("q").with_filter(MemoryFilter::new().user("u1"));
        let b = SearchRequest::new("q").with_filter(MemoryFilter::new().user("u2"));
        assert_ne!(search_key(&a, 5), search_key(&b, 5));
    }

    #[test]
    fn test_embedding_key() {
        assert_eq!(
            embedding_key("m", "Hello  World"),
            embedding_key("m", "hello world")
        );
        assert_ne!(embedding_key("m1", "x"), embedding_key("m2", "x"));
    }
}
