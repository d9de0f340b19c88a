// tests/cache_test.rs
// Result caching as seen through the service


use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use agent_memory::cache::warming::spawn_cache_maintenance;
use agent_memory::cache::WarmingStrategy;
use agent_memory::embeddings::HashedEmbeddings;
use agent_memory::memory::{
    AddMemoryParams, EnhancedMemoryService, MemoryType, PayloadFilter, SearchRequest,
};
use agent_memory::query::QueryStrategy;
use agent_memory::storage::{
    IndexKind, InMemoryVectorStore, ScoredPoint, ScrollPage, StoredPoint, VectorPoint,
    VectorStore,
};
use agent_memory::Result;
use test_helpers::{create_test_service, create_test_service_with, seed_message, test_config};

fn message_search(query: &str) -> SearchRequest {
    SearchRequest::new(query)
        .with_types([MemoryType::Message])
        .with_min_score(0.0)
}

#[tokio::test]
async fn test_repeated_search_served_from_cache() {
    let service = create_test_service().await;
    seed_message(&service, "grafana dashboard for ingest latency", "alice", "c1").await;

    let request = message_search("grafana ingest latency");
    let first = service.search(&request).await.unwrap();
    let hits_before = service.result_cache().stats().hits;

    let second = service.search(&request).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(service.result_cache().stats().hits, hits_before + 1);

    // Whitespace and case differences share the entry
    service
        .search(&message_search("  Grafana   INGEST latency "))
        .await
        .unwrap();
    assert_eq!(service.result_cache().stats().hits, hits_before + 2);
}

#[tokio::test]
async fn test_writes_invalidate_only_their_type() {
    let service = create_test_service().await;
    seed_message(&service, "terraform state lock stuck", "alice", "c1").await;

    let request = message_search("terraform state lock");
    service.search(&request).await.unwrap();
    assert_eq!(service.result_cache().len(), 1);

    service
        .add_memory(AddMemoryParams::new(MemoryType::Document, "terraform module docs"))
        .await
        .unwrap();
    assert_eq!(service.result_cache().len(), 1);

    seed_message(&service, "terraform state lock released", "bob", "c2").await;
    assert_eq!(service.result_cache().len(), 0);

    let results = service.search(&request).await.unwrap();
    assert_eq!(results.len(), 2);
}

#[tokio::test]
async fn test_uncached_search_bypasses_cache_and_tracker() {
    let service = create_test_service().await;
    seed_message(&service, "nightly backup verification", "alice", "c1").await;

    let request = message_search("backup verification").without_cache();
    service.search(&request).await.unwrap();
    service.search(&request).await.unwrap();

    assert!(service.result_cache().is_empty());
    assert_eq!(service.result_cache().stats().hits, 0);
    assert_eq!(service.tracker().len(), 0);
}

#[tokio::test]
async fn test_disabled_cache_still_searches() {
    let mut config = test_config();
    config.cache.enabled = false;
    let service = create_test_service_with(config).await;
    seed_message(&service, "redis eviction policy change", "alice", "c1").await;

    let results = service.search(&message_search("redis eviction policy change")).await.unwrap();
    assert_eq!(results.len(), 1);
    assert!(service.result_cache().is_empty());

    let report = service.warm_cache(WarmingStrategy::FrequentQueries, 10).await.unwrap();
    assert_eq!(report.warmed, 0);
}

#[tokio::test(start_paused = true)]
async fn test_cached_results_expire() {
    let mut config = test_config();
    config.cache.adaptive_ttl = false;
    config.cache.default_ttl_secs = 60;
    config.cache.min_ttl_secs = 10;
    config.cache.max_ttl_secs = 120;
    let service = create_test_service_with(config).await;
    seed_message(&service, "certificate renewal reminder", "alice", "c1").await;

    let request = message_search("certificate renewal");
    service.search(&request).await.unwrap();
    assert_eq!(service.result_cache().len(), 1);

    tokio::time::advance(Duration::from_secs(30)).await;
    let hits = service.result_cache().stats().hits;
    service.search(&request).await.unwrap();
    assert_eq!(service.result_cache().stats().hits, hits + 1);

    tokio::time::advance(Duration::from_secs(31)).await;
    service.search(&request).await.unwrap();
    let stats = service.result_cache().stats();
    assert_eq!(stats.hits, hits + 1);
    assert_eq!(stats.expirations, 1);
}

/// In-memory store whose searches take `delay` to return, reading before the wait
struct SlowSearchStore {
    inner: InMemoryVectorStore,
    delay: Duration,
}

#[async_trait]
impl VectorStore for SlowSearchStore {
    fn backend_name(&self) -> &'static str {
        "slow"
    }

    async fn ensure_collection(
        &self,
        name: &str,
        dimensions: usize,
        indexes: &[(String, IndexKind)],
    ) -> Result<()> {
        self.inner.ensure_collection(name, dimensions, indexes).await
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        self.inner.collection_exists(name).await
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        self.inner.delete_collection(name).await
    }

    async fn upsert(&self, collection: &str, points: Vec<VectorPoint>) -> Result<()> {
        self.inner.upsert(collection, points).await
    }

    async fn overwrite_payload(
        &self,
        collection: &str,
        id: &str,
        payload: Map<String, Value>,
    ) -> Result<()> {
        self.inner.overwrite_payload(collection, id, payload).await
    }

    async fn get(&self, collection: &str, ids: &[String]) -> Result<Vec<StoredPoint>> {
        self.inner.get(collection, ids).await
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        filter: Option<&PayloadFilter>,
        score_threshold: Option<f32>,
    ) -> Result<Vec<ScoredPoint>> {
        let hits = self
            .inner
            .search(collection, vector, limit, filter, score_threshold)
            .await;
        tokio::time::sleep(self.delay).await;
        hits
    }

    async fn scroll(
        &self,
        collection: &str,
        filter: Option<&PayloadFilter>,
        limit: usize,
        offset: Option<String>,
    ) -> Result<ScrollPage> {
        self.inner.scroll(collection, filter, limit, offset).await
    }

    async fn delete(&self, collection: &str, ids: &[String]) -> Result<()> {
        self.inner.delete(collection, ids).await
    }

    async fn delete_by_filter(&self, collection: &str, filter: &PayloadFilter) -> Result<u64> {
        self.inner.delete_by_filter(collection, filter).await
    }

    async fn count(&self, collection: &str, filter: Option<&PayloadFilter>) -> Result<u64> {
        self.inner.count(collection, filter).await
    }

    async fn health_check(&self) -> Result<()> {
        self.inner.health_check().await
    }
}

#[tokio::test(start_paused = true)]
async fn test_write_during_search_is_not_masked_by_cache() {
    let store = SlowSearchStore {
        inner: InMemoryVectorStore::new(),
        delay: Duration::from_millis(200),
    };
    let service = EnhancedMemoryService::new(
        Arc::new(store),
        Arc::new(HashedEmbeddings::default()),
        &test_config(),
    );
    service.initialize().await.unwrap();
    seed_message(&service, "postgres database one", "alice", "c1").await;

    let request = message_search("postgres database").with_strategy(QueryStrategy::Balanced);
    let write = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        seed_message(&service, "postgres database two", "alice", "c1").await;
    };
    let (before, ()) = tokio::join!(service.search(&request), write);
    let before = before.unwrap();
    assert_eq!(before.len(), 1);
    assert!(service.result_cache().is_empty());

    let after = service.search(&request).await.unwrap();
    let texts: Vec<&str> = after.iter().map(|r| r.record.text.as_str()).collect();
    assert_eq!(texts.len(), 2);
    assert!(texts.contains(&"postgres database two"));

    // Nothing was written during this one, so it is cached
    assert_eq!(service.result_cache().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_background_maintenance_purges_and_warms() {
    let mut config = test_config();
    config.cache.adaptive_ttl = false;
    config.cache.default_ttl_secs = 60;
    config.cache.min_ttl_secs = 10;
    config.cache.max_ttl_secs = 120;
    config.cache.warm_min_hits = 2;
    let service = create_test_service_with(config).await;
    seed_message(&service, "kafka consumer lag alert", "alice", "c1").await;

    let request = message_search("kafka consumer lag");
    service.search(&request).await.unwrap();
    service.search(&request).await.unwrap();
    assert_eq!(service.tracker().len(), 1);
    assert_eq!(service.result_cache().stats().inserts, 1);

    let handle = spawn_cache_maintenance(service.clone(), Duration::from_secs(90));
    // The entry expires at 60s; the first pass runs at 90s
    tokio::time::sleep(Duration::from_secs(95)).await;

    let stats = service.result_cache().stats();
    assert_eq!(stats.expirations, 1);
    assert_eq!(stats.inserts, 2);
    assert_eq!(service.result_cache().len(), 1);

    let hits = stats.hits;
    service.search(&request).await.unwrap();
    assert_eq!(service.result_cache().stats().hits, hits + 1);

    handle.abort();
}
