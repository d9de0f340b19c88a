// src/memory/service/mod.rs
//! Enhanced memory service.
//!
//! Ties together the vector store, the embedder, the dual-field payload
//! layout, the result cache and the query optimizer. Storage operations
//! live here; search is in `search.rs` and cache upkeep in `maintenance.rs`.

mod maintenance;
mod search;

pub use maintenance::{MaintenanceReport, ServiceStats};

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::dual_field::DualFieldMapper;
use super::filter::MemoryFilter;
use super::limits::{ADD_BATCH_MAX, MEMORY_TEXT_MAX_CHARS};
use super::types::{
    validate_id, AddMemoryParams, MemoryRecord, MemorySearchResult, MemoryType,
    UpdateMemoryParams,
};
use crate::cache::{EvictionPolicy, QueryCache, QueryTracker};
use crate::config::{AppConfig, CacheConfig, SearchConfig};
use crate::embeddings::{EmbeddingProvider, HashedEmbeddings, OpenAiEmbeddings};
use crate::error::{MemoryError, Result};
use crate::query::QueryOptimizer;
use crate::storage::{InMemoryVectorStore, QdrantVectorStore, VectorPoint, VectorStore};

pub struct EnhancedMemoryService {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    mapper: DualFieldMapper,
    collection_prefix: String,
    /// Search results, tagged by memory type
    results: QueryCache<Vec<MemorySearchResult>>,
    /// Query embeddings, keyed by model + normalized text
    embeddings: QueryCache<Vec<f32>>,
    optimizer: QueryOptimizer,
    tracker: QueryTracker,
    /// Bumped on every write to a type; a search whose types moved while it
    /// ran does not cache its results
    generations: BTreeMap<MemoryType, AtomicU64>,
    cache_config: CacheConfig,
    search_config: SearchConfig,
}

impl EnhancedMemoryService {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: &AppConfig,
    ) -> Self {
        // Embeddings never go stale, so that cache keeps a fixed TTL and plain LRU
        let embedding_cache = CacheConfig {
            adaptive_ttl: false,
            eviction: EvictionPolicy::Lru,
            ..config.cache.clone()
        };

        info!(
            backend = store.backend_name(),
            model = embedder.model_name(),
            dimensions = embedder.dimensions(),
            cache = config.cache.enabled,
            "Initializing EnhancedMemoryService"
        );

        Self {
            store,
            embedder,
            mapper: DualFieldMapper::new(config.dual_field.fields.iter().cloned()),
            collection_prefix: config.qdrant.collection_prefix.clone(),
            results: QueryCache::new(config.cache.clone()),
            embeddings: QueryCache::new(embedding_cache),
            optimizer: QueryOptimizer::new(config.search.clone()),
            tracker: QueryTracker::new(config.cache.tracker_capacity),
            generations: MemoryType::ALL
                .into_iter()
                .map(|t| (t, AtomicU64::new(0)))
                .collect(),
            cache_config: config.cache.clone(),
            search_config: config.search.clone(),
        }
    }

    /// Build the service from configuration.
    ///
    /// Without a Qdrant URL the in-memory store is used; without an OpenAI
    /// key the offline hashed embedder is used. Both fallbacks are logged.
    pub fn connect(config: &AppConfig) -> Result<Self> {
        let store: Arc<dyn VectorStore> = match config.qdrant.url.as_deref() {
            Some(url) => Arc::new(QdrantVectorStore::connect(
                url,
                config.qdrant.api_key.as_deref(),
                Duration::from_secs(config.qdrant.timeout_secs),
            )?),
            None => {
                warn!("QDRANT_URL not set, using the in-memory store (nothing is persisted)");
                Arc::new(InMemoryVectorStore::new())
            }
        };

        let embedder: Arc<dyn EmbeddingProvider> = match config.embedding.api_key.as_deref() {
            Some(key) => Arc::new(OpenAiEmbeddings::with_config(
                key.to_string(),
                &config.embedding,
            )?),
            None => {
                warn!("OPENAI_API_KEY not set, using offline hashed embeddings");
                Arc::new(HashedEmbeddings::default())
            }
        };

        Ok(Self::new(store, embedder, config))
    }

    /// Create every memory collection (and its payload indexes) if missing
    pub async fn initialize(&self) -> Result<()> {
        let dimensions = self.embedder.dimensions();
        let indexes = self.mapper.index_fields();
        for memory_type in MemoryType::ALL {
            self.store
                .ensure_collection(&self.collection_name(memory_type), dimensions, &indexes)
                .await?;
        }
        info!(
            collections = MemoryType::ALL.len(),
            dimensions, "Memory collections ready"
        );
        Ok(())
    }

    pub fn collection_name(&self, memory_type: MemoryType) -> String {
        memory_type.collection_name(&self.collection_prefix)
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    pub fn mapper(&self) -> &DualFieldMapper {
        &self.mapper
    }

    pub fn result_cache(&self) -> &QueryCache<Vec<MemorySearchResult>> {
        &self.results
    }

    pub fn optimizer(&self) -> &QueryOptimizer {
        &self.optimizer
    }

    pub fn tracker(&self) -> &QueryTracker {
        &self.tracker
    }

    /// Store one memory
    pub async fn add_memory(&self, params: AddMemoryParams) -> Result<MemoryRecord> {
        let record = build_record(params)?;
        let vector = self.embedder.embed(&record.text).await?;

        self.store
            .upsert(
                &self.collection_name(record.memory_type),
                vec![self.point(&record, vector)],
            )
            .await?;
        self.invalidate_type(record.memory_type);

        debug!(
            id = %record.id,
            memory_type = %record.memory_type,
            chars = record.text.len(),
            "Memory stored"
        );
        Ok(record)
    }

    /// Store many memories with a single batched embedding call
    pub async fn add_memories(&self, params: Vec<AddMemoryParams>) -> Result<Vec<MemoryRecord>> {
        if params.is_empty() {
            return Ok(Vec::new());
        }
        if params.len() > ADD_BATCH_MAX {
            return Err(MemoryError::InvalidInput(format!(
                "batch of {} memories exceeds the limit of {}",
                params.len(),
                ADD_BATCH_MAX
            )));
        }

        let records = params
            .into_iter()
            .map(build_record)
            .collect::<Result<Vec<_>>>()?;
        let texts: Vec<String> = records.iter().map(|r| r.text.clone()).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;
        if vectors.len() != records.len() {
            return Err(MemoryError::Embedding(format!(
                "expected {} embeddings, got {}",
                records.len(),
                vectors.len()
            )));
        }

        let mut by_type: BTreeMap<MemoryType, Vec<VectorPoint>> = BTreeMap::new();
        for (record, vector) in records.iter().zip(vectors) {
            by_type
                .entry(record.memory_type)
                .or_default()
                .push(self.point(record, vector));
        }

        for (memory_type, points) in by_type {
            let count = points.len();
            self.store
                .upsert(&self.collection_name(memory_type), points)
                .await?;
            self.invalidate_type(memory_type);
            debug!(memory_type = %memory_type, count, "Batch stored");
        }

        Ok(records)
    }

    pub async fn get_memory(&self, memory_type: MemoryType, id: &str) -> Result<Option<MemoryRecord>> {
        let id = validate_id(id)?;
        let points = self
            .store
            .get(&self.collection_name(memory_type), &[id])
            .await?;
        points
            .into_iter()
            .next()
            .map(|p| self.mapper.from_payload(p.id, memory_type, &p.payload))
            .transpose()
    }

    /// Change a memory's text and/or metadata. The timestamp is kept, and
    /// the text is only re-embedded when it actually changed.
    pub async fn update_memory(
        &self,
        memory_type: MemoryType,
        id: &str,
        params: UpdateMemoryParams,
    ) -> Result<MemoryRecord> {
        if params.is_empty() {
            return Err(MemoryError::InvalidInput(
                "update carries neither text nor metadata".to_string(),
            ));
        }

        let mut record = self
            .get_memory(memory_type, id)
            .await?
            .ok_or_else(|| MemoryError::NotFound(format!("{} {}", memory_type, id)))?;

        let mut text_changed = false;
        if let Some(text) = params.text {
            validate_text(&text)?;
            if text != record.text {
                record.text = text;
                text_changed = true;
            }
        }

        if let Some(metadata) = params.metadata {
            if params.replace_metadata {
                record.metadata = metadata;
            } else {
                record.metadata.merge(metadata);
            }
        }

        let collection = self.collection_name(memory_type);
        if text_changed {
            let vector = self.embedder.embed(&record.text).await?;
            self.store
                .upsert(&collection, vec![self.point(&record, vector)])
                .await?;
        } else {
            self.store
                .overwrite_payload(&collection, &record.id, self.mapper.to_payload(&record))
                .await?;
        }
        self.invalidate_type(memory_type);

        debug!(id = %record.id, reembedded = text_changed, "Memory updated");
        Ok(record)
    }

    /// Delete one memory. Returns false when it didn't exist.
    pub async fn delete_memory(&self, memory_type: MemoryType, id: &str) -> Result<bool> {
        let id = validate_id(id)?;
        let collection = self.collection_name(memory_type);

        if self.store.get(&collection, &[id.clone()]).await?.is_empty() {
            return Ok(false);
        }
        self.store.delete(&collection, &[id.clone()]).await?;
        self.invalidate_type(memory_type);

        debug!(id = %id, memory_type = %memory_type, "Memory deleted");
        Ok(true)
    }

    /// Delete every memory of a type matching the filter. An empty filter is
    /// refused rather than wiping the collection.
    pub async fn delete_where(&self, memory_type: MemoryType, filter: &MemoryFilter) -> Result<u64> {
        if filter.is_empty() {
            return Err(MemoryError::InvalidInput(
                "refusing to delete with an empty filter".to_string(),
            ));
        }
        let payload_filter = self.mapper.build_filter(filter)?;
        let deleted = self
            .store
            .delete_by_filter(&self.collection_name(memory_type), &payload_filter)
            .await?;
        if deleted > 0 {
            self.invalidate_type(memory_type);
        }
        info!(memory_type = %memory_type, deleted, "Deleted memories by filter");
        Ok(deleted)
    }

    pub async fn count(&self, memory_type: MemoryType, filter: Option<&MemoryFilter>) -> Result<u64> {
        let payload_filter = filter.map(|f| self.mapper.build_filter(f)).transpose()?;
        self.store
            .count(&self.collection_name(memory_type), payload_filter.as_ref())
            .await
    }

    fn point(&self, record: &MemoryRecord, vector: Vec<f32>) -> VectorPoint {
        VectorPoint {
            id: record.id.clone(),
            vector,
            payload: self.mapper.to_payload(record),
        }
    }

    /// Current write generation of each type, in the order given
    pub(super) fn write_generations(&self, types: &[MemoryType]) -> Vec<u64> {
        types
            .iter()
            .map(|t| {
                self.generations
                    .get(t)
                    .map_or(0, |g| g.load(Ordering::SeqCst))
            })
            .collect()
    }

    /// Drop cached results that drew on this memory type
    fn invalidate_type(&self, memory_type: MemoryType) {
        if let Some(generation) = self.generations.get(&memory_type) {
            generation.fetch_add(1, Ordering::SeqCst);
        }
        let dropped = self.results.invalidate_tag(&memory_type.cache_tag());
        if dropped > 0 {
            debug!(memory_type = %memory_type, dropped, "Invalidated cached results");
        }
    }
}

fn validate_text(text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(MemoryError::InvalidInput("memory text is empty".to_string()));
    }
    let chars = text.chars().count();
    if chars > MEMORY_TEXT_MAX_CHARS {
        return Err(MemoryError::InvalidInput(format!(
            "memory text has {} chars, limit is {}",
            chars, MEMORY_TEXT_MAX_CHARS
        )));
    }
    Ok(())
}

fn build_record(params: AddMemoryParams) -> Result<MemoryRecord> {
    validate_text(&params.text)?;
    let id = match params.id.as_deref() {
        Some(id) => validate_id(id)?,
        None => Uuid::new_v4().to_string(),
    };
    Ok(MemoryRecord {
        id,
        text: params.text,
        timestamp: params.timestamp.unwrap_or_else(Utc::now),
        memory_type: params.memory_type,
        metadata: params.metadata,
    })
}
