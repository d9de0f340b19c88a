// src/memory/service/search.rs
// Search paths: planned vector search, filter-only listing, recent memories

use futures::future::join_all;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::EnhancedMemoryService;
use crate::cache::{embedding_key, search_key, InsertOptions};
use crate::error::{MemoryError, Result};
use crate::memory::filter::{MemoryFilter, PayloadFilter};
use crate::memory::hybrid::{rerank, sort_results, HybridWeights};
use crate::memory::limits::{DEFAULT_IMPORTANCE, SCROLL_PAGE_SIZE};
use crate::memory::types::{MemoryRecord, MemorySearchResult, MemoryType, SearchRequest};
use crate::query::{QueryPlan, QueryStrategy};
use crate::storage::scroll_all;
use crate::text::normalize;

/// Results from one execution. `complete` is false when a collection was skipped.
pub(super) struct Execution {
    pub results: Vec<MemorySearchResult>,
    pub complete: bool,
}

impl EnhancedMemoryService {
    /// Search memories.
    ///
    /// Plans the query, answers from the result cache when possible, and
    /// otherwise searches every requested type's collection in parallel. A
    /// collection that fails or times out is skipped; such partial results
    /// are returned but not cached.
    pub async fn search(&self, request: &SearchRequest) -> Result<Vec<MemorySearchResult>> {
        let started = Instant::now();
        let plan = self.optimizer.plan(request);
        let key = search_key(request, plan.limit);

        if plan.use_cache {
            self.tracker.record(&key, request);
            if let Some(cached) = self.results.get(&key) {
                debug!(strategy = %plan.strategy, hits = cached.len(), "Search served from cache");
                return Ok(cached);
            }
        }

        let types = request.resolved_types();
        let generations = self.write_generations(&types);
        let execution = self.execute(request, &plan).await?;
        if plan.use_cache && execution.complete {
            self.cache_results(&key, &types, &generations, &execution.results);
        }

        let elapsed = started.elapsed();
        self.optimizer
            .record(plan.strategy, elapsed, execution.results.len());
        if elapsed.as_millis() as u64 > self.search_config.slow_query_ms {
            warn!(
                strategy = %plan.strategy,
                elapsed_ms = elapsed.as_millis() as u64,
                "Slow memory search"
            );
        }

        debug!(
            strategy = %plan.strategy,
            results = execution.results.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Search complete"
        );
        Ok(execution.results)
    }

    /// Vector search reranked with keyword scores
    pub async fn hybrid_search(
        &self,
        query: &str,
        memory_types: &[MemoryType],
        filter: MemoryFilter,
        limit: usize,
    ) -> Result<Vec<MemorySearchResult>> {
        let request = SearchRequest::new(query)
            .with_types(memory_types.iter().copied())
            .with_filter(filter)
            .with_limit(limit)
            .with_strategy(QueryStrategy::Hybrid);
        self.search(&request).await
    }

    /// Newest memories of one type matching the filter
    pub async fn get_recent(
        &self,
        memory_type: MemoryType,
        filter: &MemoryFilter,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>> {
        let payload_filter = self.mapper.build_filter(filter)?;
        let points = scroll_all(
            self.store.as_ref(),
            &self.collection_name(memory_type),
            non_empty(&payload_filter),
            SCROLL_PAGE_SIZE,
        )
        .await?;

        let mut records: Vec<MemoryRecord> = points
            .into_iter()
            .filter_map(|p| match self.mapper.from_payload(p.id, memory_type, &p.payload) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!("Skipping unreadable point: {}", e);
                    None
                }
            })
            .collect();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        records.truncate(limit);
        Ok(records)
    }

    /// Run a plan against the store, bypassing the result cache
    pub(super) async fn execute(
        &self,
        request: &SearchRequest,
        plan: &QueryPlan,
    ) -> Result<Execution> {
        let payload_filter = self.mapper.build_filter(&request.filter)?;
        let filter = non_empty(&payload_filter);
        let types = request.resolved_types();

        if !plan.strategy.uses_vectors() {
            return self.list_filtered(&types, filter, plan.limit).await;
        }

        let vector = self.query_embedding(&request.query).await?;
        let searches = types.iter().map(|&memory_type| {
            let collection = self.collection_name(memory_type);
            let vector = &vector;
            async move {
                let outcome = tokio::time::timeout(
                    plan.timeout,
                    self.store.search(
                        &collection,
                        vector,
                        plan.candidate_limit,
                        filter,
                        plan.score_threshold,
                    ),
                )
                .await
                .map_err(MemoryError::from)
                .and_then(|res| res);
                (memory_type, outcome)
            }
        });

        let mut results = Vec::new();
        let mut failures = Vec::new();
        for (memory_type, outcome) in join_all(searches).await {
            match outcome {
                Ok(points) => {
                    for p in points {
                        match self.mapper.from_payload(p.id, memory_type, &p.payload) {
                            Ok(record) => results.push(MemorySearchResult {
                                record,
                                score: p.score,
                                vector_score: Some(p.score),
                                text_score: None,
                            }),
                            Err(e) => warn!("Skipping unreadable point: {}", e),
                        }
                    }
                }
                Err(e) => {
                    warn!(memory_type = %memory_type, error = %e, "Collection search failed, skipping");
                    failures.push(e);
                }
            }
        }

        let complete = failures.is_empty();
        if failures.len() == types.len() {
            // Nothing answered: report the outage instead of an empty result
            if let Some(first) = failures.into_iter().next() {
                return Err(first);
            }
        }

        if plan.keyword_weight > 0.0 {
            let weights = HybridWeights::new(plan.vector_weight, plan.keyword_weight);
            rerank(&mut results, &request.query, weights);
        } else {
            sort_results(&mut results);
        }
        results.truncate(plan.limit);

        Ok(Execution { results, complete })
    }

    /// Filter-only listing across types, newest first
    async fn list_filtered(
        &self,
        types: &[MemoryType],
        filter: Option<&PayloadFilter>,
        limit: usize,
    ) -> Result<Execution> {
        let mut results = Vec::new();
        let mut complete = true;

        for &memory_type in types {
            let collection = self.collection_name(memory_type);
            let points =
                match scroll_all(self.store.as_ref(), &collection, filter, SCROLL_PAGE_SIZE).await {
                    Ok(points) => points,
                    Err(e) => {
                        warn!(memory_type = %memory_type, error = %e, "Collection listing failed, skipping");
                        complete = false;
                        continue;
                    }
                };
            for p in points {
                match self.mapper.from_payload(p.id, memory_type, &p.payload) {
                    Ok(record) => results.push(MemorySearchResult {
                        record,
                        score: 1.0,
                        vector_score: None,
                        text_score: None,
                    }),
                    Err(e) => warn!("Skipping unreadable point: {}", e),
                }
            }
        }

        // Equal scores, so this is newest first
        sort_results(&mut results);
        results.truncate(limit);
        Ok(Execution { results, complete })
    }

    /// Query embedding, through the embedding cache
    async fn query_embedding(&self, query: &str) -> Result<Vec<f32>> {
        let text = normalize(query);
        let key = embedding_key(self.embedder.model_name(), &text);
        if let Some(vector) = self.embeddings.get(&key) {
            return Ok(vector);
        }

        let vector = self.embedder.embed(&text).await?;
        self.embeddings.insert(
            key,
            vector.clone(),
            InsertOptions::new().ttl(self.cache_config.max_ttl()),
        );
        Ok(vector)
    }

    /// Store results tagged with every type they were drawn from, so a write
    /// to any of those types drops them.
    ///
    /// `generations` is the snapshot taken before the store was read. Results
    /// are not cached if any of the types was written since; the check runs
    /// again after the insert to catch a write racing the insert itself.
    /// Returns whether the results were cached.
    pub(super) fn cache_results(
        &self,
        key: &str,
        types: &[MemoryType],
        generations: &[u64],
        results: &[MemorySearchResult],
    ) -> bool {
        if self.write_generations(types) != generations {
            debug!("Types written during search, not caching results");
            return false;
        }

        let importance = results
            .first()
            .map(|r| r.record.importance().value())
            .unwrap_or(DEFAULT_IMPORTANCE);
        let tags: Vec<String> = types.iter().map(MemoryType::cache_tag).collect();
        self.results.insert(
            key,
            results.to_vec(),
            InsertOptions::new().importance(importance).tags(tags),
        );

        if self.write_generations(types) != generations {
            self.results.invalidate(key);
            return false;
        }
        true
    }
}

fn non_empty(filter: &PayloadFilter) -> Option<&PayloadFilter> {
    (!filter.is_empty()).then_some(filter)
}
