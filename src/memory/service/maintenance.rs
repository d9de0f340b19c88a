// src/memory/service/maintenance.rs
// Cache upkeep and service statistics

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::EnhancedMemoryService;
use crate::cache::{CacheStats, OptimizationReport, WarmingReport, WarmingStrategy};
use crate::error::Result;
use crate::memory::types::MemoryType;
use crate::query::{QueryStrategy, StrategyStats};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStats {
    pub backend: String,
    pub embedding_model: String,
    pub dimensions: usize,
    /// Point count per collection; collections that failed to count are left out
    pub collections: BTreeMap<String, u64>,
    pub result_cache: CacheStats,
    pub embedding_cache: CacheStats,
    pub strategies: BTreeMap<QueryStrategy, StrategyStats>,
    pub tracked_queries: usize,
}

/// One background maintenance pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceReport {
    pub purged: usize,
    pub optimization: OptimizationReport,
    pub warming: WarmingReport,
}

impl EnhancedMemoryService {
    pub async fn stats(&self) -> Result<ServiceStats> {
        let mut collections = BTreeMap::new();
        for memory_type in MemoryType::ALL {
            let name = self.collection_name(memory_type);
            match self.store.count(&name, None).await {
                Ok(count) => {
                    collections.insert(name, count);
                }
                Err(e) => warn!(collection = %name, error = %e, "Failed to count collection"),
            }
        }

        Ok(ServiceStats {
            backend: self.store.backend_name().to_string(),
            embedding_model: self.embedder.model_name().to_string(),
            dimensions: self.embedder.dimensions(),
            collections,
            result_cache: self.results.stats(),
            embedding_cache: self.embeddings.stats(),
            strategies: self.optimizer.stats(),
            tracked_queries: self.tracker.len(),
        })
    }

    /// Purge expired embeddings and retune the result cache's base TTL
    pub fn optimize_cache(&self) -> OptimizationReport {
        let purged = self.embeddings.purge_expired();
        if purged > 0 {
            debug!(purged, "Purged expired query embeddings");
        }
        self.results.optimize()
    }

    /// Re-run tracked searches whose results are no longer cached.
    ///
    /// Fails fast when the store is unreachable; individual query failures
    /// are counted in the report.
    pub async fn warm_cache(&self, strategy: WarmingStrategy, top_n: usize) -> Result<WarmingReport> {
        let mut report = WarmingReport {
            strategy,
            ..Default::default()
        };
        if !self.results.is_enabled() {
            return Ok(report);
        }

        let candidates = self
            .tracker
            .candidates(strategy, top_n, self.cache_config.warm_min_hits);
        report.candidates = candidates.len();
        if candidates.is_empty() {
            return Ok(report);
        }

        self.store.health_check().await?;

        for query in candidates {
            if self.results.contains(&query.key) {
                report.already_cached += 1;
                continue;
            }
            let plan = self.optimizer.plan(&query.request);
            let types = query.request.resolved_types();
            let generations = self.write_generations(&types);
            match self.execute(&query.request, &plan).await {
                Ok(execution) if execution.complete => {
                    if self.cache_results(&query.key, &types, &generations, &execution.results) {
                        report.warmed += 1;
                    } else {
                        report.stale += 1;
                    }
                }
                Ok(_) => report.failed += 1,
                Err(e) => {
                    warn!(query = %query.request.query, error = %e, "Cache warming query failed");
                    report.failed += 1;
                }
            }
        }

        info!(
            strategy = %strategy,
            warmed = report.warmed,
            already_cached = report.already_cached,
            failed = report.failed,
            "Cache warming complete"
        );
        Ok(report)
    }

    /// Purge, retune and warm in one pass
    pub async fn maintain_cache(&self) -> Result<MaintenanceReport> {
        let purged = self.results.purge_expired() + self.embeddings.purge_expired();
        let optimization = self.optimize_cache();
        let warming = self
            .warm_cache(WarmingStrategy::default(), self.cache_config.warm_top_n)
            .await?;

        Ok(MaintenanceReport {
            purged,
            optimization,
            warming,
        })
    }
}
