// src/cache/warming.rs
//! Cache warming.
//!
//! The service records every cacheable search in a `QueryTracker`. A
//! warming pass re-runs the most frequent (or most recent) ones whose
//! results have dropped out of the cache, so the next caller gets a hit.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::memory::service::EnhancedMemoryService;
use crate::memory::types::SearchRequest;

/// Which tracked queries to warm first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarmingStrategy {
    /// Highest execution count first
    #[default]
    FrequentQueries,
    /// Most recently executed first
    RecentQueries,
}

impl fmt::Display for WarmingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WarmingStrategy::FrequentQueries => f.write_str("frequent"),
            WarmingStrategy::RecentQueries => f.write_str("recent"),
        }
    }
}

impl FromStr for WarmingStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "frequent" | "frequent_queries" => Ok(Self::FrequentQueries),
            "recent" | "recent_queries" => Ok(Self::RecentQueries),
            other => Err(format!("unknown warming strategy: {}", other)),
        }
    }
}

/// A search seen by the service
#[derive(Debug, Clone)]
pub struct TrackedQuery {
    pub key: String,
    pub request: SearchRequest,
    pub count: u64,
    pub last_seen: Instant,
}

/// Bounded record of executed searches, keyed by cache key
pub struct QueryTracker {
    capacity: usize,
    queries: Mutex<HashMap<String, TrackedQuery>>,
}

impl QueryTracker {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            queries: Mutex::new(HashMap::new()),
        }
    }

    /// Count one execution. When full, the least-used other query is dropped.
    pub fn record(&self, key: &str, request: &SearchRequest) {
        let now = Instant::now();
        let mut queries = self.queries.lock();

        if let Some(existing) = queries.get_mut(key) {
            existing.count += 1;
            existing.last_seen = now;
            return;
        }

        if queries.len() >= self.capacity {
            let victim = queries
                .values()
                .min_by_key(|q| (q.count, q.last_seen))
                .map(|q| q.key.clone());
            if let Some(victim) = victim {
                queries.remove(&victim);
            }
        }

        queries.insert(
            key.to_string(),
            TrackedQuery {
                key: key.to_string(),
                request: request.clone(),
                count: 1,
                last_seen: now,
            },
        );
    }

    /// Up to `top_n` queries seen at least `min_hits` times, in strategy order
    pub fn candidates(
        &self,
        strategy: WarmingStrategy,
        top_n: usize,
        min_hits: u64,
    ) -> Vec<TrackedQuery> {
        let mut selected: Vec<TrackedQuery> = self
            .queries
            .lock()
            .values()
            .filter(|q| q.count >= min_hits)
            .cloned()
            .collect();

        match strategy {
            WarmingStrategy::FrequentQueries => selected.sort_by(|a, b| {
                b.count
                    .cmp(&a.count)
                    .then_with(|| b.last_seen.cmp(&a.last_seen))
            }),
            WarmingStrategy::RecentQueries => selected.sort_by(|a, b| {
                b.last_seen
                    .cmp(&a.last_seen)
                    .then_with(|| b.count.cmp(&a.count))
            }),
        }
        selected.truncate(top_n);
        selected
    }

    pub fn forget(&self, key: &str) -> bool {
        self.queries.lock().remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.queries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.queries.lock().clear();
    }
}

/// Outcome of one warming pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WarmingReport {
    pub strategy: WarmingStrategy,
    pub candidates: usize,
    pub warmed: usize,
    pub already_cached: usize,
    /// Re-run, but a write landed meanwhile so nothing was cached
    pub stale: usize,
    pub failed: usize,
}

/// Spawn the background cache maintenance task.
///
/// Each pass purges expired entries, tunes the TTLs and warms the cache.
/// `interval` is the time between passes; the first pass runs after one interval.
pub fn spawn_cache_maintenance(
    service: Arc<EnhancedMemoryService>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    info!(interval_secs = interval.as_secs(), "Starting cache maintenance");
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            match service.maintain_cache().await {
                Ok(report) => debug!(
                    purged = report.purged,
                    warmed = report.warming.warmed,
                    "Cache maintenance pass complete"
                ),
                Err(err) => warn!("cache maintenance failed: {err:#}"),
            }
        }
    })
}
