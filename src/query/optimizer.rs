// src/query/optimizer.rs
//! Strategy selection and per-strategy execution stats.
//!
//! `plan()` picks a strategy from the shape of the request, then adjusts it
//! from what previous executions of that strategy looked like: a slow
//! `HighQuality` falls back to `Balanced`, and a `HighSpeed` that keeps
//! coming back empty is widened to `Balanced`. Every `RETRY_EVERY`th
//! diverted plan runs the original strategy anyway, so its stats keep
//! moving and the fallback lifts once it performs again.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::QueryStrategy;
use crate::config::SearchConfig;
use crate::memory::types::SearchRequest;
use crate::text::tokenize;

/// Queries with at least this many terms get the wide pool
const LONG_QUERY_TERMS: usize = 8;
/// Queries with at most this many terms (and no filter) get the narrow pool
const SHORT_QUERY_TERMS: usize = 2;
/// Executions before empty-result stats are trusted
const MIN_EXECUTIONS_FOR_ADAPTATION: u64 = 10;
const EMPTY_RESULT_RATIO: f64 = 0.5;
/// Smoothing factor for the latency moving average
const LATENCY_EMA_ALPHA: f64 = 0.2;
const THRESHOLD_STEP: f32 = 0.1;
/// A diverted strategy still runs on every Nth plan
const RETRY_EVERY: u64 = 10;

/// How to run one search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPlan {
    pub strategy: QueryStrategy,
    /// Results returned to the caller
    pub limit: usize,
    /// Points fetched per collection before merging/reranking
    pub candidate_limit: usize,
    /// Vector similarity floor; `None` for filter-only listing
    pub score_threshold: Option<f32>,
    pub vector_weight: f32,
    /// Non-zero only for hybrid plans
    pub keyword_weight: f32,
    pub timeout: Duration,
    pub use_cache: bool,
}

/// Execution stats for one strategy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyStats {
    pub executions: u64,
    pub empty_results: u64,
    pub total_results: u64,
    pub ema_latency_ms: f64,
    /// Plans that asked for this strategy but ran another
    #[serde(default)]
    pub diverted: u64,
}

impl StrategyStats {
    pub fn empty_ratio(&self) -> f64 {
        if self.executions == 0 {
            0.0
        } else {
            self.empty_results as f64 / self.executions as f64
        }
    }

    pub fn avg_results(&self) -> f64 {
        if self.executions == 0 {
            0.0
        } else {
            self.total_results as f64 / self.executions as f64
        }
    }
}

pub struct QueryOptimizer {
    config: SearchConfig,
    stats: RwLock<HashMap<QueryStrategy, StrategyStats>>,
}

impl QueryOptimizer {
    pub fn new(config: SearchConfig) -> Self {
        Self {
            config,
            stats: RwLock::new(HashMap::new()),
        }
    }

    /// Build the execution plan for a request
    pub fn plan(&self, request: &SearchRequest) -> QueryPlan {
        let limit = request
            .limit
            .unwrap_or(self.config.default_limit)
            .clamp(1, self.config.max_limit.max(1));
        let min_score = request
            .min_score
            .unwrap_or(self.config.min_score)
            .clamp(0.0, 1.0);

        let strategy = self.select_strategy(request);
        let max = self.config.max_limit.max(limit);

        let (candidate_limit, score_threshold) = match strategy {
            QueryStrategy::FilterOnly => (limit, None),
            QueryStrategy::HighSpeed => (limit, Some((min_score + THRESHOLD_STEP).min(1.0))),
            QueryStrategy::Balanced => ((limit * 2).min(max), Some(min_score)),
            QueryStrategy::HighQuality | QueryStrategy::Hybrid => (
                (limit * 3).min(max),
                Some((min_score - THRESHOLD_STEP).max(0.0)),
            ),
        };

        let (vector_weight, keyword_weight) = if strategy == QueryStrategy::Hybrid {
            normalized_weights(
                self.config.hybrid_vector_weight,
                self.config.hybrid_text_weight,
            )
        } else {
            (1.0, 0.0)
        };

        let plan = QueryPlan {
            strategy,
            limit,
            candidate_limit,
            score_threshold,
            vector_weight,
            keyword_weight,
            timeout: Duration::from_millis(self.config.query_timeout_ms),
            use_cache: request.use_cache,
        };
        debug!(
            strategy = %plan.strategy,
            limit = plan.limit,
            candidates = plan.candidate_limit,
            "Query planned"
        );
        plan
    }

    fn select_strategy(&self, request: &SearchRequest) -> QueryStrategy {
        let query = request.query.trim();
        if query.is_empty() {
            return QueryStrategy::FilterOnly;
        }
        if let Some(forced) = request.strategy {
            return forced;
        }

        let terms = tokenize(query).len();
        let quoted = query.matches('"').count() >= 2;

        let initial = if quoted || terms >= LONG_QUERY_TERMS {
            QueryStrategy::HighQuality
        } else if terms <= SHORT_QUERY_TERMS && request.filter.is_empty() {
            QueryStrategy::HighSpeed
        } else {
            QueryStrategy::Balanced
        };

        self.adapt(initial)
    }

    /// Adjust a chosen strategy using observed stats
    fn adapt(&self, strategy: QueryStrategy) -> QueryStrategy {
        let mut stats = self.stats.write();
        let Some(s) = stats.get_mut(&strategy) else {
            return strategy;
        };

        let degraded = match strategy {
            QueryStrategy::HighQuality => {
                s.executions > 0 && s.ema_latency_ms > self.config.slow_query_ms as f64
            }
            QueryStrategy::HighSpeed => {
                s.executions >= MIN_EXECUTIONS_FOR_ADAPTATION
                    && s.empty_ratio() >= EMPTY_RESULT_RATIO
            }
            _ => false,
        };
        if !degraded {
            return strategy;
        }

        s.diverted += 1;
        if s.diverted % RETRY_EVERY == 0 {
            debug!(strategy = %strategy, diverted = s.diverted, "Retrying degraded strategy");
            return strategy;
        }
        debug!(
            strategy = %strategy,
            ema_ms = s.ema_latency_ms,
            empty_ratio = s.empty_ratio(),
            "Strategy degraded, using Balanced"
        );
        QueryStrategy::Balanced
    }

    /// Record one execution
    pub fn record(&self, strategy: QueryStrategy, latency: Duration, result_count: usize) {
        let mut stats = self.stats.write();
        let s = stats.entry(strategy).or_default();
        let ms = latency.as_secs_f64() * 1000.0;
        s.ema_latency_ms = if s.executions == 0 {
            ms
        } else {
            LATENCY_EMA_ALPHA * ms + (1.0 - LATENCY_EMA_ALPHA) * s.ema_latency_ms
        };
        s.executions += 1;
        s.total_results += result_count as u64;
        if result_count == 0 {
            s.empty_results += 1;
        }
    }

    pub fn stats(&self) -> BTreeMap<QueryStrategy, StrategyStats> {
        self.stats
            .read()
            .iter()
            .map(|(k, v)| (*k, v.clone()))
            .collect()
    }

    pub fn reset_stats(&self) {
        self.stats.write().clear();
    }
}

/// Normalize a weight pair to sum to 1 (falls back to vector-only)
pub fn normalized_weights(vector: f32, text: f32) -> (f32, f32) {
    let vector = vector.max(0.0);
    let text = text.max(0.0);
    let total = vector + text;
    if total <= 0.0 || !total.is_finite() {
        return (1.0, 0.0);
    }
    (vector / total, text / total)
}
