// src/query/mod.rs
// Query planning: pick a search strategy per request

pub mod optimizer;

pub use optimizer::{QueryOptimizer, QueryPlan, StrategyStats};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How a search is executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStrategy {
    /// No embedding: list filter matches, newest first
    FilterOnly,
    /// Exact-size candidate pool, stricter threshold
    HighSpeed,
    Balanced,
    /// Large candidate pool, looser threshold
    HighQuality,
    /// HighQuality pool reranked with keyword scores
    Hybrid,
}

impl QueryStrategy {
    pub const ALL: [QueryStrategy; 5] = [
        QueryStrategy::FilterOnly,
        QueryStrategy::HighSpeed,
        QueryStrategy::Balanced,
        QueryStrategy::HighQuality,
        QueryStrategy::Hybrid,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryStrategy::FilterOnly => "filter_only",
            QueryStrategy::HighSpeed => "high_speed",
            QueryStrategy::Balanced => "balanced",
            QueryStrategy::HighQuality => "high_quality",
            QueryStrategy::Hybrid => "hybrid",
        }
    }

    /// Whether the strategy needs a query embedding
    pub fn uses_vectors(&self) -> bool {
        !matches!(self, QueryStrategy::FilterOnly)
    }
}

impl fmt::Display for QueryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "filter_only" | "filter" => Ok(Self::FilterOnly),
            "high_speed" | "fast" => Ok(Self::HighSpeed),
            "balanced" => Ok(Self::Balanced),
            "high_quality" | "quality" => Ok(Self::HighQuality),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(format!("unknown query strategy: {}", other)),
        }
    }
}
