// src/cache/mod.rs
//! In-process query/result cache.
//!
//! Entries carry their own TTL, priority, importance and invalidation tags.
//! With adaptive TTL on, an entry's lifetime starts from
//! `base × (0.5 + importance)` and grows by 10% per hit (up to 10 hits),
//! always clamped to `[min_ttl, max_ttl]`. `optimize()` tunes the base TTL
//! itself from the hit rate observed since the previous run.

pub mod key;
pub mod warming;

pub use key::{cache_key, embedding_key, search_key};
pub use warming::{QueryTracker, TrackedQuery, WarmingReport, WarmingStrategy};

use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::CacheConfig;

/// Below this hit rate the base TTL is extended
const LOW_HIT_RATE: f64 = 0.3;
/// Above this hit rate (and under memory pressure) the base TTL is shortened
const HIGH_HIT_RATE: f64 = 0.8;
/// Lookups needed before `optimize()` acts
const MIN_LOOKUPS_FOR_TUNING: u64 = 20;
/// Fill ratio considered memory pressure
const PRESSURE_RATIO: f64 = 0.9;
const TTL_GROWTH: f64 = 1.25;
const TTL_SHRINK: f64 = 0.8;
/// Hits that still extend an entry's TTL
const MAX_HIT_BONUS: u64 = 10;

/// Which entry to drop when the cache is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    /// Least recently accessed
    Lru,
    /// Fewest hits, then least recently accessed
    Lfu,
    /// Lowest priority, then least recently accessed
    #[default]
    Priority,
}

impl FromStr for EvictionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lru" => Ok(Self::Lru),
            "lfu" => Ok(Self::Lfu),
            "priority" => Ok(Self::Priority),
            other => Err(format!("unknown eviction policy: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CachePriority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl CachePriority {
    /// Bucket an importance score (0.0-1.0)
    pub fn from_importance(importance: f32) -> Self {
        match importance {
            i if i >= 0.875 => Self::Critical,
            i if i >= 0.625 => Self::High,
            i if i >= 0.375 => Self::Medium,
            _ => Self::Low,
        }
    }
}

/// Per-entry insert options
#[derive(Debug, Clone, Default)]
pub struct InsertOptions {
    /// Fixed TTL; disables adaptive TTL for this entry
    pub ttl: Option<Duration>,
    /// Defaults to the priority bucket of `importance`
    pub priority: Option<CachePriority>,
    pub importance: Option<f32>,
    pub tags: Vec<String>,
}

impl InsertOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn priority(mut self, priority: CachePriority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn importance(mut self, importance: f32) -> Self {
        self.importance = Some(importance);
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }
}

/// Cache statistics for monitoring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub invalidations: u64,
    pub entries: usize,
    pub capacity: usize,
    pub hit_rate: f64,
    pub base_ttl_secs: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationAction {
    ExtendedTtl,
    ShortenedTtl,
    Unchanged,
}

/// Result of one `optimize()` pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationReport {
    pub action: OptimizationAction,
    pub previous_base_ttl_secs: f64,
    pub base_ttl_secs: f64,
    /// Hit rate over the lookups since the previous pass
    pub window_hit_rate: f64,
    pub window_lookups: u64,
    pub expired_purged: usize,
    pub memory_pressure: bool,
}

struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
    last_access: Instant,
    hits: u64,
    priority: CachePriority,
    importance: f32,
    tags: HashSet<String>,
    fixed_ttl: bool,
}

#[derive(Default)]
struct Counters {
    hits: u64,
    misses: u64,
    inserts: u64,
    evictions: u64,
    expirations: u64,
    invalidations: u64,
    window_hits: u64,
    window_misses: u64,
}

struct Inner<V> {
    entries: HashMap<String, CacheEntry<V>>,
    base_ttl: Duration,
    counters: Counters,
}

/// Thread-safe TTL cache keyed by string
pub struct QueryCache<V> {
    config: CacheConfig,
    inner: Mutex<Inner<V>>,
}

impl<V: Clone> QueryCache<V> {
    pub fn new(config: CacheConfig) -> Self {
        let base_ttl = config.default_ttl();
        Self {
            config,
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                base_ttl,
                counters: Counters::default(),
            }),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled && self.config.max_entries > 0
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current base TTL (moves with `optimize()`)
    pub fn base_ttl(&self) -> Duration {
        self.inner.lock().base_ttl
    }

    /// TTL for an entry with the given importance and hit count
    fn adaptive_ttl(&self, base: Duration, importance: f32, hits: u64) -> Duration {
        let importance_factor = 0.5 + importance.clamp(0.0, 1.0) as f64;
        let hit_factor = 1.0 + 0.1 * hits.min(MAX_HIT_BONUS) as f64;
        let millis = (base.as_secs_f64() * importance_factor * hit_factor * 1000.0).round();
        self.clamp_ttl(Duration::from_millis(millis as u64))
    }

    fn clamp_ttl(&self, ttl: Duration) -> Duration {
        let min = self.config.min_ttl();
        let max = self.config.max_ttl().max(min);
        ttl.clamp(min, max)
    }

    /// Look up a live entry, recording a hit or miss
    pub fn get(&self, key: &str) -> Option<V> {
        if !self.is_enabled() {
            return None;
        }
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let base = inner.base_ttl;

        let expired = match inner.entries.get(key) {
            None => {
                inner.counters.misses += 1;
                inner.counters.window_misses += 1;
                return None;
            }
            Some(entry) => entry.expires_at <= now,
        };

        if expired {
            inner.entries.remove(key);
            inner.counters.expirations += 1;
            inner.counters.misses += 1;
            inner.counters.window_misses += 1;
            debug!(key = short(key), "Cache entry expired");
            return None;
        }

        inner.counters.hits += 1;
        inner.counters.window_hits += 1;

        let adaptive = self.config.adaptive_ttl;
        let entry = inner.entries.get_mut(key)?;
        entry.hits += 1;
        entry.last_access = now;
        if adaptive && !entry.fixed_ttl {
            let ttl = self.adaptive_ttl(base, entry.importance, entry.hits);
            entry.expires_at = now + ttl;
        }
        Some(entry.value.clone())
    }

    /// True if a live entry exists (no stats recorded)
    pub fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        self.inner
            .lock()
            .entries
            .get(key)
            .is_some_and(|e| e.expires_at > now)
    }

    /// Remaining lifetime of a live entry
    pub fn ttl_remaining(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.inner
            .lock()
            .entries
            .get(key)
            .filter(|e| e.expires_at > now)
            .map(|e| e.expires_at - now)
    }

    pub fn insert(&self, key: impl Into<String>, value: V, options: InsertOptions) {
        if !self.is_enabled() {
            return;
        }
        let key = key.into();
        let now = Instant::now();
        let importance = options
            .importance
            .unwrap_or(crate::memory::limits::DEFAULT_IMPORTANCE)
            .clamp(0.0, 1.0);
        let priority = options
            .priority
            .unwrap_or_else(|| CachePriority::from_importance(importance));

        let mut inner = self.inner.lock();
        let ttl = match options.ttl {
            Some(ttl) => ttl,
            None if self.config.adaptive_ttl => self.adaptive_ttl(inner.base_ttl, importance, 0),
            None => inner.base_ttl,
        };

        if !inner.entries.contains_key(&key) && inner.entries.len() >= self.config.max_entries {
            let purged = purge_expired_locked(&mut inner, now);
            if purged > 0 {
                debug!(purged, "Purged expired entries before eviction");
            }
            while inner.entries.len() >= self.config.max_entries {
                match select_victim(&inner.entries, self.config.eviction) {
                    Some(victim) => {
                        inner.entries.remove(&victim);
                        inner.counters.evictions += 1;
                        debug!(key = short(&victim), policy = ?self.config.eviction, "Evicted cache entry");
                    }
                    None => break,
                }
            }
        }

        inner.entries.insert(
            key,
            CacheEntry {
                value,
                expires_at: now + ttl,
                last_access: now,
                hits: 0,
                priority,
                importance,
                tags: options.tags.into_iter().collect(),
                fixed_ttl: options.ttl.is_some(),
            },
        );
        inner.counters.inserts += 1;
    }

    /// Remove one entry
    pub fn invalidate(&self, key: &str) -> bool {
        let mut inner = self.inner.lock();
        let removed = inner.entries.remove(key).is_some();
        if removed {
            inner.counters.invalidations += 1;
        }
        removed
    }

    /// Remove every entry carrying `tag`
    pub fn invalidate_tag(&self, tag: &str) -> usize {
        self.invalidate_matching(|_, tags, _| tags.contains(tag))
    }

    /// Remove entries whose key and value satisfy the predicate
    pub fn invalidate_where<F>(&self, predicate: F) -> usize
    where
        F: Fn(&str, &V) -> bool,
    {
        self.invalidate_matching(|key, _, value| predicate(key, value))
    }

    fn invalidate_matching<F>(&self, predicate: F) -> usize
    where
        F: Fn(&str, &HashSet<String>, &V) -> bool,
    {
        let mut inner = self.inner.lock();
        let before = inner.entries.len();
        inner
            .entries
            .retain(|key, entry| !predicate(key, &entry.tags, &entry.value));
        let removed = before - inner.entries.len();
        inner.counters.invalidations += removed as u64;
        if removed > 0 {
            debug!(removed, "Invalidated cache entries");
        }
        removed
    }

    /// Drop everything
    pub fn clear(&self) -> usize {
        let mut inner = self.inner.lock();
        let removed = inner.entries.len();
        inner.entries.clear();
        inner.counters.invalidations += removed as u64;
        removed
    }

    /// Drop expired entries, returning how many went
    pub fn purge_expired(&self) -> usize {
        let mut inner = self.inner.lock();
        purge_expired_locked(&mut inner, Instant::now())
    }

    /// Tune the base TTL from the hit rate since the previous pass
    pub fn optimize(&self) -> OptimizationReport {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let expired_purged = purge_expired_locked(&mut inner, now);

        let window_lookups = inner.counters.window_hits + inner.counters.window_misses;
        let window_hit_rate = ratio(inner.counters.window_hits, window_lookups);
        let memory_pressure = self.config.max_entries > 0
            && inner.entries.len() as f64 >= self.config.max_entries as f64 * PRESSURE_RATIO;

        let previous = inner.base_ttl;
        let mut action = OptimizationAction::Unchanged;
        if window_lookups >= MIN_LOOKUPS_FOR_TUNING {
            if window_hit_rate < LOW_HIT_RATE {
                inner.base_ttl = self.clamp_ttl(scale(previous, TTL_GROWTH));
            } else if window_hit_rate > HIGH_HIT_RATE && memory_pressure {
                inner.base_ttl = self.clamp_ttl(scale(previous, TTL_SHRINK));
            }
            action = match inner.base_ttl.cmp(&previous) {
                std::cmp::Ordering::Greater => OptimizationAction::ExtendedTtl,
                std::cmp::Ordering::Less => OptimizationAction::ShortenedTtl,
                std::cmp::Ordering::Equal => OptimizationAction::Unchanged,
            };
            inner.counters.window_hits = 0;
            inner.counters.window_misses = 0;
        }

        if action != OptimizationAction::Unchanged {
            info!(
                ?action,
                hit_rate = window_hit_rate,
                previous_secs = previous.as_secs_f64(),
                new_secs = inner.base_ttl.as_secs_f64(),
                "Cache base TTL adjusted"
            );
        }

        OptimizationReport {
            action,
            previous_base_ttl_secs: previous.as_secs_f64(),
            base_ttl_secs: inner.base_ttl.as_secs_f64(),
            window_hit_rate,
            window_lookups,
            expired_purged,
            memory_pressure,
        }
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        let c = &inner.counters;
        CacheStats {
            hits: c.hits,
            misses: c.misses,
            inserts: c.inserts,
            evictions: c.evictions,
            expirations: c.expirations,
            invalidations: c.invalidations,
            entries: inner.entries.len(),
            capacity: self.config.max_entries,
            hit_rate: ratio(c.hits, c.hits + c.misses),
            base_ttl_secs: inner.base_ttl.as_secs_f64(),
        }
    }
}

fn purge_expired_locked<V>(inner: &mut Inner<V>, now: Instant) -> usize {
    let before = inner.entries.len();
    inner.entries.retain(|_, e| e.expires_at > now);
    let purged = before - inner.entries.len();
    inner.counters.expirations += purged as u64;
    purged
}

fn select_victim<V>(entries: &HashMap<String, CacheEntry<V>>, policy: EvictionPolicy) -> Option<String> {
    let victim = match policy {
        EvictionPolicy::Lru => entries.iter().min_by_key(|(_, e)| e.last_access),
        EvictionPolicy::Lfu => entries.iter().min_by_key(|(_, e)| (e.hits, e.last_access)),
        EvictionPolicy::Priority => entries
            .iter()
            .min_by_key(|(_, e)| (e.priority, e.last_access)),
    };
    victim.map(|(k, _)| k.clone())
}

/// Multiply a duration, rounded to whole milliseconds
fn scale(d: Duration, factor: f64) -> Duration {
    Duration::from_millis((d.as_secs_f64() * factor * 1000.0).round() as u64)
}

fn ratio(part: u64, total: u64) -> f64 {
    if total == 0 { 0.0 } else { part as f64 / total as f64 }
}

/// First 8 chars of a key for logs
fn short(key: &str) -> &str {
    crate::text::truncate_at_boundary(key, 8)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max_entries: usize) -> CacheConfig {
        CacheConfig {
            max_entries,
            default_ttl_secs: 100,
            min_ttl_secs: 10,
            max_ttl_secs: 1000,
            ..Default::default()
        }
    }

    #[test]
    fn test_priority_from_importance() {
        assert_eq!(CachePriority::from_importance(0.1), CachePriority::Low);
        assert_eq!(CachePriority::from_importance(0.5), CachePriority::Medium);
        assert_eq!(CachePriority::from_importance(0.75), CachePriority::High);
        assert_eq!(CachePriority::from_importance(1.0), CachePriority::Critical);
    }

    #[test]
    fn test_eviction_policy_from_str() {
        assert_eq!("LRU".parse::<EvictionPolicy>().unwrap(), EvictionPolicy::Lru);
        assert!("fifo".parse::<EvictionPolicy>().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_insert_and_get() {
        let cache: QueryCache<String> = QueryCache::new(config(10));
        cache.insert("k", "v".to_string(), InsertOptions::new());
        assert_eq!(cache.get("k").as_deref(), Some("v"));
        assert!(cache.get("missing").is_none());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.inserts, 1);
        assert!((stats.hit_rate - 0.5).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_scales_with_importance() {
        let cache: QueryCache<u32> = QueryCache::new(config(10));
        cache.insert("low", 1, InsertOptions::new().importance(0.0));
        cache.insert("high", 2, InsertOptions::new().importance(1.0));

        // base 100s: low lives 50s, high lives 150s
        assert_eq!(cache.ttl_remaining("low"), Some(Duration::from_secs(50)));
        assert_eq!(cache.ttl_remaining("high"), Some(Duration::from_secs(150)));

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(cache.get("low").is_none());
        assert_eq!(cache.get("high"), Some(2));
        assert_eq!(cache.stats().expirations, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hits_extend_ttl() {
        let cache: QueryCache<u32> = QueryCache::new(config(10));
        cache.insert("k", 1, InsertOptions::new().importance(0.5));
        assert_eq!(cache.ttl_remaining("k"), Some(Duration::from_secs(100)));

        cache.get("k");
        // One hit: 100s × 1.1
        assert_eq!(cache.ttl_remaining("k"), Some(Duration::from_secs(110)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_is_clamped() {
        let cache: QueryCache<u32> = QueryCache::new(CacheConfig {
            default_ttl_secs: 100,
            min_ttl_secs: 80,
            max_ttl_secs: 120,
            ..Default::default()
        });
        cache.insert("low", 1, InsertOptions::new().importance(0.0));
        cache.insert("high", 1, InsertOptions::new().importance(1.0));
        assert_eq!(cache.ttl_remaining("low"), Some(Duration::from_secs(80)));
        assert_eq!(cache.ttl_remaining("high"), Some(Duration::from_secs(120)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_ttl_not_extended() {
        let cache: QueryCache<u32> = QueryCache::new(config(10));
        cache.insert("k", 1, InsertOptions::new().ttl(Duration::from_secs(5)));
        cache.get("k");
        assert_eq!(cache.ttl_remaining("k"), Some(Duration::from_secs(5)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lru_eviction() {
        let cache: QueryCache<u32> = QueryCache::new(CacheConfig {
            eviction: EvictionPolicy::Lru,
            ..config(2)
        });
        cache.insert("a", 1, InsertOptions::new());
        tokio::time::advance(Duration::from_secs(1)).await;
        cache.insert("b", 2, InsertOptions::new());
        tokio::time::advance(Duration::from_secs(1)).await;
        cache.get("a");
        cache.insert("c", 3, InsertOptions::new());

        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
        assert!(cache.contains("c"));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lfu_eviction() {
        let cache: QueryCache<u32> = QueryCache::new(CacheConfig {
            eviction: EvictionPolicy::Lfu,
            ..config(2)
        });
        cache.insert("a", 1, InsertOptions::new());
        cache.insert("b", 2, InsertOptions::new());
        tokio::time::advance(Duration::from_secs(1)).await;
        cache.get("a");
        cache.get("a");
        tokio::time::advance(Duration::from_secs(1)).await;
        cache.get("b");
        cache.insert("c", 3, InsertOptions::new());

        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_priority_eviction() {
        let cache: QueryCache<u32> = QueryCache::new(config(2));
        cache.insert("critical", 1, InsertOptions::new().priority(CachePriority::Critical));
        tokio::time::advance(Duration::from_secs(1)).await;
        cache.insert("low", 2, InsertOptions::new().priority(CachePriority::Low));
        cache.insert("new", 3, InsertOptions::new());

        assert!(cache.contains("critical"));
        assert!(!cache.contains("low"));
        assert!(cache.contains("new"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_purged_before_eviction() {
        let cache: QueryCache<u32> = QueryCache::new(config(2));
        cache.insert("short", 1, InsertOptions::new().ttl(Duration::from_secs(1)));
        cache.insert("long", 2, InsertOptions::new().priority(CachePriority::Low));
        tokio::time::advance(Duration::from_secs(2)).await;
        cache.insert("new", 3, InsertOptions::new());

        assert!(cache.contains("long"));
        let stats = cache.stats();
        assert_eq!(stats.evictions, 0);
        assert_eq!(stats.expirations, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replacing_key_does_not_evict() {
        let cache: QueryCache<u32> = QueryCache::new(config(1));
        cache.insert("a", 1, InsertOptions::new());
        cache.insert("a", 2, InsertOptions::new());
        assert_eq!(cache.get("a"), Some(2));
        assert_eq!(cache.stats().evictions, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tag_invalidation() {
        let cache: QueryCache<u32> = QueryCache::new(config(10));
        cache.insert("a", 1, InsertOptions::new().tag("type:message"));
        cache.insert("b", 2, InsertOptions::new().tags(["type:message", "type:task"]));
        cache.insert("c", 3, InsertOptions::new().tag("type:task"));

        assert_eq!(cache.invalidate_tag("type:message"), 2);
        assert!(cache.contains("c"));
        assert_eq!(cache.invalidate_where(|_, v| *v == 3), 1);
        assert!(cache.is_empty());
        assert_eq!(cache.stats().invalidations, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_optimize_extends_ttl_on_low_hit_rate() {
        let cache: QueryCache<u32> = QueryCache::new(config(100));
        for i in 0..25 {
            cache.get(&format!("miss-{}", i));
        }
        let report = cache.optimize();
        assert_eq!(report.action, OptimizationAction::ExtendedTtl);
        assert_eq!(report.window_lookups, 25);
        assert!((report.base_ttl_secs - 125.0).abs() < 1e-6);

        // Window resets after tuning
        let again = cache.optimize();
        assert_eq!(again.action, OptimizationAction::Unchanged);
        assert_eq!(again.window_lookups, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_optimize_shrinks_ttl_under_pressure() {
        let cache: QueryCache<u32> = QueryCache::new(config(10));
        for i in 0..10 {
            cache.insert(format!("k{}", i), i, InsertOptions::new());
        }
        for _ in 0..3 {
            for i in 0..10 {
                cache.get(&format!("k{}", i));
            }
        }
        let report = cache.optimize();
        assert!(report.memory_pressure);
        assert_eq!(report.action, OptimizationAction::ShortenedTtl);
        assert!((report.base_ttl_secs - 80.0).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_optimize_needs_enough_lookups() {
        let cache: QueryCache<u32> = QueryCache::new(config(10));
        cache.get("x");
        let report = cache.optimize();
        assert_eq!(report.action, OptimizationAction::Unchanged);
        assert_eq!(report.window_lookups, 1);
    }

    #[test]
    fn test_disabled_cache() {
        let cache: QueryCache<u32> = QueryCache::new(CacheConfig {
            enabled: false,
            ..Default::default()
        });
        cache.insert("a", 1, InsertOptions::new());
        assert!(cache.get("a").is_none());
        assert!(cache.is_empty());
        assert_eq!(cache.stats().misses, 0);
    }
}
