// src/storage/mod.rs
//! Vector store abstraction.
//!
//! The service talks to a `VectorStore`; `QdrantVectorStore` is the
//! production backend and `InMemoryVectorStore` serves tests and the
//! offline CLI mode. Payloads are plain JSON objects on both sides.

pub mod in_memory;
pub mod qdrant;

pub use in_memory::InMemoryVectorStore;
pub use qdrant::QdrantVectorStore;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::Result;
use crate::memory::filter::PayloadFilter;

/// Payload index type for a field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    Keyword,
    Integer,
    Float,
}

/// A point to write
#[derive(Debug, Clone)]
pub struct VectorPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: Map<String, Value>,
}

/// A point read back without a score
#[derive(Debug, Clone)]
pub struct StoredPoint {
    pub id: String,
    pub payload: Map<String, Value>,
}

/// A search hit
#[derive(Debug, Clone)]
pub struct ScoredPoint {
    pub id: String,
    pub score: f32,
    pub payload: Map<String, Value>,
}

/// One page of a scroll. `next_offset` is `None` on the last page.
#[derive(Debug, Clone, Default)]
pub struct ScrollPage {
    pub points: Vec<StoredPoint>,
    pub next_offset: Option<String>,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Short backend name for logs and stats
    fn backend_name(&self) -> &'static str;

    /// Create the collection (cosine distance) and payload indexes if missing
    async fn ensure_collection(
        &self,
        name: &str,
        dimensions: usize,
        indexes: &[(String, IndexKind)],
    ) -> Result<()>;

    async fn collection_exists(&self, name: &str) -> Result<bool>;

    async fn delete_collection(&self, name: &str) -> Result<()>;

    /// Insert or replace points by ID
    async fn upsert(&self, collection: &str, points: Vec<VectorPoint>) -> Result<()>;

    /// Replace one point's payload, leaving its vector untouched
    async fn overwrite_payload(
        &self,
        collection: &str,
        id: &str,
        payload: Map<String, Value>,
    ) -> Result<()>;

    /// Fetch points by ID; unknown IDs are skipped
    async fn get(&self, collection: &str, ids: &[String]) -> Result<Vec<StoredPoint>>;

    /// Nearest neighbours by cosine similarity, best first
    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        filter: Option<&PayloadFilter>,
        score_threshold: Option<f32>,
    ) -> Result<Vec<ScoredPoint>>;

    /// Page through points in ID order
    async fn scroll(
        &self,
        collection: &str,
        filter: Option<&PayloadFilter>,
        limit: usize,
        offset: Option<String>,
    ) -> Result<ScrollPage>;

    async fn delete(&self, collection: &str, ids: &[String]) -> Result<()>;

    /// Delete every point matching the filter, returning how many matched
    async fn delete_by_filter(&self, collection: &str, filter: &PayloadFilter) -> Result<u64>;

    async fn count(&self, collection: &str, filter: Option<&PayloadFilter>) -> Result<u64>;

    async fn health_check(&self) -> Result<()>;
}

/// Scroll a collection to the end, collecting every matching point
pub async fn scroll_all(
    store: &dyn VectorStore,
    collection: &str,
    filter: Option<&PayloadFilter>,
    page_size: usize,
) -> Result<Vec<StoredPoint>> {
    let mut all = Vec::new();
    let mut offset = None;

    loop {
        let page = store
            .scroll(collection, filter, page_size.max(1), offset.take())
            .await?;
        all.extend(page.points);
        match page.next_offset {
            Some(next) => offset = Some(next),
            None => break,
        }
    }

    Ok(all)
}
