// src/storage/in_memory.rs
// Brute-force in-process vector store (tests and offline mode)

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tracing::debug;

use super::{IndexKind, ScoredPoint, ScrollPage, StoredPoint, VectorPoint, VectorStore};
use crate::embeddings::cosine_similarity;
use crate::error::{MemoryError, Result};
use crate::memory::filter::PayloadFilter;

struct Collection {
    dimensions: usize,
    // BTreeMap keeps scroll order stable (by ID, like Qdrant)
    points: BTreeMap<String, (Vec<f32>, Map<String, Value>)>,
}

/// Vector store held entirely in memory. Nothing is persisted.
#[derive(Default)]
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of points in a collection (0 if missing)
    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .get(collection)
            .map(|c| c.points.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }
}

fn missing(collection: &str) -> MemoryError {
    MemoryError::Store(format!("collection '{}' does not exist", collection))
}

fn matches(filter: Option<&PayloadFilter>, payload: &Map<String, Value>) -> bool {
    filter.is_none_or(|f| f.matches(payload))
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    fn backend_name(&self) -> &'static str {
        "in-memory"
    }

    async fn ensure_collection(
        &self,
        name: &str,
        dimensions: usize,
        _indexes: &[(String, IndexKind)],
    ) -> Result<()> {
        let mut collections = self.collections.write();
        if let Some(existing) = collections.get(name) {
            if existing.dimensions != dimensions {
                return Err(MemoryError::Store(format!(
                    "collection '{}' has {} dimensions, expected {}",
                    name, existing.dimensions, dimensions
                )));
            }
            return Ok(());
        }
        debug!(collection = name, dimensions, "Creating in-memory collection");
        collections.insert(
            name.to_string(),
            Collection {
                dimensions,
                points: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        Ok(self.collections.read().contains_key(name))
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        self.collections.write().remove(name);
        Ok(())
    }

    async fn upsert(&self, collection: &str, points: Vec<VectorPoint>) -> Result<()> {
        let mut collections = self.collections.write();
        let coll = collections
            .get_mut(collection)
            .ok_or_else(|| missing(collection))?;

        if let Some(bad) = points.iter().find(|p| p.vector.len() != coll.dimensions) {
            return Err(MemoryError::InvalidInput(format!(
                "vector for point {} has {} dimensions, collection '{}' expects {}",
                bad.id,
                bad.vector.len(),
                collection,
                coll.dimensions
            )));
        }

        for point in points {
            coll.points.insert(point.id, (point.vector, point.payload));
        }
        Ok(())
    }

    async fn overwrite_payload(
        &self,
        collection: &str,
        id: &str,
        payload: Map<String, Value>,
    ) -> Result<()> {
        let mut collections = self.collections.write();
        let coll = collections
            .get_mut(collection)
            .ok_or_else(|| missing(collection))?;
        match coll.points.get_mut(id) {
            Some((_, existing)) => {
                *existing = payload;
                Ok(())
            }
            None => Err(MemoryError::NotFound(format!(
                "point {} in '{}'",
                id, collection
            ))),
        }
    }

    async fn get(&self, collection: &str, ids: &[String]) -> Result<Vec<StoredPoint>> {
        let collections = self.collections.read();
        let coll = collections.get(collection).ok_or_else(|| missing(collection))?;
        Ok(ids
            .iter()
            .filter_map(|id| {
                coll.points.get(id).map(|(_, payload)| StoredPoint {
                    id: id.clone(),
                    payload: payload.clone(),
                })
            })
            .collect())
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        filter: Option<&PayloadFilter>,
        score_threshold: Option<f32>,
    ) -> Result<Vec<ScoredPoint>> {
        let collections = self.collections.read();
        let coll = collections.get(collection).ok_or_else(|| missing(collection))?;
        if vector.len() != coll.dimensions {
            return Err(MemoryError::InvalidInput(format!(
                "query vector has {} dimensions, collection '{}' expects {}",
                vector.len(),
                collection,
                coll.dimensions
            )));
        }

        let mut hits: Vec<ScoredPoint> = coll
            .points
            .iter()
            .filter(|(_, (_, payload))| matches(filter, payload))
            .map(|(id, (v, payload))| ScoredPoint {
                id: id.clone(),
                score: cosine_similarity(vector, v),
                payload: payload.clone(),
            })
            .filter(|hit| score_threshold.is_none_or(|t| hit.score >= t))
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn scroll(
        &self,
        collection: &str,
        filter: Option<&PayloadFilter>,
        limit: usize,
        offset: Option<String>,
    ) -> Result<ScrollPage> {
        let collections = self.collections.read();
        let coll = collections.get(collection).ok_or_else(|| missing(collection))?;

        let start = match offset {
            Some(id) => Bound::Included(id),
            None => Bound::Unbounded,
        };
        let mut matching = coll
            .points
            .range((start, Bound::Unbounded))
            .filter(|(_, (_, payload))| matches(filter, payload));

        let points: Vec<StoredPoint> = matching
            .by_ref()
            .take(limit)
            .map(|(id, (_, payload))| StoredPoint {
                id: id.clone(),
                payload: payload.clone(),
            })
            .collect();
        let next_offset = matching.next().map(|(id, _)| id.clone());

        Ok(ScrollPage {
            points,
            next_offset,
        })
    }

    async fn delete(&self, collection: &str, ids: &[String]) -> Result<()> {
        let mut collections = self.collections.write();
        let coll = collections
            .get_mut(collection)
            .ok_or_else(|| missing(collection))?;
        for id in ids {
            coll.points.remove(id);
        }
        Ok(())
    }

    async fn delete_by_filter(&self, collection: &str, filter: &PayloadFilter) -> Result<u64> {
        let mut collections = self.collections.write();
        let coll = collections
            .get_mut(collection)
            .ok_or_else(|| missing(collection))?;
        let before = coll.points.len();
        coll.points.retain(|_, (_, payload)| !filter.matches(payload));
        Ok((before - coll.points.len()) as u64)
    }

    async fn count(&self, collection: &str, filter: Option<&PayloadFilter>) -> Result<u64> {
        let collections = self.collections.read();
        let coll = collections.get(collection).ok_or_else(|| missing(collection))?;
        Ok(coll
            .points
            .values()
            .filter(|(_, payload)| matches(filter, payload))
            .count() as u64)
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}
