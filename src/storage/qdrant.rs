// src/storage/qdrant.rs
//! Qdrant-backed vector store.
//!
//! Cosine distance, UUID point IDs, JSON payloads converted to and from
//! Qdrant's `Value` tree. Every call runs under the configured timeout.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{
    Condition, CountPointsBuilder, CreateCollectionBuilder, CreateFieldIndexCollectionBuilder,
    DeletePointsBuilder, Distance, FieldType, Filter, GetPointsBuilder, ListValue, PointId,
    PointStruct, Range, ScrollPointsBuilder, SearchPointsBuilder, SetPayloadPointsBuilder,
    Struct, UpsertPointsBuilder, Value as QdrantValue, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant, QdrantError};
use serde_json::{Map, Number, Value};
use tracing::{debug, info, warn};

use super::{IndexKind, ScoredPoint, ScrollPage, StoredPoint, VectorPoint, VectorStore};
use crate::error::{MemoryError, Result};
use crate::memory::filter::{FieldMatch, PayloadFilter};

/// Qdrant store over the gRPC client
pub struct QdrantVectorStore {
    client: Qdrant,
    timeout: Duration,
}

impl QdrantVectorStore {
    /// Build a client for `url` (gRPC port, usually 6334)
    pub fn connect(url: &str, api_key: Option<&str>, timeout: Duration) -> Result<Self> {
        // Skip compatibility check to allow minor server/client version drift
        let mut builder = Qdrant::from_url(url)
            .timeout(timeout)
            .skip_compatibility_check();
        if let Some(key) = api_key {
            builder = builder.api_key(key.to_string());
        }
        let client = builder.build()?;
        info!("Connected to Qdrant at {}", url);

        Ok(Self { client, timeout })
    }

    async fn timed<T, F>(&self, op: &str, fut: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, QdrantError>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(res) => res.map_err(MemoryError::from),
            Err(_) => Err(MemoryError::Timeout(format!(
                "qdrant {} exceeded {:?}",
                op, self.timeout
            ))),
        }
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    fn backend_name(&self) -> &'static str {
        "qdrant"
    }

    async fn ensure_collection(
        &self,
        name: &str,
        dimensions: usize,
        indexes: &[(String, IndexKind)],
    ) -> Result<()> {
        let exists = self
            .timed("collection_exists", self.client.collection_exists(name))
            .await?;

        if !exists {
            info!("Creating Qdrant collection: {}", name);
            let created = self
                .timed(
                    "create_collection",
                    self.client.create_collection(
                        CreateCollectionBuilder::new(name).vectors_config(VectorParamsBuilder::new(
                            dimensions as u64,
                            Distance::Cosine,
                        )),
                    ),
                )
                .await;

            if let Err(e) = created {
                // Another process may have created it between the check and the create
                if e.to_string().contains("already exists") {
                    debug!("Collection {} already exists (created concurrently)", name);
                } else {
                    return Err(e);
                }
            }

            for (field, kind) in indexes {
                let field_type = match kind {
                    IndexKind::Keyword => FieldType::Keyword,
                    IndexKind::Integer => FieldType::Integer,
                    IndexKind::Float => FieldType::Float,
                };
                let res = self
                    .timed(
                        "create_field_index",
                        self.client.create_field_index(
                            CreateFieldIndexCollectionBuilder::new(name, field.as_str(), field_type)
                                .wait(true),
                        ),
                    )
                    .await;
                if let Err(e) = res {
                    warn!(collection = name, field = %field, error = %e, "Failed to create payload index");
                }
            }
        }

        Ok(())
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        self.timed("collection_exists", self.client.collection_exists(name))
            .await
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        self.timed("delete_collection", self.client.delete_collection(name))
            .await?;
        info!("Deleted Qdrant collection: {}", name);
        Ok(())
    }

    async fn upsert(&self, collection: &str, points: Vec<VectorPoint>) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }
        let count = points.len();
        let points: Vec<PointStruct> = points
            .into_iter()
            .map(|p| PointStruct::new(to_point_id(&p.id), p.vector, to_qdrant_payload(p.payload)))
            .collect();

        self.timed(
            "upsert",
            self.client
                .upsert_points(UpsertPointsBuilder::new(collection, points).wait(true)),
        )
        .await?;

        debug!("Upserted {} points into {}", count, collection);
        Ok(())
    }

    async fn overwrite_payload(
        &self,
        collection: &str,
        id: &str,
        payload: Map<String, Value>,
    ) -> Result<()> {
        let payload = Payload::from(to_qdrant_payload(payload));
        self.timed(
            "overwrite_payload",
            self.client.overwrite_payload(
                SetPayloadPointsBuilder::new(collection, payload)
                    .points_selector(vec![to_point_id(id)])
                    .wait(true),
            ),
        )
        .await?;
        debug!("Overwrote payload of {} in {}", id, collection);
        Ok(())
    }

    async fn get(&self, collection: &str, ids: &[String]) -> Result<Vec<StoredPoint>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let point_ids: Vec<PointId> = ids.iter().map(|id| to_point_id(id)).collect();

        let response = self
            .timed(
                "get",
                self.client
                    .get_points(GetPointsBuilder::new(collection, point_ids).with_payload(true)),
            )
            .await?;

        Ok(response
            .result
            .into_iter()
            .filter_map(|p| {
                Some(StoredPoint {
                    id: point_id_string(p.id)?,
                    payload: from_qdrant_payload(p.payload),
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
        let mut builder = SearchPointsBuilder::new(collection, vector.to_vec(), limit as u64)
            .with_payload(true);
        if let Some(f) = filter.filter(|f| !f.is_empty()) {
            builder = builder.filter(to_qdrant_filter(f));
        }
        if let Some(t) = score_threshold {
            builder = builder.score_threshold(t);
        }

        let response = self.timed("search", self.client.search_points(builder)).await?;

        Ok(response
            .result
            .into_iter()
            .filter_map(|p| {
                Some(ScoredPoint {
                    id: point_id_string(p.id)?,
                    score: p.score,
                    payload: from_qdrant_payload(p.payload),
                })
            })
            .collect())
    }

    async fn scroll(
        &self,
        collection: &str,
        filter: Option<&PayloadFilter>,
        limit: usize,
        offset: Option<String>,
    ) -> Result<ScrollPage> {
        let mut builder = ScrollPointsBuilder::new(collection)
            .limit(limit.min(u32::MAX as usize) as u32)
            .with_payload(true)
            .with_vectors(false);
        if let Some(f) = filter.filter(|f| !f.is_empty()) {
            builder = builder.filter(to_qdrant_filter(f));
        }
        if let Some(off) = offset {
            builder = builder.offset(to_point_id(&off));
        }

        let response = self.timed("scroll", self.client.scroll(builder)).await?;

        let points = response
            .result
            .into_iter()
            .filter_map(|p| {
                Some(StoredPoint {
                    id: point_id_string(p.id)?,
                    payload: from_qdrant_payload(p.payload),
                })
            })
            .collect();

        Ok(ScrollPage {
            points,
            next_offset: response.next_page_offset.and_then(|id| point_id_string(Some(id))),
        })
    }

    async fn delete(&self, collection: &str, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let point_ids: Vec<PointId> = ids.iter().map(|id| to_point_id(id)).collect();
        self.timed(
            "delete",
            self.client.delete_points(
                DeletePointsBuilder::new(collection)
                    .points(point_ids)
                    .wait(true),
            ),
        )
        .await?;
        debug!("Deleted {} points from {}", ids.len(), collection);
        Ok(())
    }

    async fn delete_by_filter(&self, collection: &str, filter: &PayloadFilter) -> Result<u64> {
        // Qdrant doesn't report how many points a filtered delete removed
        let matched = self.count(collection, Some(filter)).await?;
        if matched == 0 {
            return Ok(0);
        }
        self.timed(
            "delete_by_filter",
            self.client.delete_points(
                DeletePointsBuilder::new(collection)
                    .points(to_qdrant_filter(filter))
                    .wait(true),
            ),
        )
        .await?;
        debug!("Deleted {} points from {} by filter", matched, collection);
        Ok(matched)
    }

    async fn count(&self, collection: &str, filter: Option<&PayloadFilter>) -> Result<u64> {
        let mut builder = CountPointsBuilder::new(collection).exact(true);
        if let Some(f) = filter.filter(|f| !f.is_empty()) {
            builder = builder.filter(to_qdrant_filter(f));
        }
        let response = self.timed("count", self.client.count(builder)).await?;
        Ok(response.result.map(|r| r.count).unwrap_or(0))
    }

    async fn health_check(&self) -> Result<()> {
        self.timed("health_check", self.client.health_check())
            .await
            .map(|_| ())
    }
}

/// UUIDs stay UUIDs; purely numeric IDs map to numeric points
fn to_point_id(id: &str) -> PointId {
    match id.parse::<u64>() {
        Ok(n) => PointId::from(n),
        Err(_) => PointId::from(id.to_string()),
    }
}

fn point_id_string(id: Option<PointId>) -> Option<String> {
    match id?.point_id_options? {
        PointIdOptions::Uuid(u) => Some(u),
        PointIdOptions::Num(n) => Some(n.to_string()),
    }
}

fn to_qdrant_filter(filter: &PayloadFilter) -> Filter {
    let conditions: Vec<Condition> = filter
        .must
        .iter()
        .map(|c| match &c.matcher {
            FieldMatch::Keyword(v) => Condition::matches(c.key.as_str(), v.clone()),
            FieldMatch::Integer(v) => Condition::matches(c.key.as_str(), *v),
            FieldMatch::Bool(v) => Condition::matches(c.key.as_str(), *v),
            FieldMatch::AnyKeyword(vs) => Condition::matches(c.key.as_str(), vs.clone()),
            FieldMatch::Range { gte, lte } => Condition::range(
                c.key.as_str(),
                Range {
                    gte: *gte,
                    lte: *lte,
                    ..Default::default()
                },
            ),
        })
        .collect();
    Filter::must(conditions)
}

fn to_qdrant_payload(payload: Map<String, Value>) -> HashMap<String, QdrantValue> {
    payload
        .into_iter()
        .map(|(k, v)| (k, json_to_qdrant(v)))
        .collect()
}

fn from_qdrant_payload(payload: HashMap<String, QdrantValue>) -> Map<String, Value> {
    payload
        .into_iter()
        .map(|(k, v)| (k, qdrant_to_json(v)))
        .collect()
}

fn json_to_qdrant(value: Value) -> QdrantValue {
    let kind = match value {
        Value::Null => Kind::NullValue(0),
        Value::Bool(b) => Kind::BoolValue(b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Kind::IntegerValue(i),
            None => Kind::DoubleValue(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => Kind::StringValue(s),
        Value::Array(items) => Kind::ListValue(ListValue {
            values: items.into_iter().map(json_to_qdrant).collect(),
        }),
        Value::Object(map) => Kind::StructValue(Struct {
            fields: map
                .into_iter()
                .map(|(k, v)| (k, json_to_qdrant(v)))
                .collect(),
        }),
    };
    QdrantValue { kind: Some(kind) }
}

fn qdrant_to_json(value: QdrantValue) -> Value {
    match value.kind {
        None | Some(Kind::NullValue(_)) => Value::Null,
        Some(Kind::BoolValue(b)) => Value::Bool(b),
        Some(Kind::IntegerValue(i)) => Value::from(i),
        Some(Kind::DoubleValue(d)) => Number::from_f64(d).map(Value::Number).unwrap_or(Value::Null),
        Some(Kind::StringValue(s)) => Value::String(s),
        Some(Kind::ListValue(list)) => {
            Value::Array(list.values.into_iter().map(qdrant_to_json).collect())
        }
        Some(Kind::StructValue(s)) => Value::Object(
            s.fields
                .into_iter()
                .map(|(k, v)| (k, qdrant_to_json(v)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_qdrant_round_trip() {
        let original = json!({
            "text": "hello",
            "timestamp": 1_700_000_000_000i64,
            "importance": 0.75,
            "tags": ["a", "b"],
            "flag": true,
            "none": null,
            "metadata": {"nested": {"deep": 1}}
        });
        let map = original.as_object().cloned().unwrap();
        let back = from_qdrant_payload(to_qdrant_payload(map));
        assert_eq!(Value::Object(back), original);
    }

    #[test]
    fn test_point_id_conversion() {
        let uuid = "3f1c2a4e-8f6b-4d3a-9c1e-2b7d5a6f8e90";
        assert_eq!(point_id_string(Some(to_point_id(uuid))).as_deref(), Some(uuid));
        assert_eq!(point_id_string(Some(to_point_id("42"))).as_deref(), Some("42"));
        assert_eq!(point_id_string(None), None);
    }

    #[test]
    fn test_filter_conversion_keeps_every_condition() {
        let filter = PayloadFilter::new()
            .keyword("user_id", "u1")
            .range("importance", Some(0.5), None)
            .with("tags", FieldMatch::AnyKeyword(vec!["x".into()]))
            .with("metadata.turn", FieldMatch::Integer(2))
            .with("metadata.pinned", FieldMatch::Bool(false));
        let q = to_qdrant_filter(&filter);
        assert_eq!(q.must.len(), 5);
        assert!(q.should.is_empty());
    }
}
