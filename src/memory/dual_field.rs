// src/memory/dual_field.rs
//! Dual-field payload layout.
//!
//! Every stored payload keeps the full metadata under `metadata`, and copies
//! a configured set of fields to the top level so filters on them don't
//! have to reach into the nested object:
//!
//! ```json
//! { "text": "...", "timestamp": 1700000000000, "type": "message",
//!   "metadata": { "user_id": "u1", "importance": "high", "mood": "ok" },
//!   "user_id": "u1", "importance": 0.75 }
//! ```

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::debug;

use super::filter::{FieldMatch, MemoryFilter, PayloadFilter};
use super::limits::{FLOAT_INDEXED_FIELDS, RESERVED_PAYLOAD_KEYS};
use super::types::{MemoryRecord, MemoryType, Metadata};
use crate::error::{MemoryError, Result};
use crate::storage::IndexKind;

const KEY_TEXT: &str = "text";
const KEY_TIMESTAMP: &str = "timestamp";
const KEY_TYPE: &str = "type";
const KEY_METADATA: &str = "metadata";
/// Older payloads stored the text here
const LEGACY_KEY_CONTENT: &str = "content";

/// Maps records to and from dual-field payloads and builds filters against them
#[derive(Debug, Clone)]
pub struct DualFieldMapper {
    promoted: Vec<String>,
}

impl DualFieldMapper {
    /// Reserved keys and duplicates are dropped from the promoted set
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut promoted: Vec<String> = Vec::new();
        for field in fields {
            let field = field.into().trim().to_string();
            if field.is_empty() || RESERVED_PAYLOAD_KEYS.contains(&field.as_str()) {
                debug!(field = %field, "Skipping reserved dual field");
                continue;
            }
            if !promoted.contains(&field) {
                promoted.push(field);
            }
        }
        Self { promoted }
    }

    pub fn promoted_fields(&self) -> &[String] {
        &self.promoted
    }

    pub fn is_promoted(&self, field: &str) -> bool {
        self.promoted.iter().any(|f| f == field)
    }

    /// Payload key a filter on `field` should target
    pub fn filter_key(&self, field: &str) -> String {
        if self.is_promoted(field) {
            field.to_string()
        } else {
            format!("{}.{}", KEY_METADATA, field)
        }
    }

    /// Payload indexes to create: one per promoted field, plus the timestamp
    pub fn index_fields(&self) -> Vec<(String, IndexKind)> {
        let mut fields: Vec<(String, IndexKind)> = self
            .promoted
            .iter()
            .map(|f| {
                let kind = if FLOAT_INDEXED_FIELDS.contains(&f.as_str()) {
                    IndexKind::Float
                } else {
                    IndexKind::Keyword
                };
                (f.clone(), kind)
            })
            .collect();
        fields.push((KEY_TIMESTAMP.to_string(), IndexKind::Integer));
        fields
    }

    /// Build the stored payload for a record
    pub fn to_payload(&self, record: &MemoryRecord) -> Map<String, Value> {
        let mut payload = Map::new();
        payload.insert(KEY_TEXT.into(), Value::String(record.text.clone()));
        payload.insert(
            KEY_TIMESTAMP.into(),
            Value::from(record.timestamp.timestamp_millis()),
        );
        payload.insert(KEY_TYPE.into(), Value::from(record.memory_type.as_str()));
        payload.insert(
            KEY_METADATA.into(),
            Value::Object(record.metadata.as_map().clone()),
        );

        for field in &self.promoted {
            match field.as_str() {
                // Always present in numeric form so range filters see the effective value
                "importance" => {
                    payload.insert(field.clone(), Value::from(record.importance().value()));
                }
                "tags" => {
                    if record.metadata.contains_key("tags") {
                        payload.insert(field.clone(), Value::from(record.metadata.tags()));
                    }
                }
                _ => {
                    if let Some(value) = record.metadata.get(field) {
                        payload.insert(field.clone(), value.clone());
                    }
                }
            }
        }
        payload
    }

    /// Rebuild a record from a stored payload.
    ///
    /// `fallback_type` is the type of the collection the point came from, used
    /// when the payload carries no (valid) `type`.
    pub fn from_payload(
        &self,
        id: String,
        fallback_type: MemoryType,
        payload: &Map<String, Value>,
    ) -> Result<MemoryRecord> {
        let text = payload
            .get(KEY_TEXT)
            .or_else(|| payload.get(LEGACY_KEY_CONTENT))
            .and_then(Value::as_str)
            .ok_or_else(|| MemoryError::Store(format!("point {} has no text in its payload", id)))?
            .to_string();

        let timestamp = payload
            .get(KEY_TIMESTAMP)
            .and_then(parse_timestamp)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

        let memory_type = payload
            .get(KEY_TYPE)
            .and_then(Value::as_str)
            .and_then(|t| t.parse().ok())
            .unwrap_or(fallback_type);

        let metadata = match payload.get(KEY_METADATA) {
            Some(Value::Object(nested)) => Metadata::from(nested.clone()),
            _ => {
                // Legacy layout: everything lived at the top level
                let mut meta = Map::new();
                for (key, value) in payload {
                    if RESERVED_PAYLOAD_KEYS.contains(&key.as_str()) || key == LEGACY_KEY_CONTENT {
                        continue;
                    }
                    meta.insert(key.clone(), value.clone());
                }
                Metadata::from(meta)
            }
        };

        Ok(MemoryRecord {
            id,
            text,
            timestamp,
            memory_type,
            metadata,
        })
    }

    /// Translate a memory filter into payload conditions
    pub fn build_filter(&self, filter: &MemoryFilter) -> Result<PayloadFilter> {
        let mut out = PayloadFilter::new();

        for (field, value) in filter.keyword_fields() {
            out = out.keyword(self.filter_key(field), value);
        }

        if !filter.tags.is_empty() {
            out = out.with(
                self.filter_key("tags"),
                FieldMatch::AnyKeyword(filter.tags.clone()),
            );
        }

        if let Some(min) = filter.min_importance {
            out = out.range(self.filter_key("importance"), Some(min as f64), None);
        }

        if filter.since.is_some() || filter.until.is_some() {
            out = out.range(
                KEY_TIMESTAMP,
                filter.since.map(|t| t.timestamp_millis() as f64),
                filter.until.map(|t| t.timestamp_millis() as f64),
            );
        }

        for (field, value) in &filter.fields {
            let matcher = value_matcher(field, value)?;
            out = out.with(self.filter_key(field), matcher);
        }

        Ok(out)
    }
}

impl Default for DualFieldMapper {
    fn default() -> Self {
        Self::new(super::limits::DEFAULT_DUAL_FIELDS.iter().copied())
    }
}

fn value_matcher(field: &str, value: &Value) -> Result<FieldMatch> {
    match value {
        Value::String(s) => Ok(FieldMatch::Keyword(s.clone())),
        Value::Bool(b) => Ok(FieldMatch::Bool(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Ok(FieldMatch::Integer(i)),
            None => {
                let f = n.as_f64().unwrap_or_default();
                Ok(FieldMatch::Range {
                    gte: Some(f),
                    lte: Some(f),
                })
            }
        },
        Value::Array(items) => {
            let keywords: Option<Vec<String>> =
                items.iter().map(|v| v.as_str().map(String::from)).collect();
            keywords.map(FieldMatch::AnyKeyword).ok_or_else(|| {
                MemoryError::InvalidInput(format!(
                    "filter on '{}' must be a list of strings",
                    field
                ))
            })
        }
        Value::Null | Value::Object(_) => Err(MemoryError::InvalidInput(format!(
            "unsupported filter value for '{}'",
            field
        ))),
    }
}

/// Epoch millis (current layout) or RFC 3339 (older payloads)
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .and_then(DateTime::from_timestamp_millis),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        _ => None,
    }
}
