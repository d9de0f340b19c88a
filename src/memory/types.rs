// src/memory/types.rs
// Memory records, metadata and request/response types

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::filter::MemoryFilter;
use super::limits::DEFAULT_IMPORTANCE;
use crate::error::{MemoryError, Result};
use crate::query::QueryStrategy;

/// The kinds of memory the service stores. Each lives in its own collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    Message,
    Thought,
    Document,
    Task,
    MemoryEdit,
}

impl MemoryType {
    pub const ALL: [MemoryType; 5] = [
        MemoryType::Message,
        MemoryType::Thought,
        MemoryType::Document,
        MemoryType::Task,
        MemoryType::MemoryEdit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::Message => "message",
            MemoryType::Thought => "thought",
            MemoryType::Document => "document",
            MemoryType::Task => "task",
            MemoryType::MemoryEdit => "memory_edit",
        }
    }

    /// Unprefixed collection name
    pub fn collection(&self) -> &'static str {
        match self {
            MemoryType::Message => "messages",
            MemoryType::Thought => "thoughts",
            MemoryType::Document => "documents",
            MemoryType::Task => "tasks",
            MemoryType::MemoryEdit => "memory_edits",
        }
    }

    /// Collection name with the optional `{prefix}_` applied
    pub fn collection_name(&self, prefix: &str) -> String {
        if prefix.is_empty() {
            self.collection().to_string()
        } else {
            format!("{}_{}", prefix, self.collection())
        }
    }

    /// Cache invalidation tag for results drawn from this type
    pub fn cache_tag(&self) -> String {
        format!("type:{}", self.as_str())
    }
}

impl fmt::Display for MemoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemoryType {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "message" | "messages" => Ok(MemoryType::Message),
            "thought" | "thoughts" => Ok(MemoryType::Thought),
            "document" | "documents" => Ok(MemoryType::Document),
            "task" | "tasks" => Ok(MemoryType::Task),
            "memory_edit" | "memory_edits" | "edit" => Ok(MemoryType::MemoryEdit),
            other => Err(MemoryError::InvalidInput(format!(
                "unknown memory type '{}'",
                other
            ))),
        }
    }
}

/// Importance score in `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Importance(f32);

impl Importance {
    pub const LOW: Importance = Importance(0.25);
    pub const MEDIUM: Importance = Importance(0.5);
    pub const HIGH: Importance = Importance(0.75);
    pub const CRITICAL: Importance = Importance(1.0);

    /// Clamp into `[0, 1]`; NaN becomes the default
    pub fn new(value: f32) -> Self {
        if value.is_nan() {
            return Importance(DEFAULT_IMPORTANCE);
        }
        Importance(value.clamp(0.0, 1.0))
    }

    pub fn value(&self) -> f32 {
        self.0
    }

    pub fn from_level(level: &str) -> Option<Self> {
        match level.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::LOW),
            "medium" | "normal" => Some(Self::MEDIUM),
            "high" => Some(Self::HIGH),
            "critical" => Some(Self::CRITICAL),
            _ => None,
        }
    }

    /// Parse from a stored JSON value: a number, a numeric string, or a level name
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_f64().map(|v| Self::new(v as f32)),
            Value::String(s) => Self::from_level(s)
                .or_else(|| s.trim().parse::<f32>().ok().map(Self::new)),
            _ => None,
        }
    }

    /// Nearest level name
    pub fn level(&self) -> &'static str {
        match self.0 {
            v if v >= 0.875 => "critical",
            v if v >= 0.625 => "high",
            v if v >= 0.375 => "medium",
            _ => "low",
        }
    }
}

impl Default for Importance {
    fn default() -> Self {
        Importance(DEFAULT_IMPORTANCE)
    }
}

/// Free-form metadata attached to a memory (a JSON object)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(Map<String, Value>);

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    /// Shallow merge: keys in `other` overwrite ours
    pub fn merge(&mut self, other: Metadata) {
        for (k, v) in other.0 {
            self.0.insert(k, v);
        }
    }

    /// String value for a key (numbers and bools are not coerced)
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn user_id(&self) -> Option<&str> {
        self.str_field("user_id")
    }

    pub fn agent_id(&self) -> Option<&str> {
        self.str_field("agent_id")
    }

    pub fn chat_id(&self) -> Option<&str> {
        self.str_field("chat_id")
    }

    pub fn thread_id(&self) -> Option<&str> {
        self.str_field("thread_id")
    }

    pub fn role(&self) -> Option<&str> {
        self.str_field("role")
    }

    pub fn source(&self) -> Option<&str> {
        self.str_field("source")
    }

    pub fn file_id(&self) -> Option<&str> {
        self.str_field("file_id")
    }

    /// Tags from a string array or a comma-separated string
    pub fn tags(&self) -> Vec<String> {
        match self.0.get("tags") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str())
                .map(String::from)
                .collect(),
            Some(Value::String(s)) => s
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(String::from)
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Importance, falling back to the default when absent or unparsable
    pub fn importance(&self) -> Importance {
        self.0
            .get("importance")
            .and_then(Importance::from_value)
            .unwrap_or_default()
    }
}

impl From<Map<String, Value>> for Metadata {
    fn from(map: Map<String, Value>) -> Self {
        Metadata(map)
    }
}

impl TryFrom<Value> for Metadata {
    type Error = MemoryError;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Metadata(map)),
            Value::Null => Ok(Metadata::default()),
            other => Err(MemoryError::InvalidInput(format!(
                "metadata must be a JSON object, got {}",
                other
            ))),
        }
    }
}

/// A stored memory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub memory_type: MemoryType,
    #[serde(default)]
    pub metadata: Metadata,
}

impl MemoryRecord {
    pub fn new(memory_type: MemoryType, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            text: text.into(),
            timestamp: Utc::now(),
            memory_type,
            metadata: Metadata::default(),
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn importance(&self) -> Importance {
        self.metadata.importance()
    }
}

/// Parameters for `add_memory`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddMemoryParams {
    pub memory_type: MemoryType,
    pub text: String,
    #[serde(default)]
    pub metadata: Metadata,
    /// Caller-supplied UUID; generated when absent
    #[serde(default)]
    pub id: Option<String>,
    /// Defaults to now
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl AddMemoryParams {
    pub fn new(memory_type: MemoryType, text: impl Into<String>) -> Self {
        Self {
            memory_type,
            text: text.into(),
            metadata: Metadata::default(),
            id: None,
            timestamp: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// Parameters for `update_memory`. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateMemoryParams {
    pub text: Option<String>,
    pub metadata: Option<Metadata>,
    /// Replace metadata wholesale instead of merging
    #[serde(default)]
    pub replace_metadata: bool,
}

impl UpdateMemoryParams {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn metadata(metadata: Metadata) -> Self {
        Self {
            metadata: Some(metadata),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.metadata.is_none()
    }
}

/// A search over one or more memory types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Free text; empty means filter-only listing
    #[serde(default)]
    pub query: String,
    /// Types to search; empty means all types
    #[serde(default)]
    pub memory_types: Vec<MemoryType>,
    #[serde(default)]
    pub filter: MemoryFilter,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub min_score: Option<f32>,
    /// Force a strategy instead of letting the optimizer pick
    #[serde(default)]
    pub strategy: Option<QueryStrategy>,
    #[serde(default = "default_true")]
    pub use_cache: bool,
}

fn default_true() -> bool {
    true
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            memory_types: Vec::new(),
            filter: MemoryFilter::default(),
            limit: None,
            min_score: None,
            strategy: None,
            use_cache: true,
        }
    }

    pub fn with_types(mut self, types: impl IntoIterator<Item = MemoryType>) -> Self {
        self.memory_types = types.into_iter().collect();
        self
    }

    pub fn with_filter(mut self, filter: MemoryFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = Some(min_score);
        self
    }

    pub fn with_strategy(mut self, strategy: QueryStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn without_cache(mut self) -> Self {
        self.use_cache = false;
        self
    }

    /// Types to query, expanding "empty" to all types (sorted, deduped)
    pub fn resolved_types(&self) -> Vec<MemoryType> {
        if self.memory_types.is_empty() {
            return MemoryType::ALL.to_vec();
        }
        let mut types = self.memory_types.clone();
        types.sort();
        types.dedup();
        types
    }
}

/// One search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemorySearchResult {
    pub record: MemoryRecord,
    /// Final ranking score
    pub score: f32,
    /// Raw vector similarity, when a vector search ran
    pub vector_score: Option<f32>,
    /// Keyword match score, when hybrid reranking ran
    pub text_score: Option<f32>,
}

/// Validate a caller-supplied point ID (the store only accepts UUIDs)
pub fn validate_id(id: &str) -> Result<String> {
    Uuid::parse_str(id.trim())
        .map(|u| u.to_string())
        .map_err(|_| MemoryError::InvalidInput(format!("memory id '{}' is not a UUID", id)))
}
