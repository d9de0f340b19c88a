// src/memory/filter.rs
// Filters: the user-facing MemoryFilter and the store-facing PayloadFilter

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// What callers filter memories by. All set fields must match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryFilter {
    pub user_id: Option<String>,
    pub agent_id: Option<String>,
    pub chat_id: Option<String>,
    pub thread_id: Option<String>,
    pub role: Option<String>,
    pub source: Option<String>,
    /// Matches memories carrying any of these tags
    pub tags: Vec<String>,
    pub min_importance: Option<f32>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    /// Exact matches on arbitrary metadata fields
    pub fields: BTreeMap<String, Value>,
}

impl MemoryFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn chat(mut self, chat_id: impl Into<String>) -> Self {
        self.chat_id = Some(chat_id.into());
        self
    }

    pub fn thread(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn min_importance(mut self, importance: f32) -> Self {
        self.min_importance = Some(importance);
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.user_id.is_none()
            && self.agent_id.is_none()
            && self.chat_id.is_none()
            && self.thread_id.is_none()
            && self.role.is_none()
            && self.source.is_none()
            && self.tags.is_empty()
            && self.min_importance.is_none()
            && self.since.is_none()
            && self.until.is_none()
            && self.fields.is_empty()
    }

    /// Named keyword fields that are set, as (metadata key, value)
    pub fn keyword_fields(&self) -> Vec<(&'static str, &str)> {
        [
            ("user_id", &self.user_id),
            ("agent_id", &self.agent_id),
            ("chat_id", &self.chat_id),
            ("thread_id", &self.thread_id),
            ("role", &self.role),
            ("source", &self.source),
        ]
        .into_iter()
        .filter_map(|(k, v)| v.as_deref().map(|v| (k, v)))
        .collect()
    }
}

/// How a single payload field must match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldMatch {
    Keyword(String),
    Integer(i64),
    Bool(bool),
    /// Matches if the field equals any of the values
    AnyKeyword(Vec<String>),
    Range { gte: Option<f64>, lte: Option<f64> },
}

/// One condition on a (possibly dotted) payload key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldCondition {
    pub key: String,
    pub matcher: FieldMatch,
}

/// Conjunction of payload conditions, backend neutral
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PayloadFilter {
    pub must: Vec<FieldCondition>,
}

impl PayloadFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.must.is_empty()
    }

    pub fn with(mut self, key: impl Into<String>, matcher: FieldMatch) -> Self {
        self.must.push(FieldCondition {
            key: key.into(),
            matcher,
        });
        self
    }

    pub fn keyword(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.with(key, FieldMatch::Keyword(value.into()))
    }

    pub fn range(self, key: impl Into<String>, gte: Option<f64>, lte: Option<f64>) -> Self {
        self.with(key, FieldMatch::Range { gte, lte })
    }

    /// Evaluate against a stored payload (Qdrant semantics: arrays match
    /// when any element matches; missing fields never match)
    pub fn matches(&self, payload: &Map<String, Value>) -> bool {
        self.must.iter().all(|cond| {
            lookup(payload, &cond.key).is_some_and(|value| cond.matcher.matches(value))
        })
    }
}

impl FieldMatch {
    fn matches(&self, value: &Value) -> bool {
        if let Value::Array(items) = value {
            return items.iter().any(|item| self.matches_scalar(item));
        }
        self.matches_scalar(value)
    }

    fn matches_scalar(&self, value: &Value) -> bool {
        match self {
            FieldMatch::Keyword(expected) => value.as_str() == Some(expected.as_str()),
            FieldMatch::Integer(expected) => value.as_i64() == Some(*expected),
            FieldMatch::Bool(expected) => value.as_bool() == Some(*expected),
            FieldMatch::AnyKeyword(options) => value
                .as_str()
                .is_some_and(|s| options.iter().any(|o| o == s)),
            FieldMatch::Range { gte, lte } => match value.as_f64() {
                Some(v) => gte.is_none_or(|min| v >= min) && lte.is_none_or(|max| v <= max),
                None => false,
            },
        }
    }
}

/// Resolve a dotted path like `metadata.user_id`
fn lookup<'a>(payload: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    let mut parts = key.split('.');
    let mut current = payload.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}
