// src/memory/limits.rs
//! Shared limits and thresholds
//!
//! Centralized constants so the service, cache and ingestion agree.

/// Default search result limit
pub const SEARCH_DEFAULT_LIMIT: usize = 10;

/// Hard cap on results and candidate pools
pub const SEARCH_MAX_LIMIT: usize = 100;

/// Default similarity floor for balanced searches
pub const SEARCH_MIN_SCORE: f32 = 0.3;

/// Page size when scrolling collections
pub const SCROLL_PAGE_SIZE: usize = 256;

/// Max memories accepted in one `add_memories` call
pub const ADD_BATCH_MAX: usize = 512;

/// Max text length for a single memory (chars)
pub const MEMORY_TEXT_MAX_CHARS: usize = 100_000;

/// Importance used when a memory carries none
pub const DEFAULT_IMPORTANCE: f32 = 0.5;

/// Metadata fields duplicated at the payload top level by default
pub const DEFAULT_DUAL_FIELDS: &[&str] = &[
    "user_id",
    "agent_id",
    "chat_id",
    "thread_id",
    "role",
    "source",
    "importance",
    "tags",
    "file_id",
];

/// Payload keys owned by the storage layout; never promoted from metadata
pub const RESERVED_PAYLOAD_KEYS: &[&str] = &["text", "timestamp", "type", "metadata"];

/// Promoted fields indexed as floats (everything else is a keyword index)
pub const FLOAT_INDEXED_FIELDS: &[&str] = &["importance"];

/// Max extractive summary length (chars)
pub const SUMMARY_MAX_CHARS: usize = 500;
