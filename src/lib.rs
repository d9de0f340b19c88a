// src/lib.rs
//! Memory layer for conversational agents.
//!
//! Memories are embedded and stored in per-type Qdrant collections with
//! selected metadata promoted to top-level payload fields. Searches go through
//! a query planner and an adaptive in-process cache; files are ingested as
//! chunked document memories.

pub mod cache;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod memory;
pub mod query;
pub mod storage;
pub mod text;

pub use config::AppConfig;
pub use error::{MemoryError, Result};
pub use ingest::{FileIngestor, IngestOptions, IngestReport};
pub use memory::{
    AddMemoryParams, EnhancedMemoryService, MemoryFilter, MemoryRecord, MemorySearchResult,
    MemoryType, Metadata, SearchRequest, UpdateMemoryParams,
};
pub use query::QueryStrategy;
