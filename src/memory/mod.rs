//! Memory layer
//!
//! - types: records, metadata, request/response types
//! - filter: backend-neutral payload filters
//! - dual_field: payload layout with promoted metadata fields
//! - hybrid: keyword scoring and reranking
//! - service: the `EnhancedMemoryService` tying storage, embeddings and caching together

pub mod dual_field;
pub mod filter;
pub mod hybrid;
pub mod limits;
pub mod service;
pub mod types;

pub use dual_field::DualFieldMapper;
pub use filter::{FieldCondition, FieldMatch, MemoryFilter, PayloadFilter};
pub use hybrid::{keyword_score, rerank, HybridWeights};
pub use service::{EnhancedMemoryService, MaintenanceReport, ServiceStats};
pub use types::{
    AddMemoryParams, Importance, MemoryRecord, MemorySearchResult, MemoryType, Metadata,
    SearchRequest, UpdateMemoryParams,
};
