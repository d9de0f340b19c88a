//! File ingestion pipeline
//!
//! Reads a file, detects its format, extracts text, splits it into chunks and
//! stores every chunk as a `document` memory tagged with the file's id.
//!
//! - format: magic bytes / extension / mime detection
//! - parser: text extraction per format
//! - chunker: paragraph-aware chunking
//! - summary / tags: extractive summary and keyword tags shared by all chunks

pub mod chunker;
pub mod format;
pub mod parser;
pub mod summary;
pub mod tags;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

pub use chunker::{ChunkingStrategy, DocumentChunker};
pub use format::{detect_format, FileFormat};
pub use parser::{ExtractedText, TextExtractor};
pub use summary::summarize;
pub use tags::extract_tags;

use crate::config::IngestConfig;
use crate::error::{MemoryError, Result};
use crate::memory::limits::ADD_BATCH_MAX;
use crate::memory::{
    AddMemoryParams, EnhancedMemoryService, MemoryFilter, MemoryRecord, MemoryType, Metadata,
};

/// Per-call ingestion options
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestOptions {
    /// Re-ingest even when identical content is already stored
    #[serde(default)]
    pub force: bool,
    /// Extra metadata attached to every chunk
    #[serde(default)]
    pub metadata: Metadata,
    /// Overrides the configured chunking
    #[serde(default)]
    pub strategy: Option<ChunkingStrategy>,
}

impl IngestOptions {
    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_strategy(mut self, strategy: ChunkingStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestReport {
    pub file_id: String,
    pub file_name: String,
    pub file_path: String,
    pub format: String,
    pub language: Option<String>,
    pub chunks: usize,
    /// Content was already stored and nothing was written
    pub skipped: bool,
    pub content_hash: String,
    pub summary: String,
    pub tags: Vec<String>,
    pub title: Option<String>,
    pub memory_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestFailure {
    pub path: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DirectoryReport {
    pub files: Vec<IngestReport>,
    /// Files whose format has no text to extract
    pub unsupported: Vec<String>,
    pub failures: Vec<IngestFailure>,
}

impl DirectoryReport {
    pub fn chunks(&self) -> usize {
        self.files.iter().map(|f| f.chunks).sum()
    }
}

pub struct FileIngestor {
    service: Arc<EnhancedMemoryService>,
    config: IngestConfig,
    extractor: TextExtractor,
    chunker: DocumentChunker,
}

impl FileIngestor {
    pub fn new(service: Arc<EnhancedMemoryService>, config: IngestConfig) -> Result<Self> {
        let chunker = DocumentChunker::from_config(&config)?;
        Ok(Self {
            service,
            config,
            extractor: TextExtractor::new()?,
            chunker,
        })
    }

    pub fn service(&self) -> &Arc<EnhancedMemoryService> {
        &self.service
    }

    /// Ingest one file as chunked `document` memories
    pub async fn ingest_file(
        &self,
        path: impl AsRef<Path>,
        options: &IngestOptions,
    ) -> Result<IngestReport> {
        let path = path.as_ref();
        let file_meta = tokio::fs::metadata(path).await?;
        if !file_meta.is_file() {
            return Err(MemoryError::InvalidInput(format!(
                "{} is not a regular file",
                path.display()
            )));
        }
        if file_meta.len() > self.config.max_file_bytes {
            return Err(MemoryError::InvalidInput(format!(
                "{} is {} bytes, over the {} byte limit",
                path.display(),
                file_meta.len(),
                self.config.max_file_bytes
            )));
        }

        let bytes = tokio::fs::read(path).await?;
        let format = detect_format(path, &bytes);
        if !format.is_supported() {
            return Err(MemoryError::UnsupportedFormat(format!(
                "{} ({})",
                path.display(),
                format
            )));
        }

        let content_hash = content_hash(&bytes);
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let file_path = path.to_string_lossy().into_owned();
        let hash_filter = MemoryFilter::new().field("content_hash", content_hash.clone());

        let existing = self
            .service
            .get_recent(MemoryType::Document, &hash_filter, usize::MAX)
            .await?;
        if let Some(stored) = existing.first() {
            if !options.force {
                info!(file = %file_path, hash = %content_hash, "Identical content already ingested, skipping");
                return Ok(skipped_report(stored.metadata.clone(), file_name, file_path, &format, content_hash));
            }
        }

        let extension = format::extension_of(path);
        let ExtractedText { text, title } = self.extractor.extract(&format, bytes).await?;
        if text.trim().is_empty() {
            return Err(MemoryError::Extraction(format!(
                "no text could be extracted from {}",
                path.display()
            )));
        }

        let chunks = match &options.strategy {
            Some(strategy) => DocumentChunker::with_strategy(strategy.clone())?.chunk_document(&text),
            None => self.chunker.chunk_document(&text),
        };
        let summary = summarize(&text, self.config.summary_sentences);
        let tags = extract_tags(&text, self.config.max_tags, &format, extension.as_deref());

        let file_id = Uuid::new_v4().to_string();
        let chunk_count = chunks.len();
        let mut base = Metadata::new()
            .with("file_id", file_id.clone())
            .with("file_name", file_name.clone())
            .with("file_path", file_path.clone())
            .with("chunk_count", chunk_count)
            .with("format", format.as_str())
            .with("content_hash", content_hash.clone())
            .with("summary", summary.clone())
            .with("tags", tags.clone())
            .with("source", "file");
        if let Some(lang) = format.language() {
            base.insert("language", lang);
        }
        if let Some(title) = &title {
            base.insert("title", title.clone());
        }

        let params: Vec<AddMemoryParams> = chunks
            .into_iter()
            .enumerate()
            .map(|(index, chunk)| {
                let mut metadata = options.metadata.clone();
                metadata.merge(base.clone());
                metadata.insert("chunk_index", index);
                AddMemoryParams::new(MemoryType::Document, chunk).with_metadata(metadata)
            })
            .collect();

        let memory_ids = self.store_chunks(&file_id, params).await?;
        if !existing.is_empty() {
            let removed = self.remove_previous(&existing).await?;
            debug!(file = %file_path, removed, "Replaced previously ingested chunks");
        }

        info!(
            file = %file_path,
            file_id = %file_id,
            format = %format,
            chunks = chunk_count,
            "File ingested"
        );

        Ok(IngestReport {
            file_id,
            file_name,
            file_path,
            format: format.as_str().to_string(),
            language: format.language().map(String::from),
            chunks: chunk_count,
            skipped: false,
            content_hash,
            summary,
            tags,
            title,
            memory_ids,
        })
    }

    /// Ingest every visible file under a directory. Per-file failures are
    /// collected in the report instead of aborting the walk.
    pub async fn ingest_dir(
        &self,
        dir: impl AsRef<Path>,
        recursive: bool,
        options: &IngestOptions,
    ) -> Result<DirectoryReport> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(MemoryError::InvalidInput(format!(
                "{} is not a directory",
                dir.display()
            )));
        }

        let mut walker = WalkDir::new(dir).min_depth(1).sort_by_file_name();
        if !recursive {
            walker = walker.max_depth(1);
        }

        let mut paths: Vec<PathBuf> = Vec::new();
        for entry in walker.into_iter().filter_entry(|e| !is_hidden(e)) {
            match entry {
                Ok(entry) if entry.file_type().is_file() => paths.push(entry.into_path()),
                Ok(_) => {}
                Err(e) => warn!("Skipping unreadable directory entry: {}", e),
            }
        }

        let mut report = DirectoryReport::default();
        for path in paths {
            match self.ingest_file(&path, options).await {
                Ok(file) => report.files.push(file),
                Err(MemoryError::UnsupportedFormat(_)) => {
                    debug!(file = %path.display(), "Unsupported format, skipping");
                    report.unsupported.push(path.to_string_lossy().into_owned());
                }
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "Failed to ingest file");
                    report.failures.push(IngestFailure {
                        path: path.to_string_lossy().into_owned(),
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            dir = %dir.display(),
            files = report.files.len(),
            chunks = report.chunks(),
            unsupported = report.unsupported.len(),
            failures = report.failures.len(),
            "Directory ingested"
        );
        Ok(report)
    }

    /// Write chunks in batches. If any batch fails, the chunks already
    /// written under `file_id` are removed before the error is returned.
    async fn store_chunks(&self, file_id: &str, params: Vec<AddMemoryParams>) -> Result<Vec<String>> {
        let mut memory_ids = Vec::with_capacity(params.len());
        let mut remaining = params;
        while !remaining.is_empty() {
            let rest = remaining.split_off(remaining.len().min(ADD_BATCH_MAX));
            match self.service.add_memories(remaining).await {
                Ok(stored) => memory_ids.extend(stored.into_iter().map(|r| r.id)),
                Err(e) => {
                    if !memory_ids.is_empty() {
                        if let Err(cleanup) = self.forget_file(file_id).await {
                            warn!(file_id, error = %cleanup, "Failed to remove partially ingested chunks");
                        }
                    }
                    return Err(e);
                }
            }
            remaining = rest;
        }
        Ok(memory_ids)
    }

    /// Delete the chunks of earlier ingests of the same content
    async fn remove_previous(&self, previous: &[MemoryRecord]) -> Result<u64> {
        let mut file_ids: Vec<&str> = Vec::new();
        let mut removed = 0;
        for record in previous {
            match record.metadata.file_id() {
                Some(id) => {
                    if !file_ids.contains(&id) {
                        file_ids.push(id);
                    }
                }
                None => {
                    if self.service.delete_memory(MemoryType::Document, &record.id).await? {
                        removed += 1;
                    }
                }
            }
        }
        for file_id in file_ids {
            removed += self.forget_file(file_id).await?;
        }
        Ok(removed)
    }

    /// Delete every chunk stored for a file
    pub async fn forget_file(&self, file_id: &str) -> Result<u64> {
        let file_id = file_id.trim();
        if file_id.is_empty() {
            return Err(MemoryError::InvalidInput("file_id is empty".to_string()));
        }
        self.service
            .delete_where(MemoryType::Document, &MemoryFilter::new().field("file_id", file_id))
            .await
    }
}

fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with('.'))
}

/// Report for content that is already stored, built from a stored chunk
fn skipped_report(
    stored: Metadata,
    file_name: String,
    file_path: String,
    format: &FileFormat,
    content_hash: String,
) -> IngestReport {
    IngestReport {
        file_id: stored.file_id().unwrap_or_default().to_string(),
        file_name,
        file_path,
        format: format.as_str().to_string(),
        language: format.language().map(String::from),
        chunks: stored
            .get("chunk_count")
            .and_then(|v| v.as_u64())
            .unwrap_or_default() as usize,
        skipped: true,
        content_hash,
        summary: stored.str_field("summary").unwrap_or_default().to_string(),
        tags: stored.tags(),
        title: stored.str_field("title").map(String::from),
        memory_ids: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::config::AppConfig;
    use crate::embeddings::{EmbeddingProvider, HashedEmbeddings};
    use crate::storage::InMemoryVectorStore;

    /// Hashed embeddings that start failing after `batches_left` batch calls
    struct FailingEmbeddings {
        inner: HashedEmbeddings,
        batches_left: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl EmbeddingProvider for FailingEmbeddings {
        fn model_name(&self) -> &str {
            self.inner.model_name()
        }

        fn dimensions(&self) -> usize {
            self.inner.dimensions()
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            let allowed = self
                .batches_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if !allowed {
                return Err(MemoryError::Embedding("embedding service unavailable".to_string()));
            }
            self.inner.embed_batch(texts).await
        }
    }

    async fn ingestor_with(embedder: Arc<dyn EmbeddingProvider>) -> FileIngestor {
        let config = AppConfig::default();
        let service =
            EnhancedMemoryService::new(Arc::new(InMemoryVectorStore::new()), embedder, &config);
        service.initialize().await.unwrap();
        FileIngestor::new(Arc::new(service), config.ingest).unwrap()
    }

    async fn ingestor() -> FileIngestor {
        ingestor_with(Arc::new(HashedEmbeddings::default())).await
    }

    /// Ingestor whose embedder allows the returned number of further batches
    async fn failing_ingestor() -> (FileIngestor, Arc<AtomicUsize>) {
        let batches_left = Arc::new(AtomicUsize::new(usize::MAX));
        let embedder = FailingEmbeddings {
            inner: HashedEmbeddings::default(),
            batches_left: batches_left.clone(),
        };
        (ingestor_with(Arc::new(embedder)).await, batches_left)
    }

    #[test]
    fn test_content_hash_is_sha256_hex() {
        assert_eq!(
            content_hash(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn test_ingest_markdown_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guide.md");
        std::fs::write(
            &path,
            "# Rollout Guide\n\nCanary deployments limit the blast radius.\n\nAlways watch the error budget.",
        )
        .unwrap();

        let ingestor = ingestor().await;
        let options = IngestOptions::default().with_metadata(Metadata::new().with("user_id", "u1"));
        let report = ingestor.ingest_file(&path, &options).await.unwrap();

        assert!(!report.skipped);
        assert_eq!(report.format, "markdown");
        assert_eq!(report.chunks, 1);
        assert_eq!(report.title.as_deref(), Some("Rollout Guide"));
        assert!(report.tags.contains(&"format:markdown".to_string()));
        assert!(report.tags.contains(&"ext:md".to_string()));

        let stored = ingestor
            .service()
            .get_memory(MemoryType::Document, &report.memory_ids[0])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.metadata.file_id(), Some(report.file_id.as_str()));
        assert_eq!(stored.metadata.user_id(), Some("u1"));
        assert_eq!(stored.metadata.source(), Some("file"));
        assert_eq!(stored.metadata.get("chunk_index"), Some(&serde_json::json!(0)));
        assert!(stored.text.contains("Canary deployments"));
    }

    #[tokio::test]
    async fn test_reingest_skips_unless_forced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "Backups run nightly at two.").unwrap();

        let ingestor = ingestor().await;
        let first = ingestor.ingest_file(&path, &IngestOptions::default()).await.unwrap();
        let second = ingestor.ingest_file(&path, &IngestOptions::default()).await.unwrap();
        assert!(second.skipped);
        assert_eq!(second.file_id, first.file_id);
        assert_eq!(second.chunks, 1);

        let forced = ingestor
            .ingest_file(&path, &IngestOptions::default().forced())
            .await
            .unwrap();
        assert!(!forced.skipped);
        assert_ne!(forced.file_id, first.file_id);
        assert_eq!(
            ingestor.service().count(MemoryType::Document, None).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_failed_forced_reingest_keeps_previous_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "Failover drills happen every quarter.").unwrap();

        let (ingestor, batches_left) = failing_ingestor().await;
        let first = ingestor.ingest_file(&path, &IngestOptions::default()).await.unwrap();

        batches_left.store(0, Ordering::SeqCst);
        let err = ingestor
            .ingest_file(&path, &IngestOptions::default().forced())
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::Embedding(_)));

        let kept = ingestor
            .service()
            .get_recent(MemoryType::Document, &MemoryFilter::new(), 10)
            .await
            .unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].metadata.file_id(), Some(first.file_id.as_str()));
    }

    #[tokio::test]
    async fn test_failed_batch_rolls_back_earlier_batches() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.txt");
        std::fs::write(&path, "abcdefghi ".repeat(ADD_BATCH_MAX + 88)).unwrap();
        let options = IngestOptions::default().with_strategy(ChunkingStrategy::FixedSize {
            chunk_size: 10,
            overlap: 0,
        });

        let (ingestor, batches_left) = failing_ingestor().await;
        batches_left.store(1, Ordering::SeqCst);
        assert!(ingestor.ingest_file(&path, &options).await.is_err());
        assert_eq!(
            ingestor.service().count(MemoryType::Document, None).await.unwrap(),
            0
        );

        // With the embedder back, the whole file goes in
        batches_left.store(usize::MAX, Ordering::SeqCst);
        let report = ingestor.ingest_file(&path, &options).await.unwrap();
        assert_eq!(report.chunks, ADD_BATCH_MAX + 88);
        assert_eq!(
            ingestor.service().count(MemoryType::Document, None).await.unwrap(),
            report.chunks as u64
        );
    }

    #[tokio::test]
    async fn test_oversized_and_unsupported_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("pic.png");
        std::fs::write(&image, b"\x89PNG\r\n\x1a\n0000").unwrap();

        let ingestor = ingestor().await;
        let err = ingestor
            .ingest_file(&image, &IngestOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::UnsupportedFormat(_)));

        let mut config = IngestConfig::default();
        config.max_file_bytes = 4;
        let small = FileIngestor::new(ingestor.service().clone(), config).unwrap();
        let text = dir.path().join("big.txt");
        std::fs::write(&text, "more than four bytes").unwrap();
        let err = small
            .ingest_file(&text, &IngestOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_forget_file_removes_all_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("long.txt");
        let body = (0..20)
            .map(|i| format!("Paragraph {} talks about shard {} rebalancing in detail.", i, i))
            .collect::<Vec<_>>()
            .join("\n\n");
        std::fs::write(&path, body).unwrap();

        let ingestor = ingestor().await;
        let options = IngestOptions::default().with_strategy(ChunkingStrategy::FixedSize {
            chunk_size: 200,
            overlap: 20,
        });
        let report = ingestor.ingest_file(&path, &options).await.unwrap();
        assert!(report.chunks > 1);
        assert_eq!(report.memory_ids.len(), report.chunks);

        let removed = ingestor.forget_file(&report.file_id).await.unwrap();
        assert_eq!(removed as usize, report.chunks);
        assert_eq!(
            ingestor.service().count(MemoryType::Document, None).await.unwrap(),
            0
        );
    }
}
