// tests/ingest_test.rs
// File and directory ingestion into document memories


use std::fs;

use agent_memory::ingest::{FileIngestor, IngestOptions};
use agent_memory::memory::{MemoryFilter, MemoryType, SearchRequest};
use test_helpers::{create_test_service, test_config};

async fn ingestor() -> FileIngestor {
    FileIngestor::new(create_test_service().await, test_config().ingest).unwrap()
}

#[tokio::test]
async fn test_ingest_directory() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("runbook.md"), "# Failover\n\nPromote the replica, then repoint DNS.").unwrap();
    fs::write(dir.path().join("config.json"), r#"{"region":"eu-west-1","replicas":3}"#).unwrap();
    fs::write(dir.path().join("logo.png"), b"\x89PNG\r\n\x1a\nxxxx").unwrap();
    fs::write(dir.path().join(".secret"), "hidden file").unwrap();
    fs::create_dir(dir.path().join("nested")).unwrap();
    fs::write(dir.path().join("nested").join("deep.txt"), "Nested notes about failover drills.").unwrap();

    let ingestor = ingestor().await;

    let shallow = ingestor
        .ingest_dir(dir.path(), false, &IngestOptions::default())
        .await
        .unwrap();
    assert_eq!(shallow.files.len(), 2);
    assert_eq!(shallow.unsupported.len(), 1);
    assert!(shallow.failures.is_empty());
    assert!(shallow.files.iter().all(|f| !f.file_name.starts_with('.')));

    // Files seen before are skipped, the nested one is new
    let deep = ingestor
        .ingest_dir(dir.path(), true, &IngestOptions::default())
        .await
        .unwrap();
    assert_eq!(deep.files.len(), 3);
    assert_eq!(deep.files.iter().filter(|f| f.skipped).count(), 2);
    assert_eq!(
        ingestor.service().count(MemoryType::Document, None).await.unwrap(),
        3
    );
}

#[tokio::test]
async fn test_ingested_chunks_are_searchable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("oncall.txt");
    fs::write(&path, "Pager rotation swaps every Monday morning.\n\nEscalate to the duty manager after thirty minutes.").unwrap();

    let ingestor = ingestor().await;
    let report = ingestor.ingest_file(&path, &IngestOptions::default()).await.unwrap();
    assert_eq!(report.format, "text");
    assert!(report.tags.contains(&"format:text".to_string()));
    assert!(report.tags.contains(&"ext:txt".to_string()));
    assert!(!report.summary.is_empty());

    let request = SearchRequest::new("pager rotation monday")
        .with_types([MemoryType::Document])
        .with_filter(MemoryFilter::new().field("file_id", report.file_id.clone()))
        .with_min_score(0.0);
    let results = ingestor.service().search(&request).await.unwrap();
    assert_eq!(results.len(), 1);
    let chunk = &results[0].record;
    assert_eq!(chunk.metadata.source(), Some("file"));
    assert_eq!(chunk.metadata.str_field("file_name"), Some("oncall.txt"));
    assert_eq!(chunk.metadata.str_field("content_hash"), Some(report.content_hash.as_str()));

    // The source tag is promoted, so tag filters match chunks directly
    let tagged = ingestor
        .service()
        .get_recent(MemoryType::Document, &MemoryFilter::new().tag("ext:txt"), 10)
        .await
        .unwrap();
    assert_eq!(tagged.len(), 1);
}

#[tokio::test]
async fn test_missing_path_fails() {
    let ingestor = ingestor().await;
    assert!(ingestor
        .ingest_file("/definitely/not/here.txt", &IngestOptions::default())
        .await
        .is_err());
    assert!(ingestor
        .ingest_dir("/definitely/not/here", true, &IngestOptions::default())
        .await
        .is_err());
}
