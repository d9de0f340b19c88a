// tests/memory_service_test.rs
// End-to-end memory operations over the in-memory store


use chrono::{Duration as ChronoDuration, Utc};
use serde_json::json;

use agent_memory::memory::{
    AddMemoryParams, MemoryFilter, MemoryType, Metadata, SearchRequest, UpdateMemoryParams,
};
use agent_memory::query::QueryStrategy;
use agent_memory::MemoryError;
use test_helpers::{create_test_service, seed_message};

#[tokio::test]
async fn test_add_and_retrieve_message() {
    let service = create_test_service().await;
    let id = seed_message(&service, "The deploy window is Friday at noon.", "alice", "c1").await;

    let record = service
        .get_memory(MemoryType::Message, &id)
        .await
        .unwrap()
        .expect("stored message");
    assert_eq!(record.text, "The deploy window is Friday at noon.");
    assert_eq!(record.memory_type, MemoryType::Message);
    assert_eq!(record.metadata.user_id(), Some("alice"));
    assert_eq!(record.metadata.chat_id(), Some("c1"));

    // Stored in the message collection only
    assert!(service.get_memory(MemoryType::Thought, &id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_search_respects_user_filter() {
    let service = create_test_service().await;
    seed_message(&service, "postgres replication lag alert", "alice", "c1").await;
    seed_message(&service, "postgres replication lag alert", "bob", "c2").await;
    seed_message(&service, "lunch order for the team", "alice", "c1").await;

    let request = SearchRequest::new("postgres replication lag alert")
        .with_types([MemoryType::Message])
        .with_filter(MemoryFilter::new().user("alice"))
        .with_min_score(0.0);
    let results = service.search(&request).await.unwrap();

    assert!(!results.is_empty());
    assert!(results.iter().all(|r| r.record.metadata.user_id() == Some("alice")));
    assert_eq!(results[0].record.text, "postgres replication lag alert");
    assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
}

#[tokio::test]
async fn test_search_spans_types() {
    let service = create_test_service().await;
    service
        .add_memories(vec![
            AddMemoryParams::new(MemoryType::Thought, "rollback plan for the billing service"),
            AddMemoryParams::new(MemoryType::Task, "write rollback plan for the billing service"),
            AddMemoryParams::new(MemoryType::Document, "billing service architecture overview"),
        ])
        .await
        .unwrap();

    let results = service
        .search(&SearchRequest::new("rollback plan billing service").with_min_score(0.0))
        .await
        .unwrap();
    let types: Vec<MemoryType> = results.iter().map(|r| r.record.memory_type).collect();
    assert!(types.contains(&MemoryType::Thought));
    assert!(types.contains(&MemoryType::Task));
    assert_eq!(service.count(MemoryType::Document, None).await.unwrap(), 1);
}

#[tokio::test]
async fn test_hybrid_search_reports_keyword_scores() {
    let service = create_test_service().await;
    seed_message(&service, "kafka consumer group rebalancing storm", "alice", "c1").await;
    seed_message(&service, "notes about the quarterly offsite", "alice", "c1").await;

    let results = service
        .hybrid_search("kafka rebalancing", &[MemoryType::Message], MemoryFilter::new(), 5)
        .await
        .unwrap();
    assert!(!results.is_empty());
    assert_eq!(results[0].record.text, "kafka consumer group rebalancing storm");
    assert!(results[0].text_score.unwrap_or_default() > 0.0);
}

#[tokio::test]
async fn test_filter_only_search_lists_newest_first() {
    let service = create_test_service().await;
    let now = Utc::now();
    for (minutes_ago, text) in [(30, "oldest"), (10, "middle"), (1, "newest")] {
        service
            .add_memory(
                AddMemoryParams::new(MemoryType::Message, text)
                    .with_metadata(Metadata::new().with("chat_id", "c9"))
                    .with_timestamp(now - ChronoDuration::minutes(minutes_ago)),
            )
            .await
            .unwrap();
    }

    let request = SearchRequest::new("")
        .with_types([MemoryType::Message])
        .with_filter(MemoryFilter::new().chat("c9"))
        .with_strategy(QueryStrategy::FilterOnly);
    let texts: Vec<String> = service
        .search(&request)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.record.text)
        .collect();
    assert_eq!(texts, vec!["newest", "middle", "oldest"]);

    let recent = service
        .get_recent(MemoryType::Message, &MemoryFilter::new().chat("c9"), 2)
        .await
        .unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].text, "newest");
}

#[tokio::test]
async fn test_update_merges_metadata_and_keeps_timestamp() {
    let service = create_test_service().await;
    let id = seed_message(&service, "original text", "alice", "c1").await;
    let before = service.get_memory(MemoryType::Message, &id).await.unwrap().unwrap();

    let updated = service
        .update_memory(
            MemoryType::Message,
            &id,
            UpdateMemoryParams::metadata(Metadata::new().with("mood", "calm")),
        )
        .await
        .unwrap();
    assert_eq!(updated.text, "original text");
    assert_eq!(updated.metadata.user_id(), Some("alice"));
    assert_eq!(updated.metadata.get("mood"), Some(&json!("calm")));

    let updated = service
        .update_memory(MemoryType::Message, &id, UpdateMemoryParams::text("rewritten text"))
        .await
        .unwrap();
    let stored = service.get_memory(MemoryType::Message, &id).await.unwrap().unwrap();
    assert_eq!(stored.text, "rewritten text");
    assert_eq!(stored.timestamp, before.timestamp);
    assert_eq!(stored.metadata, updated.metadata);
}

#[tokio::test]
async fn test_update_missing_memory_is_not_found() {
    let service = create_test_service().await;
    let err = service
        .update_memory(
            MemoryType::Task,
            &uuid::Uuid::new_v4().to_string(),
            UpdateMemoryParams::text("anything"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, MemoryError::NotFound(_)));
}

#[tokio::test]
async fn test_delete_memory_and_delete_where() {
    let service = create_test_service().await;
    let id = seed_message(&service, "short lived", "alice", "c1").await;
    seed_message(&service, "keep me", "bob", "c2").await;
    seed_message(&service, "also alice", "alice", "c3").await;

    assert!(service.delete_memory(MemoryType::Message, &id).await.unwrap());
    assert!(!service.delete_memory(MemoryType::Message, &id).await.unwrap());

    let err = service
        .delete_where(MemoryType::Message, &MemoryFilter::new())
        .await
        .unwrap_err();
    assert!(matches!(err, MemoryError::InvalidInput(_)));

    let deleted = service
        .delete_where(MemoryType::Message, &MemoryFilter::new().user("alice"))
        .await
        .unwrap();
    assert_eq!(deleted, 1);
    assert_eq!(service.count(MemoryType::Message, None).await.unwrap(), 1);
}

#[tokio::test]
async fn test_invalid_input_rejected() {
    let service = create_test_service().await;
    let err = service
        .add_memory(AddMemoryParams::new(MemoryType::Message, "   "))
        .await
        .unwrap_err();
    assert!(matches!(err, MemoryError::InvalidInput(_)));

    let err = service.get_memory(MemoryType::Message, "not-a-uuid").await.unwrap_err();
    assert!(matches!(err, MemoryError::InvalidInput(_)));

    // One bad record fails the whole batch before anything is written
    let err = service
        .add_memories(vec![
            AddMemoryParams::new(MemoryType::Message, "fine"),
            AddMemoryParams::new(MemoryType::Message, ""),
        ])
        .await
        .unwrap_err();
    assert!(matches!(err, MemoryError::InvalidInput(_)));
    assert_eq!(service.count(MemoryType::Message, None).await.unwrap(), 0);
}
