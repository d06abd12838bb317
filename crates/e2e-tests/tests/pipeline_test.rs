//! Legacy backend E2E tests for docket-sync.
//!
//! Batch writes, aggregate re-indexing with the freshness gate, shared
//! parent metadata and deletes, driven through the task runner.

use chrono::{Duration, Utc};
use pretty_assertions::assert_eq;

use e2e_tests::{audio, docket, docket_document_ids, TestHarness};
use sync_indexing::{AggregatePayload, AggregateStatus};
use sync_scheduler::{TaskMessage, TaskValue};
use sync_types::{Entity, EntityKind};

fn batch_written(value: Option<TaskValue>) -> sync_indexing::BatchReport {
    match value {
        Some(TaskValue::Batch(report)) => report,
        other => panic!("expected batch report, got {:?}", other),
    }
}

/// Records that fail conversion are left out; the rest are written.
#[tokio::test]
async fn test_add_batch_partial_failure() {
    let broken = Entity::new(3, EntityKind::Audio).with_field("local_path_mp3", "mp3/3.mp3");
    let harness = TestHarness::new(vec![audio(1), audio(2), broken]);

    let value = harness
        .run(
            TaskMessage::AddBatch {
                ids: vec![1, 2, 3],
                kind: EntityKind::Audio,
                force_commit: true,
            }
            .into(),
        )
        .await
        .unwrap();

    let report = batch_written(value);
    assert_eq!(report.written, 2);
    assert_eq!(report.failed, vec![3]);
    assert!(report.committed);
    assert_eq!(harness.audio_core.ids(), vec!["1".to_string(), "2".to_string()]);
    assert_eq!(harness.audio_core.commit_calls(), 1);
}

/// Writing the same records twice leaves the index with the same documents.
#[tokio::test]
async fn test_add_batch_is_idempotent() {
    let harness = TestHarness::new(vec![audio(1), audio(2)]);
    let line = r#"{"task": "add_batch", "ids": [1, 2], "kind": "audio"}"#;

    harness.run_lines(line).await;
    let first = harness.audio_core.get("1").unwrap().body;
    harness.run_lines(line).await;

    assert_eq!(harness.audio_core.len(), 2);
    assert_eq!(harness.audio_core.get("1").unwrap().body, first);
    assert_eq!(harness.audio_core.commit_calls(), 0);
}

/// Ids missing from the store are skipped without failing the batch.
#[tokio::test]
async fn test_add_batch_unknown_ids_skipped() {
    let harness = TestHarness::new(vec![audio(1)]);
    let results = harness
        .run_lines(r#"{"task": "add_batch", "ids": [1, 404], "kind": "audio"}"#)
        .await;

    let report = batch_written(results.into_iter().next().unwrap().unwrap());
    assert_eq!(report.written, 1);
    assert!(report.failed.is_empty());
}

/// A stale docket is re-indexed with all its documents and stamped.
#[tokio::test]
async fn test_stale_docket_reindexed_and_stamped() {
    let indexed_at = Utc::now() - Duration::days(2);
    let harness = TestHarness::new(vec![docket(7, 3, Some(indexed_at))]);

    let value = harness
        .run(
            TaskMessage::AddOrUpdateAggregate {
                payload: Some(AggregatePayload {
                    parent_id: 7,
                    content_changed: false,
                }),
                force_commit: false,
                freshness_threshold_secs: None,
            }
            .into(),
        )
        .await
        .unwrap();

    let Some(TaskValue::Aggregate(AggregateStatus::Reindexed(report))) = value else {
        panic!("expected re-index, got {:?}", value);
    };
    assert_eq!(report.written, 3);

    let ids: Vec<String> = docket_document_ids(7, 3).iter().map(u64::to_string).collect();
    assert_eq!(harness.recap_core.ids(), ids);

    // Docket fields are copied into every document
    let doc = harness.recap_core.get("7002").unwrap();
    assert_eq!(doc.body["court_id"], "dcd");
    assert_eq!(doc.body["document_number"], 2);

    let stamped = harness
        .store
        .get(EntityKind::Docket, 7)
        .unwrap()
        .last_indexed_at
        .unwrap();
    assert!(stamped > indexed_at);
}

/// A docket indexed within the threshold is skipped unless its content changed.
#[tokio::test]
async fn test_fresh_docket_gate() {
    let indexed_at = Utc::now() - Duration::minutes(5);
    let harness = TestHarness::new(vec![docket(8, 2, Some(indexed_at))]);

    let unchanged = r#"{"task": "add_or_update_aggregate", "payload": {"parent_id": 8}}"#;
    let results = harness.run_lines(unchanged).await;
    assert!(matches!(
        results[0],
        Ok(Some(TaskValue::Aggregate(AggregateStatus::Skipped)))
    ));
    assert_eq!(harness.recap_core.total_calls(), 0);
    assert_eq!(
        harness.store.get(EntityKind::Docket, 8).unwrap().last_indexed_at,
        Some(indexed_at)
    );

    let changed =
        r#"{"task": "add_or_update_aggregate", "payload": {"parent_id": 8, "content_changed": true}}"#;
    let results = harness.run_lines(changed).await;
    assert!(matches!(
        results[0],
        Ok(Some(TaskValue::Aggregate(AggregateStatus::Reindexed(_))))
    ));
    assert_eq!(harness.recap_core.len(), 2);
}

/// A shorter threshold on the message overrides the default gate.
#[tokio::test]
async fn test_message_threshold_overrides_default() {
    let indexed_at = Utc::now() - Duration::minutes(5);
    let harness = TestHarness::new(vec![docket(9, 1, Some(indexed_at))]);

    let results = harness
        .run_lines(
            r#"{"task": "add_or_update_aggregate", "payload": {"parent_id": 9}, "freshness_threshold_secs": 60}"#,
        )
        .await;

    assert!(matches!(
        results[0],
        Ok(Some(TaskValue::Aggregate(AggregateStatus::Reindexed(_))))
    ));
}

/// A missing payload does nothing.
#[tokio::test]
async fn test_missing_payload_is_noop() {
    let harness = TestHarness::new(Vec::new());
    let results = harness
        .run_lines(r#"{"task": "add_or_update_aggregate"}"#)
        .await;

    assert!(matches!(
        results[0],
        Ok(Some(TaskValue::Aggregate(AggregateStatus::Skipped)))
    ));
    assert_eq!(harness.recap_core.total_calls(), 0);
}

/// Parent metadata is looked up once for a whole batch of documents.
#[tokio::test]
async fn test_children_batch_fetches_parent_once() {
    let harness = TestHarness::new(vec![docket(5, 100, None)]);

    let value = harness
        .run(
            TaskMessage::AddChildrenBatch {
                ids: docket_document_ids(5, 100),
                force_commit: true,
            }
            .into(),
        )
        .await
        .unwrap();

    let report = batch_written(value);
    assert_eq!(report.written, 100);
    assert_eq!(harness.store.metadata_fetches(), 1);
    assert_eq!(
        harness.recap_core.get("5100").unwrap().body["case_name"],
        "United States v. Party 5"
    );
}

/// RECAP documents from different dockets each get their own docket's fields.
#[tokio::test]
async fn test_add_batch_documents_across_dockets() {
    let harness = TestHarness::new(vec![docket(5, 2, None), docket(6, 1, None)]);

    let results = harness
        .run_lines(r#"{"task": "add_batch", "ids": [5001, 6001, 5002], "kind": "recap_document"}"#)
        .await;

    let report = batch_written(results.into_iter().next().unwrap().unwrap());
    assert_eq!(report.written, 3);
    assert_eq!(harness.store.metadata_fetches(), 2);
    for id in ["5001", "5002"] {
        let body = harness.recap_core.get(id).unwrap().body;
        assert_eq!(body["case_name"], "United States v. Party 5");
        assert_eq!(body["docket_number"], "1:24-cv-00005");
    }
    let body = harness.recap_core.get("6001").unwrap().body;
    assert_eq!(body["case_name"], "United States v. Party 6");
    assert_eq!(body["description"], "Entry 1");
}

/// Deleted documents disappear from the legacy index.
#[tokio::test]
async fn test_delete_batch() {
    let harness = TestHarness::new(vec![audio(1), audio(2)]);
    harness
        .run_lines(r#"{"task": "add_batch", "ids": [1, 2], "kind": "audio"}"#)
        .await;
    let results = harness
        .run_lines(r#"{"task": "delete_batch", "ids": [2], "kind": "audio", "force_commit": true}"#)
        .await;

    let report = batch_written(results.into_iter().next().unwrap().unwrap());
    assert_eq!(report.deleted, 1);
    assert!(report.committed);
    assert_eq!(harness.audio_core.ids(), vec!["1".to_string()]);
}

/// A kind without a configured writer fails the task for good.
#[tokio::test]
async fn test_unconfigured_kind_dead_lettered() {
    let harness = TestHarness::new(Vec::new());
    let results = harness
        .run_lines(r#"{"task": "add_batch", "ids": [1], "kind": "opinion_cluster"}"#)
        .await;

    assert!(results[0].is_err());
    let letters = harness.runner.registry().dead_letters();
    assert_eq!(letters.len(), 1);
    assert_eq!(letters[0].attempts, 1);
}
