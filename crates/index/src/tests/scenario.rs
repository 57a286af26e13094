//! End-to-end behavior of the index manager against a real chunk store
//! and on-disk artifacts.

use super::support::{metadatas, texts, Harness};
use crate::mutation::AddStage;
use crate::types::{CountSource, SearchOutcome, SearchPath, SlotResolution};
use crate::ChunkStore;
use ragstore_core::AppError;
use std::fs;

#[tokio::test]
async fn test_add_then_delete_files_for_one_owner() {
    let h = Harness::new();
    h.ingest(
        "u1",
        "f1",
        &["rust ownership rules", "borrow checker errors", "lifetime elision"],
    )
    .await;

    let added = h
        .manager
        .add_texts("u1", &texts(&["new text"]), &metadatas("u1", "f2", 1))
        .await
        .unwrap();
    h.chunks
        .insert_many(&[crate::ChunkRecord::new(
            &crate::ChunkMetadata::new("u1", "f2", 0),
            "new text",
        )])
        .unwrap();
    assert_eq!(added.count, 4);
    assert_eq!(added.count_source, CountSource::Exact);

    let deleted = h.manager.delete_file("u1", "f1").await.unwrap();
    assert_eq!(deleted.removed, 3);
    assert_eq!(deleted.remaining, 1);

    let handle = h.manager.registry().cached("u1").unwrap();
    let docs = handle.documents().unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].metadata.file_id, "f2");
    assert_eq!(docs[0].text, "new text");

    let deleted = h.manager.delete_file("u1", "f2").await.unwrap();
    assert_eq!(deleted.removed, 1);
    assert_eq!(deleted.remaining, 0);
    assert!(deleted.evicted);
    assert!(!h.layout().owner_dir("u1").exists());
    assert!(h.manager.list_loaded_owners().is_empty());

    let outcome = h.manager.search("u1", "rust", Some(3)).await.unwrap();
    assert!(outcome.is_no_data());
}

#[tokio::test]
async fn test_delete_leaves_index_matching_canonical_store() {
    let h = Harness::new();
    h.ingest("u1", "keep", &["alpha one", "alpha two"]).await;
    h.ingest("u1", "drop", &["beta one", "beta two", "beta three"]).await;
    h.ingest("u2", "drop", &["other owner text"]).await;

    let before = h.chunks.count_by_owner("u1").unwrap();
    let deleted = h.manager.delete_file("u1", "drop").await.unwrap();

    assert_eq!(deleted.removed, 3);
    assert_eq!(h.chunks.count_by_owner("u1").unwrap(), before - 3);

    let handle = h.manager.registry().cached("u1").unwrap();
    assert_eq!(handle.vector_count(), Some(h.chunks.count_by_owner("u1").unwrap()));

    // Other owners are untouched
    assert_eq!(h.chunks.count_by_owner("u2").unwrap(), 1);
}

#[tokio::test]
async fn test_delete_of_unknown_file_is_noop() {
    let h = Harness::new();
    h.ingest("u1", "f1", &["some indexed text"]).await;
    let batches = h.provider.batches();

    let deleted = h.manager.delete_file("u1", "missing").await.unwrap();
    assert_eq!(deleted.removed, 0);
    assert_eq!(deleted.remaining, 1);
    assert!(!deleted.evicted);

    assert_eq!(h.provider.batches(), batches, "no rebuild expected");
    assert_eq!(h.manager.list_loaded_owners(), vec!["u1"]);
}

#[tokio::test]
async fn test_delete_rebuild_failure_is_partial() {
    let h = Harness::new();
    h.ingest("u1", "f1", &["first file text"]).await;
    h.ingest("u1", "f2", &["second file text"]).await;

    h.provider.set_failing(true);
    let err = h.manager.delete_file("u1", "f1").await.unwrap_err();
    match &err {
        AppError::DeletePartial {
            records_removed, ..
        } => assert_eq!(*records_removed, 1),
        other => panic!("expected DeletePartial, got {other:?}"),
    }
    assert!(err.is_data_safe());

    // Canonical delete stands; the stale artifact is still served
    assert_eq!(h.chunks.count_by_owner("u1").unwrap(), 1);
    let handle = h.manager.registry().cached("u1").unwrap();
    assert_eq!(handle.vector_count(), Some(2));

    // An append keeps the stale vectors; only the next rebuild drops them
    h.provider.set_failing(false);
    h.ingest("u1", "f3", &["third file text"]).await;
    let handle = h.manager.registry().cached("u1").unwrap();
    assert_eq!(handle.vector_count(), Some(3));

    h.manager.delete_file("u1", "f3").await.unwrap();
    let handle = h.manager.registry().cached("u1").unwrap();
    assert_eq!(handle.vector_count(), Some(1));
}

#[tokio::test]
async fn test_emptied_owner_directory_must_be_removed() {
    let h = Harness::new();
    h.ingest("u1", "f1", &["only file text"]).await;

    // A plain file where the artifact directory should be cannot be removed
    let dir = h.layout().owner_dir("u1");
    fs::remove_dir_all(&dir).unwrap();
    fs::write(&dir, b"not a directory").unwrap();

    let err = h.manager.delete_file("u1", "f1").await.unwrap_err();
    assert!(matches!(err, AppError::DeletePartial { .. }));
    assert!(err.is_data_safe());
    assert_eq!(h.chunks.count_by_owner("u1").unwrap(), 0);
    assert_eq!(h.manager.list_loaded_owners(), vec!["u1"]);
}

#[tokio::test]
async fn test_persisted_artifact_survives_restart() {
    let h = Harness::new();
    h.ingest("u1", "f1", &["persist me please", "and me too"]).await;
    let before = h.manager.registry().cached("u1").unwrap();

    let restarted = h.restart();
    assert!(restarted.list_loaded_owners().is_empty());
    assert_eq!(restarted.registry().load_all().await, vec!["u1"]);

    let after = restarted.registry().cached("u1").unwrap();
    assert_eq!(after.vector_count(), before.vector_count());
    assert_eq!(after.slots(), before.slots());
    assert_eq!(after.documents().unwrap(), before.documents().unwrap());
}

#[tokio::test]
async fn test_search_ranks_closest_first() {
    let h = Harness::new();
    h.ingest(
        "u1",
        "f1",
        &[
            "gardening tomatoes in summer",
            "rust async runtime internals",
            "baking sourdough bread",
        ],
    )
    .await;

    let outcome = h
        .manager
        .search("u1", "rust async runtime", Some(3))
        .await
        .unwrap();

    match &outcome {
        SearchOutcome::Matches {
            hits,
            path,
            degraded,
        } => {
            assert_eq!(*path, SearchPath::Primary);
            assert!(!degraded);
            assert_eq!(hits.len(), 3);
            assert_eq!(hits[0].document.text, "rust async runtime internals");
            assert!(hits.windows(2).all(|w| w[0].score <= w[1].score));
        }
        SearchOutcome::NoData => panic!("expected matches"),
    }
}

#[tokio::test]
async fn test_search_without_data_and_bad_top_k() {
    let h = Harness::new();
    assert!(h
        .manager
        .search("nobody", "anything", Some(5))
        .await
        .unwrap()
        .is_no_data());

    let err = h.manager.search("nobody", "anything", Some(0)).await;
    assert!(matches!(err, Err(AppError::InvalidInput(_))));

    let err = h.manager.search("../etc", "anything", Some(1)).await;
    assert!(matches!(err, Err(AppError::InvalidInput(_))));
}

#[tokio::test]
async fn test_search_rebuilds_from_canonical_when_nothing_cached() {
    let h = Harness::new();
    h.seed_records("u1", "f1", &["canonical only text", "never indexed before"]);

    let trace = h
        .manager
        .explain("u1", "canonical text", Some(2))
        .await
        .unwrap();
    assert_eq!(trace.outcome.hits().len(), 2);

    let json = serde_json::to_value(&trace).unwrap();
    assert_eq!(json["steps"][0]["step"], "artifact");
    assert_eq!(json["steps"][0]["source"], "rebuilt_from_canonical");
    assert_eq!(json["steps"][1]["step"], "primary");
}

#[tokio::test]
async fn test_corrupt_mapping_degrades_instead_of_failing() {
    let h = Harness::new();
    h.ingest("u1", "f1", &["first chunk", "second chunk", "third chunk"]).await;

    // Keep one document and no slot mapping at all
    let path = h.layout().owner_dir("u1").join("docstore.json");
    let mut json: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
    json["slots"] = serde_json::json!([]);
    json["documents"].as_array_mut().unwrap().truncate(1);
    fs::write(&path, serde_json::to_vec(&json).unwrap()).unwrap();

    let restarted = h.restart();
    let outcome = restarted.search("u1", "chunk", Some(5)).await.unwrap();

    match outcome {
        SearchOutcome::Matches {
            hits,
            path,
            degraded,
        } => {
            assert_eq!(path, SearchPath::Fallback);
            assert!(degraded);
            // Three vectors exist; the two padding sentinels are skipped
            assert_eq!(hits.len(), 3);

            let positional = hits
                .iter()
                .filter(|h| h.resolution == SlotResolution::Positional)
                .count();
            let unresolved: Vec<_> = hits
                .iter()
                .filter(|h| h.resolution == SlotResolution::Unresolved)
                .collect();
            assert_eq!(positional, 1);
            assert_eq!(unresolved.len(), 2);
            assert!(unresolved.iter().all(|h| h.document.is_placeholder()));
            assert!(unresolved.iter().all(|h| h.score.is_finite()));
        }
        SearchOutcome::NoData => panic!("expected matches"),
    }
}

#[tokio::test]
async fn test_unreadable_artifact_is_rebuilt_from_canonical() {
    let h = Harness::new();
    h.ingest("u1", "f1", &["text that survives", "more surviving text"]).await;

    fs::write(h.layout().owner_dir("u1").join("index.bin"), b"garbage").unwrap();

    let restarted = h.restart();
    let outcome = restarted.search("u1", "surviving", Some(2)).await.unwrap();
    assert_eq!(outcome.hits().len(), 2);
    assert!(outcome
        .hits()
        .iter()
        .all(|hit| hit.resolution == SlotResolution::Mapped));
}

#[tokio::test]
async fn test_corrupt_index_header_is_rebuilt_from_canonical() {
    let h = Harness::new();
    h.ingest("u1", "f1", &["header text one", "header text two"]).await;

    let path = h.layout().owner_dir("u1").join("index.bin");
    let mut bytes = fs::read(&path).unwrap();
    bytes[12..20].copy_from_slice(&(u64::MAX / 4).to_le_bytes());
    fs::write(&path, bytes).unwrap();

    let restarted = h.restart();
    let trace = restarted.explain("u1", "header text", Some(2)).await.unwrap();
    assert_eq!(trace.outcome.hits().len(), 2);

    let json = serde_json::to_value(&trace).unwrap();
    assert_eq!(json["steps"][0]["source"], "rebuilt_from_canonical");
}

#[tokio::test]
async fn test_slots_point_at_canonical_records() {
    let h = Harness::new();
    let request = |file_id: &str, text: &str| crate::IngestRequest {
        owner_id: "u1".to_string(),
        file_id: file_id.to_string(),
        original_name: format!("{}.txt", file_id),
        text: text.to_string(),
    };

    // Cold start, then an incremental append
    h.manager
        .ingest(&request("f1", "first document body"))
        .await
        .unwrap();
    h.manager
        .ingest(&request("f2", "second document body"))
        .await
        .unwrap();

    let record_ids: Vec<String> = h
        .chunks
        .find_by_owner("u1")
        .unwrap()
        .into_iter()
        .map(|r| r.id)
        .collect();
    let handle = h.manager.registry().cached("u1").unwrap();
    let slot_ids: Vec<&str> = handle.slots().ids().collect();

    assert_eq!(slot_ids.len(), 2);
    assert_eq!(slot_ids, record_ids);

    // Indexed documents keep their citation metadata
    let docs = handle.documents().unwrap();
    assert_eq!(docs[1].metadata.original_name, "f2.txt");
}

#[tokio::test]
async fn test_cold_start_add_builds_from_texts() {
    let h = Harness::new();
    let outcome = h
        .manager
        .add_texts("fresh", &texts(&["a", "b"]), &metadatas("fresh", "f1", 2))
        .await
        .unwrap();

    assert_eq!(outcome.stage, Some(AddStage::SeedBuild));
    assert_eq!(outcome.count, 2);
    assert!(outcome.persisted);
    assert!(h.layout().exists("fresh"));
}

#[tokio::test]
async fn test_stats_reports_without_loading() {
    let h = Harness::new();
    h.ingest("u1", "f1", &["one", "two", "three", "four"]).await;

    let stats = h.manager.stats("u1").unwrap();
    assert!(stats.is_loaded);
    assert!(stats.on_disk_exists);
    assert_eq!(stats.vector_count, Some(4));
    assert_eq!(stats.docstore_count, Some(4));
    assert_eq!(stats.sample.len(), 3);

    let restarted = h.restart();
    let stats = restarted.stats("u1").unwrap();
    assert!(!stats.is_loaded);
    assert!(stats.on_disk_exists);
    assert_eq!(stats.vector_count, None);
    assert!(restarted.list_loaded_owners().is_empty());
}

#[tokio::test]
async fn test_ingest_indexes_and_records_chunks() {
    let h = Harness::new();
    let manager = h.restart().with_ingest_settings(ragstore_core::IngestSettings {
        chunk_size: 60,
        chunk_overlap: 10,
    });

    let request = crate::IngestRequest {
        owner_id: "u1".to_string(),
        file_id: "doc-1".to_string(),
        original_name: "handbook.txt".to_string(),
        text: "Vacation requests go through the portal. ".repeat(10),
    };
    let outcome = manager.ingest(&request).await.unwrap();

    assert!(outcome.chunks > 1);
    assert!(outcome.records_saved);
    assert!(outcome.warning.is_none());
    assert_eq!(outcome.add.unwrap().count, outcome.chunks);

    let records = h.chunks.find_by_file("u1", "doc-1").unwrap();
    assert_eq!(records.len(), outcome.chunks);
    assert_eq!(records[1].chunk_index, 1);

    let hits = manager.search("u1", "vacation portal", Some(1)).await.unwrap();
    assert_eq!(hits.hits()[0].document.metadata.original_name, "handbook.txt");
}

#[tokio::test]
async fn test_ingest_of_blank_text_is_noop() {
    let h = Harness::new();
    let request = crate::IngestRequest {
        owner_id: "u1".to_string(),
        file_id: "blank".to_string(),
        original_name: String::new(),
        text: "  \n ".to_string(),
    };

    let outcome = h.manager.ingest(&request).await.unwrap();
    assert_eq!(outcome.chunks, 0);
    assert!(outcome.add.is_none());
    assert!(h.manager.list_loaded_owners().is_empty());
}
