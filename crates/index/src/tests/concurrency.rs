//! Per-owner serialization under concurrent callers.

use super::support::{metadatas, texts, CountingProvider, Harness};
use crate::registry::StoreSource;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_get_or_create_builds_once() {
    let h = Harness::with_provider(CountingProvider::with_delay(Duration::from_millis(25)));
    h.seed_records("u1", "f1", &["first record", "second record", "third record"]);

    let registry = h.manager.registry().clone();
    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let registry = registry.clone();
            tokio::spawn(async move { registry.get_or_create("u1", None).await })
        })
        .collect();

    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    assert_eq!(h.provider.batches(), 1, "exactly one build expected");

    let rebuilt = results
        .iter()
        .filter(|(_, source)| *source == StoreSource::RebuiltFromCanonical)
        .count();
    assert_eq!(rebuilt, 1);

    let first = &results[0].0;
    assert!(results.iter().all(|(handle, _)| Arc::ptr_eq(handle, first)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_adds_lose_nothing() {
    let h = Arc::new(Harness::with_provider(CountingProvider::with_delay(
        Duration::from_millis(5),
    )));
    h.ingest("u1", "base", &["base text"]).await;

    let tasks: Vec<_> = (0..10)
        .map(|i| {
            let h = h.clone();
            tokio::spawn(async move {
                let text = format!("text number {}", i);
                let file_id = format!("f{}", i);
                h.manager
                    .add_texts("u1", &texts(&[text.as_str()]), &metadatas("u1", &file_id, 1))
                    .await
            })
        })
        .collect();

    for joined in join_all(tasks).await {
        joined.unwrap().unwrap();
    }

    let handle = h.manager.registry().cached("u1").unwrap();
    assert_eq!(handle.vector_count(), Some(11));
    assert_eq!(handle.documents().unwrap().len(), 11);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_searches_see_whole_artifacts_during_adds() {
    let h = Arc::new(Harness::new());
    h.ingest("u1", "base", &["stable base text", "another base text"]).await;

    let writer = {
        let h = h.clone();
        tokio::spawn(async move {
            for i in 0..20 {
                let text = format!("added text {}", i);
                let file_id = format!("w{}", i);
                h.manager
                    .add_texts("u1", &texts(&[text.as_str()]), &metadatas("u1", &file_id, 1))
                    .await
                    .unwrap();
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let h = h.clone();
            tokio::spawn(async move {
                for _ in 0..20 {
                    let outcome = h.manager.search("u1", "base text", Some(50)).await.unwrap();
                    assert!(outcome
                        .hits()
                        .iter()
                        .all(|hit| !hit.document.is_placeholder()));
                }
            })
        })
        .collect();

    writer.await.unwrap();
    for reader in join_all(readers).await {
        reader.unwrap();
    }
}
