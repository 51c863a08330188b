//! Trait contract tests for ProjectStore.
//!
//! Every check runs against both the in-memory fake and the JSON file
//! store. Any conforming implementation must pass these.

use std::sync::Arc;

use reel_store::fakes::MemoryProjectStore;
use reel_store::{JsonFileStore, ProjectRecord, ProjectStatus, ProjectStore, StorageError};

fn record(id: &str, topic: &str) -> ProjectRecord {
    ProjectRecord::new(id, "Ancient History", topic)
}

async fn each_store<F, Fut>(check: F)
where
    F: Fn(Arc<dyn ProjectStore>) -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    check(Arc::new(MemoryProjectStore::new())).await;

    let dir = tempfile::tempdir().unwrap();
    check(Arc::new(JsonFileStore::in_dir(dir.path()))).await;
}

#[tokio::test]
async fn upsert_then_get_returns_record() {
    each_store(|store| async move {
        let rec = record("proj_a", "Rome");
        store.upsert(&rec).await.unwrap();

        let got = store.get("proj_a").await.unwrap().expect("record present");
        assert_eq!(got, rec);
    })
    .await;
}

#[tokio::test]
async fn get_unknown_is_none() {
    each_store(|store| async move {
        assert!(store.get("proj_missing").await.unwrap().is_none());
    })
    .await;
}

#[tokio::test]
async fn upsert_is_last_write_wins() {
    each_store(|store| async move {
        let mut rec = record("proj_a", "Rome");
        store.upsert(&rec).await.unwrap();

        rec.topic = "Carthage".to_string();
        rec.touch(ProjectStatus::Edited);
        store.upsert(&rec).await.unwrap();

        let all = store.list_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].topic, "Carthage");
        assert_eq!(all[0].status, ProjectStatus::Edited);
    })
    .await;
}

#[tokio::test]
async fn list_all_preserves_insertion_order() {
    each_store(|store| async move {
        for id in ["proj_1", "proj_2", "proj_3"] {
            store.upsert(&record(id, id)).await.unwrap();
        }
        // Replacing keeps the original position.
        store.upsert(&record("proj_1", "again")).await.unwrap();

        let ids: Vec<String> = store
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["proj_1", "proj_2", "proj_3"]);
    })
    .await;
}

#[tokio::test]
async fn delete_reports_whether_removed() {
    each_store(|store| async move {
        store.upsert(&record("proj_a", "Rome")).await.unwrap();

        assert!(store.delete("proj_a").await.unwrap());
        assert!(!store.delete("proj_a").await.unwrap());
        assert!(store.get("proj_a").await.unwrap().is_none());
    })
    .await;
}

#[tokio::test]
async fn empty_id_is_rejected() {
    each_store(|store| async move {
        let err = store.upsert(&record("  ", "Rome")).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidRecord { .. }));
        assert!(store.list_all().await.unwrap().is_empty());
    })
    .await;
}

#[tokio::test]
async fn concurrent_upserts_are_all_kept() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn ProjectStore> = Arc::new(JsonFileStore::in_dir(dir.path()));

    let mut handles = Vec::new();
    for i in 0..8 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            store
                .upsert(&record(&format!("proj_{i}"), "Rome"))
                .await
                .unwrap();
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    assert_eq!(store.list_all().await.unwrap().len(), 8);
}

#[tokio::test]
async fn file_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = JsonFileStore::in_dir(dir.path());
        store.upsert(&record("proj_a", "Rome")).await.unwrap();
    }

    let reopened = JsonFileStore::in_dir(dir.path());
    let got = reopened.get("proj_a").await.unwrap();
    assert_eq!(got.map(|r| r.topic), Some("Rome".to_string()));
}
