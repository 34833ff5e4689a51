//! Contract Test: Version Store Semantics
//!
//! Constraints verified, for every store implementation:
//! - compare_and_set reports a change once, then is a no-op
//! - A cold key with a non-empty value always counts as changed
//! - Equality is exact, with no normalization
//! - compare_and_set is atomic under concurrent callers
//! - The redb store survives a reopen

use ghrelnoty_core::store::{MemoryVersionStore, RedbVersionStore};
use ghrelnoty_core::traits::{RELEASES_TABLE, VersionStore};
use std::sync::Arc;

async fn redb_store(dir: &tempfile::TempDir) -> RedbVersionStore {
    RedbVersionStore::open(dir.path().join("releases.redb"))
        .await
        .expect("redb store opens")
}

async fn assert_idempotent(store: &dyn VersionStore) {
    assert!(store.compare_and_set("acme/widget", "v1").await.unwrap());
    assert!(!store.compare_and_set("acme/widget", "v1").await.unwrap());
    assert_eq!(
        store.get("acme/widget").await.unwrap().as_deref(),
        Some("v1")
    );
}

async fn assert_exact_equality(store: &dyn VersionStore) {
    assert!(store.compare_and_set("acme/gadget", "v1.0").await.unwrap());
    assert!(store.compare_and_set("acme/gadget", "v1.0 ").await.unwrap());
    assert!(store.compare_and_set("acme/gadget", "V1.0 ").await.unwrap());
    assert_eq!(
        store.get("acme/gadget").await.unwrap().as_deref(),
        Some("V1.0 ")
    );
}

async fn assert_older_version_is_just_different(store: &dyn VersionStore) {
    assert!(store.compare_and_set("acme/tool", "v2.0.0").await.unwrap());
    // No ordering: going "back" is a change like any other
    assert!(store.compare_and_set("acme/tool", "v1.9.0").await.unwrap());
}

#[test]
fn releases_table_name_is_stable() {
    assert_eq!(RELEASES_TABLE, "releases");
}

#[tokio::test]
async fn memory_store_honours_contract() {
    let store = MemoryVersionStore::new();
    assert_idempotent(&store).await;
    assert_exact_equality(&store).await;
    assert_older_version_is_just_different(&store).await;
}

#[tokio::test]
async fn redb_store_honours_contract() {
    let dir = tempfile::tempdir().unwrap();
    let store = redb_store(&dir).await;
    assert_idempotent(&store).await;
    assert_exact_equality(&store).await;
    assert_older_version_is_just_different(&store).await;
    store.close().await.unwrap();
}

#[tokio::test]
async fn cold_start_counts_as_changed() {
    let dir = tempfile::tempdir().unwrap();
    let redb = redb_store(&dir).await;
    let memory = MemoryVersionStore::new();

    for store in [&redb as &dyn VersionStore, &memory] {
        assert_eq!(store.get("acme/new").await.unwrap(), None);
        assert!(store.compare_and_set("acme/new", "v0.1.0").await.unwrap());
    }
}

#[tokio::test]
async fn redb_store_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();

    let store = redb_store(&dir).await;
    assert!(store.compare_and_set("acme/widget", "v3").await.unwrap());
    store.close().await.unwrap();
    drop(store);

    let reopened = redb_store(&dir).await;
    assert!(!reopened.compare_and_set("acme/widget", "v3").await.unwrap());
    assert_eq!(
        reopened.get("acme/widget").await.unwrap().as_deref(),
        Some("v3")
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_compare_and_set_changes_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    let redb: Arc<dyn VersionStore> = Arc::new(redb_store(&dir).await);
    let memory: Arc<dyn VersionStore> = Arc::new(MemoryVersionStore::new());

    for store in [redb, memory] {
        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.compare_and_set("acme/race", "v9").await.unwrap()
            }));
        }

        let mut changed = 0;
        for handle in handles {
            if handle.await.unwrap() {
                changed += 1;
            }
        }
        assert_eq!(changed, 1, "exactly one caller observes the change");
    }
}
