use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use super::*;
use crate::storage::MemoryStore;
use crate::storage::MockEntityStore;
use crate::storage::Page;
use crate::Error;
use crate::SnapshotError;
use crate::SyncError;

const CLUSTER: &str = "9b0f3a34-6d39-4f5c-9a0b-2b8f5d0b1c11";

fn memory_store_with(
    kind: EntityKind,
    count: usize,
) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    for i in 0..count {
        store.put_entity(CLUSTER, kind, json!({"id": format!("{i:04}"), "name": format!("e{i}")}));
    }
    store
}

#[tokio::test]
async fn pages_are_concatenated_in_store_order() {
    let store = memory_store_with(EntityKind::Route, 25);
    let loader = SnapshotLoader::new(store, Duration::from_secs(1)).with_page_size(10);

    let loaded = loader.load(CLUSTER).await.unwrap();

    let routes = &loaded[&EntityKind::Route];
    assert_eq!(routes.len(), 25);
    assert_eq!(routes[0]["id"], json!("0000"));
    assert_eq!(routes[24]["id"], json!("0024"));
    assert_eq!(loaded.len(), EntityKind::ALL.len());
    assert!(loaded[&EntityKind::Service].is_empty());
}

#[tokio::test]
async fn paging_starts_at_one() {
    let mut store = MockEntityStore::new();
    store
        .expect_list_page()
        .withf(|_, _, page, page_size| *page == 1 && *page_size == 1000)
        .returning(|_, _, _, _| Ok(Page::default()));

    let loader = SnapshotLoader::new(Arc::new(store), Duration::from_secs(1));
    assert!(loader.load(CLUSTER).await.is_ok());
}

#[tokio::test]
async fn failing_page_aborts_the_load() {
    let mut store = MockEntityStore::new();
    store.expect_list_page().returning(|_, kind, page, _| {
        if kind == EntityKind::Plugin && page == 2 {
            return Err(crate::StorageError::Unavailable("connection reset".into()).into());
        }
        let next_page_num = if kind == EntityKind::Plugin { page + 1 } else { 0 };
        Ok(Page {
            items: vec![json!({"id": format!("{kind}-{page}")})],
            next_page_num,
        })
    });

    let loader = SnapshotLoader::new(Arc::new(store), Duration::from_secs(1));
    let err = loader.load(CLUSTER).await.unwrap_err();

    assert!(matches!(
        err,
        Error::Sync(SyncError::Snapshot(SnapshotError::FetchFailed { kind: "plugins", .. }))
    ));
}

#[tokio::test]
async fn entity_without_id_is_a_contract_violation() {
    let store = Arc::new(MemoryStore::new());
    store.put_entity(CLUSTER, EntityKind::Consumer, json!({"username": "alice"}));

    let loader = SnapshotLoader::new(store, Duration::from_secs(1));
    let err = loader.load(CLUSTER).await.unwrap_err();

    assert!(matches!(
        err,
        Error::Sync(SyncError::Snapshot(SnapshotError::ContractViolation { section: "consumers", .. }))
    ));
}

#[tokio::test]
async fn non_advancing_cursor_is_rejected() {
    let mut store = MockEntityStore::new();
    store.expect_list_page().returning(|_, _, _, _| {
        Ok(Page {
            items: vec![],
            next_page_num: 1,
        })
    });

    let loader = SnapshotLoader::new(Arc::new(store), Duration::from_secs(1));
    assert!(loader.load(CLUSTER).await.is_err());
}

#[tokio::test(start_paused = true)]
async fn slow_page_times_out() {
    struct SlowStore;

    #[tonic::async_trait]
    impl crate::storage::EntityStore for SlowStore {
        async fn list_page(
            &self,
            _cluster_id: &str,
            _kind: EntityKind,
            _page: u64,
            _page_size: usize,
        ) -> crate::Result<Page> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Page::default())
        }
    }

    let loader = SnapshotLoader::new(Arc::new(SlowStore), Duration::from_secs(30));
    let err = loader.load(CLUSTER).await.unwrap_err();

    assert!(matches!(
        err,
        Error::Sync(SyncError::Snapshot(SnapshotError::FetchTimeout { kind: "services", .. }))
    ));
}

#[tokio::test]
async fn assembled_snapshot_is_canonical_and_hashed() {
    let store = Arc::new(MemoryStore::new());
    store.put_entity(CLUSTER, EntityKind::Service, json!({"id": "s1", "host": "example.com", "updated_at": 9}));
    store.put_entity(
        CLUSTER,
        EntityKind::Plugin,
        json!({"id": "p1", "name": "cors", "service": {"id": "s1"}, "updated_at": 9}),
    );
    store.put_entity(CLUSTER, EntityKind::Plugin, json!({"id": "p2", "name": "acl"}));

    let loader = SnapshotLoader::new(store, Duration::from_secs(1));
    let snapshot = Snapshot::assemble(&loader, CLUSTER).await.unwrap();

    assert_eq!(snapshot.table["services"][0]["updated_at"], json!(9));
    assert_eq!(snapshot.table["plugins"][0]["service"], json!("s1"));
    assert!(snapshot.table["plugins"][0].get("updated_at").is_none());
    assert!(is_valid_hash(&snapshot.hash));
    assert_eq!(snapshot.hashes[CONFIG_HASH_KEY], snapshot.hash);
    assert_eq!(snapshot.plugin_names(), vec!["acl", "cors"]);

    let expected_hash = snapshot.hash.clone();
    let (bytes, hash) = snapshot.into_payload().unwrap();
    assert_eq!(hash, expected_hash);
    let envelope = Envelope::decode(&bytes).unwrap();
    assert_eq!(envelope.kind, "reconfigure");
    assert_eq!(envelope.config_hash, expected_hash);
}
