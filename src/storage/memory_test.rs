use serde_json::json;

use super::*;
use crate::status::Condition;
use crate::Severity;

const CLUSTER: &str = "9b0f3a34-6d39-4f5c-9a0b-2b8f5d0b1c11";

#[test]
fn paginate_is_one_based() {
    let all: Vec<u32> = (1..=5).collect();

    assert_eq!(paginate(&all, 1, 2), (vec![1, 2], 2));
    assert_eq!(paginate(&all, 2, 2), (vec![3, 4], 3));
    assert_eq!(paginate(&all, 3, 2), (vec![5], 0));
    assert_eq!(paginate(&all, 4, 2), (vec![], 0));
    assert_eq!(paginate(&all, 0, 2), (vec![1, 2], 2));
    assert_eq!(paginate(&all, 1, 5), (all.clone(), 0));
}

#[tokio::test]
async fn entities_page_in_insertion_order() {
    let store = MemoryStore::new();
    for id in ["c", "a", "b"] {
        store.put_entity(CLUSTER, EntityKind::Service, json!({"id": id, "name": id}));
    }
    store.put_entity(CLUSTER, EntityKind::Service, json!({"id": "a", "name": "renamed"}));

    let first = store.list_page(CLUSTER, EntityKind::Service, 1, 2).await.unwrap();
    assert_eq!(first.next_page_num, 2);
    assert_eq!(first.items[0]["id"], json!("c"));
    assert_eq!(first.items[1]["name"], json!("renamed"));

    let second = store.list_page(CLUSTER, EntityKind::Service, 2, 2).await.unwrap();
    assert_eq!(second.next_page_num, 0);
    assert_eq!(second.items.len(), 1);

    store.delete_entity(CLUSTER, EntityKind::Service, "c");
    let page = store.list_page(CLUSTER, EntityKind::Service, 1, 10).await.unwrap();
    assert_eq!(page.items.len(), 2);

    let other_cluster = store.list_page("other", EntityKind::Service, 1, 10).await.unwrap();
    assert!(other_cluster.items.is_empty());
}

#[tokio::test]
async fn stale_nodes_are_deleted() {
    let store = MemoryStore::new();
    for (id, last_ping) in [("n1", 10), ("n2", 100), ("n3", 99)] {
        store
            .upsert_node(NodeRecord {
                id: id.into(),
                hostname: "dp".into(),
                version: "3.0.0".into(),
                cluster_id: CLUSTER.into(),
                last_ping,
                config_hash: String::new(),
                plugins: vec![],
            })
            .await
            .unwrap();
    }

    let mut deleted = store.delete_nodes_older_than(100).await.unwrap();
    deleted.sort();
    assert_eq!(deleted, vec!["n1", "n3"]);
    let remaining: Vec<_> = store.list_nodes().await.unwrap().into_iter().map(|r| r.id).collect();
    assert_eq!(remaining, vec!["n2"]);
}

#[tokio::test]
async fn event_marker_starts_absent_and_increases() {
    let store = MemoryStore::new();
    assert_eq!(store.last_update().await.unwrap(), None);

    let first = store.touch().await.unwrap();
    let second = store.touch().await.unwrap();
    assert!(second > first);
    assert_eq!(store.last_update().await.unwrap(), Some(second));
}

#[tokio::test]
async fn status_rows_round_trip() {
    let store = MemoryStore::new();
    let mut status = NodeStatus::new("n1");
    status.conditions.push(Condition {
        code: "DP001".into(),
        message: "missing".into(),
        severity: Severity::Error,
        resources: vec![],
    });

    store.upsert_status(status.clone()).await.unwrap();
    assert_eq!(store.get_status(&StatusRef::node("n1")).await.unwrap(), Some(status));

    store.delete_status(&StatusRef::node("n1")).await.unwrap();
    assert_eq!(store.get_status(&StatusRef::node("n1")).await.unwrap(), None);
}
