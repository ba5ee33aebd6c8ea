use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_test::traced_test;

use super::*;
use crate::manager::ClusterManager;
use crate::metrics::CONNECTED_NODES;
use crate::storage::MemoryStore;
use crate::storage::MockNodeStore;
use crate::storage::NodeRecord;
use crate::storage::NodeStore;
use crate::test_utils::*;

const DAY: Duration = Duration::from_secs(24 * 3600);

fn record(
    id: &str,
    last_ping: u64,
) -> NodeRecord {
    NodeRecord {
        id: id.into(),
        hostname: "dp".into(),
        version: "3.0.0".into(),
        cluster_id: "c1".into(),
        last_ping,
        config_hash: String::new(),
        plugins: vec![],
    }
}

#[tokio::test]
#[traced_test]
async fn stale_rows_are_deleted() {
    let store = Arc::new(MemoryStore::new());
    let now = now_secs();
    store.upsert_node(record("old", now - 2 * DAY.as_secs())).await.unwrap();
    store.upsert_node(record("fresh", now)).await.unwrap();

    let reaper = NodeReaper::new(store.clone(), vec![], DAY, Duration::from_secs(60));
    let reaped = reaper.reap_once().await.unwrap();

    assert_eq!(reaped, vec!["old".to_string()]);
    let left: Vec<String> = store.list_nodes().await.unwrap().into_iter().map(|r| r.id).collect();
    assert_eq!(left, vec!["fresh".to_string()]);
    assert!(logs_contain("reaped 1 stale data-plane nodes"));
}

#[tokio::test]
async fn only_stale_connected_nodes_are_evicted() {
    const REAPED_CLUSTER: &str = "reaper-cluster";
    let ctx = manager_context(Arc::new(MemoryStore::new()));
    let negotiator = ctx.negotiator.clone();
    let manager = Arc::new(ClusterManager::new(REAPED_CLUSTER.into(), ctx, CancellationToken::new()));
    let root = CancellationToken::new();
    let (node, _peer) = test_node(1, "3.0.0", SessionStyle::Legacy, &root);
    negotiate_for(&negotiator, node.id());
    manager.connect(node.clone()).await.unwrap();
    let gauge = CONNECTED_NODES.with_label_values(&[REAPED_CLUSTER]);
    assert_eq!(gauge.get(), 1);

    let stale_row = |ttl: Duration| {
        let mut store = MockNodeStore::new();
        let id = node.id().to_string();
        store
            .expect_delete_nodes_older_than()
            .returning(move |_| Ok(vec![id.clone()]));
        NodeReaper::new(Arc::new(store), vec![manager.clone()], ttl, Duration::from_secs(60))
    };

    // A node that pinged just now survives even though its row was stale.
    stale_row(DAY).reap_once().await.unwrap();
    assert_eq!(manager.nodes().len(), 1);
    assert!(!node.cancel_token().is_cancelled());

    // Zero TTL makes every ping stale.
    tokio::time::sleep(Duration::from_millis(1100)).await;
    stale_row(Duration::ZERO).reap_once().await.unwrap();

    assert!(manager.nodes().is_empty());
    assert!(node.cancel_token().is_cancelled());
    assert_eq!(gauge.get(), 0);
    assert!(negotiator.negotiated(node.id()).is_none());
}

#[tokio::test(start_paused = true)]
async fn run_stops_on_cancellation() {
    let mut store = MockNodeStore::new();
    store.expect_delete_nodes_older_than().returning(|_| Ok(vec![]));
    let reaper = NodeReaper::new(Arc::new(store), vec![], DAY, Duration::from_secs(1));

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(reaper.run(cancel.clone()));
    tokio::time::sleep(Duration::from_secs(5)).await;
    cancel.cancel();

    assert!(handle.await.unwrap().is_ok());
}
