use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use serde_json::json;
use serde_json::Map;
use tokio_util::sync::CancellationToken;

use super::*;
use crate::compat::ChangeReport;
use crate::session::channel_pair;
use crate::session::MockFrameSink;
use crate::snapshot::Envelope;
use crate::SessionError;

const HASH: &str = "0123456789abcdef0123456789abcdef";

fn info(port: u16) -> NodeInfo {
    NodeInfo {
        id: "6e1f7c0a-2b7d-4a5e-8f0e-1d2c3b4a5f60".into(),
        hostname: format!("dp-{port}"),
        version: "3.0.0".into(),
        cluster_id: "9b0f3a34-6d39-4f5c-9a0b-2b8f5d0b1c11".into(),
        remote_addr: SocketAddr::from(([10, 0, 0, 1], port)),
    }
}

fn content() -> VersionedContent {
    let mut table = Map::new();
    table.insert("routes".into(), json!([{"id": "r1"}]));
    let bytes = Envelope::reconfigure(table, HASH.into(), BTreeMap::new())
        .encode()
        .unwrap();
    VersionedContent::new(Bytes::from(bytes), HASH.into(), ChangeReport::new())
}

#[test]
fn ping_requires_a_well_formed_hash() {
    let (sink, _, _, _) = channel_pair();
    let node = Node::new(info(1), SessionStyle::Legacy, Box::new(sink), CancellationToken::new());

    assert!(matches!(node.ping("short"), Err(NodeError::BadHash(_))));
    assert_eq!(node.hash(), None);

    node.ping(HASH).unwrap();
    assert_eq!(node.hash().as_deref(), Some(HASH));
    assert_eq!(node.record().config_hash, HASH);
}

#[test]
fn negotiated_versions_are_set_once() {
    let (sink, _, _, _) = channel_pair();
    let node = Node::new(info(1), SessionStyle::Rpc, Box::new(sink), CancellationToken::new());

    let first = BTreeMap::from([("config".to_string(), "v1".to_string())]);
    assert!(node.set_negotiated(first.clone()));
    assert!(!node.set_negotiated(BTreeMap::new()));
    assert_eq!(node.negotiated(), Some(&first));
}

#[tokio::test]
async fn legacy_push_writes_the_gzip_envelope() {
    let (sink, _, mut written, _) = channel_pair();
    let node = Node::new(info(1), SessionStyle::Legacy, Box::new(sink), CancellationToken::new());
    let content = content();

    node.push(&content).await.unwrap();

    assert_eq!(written.recv().await, Some(Frame::Binary(content.payload.clone())));
}

#[tokio::test]
async fn rpc_push_sends_a_sync_config_notification() {
    let (sink, _, mut written, _) = channel_pair();
    let node = Node::new(info(1), SessionStyle::Rpc, Box::new(sink), CancellationToken::new());

    node.push(&content()).await.unwrap();

    let Some(Frame::Text(text)) = written.recv().await else {
        panic!("expected a text frame");
    };
    let message: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(message["jsonrpc"], "2.0");
    assert_eq!(message["method"], "sync_config");
    assert!(message.get("id").is_none());
    assert_eq!(message["params"]["config_hash"], HASH);
    assert_eq!(message["params"]["config_table"]["routes"][0]["id"], "r1");
}

#[tokio::test]
async fn failed_write_names_the_node() {
    let mut sink = MockFrameSink::new();
    sink.expect_send().returning(|_| Err(SessionError::Closed));
    let node = Node::new(info(1), SessionStyle::Legacy, Box::new(sink), CancellationToken::new());

    let err = node.push(&content()).await.unwrap_err();
    assert!(matches!(err, NodeError::WriteFailed { ref node_id, .. } if node_id == node.id()));
}

#[test]
fn node_list_rejects_duplicate_addresses() {
    let list = NodeList::new();
    let make = |port| {
        let (sink, _, _, _) = channel_pair();
        Arc::new(Node::new(info(port), SessionStyle::Legacy, Box::new(sink), CancellationToken::new()))
    };

    list.add(make(1)).unwrap();
    list.add(make(2)).unwrap();
    assert!(matches!(list.add(make(1)), Err(NodeError::DuplicateNode(_))));
    assert_eq!(list.len(), 2);

    let addr = SocketAddr::from(([10, 0, 0, 1], 2));
    assert_eq!(list.find(&addr).unwrap().info.hostname, "dp-2");
    assert_eq!(list.find_by_id("6e1f7c0a-2b7d-4a5e-8f0e-1d2c3b4a5f60").len(), 2);

    list.remove(&addr).unwrap();
    assert!(matches!(list.remove(&addr), Err(NodeError::NotFound(_))));
    assert_eq!(list.all().len(), 1);
}
