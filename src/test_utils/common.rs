use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::compat::CompatProcessor;
use crate::manager::ClusterManager;
use crate::manager::ManagerContext;
use crate::negotiation::Negotiator;
use crate::node::Node;
use crate::node::NodeInfo;
use crate::node::SessionStyle;
use crate::session::channel_pair;
use crate::session::ChannelSource;
use crate::session::Frame;
use crate::snapshot::EntityKind;
use crate::storage::MemoryStore;
use crate::ChangeRegistry;
use crate::DataPlaneVersion;

pub(crate) const CLUSTER: &str = "9b0f3a34-6d39-4f5c-9a0b-2b8f5d0b1c11";
pub(crate) const CP_VERSION: &str = "3.0.0";

/// Frames the control plane wrote to a test node, and a handle to feed it
pub(crate) struct TestPeer {
    pub written: UnboundedReceiver<Frame>,
    pub inbound: UnboundedSender<Frame>,
    pub source: Option<ChannelSource>,
}

pub(crate) fn node_id(n: u8) -> String {
    format!("00000000-0000-4000-8000-0000000000{n:02x}")
}

pub(crate) fn test_node(
    n: u8,
    version: &str,
    style: SessionStyle,
    cancel: &CancellationToken,
) -> (Arc<Node>, TestPeer) {
    let (sink, source, written, inbound) = channel_pair();
    let node = Node::new(
        NodeInfo {
            id: node_id(n),
            hostname: format!("dp-{n}"),
            version: version.to_string(),
            cluster_id: CLUSTER.to_string(),
            remote_addr: SocketAddr::from(([10, 0, 0, n], 40000 + n as u16)),
        },
        style,
        Box::new(sink),
        cancel.child_token(),
    );
    (
        Arc::new(node),
        TestPeer {
            written,
            inbound,
            source: Some(source),
        },
    )
}

pub(crate) fn manager_context(store: Arc<MemoryStore>) -> ManagerContext {
    let registry = Arc::new(ChangeRegistry::with_default_catalog().unwrap());
    let cp_version = DataPlaneVersion::parse(CP_VERSION).unwrap();
    ManagerContext {
        entity_store: store.clone(),
        node_store: store.clone(),
        status_store: store,
        processor: Arc::new(CompatProcessor::new(registry.clone(), cp_version)),
        registry,
        negotiator: Arc::new(Negotiator::with_defaults()),
        store_request_timeout: Duration::from_secs(1),
        required_plugins: vec![],
    }
}

pub(crate) fn test_manager(store: Arc<MemoryStore>) -> Arc<ClusterManager> {
    Arc::new(ClusterManager::new(
        CLUSTER.to_string(),
        manager_context(store),
        CancellationToken::new(),
    ))
}

/// A service, a route and a zipkin plugin using 3.0-only fields
pub(crate) fn seed_entities(store: &MemoryStore) {
    store.put_entity(CLUSTER, EntityKind::Service, json!({"id": "s1", "host": "upstream.local", "port": 80}));
    store.put_entity(
        CLUSTER,
        EntityKind::Route,
        json!({"id": "r1", "paths": ["/"], "service": {"id": "s1"}}),
    );
    store.put_entity(CLUSTER, EntityKind::Plugin, zipkin_plugin());
}

pub(crate) fn zipkin_plugin() -> Value {
    json!({
        "id": "p1",
        "name": "zipkin",
        "config": {
            "http_endpoint": "http://zipkin:9411",
            "http_span_name": "method_path",
            "connect_timeout": 2000,
            "read_timeout": 5000,
            "send_timeout": 5000
        }
    })
}

pub(crate) fn plugins(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

/// Negotiates the cluster protocol for `node_id` so the negotiator holds an
/// entry for it
pub(crate) fn negotiate_for(
    negotiator: &Negotiator,
    node_id: &str,
) {
    let request = serde_json::from_value(json!({
        "node": {"id": node_id, "type": "KONG", "version": "3.0.0", "hostname": "dp"},
        "services_requested": [{"name": "cluster_protocol", "versions": ["wrpc"]}]
    }))
    .unwrap();
    negotiator.negotiate(&request).unwrap();
}
