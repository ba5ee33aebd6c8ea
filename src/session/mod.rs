//! Data-plane sessions.
//!
//! Both endpoints start from the same validated [`Handshake`]; the node is
//! registered with its cluster manager and the matching read loop runs
//! until the peer leaves or the node is evicted.

mod frame;
mod handshake;
mod legacy;
mod rpc;


use std::net::SocketAddr;
use std::sync::Arc;

pub use frame::*;
pub use handshake::*;
pub use legacy::*;
pub use rpc::*;
use tracing::warn;

use crate::manager::ClusterManager;
use crate::node::Node;
use crate::node::NodeInfo;
use crate::node::SessionStyle;

/// Registers the node and runs its read loop to completion
pub async fn serve_session<K, S>(
    manager: Arc<ClusterManager>,
    handshake: Handshake,
    remote_addr: SocketAddr,
    style: SessionStyle,
    sink: K,
    source: S,
) where
    K: FrameSink,
    S: FrameSource,
{
    let node = Arc::new(Node::new(
        NodeInfo {
            id: handshake.node_id,
            hostname: handshake.hostname,
            version: handshake.raw_version,
            cluster_id: manager.cluster_id().to_string(),
            remote_addr,
        },
        style,
        Box::new(sink),
        manager.cancel_token().child_token(),
    ));

    if let Err(e) = manager.connect(node.clone()).await {
        warn!(node_id = node.id(), "{}", e);
        let _ = node.send(Frame::Close).await;
        return;
    }

    match style {
        SessionStyle::Legacy => run_legacy_session(manager, node, source).await,
        SessionStyle::Rpc => run_rpc_session(manager, node, source).await,
    }
}
