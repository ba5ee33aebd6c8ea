use std::net::SocketAddr;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use super::Node;
use crate::NodeError;

/// Connected nodes of one cluster, keyed by remote address
#[derive(Debug, Default)]
pub struct NodeList {
    nodes: DashMap<SocketAddr, Arc<Node>>,
}

impl NodeList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails with `duplicate_node` when the address is already connected;
    /// the newer node is the one dropped.
    pub fn add(
        &self,
        node: Arc<Node>,
    ) -> Result<(), NodeError> {
        match self.nodes.entry(node.remote_addr()) {
            Entry::Occupied(_) => Err(NodeError::DuplicateNode(node.remote_addr().to_string())),
            Entry::Vacant(slot) => {
                debug!(node_id = %node.id(), addr = %node.remote_addr(), "node added");
                slot.insert(node);
                Ok(())
            }
        }
    }

    pub fn remove(
        &self,
        addr: &SocketAddr,
    ) -> Result<Arc<Node>, NodeError> {
        self.nodes
            .remove(addr)
            .map(|(_, node)| node)
            .ok_or_else(|| NodeError::NotFound(addr.to_string()))
    }

    pub fn find(
        &self,
        addr: &SocketAddr,
    ) -> Option<Arc<Node>> {
        self.nodes.get(addr).map(|e| e.value().clone())
    }

    pub fn find_by_id(
        &self,
        node_id: &str,
    ) -> Vec<Arc<Node>> {
        self.nodes
            .iter()
            .filter(|e| e.value().id() == node_id)
            .map(|e| e.value().clone())
            .collect()
    }

    /// Snapshot of the connected nodes
    pub fn all(&self) -> Vec<Arc<Node>> {
        self.nodes.iter().map(|e| e.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
