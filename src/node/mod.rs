//! Connected data-plane nodes.
//!
//! A [`Node`] owns the write half of its session; every write goes through
//! the node's writer lock, so a broadcast push and an RPC reply never
//! interleave on the socket.

mod reaper;
mod registry;

#[cfg(test)]
mod node_test;
#[cfg(test)]
mod reaper_test;

use std::collections::BTreeMap;
use std::net::SocketAddr;

use bytes::Bytes;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
pub use reaper::*;
pub use registry::*;
use serde_json::json;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::compat::VersionedContent;
use crate::session::Frame;
use crate::session::FrameSink;
use crate::snapshot::is_valid_hash;
use crate::storage::NodeRecord;
use crate::utils::time::now_secs;
use crate::NodeError;

/// Wire protocol a node connected with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStyle {
    /// `/v1/outlet`: binary gzip pushes, hash in ping frames
    Legacy,
    /// `/v1/wrpc`: JSON-RPC 2.0 text frames
    Rpc,
}

/// Identity a data plane presents on connect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    pub id: String,
    pub hostname: String,
    pub version: String,
    pub cluster_id: String,
    pub remote_addr: SocketAddr,
}

#[derive(Debug, Default)]
struct NodeState {
    last_ping: u64,
    hash: Option<String>,
    plugins: Vec<String>,
    admitted: bool,
}

pub struct Node {
    pub info: NodeInfo,
    pub style: SessionStyle,
    negotiated: OnceCell<BTreeMap<String, String>>,
    state: Mutex<NodeState>,
    writer: AsyncMutex<Box<dyn FrameSink>>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for Node {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("info", &self.info)
            .field("style", &self.style)
            .field("state", &*self.state.lock())
            .finish()
    }
}

impl Node {
    /// `cancel` should be a child of the owning manager's token
    pub fn new(
        info: NodeInfo,
        style: SessionStyle,
        sink: Box<dyn FrameSink>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            info,
            style,
            negotiated: OnceCell::new(),
            state: Mutex::new(NodeState {
                last_ping: now_secs(),
                ..Default::default()
            }),
            writer: AsyncMutex::new(sink),
            cancel,
        }
    }

    pub fn id(&self) -> &str {
        &self.info.id
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.info.remote_addr
    }

    /// Records a ping carrying the node's current config hash
    pub fn ping(
        &self,
        hash: &str,
    ) -> Result<(), NodeError> {
        if !is_valid_hash(hash) {
            return Err(NodeError::BadHash(hash.to_string()));
        }
        let mut state = self.state.lock();
        state.hash = Some(hash.to_string());
        state.last_ping = now_secs();
        Ok(())
    }

    pub fn hash(&self) -> Option<String> {
        self.state.lock().hash.clone()
    }

    pub fn last_ping(&self) -> u64 {
        self.state.lock().last_ping
    }

    pub fn set_plugins(
        &self,
        plugins: Vec<String>,
    ) {
        self.state.lock().plugins = plugins;
    }

    pub fn plugins(&self) -> Vec<String> {
        self.state.lock().plugins.clone()
    }

    pub fn admit(&self) {
        self.state.lock().admitted = true;
    }

    pub fn is_admitted(&self) -> bool {
        self.state.lock().admitted
    }

    /// Stores the negotiated capability versions. Only the first call
    /// takes effect.
    pub fn set_negotiated(
        &self,
        versions: BTreeMap<String, String>,
    ) -> bool {
        self.negotiated.set(versions).is_ok()
    }

    pub fn negotiated(&self) -> Option<&BTreeMap<String, String>> {
        self.negotiated.get()
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Stops the node's read loop
    pub fn evict(&self) {
        self.cancel.cancel();
    }

    pub fn record(&self) -> NodeRecord {
        let state = self.state.lock();
        NodeRecord {
            id: self.info.id.clone(),
            hostname: self.info.hostname.clone(),
            version: self.info.version.clone(),
            cluster_id: self.info.cluster_id.clone(),
            last_ping: state.last_ping,
            config_hash: state.hash.clone().unwrap_or_default(),
            plugins: state.plugins.clone(),
        }
    }

    /// Writes one frame under the writer lock
    pub async fn send(
        &self,
        frame: Frame,
    ) -> Result<(), NodeError> {
        let mut writer = self.writer.lock().await;
        writer.send(frame).await.map_err(|e| NodeError::WriteFailed {
            node_id: self.info.id.clone(),
            reason: e.to_string(),
        })
    }

    /// Pushes `content` in the node's session style: the gzip envelope as
    /// a binary frame, or a `sync_config` notification.
    pub async fn push(
        &self,
        content: &VersionedContent,
    ) -> Result<(), NodeError> {
        let frame = match self.style {
            SessionStyle::Legacy => Frame::Binary(Bytes::clone(&content.payload)),
            SessionStyle::Rpc => {
                let params = content.rpc_params().map_err(|e| NodeError::WriteFailed {
                    node_id: self.info.id.clone(),
                    reason: e.to_string(),
                })?;
                let notification = json!({
                    "jsonrpc": "2.0",
                    "method": "sync_config",
                    "params": params,
                });
                Frame::Text(notification.to_string())
            }
        };
        debug!(node_id = %self.info.id, hash = %content.hash, "pushing config");
        self.send(frame).await
    }
}
