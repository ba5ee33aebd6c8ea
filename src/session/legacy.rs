use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;
use tracing::warn;

use super::Frame;
use super::FrameSource;
use crate::manager::ClusterManager;
use crate::node::Node;
use crate::SessionError;

/// Plugin entry in `basic_info`: a bare name or `{name, version}`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum DeclaredPlugin {
    Name(String),
    Info { name: String },
}

impl DeclaredPlugin {
    pub fn name(&self) -> &str {
        match self {
            DeclaredPlugin::Name(name) => name,
            DeclaredPlugin::Info { name } => name,
        }
    }
}

#[derive(Debug, Deserialize)]
struct BasicInfo {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    plugins: Vec<DeclaredPlugin>,
}

pub(crate) fn plugin_names(plugins: &[DeclaredPlugin]) -> Vec<String> {
    plugins.iter().map(|p| p.name().to_string()).collect()
}

fn parse_basic_info(data: &[u8]) -> Result<Vec<String>, SessionError> {
    let info: BasicInfo = serde_json::from_slice(data).map_err(|e| SessionError::MalformedFrame(e.to_string()))?;
    if info.kind != "basic_info" {
        return Err(SessionError::MalformedFrame(format!("unexpected message type {:?}", info.kind)));
    }
    Ok(plugin_names(&info.plugins))
}

/// Read loop of a `/v1/outlet` session. Returns when the peer goes away or
/// the node is evicted; the node is disconnected either way.
pub async fn run_legacy_session<S: FrameSource>(
    manager: Arc<ClusterManager>,
    node: Arc<Node>,
    mut source: S,
) {
    let cancel = node.cancel_token().clone();
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break,
            frame = source.next_frame() => frame,
        };

        match frame {
            None | Some(Ok(Frame::Close)) => break,
            Some(Err(e)) => {
                warn!(node_id = node.id(), "legacy session read failed: {}", e);
                break;
            }
            Some(Ok(Frame::Ping(data))) => {
                let hash = String::from_utf8_lossy(&data).into_owned();
                if let Err(e) = manager.record_ping(&node, &hash).await {
                    warn!(node_id = node.id(), "{}", e);
                }
                if let Err(e) = node.send(Frame::Pong(data)).await {
                    warn!(node_id = node.id(), "{}", e);
                    break;
                }
            }
            Some(Ok(Frame::Pong(_))) => {}
            Some(Ok(Frame::Text(text))) => handle_message(&manager, &node, text.as_bytes()).await,
            Some(Ok(Frame::Binary(data))) => handle_message(&manager, &node, &data).await,
        }
    }
    manager.disconnect(&node);
}

async fn handle_message(
    manager: &ClusterManager,
    node: &Arc<Node>,
    data: &[u8],
) {
    if node.is_admitted() {
        debug!(node_id = node.id(), "ignoring message from admitted node");
        return;
    }
    let plugins = match parse_basic_info(data) {
        Ok(plugins) => plugins,
        Err(e) => {
            warn!(node_id = node.id(), "{}", e);
            return;
        }
    };
    match manager.admit(node, plugins).await {
        Ok(()) => {
            manager.sync_node(node).await;
        }
        Err(e) => warn!(node_id = node.id(), "unable to send updated configuration to data plane: {}", e),
    }
}
