//! JSON-RPC 2.0 session on `/v1/wrpc`.

use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use serde_json::json;
use serde_json::Value;
use tracing::debug;
use tracing::warn;

use super::legacy::plugin_names;
use super::DeclaredPlugin;
use super::Frame;
use super::FrameSource;
use crate::manager::ClusterManager;
use crate::node::Node;
use crate::SessionError;

const JSONRPC_VERSION: &str = "2.0";

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
/// Application errors (`bad_hash`, `prereq_failed`, `wrong_direction`)
pub const SERVER_ERROR: i64 = -32000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcError {
    fn new(
        code: i64,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RpcRequest {
    #[serde(default)]
    jsonrpc: Option<String>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Value,
    #[serde(default)]
    id: Option<Value>,
}

#[derive(Debug, Serialize)]
struct RpcResponse {
    jsonrpc: &'static str,
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RpcError>,
}

impl RpcResponse {
    fn reply(
        id: Value,
        outcome: Result<Value, RpcError>,
    ) -> Self {
        let (result, error) = match outcome {
            Ok(result) => (Some(result), None),
            Err(error) => (None, Some(error)),
        };
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result,
            error,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PingParams {
    hash: String,
}

#[derive(Debug, Deserialize)]
struct MetadataParams {
    #[serde(default)]
    plugins: Vec<DeclaredPlugin>,
}

fn params<T: for<'de> Deserialize<'de>>(value: Value) -> Result<T, RpcError> {
    serde_json::from_value(value).map_err(|e| RpcError::new(INVALID_PARAMS, e.to_string()))
}

/// Handles one call. The flag asks for a push once the reply is written.
async fn dispatch(
    manager: &ClusterManager,
    node: &Node,
    method: &str,
    raw_params: Value,
) -> (Result<Value, RpcError>, bool) {
    match method {
        "ping_cp" => {
            let outcome = match params::<PingParams>(raw_params) {
                Ok(p) => manager
                    .record_ping(node, &p.hash)
                    .await
                    .map(|()| json!({}))
                    .map_err(|e| RpcError::new(SERVER_ERROR, e.to_string())),
                Err(e) => Err(e),
            };
            (outcome, false)
        }
        "report_metadata" => {
            let p = match params::<MetadataParams>(raw_params) {
                Ok(p) => p,
                Err(e) => return (Err(e), false),
            };
            match manager.admit(node, plugin_names(&p.plugins)).await {
                Ok(()) => (Ok(json!({"ok": "valid"})), true),
                Err(e) => (Err(RpcError::new(SERVER_ERROR, e.to_string())), false),
            }
        }
        "sync_config" => {
            let e = SessionError::WrongDirection(method.to_string());
            (Err(RpcError::new(SERVER_ERROR, e.to_string())), false)
        }
        "get_capabilities" => {
            let e = SessionError::NotImplemented(method.to_string());
            (Err(RpcError::new(METHOD_NOT_FOUND, e.to_string())), false)
        }
        other => (Err(RpcError::new(METHOD_NOT_FOUND, format!("method {other} not found"))), false),
    }
}

async fn reply(
    node: &Node,
    id: Value,
    outcome: Result<Value, RpcError>,
) -> bool {
    let response = RpcResponse::reply(id, outcome);
    let text = match serde_json::to_string(&response) {
        Ok(text) => text,
        Err(e) => {
            warn!(node_id = node.id(), "encoding rpc reply failed: {}", e);
            return true;
        }
    };
    match node.send(Frame::Text(text)).await {
        Ok(()) => true,
        Err(e) => {
            warn!(node_id = node.id(), "{}", e);
            false
        }
    }
}

/// Handles one text frame. Returns false when the session should end.
async fn handle_frame(
    manager: &ClusterManager,
    node: &Arc<Node>,
    text: &str,
) -> bool {
    let request: RpcRequest = match serde_json::from_str(text) {
        Ok(request) => request,
        Err(e) => return reply(node, Value::Null, Err(RpcError::new(PARSE_ERROR, e.to_string()))).await,
    };

    let Some(method) = request.method else {
        debug!(node_id = node.id(), "ignoring rpc response frame");
        return true;
    };
    let id = request.id;

    if request.jsonrpc.as_deref() != Some(JSONRPC_VERSION) {
        let error = RpcError::new(INVALID_REQUEST, "jsonrpc must be \"2.0\"");
        return match id {
            Some(id) => reply(node, id, Err(error)).await,
            None => true,
        };
    }

    let (outcome, push_after) = dispatch(manager, node, &method, request.params).await;
    if let Err(e) = &outcome {
        debug!(node_id = node.id(), method = %method, "rpc call failed: {}", e.message);
    }

    // Notifications get no reply.
    if let Some(id) = id {
        if !reply(node, id, outcome).await {
            return false;
        }
    }
    if push_after {
        manager.sync_node(node).await;
    }
    true
}

/// Read loop of a `/v1/wrpc` session. Replies go through the node's writer
/// lock so they never interleave with pushes.
pub async fn run_rpc_session<S: FrameSource>(
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
                warn!(node_id = node.id(), "rpc session read failed: {}", e);
                break;
            }
            Some(Ok(Frame::Text(text))) => {
                if !handle_frame(&manager, &node, &text).await {
                    break;
                }
            }
            Some(Ok(Frame::Ping(data))) => {
                if let Err(e) = node.send(Frame::Pong(data)).await {
                    warn!(node_id = node.id(), "{}", e);
                    break;
                }
            }
            Some(Ok(Frame::Pong(_))) => {}
            Some(Ok(Frame::Binary(_))) => {
                warn!(node_id = node.id(), "binary frame on rpc session ignored");
            }
        }
    }
    manager.disconnect(&node);
}
