//! HTTP and websocket surface data planes connect to.
//!
//! Routes:
//! - `GET /v1/outlet`: legacy push session
//! - `GET /v1/wrpc`: JSON-RPC session
//! - `POST /version-handshake`: capability negotiation
//!
//! Every route authenticates the peer before looking at its parameters.

mod listener;
mod routes;


use std::sync::Arc;

pub use listener::*;
pub use routes::*;

use crate::auth::Authenticator;
use crate::manager::ClusterManager;
use crate::negotiation::Negotiator;
use crate::DataPlaneVersion;

/// Shared state behind every DP-facing route
pub struct DpServerContext {
    pub manager: Arc<ClusterManager>,
    pub negotiator: Arc<Negotiator>,
    pub authenticator: Arc<dyn Authenticator>,
    /// Oldest data plane release accepted on the session endpoints
    pub version_floor: DataPlaneVersion,
}
