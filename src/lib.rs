//! Control-plane configuration fan-out for hybrid gateway deployments.
//!
//! The control plane assembles a canonical config snapshot from its entity
//! store, hashes and compresses it, downgrades it for each connected data
//! plane's release and pushes it over long-lived websocket sessions.
//!
//! Main entry points:
//! - [`app::ControlPlaneBuilder`]: wires everything from a [`CpSyncConfig`]
//! - [`manager::ClusterManager`]: per-cluster reload and broadcast
//! - [`compat::CompatProcessor`]: version downgrades and change reports
//! - [`snapshot::Snapshot`]: load, canonicalize and hash a cluster's config

pub mod app;
pub mod auth;
pub mod compat;
mod config;
mod errors;
pub mod event;
pub mod manager;
pub mod metrics;
pub mod negotiation;
pub mod node;
pub mod proto;
pub mod server;
pub mod session;
pub mod snapshot;
pub mod status;
pub mod storage;

pub(crate) mod constants;
pub(crate) mod utils;

pub use compat::ChangeRegistry;
pub use compat::ChangeReport;
pub use compat::DataPlaneVersion;
pub use compat::Resource;
pub use compat::Severity;
pub use config::*;
pub use errors::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub(crate) mod test_utils;
