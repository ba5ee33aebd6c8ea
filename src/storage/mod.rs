//! Persistence seams used by the control plane.
//!
//! The core reads entities, node rows, the store event marker and status
//! rows through the traits below. [`SledStore`] persists everything in one
//! embedded database; [`MemoryStore`] keeps it in process.

mod memory;
mod sled_store;

#[cfg(test)]
mod memory_test;

use std::path::Path;

pub use memory::*;
#[cfg(test)]
use mockall::automock;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
pub use sled_store::*;
use tonic::async_trait;
use tracing::debug;
use tracing::warn;

use crate::snapshot::EntityKind;
use crate::status::NodeStatus;
use crate::status::StatusRef;
use crate::Result;

/// One page of entities and the number of the page after it (`0` when
/// this was the last one).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub items: Vec<Value>,
    pub next_page_num: u64,
}

/// Slices `all` into the 1-based page `page`. Page `0` is read as page `1`.
pub(crate) fn paginate<T: Clone>(
    all: &[T],
    page: u64,
    page_size: usize,
) -> (Vec<T>, u64) {
    let page = page.max(1);
    let page_size = page_size.max(1);
    let start = ((page - 1) as usize).saturating_mul(page_size);
    if start >= all.len() {
        return (Vec::new(), 0);
    }
    let end = (start + page_size).min(all.len());
    let next = if end < all.len() { page + 1 } else { 0 };
    (all[start..end].to_vec(), next)
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait EntityStore: Send + Sync + 'static {
    /// Lists one page of `kind` entities of a cluster in store order
    async fn list_page(
        &self,
        cluster_id: &str,
        kind: EntityKind,
        page: u64,
        page_size: usize,
    ) -> Result<Page>;
}

/// Persisted row of a data-plane node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: String,
    pub hostname: String,
    pub version: String,
    pub cluster_id: String,
    /// Unix seconds of the last ping
    pub last_ping: u64,
    #[serde(default)]
    pub config_hash: String,
    #[serde(default)]
    pub plugins: Vec<String>,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait NodeStore: Send + Sync + 'static {
    async fn upsert_node(
        &self,
        record: NodeRecord,
    ) -> Result<()>;

    async fn delete_node(
        &self,
        node_id: &str,
    ) -> Result<()>;

    async fn list_nodes(&self) -> Result<Vec<NodeRecord>>;

    /// Deletes rows whose `last_ping` is before `cutoff` (unix seconds),
    /// returning the deleted ids.
    async fn delete_nodes_older_than(
        &self,
        cutoff: u64,
    ) -> Result<Vec<String>>;
}

/// Single-row marker bumped on every entity mutation
#[cfg_attr(test, automock)]
#[async_trait]
pub trait EventStore: Send + Sync + 'static {
    async fn last_update(&self) -> Result<Option<u64>>;

    /// Bumps the marker, returning the new value
    async fn touch(&self) -> Result<u64>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait StatusStore: Send + Sync + 'static {
    async fn upsert_status(
        &self,
        status: NodeStatus,
    ) -> Result<()>;

    async fn delete_status(
        &self,
        context: &StatusRef,
    ) -> Result<()>;

    async fn get_status(
        &self,
        context: &StatusRef,
    ) -> Result<Option<NodeStatus>>;
}

/// Opens the control plane database under `data_dir`
pub fn init_sled_db(data_dir: impl AsRef<Path> + std::fmt::Debug) -> std::result::Result<sled::Db, std::io::Error> {
    debug!("init_sled_db from path: {:?}", &data_dir);

    let db_path = data_dir.as_ref().join("cp_sync");
    sled::Config::default()
        .path(&db_path)
        .cache_capacity(256 * 1024 * 1024)
        .use_compression(true)
        .compression_factor(1)
        .open()
        .map_err(|e| {
            warn!("Try to open DB at this location: {:?} and failed: {:?}", db_path, e);
            std::io::Error::other(e)
        })
}
