//! Snapshot assembly: load → canonicalize → hash → compress.

mod canonical;
pub(crate) mod envelope;
mod hash;
mod kind;
mod loader;
mod payload;

#[cfg(test)]
mod loader_test;

use std::collections::BTreeMap;

use bytes::Bytes;
pub use canonical::*;
pub use envelope::Envelope;
pub use hash::*;
pub use kind::*;
pub use loader::*;
pub use payload::*;
use serde_json::Map;
use serde_json::Value;

use crate::Result;

/// Canonical config table of a cluster with its hashes
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub table: Map<String, Value>,
    pub hash: String,
    pub hashes: BTreeMap<String, String>,
}

impl Snapshot {
    /// Loads, canonicalizes and hashes the entities of `cluster_id`
    pub async fn assemble(
        loader: &SnapshotLoader,
        cluster_id: &str,
    ) -> Result<Self> {
        let entities = loader.load(cluster_id).await?;
        let table = canonicalize(cluster_id, entities)?;
        Ok(Self::from_table(table))
    }

    pub fn from_table(table: Map<String, Value>) -> Self {
        let (hash, hashes) = hash_config(&table);
        Self { table, hash, hashes }
    }

    /// Names of the plugins configured in this snapshot, sorted and
    /// deduplicated
    pub fn plugin_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .table
            .get(EntityKind::Plugin.section())
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|p| p.get("name").and_then(Value::as_str))
            .map(str::to_string)
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Gzipped reconfigure envelope
    pub fn into_payload(self) -> Result<(Bytes, String)> {
        let hash = self.hash.clone();
        let bytes = Envelope::reconfigure(self.table, self.hash, self.hashes).encode()?;
        Ok((Bytes::from(bytes), hash))
    }
}
