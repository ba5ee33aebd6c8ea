use std::collections::BTreeMap;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::Value;
use tonic::async_trait;

use super::paginate;
use super::EntityStore;
use super::EventStore;
use super::NodeRecord;
use super::NodeStore;
use super::Page;
use super::StatusStore;
use crate::snapshot::EntityKind;
use crate::status::NodeStatus;
use crate::status::StatusRef;
use crate::Result;

/// In-process store for embedding and tests. Entities keep insertion
/// order.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entities: RwLock<BTreeMap<(String, EntityKind), Vec<Value>>>,
    nodes: DashMap<String, NodeRecord>,
    status: DashMap<String, NodeStatus>,
    /// Zero until the first touch
    marker: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `entity`, replacing an existing entity with the same `id` in
    /// place.
    pub fn put_entity(
        &self,
        cluster_id: &str,
        kind: EntityKind,
        entity: Value,
    ) {
        let mut entities = self.entities.write();
        let list = entities.entry((cluster_id.to_string(), kind)).or_default();
        let id = entity.get("id").cloned();
        match list.iter_mut().find(|e| id.is_some() && e.get("id") == id.as_ref()) {
            Some(existing) => *existing = entity,
            None => list.push(entity),
        }
    }

    pub fn delete_entity(
        &self,
        cluster_id: &str,
        kind: EntityKind,
        id: &str,
    ) {
        if let Some(list) = self.entities.write().get_mut(&(cluster_id.to_string(), kind)) {
            list.retain(|e| e.get("id").and_then(Value::as_str) != Some(id));
        }
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn list_page(
        &self,
        cluster_id: &str,
        kind: EntityKind,
        page: u64,
        page_size: usize,
    ) -> Result<Page> {
        let entities = self.entities.read();
        let all = entities
            .get(&(cluster_id.to_string(), kind))
            .map(Vec::as_slice)
            .unwrap_or_default();
        let (items, next_page_num) = paginate(all, page, page_size);
        Ok(Page { items, next_page_num })
    }
}

#[async_trait]
impl NodeStore for MemoryStore {
    async fn upsert_node(
        &self,
        record: NodeRecord,
    ) -> Result<()> {
        self.nodes.insert(record.id.clone(), record);
        Ok(())
    }

    async fn delete_node(
        &self,
        node_id: &str,
    ) -> Result<()> {
        self.nodes.remove(node_id);
        Ok(())
    }

    async fn list_nodes(&self) -> Result<Vec<NodeRecord>> {
        let mut records: Vec<NodeRecord> = self.nodes.iter().map(|e| e.value().clone()).collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }

    async fn delete_nodes_older_than(
        &self,
        cutoff: u64,
    ) -> Result<Vec<String>> {
        let stale: Vec<String> = self
            .nodes
            .iter()
            .filter(|e| e.value().last_ping < cutoff)
            .map(|e| e.key().clone())
            .collect();
        for id in &stale {
            self.nodes.remove(id);
        }
        Ok(stale)
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn last_update(&self) -> Result<Option<u64>> {
        let marker = self.marker.load(Ordering::SeqCst);
        Ok((marker != 0).then_some(marker))
    }

    async fn touch(&self) -> Result<u64> {
        Ok(self.marker.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[async_trait]
impl StatusStore for MemoryStore {
    async fn upsert_status(
        &self,
        status: NodeStatus,
    ) -> Result<()> {
        self.status.insert(status.context.key(), status);
        Ok(())
    }

    async fn delete_status(
        &self,
        context: &StatusRef,
    ) -> Result<()> {
        self.status.remove(&context.key());
        Ok(())
    }

    async fn get_status(
        &self,
        context: &StatusRef,
    ) -> Result<Option<NodeStatus>> {
        Ok(self.status.get(&context.key()).map(|e| e.value().clone()))
    }
}
