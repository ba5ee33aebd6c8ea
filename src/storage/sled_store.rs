use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use sled::Batch;
use sled::Tree;
use tonic::async_trait;
use tracing::debug;
use tracing::instrument;
use tracing::trace;

use super::paginate;
use super::EntityStore;
use super::EventStore;
use super::NodeRecord;
use super::NodeStore;
use super::Page;
use super::StatusStore;
use crate::constants::ENTITY_TREE_PREFIX;
use crate::constants::LAST_UPDATE_KEY;
use crate::constants::NODE_TREE;
use crate::constants::STATUS_TREE;
use crate::constants::STORE_EVENT_TREE;
use crate::snapshot::EntityKind;
use crate::status::NodeStatus;
use crate::status::StatusRef;
use crate::Result;
use crate::StorageError;

/// sled-backed implementation of every store trait.
///
/// Entities of one cluster and kind live in their own tree keyed by id, so
/// store order is id order.
#[derive(Debug, Clone)]
pub struct SledStore {
    db: Arc<sled::Db>,
    nodes: Tree,
    status: Tree,
    events: Tree,
}

impl SledStore {
    pub fn new(db: Arc<sled::Db>) -> Result<Self> {
        let nodes = db.open_tree(NODE_TREE)?;
        let status = db.open_tree(STATUS_TREE)?;
        let events = db.open_tree(STORE_EVENT_TREE)?;
        Ok(Self {
            db,
            nodes,
            status,
            events,
        })
    }

    fn entity_tree(
        &self,
        cluster_id: &str,
        kind: EntityKind,
    ) -> Result<Tree> {
        let name = format!("{}:{}:{}", ENTITY_TREE_PREFIX, cluster_id, kind.section());
        Ok(self.db.open_tree(name)?)
    }

    /// Inserts or replaces an entity. The entity must carry a string `id`.
    pub fn put_entity(
        &self,
        cluster_id: &str,
        kind: EntityKind,
        entity: &Value,
    ) -> Result<()> {
        let id = entity.get("id").and_then(Value::as_str).ok_or_else(|| {
            StorageError::Unavailable(format!("{} entity without a string id", kind.resource_type()))
        })?;
        let tree = self.entity_tree(cluster_id, kind)?;
        tree.insert(id.as_bytes(), serde_json::to_vec(entity).map_err(StorageError::from)?)?;
        trace!("put {} {} in cluster {}", kind.resource_type(), id, cluster_id);
        Ok(())
    }

    pub fn delete_entity(
        &self,
        cluster_id: &str,
        kind: EntityKind,
        id: &str,
    ) -> Result<()> {
        self.entity_tree(cluster_id, kind)?.remove(id.as_bytes())?;
        Ok(())
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(value).map_err(StorageError::from)?)
}

fn decode<T: DeserializeOwned>(
    tree: &Tree,
    bytes: &[u8],
) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|source| {
        StorageError::CorruptRecord {
            tree: String::from_utf8_lossy(&tree.name()).into_owned(),
            source,
        }
        .into()
    })
}

#[async_trait]
impl EntityStore for SledStore {
    #[instrument(skip(self))]
    async fn list_page(
        &self,
        cluster_id: &str,
        kind: EntityKind,
        page: u64,
        page_size: usize,
    ) -> Result<Page> {
        let tree = self.entity_tree(cluster_id, kind)?;
        let mut all = Vec::with_capacity(tree.len());
        for item in tree.iter() {
            let (_, value) = item?;
            all.push(decode::<Value>(&tree, &value)?);
        }
        let (items, next_page_num) = paginate(&all, page, page_size);
        Ok(Page { items, next_page_num })
    }
}

#[async_trait]
impl NodeStore for SledStore {
    async fn upsert_node(
        &self,
        record: NodeRecord,
    ) -> Result<()> {
        self.nodes.insert(record.id.as_bytes(), encode(&record)?)?;
        Ok(())
    }

    async fn delete_node(
        &self,
        node_id: &str,
    ) -> Result<()> {
        self.nodes.remove(node_id.as_bytes())?;
        Ok(())
    }

    async fn list_nodes(&self) -> Result<Vec<NodeRecord>> {
        let mut records = Vec::with_capacity(self.nodes.len());
        for item in self.nodes.iter() {
            let (_, value) = item?;
            records.push(decode(&self.nodes, &value)?);
        }
        Ok(records)
    }

    #[instrument(skip(self))]
    async fn delete_nodes_older_than(
        &self,
        cutoff: u64,
    ) -> Result<Vec<String>> {
        let mut batch = Batch::default();
        let mut deleted = Vec::new();

        for item in self.nodes.iter() {
            let (key, value) = item?;
            let record: NodeRecord = decode(&self.nodes, &value)?;
            if record.last_ping < cutoff {
                batch.remove(key);
                deleted.push(record.id);
            }
        }

        self.nodes.apply_batch(batch)?;
        debug!("deleted {} stale node rows", deleted.len());
        Ok(deleted)
    }
}

#[async_trait]
impl EventStore for SledStore {
    async fn last_update(&self) -> Result<Option<u64>> {
        match self.events.get(LAST_UPDATE_KEY)? {
            Some(bytes) => Ok(Some(decode(&self.events, &bytes)?)),
            None => Ok(None),
        }
    }

    async fn touch(&self) -> Result<u64> {
        let marker = self.db.generate_id()?;
        self.events.insert(LAST_UPDATE_KEY, encode(&marker)?)?;
        Ok(marker)
    }
}

#[async_trait]
impl StatusStore for SledStore {
    async fn upsert_status(
        &self,
        status: NodeStatus,
    ) -> Result<()> {
        self.status.insert(status.context.key().as_bytes(), encode(&status)?)?;
        Ok(())
    }

    async fn delete_status(
        &self,
        context: &StatusRef,
    ) -> Result<()> {
        self.status.remove(context.key().as_bytes())?;
        Ok(())
    }

    async fn get_status(
        &self,
        context: &StatusRef,
    ) -> Result<Option<NodeStatus>> {
        match self.status.get(context.key().as_bytes())? {
            Some(bytes) => Ok(Some(decode(&self.status, &bytes)?)),
            None => Ok(None),
        }
    }
}
