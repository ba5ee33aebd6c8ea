use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::time::timeout;
use tracing::debug;
use tracing::instrument;

use super::EntityKind;
use crate::constants::SNAPSHOT_PAGE_SIZE;
use crate::storage::EntityStore;
use crate::Result;
use crate::SnapshotError;

/// Entities of one cluster grouped by kind, in store order
pub type LoadedEntities = BTreeMap<EntityKind, Vec<Value>>;

/// Pages every entity kind of a cluster out of the [`EntityStore`].
pub struct SnapshotLoader {
    store: Arc<dyn EntityStore>,
    request_timeout: Duration,
    page_size: usize,
}

impl SnapshotLoader {
    pub fn new(
        store: Arc<dyn EntityStore>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            store,
            request_timeout,
            page_size: SNAPSHOT_PAGE_SIZE,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_page_size(
        mut self,
        page_size: usize,
    ) -> Self {
        self.page_size = page_size;
        self
    }

    /// Reads all kinds. The first failing page aborts the load and the
    /// pages read so far are discarded.
    #[instrument(skip(self))]
    pub async fn load(
        &self,
        cluster_id: &str,
    ) -> Result<LoadedEntities> {
        let mut loaded = LoadedEntities::new();
        for kind in EntityKind::ALL {
            let entities = self.load_kind(cluster_id, kind).await?;
            debug!("loaded {} {}", entities.len(), kind);
            loaded.insert(kind, entities);
        }
        Ok(loaded)
    }

    async fn load_kind(
        &self,
        cluster_id: &str,
        kind: EntityKind,
    ) -> Result<Vec<Value>> {
        let mut entities = Vec::new();
        let mut page = 1;

        loop {
            let result = timeout(
                self.request_timeout,
                self.store.list_page(cluster_id, kind, page, self.page_size),
            )
            .await
            .map_err(|_| SnapshotError::FetchTimeout {
                kind: kind.section(),
                duration: self.request_timeout,
            })?
            .map_err(|e| SnapshotError::FetchFailed {
                kind: kind.section(),
                source: Box::new(e),
            })?;

            for entity in &result.items {
                let has_id = entity
                    .get("id")
                    .and_then(Value::as_str)
                    .is_some_and(|id| !id.is_empty());
                if !has_id {
                    return Err(SnapshotError::ContractViolation {
                        section: kind.section(),
                        reason: "entity without an id".to_string(),
                    }
                    .into());
                }
            }
            entities.extend(result.items);

            match result.next_page_num {
                0 => return Ok(entities),
                next if next <= page => {
                    return Err(SnapshotError::ContractViolation {
                        section: kind.section(),
                        reason: format!("page cursor went from {page} to {next}"),
                    }
                    .into())
                }
                next => page = next,
            }
        }
    }
}
