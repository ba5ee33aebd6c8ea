use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::manager::ClusterManager;
use crate::storage::NodeStore;
use crate::utils::time::now_secs;
use crate::Result;

/// Periodic sweep of nodes that stopped pinging
pub struct NodeReaper {
    store: Arc<dyn NodeStore>,
    managers: Vec<Arc<ClusterManager>>,
    ttl: Duration,
    period: Duration,
}

impl NodeReaper {
    pub fn new(
        store: Arc<dyn NodeStore>,
        managers: Vec<Arc<ClusterManager>>,
        ttl: Duration,
        period: Duration,
    ) -> Self {
        Self {
            store,
            managers,
            ttl,
            period,
        }
    }

    /// Deletes node rows older than the TTL and disconnects the in-memory
    /// nodes they belong to through their cluster manager. Returns the
    /// reaped ids.
    pub async fn reap_once(&self) -> Result<Vec<String>> {
        let cutoff = now_secs().saturating_sub(self.ttl.as_secs());
        let reaped = self.store.delete_nodes_older_than(cutoff).await?;
        if reaped.is_empty() {
            return Ok(reaped);
        }

        let ids: HashSet<&str> = reaped.iter().map(String::as_str).collect();
        for manager in &self.managers {
            for node in manager.nodes().all() {
                if ids.contains(node.id()) && node.last_ping() < cutoff {
                    debug!(node_id = %node.id(), "evicting stale node");
                    manager.disconnect(&node);
                }
            }
        }

        info!("reaped {} stale data-plane nodes", reaped.len());
        Ok(reaped)
    }

    pub async fn run(
        self,
        cancel: CancellationToken,
    ) -> Result<()> {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("node reaper stopped");
                    return Ok(());
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.reap_once().await {
                        warn!("node reap failed: {:?}", e);
                    }
                }
            }
        }
    }
}
