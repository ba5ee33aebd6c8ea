//! Per-cluster broadcaster.
//!
//! A [`ClusterManager`] owns the cluster's payload, version cache and node
//! list. Reconfigure pulses arrive on a bounded channel; the consumer
//! drains every pending pulse before a single reload and broadcast.


use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use arc_swap::ArcSwap;
use futures::future::join_all;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::instrument;
use tracing::warn;

use crate::compat::CompatProcessor;
use crate::compat::VersionCache;
use crate::event::ReconfigureReceiver;
use crate::metrics::BROADCASTS_TOTAL;
use crate::metrics::CONFIG_PUSHES_TOTAL;
use crate::metrics::CONNECTED_NODES;
use crate::metrics::HASH_MATCH_SKIPS_TOTAL;
use crate::metrics::PUSH_FAILURES_TOTAL;
use crate::metrics::RELOAD_DURATION_MS;
use crate::negotiation::Negotiator;
use crate::node::Node;
use crate::node::NodeList;
use crate::snapshot::Payload;
use crate::snapshot::Snapshot;
use crate::snapshot::SnapshotLoader;
use crate::status::compat_conditions;
use crate::status::missing_plugin_condition;
use crate::status::missing_plugins;
use crate::status::NodeStatus;
use crate::status::StatusReporter;
use crate::storage::EntityStore;
use crate::storage::NodeStore;
use crate::storage::StatusStore;
use crate::ChangeRegistry;
use crate::NodeError;
use crate::Result;

/// What a push attempt did for one node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Pushed,
    HashMatched,
    /// Not pushed: missing plugins or no payload for the node's version
    Skipped,
    Failed,
}

/// Collaborators shared by every cluster manager of a process
#[derive(Clone)]
pub struct ManagerContext {
    pub entity_store: Arc<dyn EntityStore>,
    pub node_store: Arc<dyn NodeStore>,
    pub status_store: Arc<dyn StatusStore>,
    pub registry: Arc<ChangeRegistry>,
    pub processor: Arc<CompatProcessor>,
    pub negotiator: Arc<Negotiator>,
    pub store_request_timeout: Duration,
    /// Plugins required on top of those the snapshot uses
    pub required_plugins: Vec<String>,
}

pub struct ClusterManager {
    cluster_id: String,
    loader: SnapshotLoader,
    cache: VersionCache,
    registry: Arc<ChangeRegistry>,
    negotiator: Arc<Negotiator>,
    nodes: Arc<NodeList>,
    status: StatusReporter,
    node_store: Arc<dyn NodeStore>,
    configured_plugins: Vec<String>,
    required_plugins: ArcSwap<Vec<String>>,
    broadcast_lock: Mutex<()>,
    cancel: CancellationToken,
}

impl ClusterManager {
    pub fn new(
        cluster_id: String,
        ctx: ManagerContext,
        cancel: CancellationToken,
    ) -> Self {
        let mut configured_plugins = ctx.required_plugins;
        configured_plugins.sort();
        configured_plugins.dedup();

        Self {
            loader: SnapshotLoader::new(ctx.entity_store, ctx.store_request_timeout),
            cache: VersionCache::new(ctx.processor, Arc::new(Payload::new())),
            registry: ctx.registry,
            negotiator: ctx.negotiator,
            nodes: Arc::new(NodeList::new()),
            status: StatusReporter::new(ctx.status_store),
            node_store: ctx.node_store,
            required_plugins: ArcSwap::from_pointee(configured_plugins.clone()),
            configured_plugins,
            broadcast_lock: Mutex::new(()),
            cluster_id,
            cancel,
        }
    }

    pub fn cluster_id(&self) -> &str {
        &self.cluster_id
    }

    pub fn nodes(&self) -> &Arc<NodeList> {
        &self.nodes
    }

    pub fn cache(&self) -> &VersionCache {
        &self.cache
    }

    /// Hash of the current payload, `None` before the first reload
    pub fn current_hash(&self) -> Option<String> {
        self.cache.payload().hash()
    }

    /// Plugins every node must declare: the snapshot's plugins plus the
    /// configured ones, sorted
    pub fn required_plugins(&self) -> Arc<Vec<String>> {
        self.required_plugins.load_full()
    }

    /// Token new node sessions derive theirs from
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Reloads the snapshot and swaps it into the payload container. The
    /// hash covers only part of the document, so the payload is replaced
    /// even when it is unchanged.
    #[instrument(skip(self), fields(cluster_id = %self.cluster_id))]
    pub async fn reconfigure(&self) -> Result<()> {
        let started = Instant::now();
        let snapshot = Snapshot::assemble(&self.loader, &self.cluster_id).await?;

        let mut required = self.configured_plugins.clone();
        required.extend(snapshot.plugin_names());
        required.sort();
        required.dedup();
        self.required_plugins.store(Arc::new(required));

        let (bytes, hash) = snapshot.into_payload()?;
        if self.current_hash().as_deref() == Some(hash.as_str()) {
            debug!(%hash, "config hash unchanged");
        } else {
            info!(%hash, "config reloaded");
        }
        self.cache.update(bytes, hash);

        RELOAD_DURATION_MS
            .with_label_values(&[&self.cluster_id])
            .observe(started.elapsed().as_secs_f64() * 1000.0);
        Ok(())
    }

    /// Pushes the current payload to every admitted node. Serialized with
    /// other broadcasts; one node's failure never stops the others.
    pub async fn broadcast(&self) -> Vec<PushOutcome> {
        let _guard = self.broadcast_lock.lock().await;
        BROADCASTS_TOTAL.with_label_values(&[&self.cluster_id]).inc();

        let nodes: Vec<Arc<Node>> = self.nodes.all().into_iter().filter(|n| n.is_admitted()).collect();
        debug!(cluster_id = %self.cluster_id, nodes = nodes.len(), "broadcasting");
        join_all(nodes.iter().map(|node| self.push_to(node))).await
    }

    /// Pushes to a single node, serialized with broadcasts
    pub async fn sync_node(
        &self,
        node: &Arc<Node>,
    ) -> PushOutcome {
        let _guard = self.broadcast_lock.lock().await;
        self.push_to(node).await
    }

    async fn push_to(
        &self,
        node: &Arc<Node>,
    ) -> PushOutcome {
        let node_id = node.id();
        let required = self.required_plugins();
        let missing = missing_plugins(&required, &node.plugins());
        if !missing.is_empty() {
            warn!(node_id, ?missing, "node is missing required plugins, skipping update");
            let mut status = NodeStatus::new(node_id);
            status.conditions.push(missing_plugin_condition(&missing));
            self.publish_status(status).await;
            return PushOutcome::Skipped;
        }

        let content = match self.cache.get(&node.info.version) {
            Ok(content) => content,
            Err(e) => {
                warn!(node_id, version = %node.info.version, "no payload for node, skipping: {}", e);
                PUSH_FAILURES_TOTAL.with_label_values(&[&self.cluster_id]).inc();
                return PushOutcome::Skipped;
            }
        };

        if node.hash().as_deref() == Some(content.hash.as_str()) {
            info!(node_id, "hash matched, skipping update");
            HASH_MATCH_SKIPS_TOTAL.with_label_values(&[&self.cluster_id]).inc();
            return PushOutcome::HashMatched;
        }

        if let Err(e) = node.push(&content).await {
            warn!(node_id, "{}", e);
            PUSH_FAILURES_TOTAL.with_label_values(&[&self.cluster_id]).inc();
            return PushOutcome::Failed;
        }
        CONFIG_PUSHES_TOTAL.with_label_values(&[&self.cluster_id]).inc();

        let mut status = NodeStatus::new(node_id);
        status.conditions = compat_conditions(&self.registry, &content.report);
        self.publish_status(status).await;
        PushOutcome::Pushed
    }

    async fn publish_status(
        &self,
        status: NodeStatus,
    ) {
        let node_id = status.node_id().to_string();
        if let Err(e) = self.status.publish(status).await {
            warn!(node_id, "status update failed: {:?}", e);
        }
    }

    async fn persist(
        &self,
        node: &Node,
    ) {
        if let Err(e) = self.node_store.upsert_node(node.record()).await {
            warn!(node_id = node.id(), "persisting node row failed: {:?}", e);
        }
    }

    /// Registers a freshly connected node
    pub async fn connect(
        &self,
        node: Arc<Node>,
    ) -> std::result::Result<(), NodeError> {
        self.nodes.add(node.clone())?;
        if let Some(versions) = self.negotiator.negotiated(node.id()) {
            node.set_negotiated(versions);
        }
        CONNECTED_NODES
            .with_label_values(&[&self.cluster_id])
            .set(self.nodes.len() as i64);
        info!(node_id = node.id(), hostname = %node.info.hostname, version = %node.info.version, "data plane connected");
        self.persist(&node).await;
        Ok(())
    }

    /// Evicts a node and drops everything held for it: its list entry and
    /// its negotiated versions
    pub fn disconnect(
        &self,
        node: &Node,
    ) {
        node.evict();
        match self.nodes.remove(&node.remote_addr()) {
            Ok(_) => info!(node_id = node.id(), "data plane disconnected"),
            Err(e) => debug!(node_id = node.id(), "{}", e),
        }
        self.negotiator.forget(node.id());
        CONNECTED_NODES
            .with_label_values(&[&self.cluster_id])
            .set(self.nodes.len() as i64);
    }

    /// Records a ping and persists the node row
    pub async fn record_ping(
        &self,
        node: &Node,
        hash: &str,
    ) -> std::result::Result<(), NodeError> {
        node.ping(hash)?;
        self.persist(node).await;
        Ok(())
    }

    /// Checks the plugins a node declared and admits it when none are
    /// missing. Reloads the snapshot first so the node's first push carries
    /// the store as it is now.
    pub async fn admit(
        &self,
        node: &Node,
        plugins: Vec<String>,
    ) -> std::result::Result<(), NodeError> {
        node.set_plugins(plugins);
        if let Err(e) = self.reconfigure().await {
            warn!(cluster_id = %self.cluster_id, node_id = node.id(), "reconfigure on connect failed: {:?}", e);
        }

        let required = self.required_plugins();
        let declared = node.plugins();
        let missing = match self.status.check_plugins(node.id(), &required, &declared).await {
            Ok(missing) => missing,
            Err(e) => {
                warn!(node_id = node.id(), "status update failed: {:?}", e);
                missing_plugins(&required, &declared)
            }
        };
        if !missing.is_empty() {
            return Err(NodeError::PrerequisiteFailed(format!(
                "data plane is missing plugins: {}",
                missing.join(", ")
            )));
        }

        node.admit();
        self.persist(node).await;
        Ok(())
    }

    async fn reload_and_broadcast(&self) {
        match self.reconfigure().await {
            Ok(()) => {
                self.broadcast().await;
            }
            Err(e) => warn!(cluster_id = %self.cluster_id, "reconfigure failed, cycle skipped: {:?}", e),
        }
    }

    /// Reconfigure consumer. Every wake-up drains the pending pulses so a
    /// burst costs one reload.
    pub async fn run(
        self: Arc<Self>,
        mut pulses: ReconfigureReceiver,
    ) -> Result<()> {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                pulse = pulses.recv() => {
                    if pulse.is_none() {
                        break;
                    }
                    let mut drained = 0;
                    while pulses.try_recv().is_ok() {
                        drained += 1;
                    }
                    debug!(cluster_id = %self.cluster_id, drained, "reconfigure pulse");
                    self.reload_and_broadcast().await;
                }
            }
        }
        debug!(cluster_id = %self.cluster_id, "cluster manager stopped");
        Ok(())
    }
}
