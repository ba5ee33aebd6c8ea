//! Assembly of a running control plane.
//!
//! [`ControlPlaneBuilder`] wires the persistence adapters, change catalog,
//! negotiator, cluster manager, event sources and the DP listener from a
//! [`CpSyncConfig`]. Every component has a production default (sled
//! storage, gRPC relay, certificate authentication) that can be overridden
//! before `build()`.
//!
//! ## Example
//! ```ignore
//! let cancel = CancellationToken::new();
//! let control_plane = ControlPlaneBuilder::new(config, cancel.clone())
//!     .build()?;
//! control_plane.run().await?;
//! ```

#[cfg(test)]
mod app_test;

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;

use crate::auth::authenticator_from_config;
use crate::auth::Authenticator;
use crate::compat::CompatProcessor;
use crate::compat::ExtraProcessor;
use crate::event::reconfigure_channel;
use crate::event::EventStreamer;
use crate::event::GrpcRelayClient;
use crate::event::ReconfigureReceiver;
use crate::event::RelayClient;
use crate::event::RelayListener;
use crate::event::StoreEventPoller;
use crate::manager::ClusterManager;
use crate::manager::ManagerContext;
use crate::metrics;
use crate::negotiation::Negotiator;
use crate::node::NodeReaper;
use crate::server;
use crate::server::DpServerContext;
use crate::storage::init_sled_db;
use crate::storage::EntityStore;
use crate::storage::EventStore;
use crate::storage::NodeStore;
use crate::storage::SledStore;
use crate::storage::StatusStore;
use crate::utils::async_task::spawn_task;
use crate::ChangeRegistry;
use crate::CpSyncConfig;
use crate::DataPlaneVersion;
use crate::Result;
use crate::StorageError;

/// Builder for a [`ControlPlane`]
pub struct ControlPlaneBuilder {
    config: CpSyncConfig,
    cancel: CancellationToken,
    entity_store: Option<Arc<dyn EntityStore>>,
    node_store: Option<Arc<dyn NodeStore>>,
    event_store: Option<Arc<dyn EventStore>>,
    status_store: Option<Arc<dyn StatusStore>>,
    relay_client: Option<Arc<dyn RelayClient>>,
    authenticator: Option<Arc<dyn Authenticator>>,
    extra_processor: Option<Arc<dyn ExtraProcessor>>,
}

impl ControlPlaneBuilder {
    pub fn new(
        config: CpSyncConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            cancel,
            entity_store: None,
            node_store: None,
            event_store: None,
            status_store: None,
            relay_client: None,
            authenticator: None,
            extra_processor: None,
        }
    }

    /// Uses one adapter for every store
    pub fn stores<S>(
        mut self,
        store: Arc<S>,
    ) -> Self
    where
        S: EntityStore + NodeStore + EventStore + StatusStore,
    {
        self.entity_store = Some(store.clone());
        self.node_store = Some(store.clone());
        self.event_store = Some(store.clone());
        self.status_store = Some(store);
        self
    }

    pub fn entity_store(
        mut self,
        store: Arc<dyn EntityStore>,
    ) -> Self {
        self.entity_store = Some(store);
        self
    }

    pub fn relay_client(
        mut self,
        client: Arc<dyn RelayClient>,
    ) -> Self {
        self.relay_client = Some(client);
        self
    }

    pub fn authenticator(
        mut self,
        authenticator: Arc<dyn Authenticator>,
    ) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    pub fn extra_processor(
        mut self,
        extra: Arc<dyn ExtraProcessor>,
    ) -> Self {
        self.extra_processor = Some(extra);
        self
    }

    /// Assembles the components. Fails on an unusable catalog, store or
    /// certificate configuration.
    pub fn build(self) -> Result<ControlPlane> {
        let config = self.config;
        let cluster_id = config.cluster.cluster_id.clone();

        let mut sled: Option<Arc<SledStore>> = None;
        let mut open_sled = || -> Result<Arc<SledStore>> {
            if let Some(store) = &sled {
                return Ok(store.clone());
            }
            let db = init_sled_db(&config.cluster.data_dir).map_err(StorageError::IoError)?;
            let store = Arc::new(SledStore::new(Arc::new(db))?);
            sled = Some(store.clone());
            Ok(store)
        };
        let entity_store: Arc<dyn EntityStore> = match self.entity_store {
            Some(store) => store,
            None => open_sled()?,
        };
        let node_store: Arc<dyn NodeStore> = match self.node_store {
            Some(store) => store,
            None => open_sled()?,
        };
        let event_store: Arc<dyn EventStore> = match self.event_store {
            Some(store) => store,
            None => open_sled()?,
        };
        let status_store: Arc<dyn StatusStore> = match self.status_store {
            Some(store) => store,
            None => open_sled()?,
        };

        let registry = Arc::new(ChangeRegistry::with_default_catalog()?);
        info!("registered {} compatibility changes", registry.len());

        let cp_version = DataPlaneVersion::parse(&config.cluster.cp_version)?;
        let version_floor = DataPlaneVersion::parse(&config.cluster.min_dp_version)?;
        let mut processor = CompatProcessor::new(registry.clone(), cp_version);
        if let Some(extra) = self.extra_processor {
            processor = processor.with_extra_processor(extra);
        }

        let negotiator = Arc::new(Negotiator::with_defaults());
        let manager = Arc::new(ClusterManager::new(
            cluster_id.clone(),
            ManagerContext {
                entity_store,
                node_store: node_store.clone(),
                status_store,
                registry,
                processor: Arc::new(processor),
                negotiator: negotiator.clone(),
                store_request_timeout: config.network.store_request_timeout(),
                required_plugins: config.cluster.required_plugins.clone(),
            },
            self.cancel.child_token(),
        ));

        let authenticator = match self.authenticator {
            Some(authenticator) => authenticator,
            None => authenticator_from_config(&config.tls)?,
        };

        let relay_client = self.relay_client.or_else(|| {
            config.network.relay_endpoint.clone().map(|endpoint| {
                Arc::new(GrpcRelayClient::new(
                    endpoint,
                    Duration::from_millis(config.network.connect_timeout_in_ms),
                    Duration::from_secs(config.network.http2_keep_alive_interval_in_secs),
                )) as Arc<dyn RelayClient>
            })
        });

        let streamer = Arc::new(EventStreamer::new());
        let (pulse_tx, pulse_rx) = reconfigure_channel(config.network.reconfigure_channel_capacity);
        streamer.register(&cluster_id, pulse_tx);

        let server_ctx = Arc::new(DpServerContext {
            manager: manager.clone(),
            negotiator,
            authenticator,
            version_floor,
        });

        debug!(%cluster_id, "control plane assembled");
        Ok(ControlPlane {
            config,
            cancel: self.cancel,
            manager,
            streamer,
            pulses: pulse_rx,
            node_store,
            event_store,
            relay_client,
            server_ctx,
        })
    }
}

/// An assembled control plane, ready to run
pub struct ControlPlane {
    config: CpSyncConfig,
    cancel: CancellationToken,
    manager: Arc<ClusterManager>,
    streamer: Arc<EventStreamer>,
    pulses: ReconfigureReceiver,
    node_store: Arc<dyn NodeStore>,
    event_store: Arc<dyn EventStore>,
    relay_client: Option<Arc<dyn RelayClient>>,
    server_ctx: Arc<DpServerContext>,
}

impl ControlPlane {
    pub fn manager(&self) -> &Arc<ClusterManager> {
        &self.manager
    }

    pub fn streamer(&self) -> &Arc<EventStreamer> {
        &self.streamer
    }

    /// Starts the background tasks and serves data planes until the cancel
    /// token fires.
    pub async fn run(self) -> Result<()> {
        let ControlPlane {
            config,
            cancel,
            manager,
            streamer,
            pulses,
            node_store,
            event_store,
            relay_client,
            server_ctx,
        } = self;
        let cluster_id = manager.cluster_id().to_string();
        let acceptor = if config.tls.enable_tls {
            Some(server::tls_acceptor(&config.tls)?)
        } else {
            None
        };
        let listener = server::bind(config.network.listen_address).await?;
        let mut handles: Vec<JoinHandle<()>> = Vec::new();

        if config.monitoring.prometheus_enabled {
            let addr = config.monitoring.metrics_address;
            let token = cancel.clone();
            spawn_task(
                "metrics_server",
                move || async move {
                    metrics::start_server(addr, token).await;
                    Ok(())
                },
                Some(&mut handles),
            );
        }

        let consumer = manager.clone();
        spawn_task("cluster_manager", move || consumer.run(pulses), Some(&mut handles));

        let poller = StoreEventPoller::new(event_store, streamer.clone(), config.network.event_poll_interval());
        let token = cancel.clone();
        spawn_task("store_event_poller", move || poller.run(token), Some(&mut handles));

        if let Some(client) = relay_client {
            let relay = RelayListener::new(client, streamer.clone(), cluster_id.clone(), config.retry.relay);
            let token = cancel.clone();
            spawn_task("relay_listener", move || relay.run(token), Some(&mut handles));
        }

        let reaper = NodeReaper::new(
            node_store,
            vec![manager.clone()],
            config.network.node_ttl(),
            config.network.reap_interval(),
        );
        let token = cancel.clone();
        spawn_task("node_reaper", move || reaper.run(token), Some(&mut handles));

        // first snapshot without waiting for a store event
        streamer.notify(&cluster_id);

        info!(%cluster_id, "control plane started");
        server::serve(server_ctx, listener, acceptor, cancel.clone()).await;

        for handle in handles {
            let _ = handle.await;
        }
        info!(%cluster_id, "control plane stopped");
        Ok(())
    }
}
