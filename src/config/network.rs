use std::net::SocketAddr;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Listener address, relay endpoint and background task timing.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NetworkConfig {
    /// Address the DP websocket / negotiation listener binds to
    #[serde(default = "default_listen_addr")]
    pub listen_address: SocketAddr,

    /// Event relay gRPC endpoint, e.g. "http://127.0.0.1:3100". The relay
    /// stream is disabled when unset.
    #[serde(default)]
    pub relay_endpoint: Option<String>,

    /// TCP connect timeout for the relay channel in milliseconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_in_ms: u64,

    /// Deadline for each store page request in milliseconds
    #[serde(default = "default_store_request_timeout")]
    pub store_request_timeout_in_ms: u64,

    /// Store event marker poll period in milliseconds
    #[serde(default = "default_event_poll_interval")]
    pub event_poll_interval_in_ms: u64,

    /// Period of the stale node sweep in seconds
    #[serde(default = "default_reap_interval")]
    pub reap_interval_in_secs: u64,

    /// Nodes whose last ping is older than this are reaped
    #[serde(default = "default_node_ttl")]
    pub node_ttl_in_secs: u64,

    /// Capacity of each cluster's reconfigure channel
    #[serde(default = "default_reconfigure_channel_capacity")]
    pub reconfigure_channel_capacity: usize,

    /// HTTP/2 keepalive interval on the relay channel in seconds
    #[serde(default = "default_http2_keep_alive_interval")]
    pub http2_keep_alive_interval_in_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_addr(),
            relay_endpoint: None,
            connect_timeout_in_ms: default_connect_timeout(),
            store_request_timeout_in_ms: default_store_request_timeout(),
            event_poll_interval_in_ms: default_event_poll_interval(),
            reap_interval_in_secs: default_reap_interval(),
            node_ttl_in_secs: default_node_ttl(),
            reconfigure_channel_capacity: default_reconfigure_channel_capacity(),
            http2_keep_alive_interval_in_secs: default_http2_keep_alive_interval(),
        }
    }
}

impl NetworkConfig {
    pub fn validate(&self) -> Result<()> {
        if self.listen_address.port() == 0 {
            return Err(Error::InvalidConfig(
                "listen_address must specify a non-zero port".into(),
            ));
        }

        if let Some(endpoint) = &self.relay_endpoint {
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                return Err(Error::InvalidConfig(format!(
                    "relay_endpoint {endpoint} must be an http(s) URI"
                )));
            }
        }

        if self.store_request_timeout_in_ms == 0 {
            return Err(Error::InvalidConfig(
                "store_request_timeout_in_ms must be positive".into(),
            ));
        }
        if self.event_poll_interval_in_ms == 0 {
            return Err(Error::InvalidConfig(
                "event_poll_interval_in_ms must be positive".into(),
            ));
        }
        if self.reap_interval_in_secs == 0 || self.node_ttl_in_secs == 0 {
            return Err(Error::InvalidConfig(
                "reap_interval_in_secs and node_ttl_in_secs must be positive".into(),
            ));
        }
        if self.reconfigure_channel_capacity == 0 {
            return Err(Error::InvalidConfig(
                "reconfigure_channel_capacity must be at least 1".into(),
            ));
        }

        Ok(())
    }

    pub fn store_request_timeout(&self) -> Duration {
        Duration::from_millis(self.store_request_timeout_in_ms)
    }

    pub fn event_poll_interval(&self) -> Duration {
        Duration::from_millis(self.event_poll_interval_in_ms)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_in_secs)
    }

    pub fn node_ttl(&self) -> Duration {
        Duration::from_secs(self.node_ttl_in_secs)
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8005))
}
fn default_connect_timeout() -> u64 {
    5_000
}
fn default_store_request_timeout() -> u64 {
    30_000
}
fn default_event_poll_interval() -> u64 {
    1_000
}
fn default_reap_interval() -> u64 {
    3_600
}
fn default_node_ttl() -> u64 {
    24 * 3_600
}
fn default_reconfigure_channel_capacity() -> usize {
    8
}
fn default_http2_keep_alive_interval() -> u64 {
    30
}
