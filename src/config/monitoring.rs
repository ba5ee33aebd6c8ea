use std::net::SocketAddr;

use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Prometheus `/metrics` endpoint, served apart from the data-plane listener
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MonitoringConfig {
    #[serde(default)]
    pub prometheus_enabled: bool,

    /// Loopback by default; data planes never scrape it
    #[serde(default = "default_metrics_address")]
    pub metrics_address: SocketAddr,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            prometheus_enabled: false,
            metrics_address: default_metrics_address(),
        }
    }
}

impl MonitoringConfig {
    /// `dp_listen` is the data-plane listener the metrics endpoint must not
    /// share a port with.
    /// # Errors
    /// Returns `Error::InvalidConfig` when Prometheus is enabled with port 0
    /// or with the data-plane listener's port
    pub fn validate(
        &self,
        dp_listen: SocketAddr,
    ) -> Result<()> {
        if !self.prometheus_enabled {
            return Ok(());
        }

        match self.metrics_address.port() {
            0 => Err(Error::InvalidConfig(
                "metrics_address must specify a non-zero port when prometheus is enabled".into(),
            )),
            port if port == dp_listen.port() => Err(Error::InvalidConfig(format!(
                "metrics_address port {port} is already used by the data-plane listener"
            ))),
            _ => Ok(()),
        }
    }
}

fn default_metrics_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9542))
}
