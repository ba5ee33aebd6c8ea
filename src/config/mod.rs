//! Configuration management for the control plane.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - Configuration file named by `CONFIG_PATH`
//! - Explicit override files
//! - Environment variable overrides (`CPSYNC__SECTION__KEY`)
//! - Component-wise validation

mod cluster;
mod monitoring;
mod network;
mod retry;
mod tls;
pub use cluster::*;
pub use monitoring::*;
pub use network::*;
pub use retry::*;
pub use tls::*;


//---
use std::env;
use std::fmt::Debug;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

const ENV_PREFIX: &str = "CPSYNC";

/// Main configuration container for the control plane.
///
/// Combines all subsystem configurations with hierarchical override support:
/// 1. Default values from code implementation
/// 2. Configuration file specified by `CONFIG_PATH`
/// 3. Environment variables (highest priority)
#[derive(Serialize, Deserialize, Clone, Default)]
pub struct CpSyncConfig {
    /// Cluster identity and compatibility versions
    #[serde(default)]
    pub cluster: ClusterConfig,
    /// Listener, relay and background task timing
    #[serde(default)]
    pub network: NetworkConfig,
    /// Retry policies for outbound streams
    #[serde(default)]
    pub retry: RetryPolicies,
    /// Data-plane authentication material
    #[serde(default)]
    pub tls: TlsConfig,
    /// Metrics endpoint
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

impl Debug for CpSyncConfig {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("CpSyncConfig")
            .field("cluster", &self.cluster)
            .field("network", &self.network)
            .finish()
    }
}

impl CpSyncConfig {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// # Note
    /// Validation is deferred so callers can apply `with_override_config()`
    /// first. Callers MUST call `validate()` before using the configuration.
    ///
    /// # Examples
    /// ```ignore
    /// std::env::set_var("CONFIG_PATH", "config/cp.toml");
    /// std::env::set_var("CPSYNC__CLUSTER__CLUSTER_ID", "6f9c...");
    /// let cfg = CpSyncConfig::new()?.validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);
        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }
        builder = builder.add_source(env_source());

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Applies additional configuration overrides from file without validation.
    ///
    /// Merging order (later sources override earlier):
    /// 1. Current configuration values
    /// 2. New configuration file
    /// 3. Latest environment variables (highest priority)
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(env_source())
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Validates every subsystem and returns the validated instance.
    pub fn validate(self) -> Result<Self> {
        self.cluster.validate()?;
        self.network.validate()?;
        self.retry.validate()?;
        self.tls.validate()?;
        self.monitoring.validate(self.network.listen_address)?;
        Ok(self)
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .ignore_empty(true)
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("cluster.required_plugins")
        .with_list_parse_key("tls.ca_certificate_paths")
}
