use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use crate::DataPlaneVersion;
use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ClusterConfig {
    /// Identifier of the cluster this control plane serves. Shipped to every
    /// DP in the `parameters` section.
    #[serde(default = "default_cluster_id")]
    pub cluster_id: String,

    /// Newest DP version this control plane understands. DPs at or above it
    /// receive the snapshot untouched.
    #[serde(default = "default_cp_version")]
    pub cp_version: String,

    /// Oldest DP version admitted at handshake time
    #[serde(default = "default_min_dp_version")]
    pub min_dp_version: String,

    /// Plugins every DP must ship in addition to those used by the snapshot
    #[serde(default)]
    pub required_plugins: Vec<String>,

    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            cluster_id: default_cluster_id(),
            cp_version: default_cp_version(),
            min_dp_version: default_min_dp_version(),
            required_plugins: vec![],
            data_dir: default_data_dir(),
            log_dir: default_log_dir(),
        }
    }
}

impl ClusterConfig {
    /// Validates cluster identity and version settings
    /// # Errors
    /// Returns `Error::InvalidConfig` if any configuration rules are violated
    pub fn validate(&self) -> Result<()> {
        if uuid::Uuid::parse_str(&self.cluster_id).is_err() {
            return Err(Error::InvalidConfig(format!(
                "cluster_id {:?} is not a uuid",
                self.cluster_id
            )));
        }

        let cp = DataPlaneVersion::parse(&self.cp_version)
            .map_err(|e| Error::InvalidConfig(format!("cp_version: {e}")))?;
        let floor = DataPlaneVersion::parse(&self.min_dp_version)
            .map_err(|e| Error::InvalidConfig(format!("min_dp_version: {e}")))?;
        if floor > cp {
            return Err(Error::InvalidConfig(format!(
                "min_dp_version {} is newer than cp_version {}",
                self.min_dp_version, self.cp_version
            )));
        }

        if self.required_plugins.iter().any(|p| p.trim().is_empty()) {
            return Err(Error::InvalidConfig(
                "required_plugins cannot contain empty names".into(),
            ));
        }

        if self.data_dir.as_os_str().is_empty() {
            return Err(Error::InvalidConfig("data_dir path cannot be empty".into()));
        }
        if self.log_dir.as_os_str().is_empty() {
            return Err(Error::InvalidConfig("log_dir path cannot be empty".into()));
        }

        Ok(())
    }
}

fn default_cluster_id() -> String {
    "00000000-0000-4000-8000-000000000000".to_string()
}
fn default_cp_version() -> String {
    "3.0.0".to_string()
}
fn default_min_dp_version() -> String {
    "2.5.0".to_string()
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("/tmp/cp-sync/db")
}
fn default_log_dir() -> PathBuf {
    PathBuf::from("/tmp/cp-sync/logs")
}
