use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// How data-plane client certificates are authenticated
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    /// DPs present the same certificate the control plane serves with
    #[default]
    Shared,
    /// DPs present certificates issued by one of the configured CAs
    Pki,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TlsConfig {
    /// Serve the DP listener over TLS. Without TLS every DP request is
    /// rejected with "invalid non-TLS request".
    /// Default: true
    #[serde(default = "default_enable_tls")]
    pub enable_tls: bool,

    #[serde(default)]
    pub auth_mode: AuthMode,

    /// Control plane certificate chain in PEM format. In shared mode this is
    /// also the certificate every DP must present.
    /// Default: "./certs/cluster.crt"
    #[serde(default = "default_cluster_cert_path")]
    pub cluster_certificate_path: String,

    /// Control plane private key in PEM format
    /// Default: "./certs/cluster.key"
    #[serde(default = "default_cluster_key_path")]
    pub cluster_private_key_path: String,

    /// CA certificates DP certificates must chain to (pki mode only)
    #[serde(default)]
    pub ca_certificate_paths: Vec<String>,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            enable_tls: default_enable_tls(),
            auth_mode: AuthMode::default(),
            cluster_certificate_path: default_cluster_cert_path(),
            cluster_private_key_path: default_cluster_key_path(),
            ca_certificate_paths: vec![],
        }
    }
}

impl TlsConfig {
    pub fn validate(&self) -> Result<()> {
        if self.auth_mode == AuthMode::Pki && self.ca_certificate_paths.is_empty() {
            return Err(Error::InvalidConfig(
                "pki auth_mode requires at least one ca_certificate_paths entry".into(),
            ));
        }

        // No file checks needed if TLS is disabled
        if !self.enable_tls {
            return Ok(());
        }

        validate_readable_file(&self.cluster_certificate_path, "cluster certificate")?;
        validate_readable_file(&self.cluster_private_key_path, "cluster private key")?;
        for path in &self.ca_certificate_paths {
            validate_readable_file(path, "CA certificate")?;
        }

        Ok(())
    }
}

/// Validates a PEM file existence and readability
fn validate_readable_file(
    path: &str,
    name: &str,
) -> Result<()> {
    let path = Path::new(path);
    if !path.exists() {
        return Err(Error::InvalidConfig(format!(
            "{} file {} not found",
            name,
            path.display()
        )));
    }
    fs::File::open(path).map_err(|e| {
        Error::InvalidConfig(format!("{} file {} is unreadable: {}", name, path.display(), e))
    })?;
    Ok(())
}

fn default_enable_tls() -> bool {
    true
}
fn default_cluster_cert_path() -> String {
    "./certs/cluster.crt".into()
}
fn default_cluster_key_path() -> String {
    "./certs/cluster.key".into()
}
