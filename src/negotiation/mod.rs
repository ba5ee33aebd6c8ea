//! Version negotiation between data planes and the control plane.
//!
//! A data plane lists the capabilities it wants with the versions it
//! speaks; for each one the control plane picks the first version in its
//! own preference order that the data plane offered.


use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
#[cfg(test)]
use mockall::automock;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::constants::CAPABILITY_CLUSTER_PROTOCOL;
use crate::constants::CAPABILITY_CONFIG;
use crate::constants::EXPECTED_NODE_TYPE;
use crate::NegotiationError;

const UNKNOWN_SERVICE: &str = "unknown service";
const NO_KNOWN_VERSION: &str = "no known version";

/// Invoked when a data plane is granted a capability version
#[cfg_attr(test, automock)]
pub trait ServiceRegistrar: Send + Sync + 'static {
    fn register(
        &self,
        node_id: &str,
        capability: &str,
        version: &str,
    ) -> std::result::Result<(), String>;
}

#[derive(Clone)]
pub struct CapabilityVersion {
    pub version: String,
    pub description: String,
    pub registrar: Option<Arc<dyn ServiceRegistrar>>,
}

impl std::fmt::Debug for CapabilityVersion {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("CapabilityVersion")
            .field("version", &self.version)
            .field("description", &self.description)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRequest {
    pub name: String,
    pub versions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NegotiationRequest {
    pub node: NodeDescriptor,
    #[serde(default)]
    pub services_requested: Vec<ServiceRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl NegotiationRequest {
    /// Structural checks done before negotiating
    pub fn validate(&self) -> Result<(), NegotiationError> {
        if uuid::Uuid::parse_str(&self.node.id).is_err() {
            return Err(NegotiationError::Malformed(format!(
                "node.id {:?} is not a uuid",
                self.node.id
            )));
        }
        if self.node.version.trim().is_empty() {
            return Err(NegotiationError::Malformed("node.version is required".into()));
        }
        for service in &self.services_requested {
            if service.name.trim().is_empty() {
                return Err(NegotiationError::Malformed("requested service without a name".into()));
            }
            if service.versions.is_empty() {
                return Err(NegotiationError::Malformed(format!(
                    "service {} requests no versions",
                    service.name
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRef {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptedService {
    pub name: String,
    pub version: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedService {
    pub name: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegotiationResponse {
    pub node: NodeRef,
    pub services_accepted: Vec<AcceptedService>,
    pub services_rejected: Vec<RejectedService>,
}

/// Builds the immutable capability table
#[derive(Debug, Default)]
pub struct NegotiatorBuilder {
    capabilities: BTreeMap<String, Vec<CapabilityVersion>>,
}

impl NegotiatorBuilder {
    /// Adds `version` to `capability`. Earlier registrations are preferred.
    pub fn register(
        mut self,
        capability: &str,
        version: &str,
        description: &str,
        registrar: Option<Arc<dyn ServiceRegistrar>>,
    ) -> Self {
        self.capabilities
            .entry(capability.to_string())
            .or_default()
            .push(CapabilityVersion {
                version: version.to_string(),
                description: description.to_string(),
                registrar,
            });
        self
    }

    pub fn build(self) -> Negotiator {
        Negotiator {
            capabilities: self.capabilities,
            negotiated: DashMap::new(),
        }
    }
}

#[derive(Debug)]
pub struct Negotiator {
    capabilities: BTreeMap<String, Vec<CapabilityVersion>>,
    /// node id → capability → version
    negotiated: DashMap<String, BTreeMap<String, String>>,
}

impl Negotiator {
    pub fn builder() -> NegotiatorBuilder {
        NegotiatorBuilder::default()
    }

    /// Capabilities every control plane offers: `config` v1 and the
    /// cluster protocols, RPC preferred over the legacy JSON push.
    pub fn with_defaults() -> Self {
        Self::builder()
            .register(CAPABILITY_CONFIG, "v1", "configuration sync", None)
            .register(CAPABILITY_CLUSTER_PROTOCOL, "wrpc", "RPC session protocol", None)
            .register(CAPABILITY_CLUSTER_PROTOCOL, "json", "legacy framed push protocol", None)
            .build()
    }

    pub fn negotiate(
        &self,
        request: &NegotiationRequest,
    ) -> Result<NegotiationResponse, NegotiationError> {
        if request.node.node_type != EXPECTED_NODE_TYPE {
            return Err(NegotiationError::InvalidNodeType(request.node.node_type.clone()));
        }
        request.validate()?;

        let node_id = request.node.id.as_str();
        let mut accepted = Vec::new();
        let mut rejected = Vec::new();
        let mut chosen = BTreeMap::new();

        for service in &request.services_requested {
            let Some(versions) = self.capabilities.get(&service.name) else {
                rejected.push(RejectedService {
                    name: service.name.clone(),
                    message: UNKNOWN_SERVICE.to_string(),
                });
                continue;
            };

            let Some(choice) = versions.iter().find(|v| service.versions.contains(&v.version)) else {
                rejected.push(RejectedService {
                    name: service.name.clone(),
                    message: NO_KNOWN_VERSION.to_string(),
                });
                continue;
            };

            if let Some(registrar) = &choice.registrar {
                registrar
                    .register(node_id, &service.name, &choice.version)
                    .map_err(|reason| {
                        warn!(node_id, capability = %service.name, "registrar failed: {}", reason);
                        NegotiationError::Registrar {
                            name: service.name.clone(),
                            reason,
                        }
                    })?;
            }

            chosen.insert(service.name.clone(), choice.version.clone());
            accepted.push(AcceptedService {
                name: service.name.clone(),
                version: choice.version.clone(),
                message: choice.description.clone(),
            });
        }

        info!(
            node_id,
            accepted = accepted.len(),
            rejected = rejected.len(),
            "negotiated capabilities"
        );
        debug!(node_id, ?chosen, "negotiated versions");
        self.negotiated.insert(node_id.to_string(), chosen);

        Ok(NegotiationResponse {
            node: NodeRef {
                id: node_id.to_string(),
            },
            services_accepted: accepted,
            services_rejected: rejected,
        })
    }

    /// Versions agreed with `node_id`, if it negotiated
    pub fn negotiated(
        &self,
        node_id: &str,
    ) -> Option<BTreeMap<String, String>> {
        self.negotiated.get(node_id).map(|e| e.value().clone())
    }

    pub fn forget(
        &self,
        node_id: &str,
    ) {
        self.negotiated.remove(node_id);
    }
}
