//! Data-plane status conditions.
//!
//! A node's status is re-evaluated whenever it declares its plugins and
//! after every push. Conditions are upserted under `node:<id>`; a node with
//! no conditions has its status row deleted.


use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

use crate::constants::MISSING_PLUGIN_CODE;
use crate::constants::MISSING_PLUGIN_MESSAGE;
use crate::constants::STATUS_REF_NODE;
use crate::storage::StatusStore;
use crate::ChangeRegistry;
use crate::ChangeReport;
use crate::Resource;
use crate::Result;
use crate::Severity;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub code: String,
    pub message: String,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<Resource>,
}

/// Object a status row is attached to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatusRef {
    #[serde(rename = "type")]
    pub ref_type: String,
    pub id: String,
}

impl StatusRef {
    pub fn node(node_id: &str) -> Self {
        Self {
            ref_type: STATUS_REF_NODE.to_string(),
            id: node_id.to_string(),
        }
    }

    /// Storage key, `node:<id>`
    pub fn key(&self) -> String {
        format!("{}:{}", self.ref_type, self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatus {
    pub context: StatusRef,
    pub conditions: Vec<Condition>,
}

impl NodeStatus {
    pub fn new(node_id: &str) -> Self {
        Self {
            context: StatusRef::node(node_id),
            conditions: Vec::new(),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.context.id
    }

    pub fn has_errors(&self) -> bool {
        self.conditions.iter().any(|c| c.severity == Severity::Error)
    }
}

/// Required plugins absent from `declared`, in `required` order
pub fn missing_plugins(
    required: &[String],
    declared: &[String],
) -> Vec<String> {
    let declared: BTreeSet<&str> = declared.iter().map(String::as_str).collect();
    let mut seen = BTreeSet::new();
    required
        .iter()
        .filter(|name| !declared.contains(name.as_str()) && seen.insert(name.as_str()))
        .cloned()
        .collect()
}

pub fn missing_plugin_condition(missing: &[String]) -> Condition {
    Condition {
        code: MISSING_PLUGIN_CODE.to_string(),
        message: format!("{}: {}", MISSING_PLUGIN_MESSAGE, missing.join(", ")),
        severity: Severity::Error,
        resources: Vec::new(),
    }
}

/// One condition per change in `report`, described from the catalog
pub fn compat_conditions(
    registry: &ChangeRegistry,
    report: &ChangeReport,
) -> Vec<Condition> {
    report
        .entries()
        .iter()
        .filter_map(|entry| {
            let change = registry.lookup(&entry.id)?;
            Some(Condition {
                code: change.id.clone(),
                message: change.description.clone(),
                severity: change.severity,
                resources: entry.resources.clone(),
            })
        })
        .collect()
}

/// Writes node status rows.
pub struct StatusReporter {
    store: Arc<dyn StatusStore>,
}

impl StatusReporter {
    pub fn new(store: Arc<dyn StatusStore>) -> Self {
        Self { store }
    }

    /// Upserts `status`, or deletes the row when it carries no conditions
    pub async fn publish(
        &self,
        status: NodeStatus,
    ) -> Result<()> {
        if status.conditions.is_empty() {
            debug!(node_id = status.node_id(), "clearing node status");
            return self.store.delete_status(&status.context).await;
        }
        debug!(
            node_id = status.node_id(),
            conditions = status.conditions.len(),
            "upserting node status"
        );
        self.store.upsert_status(status).await
    }

    /// Checks a node's declared plugins. Publishes the result and returns
    /// the missing names (empty when the node may be admitted).
    pub async fn check_plugins(
        &self,
        node_id: &str,
        required: &[String],
        declared: &[String],
    ) -> Result<Vec<String>> {
        let missing = missing_plugins(required, declared);
        let mut status = NodeStatus::new(node_id);
        if !missing.is_empty() {
            status.conditions.push(missing_plugin_condition(&missing));
        }
        self.publish(status).await?;
        Ok(missing)
    }
}
