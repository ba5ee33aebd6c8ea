use std::sync::Arc;

use bytes::Bytes;
#[cfg(test)]
use mockall::automock;
use serde_json::Map;
use serde_json::Value;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use super::change::Change;
use super::change::FieldUpdate;
use super::change::Rule;
use super::change::UpdateAction;
use super::path;
use super::registry::ChangeRegistry;
use super::report::ChangeReport;
use super::report::Resource;
use super::version::DataPlaneVersion;
use crate::snapshot::Envelope;
use crate::CompatError;

/// Hook run after the catalog changes, receiving the downgraded config table
/// as JSON text and returning the replacement table as JSON text.
#[cfg_attr(test, automock)]
pub trait ExtraProcessor: Send + Sync + 'static {
    fn process(
        &self,
        document: &str,
        dp_version: &str,
        report: &ChangeReport,
    ) -> std::result::Result<String, String>;
}

/// Payload downgraded for one data-plane version
#[derive(Debug, Clone, PartialEq)]
pub struct CompatOutput {
    pub payload: Bytes,
    pub report: ChangeReport,
}

/// Downgrades payloads for data planes older than the control plane.
pub struct CompatProcessor {
    registry: Arc<ChangeRegistry>,
    cp_version: DataPlaneVersion,
    extra: Option<Arc<dyn ExtraProcessor>>,
}

impl std::fmt::Debug for CompatProcessor {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("CompatProcessor")
            .field("cp_version", &self.cp_version)
            .field("changes", &self.registry.len())
            .field("extra", &self.extra.is_some())
            .finish()
    }
}

impl CompatProcessor {
    pub fn new(
        registry: Arc<ChangeRegistry>,
        cp_version: DataPlaneVersion,
    ) -> Self {
        Self {
            registry,
            cp_version,
            extra: None,
        }
    }

    pub fn with_extra_processor(
        mut self,
        extra: Arc<dyn ExtraProcessor>,
    ) -> Self {
        self.extra = Some(extra);
        self
    }

    pub fn cp_version(&self) -> &DataPlaneVersion {
        &self.cp_version
    }

    /// Applies every change whose ceiling is above `dp_version` to
    /// `payload`.
    ///
    /// Data planes at or above the control-plane version get `payload`
    /// back untouched with an empty report. The envelope's `config_hash`
    /// and `hashes` are carried over unchanged so that hash comparisons
    /// stay against the control plane's canonical snapshot.
    pub fn process(
        &self,
        dp_version: &str,
        payload: &Bytes,
    ) -> std::result::Result<CompatOutput, CompatError> {
        let version = DataPlaneVersion::parse(dp_version)?;
        if version >= self.cp_version {
            return Ok(CompatOutput {
                payload: payload.clone(),
                report: ChangeReport::new(),
            });
        }

        let mut envelope = Envelope::decode(payload)?;
        let mut report = ChangeReport::new();

        for change in self.registry.applicable(&version) {
            if let Err(reason) = apply_change(&mut envelope.config_table, change, &mut report) {
                warn!(change = %change.id, %dp_version, "compatibility change skipped: {}", reason);
            }
        }

        if let Some(extra) = &self.extra {
            let document = serde_json::to_string(&envelope.config_table)
                .map_err(|e| CompatError::InvalidDocument(e.to_string()))?;
            let processed = extra
                .process(&document, dp_version, &report)
                .map_err(CompatError::InvalidDocument)?;
            match serde_json::from_str::<Value>(&processed) {
                Ok(Value::Object(table)) => envelope.config_table = table,
                Ok(other) => {
                    return Err(CompatError::ExtraProcessingInvalid(format!(
                        "expected a JSON object, got {}",
                        json_type(&other)
                    )))
                }
                Err(e) => return Err(CompatError::ExtraProcessingInvalid(e.to_string())),
            }
        }

        let encoded = envelope
            .encode()
            .map_err(|e| CompatError::InvalidDocument(e.to_string()))?;

        debug!(%dp_version, changes = report.len(), "payload downgraded");
        Ok(CompatOutput {
            payload: Bytes::from(encoded),
            report,
        })
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn entity_id(entity: &Value) -> &str {
    entity.get("id").and_then(Value::as_str).unwrap_or_default()
}

/// Applies one change to the config table, recording what it touched.
pub(crate) fn apply_change(
    table: &mut Map<String, Value>,
    change: &Change,
    report: &mut ChangeReport,
) -> std::result::Result<(), String> {
    let target = change.rule.target();
    let section = target.section();

    let entities = match table.get_mut(section) {
        None => return Ok(()),
        Some(Value::Array(entities)) => entities,
        Some(other) => return Err(format!("section {section} is a {}, not an array", json_type(other))),
    };

    if let Rule::RemoveEntity { .. } = &change.rule {
        entities.retain(|entity| {
            if !target.selects(entity) {
                return true;
            }
            report.add(&change.id, Resource::new(target.resource_type(), entity_id(entity)));
            false
        });
        if entities.is_empty() {
            table.remove(section);
        }
        return Ok(());
    }

    for entity in entities.iter_mut().filter(|e| target.selects(e)) {
        let before = entity.clone();
        if let Some(scope) = target.scope_mut(entity) {
            apply_rule(&change.rule, scope, &change.id);
        }
        if *entity == before {
            continue;
        }

        let benign = change
            .benign
            .as_ref()
            .is_some_and(|check| check.holds(target.scope(&before)));
        if benign {
            trace!(change = %change.id, id = entity_id(entity), "benign change not reported");
            continue;
        }
        report.add(&change.id, Resource::new(target.resource_type(), entity_id(entity)));
    }

    Ok(())
}

fn apply_rule(
    rule: &Rule,
    scope: &mut Value,
    change_id: &str,
) {
    match rule {
        Rule::RemoveFields { fields, .. } => {
            for field in fields {
                path::remove(scope, field);
            }
        }
        Rule::RemoveElements { filters, .. } => {
            for filter in filters {
                match path::get_mut(scope, &filter.field) {
                    Some(Value::Array(items)) => items.retain(|item| !filter.predicate.matches(item)),
                    Some(_) => debug!(change = change_id, "{} is not an array, nothing to filter", filter.field),
                    None => {}
                }
            }
        }
        Rule::UpdateFields {
            condition, updates, ..
        } => {
            if condition.as_ref().is_some_and(|c| !c.matches(scope)) {
                return;
            }
            for update in updates {
                apply_update(update, scope, change_id);
            }
        }
        Rule::RemoveEntity { .. } => {}
    }
}

fn apply_update(
    update: &FieldUpdate,
    scope: &mut Value,
    change_id: &str,
) {
    if update.must_be_empty && !path::is_empty(path::get(scope, &update.field)) {
        return;
    }

    let value = match &update.action {
        UpdateAction::Remove => {
            path::remove(scope, &update.field);
            return;
        }
        UpdateAction::Literal(value) => value.clone(),
        UpdateAction::CopyFrom(source) => match path::get(scope, source) {
            Some(value) if !path::is_empty(Some(value)) => value.clone(),
            _ => {
                debug!(
                    change = change_id,
                    "copy source {} is empty, {} left unchanged", source, update.field
                );
                return;
            }
        },
    };

    if !path::set(scope, &update.field, value) {
        warn!(change = change_id, "cannot set {}: parent is not an object", update.field);
    }
}
