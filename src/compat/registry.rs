use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use super::change::BenignCheck;
use super::change::Change;
use super::change::ElementFilter;
use super::change::ChangeSpec;
use super::change::FieldUpdate;
use super::change::FieldUpdateSpec;
use super::change::Rule;
use super::change::RuleSpec;
use super::change::Severity;
use super::change::Target;
use super::change::UpdateAction;
use super::predicate::Predicate;
use super::version::DataPlaneVersion;
use crate::snapshot::EntityKind;
use crate::RegistryError;

/// Embedded catalog of every compatibility change the control plane knows.
const DEFAULT_CATALOG: &str = include_str!("catalog.json");

/// Catalog of compatibility changes, indexed by id and by version ceiling.
///
/// Built once at startup and shared read-only afterwards.
#[derive(Debug, Default)]
pub struct ChangeRegistry {
    by_id: HashMap<String, Arc<Change>>,
    /// Ceiling → changes in registration order
    by_version: BTreeMap<u64, Vec<Arc<Change>>>,
}

impl ChangeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the embedded catalog
    pub fn with_default_catalog() -> Result<Self, RegistryError> {
        Self::from_catalog_json(DEFAULT_CATALOG)
    }

    pub fn from_catalog_json(json: &str) -> Result<Self, RegistryError> {
        let specs: Vec<ChangeSpec> = serde_json::from_str(json)?;
        let mut registry = Self::new();
        registry.register_all(specs)?;
        debug!("registered {} compatibility changes", registry.len());
        Ok(registry)
    }

    pub fn register(
        &mut self,
        spec: ChangeSpec,
    ) -> Result<(), RegistryError> {
        let change = validate(spec)?;
        if self.by_id.contains_key(&change.id) {
            return Err(RegistryError::DuplicateId(change.id));
        }

        let change = Arc::new(change);
        self.by_version
            .entry(change.version_ceiling)
            .or_default()
            .push(change.clone());
        self.by_id.insert(change.id.clone(), change);
        Ok(())
    }

    pub fn register_all(
        &mut self,
        specs: impl IntoIterator<Item = ChangeSpec>,
    ) -> Result<(), RegistryError> {
        for spec in specs {
            self.register(spec)?;
        }
        Ok(())
    }

    pub fn lookup(
        &self,
        id: &str,
    ) -> Option<&Arc<Change>> {
        self.by_id.get(id)
    }

    pub fn all_by_version(&self) -> &BTreeMap<u64, Vec<Arc<Change>>> {
        &self.by_version
    }

    /// Changes a data plane at `version` needs, ceiling ascending then
    /// registration order.
    pub fn applicable<'a>(
        &'a self,
        version: &'a DataPlaneVersion,
    ) -> impl Iterator<Item = &'a Arc<Change>> + 'a {
        self.by_version
            .iter()
            .filter(move |(ceiling, _)| version.is_below(**ceiling))
            .flat_map(|(_, changes)| changes.iter())
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

fn is_valid_id(id: &str) -> bool {
    let bytes = id.as_bytes();
    bytes.len() == 4
        && bytes[0].is_ascii_uppercase()
        && bytes[1..]
            .iter()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
}

fn validate(spec: ChangeSpec) -> Result<Change, RegistryError> {
    let id = spec.id;
    let invalid = |reason: String| RegistryError::InvalidChange {
        id: id.clone(),
        reason,
    };

    if !is_valid_id(&id) {
        return Err(invalid("id must match ^[A-Z][A-Z0-9]{3}$".into()));
    }
    let severity =
        Severity::parse(&spec.severity).ok_or_else(|| invalid(format!("unknown severity {:?}", spec.severity)))?;
    if spec.description.trim().is_empty() {
        return Err(invalid("description is required".into()));
    }
    if spec.resolution.trim().is_empty() {
        return Err(invalid("resolution is required".into()));
    }
    if spec.version_ceiling == 0 {
        return Err(invalid("version_ceiling must be positive".into()));
    }

    let rule = build_rule(spec.rule).map_err(&invalid)?;

    let benign = match spec.benign_when {
        Some(benign) => {
            // Only field-level rules leave an original value to compare
            if matches!(rule, Rule::RemoveEntity { .. }) {
                return Err(invalid("benign_when cannot be used with remove_entity".into()));
            }
            if benign.field.trim().is_empty() {
                return Err(invalid("benign_when.field is required".into()));
            }
            Some(BenignCheck {
                field: benign.field,
                equals: benign.equals,
            })
        }
        None => None,
    };

    Ok(Change {
        id,
        severity,
        description: spec.description,
        resolution: spec.resolution,
        doc_url: spec.doc_url,
        version_ceiling: spec.version_ceiling,
        rule,
        benign,
    })
}

fn build_target(
    plugin: Option<String>,
    section: Option<String>,
) -> Result<Target, String> {
    match (plugin, section) {
        (Some(_), Some(_)) => Err("rule names both a plugin and a section".into()),
        (None, None) => Err("rule needs a plugin or a section".into()),
        (Some(name), None) => {
            if name.trim().is_empty() {
                return Err("plugin name is empty".into());
            }
            Ok(Target::Plugin(name))
        }
        (None, Some(section)) => EntityKind::from_section(&section)
            .map(Target::Entity)
            .ok_or_else(|| format!("unknown section {section:?}")),
    }
}

fn check_fields<'a>(fields: impl IntoIterator<Item = &'a String>) -> Result<(), String> {
    let mut any = false;
    for field in fields {
        any = true;
        if field.trim().is_empty() || field.split('.').any(str::is_empty) {
            return Err(format!("malformed field path {field:?}"));
        }
    }
    if any {
        Ok(())
    } else {
        Err("rule has no fields".into())
    }
}

fn parse_predicate(raw: &str) -> Result<Predicate, String> {
    Predicate::parse(raw).map_err(|e| format!("bad predicate {raw:?}: {e}"))
}

fn build_update(spec: FieldUpdateSpec) -> Result<FieldUpdate, String> {
    let action = match (spec.literal_value, spec.copy_from_field, spec.remove) {
        (Some(_), Some(_), _) => {
            return Err(format!(
                "update of {} sets both literal_value and copy_from_field",
                spec.field
            ))
        }
        (Some(_), None, true) | (None, Some(_), true) => {
            return Err(format!("update of {} both removes and sets a value", spec.field))
        }
        (Some(value), None, false) => UpdateAction::Literal(value),
        (None, Some(source), false) => {
            check_fields([&source])?;
            UpdateAction::CopyFrom(source)
        }
        (None, None, true) => UpdateAction::Remove,
        (None, None, false) => return Err(format!("update of {} has no action", spec.field)),
    };

    Ok(FieldUpdate {
        field: spec.field,
        action,
        must_be_empty: spec.must_be_empty,
    })
}

fn build_rule(spec: RuleSpec) -> Result<Rule, String> {
    match spec {
        RuleSpec::RemoveFields {
            plugin,
            section,
            fields,
        } => {
            let target = build_target(plugin, section)?;
            check_fields(&fields)?;
            Ok(Rule::RemoveFields { target, fields })
        }
        RuleSpec::RemoveElements {
            plugin,
            section,
            filters,
        } => {
            let target = build_target(plugin, section)?;
            check_fields(filters.iter().map(|f| &f.field))?;
            let filters = filters
                .into_iter()
                .map(|f| {
                    Ok(ElementFilter {
                        predicate: parse_predicate(&f.predicate)?,
                        field: f.field,
                    })
                })
                .collect::<Result<Vec<_>, String>>()?;
            Ok(Rule::RemoveElements { target, filters })
        }
        RuleSpec::UpdateFields {
            plugin,
            section,
            condition,
            updates,
        } => {
            let target = build_target(plugin, section)?;
            check_fields(updates.iter().map(|u| &u.field))?;
            let condition = condition.as_deref().map(parse_predicate).transpose()?;
            let updates = updates.into_iter().map(build_update).collect::<Result<Vec<_>, _>>()?;
            Ok(Rule::UpdateFields {
                target,
                condition,
                updates,
            })
        }
        RuleSpec::RemoveEntity { plugin, section } => {
            let target = build_target(plugin, section)?;
            if matches!(target, Target::Entity(EntityKind::Plugin)) {
                return Err("remove_entity on plugins must name a plugin".into());
            }
            Ok(Rule::RemoveEntity { target })
        }
    }
}
