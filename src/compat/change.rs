//! Compatibility change model.
//!
//! A [`Change`] describes one transformation applied to payloads sent to
//! data planes older than its version ceiling. Changes are declared as
//! [`ChangeSpec`] data (see `catalog.json`) and validated into the sum-typed
//! [`Rule`] when registered.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use super::path;
use super::predicate::Predicate;
use crate::snapshot::EntityKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

impl Severity {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "warning" => Some(Severity::Warning),
            "error" => Some(Severity::Error),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entities a rule applies to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Plugin instances with the given name; field paths are relative to
    /// the plugin's `config`
    Plugin(String),
    /// Every entity of a core section; field paths are relative to the
    /// entity root
    Entity(EntityKind),
}

impl Target {
    pub fn section(&self) -> &'static str {
        match self {
            Target::Plugin(_) => EntityKind::Plugin.section(),
            Target::Entity(kind) => kind.section(),
        }
    }

    pub fn resource_type(&self) -> &'static str {
        match self {
            Target::Plugin(_) => EntityKind::Plugin.resource_type(),
            Target::Entity(kind) => kind.resource_type(),
        }
    }

    pub fn selects(
        &self,
        entity: &Value,
    ) -> bool {
        match self {
            Target::Plugin(name) => entity.get("name").and_then(Value::as_str) == Some(name.as_str()),
            Target::Entity(_) => true,
        }
    }

    /// Subtree rule field paths are resolved against
    pub fn scope<'a>(
        &self,
        entity: &'a Value,
    ) -> Option<&'a Value> {
        match self {
            Target::Plugin(_) => entity.get("config"),
            Target::Entity(_) => Some(entity),
        }
    }

    pub fn scope_mut<'a>(
        &self,
        entity: &'a mut Value,
    ) -> Option<&'a mut Value> {
        match self {
            Target::Plugin(_) => entity.get_mut("config"),
            Target::Entity(_) => Some(entity),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Target::Plugin(name) => write!(f, "plugin {name}"),
            Target::Entity(kind) => write!(f, "{kind}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpdateAction {
    Literal(Value),
    CopyFrom(String),
    Remove,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldUpdate {
    pub field: String,
    pub action: UpdateAction,
    /// Only touch the destination when it is empty
    pub must_be_empty: bool,
}

/// Drops the elements of the array at `field` that match `predicate`
#[derive(Debug, Clone, PartialEq)]
pub struct ElementFilter {
    pub field: String,
    pub predicate: Predicate,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    RemoveFields {
        target: Target,
        fields: Vec<String>,
    },
    RemoveElements {
        target: Target,
        filters: Vec<ElementFilter>,
    },
    UpdateFields {
        target: Target,
        condition: Option<Predicate>,
        updates: Vec<FieldUpdate>,
    },
    RemoveEntity {
        target: Target,
    },
}

impl Rule {
    pub fn target(&self) -> &Target {
        match self {
            Rule::RemoveFields { target, .. }
            | Rule::RemoveElements { target, .. }
            | Rule::UpdateFields { target, .. }
            | Rule::RemoveEntity { target } => target,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Rule::RemoveFields { .. } => "remove_fields",
            Rule::RemoveElements { .. } => "remove_elements",
            Rule::UpdateFields { .. } => "update_fields",
            Rule::RemoveEntity { .. } => "remove_entity",
        }
    }
}

/// A transformation is benign when the original value of `field` (scoped
/// like the rule's paths) equals `equals`, e.g. a removed field that only
/// held its default.
#[derive(Debug, Clone, PartialEq)]
pub struct BenignCheck {
    pub field: String,
    pub equals: Value,
}

impl BenignCheck {
    pub fn holds(
        &self,
        scope: Option<&Value>,
    ) -> bool {
        match scope.and_then(|s| path::get(s, &self.field)) {
            Some(value) => *value == self.equals,
            None => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    pub id: String,
    pub severity: Severity,
    pub description: String,
    pub resolution: String,
    pub doc_url: Option<String>,
    /// Applied to data planes strictly below this encoded version
    pub version_ceiling: u64,
    pub rule: Rule,
    pub benign: Option<BenignCheck>,
}

// -
// Declarative form

#[derive(Debug, Clone, Deserialize)]
pub struct ChangeSpec {
    pub id: String,
    pub severity: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub resolution: String,
    #[serde(default)]
    pub doc_url: Option<String>,
    pub version_ceiling: u64,
    pub rule: RuleSpec,
    #[serde(default)]
    pub benign_when: Option<BenignSpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleSpec {
    RemoveFields {
        #[serde(default)]
        plugin: Option<String>,
        #[serde(default)]
        section: Option<String>,
        fields: Vec<String>,
    },
    RemoveElements {
        #[serde(default)]
        plugin: Option<String>,
        #[serde(default)]
        section: Option<String>,
        filters: Vec<ElementFilterSpec>,
    },
    UpdateFields {
        #[serde(default)]
        plugin: Option<String>,
        #[serde(default)]
        section: Option<String>,
        #[serde(default)]
        condition: Option<String>,
        updates: Vec<FieldUpdateSpec>,
    },
    RemoveEntity {
        #[serde(default)]
        plugin: Option<String>,
        #[serde(default)]
        section: Option<String>,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct ElementFilterSpec {
    pub field: String,
    pub predicate: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldUpdateSpec {
    pub field: String,
    #[serde(default)]
    pub literal_value: Option<Value>,
    #[serde(default)]
    pub copy_from_field: Option<String>,
    #[serde(default)]
    pub remove: bool,
    #[serde(default)]
    pub must_be_empty: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BenignSpec {
    pub field: String,
    pub equals: Value,
}
