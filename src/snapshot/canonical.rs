//! Canonical form of the config table.
//!
//! Foreign links become bare id strings, volatile fields are dropped, route
//! headers and vault configs are flattened, and the marker sections are
//! added. Canonicalizing an already canonical table changes nothing.

use serde_json::json;
use serde_json::Map;
use serde_json::Value;

use super::loader::LoadedEntities;
use super::EntityKind;
use crate::constants::CLUSTER_ID_PARAMETER;
use crate::constants::FORMAT_VERSION;
use crate::constants::FORMAT_VERSION_KEY;
use crate::constants::PARAMETERS_SECTION;
use crate::constants::TRANSFORM_KEY;
use crate::SnapshotError;

const FOREIGN_LINKS: [&str; 6] = [
    "service",
    "route",
    "upstream",
    "client_certificate",
    "consumer",
    "certificate",
];

const VAULT_VARIANTS: [&str; 4] = ["env", "aws", "gcp", "hcv"];

const UPDATED_AT: &str = "updated_at";

/// Builds the canonical config table of a cluster. Empty sections are
/// left out.
pub fn canonicalize(
    cluster_id: &str,
    entities: LoadedEntities,
) -> Result<Map<String, Value>, SnapshotError> {
    let mut table = Map::new();

    for (kind, list) in entities {
        if list.is_empty() {
            continue;
        }
        let list = list
            .into_iter()
            .map(|entity| canonicalize_entity(kind, entity))
            .collect::<Result<Vec<_>, _>>()?;
        table.insert(kind.section().to_string(), Value::Array(list));
    }

    table.insert(FORMAT_VERSION_KEY.to_string(), json!(FORMAT_VERSION));
    table.insert(TRANSFORM_KEY.to_string(), json!(false));
    table.insert(
        PARAMETERS_SECTION.to_string(),
        json!([{ "key": CLUSTER_ID_PARAMETER, "value": cluster_id }]),
    );
    Ok(table)
}

pub fn canonicalize_entity(
    kind: EntityKind,
    entity: Value,
) -> Result<Value, SnapshotError> {
    let violation = |reason: String| SnapshotError::ContractViolation {
        section: kind.section(),
        reason,
    };

    let Value::Object(mut fields) = entity else {
        return Err(violation("entity is not an object".to_string()));
    };

    for link in FOREIGN_LINKS {
        match fields.get(link) {
            None | Some(Value::String(_)) => {}
            Some(Value::Null) => {
                fields.remove(link);
            }
            Some(Value::Object(reference)) => match reference.get("id") {
                Some(Value::String(id)) => {
                    let id = id.clone();
                    fields.insert(link.to_string(), Value::String(id));
                }
                _ => return Err(violation(format!("{link} reference has no string id"))),
            },
            Some(_) => return Err(violation(format!("{link} reference is neither an object nor an id"))),
        }
    }

    if !kind.keeps_updated_at() {
        fields.remove(UPDATED_AT);
    }

    if kind == EntityKind::Route {
        if let Some(headers) = fields.get_mut("headers") {
            flatten_headers(headers).map_err(&violation)?;
        }
    }

    if kind == EntityKind::Vault {
        if let Some(config) = fields.get_mut("config") {
            flatten_vault_config(config).map_err(&violation)?;
        }
    }

    Ok(Value::Object(fields))
}

fn flatten_headers(headers: &mut Value) -> Result<(), String> {
    if headers.is_null() {
        return Ok(());
    }
    let Value::Object(map) = headers else {
        return Err("route headers are not an object".to_string());
    };

    for (name, value) in map.iter_mut() {
        let values = match value {
            Value::Array(_) => continue,
            Value::Object(wrapper) => match wrapper.remove("values") {
                Some(values @ Value::Array(_)) => values,
                _ => return Err(format!("header {name} has no values list")),
            },
            _ => return Err(format!("header {name} is neither a list nor a values wrapper")),
        };
        *value = values;
    }
    Ok(())
}

fn flatten_vault_config(config: &mut Value) -> Result<(), String> {
    let inner = match config {
        Value::Object(map) => {
            let populated: Vec<&str> = VAULT_VARIANTS
                .into_iter()
                .filter(|variant| map.get(*variant).is_some_and(Value::is_object))
                .collect();
            match populated.as_slice() {
                [] => None,
                [variant] => map.remove(*variant),
                many => return Err(format!("vault config populates several variants: {}", many.join(", "))),
            }
        }
        _ => None,
    };

    if let Some(inner) = inner {
        *config = inner;
    }
    Ok(())
}
