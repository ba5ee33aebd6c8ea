use std::collections::BTreeMap;

use serde_json::Map;
use serde_json::Value;
use xxhash_rust::xxh64::xxh64;

use crate::constants::EMPTY_HASH;
use crate::constants::HASHED_SECTIONS;
use crate::constants::HASH_LENGTH;

/// Key of the whole-document hash in the per-section hash map
pub const CONFIG_HASH_KEY: &str = "config";

/// Serializes `value` with object keys sorted at every level. `Map` is
/// ordered by key as long as serde_json's `preserve_order` stays off.
pub fn canonical_json(value: &Value) -> String {
    value.to_string()
}

/// `hex(xxh64(canonical_json(value)))` written twice, 32 characters
pub fn hash_part(value: &Value) -> String {
    let digest = xxh64(canonical_json(value).as_bytes(), 0);
    format!("{digest:016x}{digest:016x}")
}

/// Whole-table hash plus the per-section hashes it is folded from.
///
/// Only the legacy hashed sections take part; a missing or empty section
/// hashes to [`EMPTY_HASH`]. The returned map also carries the whole hash
/// under [`CONFIG_HASH_KEY`].
pub fn hash_config(table: &Map<String, Value>) -> (String, BTreeMap<String, String>) {
    let mut sections = Map::new();
    for section in HASHED_SECTIONS {
        let hash = match table.get(section) {
            Some(Value::Array(items)) if items.is_empty() => EMPTY_HASH.to_string(),
            Some(value) => hash_part(value),
            None => EMPTY_HASH.to_string(),
        };
        sections.insert(section.to_string(), Value::String(hash));
    }

    let config_hash = hash_part(&Value::Object(sections.clone()));

    let mut hashes: BTreeMap<String, String> = sections
        .into_iter()
        .filter_map(|(k, v)| v.as_str().map(|h| (k, h.to_string())))
        .collect();
    hashes.insert(CONFIG_HASH_KEY.to_string(), config_hash.clone());
    (config_hash, hashes)
}

/// 32 lowercase hex characters
pub fn is_valid_hash(hash: &str) -> bool {
    hash.len() == HASH_LENGTH && hash.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
