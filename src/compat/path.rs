//! Dotted field paths over JSON documents (`a.b.c`, numeric segments index
//! arrays).

use serde_json::Map;
use serde_json::Value;

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('.').filter(|s| !s.is_empty())
}

fn child<'a>(
    node: &'a Value,
    segment: &str,
) -> Option<&'a Value> {
    match node {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

fn child_mut<'a>(
    node: &'a mut Value,
    segment: &str,
) -> Option<&'a mut Value> {
    match node {
        Value::Object(map) => map.get_mut(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(move |i| items.get_mut(i)),
        _ => None,
    }
}

pub fn get<'a>(
    root: &'a Value,
    path: &str,
) -> Option<&'a Value> {
    segments(path).try_fold(root, child)
}

pub fn get_mut<'a>(
    root: &'a mut Value,
    path: &str,
) -> Option<&'a mut Value> {
    let mut node = root;
    for segment in segments(path) {
        node = child_mut(node, segment)?;
    }
    Some(node)
}

/// Removes the value at `path`, returning it. Missing paths are not an
/// error.
pub fn remove(
    root: &mut Value,
    path: &str,
) -> Option<Value> {
    let (parent, last) = match path.rsplit_once('.') {
        Some((parent, last)) => (get_mut(root, parent)?, last),
        None => (root, path),
    };
    match parent {
        Value::Object(map) => map.remove(last),
        Value::Array(items) => {
            let index = last.parse::<usize>().ok()?;
            (index < items.len()).then(|| items.remove(index))
        }
        _ => None,
    }
}

/// Sets `path` to `value`, creating intermediate objects. Returns false
/// when an intermediate node exists but is not an object.
pub fn set(
    root: &mut Value,
    path: &str,
    value: Value,
) -> bool {
    let parts: Vec<&str> = segments(path).collect();
    let Some((last, parents)) = parts.split_last() else {
        return false;
    };

    let mut node = root;
    for segment in parents {
        let Value::Object(map) = node else {
            return false;
        };
        node = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if node.is_null() {
            *node = Value::Object(Map::new());
        }
    }

    match node {
        Value::Object(map) => {
            map.insert(last.to_string(), value);
            true
        }
        _ => false,
    }
}

/// Null, `""`, `[]`, `{}` and absent values are empty
pub fn is_empty(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(Value::Object(map)) => map.is_empty(),
        Some(_) => false,
    }
}
