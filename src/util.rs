//! Small JSON helpers shared by the dispatcher, the poller and the CLI

use serde_json::Value;

/// Follow a key path through nested objects. Nulls count as missing.
pub fn get_path<'a, S: AsRef<str>>(value: &'a Value, path: &[S]) -> Option<&'a Value> {
    let mut current = value;
    for part in path {
        current = current.as_object()?.get(part.as_ref())?;
        if current.is_null() {
            return None;
        }
    }
    Some(current)
}

/// Split a dot-notation path (`status.state`)
pub fn parse_path(path: &str) -> Vec<String> {
    path.split('.')
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Whether a response carries nothing worth looking into
pub fn is_empty_response(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// First element of a non-empty array, otherwise the value itself
pub fn first_item_if_exists(value: Value) -> Value {
    match value {
        Value::Array(mut items) if !items.is_empty() => items.swap_remove(0),
        other => other,
    }
}

/// Pull one key out of every object in a list, skipping those without it
pub fn filter_by_key(items: &[Value], key: &str) -> Vec<Value> {
    items
        .iter()
        .filter_map(|item| item.get(key).cloned())
        .collect()
}

/// Pretty JSON rendering
pub fn dumps(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
