//! Flattening of Chargify's bracket-notation webhook form fields.
//!
//! Chargify posts webhooks as `application/x-www-form-urlencoded` with keys
//! such as `payload[subscription][customer][email]`. They are rebuilt here
//! into nested JSON objects.

use serde_json::{Map, Value};

/// Splits `a[b][c]` into `["a", "b", "c"]`.
fn split_key(key: &str) -> Vec<&str> {
    key.split('[')
        .map(|part| part.trim_matches(|c| c == '[' || c == ']'))
        .collect()
}

/// `"true"` and `"false"` become booleans, everything else stays a string.
fn cast_value(value: &str) -> Value {
    match value {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        other => Value::String(other.to_string()),
    }
}

fn insert_path(map: &mut Map<String, Value>, keys: &[&str], value: Value) {
    match keys {
        [] => {}
        [leaf] => {
            map.insert(leaf.to_string(), value);
        }
        [head, rest @ ..] => {
            let entry = map
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            if let Value::Object(child) = entry {
                insert_path(child, rest, value);
            }
        }
    }
}

/// Rebuilds nested objects from decoded form pairs.
///
/// Later pairs win: a nested key replaces an earlier scalar stored at the
/// same node, and a repeated leaf key keeps its last value.
pub fn parse_webhook_params<K, V, I>(pairs: I) -> Map<String, Value>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut root = Map::new();
    for (key, value) in pairs {
        let keys = split_key(key.as_ref());
        insert_path(&mut root, &keys, cast_value(value.as_ref()));
    }
    root
}

/// Decodes a raw form body and parses it.
pub fn parse_webhook_body(body: &[u8]) -> Map<String, Value> {
    parse_webhook_params(url::form_urlencoded::parse(body))
}
