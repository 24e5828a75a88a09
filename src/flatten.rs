//! Nested JSON flattening into dotted key paths.
//!
//! `{"a": {"b": {"c": 5}}}` becomes `{"a.b.c": 5}`. Only objects are recursed
//! into; arrays and scalars are leaves. Empty objects contribute no keys.
//!
//! Two distinct paths can collide after joining (e.g. `{"a.b": 1}` and
//! `{"a": {"b": 2}}`); the value visited last wins and no error is raised.

use serde_json::{Map, Value};

/// Separator used for derived table column names.
pub const DEFAULT_SEPARATOR: &str = ".";

/// Flatten `map` with the default `.` separator.
pub fn flatten(map: &Map<String, Value>) -> Map<String, Value> {
    flatten_with(map, DEFAULT_SEPARATOR)
}

/// Flatten `map`, joining key paths with `separator`.
pub fn flatten_with(map: &Map<String, Value>, separator: &str) -> Map<String, Value> {
    let mut out = Map::new();
    flatten_into(map, None, separator, &mut out);
    out
}

fn flatten_into(
    map: &Map<String, Value>,
    parent: Option<&str>,
    separator: &str,
    out: &mut Map<String, Value>,
) {
    for (key, value) in map {
        let path = match parent {
            Some(p) => format!("{p}{separator}{key}"),
            None => key.clone(),
        };

        match value {
            Value::Object(child) => flatten_into(child, Some(&path), separator, out),
            leaf => {
                out.insert(path, leaf.clone());
            }
        }
    }
}
