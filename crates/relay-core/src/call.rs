//! Field and root-call arguments ("calls").
//!
//! A call is a named argument with a JSON value. Calls come in two flavors:
//! *core* calls change which results are returned (`orderby: "recent"`),
//! while pagination calls (`first`, `after`, ...) only select a window of
//! them. Storage keys and range segments are keyed by core calls only.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::interface::connection;

/// A single named argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
    pub name: String,
    pub value: Value,
}

impl Call {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Call {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Returns the value as an unsigned count, if it is one.
    pub fn as_count(&self) -> Option<usize> {
        match &self.value {
            Value::Number(n) => n.as_u64().map(|n| n as usize),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Returns the value as a cursor string, if it is one.
    pub fn as_cursor(&self) -> Option<&str> {
        self.value.as_str()
    }
}

/// Returns true for pagination calls that never affect which edges exist.
pub fn is_connection_call(call: &Call) -> bool {
    connection::CONNECTION_CALLS.contains(&call.name.as_str())
}

/// Filters `calls` to the core calls used as a range's identity.
pub fn filter_calls(calls: &[Call]) -> Vec<Call> {
    calls
        .iter()
        .filter(|call| !is_connection_call(call))
        .cloned()
        .collect()
}

/// Canonical serialization of a set of calls, independent of call order.
///
/// Returns the empty string for no calls, otherwise a JSON object keyed by
/// call name with keys sorted at every depth.
pub fn serialize_calls(calls: &[Call]) -> String {
    if calls.is_empty() {
        return String::new();
    }
    let mut sorted: Vec<&Call> = calls.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));
    let mut out = String::from("{");
    for (ii, call) in sorted.iter().enumerate() {
        if ii > 0 {
            out.push(',');
        }
        write_json_string(&mut out, &call.name);
        out.push(':');
        write_stable(&mut out, &call.value);
    }
    out.push('}');
    out
}

/// Serializes a JSON value with object keys sorted at every depth.
pub fn stable_stringify(value: &Value) -> String {
    let mut out = String::new();
    write_stable(&mut out, value);
    out
}

fn write_stable(out: &mut String, value: &Value) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (ii, key) in keys.iter().enumerate() {
                if ii > 0 {
                    out.push(',');
                }
                write_json_string(out, key);
                out.push(':');
                write_stable(out, &map[key.as_str()]);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (ii, item) in items.iter().enumerate() {
                if ii > 0 {
                    out.push(',');
                }
                write_stable(out, item);
            }
            out.push(']');
        }
        other => {
            let _ = write!(out, "{}", other);
        }
    }
}

fn write_json_string(out: &mut String, s: &str) {
    let _ = write!(out, "{}", Value::String(s.to_string()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serialization_ignores_call_order() {
        let a = vec![Call::new("orderby", "recent"), Call::new("type", "photo")];
        let b = vec![Call::new("type", "photo"), Call::new("orderby", "recent")];
        assert_eq!(serialize_calls(&a), serialize_calls(&b));
        assert_eq!(serialize_calls(&a), r#"{"orderby":"recent","type":"photo"}"#);
    }

    #[test]
    fn empty_calls_serialize_to_empty_string() {
        assert_eq!(serialize_calls(&[]), "");
    }

    #[test]
    fn nested_objects_are_sorted() {
        let value = json!({"b": 1, "a": {"d": [1, 2], "c": null}});
        assert_eq!(stable_stringify(&value), r#"{"a":{"c":null,"d":[1,2]},"b":1}"#);
    }

    #[test]
    fn pagination_calls_are_not_core() {
        let calls = vec![
            Call::new("first", 10),
            Call::new("after", "cursor1"),
            Call::new("orderby", "name"),
            Call::new("find", "x"),
        ];
        assert_eq!(filter_calls(&calls), vec![Call::new("orderby", "name")]);
    }

    #[test]
    fn counts_parse_from_numbers_and_strings() {
        assert_eq!(Call::new("first", 5).as_count(), Some(5));
        assert_eq!(Call::new("first", "7").as_count(), Some(7));
        assert_eq!(Call::new("first", true).as_count(), None);
    }
}
