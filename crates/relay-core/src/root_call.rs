//! Identifying arguments of root calls and pairing them with payload
//! results.

use serde_json::{Map, Value};
use tracing::{error, warn};

use crate::call::stable_stringify;
use crate::error::CoreError;
use crate::interface::node;
use crate::query::QueryRoot;

/// One identifying argument value of a root call.
#[derive(Debug, Clone, PartialEq)]
pub struct RootCallArg {
    /// Root-call index key: the string itself, or stable JSON for other
    /// values. `None` when the root has no identifying argument.
    pub key: Option<String>,
    pub value: Value,
}

/// Calls `f` once per identifying argument value of `root`.
///
/// Array values are visited element-wise; a root without an identifying
/// argument is visited once with a `None` key. Roots bound to a batch call
/// have no literal arguments to visit.
pub fn for_each_root_call_arg(
    root: &QueryRoot,
    mut f: impl FnMut(RootCallArg),
) -> Result<(), CoreError> {
    if root.batch_call().is_some() {
        error!(query = root.name(), "cannot iterate over batch call variables");
        return Err(CoreError::BatchCallIteration {
            query: root.name().to_string(),
        });
    }
    visit(identifying_arg_value(root), &mut f);
    Ok(())
}

fn identifying_arg_value(root: &QueryRoot) -> Value {
    root.identifying_arg()
        .map(|arg| arg.value.clone())
        .unwrap_or(Value::Null)
}

fn visit(value: Value, f: &mut impl FnMut(RootCallArg)) {
    match value {
        Value::Array(items) => {
            for item in items {
                visit(item, f);
            }
        }
        Value::Null => f(RootCallArg { key: None, value }),
        Value::String(s) => f(RootCallArg {
            key: Some(s.clone()),
            value: Value::String(s),
        }),
        other => f(RootCallArg {
            key: Some(stable_stringify(&other)),
            value: other,
        }),
    }
}

/// Where a root result belongs in the root-call index.
#[derive(Debug, Clone, PartialEq)]
pub struct RootCallInfo {
    pub storage_key: String,
    pub identifying_arg_key: Option<String>,
    pub identifying_arg_value: Value,
}

/// One root result paired with its root-call position.
#[derive(Debug, Clone, PartialEq)]
pub struct RootCallResult<'a> {
    pub result: &'a Value,
    pub info: RootCallInfo,
}

static MISSING: Value = Value::Null;

/// Pairs each identifying argument of `root` with its entry in `payload`.
///
/// The payload is keyed by root field name. When the payload shape does not
/// match the argument (an array for a scalar argument or a length mismatch)
/// the root's results are skipped with a warning.
pub fn results_from_payload<'a>(root: &QueryRoot, payload: &'a Map<String, Value>) -> Vec<RootCallResult<'a>> {
    let field_name = root.field_name();
    let records = payload.get(field_name).unwrap_or(&MISSING);

    if root.batch_call().is_some() {
        return as_slice(records)
            .iter()
            .filter(|result| result.is_object())
            .filter_map(|result| match result.get(node::ID).and_then(Value::as_str) {
                Some(id) => Some(RootCallResult {
                    result,
                    info: RootCallInfo {
                        storage_key: node::NODE.to_string(),
                        identifying_arg_key: Some(id.to_string()),
                        identifying_arg_value: Value::String(id.to_string()),
                    },
                }),
                None => {
                    warn!(query = root.name(), "batch result without an `id` field; skipping");
                    None
                }
            })
            .collect();
    }

    let arg_value = root.identifying_arg().map(|arg| &arg.value);
    match (arg_value, records) {
        (Some(Value::Array(args)), Value::Array(results)) if args.len() != results.len() => {
            warn!(
                field = field_name,
                expected = args.len(),
                received = results.len(),
                "root payload arity does not match its arguments; skipping"
            );
            return Vec::new();
        }
        (Some(Value::Array(args)), other) if !other.is_array() => {
            warn!(
                field = field_name,
                expected = args.len(),
                "expected an array root payload, got a single result; skipping"
            );
            return Vec::new();
        }
        (arg, Value::Array(results)) if !matches!(arg, Some(Value::Array(_))) => {
            warn!(
                field = field_name,
                received = results.len(),
                "expected a single root payload, got an array; skipping"
            );
            return Vec::new();
        }
        _ => {}
    }

    let records = as_slice(records);
    let storage_key = root.storage_key().to_string();
    let mut results = Vec::new();
    let mut ii = 0;
    visit(identifying_arg_value(root), &mut |arg: RootCallArg| {
        let result = records.get(ii).unwrap_or(&MISSING);
        ii += 1;
        results.push(RootCallResult {
            result,
            info: RootCallInfo {
                storage_key: storage_key.clone(),
                identifying_arg_key: arg.key,
                identifying_arg_value: arg.value,
            },
        });
    });
    results
}

fn as_slice(value: &Value) -> &[Value] {
    match value {
        Value::Array(items) => items,
        other => std::slice::from_ref(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{BatchCall, QueryIdGenerator};
    use serde_json::json;

    fn root_with(arg: Value) -> QueryRoot {
        QueryRoot::builder("username")
            .identifying_arg("name", "String!", arg)
            .build_with(&QueryIdGenerator::new())
    }

    fn keys(root: &QueryRoot) -> Vec<Option<String>> {
        let mut keys = Vec::new();
        for_each_root_call_arg(root, |arg| keys.push(arg.key)).unwrap();
        keys
    }

    #[test]
    fn arrays_are_visited_element_wise() {
        let root = root_with(json!(["a", {"b": 1, "a": 2}, null]));
        assert_eq!(
            keys(&root),
            vec![Some("a".to_string()), Some(r#"{"a":2,"b":1}"#.to_string()), None]
        );
    }

    #[test]
    fn roots_without_identifying_arg_visit_once() {
        let root = QueryRoot::builder("viewer").build_with(&QueryIdGenerator::new());
        assert_eq!(keys(&root), vec![None]);
    }

    #[test]
    fn batch_calls_cannot_be_iterated() {
        let root = QueryRoot::builder("node")
            .batch_call(BatchCall {
                ref_param_name: "ref_q0".into(),
                source_query_id: "q0".into(),
                source_query_path: "$.*.id".into(),
            })
            .build_with(&QueryIdGenerator::new());
        let err = for_each_root_call_arg(&root, |_| {}).unwrap_err();
        assert!(matches!(err, CoreError::BatchCallIteration { .. }));
    }

    #[test]
    fn plural_results_pair_in_order() {
        let root = root_with(json!(["joe", "sue"]));
        let payload = json!({"username": [{"id": "1"}, {"id": "2"}]});
        let results = results_from_payload(&root, payload.as_object().unwrap());
        assert_eq!(results.len(), 2);
        assert_eq!(results[1].info.identifying_arg_key.as_deref(), Some("sue"));
        assert_eq!(results[1].result, &json!({"id": "2"}));
    }

    #[test]
    fn arity_mismatch_skips_results() {
        let root = root_with(json!(["joe", "sue"]));
        let payload = json!({"username": [{"id": "1"}]});
        assert!(results_from_payload(&root, payload.as_object().unwrap()).is_empty());

        let single = root_with(json!("joe"));
        let payload = json!({"username": [{"id": "1"}]});
        assert!(results_from_payload(&single, payload.as_object().unwrap()).is_empty());
    }

    #[test]
    fn missing_payload_pairs_with_null() {
        let root = root_with(json!("joe"));
        let payload = Map::new();
        let results = results_from_payload(&root, &payload);
        assert_eq!(results.len(), 1);
        assert!(results[0].result.is_null());
    }

    #[test]
    fn batch_roots_pair_results_by_id() {
        let root = QueryRoot::builder("node")
            .batch_call(BatchCall {
                ref_param_name: "ref_q0".into(),
                source_query_id: "q0".into(),
                source_query_path: "$.*.id".into(),
            })
            .build_with(&QueryIdGenerator::new());
        let payload = json!({"node": [{"id": "7"}, null, {"name": "no id"}]});
        let results = results_from_payload(&root, payload.as_object().unwrap());
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].info.storage_key, "node");
        assert_eq!(results[0].info.identifying_arg_key.as_deref(), Some("7"));
    }
}
