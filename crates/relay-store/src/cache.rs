//! Persistent cache interfaces and an in-memory implementation.
//!
//! Non-optimistic writers mirror every write to a [`CacheWriter`]. Values
//! are passed in their cache form: scalars as-is, links as
//! `{"__dataID__": id}`, plural links as arrays of those, and ranges in
//! their serde JSON form under the `__range__` key.

use indexmap::IndexMap;
use relay_core::interface::metadata;
use relay_core::{Call, DataId, FieldValue, Range, Record};
use serde_json::{Map, Value};
use tracing::warn;

/// Write-through sink for confirmed record data.
pub trait CacheWriter {
    /// Writes a whole node. `None` marks the node as deleted.
    fn write_node(&mut self, id: &DataId, record: Option<&Record>);

    fn write_field(&mut self, id: &DataId, storage_key: &str, value: &Value, type_name: Option<&str>);

    fn write_root_call(&mut self, storage_key: &str, identifying_arg: &str, id: &DataId);
}

/// A persistent cache that can be written through and read back.
pub trait CacheManager {
    /// The writer for query payloads.
    fn query_writer(&mut self) -> &mut dyn CacheWriter;

    /// The writer for confirmed mutation payloads.
    fn mutation_writer(&mut self) -> &mut dyn CacheWriter;

    /// Reads a node: `None` if the cache has never seen it, `Some(None)` if
    /// it was cached as deleted.
    fn read_node(&self, id: &DataId) -> Option<Option<Record>>;

    fn read_root_call(&self, storage_key: &str, identifying_arg: &str) -> Option<DataId>;
}

/// Cache form of a field value.
pub fn field_to_cache_value(value: &FieldValue) -> Value {
    match value {
        FieldValue::Scalar(value) => value.clone(),
        FieldValue::Link(id) => link_value(id),
        FieldValue::LinkList(ids) => Value::Array(ids.iter().map(link_value).collect()),
    }
}

fn link_value(id: &DataId) -> Value {
    let mut object = Map::new();
    object.insert(metadata::DATA_ID.to_string(), Value::String(id.to_string()));
    Value::Object(object)
}

fn link_of(value: &Value) -> Option<DataId> {
    let object = value.as_object()?;
    if object.len() != 1 {
        return None;
    }
    object
        .get(metadata::DATA_ID)
        .and_then(Value::as_str)
        .map(DataId::from)
}

/// Inverse of [`field_to_cache_value`].
pub fn field_from_cache_value(value: Value) -> FieldValue {
    if let Some(id) = link_of(&value) {
        return FieldValue::Link(id);
    }
    if let Value::Array(items) = &value {
        if !items.is_empty() {
            let links: Option<Vec<DataId>> = items.iter().map(link_of).collect();
            if let Some(links) = links {
                return FieldValue::LinkList(links);
            }
        }
    }
    FieldValue::Scalar(value)
}

/// One cached node as written field by field.
#[derive(Debug, Clone, Default)]
struct CachedNode {
    type_name: Option<String>,
    fields: Map<String, Value>,
}

/// Cache kept in process memory. Useful for tests and for warming a fresh
/// store from another one.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    nodes: IndexMap<DataId, Option<CachedNode>>,
    root_calls: IndexMap<String, IndexMap<String, DataId>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        InMemoryCache::default()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// The raw cached value of one field.
    pub fn field(&self, id: &DataId, storage_key: &str) -> Option<&Value> {
        self.nodes.get(id)?.as_ref()?.fields.get(storage_key)
    }

    fn to_record(id: &DataId, node: &CachedNode) -> Record {
        let mut record = Record::new(id.clone(), node.type_name.clone());
        for (key, value) in &node.fields {
            match key.as_str() {
                metadata::DATA_ID => {}
                metadata::TYPENAME => {
                    if record.type_name().is_none() {
                        record.set_type_name(value.as_str().map(str::to_string));
                    }
                    record.set_field(key.clone(), FieldValue::Scalar(value.clone()));
                }
                metadata::FORCE_INDEX => {
                    if let Some(force) = value.as_i64() {
                        record.set_force_index(force);
                    }
                }
                metadata::FILTER_CALLS => match serde_json::from_value::<Vec<Call>>(value.clone()) {
                    Ok(calls) => record.set_filter_calls(calls),
                    Err(err) => warn!(%id, %err, "unreadable cached filter calls"),
                },
                metadata::RANGE => match serde_json::from_value::<Range>(value.clone()) {
                    Ok(range) => record.set_range(range),
                    Err(err) => warn!(%id, %err, "unreadable cached range"),
                },
                _ => {
                    record.set_field(key.clone(), field_from_cache_value(value.clone()));
                }
            }
        }
        record
    }
}

impl CacheWriter for InMemoryCache {
    fn write_node(&mut self, id: &DataId, record: Option<&Record>) {
        let node = record.map(|record| {
            let mut fields = Map::new();
            for (key, value) in record.fields() {
                fields.insert(key.to_string(), field_to_cache_value(value));
            }
            CachedNode {
                type_name: record.type_name().map(str::to_string),
                fields,
            }
        });
        self.nodes.insert(id.clone(), node);
    }

    fn write_field(&mut self, id: &DataId, storage_key: &str, value: &Value, type_name: Option<&str>) {
        let slot = self.nodes.entry(id.clone()).or_insert(None);
        let node = slot.get_or_insert_with(CachedNode::default);
        if let Some(type_name) = type_name {
            node.type_name = Some(type_name.to_string());
        }
        node.fields.insert(storage_key.to_string(), value.clone());
    }

    fn write_root_call(&mut self, storage_key: &str, identifying_arg: &str, id: &DataId) {
        self.root_calls
            .entry(storage_key.to_string())
            .or_default()
            .insert(identifying_arg.to_string(), id.clone());
    }
}

impl CacheManager for InMemoryCache {
    fn query_writer(&mut self) -> &mut dyn CacheWriter {
        self
    }

    fn mutation_writer(&mut self) -> &mut dyn CacheWriter {
        self
    }

    fn read_node(&self, id: &DataId) -> Option<Option<Record>> {
        self.nodes
            .get(id)
            .map(|node| node.as_ref().map(|node| Self::to_record(id, node)))
    }

    fn read_root_call(&self, storage_key: &str, identifying_arg: &str) -> Option<DataId> {
        self.root_calls.get(storage_key)?.get(identifying_arg).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn links_survive_the_cache_form() {
        let link = FieldValue::Link("4".into());
        let links = FieldValue::LinkList(vec!["1".into(), "2".into()]);
        let scalar = FieldValue::Scalar(json!({"x": 1}));

        assert_eq!(field_from_cache_value(field_to_cache_value(&link)), link);
        assert_eq!(field_from_cache_value(field_to_cache_value(&links)), links);
        assert_eq!(field_from_cache_value(field_to_cache_value(&scalar)), scalar);
    }

    #[test]
    fn fields_reassemble_into_records() {
        let mut cache = InMemoryCache::new();
        let id = DataId::from("4");
        cache.write_field(&id, metadata::DATA_ID, &json!("4"), Some("User"));
        cache.write_field(&id, "name", &json!("Zuck"), None);
        cache.write_field(&id, "friends", &json!({"__dataID__": "client:0"}), None);
        cache.write_field(&id, metadata::FORCE_INDEX, &json!(3), None);

        let record = cache.read_node(&id).unwrap().unwrap();
        assert_eq!(record.type_name(), Some("User"));
        assert_eq!(record.field("name"), Some(&FieldValue::from(json!("Zuck"))));
        assert_eq!(record.field("friends"), Some(&FieldValue::Link("client:0".into())));
        assert_eq!(record.force_index(), Some(3));
        assert!(!record.has_field(metadata::DATA_ID));
    }

    #[test]
    fn deleted_and_unknown_nodes_differ() {
        let mut cache = InMemoryCache::new();
        cache.write_node(&"gone".into(), None);
        assert_eq!(cache.read_node(&"gone".into()), Some(None));
        assert_eq!(cache.read_node(&"never".into()), None);
    }

    #[test]
    fn root_calls_round_trip() {
        let mut cache = InMemoryCache::new();
        cache.write_root_call("viewer", "", &"client:0".into());
        assert_eq!(cache.read_root_call("viewer", ""), Some("client:0".into()));
        assert_eq!(cache.read_root_call("viewer", "x"), None);
    }
}
