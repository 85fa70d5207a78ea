//! Normalized records and the maps that hold them.
//!
//! A tier is a [`RecordMap`] where each id is in one of three states:
//! absent (unknown, never fetched), `None` (nonexistent, confirmed deleted)
//! or `Some(record)` (existent). The distinction drives fetching: unknown
//! data must be requested, nonexistent data must not.

use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::call::Call;
use crate::id::{ClientMutationId, DataId};
use crate::path::QueryPath;
use crate::range::{QueuedRangeOperation, Range};
use crate::value::FieldValue;

/// One record tier.
pub type RecordMap = IndexMap<DataId, Option<Record>>;

/// Root field storage key → identifying argument key → record id.
///
/// Root calls without an identifying argument use [`EMPTY_ROOT_CALL_ARG`].
pub type RootCallMap = IndexMap<String, IndexMap<String, DataId>>;

/// Node id → ids of the connections that hold an edge to it.
pub type NodeConnectionMap = IndexMap<DataId, IndexSet<DataId>>;

/// Root-call index key for root fields with no identifying argument.
pub const EMPTY_ROOT_CALL_ARG: &str = "";

/// Result of [`RecordState`] lookups across tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordState {
    Unknown,
    Existent,
    Nonexistent,
}

/// Status bits carried by a record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordStatus(u8);

impl RecordStatus {
    const OPTIMISTIC: u8 = 1;
    const ERROR: u8 = 1 << 1;

    pub fn is_optimistic(self) -> bool {
        self.0 & Self::OPTIMISTIC != 0
    }

    pub fn has_error(self) -> bool {
        self.0 & Self::ERROR != 0
    }

    pub fn set_optimistic(&mut self, on: bool) {
        self.set(Self::OPTIMISTIC, on);
    }

    pub fn set_error(&mut self, on: bool) {
        self.set(Self::ERROR, on);
    }

    fn set(&mut self, bit: u8, on: bool) {
        if on {
            self.0 |= bit;
        } else {
            self.0 &= !bit;
        }
    }
}

/// A normalized record: storage key → value, plus metadata that is never
/// visible as application data.
///
/// The path is runtime-only. It references live query nodes and is skipped
/// when a record is serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    data_id: DataId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    type_name: Option<String>,
    #[serde(default)]
    fields: IndexMap<String, FieldValue>,
    #[serde(skip)]
    path: Option<Arc<QueryPath>>,
    #[serde(default, skip_serializing_if = "SmallVec::is_empty")]
    mutation_ids: SmallVec<[ClientMutationId; 2]>,
    #[serde(default, skip_serializing_if = "IndexSet::is_empty")]
    resolved_fragments: IndexSet<String>,
    #[serde(default)]
    fragment_generation: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    force_index: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    filter_calls: Option<Vec<Call>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    range: Option<Range>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    range_operations: Vec<QueuedRangeOperation>,
    #[serde(default)]
    status: RecordStatus,
}

impl Record {
    pub fn new(data_id: DataId, type_name: Option<String>) -> Self {
        Record {
            data_id,
            type_name,
            fields: IndexMap::new(),
            path: None,
            mutation_ids: SmallVec::new(),
            resolved_fragments: IndexSet::new(),
            fragment_generation: 0,
            force_index: None,
            filter_calls: None,
            range: None,
            range_operations: Vec::new(),
            status: RecordStatus::default(),
        }
    }

    pub fn data_id(&self) -> &DataId {
        &self.data_id
    }

    pub fn type_name(&self) -> Option<&str> {
        self.type_name.as_deref()
    }

    pub fn set_type_name(&mut self, type_name: Option<String>) {
        self.type_name = type_name;
    }

    pub fn field(&self, storage_key: &str) -> Option<&FieldValue> {
        self.fields.get(storage_key)
    }

    pub fn has_field(&self, storage_key: &str) -> bool {
        self.fields.contains_key(storage_key)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Stores `value`, returning the previous value under `storage_key`.
    pub fn set_field(&mut self, storage_key: impl Into<String>, value: FieldValue) -> Option<FieldValue> {
        self.fields.insert(storage_key.into(), value)
    }

    pub fn path(&self) -> Option<&Arc<QueryPath>> {
        self.path.as_ref()
    }

    pub fn set_path(&mut self, path: Option<Arc<QueryPath>>) {
        self.path = path;
    }

    // -- optimistic provenance --

    pub fn mutation_ids(&self) -> &[ClientMutationId] {
        &self.mutation_ids
    }

    /// Stamps the record as touched by `id`. Stamping twice is a no-op.
    pub fn add_mutation_id(&mut self, id: &ClientMutationId) {
        if !self.mutation_ids.contains(id) {
            self.mutation_ids.push(id.clone());
        }
    }

    pub fn status(&self) -> RecordStatus {
        self.status
    }

    pub fn status_mut(&mut self) -> &mut RecordStatus {
        &mut self.status
    }

    // -- deferred fragments --

    pub fn has_fragment_data(&self, fragment_id: &str) -> bool {
        self.resolved_fragments.contains(fragment_id)
    }

    pub fn mark_fragment_resolved(&mut self, fragment_id: &str) {
        self.resolved_fragments.insert(fragment_id.to_string());
    }

    pub fn fragment_generation(&self) -> u64 {
        self.fragment_generation
    }

    pub fn bump_fragment_generation(&mut self) {
        self.fragment_generation += 1;
    }

    // -- ranges --

    pub fn force_index(&self) -> Option<i64> {
        self.force_index
    }

    pub fn set_force_index(&mut self, force_index: i64) {
        self.force_index = Some(force_index);
    }

    pub fn filter_calls(&self) -> Option<&[Call]> {
        self.filter_calls.as_deref()
    }

    pub fn set_filter_calls(&mut self, calls: Vec<Call>) {
        self.filter_calls = Some(calls);
    }

    pub fn range(&self) -> Option<&Range> {
        self.range.as_ref()
    }

    pub fn range_mut(&mut self) -> Option<&mut Range> {
        self.range.as_mut()
    }

    pub fn set_range(&mut self, range: Range) {
        self.range = Some(range);
    }

    /// Optimistic operations queued against this connection, in submission
    /// order.
    pub fn range_operations(&self) -> &[QueuedRangeOperation] {
        &self.range_operations
    }

    pub fn push_range_operation(&mut self, op: QueuedRangeOperation) {
        self.range_operations.push(op);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{QueryIdGenerator, QueryRoot};
    use serde_json::json;

    #[test]
    fn status_bits_are_independent() {
        let mut status = RecordStatus::default();
        status.set_optimistic(true);
        status.set_error(true);
        status.set_optimistic(false);
        assert!(!status.is_optimistic());
        assert!(status.has_error());
    }

    #[test]
    fn mutation_ids_are_deduplicated() {
        let mut record = Record::new("1".into(), Some("User".into()));
        let m = ClientMutationId::from("m1");
        record.add_mutation_id(&m);
        record.add_mutation_id(&m);
        assert_eq!(record.mutation_ids(), &[m]);
    }

    #[test]
    fn path_is_not_serialized() {
        let root = QueryRoot::builder("viewer").build_with(&QueryIdGenerator::new());
        let mut record = Record::new("client:0".into(), Some("Viewer".into()));
        record.set_path(Some(Arc::new(QueryPath::create(&root))));
        record.set_field("name", FieldValue::from(json!("Zuck")));

        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("path").is_none());
        let back: Record = serde_json::from_value(json).unwrap();
        assert!(back.path().is_none());
        assert_eq!(back.field("name"), record.field("name"));
        assert_eq!(back.type_name(), Some("Viewer"));
    }

    #[test]
    fn nonexistent_and_unknown_are_distinct_in_a_map() {
        let mut map = RecordMap::new();
        map.insert("gone".into(), None);
        assert!(matches!(map.get("gone"), Some(None)));
        assert!(map.get("never").is_none());
        let json = serde_json::to_value(&map).unwrap();
        assert_eq!(json, json!({"gone": null}));
    }
}
