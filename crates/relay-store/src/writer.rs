//! The record writer: all mutation of a single tier goes through here.
//!
//! A [`RecordWriter`] owns one tier (plus the shared root-call and
//! node-connection indexes) for the duration of a write pass. A writer
//! created with [`RecordWriter::optimistic`] stamps every record it touches
//! with its client mutation id, queues range operations instead of applying
//! them, and never writes to the persistent cache.

use std::sync::Arc;

use relay_core::interface::{connection, metadata, node};
use relay_core::{
    filter_calls, Call, ClientMutationId, DataId, FieldValue, Lookup, NodeConnectionMap, PageInfo,
    QueryPath, QueuedRangeOperation, Range, RangeEdge, RangeOperation, Record, RecordMap,
    RecordState, RootCallMap, EMPTY_ROOT_CALL_ARG,
};
use serde_json::Value;
use tracing::{error, warn};

use crate::cache::{field_to_cache_value, CacheWriter};
use crate::error::StoreError;

/// Mutable access to one record tier.
pub struct RecordWriter<'a> {
    records: &'a mut RecordMap,
    root_call_map: &'a mut RootCallMap,
    node_connection_map: &'a mut NodeConnectionMap,
    cache_writer: Option<&'a mut dyn CacheWriter>,
    client_mutation_id: Option<ClientMutationId>,
}

impl<'a> RecordWriter<'a> {
    /// A confirmed-data writer with no cache.
    pub fn new(
        records: &'a mut RecordMap,
        root_call_map: &'a mut RootCallMap,
        node_connection_map: &'a mut NodeConnectionMap,
    ) -> Self {
        RecordWriter {
            records,
            root_call_map,
            node_connection_map,
            cache_writer: None,
            client_mutation_id: None,
        }
    }

    /// Mirrors confirmed writes to `cache_writer`.
    pub fn with_cache_writer(mut self, cache_writer: Option<&'a mut dyn CacheWriter>) -> Self {
        if self.client_mutation_id.is_none() {
            self.cache_writer = cache_writer;
        }
        self
    }

    /// Turns this into a writer for the optimistic update of `id`.
    pub fn optimistic(mut self, id: ClientMutationId) -> Self {
        self.client_mutation_id = Some(id);
        self.cache_writer = None;
        self
    }

    pub fn is_optimistic(&self) -> bool {
        self.client_mutation_id.is_some()
    }

    pub fn client_mutation_id(&self) -> Option<&ClientMutationId> {
        self.client_mutation_id.as_ref()
    }

    // -----------------------------------------------------------------------
    // Root calls
    // -----------------------------------------------------------------------

    pub fn get_data_id(&self, storage_key: &str, identifying_arg: Option<&str>) -> Option<DataId> {
        if node::is_node_root_call(storage_key) {
            return identifying_arg.map(DataId::from);
        }
        let arg = identifying_arg.unwrap_or(EMPTY_ROOT_CALL_ARG);
        self.root_call_map.get(storage_key)?.get(arg).cloned()
    }

    /// Records that the root call `storage_key(identifying_arg)` resolves to
    /// `id`. Node root calls are implicit and not indexed.
    pub fn put_data_id(
        &mut self,
        storage_key: &str,
        identifying_arg: Option<&str>,
        id: &DataId,
    ) -> Result<(), StoreError> {
        if node::is_node_root_call(storage_key) {
            if identifying_arg.is_none() {
                error!(storage_key, "node root call without an argument");
                return Err(StoreError::NullNodeRootArg {
                    storage_key: storage_key.to_string(),
                });
            }
            return Ok(());
        }
        let arg = identifying_arg.unwrap_or(EMPTY_ROOT_CALL_ARG);
        self.root_call_map
            .entry(storage_key.to_string())
            .or_default()
            .insert(arg.to_string(), id.clone());
        if let Some(cache) = self.cache_writer.as_deref_mut() {
            cache.write_root_call(storage_key, arg, id);
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Records
    // -----------------------------------------------------------------------

    pub fn get_record_state(&self, id: &DataId) -> RecordState {
        match self.records.get(id) {
            None => RecordState::Unknown,
            Some(None) => RecordState::Nonexistent,
            Some(Some(_)) => RecordState::Existent,
        }
    }

    /// The record in this tier, if it exists.
    pub fn get_record(&self, id: &DataId) -> Option<&Record> {
        self.records.get(id)?.as_ref()
    }

    /// Creates a record unless one already exists in this tier. Only client
    /// records keep `path`.
    pub fn put_record(&mut self, id: &DataId, type_name: Option<&str>, path: Option<Arc<QueryPath>>) {
        if self.stamp(id).is_some() {
            return;
        }
        let mut record = Record::new(id.clone(), type_name.map(str::to_string));
        if let Some(mutation_id) = &self.client_mutation_id {
            record.add_mutation_id(mutation_id);
            record.status_mut().set_optimistic(true);
        }
        if id.is_client_id() {
            record.set_path(path);
        }
        self.records.insert(id.clone(), Some(record));
        if let Some(cache) = self.cache_writer.as_deref_mut() {
            cache.write_field(id, metadata::DATA_ID, &Value::String(id.to_string()), type_name);
        }
    }

    /// Marks the record as confirmed deleted.
    pub fn delete_record(&mut self, id: &DataId) {
        self.records.insert(id.clone(), None);
        if self.client_mutation_id.is_none() {
            self.node_connection_map.shift_remove(id);
            if let Some(cache) = self.cache_writer.as_deref_mut() {
                cache.write_node(id, None);
            }
        }
    }

    pub fn get_type(&self, id: &DataId) -> Option<&str> {
        self.get_record(id)?.type_name()
    }

    pub fn get_path_to_record(&self, id: &DataId) -> Option<&Arc<QueryPath>> {
        self.get_record(id)?.path()
    }

    /// Stamps the record with this writer's mutation id, if optimistic.
    fn stamp(&mut self, id: &DataId) -> Option<&mut Record> {
        let record = self.records.get_mut(id)?.as_mut()?;
        if let Some(mutation_id) = &self.client_mutation_id {
            record.add_mutation_id(mutation_id);
            record.status_mut().set_optimistic(true);
        }
        Some(record)
    }

    fn record_for_write(&mut self, id: &DataId) -> Result<&mut Record, StoreError> {
        if self.get_record(id).is_none() {
            error!(%id, "write to a record missing from this tier");
            return Err(StoreError::RecordNotFound { data_id: id.clone() });
        }
        self.stamp(id)
            .ok_or_else(|| StoreError::RecordNotFound { data_id: id.clone() })
    }

    fn write_cache(&mut self, id: &DataId, storage_key: &str, value: &Value, type_name: Option<&str>) {
        if let Some(cache) = self.cache_writer.as_deref_mut() {
            cache.write_field(id, storage_key, value, type_name);
        }
    }

    // -----------------------------------------------------------------------
    // Fields
    // -----------------------------------------------------------------------

    pub fn get_field(&self, id: &DataId, storage_key: &str) -> Lookup<&FieldValue> {
        match self.records.get(id) {
            None => Lookup::Undefined,
            Some(None) => Lookup::Null,
            Some(Some(record)) => match record.field(storage_key) {
                Some(value) if value.is_null() => Lookup::Null,
                Some(value) => Lookup::Found(value),
                None => Lookup::Undefined,
            },
        }
    }

    pub fn put_field(&mut self, id: &DataId, storage_key: &str, value: Value) -> Result<(), StoreError> {
        let record = self.record_for_write(id)?;
        let type_name = record.type_name().map(str::to_string);
        record.set_field(storage_key, FieldValue::Scalar(value.clone()));
        self.write_cache(id, storage_key, &value, type_name.as_deref());
        Ok(())
    }

    /// Overwrites a field with an explicit null.
    pub fn delete_field(&mut self, id: &DataId, storage_key: &str) -> Result<(), StoreError> {
        self.record_for_write(id)?.set_field(storage_key, FieldValue::null());
        self.write_cache(id, storage_key, &Value::Null, None);
        Ok(())
    }

    pub fn get_linked_record_id(&self, id: &DataId, storage_key: &str) -> Lookup<&DataId> {
        match self.get_field(id, storage_key) {
            Lookup::Found(FieldValue::Link(linked)) => Lookup::Found(linked),
            Lookup::Found(_) => Lookup::Undefined,
            Lookup::Null => Lookup::Null,
            Lookup::Undefined => Lookup::Undefined,
        }
    }

    pub fn put_linked_record_id(
        &mut self,
        parent_id: &DataId,
        storage_key: &str,
        record_id: &DataId,
    ) -> Result<(), StoreError> {
        let value = FieldValue::Link(record_id.clone());
        let cache_value = field_to_cache_value(&value);
        self.record_for_write(parent_id)?.set_field(storage_key, value);
        self.write_cache(parent_id, storage_key, &cache_value, None);
        Ok(())
    }

    pub fn get_linked_record_ids(&self, id: &DataId, storage_key: &str) -> Lookup<&[DataId]> {
        match self.get_field(id, storage_key) {
            Lookup::Found(FieldValue::LinkList(linked)) => Lookup::Found(linked.as_slice()),
            Lookup::Found(_) => Lookup::Undefined,
            Lookup::Null => Lookup::Null,
            Lookup::Undefined => Lookup::Undefined,
        }
    }

    pub fn put_linked_record_ids(
        &mut self,
        parent_id: &DataId,
        storage_key: &str,
        record_ids: Vec<DataId>,
    ) -> Result<(), StoreError> {
        let value = FieldValue::LinkList(record_ids);
        let cache_value = field_to_cache_value(&value);
        self.record_for_write(parent_id)?.set_field(storage_key, value);
        self.write_cache(parent_id, storage_key, &cache_value, None);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Deferred fragments
    // -----------------------------------------------------------------------

    pub fn has_fragment_data(&self, id: &DataId, fragment_id: &str) -> bool {
        self.get_record(id)
            .is_some_and(|record| record.has_fragment_data(fragment_id))
    }

    pub fn set_has_fragment_data(&mut self, id: &DataId, fragment_id: &str) -> Result<(), StoreError> {
        self.record_for_write(id)?.mark_fragment_resolved(fragment_id);
        Ok(())
    }

    /// Like [`set_has_fragment_data`](Self::set_has_fragment_data), and also
    /// bumps the record's fragment generation so readers notice.
    pub fn set_has_deferred_fragment_data(&mut self, id: &DataId, fragment_id: &str) -> Result<(), StoreError> {
        let record = self.record_for_write(id)?;
        record.mark_fragment_resolved(fragment_id);
        record.bump_fragment_generation();
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Ranges
    // -----------------------------------------------------------------------

    /// The force index of a connection: -1 for a deleted connection, 0 when
    /// unset.
    pub fn get_range_force_index(&self, connection_id: &DataId) -> i64 {
        match self.records.get(connection_id) {
            Some(None) => -1,
            Some(Some(record)) => record.force_index().unwrap_or(0),
            None => 0,
        }
    }

    pub fn get_range_filter_calls(&self, connection_id: &DataId) -> Option<&[Call]> {
        self.get_record(connection_id)?.filter_calls()
    }

    pub fn has_range(&self, connection_id: &DataId) -> bool {
        self.get_record(connection_id)
            .is_some_and(|record| record.range().is_some())
    }

    pub fn get_connection_ids_for_node(&self, node_id: &DataId) -> Vec<DataId> {
        self.node_connection_map
            .get(node_id)
            .map(|connections| connections.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Replaces the connection's range with an empty one keyed by the core
    /// part of `calls`.
    pub fn put_range(
        &mut self,
        connection_id: &DataId,
        calls: &[Call],
        force_index: Option<i64>,
    ) -> Result<(), StoreError> {
        if self.is_optimistic() {
            error!(%connection_id, "range creation in an optimistic update");
            return Err(StoreError::OptimisticRange {
                data_id: connection_id.clone(),
            });
        }
        let core_calls = filter_calls(calls);
        let force_index = force_index.unwrap_or(0);
        let range = Range::new();

        let cache_values = if self.cache_writer.is_some() {
            Some((serde_json::to_value(&core_calls)?, serde_json::to_value(&range)?))
        } else {
            None
        };

        let record = self.record_for_write(connection_id)?;
        record.set_filter_calls(core_calls);
        record.set_force_index(force_index);
        record.set_range(range);

        if let Some((calls_value, range_value)) = cache_values {
            self.write_cache(connection_id, metadata::FILTER_CALLS, &calls_value, None);
            self.write_cache(connection_id, metadata::FORCE_INDEX, &Value::from(force_index), None);
            self.write_cache(connection_id, metadata::RANGE, &range_value, None);
        }
        Ok(())
    }

    fn range_edge(&self, edge_id: &DataId, force_index: i64) -> Result<(RangeEdge, DataId), StoreError> {
        let node_id = match self.get_linked_record_id(edge_id, connection::NODE) {
            Lookup::Found(node_id) => node_id.clone(),
            _ => {
                error!(%edge_id, "range edge without a node");
                return Err(StoreError::EdgeWithoutNode {
                    edge_id: edge_id.clone(),
                });
            }
        };
        let cursor = match self.get_field(edge_id, connection::CURSOR) {
            Lookup::Found(FieldValue::Scalar(Value::String(cursor))) => Some(cursor.clone()),
            _ => None,
        };
        Ok((RangeEdge::new(edge_id.clone(), cursor, force_index), node_id))
    }

    fn range_mut(&mut self, connection_id: &DataId) -> Result<&mut Range, StoreError> {
        self.record_for_write(connection_id)?
            .range_mut()
            .ok_or_else(|| StoreError::RangeNotFound {
                data_id: connection_id.clone(),
            })
    }

    fn write_cache_range(&mut self, connection_id: &DataId) -> Result<(), StoreError> {
        if self.cache_writer.is_none() {
            return Ok(());
        }
        let value = match self.get_record(connection_id).and_then(Record::range) {
            Some(range) => serde_json::to_value(range)?,
            None => return Ok(()),
        };
        self.write_cache(connection_id, metadata::RANGE, &value, None);
        Ok(())
    }

    /// Merges a fetched page of edges into the connection's range and
    /// registers each edge's node as a member of the connection.
    pub fn put_range_edges(
        &mut self,
        connection_id: &DataId,
        calls: &[Call],
        page_info: PageInfo,
        edge_ids: &[DataId],
    ) -> Result<(), StoreError> {
        let force_index = self.get_range_force_index(connection_id).max(0);
        let mut edges = Vec::with_capacity(edge_ids.len());
        for edge_id in edge_ids {
            let (edge, node_id) = self.range_edge(edge_id, force_index)?;
            self.add_connection_for_node(connection_id, node_id);
            edges.push(edge);
        }
        self.range_mut(connection_id)?.add_items(calls, edges, page_info)?;
        self.write_cache_range(connection_id)
    }

    /// Appends, prepends or removes one edge.
    ///
    /// An optimistic writer queues the operation on its tier's copy of the
    /// connection (creating a placeholder record if needed) and leaves the
    /// confirmed range alone.
    pub fn apply_range_update(
        &mut self,
        connection_id: &DataId,
        edge_id: &DataId,
        operation: RangeOperation,
    ) -> Result<(), StoreError> {
        if let Some(mutation_id) = self.client_mutation_id.clone() {
            let slot = self.records.entry(connection_id.clone()).or_insert(None);
            let record = slot.get_or_insert_with(|| Record::new(connection_id.clone(), None));
            record.add_mutation_id(&mutation_id);
            record.status_mut().set_optimistic(true);
            record.push_range_operation(QueuedRangeOperation {
                client_mutation_id: mutation_id,
                edge_id: edge_id.clone(),
                operation,
            });
            return Ok(());
        }

        match operation {
            RangeOperation::Remove => {
                self.range_mut(connection_id)?.remove_edge_with_id(edge_id);
                if let Lookup::Found(node_id) = self.get_linked_record_id(edge_id, connection::NODE) {
                    let node_id = node_id.clone();
                    self.remove_connection_for_node(connection_id, &node_id);
                } else {
                    warn!(%edge_id, "removed edge has no node; membership left unchanged");
                }
            }
            RangeOperation::Append | RangeOperation::Prepend => {
                let force_index = self.get_range_force_index(connection_id).max(0);
                let (edge, node_id) = self.range_edge(edge_id, force_index)?;
                self.add_connection_for_node(connection_id, node_id);
                let range = self.range_mut(connection_id)?;
                if operation == RangeOperation::Append {
                    range.append_edge(edge);
                } else {
                    range.prepend_edge(edge);
                }
            }
        }
        self.write_cache_range(connection_id)
    }

    fn add_connection_for_node(&mut self, connection_id: &DataId, node_id: DataId) {
        self.node_connection_map
            .entry(node_id)
            .or_default()
            .insert(connection_id.clone());
    }

    fn remove_connection_for_node(&mut self, connection_id: &DataId, node_id: &DataId) {
        if let Some(connections) = self.node_connection_map.get_mut(node_id) {
            connections.shift_remove(connection_id);
            if connections.is_empty() {
                self.node_connection_map.shift_remove(node_id);
            }
        }
    }
}
