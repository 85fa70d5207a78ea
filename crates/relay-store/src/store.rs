//! The layered read view over record tiers.
//!
//! A [`RecordStore`] borrows up to three tiers in precedence order
//! (queued, cached, base) and answers reads by falling back per key: the
//! first tier that holds the record decides if it is deleted, and otherwise
//! the first tier whose record holds the key supplies the value. Optimistic
//! range operations stored on the queued tier are merged into confirmed
//! ranges on every read.

use std::sync::Arc;

use indexmap::IndexSet;
use relay_core::interface::{connection, node};
use relay_core::{
    filter_calls, Call, ClientMutationId, DataId, FieldValue, Lookup, NodeConnectionMap,
    PageInfo, QueryPath, Range, Record, RecordMap, RecordState, RootCallMap, EMPTY_ROOT_CALL_ARG,
};
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::error::StoreError;

/// An edge of a range read together with the node it links to.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilteredEdge {
    pub edge_id: DataId,
    pub node_id: DataId,
}

/// The result of reading a window of a connection.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeMetadata {
    /// Pagination calls still needed from the server.
    pub diff_calls: Vec<Call>,
    /// Core calls the range was fetched with.
    pub filter_calls: Vec<Call>,
    /// Requested edges whose node exists.
    pub filtered_edges: Vec<FilteredEdge>,
    pub page_info: PageInfo,
    pub requested_edge_ids: Vec<DataId>,
}

/// Read-only layered view over the record tiers.
#[derive(Debug, Clone, Copy)]
pub struct RecordStore<'a> {
    queued: Option<&'a RecordMap>,
    cached: Option<&'a RecordMap>,
    base: &'a RecordMap,
    root_call_map: Option<&'a RootCallMap>,
    cached_root_call_map: Option<&'a RootCallMap>,
    node_connection_map: Option<&'a NodeConnectionMap>,
}

impl<'a> RecordStore<'a> {
    /// A view of the base tier only.
    pub fn new(
        base: &'a RecordMap,
        root_call_map: &'a RootCallMap,
        node_connection_map: &'a NodeConnectionMap,
    ) -> Self {
        RecordStore {
            queued: None,
            cached: None,
            base,
            root_call_map: Some(root_call_map),
            cached_root_call_map: None,
            node_connection_map: Some(node_connection_map),
        }
    }

    /// A view of record data only. Root calls and node memberships read as
    /// absent; writers that hold the shared indexes answer those reads.
    pub fn records_only(base: &'a RecordMap) -> Self {
        RecordStore {
            queued: None,
            cached: None,
            base,
            root_call_map: None,
            cached_root_call_map: None,
            node_connection_map: None,
        }
    }

    /// Layers the cached records over the base tier without their root
    /// calls.
    pub fn with_cached_records(mut self, cached: &'a RecordMap) -> Self {
        self.cached = Some(cached);
        self
    }

    /// Layers the cached tier over the base tier.
    pub fn with_cached(mut self, cached: &'a RecordMap, cached_root_call_map: &'a RootCallMap) -> Self {
        self.cached = Some(cached);
        self.cached_root_call_map = Some(cached_root_call_map);
        self
    }

    /// Layers the queued tier over everything else.
    pub fn with_queued(mut self, queued: &'a RecordMap) -> Self {
        self.queued = Some(queued);
        self
    }

    fn tiers(&self) -> impl Iterator<Item = &'a RecordMap> {
        self.queued
            .into_iter()
            .chain(self.cached)
            .chain(std::iter::once(self.base))
    }

    /// Walks tiers in precedence order. `pick` returns `Some` to stop with
    /// a found value; a deleted record stops with `Null`.
    fn fallback<T>(&self, id: &DataId, mut pick: impl FnMut(&'a Record) -> Option<T>) -> Lookup<T> {
        for tier in self.tiers() {
            match tier.get(id) {
                None => continue,
                Some(None) => return Lookup::Null,
                Some(Some(record)) => {
                    if let Some(value) = pick(record) {
                        return Lookup::Found(value);
                    }
                }
            }
        }
        Lookup::Undefined
    }

    pub fn get_record_state(&self, id: &DataId) -> RecordState {
        for tier in self.tiers() {
            match tier.get(id) {
                None => continue,
                Some(None) => return RecordState::Nonexistent,
                Some(Some(_)) => return RecordState::Existent,
            }
        }
        RecordState::Unknown
    }

    /// The record from the highest tier that has one.
    pub fn get_record(&self, id: &DataId) -> Lookup<&'a Record> {
        self.fallback(id, Some)
    }

    /// The stored value of a field, with explicit nulls reported as `Null`.
    pub fn get_field(&self, id: &DataId, storage_key: &str) -> Lookup<&'a FieldValue> {
        match self.fallback(id, |record| record.field(storage_key)) {
            Lookup::Found(value) if value.is_null() => Lookup::Null,
            other => other,
        }
    }

    /// A scalar field value.
    pub fn get_scalar(&self, id: &DataId, storage_key: &str) -> Lookup<&'a Value> {
        match self.get_field(id, storage_key) {
            Lookup::Found(FieldValue::Scalar(value)) => Lookup::Found(value),
            Lookup::Found(_) => {
                warn!(%id, storage_key, "expected a scalar field, found a link");
                Lookup::Undefined
            }
            Lookup::Null => Lookup::Null,
            Lookup::Undefined => Lookup::Undefined,
        }
    }

    pub fn get_type(&self, id: &DataId) -> Option<&'a str> {
        self.fallback(id, |record| record.type_name()).found()
    }

    pub fn get_linked_record_id(&self, id: &DataId, storage_key: &str) -> Lookup<&'a DataId> {
        match self.get_field(id, storage_key) {
            Lookup::Found(FieldValue::Link(linked)) => Lookup::Found(linked),
            Lookup::Found(_) => {
                warn!(%id, storage_key, "expected a linked record");
                Lookup::Undefined
            }
            Lookup::Null => Lookup::Null,
            Lookup::Undefined => Lookup::Undefined,
        }
    }

    pub fn get_linked_record_ids(&self, id: &DataId, storage_key: &str) -> Lookup<&'a [DataId]> {
        match self.get_field(id, storage_key) {
            Lookup::Found(FieldValue::LinkList(linked)) => Lookup::Found(linked.as_slice()),
            Lookup::Found(_) => {
                warn!(%id, storage_key, "expected a list of linked records");
                Lookup::Undefined
            }
            Lookup::Null => Lookup::Null,
            Lookup::Undefined => Lookup::Undefined,
        }
    }

    /// Resolves a root call to a record id. `node`/`nodes` root calls
    /// resolve to their argument.
    pub fn get_data_id(&self, storage_key: &str, identifying_arg: Option<&str>) -> Option<DataId> {
        if node::is_node_root_call(storage_key) {
            return identifying_arg.map(DataId::from);
        }
        let arg = identifying_arg.unwrap_or(EMPTY_ROOT_CALL_ARG);
        self.root_call_map
            .into_iter()
            .chain(self.cached_root_call_map)
            .find_map(|map| map.get(storage_key)?.get(arg))
            .cloned()
    }

    pub fn get_path_to_record(&self, id: &DataId) -> Option<&'a Arc<QueryPath>> {
        self.fallback(id, |record| record.path()).found()
    }

    pub fn has_fragment_data(&self, id: &DataId, fragment_id: &str) -> bool {
        self.fallback(id, |record| record.has_fragment_data(fragment_id).then_some(()))
            .found()
            .is_some()
    }

    /// True if the queued tier holds anything for `id`.
    pub fn has_optimistic_update(&self, id: &DataId) -> bool {
        self.queued.is_some_and(|queued| queued.contains_key(id))
    }

    /// Mutations whose optimistic updates touched `id`.
    pub fn client_mutation_ids(&self, id: &DataId) -> Vec<ClientMutationId> {
        match self.queued.and_then(|queued| queued.get(id)) {
            Some(Some(record)) => record.mutation_ids().to_vec(),
            _ => Vec::new(),
        }
    }

    pub fn get_connection_ids_for_node(&self, node_id: &DataId) -> Option<Vec<DataId>> {
        self.node_connection_map?
            .get(node_id)
            .map(|connections| connections.iter().cloned().collect())
    }

    fn get_range(&self, connection_id: &DataId) -> Lookup<&'a Range> {
        self.fallback(connection_id, |record| record.range())
    }

    pub fn has_range(&self, connection_id: &DataId) -> bool {
        matches!(self.get_range(connection_id), Lookup::Found(_))
    }

    /// Reads the window of a connection described by `calls`.
    ///
    /// Optimistic operations queued on the connection are applied to a copy
    /// of the confirmed edges; the confirmed range itself is never touched.
    pub fn get_range_metadata(
        &self,
        connection_id: &DataId,
        calls: &[Call],
    ) -> Result<Lookup<RangeMetadata>, StoreError> {
        let range = match self.get_range(connection_id) {
            Lookup::Found(range) => range,
            Lookup::Null => {
                warn!(%connection_id, "range read on a deleted connection");
                return Ok(Lookup::Null);
            }
            Lookup::Undefined => return Ok(Lookup::Undefined),
        };
        let queued_ops = match self.queued.and_then(|queued| queued.get(connection_id)) {
            Some(Some(record)) => record.range_operations(),
            _ => &[],
        };
        let info = range.retrieve_range_info(calls, queued_ops)?;

        let filtered_edges = info
            .requested_edge_ids
            .iter()
            .filter_map(|edge_id| {
                let node_id = self.get_linked_record_id(edge_id, connection::NODE).found()?;
                if self.get_record_state(node_id) == RecordState::Nonexistent {
                    return None;
                }
                Some(FilteredEdge {
                    edge_id: edge_id.clone(),
                    node_id: node_id.clone(),
                })
            })
            .collect();

        let stored_filter_calls = self
            .fallback(connection_id, |record| record.filter_calls())
            .found();
        Ok(Lookup::Found(RangeMetadata {
            diff_calls: info.diff_calls,
            filter_calls: stored_filter_calls
                .map(<[Call]>::to_vec)
                .unwrap_or_else(|| filter_calls(calls)),
            filtered_edges,
            page_info: info.page_info,
            requested_edge_ids: info.requested_edge_ids,
        }))
    }

    /// Ids of every record any tier knows about, highest tier first.
    pub fn data_ids(&self) -> Vec<&'a DataId> {
        let ids: IndexSet<&'a DataId> = self.tiers().flat_map(|tier| tier.keys()).collect();
        ids.into_iter().collect()
    }
}
