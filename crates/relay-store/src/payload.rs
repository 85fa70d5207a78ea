//! Writing response payloads into a tier.
//!
//! [`PayloadWriter`] walks a query tree alongside the payload it produced
//! and normalizes it into records through a [`RecordWriter`]: every object
//! becomes a record keyed by its `id` (or a client id), scalars become
//! fields, objects become links, and connections become ranges. All reads
//! go through the same writer, so a pass only ever sees its own tier.

use std::sync::Arc;

use relay_core::interface::{connection, node};
use relay_core::{
    results_from_payload, ClientIdGenerator, DataId, FieldValue, Lookup, PageInfo, QueryField,
    QueryFragment, QueryNode, QueryPath, QueryRoot, RecordState, RootCallResult,
};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::change::ChangeTracker;
use crate::error::StoreError;
use crate::writer::RecordWriter;

/// Where in the payload and the record graph a traversal currently is.
#[derive(Debug, Clone)]
struct WriteState<'p> {
    record_id: DataId,
    path: Arc<QueryPath>,
    data: &'p Value,
    /// Node id already chosen by the enclosing edge.
    node_id: Option<DataId>,
    /// Set while writing a connection record, whose `edges` are handled as a
    /// range rather than as a plural link.
    is_connection: bool,
}

impl<'p> WriteState<'p> {
    fn new(record_id: DataId, path: Arc<QueryPath>, data: &'p Value) -> Self {
        WriteState {
            record_id,
            path,
            data,
            node_id: None,
            is_connection: false,
        }
    }
}

fn id_of(data: &Value) -> Option<DataId> {
    data.get(node::ID).and_then(Value::as_str).map(DataId::from)
}

/// Normalizes payloads into one tier and tracks what changed.
pub struct PayloadWriter<'a> {
    writer: RecordWriter<'a>,
    client_ids: &'a mut ClientIdGenerator,
    tracker: ChangeTracker,
    force_index: i64,
}

impl<'a> PayloadWriter<'a> {
    /// `force_index` is compared with each connection's stored force index;
    /// a higher value replaces the connection's range instead of merging
    /// into it.
    pub fn new(writer: RecordWriter<'a>, client_ids: &'a mut ClientIdGenerator, force_index: i64) -> Self {
        PayloadWriter {
            writer,
            client_ids,
            tracker: ChangeTracker::new(),
            force_index,
        }
    }

    pub fn writer(&mut self) -> &mut RecordWriter<'a> {
        &mut self.writer
    }

    pub fn tracker(&mut self) -> &mut ChangeTracker {
        &mut self.tracker
    }

    pub fn client_ids(&mut self) -> &mut ClientIdGenerator {
        self.client_ids
    }

    /// Ends the pass, returning what it changed.
    pub fn finish(self) -> ChangeTracker {
        self.tracker
    }

    /// Writes the results of `root`, indexing each one under its root call.
    pub fn write_query_payload(&mut self, root: &QueryRoot, payload: &Map<String, Value>) -> Result<(), StoreError> {
        if !payload.contains_key(root.field_name()) {
            warn!(query = root.name(), field = root.field_name(), "payload has no result for root field");
            return Ok(());
        }
        let path = Arc::new(QueryPath::create(root));
        for RootCallResult { result, info } in results_from_payload(root, payload) {
            let arg = info.identifying_arg_key.as_deref();
            let record_id = match id_of(result) {
                Some(id) => id,
                None => match self.writer.get_data_id(&info.storage_key, arg) {
                    Some(id) => id,
                    None => self.client_ids.generate(),
                },
            };
            self.writer.put_data_id(&info.storage_key, arg, &record_id)?;
            let state = WriteState::new(record_id, Arc::clone(&path), result);
            self.visit_root(root, &state)?;
        }
        Ok(())
    }

    /// Writes `data` for `node` into the existing record `record_id`.
    pub fn write_payload(
        &mut self,
        node: &QueryNode,
        record_id: &DataId,
        data: &Value,
        path: Arc<QueryPath>,
    ) -> Result<(), StoreError> {
        let state = WriteState::new(record_id.clone(), path, data);
        match node {
            QueryNode::Field(field) if field.can_have_subselections() => {
                self.traverse(field.children(), &state)
            }
            QueryNode::Root(root) => self.traverse(root.children(), &state),
            _ => self.visit(node, &state),
        }
    }

    /// Creates `record_id` in this tier unless present, taking its type from
    /// `data` when given.
    pub fn create_record_if_missing(
        &mut self,
        node: &QueryNode,
        record_id: &DataId,
        path: Arc<QueryPath>,
        data: Option<&Value>,
    ) {
        let state = self.writer.get_record_state(record_id);
        let type_name = data.and_then(|data| self.record_type_name(node, record_id, data));
        self.writer.put_record(record_id, type_name.as_deref(), Some(path));
        if state != RecordState::Existent {
            self.tracker.create_id(record_id);
        }
    }

    fn record_type_name(&self, node: &QueryNode, record_id: &DataId, data: &Value) -> Option<String> {
        let type_name = match data.get(node::TYPENAME).and_then(Value::as_str) {
            Some(type_name) => Some(type_name.to_string()),
            None if !node.is_abstract() => Some(node.type_name().to_string()),
            None => self.writer.get_type(record_id).map(str::to_string),
        };
        match type_name.as_deref() {
            None | Some(node::ANY_TYPE) => {
                warn!(%record_id, "no `__typename` for a record of an abstract type");
            }
            _ => {}
        }
        type_name
    }

    fn traverse(&mut self, children: &[QueryNode], state: &WriteState<'_>) -> Result<(), StoreError> {
        for child in children {
            self.visit(child, state)?;
        }
        Ok(())
    }

    fn visit(&mut self, node: &QueryNode, state: &WriteState<'_>) -> Result<(), StoreError> {
        match node {
            QueryNode::Root(root) => self.visit_root(root, state),
            QueryNode::Field(field) => self.visit_field(node, field, state),
            QueryNode::Fragment(fragment) => self.visit_fragment(node, fragment, state),
            QueryNode::Mutation(op) | QueryNode::Subscription(op) => self.traverse(op.children(), state),
        }
    }

    fn visit_root(&mut self, root: &QueryRoot, state: &WriteState<'_>) -> Result<(), StoreError> {
        let record_id = &state.record_id;
        let record_state = self.writer.get_record_state(record_id);
        if state.data.is_null() {
            if record_state != RecordState::Nonexistent {
                self.writer.delete_record(record_id);
                self.tracker.update_id(record_id);
            }
            return Ok(());
        }
        if !state.data.is_object() {
            warn!(query = root.name(), %record_id, "root result is not an object; skipping");
            return Ok(());
        }
        if record_state != RecordState::Existent {
            let node = QueryNode::Root(root.clone());
            let type_name = self.record_type_name(&node, record_id, state.data);
            self.writer
                .put_record(record_id, type_name.as_deref(), Some(Arc::clone(&state.path)));
            self.tracker.create_id(record_id);
        }
        self.traverse(root.children(), state)
    }

    fn visit_fragment(
        &mut self,
        node: &QueryNode,
        fragment: &QueryFragment,
        state: &WriteState<'_>,
    ) -> Result<(), StoreError> {
        let record_id = &state.record_id;
        let optimistic = self.writer.is_optimistic();
        if fragment.is_deferred() {
            self.writer
                .set_has_deferred_fragment_data(record_id, fragment.fragment_id())?;
            self.tracker.update_id(record_id);
        }
        let compatible = optimistic
            || fragment.metadata().is_abstract
            || self
                .writer
                .get_type(record_id)
                .map_or(true, |type_name| type_name == fragment.type_condition());
        if !compatible {
            return Ok(());
        }
        if !optimistic && fragment.metadata().is_container {
            self.writer.set_has_fragment_data(record_id, fragment.fragment_id())?;
        }
        let path = QueryPath::get_path(&state.path, node, Some(record_id));
        let next = WriteState {
            path,
            ..state.clone()
        };
        self.traverse(fragment.children(), &next)
    }

    fn visit_field(&mut self, node: &QueryNode, field: &QueryField, state: &WriteState<'_>) -> Result<(), StoreError> {
        let record_id = &state.record_id;
        let Some(object) = state.data.as_object() else {
            warn!(%record_id, field = field.schema_name(), "expected an object for the parent of field");
            return Ok(());
        };
        if state.is_connection && field.schema_name() == connection::EDGES {
            return Ok(());
        }
        let Some(field_data) = object.get(field.application_name()) else {
            return Ok(());
        };
        let storage_key = field.storage_key();

        if field_data.is_null() {
            if !self.writer.get_field(record_id, storage_key).is_null() {
                self.writer.delete_field(record_id, storage_key)?;
                self.tracker.update_id(record_id);
            }
            return Ok(());
        }

        if !field.can_have_subselections() {
            let unchanged = matches!(
                self.writer.get_field(record_id, storage_key),
                Lookup::Found(FieldValue::Scalar(prev)) if prev == field_data
            );
            if !unchanged {
                self.writer.put_field(record_id, storage_key, field_data.clone())?;
                self.tracker.update_id(record_id);
            }
            return Ok(());
        }

        if field.is_connection() {
            self.write_connection(node, field, state, field_data)
        } else if field.is_plural() {
            self.write_plural_link(node, field, state, field_data)
        } else {
            self.write_link(node, field, state, field_data)
        }
    }

    fn write_link(
        &mut self,
        node: &QueryNode,
        field: &QueryField,
        state: &WriteState<'_>,
        data: &Value,
    ) -> Result<(), StoreError> {
        let record_id = &state.record_id;
        let storage_key = field.storage_key();
        if !data.is_object() {
            warn!(%record_id, storage_key, "expected an object for a linked field; skipping");
            return Ok(());
        }
        let prev_id = self
            .writer
            .get_linked_record_id(record_id, storage_key)
            .found()
            .cloned();
        let next_id = match (&state.node_id, field.schema_name() == connection::NODE) {
            (Some(node_id), true) => node_id.clone(),
            _ => match id_of(data).or_else(|| prev_id.clone()) {
                Some(id) => id,
                None => self.client_ids.generate(),
            },
        };
        let path = QueryPath::get_path(&state.path, node, Some(&next_id));
        self.create_record_if_missing(node, &next_id, Arc::clone(&path), Some(data));
        if prev_id.as_ref() != Some(&next_id) {
            self.writer.put_linked_record_id(record_id, storage_key, &next_id)?;
            self.tracker.update_id(record_id);
        }
        self.traverse(field.children(), &WriteState::new(next_id, path, data))
    }

    fn write_plural_link(
        &mut self,
        node: &QueryNode,
        field: &QueryField,
        state: &WriteState<'_>,
        data: &Value,
    ) -> Result<(), StoreError> {
        let record_id = &state.record_id;
        let storage_key = field.storage_key();
        let Some(items) = data.as_array() else {
            warn!(%record_id, storage_key, "expected an array for a plural field; skipping");
            return Ok(());
        };
        let prev_ids: Option<Vec<DataId>> = self
            .writer
            .get_linked_record_ids(record_id, storage_key)
            .found()
            .map(<[DataId]>::to_vec);

        let mut next_ids = Vec::with_capacity(items.len());
        let mut next_records = Vec::with_capacity(items.len());
        let mut is_update = false;
        for (index, item) in items.iter().enumerate() {
            if item.is_null() {
                continue;
            }
            if !item.is_object() {
                warn!(%record_id, storage_key, index, "expected an object in a plural field; skipping");
                continue;
            }
            let prev_id = prev_ids.as_ref().and_then(|ids| ids.get(index)).cloned();
            let next_id = match id_of(item).or_else(|| prev_id.clone()) {
                Some(id) => id,
                None => self.client_ids.generate(),
            };
            let path = QueryPath::get_path(&state.path, node, Some(&next_id));
            self.create_record_if_missing(node, &next_id, Arc::clone(&path), Some(item));
            is_update |= prev_id.as_ref() != Some(&next_id);
            next_ids.push(next_id.clone());
            next_records.push((next_id, path, item));
        }

        let length_changed = prev_ids.as_ref().map_or(true, |prev| prev.len() != next_ids.len());
        if is_update || length_changed {
            self.writer.put_linked_record_ids(record_id, storage_key, next_ids)?;
            self.tracker.update_id(record_id);
        }
        for (next_id, path, item) in next_records {
            self.traverse(field.children(), &WriteState::new(next_id, path, item))?;
        }
        Ok(())
    }

    fn write_connection(
        &mut self,
        node: &QueryNode,
        field: &QueryField,
        state: &WriteState<'_>,
        data: &Value,
    ) -> Result<(), StoreError> {
        let record_id = &state.record_id;
        let storage_key = field.storage_key();
        if !data.is_object() {
            warn!(%record_id, storage_key, "expected an object for a connection; skipping");
            return Ok(());
        }
        let prev_id = self
            .writer
            .get_linked_record_id(record_id, storage_key)
            .found()
            .cloned();
        let connection_id = match prev_id.clone() {
            Some(id) => id,
            None => self.client_ids.generate(),
        };
        let path = QueryPath::get_path(&state.path, node, Some(&connection_id));
        self.create_record_if_missing(node, &connection_id, Arc::clone(&path), Some(data));
        if prev_id.as_ref() != Some(&connection_id) {
            self.writer
                .put_linked_record_id(record_id, storage_key, &connection_id)?;
            self.tracker.update_id(record_id);
        }

        let connection_state = WriteState {
            record_id: connection_id,
            path,
            data,
            node_id: None,
            is_connection: true,
        };
        self.traverse(field.children(), &connection_state)?;

        let mut edges_nodes = Vec::new();
        collect_edges(field.children(), &mut edges_nodes);
        for edges_node in edges_nodes {
            if let QueryNode::Field(edges_field) = edges_node {
                self.write_edges(field, edges_node, edges_field, &connection_state)?;
            }
        }
        Ok(())
    }

    fn write_edges(
        &mut self,
        connection_field: &QueryField,
        edges_node: &QueryNode,
        edges_field: &QueryField,
        state: &WriteState<'_>,
    ) -> Result<(), StoreError> {
        let connection_id = &state.record_id;
        let edges_data = state.data.get(edges_field.application_name());
        let Some(items) = edges_data.and_then(Value::as_array) else {
            warn!(%connection_id, "connection payload has no `edges` array");
            return Ok(());
        };
        if self.writer.is_optimistic() {
            debug!(%connection_id, "skipping edges in an optimistic payload");
            return Ok(());
        }

        let calls = connection_field.calls();
        let mut reset = false;
        if !self.writer.has_range(connection_id)
            || self.force_index > self.writer.get_range_force_index(connection_id)
        {
            self.writer.put_range(connection_id, calls, Some(self.force_index))?;
            reset = true;
        }
        let prev_edges: Vec<DataId> = match self.writer.get_record(connection_id).and_then(|r| r.range()) {
            Some(range) => range.retrieve_range_info(calls, &[])?.requested_edge_ids,
            None => Vec::new(),
        };

        let mut next_edges = Vec::with_capacity(items.len());
        let mut is_update = reset;
        let mut index = 0;
        for item in items {
            if item.is_null() {
                continue;
            }
            if !item.is_object() {
                warn!(%connection_id, "expected an object for an edge; skipping");
                continue;
            }
            let Some(node_data) = item.get(connection::NODE).filter(|node| !node.is_null()) else {
                continue;
            };
            let prev_edge = prev_edges.get(index);
            index += 1;
            let prev_node = prev_edge.and_then(|edge| {
                self.writer
                    .get_linked_record_id(edge, connection::NODE)
                    .found()
                    .cloned()
            });
            let node_id = match id_of(node_data).or(prev_node) {
                Some(id) => id,
                None => self.client_ids.generate(),
            };
            let edge_id = self.client_ids.edge_id(connection_id, &node_id);
            let path = QueryPath::get_path(&state.path, edges_node, Some(&edge_id));
            self.create_record_if_missing(edges_node, &edge_id, Arc::clone(&path), Some(item));
            is_update |= prev_edge != Some(&edge_id);
            next_edges.push((edge_id, path, item, node_id));
        }
        is_update |= prev_edges.len() != next_edges.len();

        let mut edge_ids = Vec::with_capacity(next_edges.len());
        for (edge_id, path, item, node_id) in next_edges {
            let edge_state = WriteState {
                record_id: edge_id.clone(),
                path,
                data: item,
                node_id: Some(node_id),
                is_connection: false,
            };
            self.traverse(edges_field.children(), &edge_state)?;
            edge_ids.push(edge_id);
        }

        let page_info = match state.data.get(connection::PAGE_INFO) {
            Some(value) if value.is_object() => serde_json::from_value::<PageInfo>(value.clone())
                .unwrap_or_else(|err| {
                    warn!(%connection_id, %err, "unreadable `pageInfo`; using defaults");
                    PageInfo::default()
                }),
            _ => {
                warn!(%connection_id, "connection payload has no `pageInfo`");
                PageInfo::default()
            }
        };
        self.writer
            .put_range_edges(connection_id, calls, page_info, &edge_ids)?;
        if is_update {
            self.tracker.update_id(connection_id);
        }
        Ok(())
    }
}

/// Collects every `edges` field selected on a connection, looking through
/// fragments.
fn collect_edges<'q>(children: &'q [QueryNode], out: &mut Vec<&'q QueryNode>) {
    for child in children {
        match child {
            QueryNode::Field(field) if field.schema_name() == connection::EDGES => out.push(child),
            QueryNode::Fragment(fragment) => collect_edges(fragment.children(), out),
            _ => {}
        }
    }
}
