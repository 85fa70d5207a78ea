//! Writing mutation and subscription payloads.
//!
//! An [`UpdatePayload`] is the response of one operation together with the
//! configs describing how it changes ranges. Configs run first, then every
//! payload field that identifies a record is merged through the query
//! payload writer.

use std::sync::Arc;

use relay_core::interface::{connection, node};
use relay_core::{
    ClientMutationId, DataId, Lookup, QueryField, QueryNode, QueryOperation, QueryPath, QueryRoot,
    RangeOperation, RecordState,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::payload::PayloadWriter;
use crate::store::RecordStore;

/// How a mutation response changes the store beyond its plain fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MutationConfig {
    /// Inserts the edge found at `edge_name` into a connection of the
    /// parent record. Without a `parent_id` the edge's `source.id` is used.
    #[serde(rename_all = "camelCase")]
    RangeAdd {
        #[serde(default)]
        parent_id: Option<DataId>,
        connection_name: String,
        edge_name: String,
        range_behavior: RangeOperation,
    },
    /// Removes the edges to the ids at `deleted_id_field_name` from one
    /// connection of the parent.
    #[serde(rename_all = "camelCase")]
    RangeDelete {
        parent_id: DataId,
        connection_name: String,
        deleted_id_field_name: String,
    },
    /// Deletes the records at `deleted_id_field_name`, removing them from
    /// every connection that holds them first.
    #[serde(rename_all = "camelCase")]
    NodeDelete { deleted_id_field_name: String },
}

/// The response to one mutation or subscription event.
#[derive(Debug, Clone)]
pub struct UpdatePayload {
    pub operation: QueryOperation,
    pub payload: Map<String, Value>,
    pub configs: Vec<MutationConfig>,
}

impl UpdatePayload {
    pub fn new(operation: QueryOperation, payload: Map<String, Value>) -> Self {
        UpdatePayload {
            operation,
            payload,
            configs: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: MutationConfig) -> Self {
        self.configs.push(config);
        self
    }

    /// The `clientMutationId` echoed in the payload, if it is a string.
    pub fn client_mutation_id(&self) -> Option<ClientMutationId> {
        self.payload
            .get(connection::CLIENT_MUTATION_ID)
            .and_then(Value::as_str)
            .map(ClientMutationId::from)
    }

    /// Stamps the payload with `id` as its `clientMutationId`.
    pub fn set_client_mutation_id(&mut self, id: &ClientMutationId) {
        self.payload.insert(
            connection::CLIENT_MUTATION_ID.to_string(),
            Value::String(id.to_string()),
        );
    }
}

fn id_of(data: &Value) -> Option<DataId> {
    data.get(node::ID).and_then(Value::as_str).map(DataId::from)
}

/// A single id or an array of ids.
fn ids_of(data: Option<&Value>) -> Vec<DataId> {
    match data {
        Some(Value::String(id)) => vec![DataId::from(id.as_str())],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(DataId::from)
            .collect(),
        _ => Vec::new(),
    }
}

fn operation_field<'q>(children: &'q [QueryNode], name: &str) -> Option<&'q QueryField> {
    children.iter().find_map(|child| match child {
        QueryNode::Field(field) if field.application_name() == name => Some(field),
        QueryNode::Fragment(fragment) => operation_field(fragment.children(), name),
        _ => None,
    })
}

/// Applies one [`UpdatePayload`] through a [`PayloadWriter`].
///
/// Reads check the writer's own tier first, then `fallback` (the lower
/// tiers when writing optimistically).
pub struct UpdateWriter<'w, 'a> {
    writer: &'w mut PayloadWriter<'a>,
    fallback: Option<RecordStore<'a>>,
}

impl<'w, 'a> UpdateWriter<'w, 'a> {
    pub fn new(writer: &'w mut PayloadWriter<'a>, fallback: Option<RecordStore<'a>>) -> Self {
        UpdateWriter { writer, fallback }
    }

    pub fn write(&mut self, update: &UpdatePayload) -> Result<(), StoreError> {
        debug!(
            operation = update.operation.name(),
            configs = update.configs.len(),
            optimistic = self.writer.writer().is_optimistic(),
            "writing update payload"
        );
        for config in &update.configs {
            match config {
                MutationConfig::RangeAdd {
                    parent_id,
                    connection_name,
                    edge_name,
                    range_behavior,
                } => self.handle_range_add(
                    update,
                    parent_id.as_ref(),
                    connection_name,
                    edge_name,
                    *range_behavior,
                )?,
                MutationConfig::RangeDelete {
                    parent_id,
                    connection_name,
                    deleted_id_field_name,
                } => {
                    let ids = ids_of(update.payload.get(deleted_id_field_name));
                    self.handle_range_delete(parent_id, connection_name, &ids)?
                }
                MutationConfig::NodeDelete { deleted_id_field_name } => {
                    for id in ids_of(update.payload.get(deleted_id_field_name)) {
                        self.delete_record(&id)?;
                    }
                }
            }
        }
        self.merge(update)
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    fn record_state(&mut self, id: &DataId) -> RecordState {
        match self.writer.writer().get_record_state(id) {
            RecordState::Unknown => self
                .fallback
                .map_or(RecordState::Unknown, |store| store.get_record_state(id)),
            state => state,
        }
    }

    fn linked_record_id(&mut self, id: &DataId, storage_key: &str) -> Option<DataId> {
        match self.writer.writer().get_linked_record_id(id, storage_key) {
            Lookup::Found(linked) => Some(linked.clone()),
            Lookup::Null => None,
            Lookup::Undefined => self
                .fallback
                .and_then(|store| store.get_linked_record_id(id, storage_key).found().cloned()),
        }
    }

    fn path_to_record(&mut self, id: &DataId) -> Option<Arc<QueryPath>> {
        if let Some(path) = self.writer.writer().get_path_to_record(id) {
            return Some(Arc::clone(path));
        }
        self.fallback
            .and_then(|store| store.get_path_to_record(id).map(Arc::clone))
    }

    // -----------------------------------------------------------------------
    // Configs
    // -----------------------------------------------------------------------

    fn handle_range_add(
        &mut self,
        update: &UpdatePayload,
        parent_id: Option<&DataId>,
        connection_name: &str,
        edge_name: &str,
        operation: RangeOperation,
    ) -> Result<(), StoreError> {
        let Some(edge) = update.payload.get(edge_name).filter(|edge| edge.is_object()) else {
            return Ok(());
        };
        let Some(node_data) = edge.get(connection::NODE).filter(|node| node.is_object()) else {
            return Ok(());
        };
        let parent_id = match parent_id.cloned().or_else(|| edge.get("source").and_then(id_of)) {
            Some(id) => id,
            None => {
                warn!(edge_name, "range add without a parent id or edge source; skipping");
                return Ok(());
            }
        };
        let Some(connection_id) = self.linked_record_id(&parent_id, connection_name) else {
            debug!(%parent_id, connection_name, "connection not fetched; skipping range add");
            return Ok(());
        };
        let Some(node_id) = id_of(node_data) else {
            warn!(%connection_id, edge_name, "added edge has a node without an id; skipping");
            return Ok(());
        };
        let Some(edge_field) = operation_field(update.operation.children(), edge_name) else {
            warn!(edge_name, "edge is not selected by the operation; skipping");
            return Ok(());
        };
        let parent_path = match self.path_to_record(&connection_id) {
            Some(path) => path,
            None if !connection_id.is_client_id() => Arc::new(QueryPath::create_for_id(
                connection_id.clone(),
                update.operation.name(),
                None,
            )?),
            None => {
                warn!(%connection_id, "connection has no path; skipping range add");
                return Ok(());
            }
        };

        let edge_id = self.writer.client_ids().edge_id(&connection_id, &node_id);
        let edges = QueryNode::Field(
            QueryField::builder(connection::EDGES)
                .plural()
                .type_name(edge_field.type_name())
                .children(edge_field.children().to_vec())
                .build(),
        );
        let path = QueryPath::get_path(&parent_path, &edges, Some(&edge_id));
        self.writer
            .create_record_if_missing(&edges, &edge_id, Arc::clone(&path), Some(edge));
        self.writer.write_payload(&edges, &edge_id, edge, path)?;
        self.writer
            .writer()
            .apply_range_update(&connection_id, &edge_id, operation)?;
        self.writer.tracker().update_id(&connection_id);
        Ok(())
    }

    fn handle_range_delete(
        &mut self,
        parent_id: &DataId,
        connection_name: &str,
        node_ids: &[DataId],
    ) -> Result<(), StoreError> {
        if node_ids.is_empty() {
            return Ok(());
        }
        let Some(connection_id) = self.linked_record_id(parent_id, connection_name) else {
            debug!(%parent_id, connection_name, "connection not fetched; skipping range delete");
            return Ok(());
        };
        for node_id in node_ids {
            let edge_id = self.writer.client_ids().edge_id(&connection_id, node_id);
            self.writer
                .writer()
                .apply_range_update(&connection_id, &edge_id, RangeOperation::Remove)?;
            self.delete_record(&edge_id)?;
            self.writer.tracker().update_id(&connection_id);
        }
        Ok(())
    }

    /// Deletes `id` after removing it from every connection holding it.
    fn delete_record(&mut self, id: &DataId) -> Result<(), StoreError> {
        if self.record_state(id) == RecordState::Nonexistent {
            return Ok(());
        }
        let connection_ids = self.writer.writer().get_connection_ids_for_node(id);
        for connection_id in connection_ids {
            let edge_id = self.writer.client_ids().edge_id(&connection_id, id);
            self.writer
                .writer()
                .apply_range_update(&connection_id, &edge_id, RangeOperation::Remove)?;
            self.writer.tracker().update_id(&connection_id);
            self.delete_record(&edge_id)?;
        }
        self.writer.writer().delete_record(id);
        self.writer.tracker().update_id(id);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Fields
    // -----------------------------------------------------------------------

    fn merge(&mut self, update: &UpdatePayload) -> Result<(), StoreError> {
        for (name, data) in &update.payload {
            if name == connection::CLIENT_MUTATION_ID || !(data.is_object() || data.is_array()) {
                continue;
            }
            let Some(field) = operation_field(update.operation.children(), name) else {
                debug!(field = name.as_str(), "payload field not selected by the operation");
                continue;
            };
            self.merge_field(&update.operation, field, data)?;
        }
        Ok(())
    }

    fn merge_field(&mut self, operation: &QueryOperation, field: &QueryField, data: &Value) -> Result<(), StoreError> {
        if let Some(items) = data.as_array() {
            for item in items.iter().filter(|item| item.is_object()) {
                self.merge_field(operation, field, item)?;
            }
            return Ok(());
        }

        let (record_id, path) = match id_of(data) {
            Some(id) if !id.is_client_id() => {
                let path = QueryPath::create_for_id(id.clone(), operation.name(), None)?;
                (id, Arc::new(path))
            }
            other => {
                let id = other.or_else(|| self.writer.writer().get_data_id(field.storage_key(), None));
                let Some(id) = id else {
                    warn!(field = field.storage_key(), "payload field has no id and no root call; skipping");
                    return Ok(());
                };
                let root = QueryRoot::builder(field.schema_name())
                    .type_name(field.type_name())
                    .children(field.children().to_vec())
                    .route(operation.route_name())
                    .build();
                (id, Arc::new(QueryPath::create(&root)))
            }
        };
        let node = QueryNode::Field(field.clone());
        self.writer
            .create_record_if_missing(&node, &record_id, Arc::clone(&path), Some(data));
        self.writer.write_payload(&node, &record_id, data, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn configs_deserialize_from_tagged_json() {
        let config: MutationConfig = serde_json::from_value(json!({
            "type": "RANGE_ADD",
            "parentId": "4",
            "connectionName": "friends",
            "edgeName": "friendEdge",
            "rangeBehavior": "prepend"
        }))
        .unwrap();
        assert_eq!(
            config,
            MutationConfig::RangeAdd {
                parent_id: Some("4".into()),
                connection_name: "friends".into(),
                edge_name: "friendEdge".into(),
                range_behavior: RangeOperation::Prepend,
            }
        );

        let config: MutationConfig =
            serde_json::from_value(json!({"type": "NODE_DELETE", "deletedIdFieldName": "deletedId"})).unwrap();
        assert!(matches!(config, MutationConfig::NodeDelete { .. }));
    }

    #[test]
    fn ids_accept_strings_and_arrays() {
        assert_eq!(ids_of(Some(&json!("1"))), vec![DataId::from("1")]);
        assert_eq!(
            ids_of(Some(&json!(["1", 2, "3"]))),
            vec![DataId::from("1"), DataId::from("3")]
        );
        assert!(ids_of(None).is_empty());
    }

    #[test]
    fn client_mutation_id_is_read_and_stamped() {
        let operation = QueryOperation::build(
            "LikeStory",
            "LikeStoryPayload",
            relay_core::Call::new("likeStory", json!({})),
            Vec::new(),
        );
        let mut update = UpdatePayload::new(operation, Map::new());
        assert_eq!(update.client_mutation_id(), None);
        update.set_client_mutation_id(&"m1".into());
        assert_eq!(update.client_mutation_id(), Some(ClientMutationId::from("m1")));
    }
}
