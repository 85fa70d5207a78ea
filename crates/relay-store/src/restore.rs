//! Restoring records from a persistent cache.
//!
//! A [`CacheRestorer`] walks a query tree over the records it can already
//! see (base and cached tiers) and pulls whatever is missing from a
//! [`CacheManager`] into the cached tier. Restoration is not
//! all-or-nothing: records that were found stay restored even when others
//! are missing.

use relay_core::interface::{connection, node};
use relay_core::{
    for_each_root_call_arg, DataId, FieldValue, QueryNode, QueryRoot, Record, RecordMap,
    RootCallMap, EMPTY_ROOT_CALL_ARG,
};
use serde::Serialize;
use tracing::debug;

use crate::cache::CacheManager;

/// Something a restored query needs that the cache could not supply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum MissingData {
    /// No cache manager is injected.
    Cache,
    RootCall {
        storage_key: String,
        identifying_arg: Option<String>,
    },
    Record { data_id: DataId },
    Field { data_id: DataId, storage_key: String },
}

/// What one restoration pass did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreOutcome {
    /// Ids read from the cache into the cached tier.
    pub restored: Vec<DataId>,
    pub missing: Vec<MissingData>,
}

impl RestoreOutcome {
    /// True if every record and field the queries need is available.
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Pulls the records a query needs from a cache into the cached tier.
pub struct CacheRestorer<'a> {
    cache: &'a dyn CacheManager,
    base: &'a RecordMap,
    root_call_map: &'a RootCallMap,
    cached_records: &'a mut RecordMap,
    cached_root_call_map: &'a mut RootCallMap,
    outcome: RestoreOutcome,
}

impl<'a> CacheRestorer<'a> {
    pub fn new(
        cache: &'a dyn CacheManager,
        base: &'a RecordMap,
        root_call_map: &'a RootCallMap,
        cached_records: &'a mut RecordMap,
        cached_root_call_map: &'a mut RootCallMap,
    ) -> Self {
        CacheRestorer {
            cache,
            base,
            root_call_map,
            cached_records,
            cached_root_call_map,
            outcome: RestoreOutcome::default(),
        }
    }

    pub fn finish(self) -> RestoreOutcome {
        self.outcome
    }

    pub fn restore_root(&mut self, root: &QueryRoot) {
        let mut args = Vec::new();
        if for_each_root_call_arg(root, |arg| args.push(arg.key)).is_err() {
            self.outcome.missing.push(MissingData::RootCall {
                storage_key: root.storage_key().to_string(),
                identifying_arg: None,
            });
            return;
        }
        for arg in args {
            let id = if node::is_node_root_call(root.field_name()) {
                arg.as_deref().map(DataId::from)
            } else {
                self.resolve_root_call(root.storage_key(), arg.as_deref())
            };
            match id {
                Some(id) => self.restore_record(&id, root.children()),
                None => self.outcome.missing.push(MissingData::RootCall {
                    storage_key: root.storage_key().to_string(),
                    identifying_arg: arg,
                }),
            }
        }
    }

    /// Restores what `children` need of the record `data_id`.
    pub fn restore_record(&mut self, data_id: &DataId, children: &[QueryNode]) {
        let known = self.base.contains_key(data_id) || self.cached_records.contains_key(data_id);
        if !known {
            match self.cache.read_node(data_id) {
                Some(record) => {
                    debug!(%data_id, deleted = record.is_none(), "restored record from cache");
                    self.cached_records.insert(data_id.clone(), record);
                    self.outcome.restored.push(data_id.clone());
                }
                None => {
                    self.outcome.missing.push(MissingData::Record {
                        data_id: data_id.clone(),
                    });
                    return;
                }
            }
        }

        let record = match self.base.get(data_id).or_else(|| self.cached_records.get(data_id)) {
            Some(Some(record)) => record,
            // A deleted record needs nothing further.
            _ => return,
        };
        let mut next = Vec::new();
        plan(record, children, &mut next, &mut self.outcome.missing);
        for (linked, linked_children) in next {
            self.restore_record(&linked, linked_children);
        }
    }

    fn resolve_root_call(&mut self, storage_key: &str, arg: Option<&str>) -> Option<DataId> {
        let arg = arg.unwrap_or(EMPTY_ROOT_CALL_ARG);
        let known = [&*self.root_call_map, &*self.cached_root_call_map]
            .into_iter()
            .find_map(|map| map.get(storage_key)?.get(arg))
            .cloned();
        if known.is_some() {
            return known;
        }
        let id = self.cache.read_root_call(storage_key, arg)?;
        self.cached_root_call_map
            .entry(storage_key.to_string())
            .or_default()
            .insert(arg.to_string(), id.clone());
        Some(id)
    }
}

/// Collects the linked records `children` reach from `record` and notes
/// selected fields the record lacks.
fn plan<'q>(
    record: &Record,
    children: &'q [QueryNode],
    next: &mut Vec<(DataId, &'q [QueryNode])>,
    missing: &mut Vec<MissingData>,
) {
    for child in children {
        let field = match child {
            QueryNode::Fragment(fragment) => {
                plan(record, fragment.children(), next, missing);
                continue;
            }
            QueryNode::Field(field) => field,
            _ => continue,
        };
        if field.schema_name() == connection::EDGES {
            if let Some(range) = record.range() {
                for edge_id in range.edge_ids() {
                    next.push((edge_id, field.children()));
                }
                continue;
            }
        }
        match record.field(field.storage_key()) {
            None => missing.push(MissingData::Field {
                data_id: record.data_id().clone(),
                storage_key: field.storage_key().to_string(),
            }),
            Some(FieldValue::Scalar(_)) => {}
            Some(FieldValue::Link(linked)) => next.push((linked.clone(), field.children())),
            Some(FieldValue::LinkList(linked)) => {
                next.extend(linked.iter().map(|id| (id.clone(), field.children())));
            }
        }
    }
}
