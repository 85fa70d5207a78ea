//! The composition root of the record store.
//!
//! [`StoreData`] owns the three record tiers and the shared indexes, hands
//! out layered [`RecordStore`] views and tier writers, and runs every write
//! as one pass: all records are written first, then the resulting
//! [`ChangeSet`] is broadcast (updated ids, then created ids) through the
//! injected [`ChangeEmitter`].

use std::fmt;
use std::sync::Arc;

use indexmap::IndexSet;
use relay_core::{
    ClientIdGenerator, ClientMutationId, DataId, NodeConnectionMap, QueryFragment, QueryNode,
    QueryPath, QueryRoot, RecordMap, RootCallMap,
};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, error, info};

use crate::cache::CacheManager;
use crate::change::{ChangeEmitter, ChangeSet, ChangeTracker};
use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::mutation::{MutationQueue, MutationStatus};
use crate::payload::PayloadWriter;
use crate::query_path::{get_query, ReconstructedQuery};
use crate::restore::{CacheRestorer, MissingData, RestoreOutcome};
use crate::snapshot::StoreSnapshot;
use crate::store::RecordStore;
use crate::task_queue::{Task, TaskQueue};
use crate::update::{UpdatePayload, UpdateWriter};
use crate::writer::RecordWriter;

/// Sizes of the tiers and queues, for inspection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub records: usize,
    pub cached_records: usize,
    pub queued_records: usize,
    pub root_calls: usize,
    pub nodes_in_ranges: usize,
    pub pending_mutations: usize,
    pub pending_tasks: usize,
}

/// Owns the record tiers and coordinates writes to them.
pub struct StoreData {
    config: StoreConfig,
    records: RecordMap,
    cached_records: RecordMap,
    queued_records: RecordMap,
    root_call_map: RootCallMap,
    cached_root_call_map: RootCallMap,
    node_connection_map: NodeConnectionMap,
    client_ids: ClientIdGenerator,
    next_force_index: i64,
    cache_manager: Option<Box<dyn CacheManager>>,
    change_emitter: Option<Box<dyn ChangeEmitter>>,
    mutations: MutationQueue,
    tasks: TaskQueue,
}

impl Default for StoreData {
    fn default() -> Self {
        StoreData::new(StoreConfig::default())
    }
}

impl fmt::Debug for StoreData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreData")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .field("has_cache_manager", &self.cache_manager.is_some())
            .finish()
    }
}

impl StoreData {
    pub fn new(config: StoreConfig) -> Self {
        StoreData {
            next_force_index: config.initial_force_index,
            config,
            records: RecordMap::new(),
            cached_records: RecordMap::new(),
            queued_records: RecordMap::new(),
            root_call_map: RootCallMap::new(),
            cached_root_call_map: RootCallMap::new(),
            node_connection_map: NodeConnectionMap::new(),
            client_ids: ClientIdGenerator::new(),
            cache_manager: None,
            change_emitter: None,
            mutations: MutationQueue::new(),
            tasks: TaskQueue::new(),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            records: self.records.len(),
            cached_records: self.cached_records.len(),
            queued_records: self.queued_records.len(),
            root_calls: self.root_call_map.values().map(|args| args.len()).sum(),
            nodes_in_ranges: self.node_connection_map.len(),
            pending_mutations: self.mutations.pending_ids().len(),
            pending_tasks: self.tasks.len(),
        }
    }

    // -----------------------------------------------------------------------
    // Collaborators
    // -----------------------------------------------------------------------

    pub fn inject_cache_manager(&mut self, cache_manager: Box<dyn CacheManager>) {
        self.cache_manager = Some(cache_manager);
    }

    pub fn clear_cache_manager(&mut self) -> Option<Box<dyn CacheManager>> {
        self.cache_manager.take()
    }

    pub fn has_cache_manager(&self) -> bool {
        self.cache_manager.is_some()
    }

    pub fn inject_change_emitter(&mut self, emitter: Box<dyn ChangeEmitter>) {
        self.change_emitter = Some(emitter);
    }

    // -----------------------------------------------------------------------
    // Views
    // -----------------------------------------------------------------------

    /// Confirmed server data only.
    pub fn record_store(&self) -> RecordStore<'_> {
        RecordStore::new(&self.records, &self.root_call_map, &self.node_connection_map)
    }

    /// Cached data layered over confirmed data.
    pub fn cached_store(&self) -> RecordStore<'_> {
        self.record_store()
            .with_cached(&self.cached_records, &self.cached_root_call_map)
    }

    /// Optimistic data layered over everything else. This is the view
    /// readers should use.
    pub fn queued_store(&self) -> RecordStore<'_> {
        self.cached_store().with_queued(&self.queued_records)
    }

    /// A writer for the base tier, mirroring to the query cache writer.
    pub fn record_writer(&mut self) -> RecordWriter<'_> {
        let cache = match self.cache_manager.as_deref_mut() {
            Some(manager) if self.config.write_through_cache => Some(manager.query_writer()),
            _ => None,
        };
        RecordWriter::new(&mut self.records, &mut self.root_call_map, &mut self.node_connection_map)
            .with_cache_writer(cache)
    }

    /// Returns the force index for the next forced fetch.
    pub fn next_force_index(&mut self) -> i64 {
        let index = self.next_force_index;
        self.next_force_index += 1;
        index
    }

    pub fn has_optimistic_update(&self, id: &DataId) -> bool {
        self.queued_store().has_optimistic_update(id)
    }

    pub fn client_mutation_ids(&self, id: &DataId) -> Vec<ClientMutationId> {
        self.queued_store().client_mutation_ids(id)
    }

    // -----------------------------------------------------------------------
    // Write passes
    // -----------------------------------------------------------------------

    fn emit(&mut self, changes: &ChangeSet) {
        debug!(
            created = changes.created.len(),
            updated = changes.updated.len(),
            "write pass finished"
        );
        if let Some(emitter) = self.change_emitter.as_mut() {
            for id in changes.ids() {
                emitter.broadcast_change_for_id(id);
            }
        }
    }

    /// Writes the response to `root`. A `force_index` above a connection's
    /// stored one replaces its range instead of merging into it.
    pub fn handle_query_payload(
        &mut self,
        root: &QueryRoot,
        payload: &Map<String, Value>,
        force_index: Option<i64>,
    ) -> Result<ChangeSet, StoreError> {
        debug!(query = root.name(), ?force_index, "handling query payload");
        let cache = match self.cache_manager.as_deref_mut() {
            Some(manager) if self.config.write_through_cache => Some(manager.query_writer()),
            _ => None,
        };
        let writer = RecordWriter::new(&mut self.records, &mut self.root_call_map, &mut self.node_connection_map)
            .with_cache_writer(cache);
        let mut payload_writer = PayloadWriter::new(writer, &mut self.client_ids, force_index.unwrap_or(0));
        payload_writer.write_query_payload(root, payload)?;
        let changes = payload_writer.finish().change_set();
        self.emit(&changes);
        Ok(changes)
    }

    /// Writes the data of `fragment` for the record `data_id`.
    pub fn handle_fragment_payload(
        &mut self,
        data_id: &DataId,
        fragment: &QueryFragment,
        path: Arc<QueryPath>,
        payload: &Value,
    ) -> Result<ChangeSet, StoreError> {
        let cache = match self.cache_manager.as_deref_mut() {
            Some(manager) if self.config.write_through_cache => Some(manager.query_writer()),
            _ => None,
        };
        let writer = RecordWriter::new(&mut self.records, &mut self.root_call_map, &mut self.node_connection_map)
            .with_cache_writer(cache);
        let mut payload_writer = PayloadWriter::new(writer, &mut self.client_ids, 0);
        let node = QueryNode::Fragment(fragment.clone());
        payload_writer.create_record_if_missing(&node, data_id, Arc::clone(&path), Some(payload));
        payload_writer.write_payload(&node, data_id, payload, path)?;
        let changes = payload_writer.finish().change_set();
        self.emit(&changes);
        Ok(changes)
    }

    /// Writes a mutation or subscription payload, to the queued tier when
    /// `optimistic` and to the base tier otherwise.
    pub fn handle_update_payload(&mut self, update: &UpdatePayload, optimistic: bool) -> Result<ChangeSet, StoreError> {
        let changes = if optimistic {
            self.write_optimistic(update)?
        } else {
            self.write_confirmed(update)?
        }
        .change_set();
        self.emit(&changes);
        Ok(changes)
    }

    fn write_confirmed(&mut self, update: &UpdatePayload) -> Result<ChangeTracker, StoreError> {
        let cache = match self.cache_manager.as_deref_mut() {
            Some(manager) if self.config.write_through_cache => Some(manager.mutation_writer()),
            _ => None,
        };
        let writer = RecordWriter::new(&mut self.records, &mut self.root_call_map, &mut self.node_connection_map)
            .with_cache_writer(cache);
        let mut payload_writer = PayloadWriter::new(writer, &mut self.client_ids, 0);
        UpdateWriter::new(&mut payload_writer, None).write(update)?;
        Ok(payload_writer.finish())
    }

    fn write_optimistic(&mut self, update: &UpdatePayload) -> Result<ChangeTracker, StoreError> {
        let Some(mutation_id) = update.client_mutation_id() else {
            error!(operation = update.operation.name(), "optimistic payload without a client mutation id");
            return Err(StoreError::MissingClientMutationId {
                operation: update.operation.name().to_string(),
            });
        };
        let writer = RecordWriter::new(
            &mut self.queued_records,
            &mut self.root_call_map,
            &mut self.node_connection_map,
        )
        .optimistic(mutation_id);
        let fallback = RecordStore::records_only(&self.records).with_cached_records(&self.cached_records);
        let mut payload_writer = PayloadWriter::new(writer, &mut self.client_ids, 0);
        UpdateWriter::new(&mut payload_writer, Some(fallback)).write(update)?;
        Ok(payload_writer.finish())
    }

    /// Drops the queued tier, reporting every id it held as updated.
    ///
    /// Optimistic updates of pending mutations are not replayed; use the
    /// mutation operations to keep them.
    pub fn clear_queued_data(&mut self) -> ChangeSet {
        let ids: Vec<DataId> = self.queued_records.drain(..).map(|(id, _)| id).collect();
        debug!(count = ids.len(), "cleared queued tier");
        let changes = ChangeSet {
            created: IndexSet::new(),
            updated: ids.into_iter().collect(),
        };
        self.emit(&changes);
        changes
    }

    /// Rebuilds the queued tier from the optimistic updates still in effect.
    /// Every id in the old or new tier is reported as updated.
    fn rebuild_queued_data(&mut self) -> Result<ChangeSet, StoreError> {
        let mut ids: IndexSet<DataId> = self.queued_records.drain(..).map(|(id, _)| id).collect();
        let updates: Vec<UpdatePayload> = self
            .mutations
            .optimistic_updates()
            .map(|(_, update)| update.clone())
            .collect();
        debug!(replayed = updates.len(), "rebuilding queued tier");
        for update in &updates {
            let changes = self.write_optimistic(update)?.change_set();
            ids.extend(changes.created);
            ids.extend(changes.updated);
        }
        Ok(ChangeSet {
            created: IndexSet::new(),
            updated: ids,
        })
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    pub fn create_mutation(&mut self) -> ClientMutationId {
        self.mutations.create()
    }

    pub fn mutation_status(&self, id: &ClientMutationId) -> Option<MutationStatus> {
        self.mutations.status(id)
    }

    /// Applies the optimistic payload of mutation `id` to the queued tier.
    /// The payload is stamped with `id` as its `clientMutationId`.
    pub fn apply_optimistic_mutation(
        &mut self,
        id: &ClientMutationId,
        mut update: UpdatePayload,
    ) -> Result<ChangeSet, StoreError> {
        update.set_client_mutation_id(id);
        self.mutations.set_optimistic(id, update.clone())?;
        match self.write_optimistic(&update) {
            Ok(tracker) => {
                let changes = tracker.change_set();
                self.emit(&changes);
                Ok(changes)
            }
            Err(err) => {
                self.mutations.mark_rolled_back(id)?;
                let changes = self.rebuild_queued_data()?;
                self.emit(&changes);
                Err(err)
            }
        }
    }

    /// Writes the server's response to mutation `id` and drops its
    /// optimistic update.
    pub fn commit_mutation(&mut self, id: &ClientMutationId, response: &UpdatePayload) -> Result<ChangeSet, StoreError> {
        self.mutations.mark_committed(id)?;
        info!(%id, "committing mutation");
        let mut changes = self.write_confirmed(response)?.change_set();
        changes.merge(self.rebuild_queued_data()?);
        self.emit(&changes);
        Ok(changes)
    }

    /// Marks mutation `id` as failed and drops its optimistic update. It can
    /// still be committed or rolled back.
    pub fn fail_mutation(&mut self, id: &ClientMutationId) -> Result<ChangeSet, StoreError> {
        self.mutations.mark_failed(id)?;
        info!(%id, "mutation failed");
        let changes = self.rebuild_queued_data()?;
        self.emit(&changes);
        Ok(changes)
    }

    /// Discards mutation `id` and exactly the optimistic writes it made.
    pub fn rollback_mutation(&mut self, id: &ClientMutationId) -> Result<ChangeSet, StoreError> {
        self.mutations.mark_rolled_back(id)?;
        info!(%id, "rolling back mutation");
        let changes = self.rebuild_queued_data()?;
        self.emit(&changes);
        Ok(changes)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Builds a query that fetches `fragment` for the record `data_id`.
    ///
    /// Server records are refetched through `node(id:)`; client records
    /// need the path they were written with.
    pub fn build_fragment_query_for_data_id(
        &self,
        fragment: &QueryNode,
        data_id: &DataId,
    ) -> Result<ReconstructedQuery, StoreError> {
        let store = self.queued_store();
        let path = match store.get_path_to_record(data_id) {
            Some(path) => Arc::clone(path),
            None if !data_id.is_client_id() => {
                let name = fragment
                    .as_fragment()
                    .map_or_else(|| fragment.type_name(), QueryFragment::name);
                let route_name = match fragment.route_name() {
                    "" => self.config.default_route_name.as_str(),
                    route_name => route_name,
                };
                Arc::new(QueryPath::create_for_id(data_id.clone(), name, Some(route_name))?)
            }
            None => {
                error!(%data_id, "client record has no path");
                return Err(StoreError::ClientRecordWithoutPath {
                    data_id: data_id.clone(),
                });
            }
        };
        get_query(&store, &path, fragment)
    }

    // -----------------------------------------------------------------------
    // Cache restoration
    // -----------------------------------------------------------------------

    /// Pulls the records `roots` need from the cache manager into the
    /// cached tier, then calls exactly one of the callbacks.
    pub fn restore_queries_from_cache(
        &mut self,
        roots: &[QueryRoot],
        on_success: impl FnOnce(&RestoreOutcome),
        on_failure: impl FnOnce(&RestoreOutcome),
    ) -> RestoreOutcome {
        self.restore_with(|restorer| roots.iter().for_each(|root| restorer.restore_root(root)), on_success, on_failure)
    }

    /// Like [`restore_queries_from_cache`](Self::restore_queries_from_cache)
    /// for one fragment of a known record.
    pub fn restore_fragment_from_cache(
        &mut self,
        data_id: &DataId,
        fragment: &QueryFragment,
        on_success: impl FnOnce(&RestoreOutcome),
        on_failure: impl FnOnce(&RestoreOutcome),
    ) -> RestoreOutcome {
        self.restore_with(
            |restorer| restorer.restore_record(data_id, fragment.children()),
            on_success,
            on_failure,
        )
    }

    fn restore_with(
        &mut self,
        run: impl FnOnce(&mut CacheRestorer<'_>),
        on_success: impl FnOnce(&RestoreOutcome),
        on_failure: impl FnOnce(&RestoreOutcome),
    ) -> RestoreOutcome {
        let outcome = match self.cache_manager.as_deref() {
            Some(cache) => {
                let mut restorer = CacheRestorer::new(
                    cache,
                    &self.records,
                    &self.root_call_map,
                    &mut self.cached_records,
                    &mut self.cached_root_call_map,
                );
                run(&mut restorer);
                restorer.finish()
            }
            None => RestoreOutcome {
                restored: Vec::new(),
                missing: vec![MissingData::Cache],
            },
        };
        info!(
            restored = outcome.restored.len(),
            missing = outcome.missing.len(),
            "cache restoration finished"
        );

        let changes = ChangeSet {
            created: outcome.restored.iter().cloned().collect(),
            updated: IndexSet::new(),
        };
        if !changes.is_empty() {
            self.emit(&changes);
        }
        if outcome.is_complete() {
            on_success(&outcome);
        } else {
            on_failure(&outcome);
        }
        outcome
    }

    // -----------------------------------------------------------------------
    // Tasks
    // -----------------------------------------------------------------------

    pub fn enqueue_task(&mut self, task: impl FnOnce(&mut StoreData) -> Result<(), StoreError> + 'static) {
        let task: Task = Box::new(task);
        self.tasks.enqueue(task);
    }

    pub fn pending_task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Runs queued tasks in order until the queue is empty or one fails.
    /// Tasks queued by a running task run in the same call. Returns how
    /// many tasks completed.
    pub fn run_pending_tasks(&mut self) -> Result<usize, StoreError> {
        let mut completed = 0;
        while let Some(task) = self.tasks.pop() {
            task(self)?;
            completed += 1;
        }
        Ok(completed)
    }

    // -----------------------------------------------------------------------
    // Serialization
    // -----------------------------------------------------------------------

    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            cached_records: self.cached_records.clone(),
            cached_root_call_map: self.cached_root_call_map.clone(),
            queued_records: self.queued_records.clone(),
            records: self.records.clone(),
            root_call_map: self.root_call_map.clone(),
            node_range_map: self.node_connection_map.clone(),
        }
    }

    pub fn from_snapshot(snapshot: StoreSnapshot, config: StoreConfig) -> Self {
        let mut data = StoreData::new(config);
        data.cached_records = snapshot.cached_records;
        data.cached_root_call_map = snapshot.cached_root_call_map;
        data.queued_records = snapshot.queued_records;
        data.records = snapshot.records;
        data.root_call_map = snapshot.root_call_map;
        data.node_connection_map = snapshot.node_range_map;
        data.client_ids = ClientIdGenerator::new();
        data.skip_used_client_ids();
        data
    }

    /// Advances the client id generator past every client id the tiers or
    /// root calls hold, gaps included.
    fn skip_used_client_ids(&mut self) {
        let ids = self
            .records
            .keys()
            .chain(self.cached_records.keys())
            .chain(self.queued_records.keys())
            .chain(self.root_call_map.values().flat_map(|args| args.values()))
            .chain(self.cached_root_call_map.values().flat_map(|args| args.values()));
        for id in ids {
            self.client_ids.reserve(id);
        }
    }

    pub fn to_json(&self) -> Result<String, StoreError> {
        Ok(serde_json::to_string(&self.snapshot())?)
    }

    pub fn from_json(json: &str, config: StoreConfig) -> Result<Self, StoreError> {
        let snapshot: StoreSnapshot = serde_json::from_str(json)?;
        Ok(StoreData::from_snapshot(snapshot, config))
    }
}
