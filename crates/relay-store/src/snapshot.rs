//! Serialized form of the record tiers.
//!
//! Query paths are not part of a snapshot: they point at live query trees.
//! Client records loaded from a snapshot cannot be refetched through a path
//! until a new payload writes them again.

use relay_core::{NodeConnectionMap, RecordMap, RootCallMap};
use serde::{Deserialize, Serialize};

/// Every tier and index of a store, as written by
/// [`StoreData::to_json`](crate::StoreData::to_json).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StoreSnapshot {
    pub cached_records: RecordMap,
    pub cached_root_call_map: RootCallMap,
    pub queued_records: RecordMap,
    pub records: RecordMap,
    pub root_call_map: RootCallMap,
    pub node_range_map: NodeConnectionMap,
}

impl StoreSnapshot {
    /// Number of records across all tiers, counting an id once per tier.
    pub fn record_count(&self) -> usize {
        self.records.len() + self.cached_records.len() + self.queued_records.len()
    }
}
