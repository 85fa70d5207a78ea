//! Layered record store for normalized GraphQL responses.
//!
//! Records live in three tiers: confirmed server data, data restored from a
//! persistent cache, and optimistic data written on behalf of pending
//! mutations. Reads go through a [`RecordStore`] that consults the tiers
//! per key, queued before cached before base. Writes go through a
//! [`RecordWriter`] bound to exactly one tier.
//!
//! # Architecture
//!
//! [`StoreData`] is the composition root. It owns the tiers and the shared
//! indexes and runs every write as one pass:
//! - **Payload writers** walk a query tree alongside its response and
//!   normalize it into records ([`PayloadWriter`], [`UpdateWriter`]).
//! - **Change tracking** collects the ids a pass created or updated and
//!   broadcasts them once the pass is done ([`ChangeEmitter`]).
//! - **Mutations** keep their optimistic payloads in a [`MutationQueue`] so
//!   the queued tier can be rebuilt when one commits, fails or rolls back.
//!
//! # Modules
//!
//! - [`error`]: StoreError enum with all failure modes
//! - [`config`]: StoreConfig tunables
//! - [`store`]: RecordStore, the layered read view
//! - [`writer`]: RecordWriter, the single-tier write view
//! - [`payload`]: PayloadWriter for query and fragment payloads
//! - [`update`]: UpdateWriter and mutation configs
//! - [`mutation`]: MutationQueue and mutation statuses
//! - [`change`]: ChangeSet, ChangeTracker and ChangeEmitter
//! - [`cache`]: CacheWriter and CacheManager seams plus an in-memory cache
//! - [`restore`]: CacheRestorer for pulling cached records into the store
//! - [`query_path`]: get_query for refetching records by path
//! - [`snapshot`]: serialized form of all tiers
//! - [`task_queue`]: FIFO queue of deferred store tasks
//! - [`store_data`]: StoreData composition root

pub mod cache;
pub mod change;
pub mod config;
pub mod error;
pub mod mutation;
pub mod payload;
pub mod query_path;
pub mod restore;
pub mod snapshot;
pub mod store;
pub mod store_data;
pub mod task_queue;
pub mod update;
pub mod writer;

// Re-export key types for ergonomic use.
pub use cache::{CacheManager, CacheWriter, InMemoryCache};
pub use change::{ChangeEmitter, ChangeSet, ChangeTracker};
pub use config::StoreConfig;
pub use error::StoreError;
pub use mutation::{MutationQueue, MutationStatus};
pub use payload::PayloadWriter;
pub use query_path::{get_query, QueryFidelity, QueryPathWarning, ReconstructedQuery};
pub use restore::{CacheRestorer, MissingData, RestoreOutcome};
pub use snapshot::StoreSnapshot;
pub use store::{FilteredEdge, RangeMetadata, RecordStore};
pub use store_data::{StoreData, StoreStats};
pub use task_queue::{Task, TaskQueue};
pub use update::{MutationConfig, UpdatePayload, UpdateWriter};
pub use writer::RecordWriter;
