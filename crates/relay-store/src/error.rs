//! Store error types for relay-store.
//!
//! Every [`StoreError`] is an invariant violation: a caller broke the
//! contract of the operation (wrote to a record that does not exist, asked
//! an optimistic writer for a range, committed a mutation twice). Anomalies
//! in server or cache data are logged with `tracing::warn!` and never show
//! up here.

use relay_core::{ClientMutationId, CoreError, DataId};
use thiserror::Error;

use crate::mutation::MutationStatus;

/// Errors produced by the record store and its writers.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An error from the data model.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// JSON serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A write targeted a record that does not exist in the writer's tier.
    #[error("record `{data_id}` does not exist in this tier")]
    RecordNotFound { data_id: DataId },

    /// A range was created through an optimistic writer.
    #[error("cannot create a range on `{data_id}` in an optimistic update")]
    OptimisticRange { data_id: DataId },

    /// A range edge has no linked `node` record.
    #[error("edge `{edge_id}` does not link to a node")]
    EdgeWithoutNode { edge_id: DataId },

    /// A connection was read or updated as a range but has none.
    #[error("record `{data_id}` has no range")]
    RangeNotFound { data_id: DataId },

    /// `node`/`nodes` root calls must be keyed by an id.
    #[error("argument to root call `{storage_key}` cannot be null")]
    NullNodeRootArg { storage_key: String },

    /// An optimistic payload did not carry a string `clientMutationId`.
    #[error("optimistic payload for `{operation}` has no `clientMutationId`")]
    MissingClientMutationId { operation: String },

    /// A client record has no path, so no query can refetch it.
    #[error("cannot build a query for client record `{data_id}` without a path")]
    ClientRecordWithoutPath { data_id: DataId },

    /// No mutation with this id is queued.
    #[error("mutation `{id}` is not queued")]
    MutationNotFound { id: ClientMutationId },

    /// A mutation operation was called in the wrong lifecycle state.
    #[error("cannot {operation} mutation `{id}` with status {status:?}")]
    InvalidMutationStatus {
        id: ClientMutationId,
        status: MutationStatus,
        operation: &'static str,
    },
}
