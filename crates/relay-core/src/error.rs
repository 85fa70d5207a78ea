//! Core error types for relay-core.
//!
//! Uses `thiserror` for structured, matchable error variants. Every variant
//! is a contract violation by the caller; recoverable data anomalies are
//! logged as warnings instead of surfacing here.

use thiserror::Error;

use crate::id::DataId;

/// Errors produced by the relay-core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Children were supplied to a field that cannot have sub-selections.
    #[error("cannot add children to field `{field}` because it does not support sub-selections")]
    LeafChildren { field: String },

    /// Root call arguments were iterated on a query bound to a batch call.
    #[error("cannot iterate over batch call variables of query `{query}`")]
    BatchCallIteration { query: String },

    /// A node-path was requested for a client identifier.
    #[error("expected a server id for a node path, got `{data_id}`")]
    ClientIdNodePath { data_id: DataId },

    /// A query path was walked past its root.
    #[error("cannot get the parent of a root path")]
    RootPathParent,

    /// Range calls could not be interpreted.
    #[error("invalid range call `{call}`: {reason}")]
    InvalidRangeCall { call: String, reason: String },
}
