//! Data model of the normalized GraphQL record store.
//!
//! Everything here is pure data with no I/O: identifiers, field values,
//! records, calls, the query tree, query paths and the Range overlay for
//! paginated connections. The `relay-store` crate builds the layered tiers
//! and writers on top of these types.
//!
//! # Modules
//!
//! - [`id`]: DataId, ClientMutationId and the client id generator
//! - [`value`]: FieldValue and the three-way Lookup result
//! - [`record`]: Record, record maps and the shared indexes
//! - [`call`]: Call and canonical call serialization
//! - [`query`]: the QueryNode sum type and its builders
//! - [`path`]: QueryPath chains used to refetch client records
//! - [`range`]: Range segments, page info and queued range operations
//! - [`root_call`]: identifying-argument iteration and payload pairing

pub mod call;
pub mod error;
pub mod id;
pub mod interface;
pub mod path;
pub mod query;
pub mod range;
pub mod record;
pub mod root_call;
pub mod value;

// Re-export commonly used types
pub use call::{filter_calls, serialize_calls, stable_stringify, Call};
pub use error::CoreError;
pub use id::{ClientIdGenerator, ClientMutationId, DataId, CLIENT_ID_PREFIX};
pub use path::QueryPath;
pub use query::{
    BatchCall, FieldMetadata, FragmentMetadata, QueryField, QueryFragment, QueryIdGenerator,
    QueryNode, QueryOperation, QueryRoot, RootMetadata, DEFAULT_ROUTE_NAME,
};
pub use range::{PageInfo, QueuedRangeOperation, Range, RangeEdge, RangeInfo, RangeOperation};
pub use record::{
    NodeConnectionMap, Record, RecordMap, RecordState, RecordStatus, RootCallMap,
    EMPTY_ROOT_CALL_ARG,
};
pub use root_call::{
    for_each_root_call_arg, results_from_payload, RootCallArg, RootCallInfo, RootCallResult,
};
pub use value::{FieldValue, Lookup};
