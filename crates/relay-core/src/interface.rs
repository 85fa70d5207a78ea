//! Well-known field names of the server schema conventions the store
//! relies on: global object identification ("node") and paginated
//! connections, plus the reserved metadata keys records are cached under.

/// The informal `Node` interface.
pub mod node {
    pub const ANY_TYPE: &str = "__any";
    pub const ID: &str = "id";
    pub const ID_TYPE: &str = "ID!";
    pub const NODE: &str = "node";
    pub const NODE_TYPE: &str = "Node";
    pub const NODES: &str = "nodes";
    pub const TYPENAME: &str = "__typename";

    /// Returns true for root fields that fetch records directly by id.
    pub fn is_node_root_call(field_name: &str) -> bool {
        field_name == NODE || field_name == NODES
    }
}

/// Paginated connection fields and arguments.
pub mod connection {
    pub const CLIENT_MUTATION_ID: &str = "clientMutationId";
    pub const CURSOR: &str = "cursor";
    pub const EDGES: &str = "edges";
    pub const END_CURSOR: &str = "endCursor";
    pub const HAS_NEXT_PAGE: &str = "hasNextPage";
    pub const HAS_PREV_PAGE: &str = "hasPreviousPage";
    pub const NODE: &str = "node";
    pub const PAGE_INFO: &str = "pageInfo";
    pub const START_CURSOR: &str = "startCursor";

    pub const AFTER: &str = "after";
    pub const BEFORE: &str = "before";
    pub const FIND: &str = "find";
    pub const FIRST: &str = "first";
    pub const LAST: &str = "last";
    pub const SURROUNDS: &str = "surrounds";

    /// Arguments that page through a connection without filtering it.
    pub const CONNECTION_CALLS: &[&str] = &[AFTER, BEFORE, FIND, FIRST, LAST, SURROUNDS];
}

/// Keys under which record metadata is written to a persistent cache.
pub mod metadata {
    pub const DATA_ID: &str = "__dataID__";
    pub const FILTER_CALLS: &str = "__filterCalls__";
    pub const FORCE_INDEX: &str = "__forceIndex__";
    pub const MUTATION_IDS: &str = "__mutationIDs__";
    pub const PATH: &str = "__path__";
    pub const RANGE: &str = "__range__";
    pub const RESOLVED_FRAGMENT_MAP: &str = "__resolvedFragmentMap__";
    pub const STATUS: &str = "__status__";
    pub const TYPENAME: &str = "__typename";
}
