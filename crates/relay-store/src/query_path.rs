//! Rebuilding refetch queries from query paths.
//!
//! Client records have no id the server understands, so the only way to
//! refetch one is to repeat the selections that led to it from the nearest
//! root or server-identified node. [`get_query`] walks a [`QueryPath`] from
//! the record up to that anchor, wrapping the requested selection in every
//! step along the way.

use std::fmt;

use relay_core::interface::{connection, node};
use relay_core::{
    stable_stringify, DataId, QueryField, QueryFragment, QueryNode, QueryPath, QueryRoot,
};
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::error::StoreError;
use crate::store::RecordStore;

/// Whether a reconstructed query is known to fetch exactly the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum QueryFidelity {
    Exact,
    /// Some step could not be pinned down; the query may fetch a different
    /// or a broader set of records.
    BestEffort,
}

/// A recoverable problem found while rebuilding a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum QueryPathWarning {
    /// A step selects no identifying field.
    MissingIdentifier { field: String },
    /// A step goes through a connection's `edges`, which cannot address a
    /// single edge.
    EdgesStep { field: String },
    /// The root is abstract and the concrete type of its record is unknown.
    UnknownConcreteType { root: String },
}

impl fmt::Display for QueryPathWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryPathWarning::MissingIdentifier { field } => {
                write!(f, "field `{}` selects no identifier", field)
            }
            QueryPathWarning::EdgesStep { field } => {
                write!(f, "path goes through edges field `{}`", field)
            }
            QueryPathWarning::UnknownConcreteType { root } => {
                write!(f, "concrete type of abstract root `{}` is unknown", root)
            }
        }
    }
}

/// The result of [`get_query`].
#[derive(Debug, Clone)]
pub struct ReconstructedQuery {
    pub root: QueryRoot,
    pub fidelity: QueryFidelity,
    pub warnings: Vec<QueryPathWarning>,
}

fn typename_of(node: &QueryNode) -> QueryNode {
    node.field_by_storage_key(node::TYPENAME)
        .cloned()
        .unwrap_or_else(QueryField::typename)
        .into()
}

/// Builds a query that fetches `append_node` for the record at `path`.
pub fn get_query(
    store: &RecordStore<'_>,
    path: &QueryPath,
    append_node: &QueryNode,
) -> Result<ReconstructedQuery, StoreError> {
    let mut warnings = Vec::new();
    let mut child = append_node.clone();
    let mut current = path;

    let (root, root_id) = loop {
        match current {
            QueryPath::Client { node, parent } => {
                let mut children = vec![child];
                match node {
                    QueryNode::Field(field) if field.schema_name() == connection::EDGES => {
                        warn!(
                            field = field.storage_key(),
                            "refetching through connection edges; select an id on the record instead"
                        );
                        warnings.push(QueryPathWarning::EdgesStep {
                            field: field.storage_key().to_string(),
                        });
                    }
                    QueryNode::Field(field) => {
                        let key = field
                            .inferred_primary_key()
                            .or_else(|| field.field_by_storage_key(node::ID).map(|_| node::ID));
                        match key {
                            Some(key) => children.push(
                                field
                                    .field_by_storage_key(key)
                                    .cloned()
                                    .unwrap_or_else(|| QueryField::scalar(key))
                                    .into(),
                            ),
                            None => {
                                warn!(field = field.storage_key(), "refetch path step selects no identifier");
                                warnings.push(QueryPathWarning::MissingIdentifier {
                                    field: field.storage_key().to_string(),
                                });
                            }
                        }
                    }
                    other => {
                        if let Some(id) = other.field_by_storage_key(node::ID) {
                            children.push(id.clone().into());
                        }
                    }
                }
                children.push(typename_of(node));
                child = node
                    .clone_with_children(children)?
                    .unwrap_or_else(|| node.clone());
                current = parent.as_ref();
            }
            QueryPath::Root { root } => break (root.clone(), None),
            QueryPath::Node {
                data_id,
                name,
                route_name,
            } => {
                let children = vec![QueryField::id().into(), QueryField::typename().into()];
                let root = QueryRoot::node_query(name, data_id.as_str(), children, route_name);
                break (root, Some(data_id.clone()));
            }
        }
    };

    let mut children = vec![child];
    children.extend(
        [node::ID, node::TYPENAME]
            .into_iter()
            .filter_map(|key| root.field_by_storage_key(key))
            .map(|field| QueryNode::from(field.clone())),
    );

    if root.is_abstract() {
        let root_id = root_id.or_else(|| {
            let arg = root.identifying_arg().map(|call| match &call.value {
                Value::String(value) => value.clone(),
                other => stable_stringify(other),
            });
            store.get_data_id(root.storage_key(), arg.as_deref())
        });
        match root_id.as_ref().and_then(|id| store.get_type(id)) {
            Some(type_name) => {
                children = vec![QueryFragment::build(root.name(), type_name, children).into()];
            }
            None => {
                warn!(root = root.name(), id = ?root_id.as_ref().map(DataId::as_str), "no concrete type for abstract root; emitting unwrapped selection");
                warnings.push(QueryPathWarning::UnknownConcreteType {
                    root: root.name().to_string(),
                });
            }
        }
    }

    let route_name = append_node.route_name();
    let root = match root.clone_with_route(children, route_name) {
        Some(clone) => clone,
        None => root,
    };
    let fidelity = if warnings.is_empty() {
        QueryFidelity::Exact
    } else {
        QueryFidelity::BestEffort
    };
    Ok(ReconstructedQuery {
        root,
        fidelity,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::{NodeConnectionMap, Record, RecordMap, RootCallMap};
    use std::sync::Arc;

    fn client(node: impl Into<QueryNode>, parent: QueryPath) -> QueryPath {
        QueryPath::Client {
            node: node.into(),
            parent: Arc::new(parent),
        }
    }

    fn street() -> QueryNode {
        QueryFragment::build("AddressFields", "Address", vec![QueryField::scalar("street").into()]).into()
    }

    #[test]
    fn client_steps_request_identifiers_where_selected() {
        let (records, roots, nodes) = (RecordMap::new(), RootCallMap::new(), NodeConnectionMap::new());
        let store = RecordStore::new(&records, &roots, &nodes);

        let viewer = QueryRoot::builder("viewer").name("ViewerQuery").build();
        let me = QueryField::builder("me")
            .type_name("User")
            .child(QueryField::id())
            .child(QueryField::scalar("name"))
            .build();
        let address = QueryField::builder("address")
            .type_name("Address")
            .child(QueryField::scalar("city"))
            .build();
        let path = client(address, client(me, QueryPath::Root { root: viewer }));

        let query = get_query(&store, &path, &street()).unwrap();
        insta::assert_snapshot!(
            query.root.to_string(),
            @"query ViewerQuery { viewer { me { address { ... on Address { street } __typename } id __typename } } }"
        );
        assert_eq!(query.fidelity, QueryFidelity::BestEffort);
        assert_eq!(
            query.warnings,
            vec![QueryPathWarning::MissingIdentifier {
                field: "address".to_string()
            }]
        );
    }

    #[test]
    fn node_paths_wrap_children_in_the_record_type() {
        let mut records = RecordMap::new();
        records.insert("4".into(), Some(Record::new("4".into(), Some("User".into()))));
        let (roots, nodes) = (RootCallMap::new(), NodeConnectionMap::new());
        let store = RecordStore::new(&records, &roots, &nodes);

        let best_friend = QueryField::builder("bestFriend")
            .type_name("User")
            .child(QueryField::id())
            .build();
        let anchor = QueryPath::create_for_id("4".into(), "FetchUser", None).unwrap();
        let path = client(best_friend, anchor);
        let fragment: QueryNode =
            QueryFragment::build("UserName", "User", vec![QueryField::scalar("name").into()]).into();

        let query = get_query(&store, &path, &fragment).unwrap();
        insta::assert_snapshot!(
            query.root.to_string(),
            @r#"query FetchUser { node(id: "4") { ... on User { bestFriend { ... on User { name } id __typename } id __typename } } }"#
        );
        assert_eq!(query.fidelity, QueryFidelity::Exact);
        assert!(query.warnings.is_empty());
    }

    #[test]
    fn unknown_concrete_type_is_best_effort() {
        let (records, roots, nodes) = (RecordMap::new(), RootCallMap::new(), NodeConnectionMap::new());
        let store = RecordStore::new(&records, &roots, &nodes);
        let anchor = QueryPath::create_for_id("99".into(), "FetchThing", None).unwrap();

        let query = get_query(&store, &anchor, &street()).unwrap();
        assert_eq!(query.fidelity, QueryFidelity::BestEffort);
        assert_eq!(
            query.warnings,
            vec![QueryPathWarning::UnknownConcreteType {
                root: "FetchThing".to_string()
            }]
        );
        assert!(matches!(query.root.children()[0], QueryNode::Fragment(_)));
        assert_eq!(query.root.children().len(), 3);
    }

    #[test]
    fn edges_steps_warn() {
        let (records, roots, nodes) = (RecordMap::new(), RootCallMap::new(), NodeConnectionMap::new());
        let store = RecordStore::new(&records, &roots, &nodes);
        let viewer = QueryRoot::builder("viewer").name("ViewerQuery").build();
        let edges = QueryField::builder("edges")
            .plural()
            .type_name("FriendsEdge")
            .child(QueryField::scalar("cursor"))
            .build();
        let path = client(edges, QueryPath::Root { root: viewer });

        let query = get_query(&store, &path, &street()).unwrap();
        assert_eq!(
            query.warnings,
            vec![QueryPathWarning::EdgesStep {
                field: "edges".to_string()
            }]
        );
    }
}
