//! Query paths: how a record was reached.
//!
//! A path is a backward-pointing chain from a record to the nearest point a
//! refetch can start from: either the root query that produced it or a
//! server-identified record reachable through `node(id:)`. Only
//! client-identified records carry a path; everything else is refetched by
//! id.

use std::sync::Arc;

use crate::error::CoreError;
use crate::id::DataId;
use crate::interface::node;
use crate::query::{QueryNode, QueryRoot, DEFAULT_ROUTE_NAME};

#[derive(Debug, Clone, PartialEq)]
pub enum QueryPath {
    /// The record was produced directly by a root query.
    Root { root: QueryRoot },
    /// A server-identified record, refetchable with `node(id:)`.
    Node {
        data_id: DataId,
        name: String,
        route_name: String,
    },
    /// A client record reached through `node` from `parent`.
    Client { node: QueryNode, parent: Arc<QueryPath> },
}

impl QueryPath {
    /// A node path for a server id.
    pub fn create_for_id(
        data_id: DataId,
        name: impl Into<String>,
        route_name: Option<&str>,
    ) -> Result<QueryPath, CoreError> {
        if data_id.is_client_id() {
            tracing::error!(%data_id, "node path requested for a client id");
            return Err(CoreError::ClientIdNodePath { data_id });
        }
        Ok(QueryPath::Node {
            data_id,
            name: name.into(),
            route_name: route_name.unwrap_or(DEFAULT_ROUTE_NAME).to_string(),
        })
    }

    /// The path for records produced by `root`. A `node(id: "...")` root
    /// collapses to a node path.
    pub fn create(root: &QueryRoot) -> QueryPath {
        if root.field_name() == node::NODE {
            if let Some(id) = root.identifying_arg().and_then(|arg| arg.value.as_str()) {
                return QueryPath::Node {
                    data_id: DataId::from(id),
                    name: root.name().to_string(),
                    route_name: root.route_name().to_string(),
                };
            }
        }
        QueryPath::Root { root: root.clone() }
    }

    /// The path of the record `data_id` reached through `node` from
    /// `parent`.
    ///
    /// Client records (and records without an id) extend the chain; a
    /// server record starts a new node path.
    pub fn get_path(parent: &Arc<QueryPath>, node: &QueryNode, data_id: Option<&DataId>) -> Arc<QueryPath> {
        match data_id {
            Some(id) if !id.is_client_id() => {
                if let QueryPath::Node { data_id, .. } = parent.as_ref() {
                    if data_id == id {
                        return Arc::clone(parent);
                    }
                }
                Arc::new(QueryPath::Node {
                    data_id: id.clone(),
                    name: parent.name().to_string(),
                    route_name: parent.route_name().to_string(),
                })
            }
            _ => Arc::new(QueryPath::Client {
                node: node.clone(),
                parent: Arc::clone(parent),
            }),
        }
    }

    pub fn is_root_path(&self) -> bool {
        !matches!(self, QueryPath::Client { .. })
    }

    pub fn parent(&self) -> Result<&Arc<QueryPath>, CoreError> {
        match self {
            QueryPath::Client { parent, .. } => Ok(parent),
            _ => Err(CoreError::RootPathParent),
        }
    }

    /// The nearest root or node path.
    pub fn terminal(&self) -> &QueryPath {
        let mut path = self;
        while let QueryPath::Client { parent, .. } = path {
            path = parent.as_ref();
        }
        path
    }

    /// Name of the query this path started from.
    pub fn name(&self) -> &str {
        match self {
            QueryPath::Root { root } => root.name(),
            QueryPath::Node { name, .. } => name,
            QueryPath::Client { parent, .. } => parent.name(),
        }
    }

    pub fn route_name(&self) -> &str {
        match self {
            QueryPath::Root { root } => root.route_name(),
            QueryPath::Node { route_name, .. } => route_name,
            QueryPath::Client { parent, .. } => parent.route_name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{QueryField, QueryIdGenerator};
    use serde_json::json;

    fn viewer_root() -> QueryRoot {
        QueryRoot::builder("viewer")
            .name("ViewerQuery")
            .type_name("Viewer")
            .route("AppRoute")
            .build_with(&QueryIdGenerator::new())
    }

    #[test]
    fn node_root_collapses_to_node_path() {
        let root = QueryRoot::builder("node")
            .name("FetchNode")
            .identifying_arg("id", "ID!", json!("123"))
            .build_with(&QueryIdGenerator::new());
        let path = QueryPath::create(&root);
        assert_eq!(
            path,
            QueryPath::Node {
                data_id: "123".into(),
                name: "FetchNode".into(),
                route_name: DEFAULT_ROUTE_NAME.into(),
            }
        );
    }

    #[test]
    fn plural_node_root_stays_a_root_path() {
        let root = QueryRoot::builder("node")
            .identifying_arg("id", "ID!", json!(["1", "2"]))
            .build_with(&QueryIdGenerator::new());
        assert!(matches!(QueryPath::create(&root), QueryPath::Root { .. }));
    }

    #[test]
    fn create_for_client_id_fails() {
        let err = QueryPath::create_for_id("client:1".into(), "Q", None).unwrap_err();
        assert!(matches!(err, CoreError::ClientIdNodePath { .. }));
    }

    #[test]
    fn client_steps_chain_to_their_parent() {
        let root = Arc::new(QueryPath::create(&viewer_root()));
        let actor: QueryNode = QueryField::builder("actor").linked().build().into();

        let client = QueryPath::get_path(&root, &actor, Some(&"client:0".into()));
        assert!(!client.is_root_path());
        assert_eq!(client.parent().unwrap(), &root);
        assert_eq!(client.name(), "ViewerQuery");
        assert_eq!(client.route_name(), "AppRoute");

        let server = QueryPath::get_path(&client, &actor, Some(&"42".into()));
        assert!(server.is_root_path());
        assert_eq!(server.name(), "ViewerQuery");
        assert!(matches!(server.parent(), Err(CoreError::RootPathParent)));
    }

    #[test]
    fn same_node_reuses_parent_path() {
        let parent = Arc::new(QueryPath::create_for_id("7".into(), "Q", Some("R")).unwrap());
        let field: QueryNode = QueryField::scalar("name").into();
        let path = QueryPath::get_path(&parent, &field, Some(&"7".into()));
        assert!(Arc::ptr_eq(&path, &parent));
    }
}
