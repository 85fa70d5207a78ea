//! The query tree: a closed set of node kinds describing what to fetch.
//!
//! [`QueryNode`] is a sum type over roots, fields, fragments, mutations and
//! subscriptions. The store only consumes it through a narrow surface:
//! storage keys, children, calls and a handful of metadata flags. Derived
//! values such as storage keys are computed once when a node is built and
//! never mutated afterwards, so every accessor is pure.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;

use crate::call::{is_connection_call, serialize_calls, stable_stringify, Call};
use crate::error::CoreError;
use crate::interface::node;

/// Route name used for nodes built outside of any route.
pub const DEFAULT_ROUTE_NAME: &str = "$RelayQuery";

static GLOBAL_QUERY_IDS: QueryIdGenerator = QueryIdGenerator::new();

/// Monotonic source of anonymous query identifiers (`q0`, `q1`, ...).
///
/// A process-wide instance backs [`RootBuilder::build`]; tests and callers
/// that need deterministic names pass their own to
/// [`RootBuilder::build_with`].
#[derive(Debug)]
pub struct QueryIdGenerator {
    next: AtomicU64,
}

impl QueryIdGenerator {
    pub const fn new() -> Self {
        QueryIdGenerator {
            next: AtomicU64::new(0),
        }
    }

    /// The process-wide generator.
    pub fn global() -> &'static QueryIdGenerator {
        &GLOBAL_QUERY_IDS
    }

    pub fn next_id(&self) -> String {
        format!("q{}", self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for QueryIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// A node of the query tree.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryNode {
    Root(QueryRoot),
    Field(QueryField),
    Fragment(QueryFragment),
    Mutation(QueryOperation),
    Subscription(QueryOperation),
}

impl QueryNode {
    pub fn children(&self) -> &[QueryNode] {
        match self {
            QueryNode::Root(root) => &root.children,
            QueryNode::Field(field) => &field.children,
            QueryNode::Fragment(fragment) => &fragment.children,
            QueryNode::Mutation(op) | QueryNode::Subscription(op) => &op.children,
        }
    }

    pub fn can_have_subselections(&self) -> bool {
        match self {
            QueryNode::Field(field) => field.metadata.can_have_subselections,
            _ => true,
        }
    }

    /// Returns a copy of this node with `children` in place of its own.
    ///
    /// Returns `Ok(None)` when the clone would have no children, because an
    /// empty selection cannot be fetched. Leaf fields are returned unchanged
    /// when `children` is empty and rejected otherwise.
    pub fn clone_with_children(
        &self,
        children: Vec<QueryNode>,
    ) -> Result<Option<QueryNode>, CoreError> {
        if !self.can_have_subselections() {
            if !children.is_empty() {
                let field = match self {
                    QueryNode::Field(field) => field.schema_name.clone(),
                    _ => String::new(),
                };
                return Err(CoreError::LeafChildren { field });
            }
            return Ok(Some(self.clone()));
        }
        if children.is_empty() {
            return Ok(None);
        }
        let mut clone = self.clone();
        match &mut clone {
            QueryNode::Root(root) => root.children = children,
            QueryNode::Field(field) => field.children = children,
            QueryNode::Fragment(fragment) => fragment.children = children,
            QueryNode::Mutation(op) | QueryNode::Subscription(op) => op.children = children,
        }
        Ok(Some(clone))
    }

    /// Finds the direct child field with the given storage key.
    pub fn field_by_storage_key(&self, storage_key: &str) -> Option<&QueryField> {
        self.children().iter().find_map(|child| match child {
            QueryNode::Field(field) if field.storage_key == storage_key => Some(field),
            _ => None,
        })
    }

    pub fn is_abstract(&self) -> bool {
        match self {
            QueryNode::Root(root) => root.metadata.is_abstract,
            QueryNode::Field(field) => field.metadata.is_abstract,
            QueryNode::Fragment(fragment) => fragment.metadata.is_abstract,
            QueryNode::Mutation(_) | QueryNode::Subscription(_) => false,
        }
    }

    pub fn type_name(&self) -> &str {
        match self {
            QueryNode::Root(root) => &root.type_name,
            QueryNode::Field(field) => &field.type_name,
            QueryNode::Fragment(fragment) => &fragment.type_condition,
            QueryNode::Mutation(op) | QueryNode::Subscription(op) => &op.response_type,
        }
    }

    pub fn route_name(&self) -> &str {
        match self {
            QueryNode::Root(root) => &root.route_name,
            QueryNode::Field(field) => &field.route_name,
            QueryNode::Fragment(fragment) => &fragment.route_name,
            QueryNode::Mutation(op) | QueryNode::Subscription(op) => &op.route_name,
        }
    }

    pub fn as_field(&self) -> Option<&QueryField> {
        match self {
            QueryNode::Field(field) => Some(field),
            _ => None,
        }
    }

    pub fn as_root(&self) -> Option<&QueryRoot> {
        match self {
            QueryNode::Root(root) => Some(root),
            _ => None,
        }
    }

    pub fn as_fragment(&self) -> Option<&QueryFragment> {
        match self {
            QueryNode::Fragment(fragment) => Some(fragment),
            _ => None,
        }
    }
}

impl From<QueryField> for QueryNode {
    fn from(field: QueryField) -> Self {
        QueryNode::Field(field)
    }
}

impl From<QueryFragment> for QueryNode {
    fn from(fragment: QueryFragment) -> Self {
        QueryNode::Fragment(fragment)
    }
}

impl From<QueryRoot> for QueryNode {
    fn from(root: QueryRoot) -> Self {
        QueryNode::Root(root)
    }
}

// ---------------------------------------------------------------------------
// Fields
// ---------------------------------------------------------------------------

/// Schema-derived flags of a field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldMetadata {
    pub can_have_subselections: bool,
    pub is_abstract: bool,
    pub is_connection: bool,
    pub is_findable: bool,
    pub is_generated: bool,
    pub is_plural: bool,
    pub is_requisite: bool,
    /// Field to request instead of `id` when refetching records reached
    /// through this field.
    pub inferred_primary_key: Option<String>,
    pub inferred_root_call_name: Option<String>,
}

/// A field selection.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryField {
    schema_name: String,
    alias: Option<String>,
    calls: Vec<Call>,
    children: Vec<QueryNode>,
    type_name: String,
    metadata: FieldMetadata,
    route_name: String,
    storage_key: String,
}

impl QueryField {
    pub fn builder(schema_name: impl Into<String>) -> FieldBuilder {
        FieldBuilder {
            schema_name: schema_name.into(),
            alias: None,
            calls: Vec::new(),
            children: Vec::new(),
            type_name: "String".to_string(),
            metadata: FieldMetadata::default(),
            route_name: DEFAULT_ROUTE_NAME.to_string(),
        }
    }

    /// A scalar leaf field.
    pub fn scalar(schema_name: impl Into<String>) -> QueryField {
        Self::builder(schema_name).build()
    }

    /// The generated `id` field requested on refetchable records.
    pub fn id() -> QueryField {
        Self::builder(node::ID).generated().requisite().build()
    }

    /// The generated `__typename` field.
    pub fn typename() -> QueryField {
        Self::builder(node::TYPENAME).generated().requisite().build()
    }

    /// The canonical name of the field in the schema.
    pub fn schema_name(&self) -> &str {
        &self.schema_name
    }

    /// The name under which the field appears in a response payload.
    pub fn application_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.schema_name)
    }

    /// The key under which the field's value is stored on a record:
    /// schema name plus the canonical serialization of its core calls.
    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }

    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    pub fn children(&self) -> &[QueryNode] {
        &self.children
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn metadata(&self) -> &FieldMetadata {
        &self.metadata
    }

    pub fn route_name(&self) -> &str {
        &self.route_name
    }

    pub fn is_connection(&self) -> bool {
        self.metadata.is_connection
    }

    pub fn is_plural(&self) -> bool {
        self.metadata.is_plural
    }

    pub fn can_have_subselections(&self) -> bool {
        self.metadata.can_have_subselections
    }

    pub fn inferred_primary_key(&self) -> Option<&str> {
        self.metadata.inferred_primary_key.as_deref()
    }

    /// Finds the direct child field with the given storage key.
    pub fn field_by_storage_key(&self, storage_key: &str) -> Option<&QueryField> {
        self.children.iter().find_map(|child| match child {
            QueryNode::Field(field) if field.storage_key == storage_key => Some(field),
            _ => None,
        })
    }

    /// Calls that affect which results are returned. Pagination calls on
    /// connections and no-op conditionals are dropped.
    pub fn core_calls(&self) -> Vec<Call> {
        self.calls
            .iter()
            .filter(|call| is_core_arg(call, self.metadata.is_connection))
            .cloned()
            .collect()
    }
}

fn is_core_arg(call: &Call, is_connection: bool) -> bool {
    let as_text = match &call.value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    // `name(if: true)`, `name(unless: false)` and `name` are equivalent.
    !(call.name == "if" && as_text == "true")
        && !(call.name == "unless" && as_text == "false")
        && !(is_connection && is_connection_call(call))
}

/// Builder for [`QueryField`].
#[derive(Debug, Clone)]
pub struct FieldBuilder {
    schema_name: String,
    alias: Option<String>,
    calls: Vec<Call>,
    children: Vec<QueryNode>,
    type_name: String,
    metadata: FieldMetadata,
    route_name: String,
}

impl FieldBuilder {
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn call(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.calls.push(Call::new(name, value));
        self
    }

    pub fn calls(mut self, calls: Vec<Call>) -> Self {
        self.calls.extend(calls);
        self
    }

    pub fn child(mut self, child: impl Into<QueryNode>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn children(mut self, children: Vec<QueryNode>) -> Self {
        self.children.extend(children);
        self
    }

    pub fn type_name(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = type_name.into();
        self
    }

    /// Marks the field as linking to records even before children are added.
    pub fn linked(mut self) -> Self {
        self.metadata.can_have_subselections = true;
        self
    }

    pub fn connection(mut self) -> Self {
        self.metadata.is_connection = true;
        self.metadata.can_have_subselections = true;
        self
    }

    pub fn plural(mut self) -> Self {
        self.metadata.is_plural = true;
        self
    }

    pub fn abstract_type(mut self) -> Self {
        self.metadata.is_abstract = true;
        self
    }

    pub fn findable(mut self) -> Self {
        self.metadata.is_findable = true;
        self
    }

    pub fn generated(mut self) -> Self {
        self.metadata.is_generated = true;
        self
    }

    pub fn requisite(mut self) -> Self {
        self.metadata.is_requisite = true;
        self
    }

    pub fn primary_key(mut self, key: impl Into<String>) -> Self {
        self.metadata.inferred_primary_key = Some(key.into());
        self
    }

    pub fn root_call_name(mut self, name: impl Into<String>) -> Self {
        self.metadata.inferred_root_call_name = Some(name.into());
        self
    }

    pub fn route(mut self, route_name: impl Into<String>) -> Self {
        self.route_name = route_name.into();
        self
    }

    pub fn build(self) -> QueryField {
        let mut metadata = self.metadata;
        if !self.children.is_empty() {
            metadata.can_have_subselections = true;
        }
        let core: Vec<Call> = self
            .calls
            .iter()
            .filter(|call| is_core_arg(call, metadata.is_connection))
            .cloned()
            .collect();
        let storage_key = format!("{}{}", self.schema_name, serialize_calls(&core));
        QueryField {
            schema_name: self.schema_name,
            alias: self.alias,
            calls: self.calls,
            children: self.children,
            type_name: self.type_name,
            metadata,
            route_name: self.route_name,
            storage_key,
        }
    }
}

// ---------------------------------------------------------------------------
// Roots
// ---------------------------------------------------------------------------

/// Flags of a root query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RootMetadata {
    pub identifying_arg_name: Option<String>,
    pub identifying_arg_type: Option<String>,
    pub is_abstract: bool,
    pub is_deferred: bool,
    pub is_plural: bool,
}

/// A reference to the results of another query, used to batch dependent
/// root calls into one request.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchCall {
    pub ref_param_name: String,
    pub source_query_id: String,
    pub source_query_path: String,
}

/// A root query such as `viewer` or `node(id: "4")`.
#[derive(Debug, Clone)]
pub struct QueryRoot {
    id: String,
    name: String,
    field_name: String,
    calls: Vec<Call>,
    children: Vec<QueryNode>,
    type_name: String,
    metadata: RootMetadata,
    batch_call: Option<BatchCall>,
    route_name: String,
    storage_key: String,
}

impl QueryRoot {
    pub fn builder(field_name: impl Into<String>) -> RootBuilder {
        RootBuilder {
            name: None,
            field_name: field_name.into(),
            calls: Vec::new(),
            children: Vec::new(),
            type_name: node::NODE_TYPE.to_string(),
            metadata: RootMetadata::default(),
            batch_call: None,
            route_name: DEFAULT_ROUTE_NAME.to_string(),
        }
    }

    /// The `node(id:)` query used to refetch any server-identified record.
    pub fn node_query(
        name: &str,
        data_id: &str,
        children: Vec<QueryNode>,
        route_name: &str,
    ) -> QueryRoot {
        QueryRoot::builder(node::NODE)
            .name(name)
            .identifying_arg(node::ID, node::ID_TYPE, Value::String(data_id.to_string()))
            .children(children)
            .type_name(node::NODE_TYPE)
            .abstract_type()
            .route(route_name)
            .build()
    }

    /// Unique identifier of this query instance.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    pub fn children(&self) -> &[QueryNode] {
        &self.children
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn metadata(&self) -> &RootMetadata {
        &self.metadata
    }

    pub fn route_name(&self) -> &str {
        &self.route_name
    }

    pub fn batch_call(&self) -> Option<&BatchCall> {
        self.batch_call.as_ref()
    }

    pub fn is_abstract(&self) -> bool {
        self.metadata.is_abstract
    }

    pub fn is_deferred(&self) -> bool {
        self.metadata.is_deferred
    }

    pub fn is_plural(&self) -> bool {
        self.metadata.is_plural
    }

    /// The call that identifies which record the root resolves to.
    pub fn identifying_arg(&self) -> Option<&Call> {
        let name = self.metadata.identifying_arg_name.as_deref()?;
        self.calls.iter().find(|call| call.name == name)
    }

    /// Field name plus the canonical serialization of all non-identifying
    /// calls.
    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }

    /// Finds the direct child field with the given storage key.
    pub fn field_by_storage_key(&self, storage_key: &str) -> Option<&QueryField> {
        self.children.iter().find_map(|child| match child {
            QueryNode::Field(field) if field.storage_key == storage_key => Some(field),
            _ => None,
        })
    }

    /// Returns a copy with `children` bound to the route `route_name`.
    ///
    /// Returns `None` when `children` is empty.
    pub fn clone_with_route(&self, children: Vec<QueryNode>, route_name: &str) -> Option<QueryRoot> {
        if children.is_empty() {
            return None;
        }
        let mut clone = self.clone();
        clone.children = children;
        if clone.route_name != route_name {
            clone.name = route_name.to_string();
            clone.route_name = route_name.to_string();
        }
        Some(clone)
    }
}

impl PartialEq for QueryRoot {
    // Identity (`id`) and display name do not affect what a root fetches.
    fn eq(&self, other: &Self) -> bool {
        self.field_name == other.field_name
            && self.calls == other.calls
            && self.batch_call == other.batch_call
            && self.type_name == other.type_name
            && self.children == other.children
    }
}

/// Builder for [`QueryRoot`].
#[derive(Debug, Clone)]
pub struct RootBuilder {
    name: Option<String>,
    field_name: String,
    calls: Vec<Call>,
    children: Vec<QueryNode>,
    type_name: String,
    metadata: RootMetadata,
    batch_call: Option<BatchCall>,
    route_name: String,
}

impl RootBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Adds the identifying argument, e.g. `id` for `node(id:)` or `name`
    /// for `username(name:)`. The value may be an array for plural roots.
    pub fn identifying_arg(
        mut self,
        name: impl Into<String>,
        arg_type: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        let name = name.into();
        self.metadata.identifying_arg_name = Some(name.clone());
        self.metadata.identifying_arg_type = Some(arg_type.into());
        self.calls.push(Call::new(name, value));
        self
    }

    pub fn call(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.calls.push(Call::new(name, value));
        self
    }

    pub fn child(mut self, child: impl Into<QueryNode>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn children(mut self, children: Vec<QueryNode>) -> Self {
        self.children.extend(children);
        self
    }

    pub fn type_name(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = type_name.into();
        self
    }

    pub fn abstract_type(mut self) -> Self {
        self.metadata.is_abstract = true;
        self
    }

    pub fn deferred(mut self) -> Self {
        self.metadata.is_deferred = true;
        self
    }

    pub fn plural(mut self) -> Self {
        self.metadata.is_plural = true;
        self
    }

    pub fn batch_call(mut self, batch_call: BatchCall) -> Self {
        self.batch_call = Some(batch_call);
        self
    }

    pub fn route(mut self, route_name: impl Into<String>) -> Self {
        self.route_name = route_name.into();
        self
    }

    /// Builds the root, naming it from the process-wide id generator.
    pub fn build(self) -> QueryRoot {
        self.build_with(QueryIdGenerator::global())
    }

    pub fn build_with(self, ids: &QueryIdGenerator) -> QueryRoot {
        let id = ids.next_id();
        let identifying = self.metadata.identifying_arg_name.as_deref();
        let non_identifying: Vec<Call> = self
            .calls
            .iter()
            .filter(|call| Some(call.name.as_str()) != identifying)
            .filter(|call| is_core_arg(call, false))
            .cloned()
            .collect();
        let storage_key = format!("{}{}", self.field_name, serialize_calls(&non_identifying));
        QueryRoot {
            name: self.name.unwrap_or_else(|| id.clone()),
            id,
            field_name: self.field_name,
            calls: self.calls,
            children: self.children,
            type_name: self.type_name,
            metadata: self.metadata,
            batch_call: self.batch_call,
            route_name: self.route_name,
            storage_key,
        }
    }
}

// ---------------------------------------------------------------------------
// Fragments and operations
// ---------------------------------------------------------------------------

/// Flags of a fragment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FragmentMetadata {
    pub is_abstract: bool,
    pub is_container: bool,
    pub is_deferred: bool,
    pub is_plural: bool,
    pub is_type_conditional: bool,
}

/// An inline or named fragment on a type.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryFragment {
    fragment_id: String,
    name: String,
    type_condition: String,
    children: Vec<QueryNode>,
    metadata: FragmentMetadata,
    route_name: String,
}

impl QueryFragment {
    /// Builds a type-conditional fragment.
    pub fn build(name: impl Into<String>, type_condition: impl Into<String>, children: Vec<QueryNode>) -> Self {
        let name = name.into();
        QueryFragment {
            fragment_id: name.clone(),
            name,
            type_condition: type_condition.into(),
            children,
            metadata: FragmentMetadata {
                is_type_conditional: true,
                ..FragmentMetadata::default()
            },
            route_name: DEFAULT_ROUTE_NAME.to_string(),
        }
    }

    pub fn with_id(mut self, fragment_id: impl Into<String>) -> Self {
        self.fragment_id = fragment_id.into();
        self
    }

    pub fn with_route(mut self, route_name: impl Into<String>) -> Self {
        self.route_name = route_name.into();
        self
    }

    pub fn with_metadata(mut self, metadata: FragmentMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Identifier used to track whether a record has data for this fragment.
    pub fn fragment_id(&self) -> &str {
        &self.fragment_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_condition(&self) -> &str {
        &self.type_condition
    }

    pub fn children(&self) -> &[QueryNode] {
        &self.children
    }

    pub fn metadata(&self) -> &FragmentMetadata {
        &self.metadata
    }

    pub fn is_deferred(&self) -> bool {
        self.metadata.is_deferred
    }
}

/// A mutation or subscription: one call with an input object.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOperation {
    name: String,
    response_type: String,
    call: Call,
    children: Vec<QueryNode>,
    route_name: String,
}

impl QueryOperation {
    pub fn build(
        name: impl Into<String>,
        response_type: impl Into<String>,
        call: Call,
        children: Vec<QueryNode>,
    ) -> Self {
        QueryOperation {
            name: name.into(),
            response_type: response_type.into(),
            call,
            children,
            route_name: DEFAULT_ROUTE_NAME.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn response_type(&self) -> &str {
        &self.response_type
    }

    pub fn call(&self) -> &Call {
        &self.call
    }

    pub fn children(&self) -> &[QueryNode] {
        &self.children
    }

    pub fn route_name(&self) -> &str {
        &self.route_name
    }
}

// ---------------------------------------------------------------------------
// Printing
// ---------------------------------------------------------------------------

fn write_calls(f: &mut fmt::Formatter<'_>, calls: &[Call]) -> fmt::Result {
    if calls.is_empty() {
        return Ok(());
    }
    write!(f, "(")?;
    for (ii, call) in calls.iter().enumerate() {
        if ii > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}: {}", call.name, stable_stringify(&call.value))?;
    }
    write!(f, ")")
}

fn write_selection(f: &mut fmt::Formatter<'_>, children: &[QueryNode]) -> fmt::Result {
    if children.is_empty() {
        return Ok(());
    }
    write!(f, " {{")?;
    for child in children {
        write!(f, " {}", child)?;
    }
    write!(f, " }}")
}

impl fmt::Display for QueryNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryNode::Root(root) => write!(f, "{}", root),
            QueryNode::Field(field) => {
                if let Some(alias) = &field.alias {
                    write!(f, "{}: ", alias)?;
                }
                write!(f, "{}", field.schema_name)?;
                write_calls(f, &field.calls)?;
                write_selection(f, &field.children)
            }
            QueryNode::Fragment(fragment) => {
                write!(f, "... on {}", fragment.type_condition)?;
                write_selection(f, &fragment.children)
            }
            QueryNode::Mutation(op) => write_operation(f, "mutation", op),
            QueryNode::Subscription(op) => write_operation(f, "subscription", op),
        }
    }
}

fn write_operation(f: &mut fmt::Formatter<'_>, keyword: &str, op: &QueryOperation) -> fmt::Result {
    write!(
        f,
        "{} {} {{ {}(input: {})",
        keyword,
        op.name,
        op.call.name,
        stable_stringify(&op.call.value)
    )?;
    write_selection(f, &op.children)?;
    write!(f, " }}")
}

impl fmt::Display for QueryRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "query {} {{ {}", self.name, self.field_name)?;
        write_calls(f, &self.calls)?;
        write_selection(f, &self.children)?;
        write!(f, " }}")
    }
}
