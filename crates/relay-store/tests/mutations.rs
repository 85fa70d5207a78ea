//! Mutation lifecycle tests through `StoreData`.
//!
//! Each test starts from a store populated by a query payload, then drives
//! mutations through optimistic application, commit, failure and rollback
//! and checks both the layered view and the confirmed tier.

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::{json, Map, Value};

use relay_core::{
    Call, ClientMutationId, DataId, Lookup, QueryField, QueryIdGenerator, QueryNode,
    QueryOperation, QueryRoot, RangeOperation,
};
use relay_store::{
    CacheManager, InMemoryCache, MissingData, MutationConfig, MutationStatus, StoreData,
    StoreError, UpdatePayload,
};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn payload(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("payload must be an object, got {}", other),
    }
}

fn friends_field(first: i64) -> QueryField {
    QueryField::builder("friends")
        .connection()
        .type_name("FriendsConnection")
        .call("first", first)
        .child(
            QueryField::builder("edges")
                .plural()
                .type_name("FriendsEdge")
                .child(QueryField::scalar("cursor"))
                .child(
                    QueryField::builder("node")
                        .type_name("User")
                        .child(QueryField::id())
                        .child(QueryField::scalar("name"))
                        .build(),
                )
                .build(),
        )
        .child(
            QueryField::builder("pageInfo")
                .type_name("PageInfo")
                .child(QueryField::scalar("hasNextPage"))
                .child(QueryField::scalar("hasPreviousPage"))
                .build(),
        )
        .build()
}

fn user_query() -> QueryRoot {
    QueryRoot::builder("node")
        .name("UserQuery")
        .identifying_arg("id", "ID!", json!("4"))
        .type_name("User")
        .child(QueryField::id())
        .child(QueryField::scalar("name"))
        .child(QueryField::scalar("status"))
        .child(friends_field(2))
        .build_with(&QueryIdGenerator::new())
}

/// User 4 named Zuck with friends 5 and 6.
fn populated_store() -> StoreData {
    let mut data = StoreData::default();
    data.handle_query_payload(
        &user_query(),
        &payload(json!({"node": {
            "id": "4",
            "name": "Zuck",
            "friends": {
                "edges": [
                    {"cursor": "c5", "node": {"id": "5", "name": "Chris"}},
                    {"cursor": "c6", "node": {"id": "6", "name": "Sheryl"}}
                ],
                "pageInfo": {"hasNextPage": true, "hasPreviousPage": false}
            }
        }})),
        None,
    )
    .unwrap();
    data
}

fn update_user(fields: Value) -> UpdatePayload {
    let operation = QueryOperation::build(
        "UpdateUser",
        "UpdateUserPayload",
        Call::new("updateUser", json!({})),
        vec![QueryField::builder("user")
            .type_name("User")
            .child(QueryField::id())
            .child(QueryField::scalar("name"))
            .child(QueryField::scalar("status"))
            .build()
            .into()],
    );
    UpdatePayload::new(operation, payload(json!({ "user": fields })))
}

fn add_friend(node_id: &str, name: &str) -> UpdatePayload {
    let edge = QueryField::builder("friendEdge")
        .type_name("FriendsEdge")
        .child(QueryField::scalar("cursor"))
        .child(
            QueryField::builder("node")
                .type_name("User")
                .child(QueryField::id())
                .child(QueryField::scalar("name"))
                .build(),
        )
        .build();
    let operation = QueryOperation::build(
        "AddFriend",
        "AddFriendPayload",
        Call::new("addFriend", json!({})),
        vec![QueryNode::from(edge)],
    );
    UpdatePayload::new(
        operation,
        payload(json!({
            "friendEdge": {"cursor": format!("c{}", node_id), "node": {"id": node_id, "name": name}}
        })),
    )
    .with_config(MutationConfig::RangeAdd {
        parent_id: Some("4".into()),
        connection_name: "friends".into(),
        edge_name: "friendEdge".into(),
        range_behavior: RangeOperation::Prepend,
    })
}

fn friends_connection(data: &StoreData) -> DataId {
    data.record_store()
        .get_linked_record_id(&"4".into(), "friends")
        .found()
        .cloned()
        .expect("friends connection")
}

fn friend_edges(data: &StoreData, first: i64) -> Vec<DataId> {
    let connection = friends_connection(data);
    match data
        .queued_store()
        .get_range_metadata(&connection, &[Call::new("first", first)])
        .unwrap()
    {
        Lookup::Found(metadata) => metadata.requested_edge_ids,
        other => panic!("expected a range, got {:?}", other),
    }
}

fn name_of(data: &StoreData, id: &str) -> Option<Value> {
    data.queued_store()
        .get_scalar(&id.into(), "name")
        .found()
        .cloned()
}

// ---------------------------------------------------------------------------
// Optimistic isolation
// ---------------------------------------------------------------------------

#[test]
fn rolling_back_one_mutation_keeps_the_others() {
    let mut data = populated_store();
    let a = data.create_mutation();
    let b = data.create_mutation();
    data.apply_optimistic_mutation(&a, update_user(json!({"id": "4", "name": "Mark"})))
        .unwrap();
    data.apply_optimistic_mutation(&b, update_user(json!({"id": "4", "status": "busy"})))
        .unwrap();

    assert_eq!(name_of(&data, "4"), Some(json!("Mark")));
    assert_eq!(
        data.client_mutation_ids(&"4".into()),
        vec![a.clone(), b.clone()]
    );

    data.rollback_mutation(&a).unwrap();

    let store = data.queued_store();
    assert_eq!(name_of(&data, "4"), Some(json!("Zuck")));
    assert_eq!(store.get_scalar(&"4".into(), "status").found(), Some(&json!("busy")));
    assert_eq!(data.client_mutation_ids(&"4".into()), vec![b.clone()]);
    assert_eq!(data.mutation_status(&a), Some(MutationStatus::RolledBack));
    assert_eq!(data.mutation_status(&b), Some(MutationStatus::Uncommitted));

    // The confirmed tier never saw either mutation.
    let base = data.record_store();
    assert_eq!(base.get_scalar(&"4".into(), "name").found(), Some(&json!("Zuck")));
    assert!(base.get_scalar(&"4".into(), "status").is_undefined());
    assert!(!data.record_store().has_optimistic_update(&"4".into()));
}

#[test]
fn optimistic_writes_need_a_client_mutation_id() {
    let mut data = populated_store();
    let err = data
        .handle_update_payload(&update_user(json!({"id": "4", "name": "Mark"})), true)
        .unwrap_err();
    assert!(matches!(err, StoreError::MissingClientMutationId { .. }));
    assert_eq!(name_of(&data, "4"), Some(json!("Zuck")));
}

#[test]
fn failed_mutations_drop_their_optimistic_data() {
    let mut data = populated_store();
    let id = data.create_mutation();
    data.apply_optimistic_mutation(&id, update_user(json!({"id": "4", "name": "Mark"})))
        .unwrap();
    assert!(data.has_optimistic_update(&"4".into()));

    data.fail_mutation(&id).unwrap();
    assert_eq!(data.mutation_status(&id), Some(MutationStatus::CommitFailed));
    assert!(!data.has_optimistic_update(&"4".into()));
    assert_eq!(name_of(&data, "4"), Some(json!("Zuck")));

    // A failed mutation can be retried to completion.
    data.commit_mutation(&id, &update_user(json!({"id": "4", "name": "Mark"})))
        .unwrap();
    assert_eq!(data.mutation_status(&id), Some(MutationStatus::Committed));
    assert_eq!(name_of(&data, "4"), Some(json!("Mark")));
}

#[test]
fn final_mutations_cannot_change_status() {
    let mut data = populated_store();
    let id = data.create_mutation();
    data.rollback_mutation(&id).unwrap();
    let err = data
        .commit_mutation(&id, &update_user(json!({"id": "4", "name": "Mark"})))
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidMutationStatus { .. }));
    assert!(matches!(
        data.rollback_mutation(&ClientMutationId::from("missing")),
        Err(StoreError::MutationNotFound { .. })
    ));
}

// ---------------------------------------------------------------------------
// Ranges
// ---------------------------------------------------------------------------

#[test]
fn committed_prepend_reads_like_the_optimistic_one() {
    let mut data = populated_store();
    let connection = friends_connection(&data);
    let edge = |node: &str| DataId::from(format!("client:{}:{}", connection, node));

    assert_eq!(friend_edges(&data, 3), vec![edge("5"), edge("6")]);

    let id = data.create_mutation();
    data.apply_optimistic_mutation(&id, add_friend("7", "Dustin"))
        .unwrap();
    let optimistic = friend_edges(&data, 3);
    assert_eq!(optimistic, vec![edge("7"), edge("5"), edge("6")]);
    // The confirmed range is untouched until the server answers.
    match data
        .record_store()
        .get_range_metadata(&connection, &[Call::new("first", 3)])
        .unwrap()
    {
        Lookup::Found(metadata) => assert_eq!(metadata.requested_edge_ids, vec![edge("5"), edge("6")]),
        other => panic!("expected a range, got {:?}", other),
    }

    data.commit_mutation(&id, &add_friend("7", "Dustin")).unwrap();
    assert!(!data.has_optimistic_update(&connection));
    assert_eq!(friend_edges(&data, 3), optimistic);
    assert_eq!(name_of(&data, "7"), Some(json!("Dustin")));
    assert_eq!(
        data.record_store().get_connection_ids_for_node(&"7".into()),
        Some(vec![connection])
    );
}

#[test]
fn node_delete_removes_the_node_from_its_connections() {
    let mut data = populated_store();
    let connection = friends_connection(&data);
    let operation = QueryOperation::build(
        "RemoveFriend",
        "RemoveFriendPayload",
        Call::new("removeFriend", json!({})),
        Vec::new(),
    );
    let update = UpdatePayload::new(operation, payload(json!({"deletedId": "5"}))).with_config(
        MutationConfig::NodeDelete {
            deleted_id_field_name: "deletedId".into(),
        },
    );

    let changes = data.handle_update_payload(&update, false).unwrap();
    assert!(changes.updated.contains(&connection));
    assert!(changes.updated.contains("5"));
    assert_eq!(
        friend_edges(&data, 2),
        vec![DataId::from(format!("client:{}:6", connection))]
    );
    assert!(data.record_store().get_scalar(&"5".into(), "name").is_null());
    assert_eq!(data.record_store().get_connection_ids_for_node(&"5".into()), None);
}

#[test]
fn forced_fetches_replace_the_range() {
    let mut data = populated_store();
    let connection = friends_connection(&data);
    let force_index = data.next_force_index();
    data.handle_query_payload(
        &user_query(),
        &payload(json!({"node": {
            "id": "4",
            "friends": {
                "edges": [{"cursor": "c8", "node": {"id": "8", "name": "Naomi"}}],
                "pageInfo": {"hasNextPage": false, "hasPreviousPage": false}
            }
        }})),
        Some(force_index),
    )
    .unwrap();
    assert_eq!(
        friend_edges(&data, 2),
        vec![DataId::from(format!("client:{}:8", connection))]
    );
}

// ---------------------------------------------------------------------------
// Notifications and cache
// ---------------------------------------------------------------------------

#[test]
fn every_pass_broadcasts_its_changes() {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    let mut data = populated_store();
    data.inject_change_emitter(Box::new(move |id: &DataId| sink.borrow_mut().push(id.clone())));

    let id = data.create_mutation();
    data.apply_optimistic_mutation(&id, update_user(json!({"id": "4", "name": "Mark"})))
        .unwrap();
    assert_eq!(*seen.borrow(), vec![DataId::from("4")]);

    seen.borrow_mut().clear();
    data.rollback_mutation(&id).unwrap();
    assert_eq!(*seen.borrow(), vec![DataId::from("4")]);
}

#[test]
fn queries_restore_from_a_written_through_cache() {
    let mut writer = StoreData::default();
    writer.inject_cache_manager(Box::new(InMemoryCache::new()));
    writer
        .handle_query_payload(
            &user_query(),
            &payload(json!({"node": {"id": "4", "name": "Zuck", "status": "online"}})),
            None,
        )
        .unwrap();
    let cache: Box<dyn CacheManager> = writer.clear_cache_manager().unwrap();

    let mut reader = StoreData::default();
    reader.inject_cache_manager(cache);
    let query = QueryRoot::builder("node")
        .identifying_arg("id", "ID!", json!("4"))
        .type_name("User")
        .child(QueryField::id())
        .child(QueryField::scalar("name"))
        .build_with(&QueryIdGenerator::new());

    let succeeded = Rc::new(RefCell::new(false));
    let flag = Rc::clone(&succeeded);
    let outcome = reader.restore_queries_from_cache(
        &[query],
        move |_| *flag.borrow_mut() = true,
        |outcome| panic!("restore failed: {:?}", outcome.missing),
    );
    assert!(*succeeded.borrow());
    assert_eq!(outcome.restored, vec![DataId::from("4")]);
    assert_eq!(
        reader.queued_store().get_scalar(&"4".into(), "name").found(),
        Some(&json!("Zuck"))
    );
    // Restored data lives in the cached tier only.
    assert!(reader.record_store().get_record(&"4".into()).is_undefined());
}

#[test]
fn missing_cache_entries_fail_the_restore() {
    let mut data = StoreData::default();
    data.inject_cache_manager(Box::new(InMemoryCache::new()));
    let mut missing = Vec::new();
    data.restore_queries_from_cache(
        &[user_query()],
        |_| panic!("nothing was cached"),
        |outcome| missing = outcome.missing.clone(),
    );
    assert_eq!(
        missing,
        vec![MissingData::Record {
            data_id: "4".into()
        }]
    );
}
