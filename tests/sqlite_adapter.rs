mod support;

use pretty_assertions::assert_eq;
use relsql::ast::{ComparisonOperator, Condition, Query};
use relsql::db::{QueryOptions, RelationTarget};
use relsql::AdapterError;
use serde_json::{json, Value};
use support::{database, first_id, record, row_count};

fn ids(items: &[relsql::Record]) -> Vec<i64> {
    let mut ids: Vec<i64> = items.iter().filter_map(|r| r["id"].as_i64()).collect();
    ids.sort_unstable();
    ids
}

/// Keys of the related objects attached under `field`, in attachment order.
fn linked_ids(row: &relsql::Record, field: &str) -> Vec<i64> {
    row[field]
        .as_array()
        .map(|items| items.iter().filter_map(|item| item["id"].as_i64()).collect())
        .unwrap_or_default()
}

// ==================== Schema sync ====================

#[tokio::test]
async fn test_sync_creates_every_table() {
    let db = database().await;
    let result = db
        .query("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name", &[])
        .await
        .unwrap();
    let tables: Vec<&str> = result
        .rows
        .iter()
        .filter_map(|r| r["name"].as_str())
        .collect();
    for table in [
        "Permission",
        "Person",
        "PersonHasFriends",
        "Post",
        "PostHasTags",
        "Role",
        "RoleHasPermissions",
        "RoleLabelsList",
        "RoleScoresList",
        "Role_translation",
        "User",
    ] {
        assert!(tables.contains(&table), "missing table {}: {:?}", table, tables);
    }
}

#[tokio::test]
async fn test_sync_is_a_full_reset() {
    let db = database().await;
    db.insert_one("Tag", &record(json!({"name": "a"}))).await.unwrap();
    db.init(&Default::default()).await.unwrap();
    assert_eq!(row_count(&db, "Tag").await, 0);
}

// ==================== Insert / find ====================

#[tokio::test]
async fn test_insert_one_returns_stored_row() {
    let db = database().await;
    let result = db
        .insert_one("User", &record(json!({"name": "ann", "age": 31})))
        .await
        .unwrap();
    let user = result.first().unwrap();
    assert_eq!(user["id"], json!(1));
    assert_eq!(user["name"], json!("ann"));
    assert_eq!(user["age"], json!(31));
    // column default, read back as a boolean
    assert_eq!(user["active"], json!(true));
}

#[tokio::test]
async fn test_insert_all_fills_missing_columns() {
    let db = database().await;
    let result = db
        .insert_all(
            "User",
            &[
                record(json!({"name": "ann", "age": 20})),
                record(json!({"name": "bob"})),
                record(json!({"name": "cid", "active": false})),
            ],
        )
        .await
        .unwrap();
    assert_eq!(ids(&result.items), vec![1, 2, 3]);
    assert_eq!(result.items[1]["age"], Value::Null);
    // default applied where the column was provided for another row
    assert_eq!(result.items[1]["active"], json!(true));
    assert_eq!(result.items[2]["active"], json!(false));
}

#[tokio::test]
async fn test_find_by_model_values() {
    let db = database().await;
    for (name, age) in [("ann", 30), ("bob", 30), ("cid", 40)] {
        db.insert_one("User", &record(json!({"name": name, "age": age})))
            .await
            .unwrap();
    }
    let result = db
        .find_by_model_values("User", &record(json!({"age": 30})), QueryOptions::default())
        .await
        .unwrap();
    assert_eq!(ids(&result.items), vec![1, 2]);

    // unknown fields are ignored
    let result = db
        .find_by_model_values("User", &record(json!({"nickname": "x"})), QueryOptions::default())
        .await
        .unwrap();
    assert_eq!(result.len(), 3);
}

#[tokio::test]
async fn test_object_field_round_trip() {
    let db = database().await;
    let meta = json!({"color": "red", "note": "line1\nline2"});
    let role = db
        .insert_one("Role", &record(json!({"name": "admin", "meta": meta})))
        .await
        .unwrap();
    assert_eq!(role.first().unwrap()["meta"], meta);
}

// ==================== Conditions ====================

type Predicate = fn(&str, Option<i64>) -> bool;

fn case(condition: Condition, predicate: Predicate) -> (Condition, Predicate) {
    (condition, predicate)
}

#[tokio::test]
async fn test_compiled_conditions_agree_with_in_memory_filter() {
    let db = database().await;
    let people = [
        ("ann", Some(15)),
        ("abe", Some(22)),
        ("bob", Some(31)),
        ("bea", Some(40)),
        ("cid", None),
    ];
    for (name, age) in people {
        db.insert_one("User", &record(json!({"name": name, "age": age})))
            .await
            .unwrap();
    }

    let cases = vec![
        case(
            Condition::compare("age", ComparisonOperator::GreaterThanOrEqualTo, 22),
            |_, age| age.is_some_and(|a| a >= 22),
        ),
        case(
            Condition::and(vec![
                Condition::compare("age", ComparisonOperator::GreaterThan, 18),
                Condition::compare("name", ComparisonOperator::Like, "b%"),
            ]),
            |name, age| age.is_some_and(|a| a > 18) && name.starts_with('b'),
        ),
        case(
            Condition::or(vec![
                Condition::eq("name", "cid"),
                Condition::compare("age", ComparisonOperator::LessThan, 20),
            ]),
            |name, age| name == "cid" || age.is_some_and(|a| a < 20),
        ),
        case(
            Condition::compare("age", ComparisonOperator::NotEqualTo, 31),
            |_, age| age.is_some_and(|a| a != 31),
        ),
        case(
            Condition::compare("name", ComparisonOperator::NotLike, "a%"),
            |name, _| !name.starts_with('a'),
        ),
    ];

    for (condition, predicate) in cases {
        let result = db
            .find_by_query(&Query::new("User").filter(condition.clone()))
            .await
            .unwrap();
        let mut found: Vec<String> = result
            .items
            .iter()
            .map(|r| r["name"].as_str().unwrap().to_string())
            .collect();
        found.sort();
        let mut expected: Vec<String> = people
            .iter()
            .filter(|(name, age)| predicate(name, *age))
            .map(|(name, _)| name.to_string())
            .collect();
        expected.sort();
        assert_eq!(found, expected, "condition {:?}", condition);
    }
}

#[tokio::test]
async fn test_field_reference_condition() {
    let db = database().await;
    db.insert_one("Post", &record(json!({"title": "same"}))).await.unwrap();
    let query = Query::new("Post").filter(Condition::fields(
        "title",
        ComparisonOperator::EqualTo,
        "title",
    ));
    assert_eq!(db.find_by_query(&query).await.unwrap().len(), 1);
}

// ==================== Pagination and counting ====================

#[tokio::test]
async fn test_pagination() {
    let db = database().await;
    let rows: Vec<_> = (1..=25)
        .map(|i| record(json!({"resource": format!("r{}", i), "action": "read"})))
        .collect();
    db.insert_all("Permission", &rows).await.unwrap();

    let page = Query::new("Permission").order_by("id", true).limit(10).page(3);
    let result = db.find_by_query(&page).await.unwrap();
    assert_eq!(ids(&result.items), vec![21, 22, 23, 24, 25]);

    let window = Query::new("Permission").order_by("id", true).limit(3).offset(5);
    let result = db.find_by_query(&window).await.unwrap();
    assert_eq!(ids(&result.items), vec![6, 7, 8]);

    let descending = Query::new("Permission").order_by("id", false).limit(2);
    let result = db.find_by_query(&descending).await.unwrap();
    assert_eq!(result.items[0]["id"], json!(25));

    assert_eq!(db.count(&page).await.unwrap(), 25);
}

#[tokio::test]
async fn test_count_by_model_values() {
    let db = database().await;
    for action in ["read", "read", "write"] {
        db.insert_one("Permission", &record(json!({"resource": "doc", "action": action})))
            .await
            .unwrap();
    }
    let count = db
        .count_by_model_values("Permission", &record(json!({"action": "read"})))
        .await
        .unwrap();
    assert_eq!(count, 2);
}

// ==================== Updates ====================

#[tokio::test]
async fn test_update_one_scalars() {
    let db = database().await;
    let id = first_id(&db.insert_one("User", &record(json!({"name": "ann", "age": 30}))).await.unwrap().items);
    let updated = db
        .update_one("User", &record(json!({"id": id, "age": 31, "active": false})))
        .await
        .unwrap();
    let user = updated.first().unwrap();
    assert_eq!(user["name"], json!("ann"));
    assert_eq!(user["age"], json!(31));
    assert_eq!(user["active"], json!(false));
}

#[tokio::test]
async fn test_update_one_requires_key() {
    let db = database().await;
    let err = db
        .update_one("User", &record(json!({"name": "x"})))
        .await
        .unwrap_err();
    assert!(matches!(err, AdapterError::Validation(_)));
}

#[tokio::test]
async fn test_increase() {
    let db = database().await;
    let id = first_id(&db.insert_one("User", &record(json!({"name": "ann", "age": 30}))).await.unwrap().items);
    let result = db.increase("User", &id, "age", 2).await.unwrap();
    assert_eq!(result.first().unwrap()["age"], json!(32));

    let err = db.increase("User", &id, "name", 1).await.unwrap_err();
    assert!(matches!(err, AdapterError::Validation(_)));
}

#[tokio::test]
async fn test_update_all_and_delete_all() {
    let db = database().await;
    for (name, age) in [("ann", 12), ("bob", 16), ("cid", 40)] {
        db.insert_one("User", &record(json!({"name": name, "age": age})))
            .await
            .unwrap();
    }
    let minors = Condition::compare("age", ComparisonOperator::LessThan, 18);

    let updated = db
        .update_all("User", &record(json!({"active": false})), &minors)
        .await
        .unwrap();
    assert_eq!(ids(&updated.items), vec![1, 2]);
    assert!(updated.items.iter().all(|r| r["active"] == json!(false)));

    let deleted = db
        .delete_all("User", &Condition::eq("active", false))
        .await
        .unwrap();
    assert_eq!(deleted.ids.len(), 2);
    assert_eq!(row_count(&db, "User").await, 1);
}

#[tokio::test]
async fn test_bulk_writes_with_elided_conditions_match_every_row() {
    let db = database().await;
    for name in ["ann", "bob"] {
        db.insert_one("User", &record(json!({"name": name}))).await.unwrap();
    }

    let updated = db
        .update_all("User", &record(json!({"age": 50})), &Condition::and(vec![]))
        .await
        .unwrap();
    assert_eq!(ids(&updated.items), vec![1, 2]);
    assert!(updated.items.iter().all(|u| u["age"] == json!(50)));

    let deleted = db
        .delete_all("User", &Condition::eq("nickname", "x"))
        .await
        .unwrap();
    assert_eq!(deleted.ids.len(), 2);
    assert_eq!(row_count(&db, "User").await, 0);
}

// ==================== Relations ====================

#[tokio::test]
async fn test_many_to_many_round_trip() {
    let db = database().await;
    let mut permission_ids = Vec::new();
    for action in ["read", "write", "delete"] {
        let result = db
            .insert_one("Permission", &record(json!({"resource": "doc", "action": action})))
            .await
            .unwrap();
        permission_ids.push(first_id(&result.items));
    }

    let role = db
        .insert_one(
            "Role",
            &record(json!({
                "name": "editor",
                "permissions": [permission_ids[0], {"id": permission_ids[2]}]
            })),
        )
        .await
        .unwrap();
    let role_id = first_id(&role.items);

    let fetched = db
        .find_by_id("Role", &role_id, QueryOptions::default().fetch("permissions"))
        .await
        .unwrap();
    let permissions = fetched.first().unwrap()["permissions"].as_array().unwrap().clone();
    assert_eq!(linked_ids(fetched.first().unwrap(), "permissions"), vec![1, 3]);
    assert_eq!(permissions[1]["action"], json!("delete"));
    assert_eq!(row_count(&db, "RoleHasPermissions").await, 2);

    // replacing links keeps the related rows
    db.update_one("Role", &record(json!({"id": role_id, "permissions": [permission_ids[1]]})))
        .await
        .unwrap();
    let fetched = db
        .find_by_id("Role", &role_id, QueryOptions::default().fetch("permissions"))
        .await
        .unwrap();
    assert_eq!(linked_ids(fetched.first().unwrap(), "permissions"), vec![2]);
    assert_eq!(row_count(&db, "Permission").await, 3);
}

#[tokio::test]
async fn test_many_to_many_fetch_gives_every_row_an_array() {
    let db = database().await;
    db.insert_one("Role", &record(json!({"name": "empty"}))).await.unwrap();
    let result = db
        .find_by_query(&Query::new("Role").fetch("permissions"))
        .await
        .unwrap();
    assert_eq!(result.first().unwrap()["permissions"], json!([]));
}

#[tokio::test]
async fn test_remove_many_to_many_by_condition() {
    let db = database().await;
    for action in ["read", "write"] {
        db.insert_one("Permission", &record(json!({"resource": "doc", "action": action})))
            .await
            .unwrap();
    }
    let role_id = first_id(
        &db.insert_one("Role", &record(json!({"name": "r", "permissions": [1, 2]})))
            .await
            .unwrap()
            .items,
    );

    db.remove_relation(
        "Role",
        &role_id,
        "permissions",
        RelationTarget::Matching(Condition::eq("action", "write")),
    )
    .await
    .unwrap();
    let fetched = db
        .find_by_id("Role", &role_id, QueryOptions::default().fetch("permissions"))
        .await
        .unwrap();
    assert_eq!(linked_ids(fetched.first().unwrap(), "permissions"), vec![1]);
}

#[tokio::test]
async fn test_weak_many_to_many_creates_and_deletes_related_rows() {
    let db = database().await;
    let post = db
        .insert_one(
            "Post",
            &record(json!({"title": "hello", "tags": [{"name": "rust"}, {"name": "sql"}]})),
        )
        .await
        .unwrap();
    let post_id = first_id(&post.items);
    assert_eq!(row_count(&db, "Tag").await, 2);

    let fetched = db
        .find_by_query(&Query::new("Post").fetch_fields("tags", ["name"]))
        .await
        .unwrap();
    let names: Vec<&str> = fetched.first().unwrap()["tags"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|t| t["name"].as_str())
        .collect();
    assert_eq!(names, vec!["rust", "sql"]);

    db.remove_relation("Post", &post_id, "tags", RelationTarget::All)
        .await
        .unwrap();
    assert_eq!(row_count(&db, "Tag").await, 0);
    assert_eq!(row_count(&db, "PostHasTags").await, 0);
}

#[tokio::test]
async fn test_self_referencing_many_to_many() {
    let db = database().await;
    for name in ["ann", "bob"] {
        db.insert_one("Person", &record(json!({"name": name}))).await.unwrap();
    }
    let cid = db
        .insert_one("Person", &record(json!({"name": "cid", "friends": [1, 2]})))
        .await
        .unwrap();
    let fetched = db
        .find_by_id("Person", &first_id(&cid.items), QueryOptions::default().fetch("friends"))
        .await
        .unwrap();
    let friends: Vec<&str> = fetched.first().unwrap()["friends"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|f| f["name"].as_str())
        .collect();
    assert_eq!(friends, vec!["ann", "bob"]);
}

#[tokio::test]
async fn test_weak_one_to_many_removal_deletes_related_row() {
    let db = database().await;
    let user = db
        .insert_one("User", &record(json!({"name": "ann", "profile": {"bio": "hi"}})))
        .await
        .unwrap();
    let user_id = first_id(&user.items);
    assert_eq!(user.first().unwrap()["profile"], json!(1));
    assert_eq!(row_count(&db, "Profile").await, 1);

    db.remove_relation("User", &user_id, "profile", RelationTarget::All)
        .await
        .unwrap();
    assert_eq!(row_count(&db, "Profile").await, 0);
    let user = db.find_by_id("User", &user_id, QueryOptions::default()).await.unwrap();
    assert_eq!(user.first().unwrap()["profile"], json!(0));
}

#[tokio::test]
async fn test_non_weak_removal_only_clears_the_key() {
    let db = database().await;
    let author = first_id(&db.insert_one("User", &record(json!({"name": "ann"}))).await.unwrap().items);
    let post = db
        .insert_one("Post", &record(json!({"title": "t", "author": author})))
        .await
        .unwrap();
    let post_id = first_id(&post.items);
    assert_eq!(post.first().unwrap()["author"], author);

    db.remove_relation("Post", &post_id, "author", RelationTarget::All)
        .await
        .unwrap();
    assert_eq!(row_count(&db, "User").await, 1);
    let post = db.find_by_id("Post", &post_id, QueryOptions::default()).await.unwrap();
    assert_eq!(post.first().unwrap()["author"], json!(0));
}

#[tokio::test]
async fn test_invalid_related_id_is_a_validation_error() {
    let db = database().await;
    let err = db
        .insert_one("Post", &record(json!({"title": "t", "author": {"name": "nobody"}})))
        .await
        .unwrap_err();
    assert!(matches!(err, AdapterError::Validation(_)), "{:?}", err);
}

#[tokio::test]
async fn test_embedded_relation_fetch() {
    let db = database().await;
    let author = first_id(
        &db.insert_one("User", &record(json!({"name": "ann", "age": 30})))
            .await
            .unwrap()
            .items,
    );
    db.insert_one("Post", &record(json!({"title": "t", "author": author})))
        .await
        .unwrap();

    let query = Query::new("Post").fetch_fields("author", ["id", "name", "active"]);
    let result = db.find_by_query(&query).await.unwrap();
    assert_eq!(
        result.first().unwrap()["author"],
        json!({"id": 1, "name": "ann", "active": true})
    );
}

#[tokio::test]
async fn test_embedded_relation_keeps_quotes_and_backslashes() {
    let db = database().await;
    let name = r#"ann "the \ admin""#;
    let author = first_id(
        &db.insert_one("User", &record(json!({"name": name})))
            .await
            .unwrap()
            .items,
    );
    db.insert_one("Post", &record(json!({"title": "t", "author": author})))
        .await
        .unwrap();

    let query = Query::new("Post").fetch_fields("author", ["name", "age"]);
    let result = db.find_by_query(&query).await.unwrap();
    assert_eq!(
        result.first().unwrap()["author"],
        json!({"name": name, "age": null})
    );
}

#[tokio::test]
async fn test_unknown_relation_fetch_is_a_validation_error() {
    let db = database().await;
    let err = db
        .find_by_query(&Query::new("Post").fetch("editor"))
        .await
        .unwrap_err();
    assert!(matches!(err, AdapterError::Validation(_)));
}

// ==================== Lists ====================

#[tokio::test]
async fn test_list_round_trip() {
    let db = database().await;
    let role = db
        .insert_one("Role", &record(json!({"name": "r", "scores": [1, 2, 3], "labels": ["a"]})))
        .await
        .unwrap();
    let stored = role.first().unwrap();
    assert_eq!(stored["scores"], json!([1, 2, 3]));
    assert_eq!(stored["labels"], json!(["a"]));
    assert_eq!(row_count(&db, "RoleScoresList").await, 3);

    let role_id = first_id(&role.items);
    let updated = db
        .update_one("Role", &record(json!({"id": role_id, "scores": [9]})))
        .await
        .unwrap();
    assert_eq!(updated.first().unwrap()["scores"], json!([9]));
    assert_eq!(row_count(&db, "RoleScoresList").await, 1);
}

#[tokio::test]
async fn test_explicit_projection_limits_lists() {
    let db = database().await;
    db.insert_one("Role", &record(json!({"name": "r", "scores": [1], "labels": ["a"]})))
        .await
        .unwrap();
    let result = db
        .find_by_query(&Query::new("Role").select(["name", "labels"]))
        .await
        .unwrap();
    let role = result.first().unwrap();
    assert_eq!(role["labels"], json!(["a"]));
    assert!(role.get("scores").is_none());
    assert!(role.get("status").is_none());
    assert_eq!(role["id"], json!(1));
}

// ==================== Multilingual fields ====================

#[tokio::test]
async fn test_multilingual_field_round_trip() {
    let db = database().await;
    let role = db
        .insert_one("Role", &record(json!({"name": "admin", "desc": "Full access"})))
        .await
        .unwrap();
    let role_id = first_id(&role.items);
    assert_eq!(role.first().unwrap()["desc"], json!("Full access"));
    assert_eq!(row_count(&db, "Role_translation").await, 1);

    db.update_one("Role", &record(json!({"id": role_id, "desc": "Everything"})))
        .await
        .unwrap();
    let found = db
        .find_by_query(&Query::new("Role").filter(Condition::eq("desc", "Everything")))
        .await
        .unwrap();
    assert_eq!(ids(&found.items), vec![1]);
    assert_eq!(row_count(&db, "Role_translation").await, 1);
}

// ==================== Deletes ====================

#[tokio::test]
async fn test_delete_one_clears_auxiliary_rows() {
    let db = database().await;
    db.insert_one("Permission", &record(json!({"resource": "doc", "action": "read"})))
        .await
        .unwrap();
    let role_id = first_id(
        &db.insert_one(
            "Role",
            &record(json!({"name": "r", "desc": "d", "permissions": [1], "scores": [1, 2]})),
        )
        .await
        .unwrap()
        .items,
    );

    let deleted = db.delete_one("Role", &role_id).await.unwrap();
    assert_eq!(deleted.ids, vec![role_id]);
    assert_eq!(row_count(&db, "Role").await, 0);
    assert_eq!(row_count(&db, "RoleHasPermissions").await, 0);
    assert_eq!(row_count(&db, "RoleScoresList").await, 0);
    assert_eq!(row_count(&db, "Role_translation").await, 0);
    // non-weak related rows survive
    assert_eq!(row_count(&db, "Permission").await, 1);
}

#[tokio::test]
async fn test_delete_one_cascades_weak_relations() {
    let db = database().await;
    let user_id = first_id(
        &db.insert_one("User", &record(json!({"name": "ann", "profile": {"bio": "x"}})))
            .await
            .unwrap()
            .items,
    );
    db.delete_one("User", &user_id).await.unwrap();
    assert_eq!(row_count(&db, "Profile").await, 0);
}

#[tokio::test]
async fn test_delete_missing_row() {
    let db = database().await;
    let deleted = db.delete_one("User", &json!(42)).await.unwrap();
    assert!(deleted.ids.is_empty());
}

#[tokio::test]
async fn test_unknown_model_is_a_validation_error() {
    let db = database().await;
    let err = db.insert_one("Ghost", &record(json!({}))).await.unwrap_err();
    assert!(matches!(err, AdapterError::Validation(_)));
}
