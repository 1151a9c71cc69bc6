//! Mutation execution through the engine against a scripted database.

#[macro_use]
mod engine_harness;

use chrono::{TimeZone, Utc};
use engine_harness::*;
use graphsql::prelude::*;
use serde_json::{Value, json};
use uuid::Uuid;

fn context(
    engine: &Engine,
    document: &str,
    variables: Value,
) -> QueryContext {
    QueryContext::parse(
        engine.model().clone(),
        document,
        Some(serde_json::from_value(variables).unwrap()),
        None,
    )
    .unwrap()
}

#[tokio::test]
async fn test_create_runs_in_one_transaction() {
    let (engine, db) = scripted_engine(Dialect::Postgres);
    let id = Uuid::new_v4();
    db.reply_json(json!({ "create": { "user": { "id": id.to_string(), "version": 1 } } }));

    let response = engine
        .execute_request(
            &format!(
                r#"mutation {{ create(data: {{ user: {{ id: "{}", name: "bob" }} }}) {{ user {{ id version }} }} }}"#,
                id
            ),
            None,
            None,
        )
        .await;

    assert!(response.is_ok(), "{:?}", response.errors);
    assert_eq!(
        response.data,
        json!({ "create": { "user": { "id": id.to_string(), "version": 1 } } })
    );
    assert_eq!(response.touched["User"], vec![id]);
    assert!(!serde_json::to_string(&response).unwrap().contains("touched"));

    let events = db.events();
    assert_eq!(events.len(), 4);
    assert_eq!(events[0], Event::Begin);
    assert!(matches!(&events[1], Event::Execute(sql) if sql.starts_with("INSERT INTO \"user\"")));
    assert!(matches!(&events[2], Event::FetchInTransaction(sql) if sql.contains(&id.to_string())));
    assert_eq!(events[3], Event::Commit);
}

#[tokio::test]
async fn test_stale_version_rolls_back() {
    let (engine, db) = scripted_engine(Dialect::Postgres);
    let id = seed_id(7);
    db.affect_rows(0);

    let response = engine
        .execute_request(
            &format!(
                r#"mutation {{ update(data: {{ user: {{ id: "{}", version: 3, name: "x" }} }}) {{ user {{ id }} }} }}"#,
                id
            ),
            None,
            None,
        )
        .await;

    assert_eq!(response.data, Value::Null);
    let error = &response.errors[0];
    assert_eq!(error.code(), Some("OPTIMISTIC_LOCK_FAILED"));
    assert_eq!(error.extensions["type"], "User");
    assert_eq!(error.extensions["id"], id.to_string());

    let events = db.events();
    assert_eq!(events.first(), Some(&Event::Begin));
    assert_eq!(events.last(), Some(&Event::Rollback));
    assert!(!events.contains(&Event::Commit));
    assert!(db.fetched().is_empty());
    assert!(response.touched.is_empty());
}

#[tokio::test]
async fn test_storage_failure_stops_at_the_failing_statement() {
    let (engine, db) = scripted_engine(Dialect::Postgres);
    db.affect_rows(1).fail_execute("duplicate key value violates unique constraint");

    let response = engine
        .execute_request(
            r#"mutation { create(data: { class: { name: "5E", users: [{ name: "a" }, { name: "b" }] } }) { class { id } } }"#,
            None,
            None,
        )
        .await;

    assert_eq!(response.errors[0].code(), Some("STORAGE_ERROR"));
    assert_eq!(db.executed().len(), 2);
    assert_eq!(db.events().last(), Some(&Event::Rollback));
}

#[tokio::test]
async fn test_statements_share_the_request_clock() {
    let (engine, db) = scripted_engine(Dialect::Postgres);
    let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
    let (class, user) = (seed_id(1), seed_id(2));
    let ctx = context(
        &engine,
        "mutation($d: JSON) { update(data: $d) { class { id } } }",
        json!({ "d": { "class": {
            "id": class.to_string(),
            "version": 2,
            "name": "2B",
            "users": [{ "id": user.to_string(), "version": 5, "name": "amy" }]
        } } }),
    );

    let mut exec = ExecutionContext::with_clock(now);
    engine.run_mutation(&ctx, &mut exec).await.unwrap();

    let executed = db.executed();
    assert_eq!(executed.len(), 2);
    for sql in &executed {
        assert!(sql.contains("\"updated_at\" = '2024-03-01T12:30:00.000000Z'"), "{}", sql);
    }
    assert_eq!(exec.touched_ids()["Class"], vec![class]);
    assert_eq!(exec.touched_ids()["User"], vec![user]);
}

#[tokio::test]
async fn test_delete_answers_without_reading_back() {
    let (engine, db) = scripted_engine(Dialect::Postgres);
    let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
    let id = seed_id(9);
    let ctx = context(
        &engine,
        "mutation($d: JSON) { __typename delete(data: $d) { __typename club { id name } } }",
        json!({ "d": { "club": { "id": id.to_string(), "version": 1 } } }),
    );

    let mut exec = ExecutionContext::with_clock(now);
    let data = engine.run_mutation(&ctx, &mut exec).await.unwrap();

    assert_eq!(
        data,
        json!({
            "__typename": "Mutation",
            "delete": {
                "__typename": "DeleteResult",
                "club": { "id": id.to_string(), "name": null }
            }
        })
    );
    assert_eq!(
        db.executed(),
        vec![format!(
            "UPDATE \"club\" SET \"is_deleted\" = TRUE, \"version\" = \"version\" + 1, \
             \"updated_at\" = '2024-03-01T12:30:00.000000Z' WHERE (\"id\" = '{}' AND \"version\" = 1)",
            id
        )]
    );
    assert!(db.fetched().is_empty());
    assert_eq!(db.events().last(), Some(&Event::Commit));
    assert_eq!(exec.touched_ids()["Club"], vec![id]);
}

#[tokio::test]
async fn test_invalid_input_never_begins() {
    let (engine, db) = scripted_engine(Dialect::Postgres);

    let missing_version = engine
        .execute_request(
            &format!(
                r#"mutation {{ update(data: {{ user: {{ id: "{}", name: "x" }} }}) {{ user {{ id }} }} }}"#,
                seed_id(1)
            ),
            None,
            None,
        )
        .await;
    assert_eq!(missing_version.errors[0].code(), Some("BAD_USER_INPUT"));

    let unknown = engine
        .execute_request(r#"mutation { upsert(data: { user: { name: "x" } }) { user { id } } }"#, None, None)
        .await;
    assert_eq!(unknown.errors[0].code(), Some("BAD_USER_INPUT"));

    assert!(db.events().is_empty());
}

#[tokio::test]
async fn test_mysql_mutation_rendering() {
    let (engine, db) = scripted_engine(Dialect::Mysql);
    let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
    let ctx = context(
        &engine,
        "mutation($d: JSON) { create(data: $d) { club { id } } }",
        json!({ "d": { "club": { "id": seed_id(3).to_string(), "name": "chess" } } }),
    );

    let mut exec = ExecutionContext::with_clock(now);
    engine.run_mutation(&ctx, &mut exec).await.unwrap();

    let insert = &db.executed()[0];
    assert!(insert.starts_with("INSERT INTO `club` (`id`, `name`, `version`"));
    assert!(insert.contains("'2024-03-01 12:30:00.000000'"));
    assert!(db.fetched()[0].starts_with("SELECT JSON_OBJECT('create', "));
}

#[tokio::test]
async fn test_referenced_sibling_row_is_inserted_first() {
    let (engine, db) = scripted_engine(Dialect::Postgres);
    let (user, class) = (seed_id(50), seed_id(51));

    let response = engine
        .execute_request(
            "mutation($d: JSON) { create(data: $d) { user { id } class { id } } }",
            Some(
                serde_json::from_value(json!({ "d": {
                    "user": { "id": user.to_string(), "name": "eve", "classId": class.to_string() },
                    "class": { "id": class.to_string(), "name": "6F" }
                } }))
                .unwrap(),
            ),
            None,
        )
        .await;

    assert!(response.is_ok(), "{:?}", response.errors);
    let executed = db.executed();
    assert_eq!(executed.len(), 2);
    assert!(executed[0].starts_with("INSERT INTO \"class\""));
    assert!(executed[1].starts_with("INSERT INTO \"user\""));
}
