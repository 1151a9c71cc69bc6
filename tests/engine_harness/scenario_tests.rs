//! Macro-generated end-to-end scenarios run against a real backend.
//!
//! The `engine_scenario_tests!` macro generates a test module that drives an
//! `Engine` over the school schema through `execute_request` only: rows are
//! seeded with `create` mutations and observed with queries.
//!
//! # Usage
//!
//! ```rust,ignore
//! #[macro_use]
//! mod engine_harness;
//!
//! use engine_harness::*;
//!
//! engine_scenario_tests!(clean_pg_engine().await);
//! ```
//!
//! # Generated Tests
//!
//! ## Queries
//! - `test_offset_selects_fourth_seeded_user`
//! - `test_filter_order_limit`
//! - `test_null_safe_filter`
//! - `test_typename_and_to_one`
//!
//! ## Mutations
//! - `test_create_returns_selection_and_version_one`
//! - `test_update_bumps_version_and_rejects_stale`
//! - `test_concurrent_stale_updates_have_one_winner`
//! - `test_nested_update_shares_updated_at`
//! - `test_soft_delete_hides_rows_and_cascades`
//! - `test_many_to_many_link_and_retire`
//! - `test_failed_mutation_rolls_back_everything`

/// Generate the backend scenario suite.
///
/// `$factory` must evaluate to an `Engine` over empty school tables. It is
/// re-evaluated for each test.
#[macro_export]
macro_rules! engine_scenario_tests {
    ($factory:expr) => {
        mod engine_scenario_tests {
            use super::*;
            use graphsql::prelude::*;
            use serde_json::{Value, json};
            use std::collections::HashMap;
            use std::sync::Arc;

            async fn request(engine: &Engine, document: &str, variables: Value) -> Response {
                let variables: HashMap<String, Value> =
                    serde_json::from_value(variables).expect("variables must be an object");
                engine.execute_request(document, Some(variables), None).await
            }

            async fn ok(engine: &Engine, document: &str, variables: Value) -> Value {
                let response = request(engine, document, variables).await;
                assert!(response.is_ok(), "unexpected errors: {:?}", response.errors);
                response.data
            }

            async fn seed_users(engine: &Engine, count: u128) {
                let users: Vec<Value> = (1..=count)
                    .map(|n| {
                        json!({
                            "id": seed_id(n).to_string(),
                            "name": format!("user{}", n),
                            "age": n as i64,
                        })
                    })
                    .collect();
                ok(
                    engine,
                    "mutation($d: JSON) { create(data: $d) { user { id } } }",
                    json!({ "d": { "user": users } }),
                )
                .await;
            }

            // ==================================================================
            // Queries
            // ==================================================================

            #[tokio::test]
            async fn test_offset_selects_fourth_seeded_user() {
                let engine = $factory;
                seed_users(&engine, 5).await;

                let data = ok(&engine, "{ user(offset: 3) { id name } }", json!({})).await;
                assert_eq!(
                    data,
                    json!({ "user": { "id": seed_id(4).to_string(), "name": "user4" } })
                );

                // reads are idempotent
                let again = ok(&engine, "{ user(offset: 3) { id name } }", json!({})).await;
                assert_eq!(again, data);
            }

            #[tokio::test]
            async fn test_filter_order_limit() {
                let engine = $factory;
                seed_users(&engine, 5).await;

                let data = ok(
                    &engine,
                    r#"{ users(where: { age: { gt: 1 } }, order: "age_DESC", limit: 2) { name } }"#,
                    json!({}),
                )
                .await;
                assert_eq!(data, json!({ "users": [{ "name": "user5" }, { "name": "user4" }] }));

                let data = ok(
                    &engine,
                    r#"{ users(where: { or: [{ name: { eq: "user1" } }, { age: { ge: 5 } }] }) { name } }"#,
                    json!({}),
                )
                .await;
                assert_eq!(data, json!({ "users": [{ "name": "user1" }, { "name": "user5" }] }));

                let data = ok(
                    &engine,
                    r#"{ users(where: { age: { in: [] } }) { name } }"#,
                    json!({}),
                )
                .await;
                assert_eq!(data, json!({ "users": [] }));
            }

            #[tokio::test]
            async fn test_null_safe_filter() {
                let engine = $factory;
                seed_users(&engine, 2).await;
                ok(
                    &engine,
                    r#"mutation { create(data: { user: { name: "ageless" } }) { user { id } } }"#,
                    json!({}),
                )
                .await;

                let data = ok(
                    &engine,
                    "{ users(where: { age: { eq: null } }) { name age } }",
                    json!({}),
                )
                .await;
                assert_eq!(data, json!({ "users": [{ "name": "ageless", "age": null }] }));

                let data = ok(
                    &engine,
                    r#"{ users(where: { age: { ne: null } }, order: "name_ASC") { name } }"#,
                    json!({}),
                )
                .await;
                assert_eq!(data, json!({ "users": [{ "name": "user1" }, { "name": "user2" }] }));
            }

            #[tokio::test]
            async fn test_typename_and_to_one() {
                let engine = $factory;
                let user = seed_id(10);
                ok(
                    &engine,
                    "mutation($d: JSON) { create(data: $d) { user { id } } }",
                    json!({ "d": { "user": {
                        "id": user.to_string(),
                        "name": "ann",
                        "class": { "name": "1A" }
                    } } }),
                )
                .await;

                let data = ok(
                    &engine,
                    "query($id: ID!) { __typename user(where: { id: { eq: $id } }) { __typename name class { name } } }",
                    json!({ "id": user.to_string() }),
                )
                .await;
                assert_eq!(
                    data,
                    json!({
                        "__typename": "Query",
                        "user": { "__typename": "User", "name": "ann", "class": { "name": "1A" } }
                    })
                );
            }

            // ==================================================================
            // Mutations
            // ==================================================================

            #[tokio::test]
            async fn test_create_returns_selection_and_version_one() {
                let engine = $factory;
                let data = ok(
                    &engine,
                    r#"mutation { create(data: { user: { name: "bob" } }) { user { name } } }"#,
                    json!({}),
                )
                .await;
                assert_eq!(data, json!({ "create": { "user": { "name": "bob" } } }));

                let data = ok(&engine, "{ users { name version } }", json!({})).await;
                assert_eq!(data, json!({ "users": [{ "name": "bob", "version": 1 }] }));
            }

            #[tokio::test]
            async fn test_update_bumps_version_and_rejects_stale() {
                let engine = $factory;
                seed_users(&engine, 1).await;
                let id = seed_id(1).to_string();
                let update = "mutation($d: JSON) { update(data: $d) { user { name version } } }";

                let data = ok(
                    &engine,
                    update,
                    json!({ "d": { "user": { "id": id, "version": 1, "name": "renamed" } } }),
                )
                .await;
                assert_eq!(
                    data,
                    json!({ "update": { "user": { "name": "renamed", "version": 2 } } })
                );

                let stale = request(
                    &engine,
                    update,
                    json!({ "d": { "user": { "id": id, "version": 1, "name": "lost" } } }),
                )
                .await;
                assert_eq!(stale.data, Value::Null);
                assert_eq!(stale.errors.len(), 1);
                assert_eq!(stale.errors[0].code(), Some("OPTIMISTIC_LOCK_FAILED"));

                let data = ok(&engine, "{ user { name version } }", json!({})).await;
                assert_eq!(data, json!({ "user": { "name": "renamed", "version": 2 } }));
            }

            #[tokio::test]
            async fn test_concurrent_stale_updates_have_one_winner() {
                let engine = Arc::new($factory);
                seed_users(&engine, 1).await;
                let id = seed_id(1).to_string();

                let attempts = (0..5).map(|n| {
                    let engine = engine.clone();
                    let id = id.clone();
                    async move {
                        request(
                            &engine,
                            "mutation($d: JSON) { update(data: $d) { user { version } } }",
                            json!({ "d": { "user": { "id": id, "version": 1, "name": format!("writer{}", n) } } }),
                        )
                        .await
                    }
                });
                let responses = futures::future::join_all(attempts).await;

                let winners = responses.iter().filter(|r| r.is_ok()).count();
                assert_eq!(winners, 1);
                for lost in responses.iter().filter(|r| !r.is_ok()) {
                    assert_eq!(lost.errors[0].code(), Some("OPTIMISTIC_LOCK_FAILED"));
                }

                let data = ok(&engine, "{ user { version } }", json!({})).await;
                assert_eq!(data, json!({ "user": { "version": 2 } }));
            }

            #[tokio::test]
            async fn test_nested_update_shares_updated_at() {
                let engine = $factory;
                let (class, a, b) = (seed_id(20), seed_id(21), seed_id(22));
                ok(
                    &engine,
                    "mutation($d: JSON) { create(data: $d) { class { id } } }",
                    json!({ "d": { "class": {
                        "id": class.to_string(),
                        "name": "2B",
                        "users": [
                            { "id": a.to_string(), "name": "a" },
                            { "id": b.to_string(), "name": "b" }
                        ]
                    } } }),
                )
                .await;

                ok(
                    &engine,
                    "mutation($d: JSON) { update(data: $d) { class { version } } }",
                    json!({ "d": { "class": {
                        "id": class.to_string(),
                        "version": 1,
                        "name": "3B",
                        "users": [
                            { "id": a.to_string(), "version": 1, "name": "a2" },
                            { "id": b.to_string(), "version": 1, "name": "b2" }
                        ]
                    } } }),
                )
                .await;

                let data = ok(
                    &engine,
                    "{ class { name version updatedAt users { name version updatedAt } } }",
                    json!({}),
                )
                .await;
                let class = &data["class"];
                assert_eq!(class["name"], "3B");
                assert_eq!(class["version"], 2);
                let users = class["users"].as_array().unwrap();
                assert_eq!(users.len(), 2);
                for user in users {
                    assert_eq!(user["version"], 2);
                    assert_eq!(user["updatedAt"], class["updatedAt"]);
                }
            }

            #[tokio::test]
            async fn test_soft_delete_hides_rows_and_cascades() {
                let engine = $factory;
                let (class, a) = (seed_id(30), seed_id(31));
                ok(
                    &engine,
                    "mutation($d: JSON) { create(data: $d) { class { id } } }",
                    json!({ "d": { "class": {
                        "id": class.to_string(),
                        "name": "4C",
                        "users": [{ "id": a.to_string(), "name": "a" }]
                    } } }),
                )
                .await;

                let data = ok(
                    &engine,
                    "mutation($d: JSON) { delete(data: $d) { class { id __typename } } }",
                    json!({ "d": { "class": {
                        "id": class.to_string(),
                        "version": 1,
                        "users": [{ "id": a.to_string(), "version": 1 }]
                    } } }),
                )
                .await;
                assert_eq!(
                    data,
                    json!({ "delete": { "class": { "id": class.to_string(), "__typename": "Class" } } })
                );

                let data = ok(&engine, "{ classes { id } users { id } }", json!({})).await;
                assert_eq!(data, json!({ "classes": [], "users": [] }));
            }

            #[tokio::test]
            async fn test_many_to_many_link_and_retire() {
                let engine = $factory;
                let (user, club) = (seed_id(40), seed_id(41));
                ok(
                    &engine,
                    "mutation($d: JSON) { create(data: $d) { user { id } } }",
                    json!({ "d": { "user": {
                        "id": user.to_string(),
                        "name": "cara",
                        "clubs": [{ "id": club.to_string(), "name": "chess" }]
                    } } }),
                )
                .await;

                let data = ok(&engine, "{ user { clubs { name } } }", json!({})).await;
                assert_eq!(data, json!({ "user": { "clubs": [{ "name": "chess" }] } }));

                ok(
                    &engine,
                    "mutation($d: JSON) { delete(data: $d) { user { id } } }",
                    json!({ "d": { "user": {
                        "id": user.to_string(),
                        "version": 1,
                        "clubs": [{ "id": club.to_string() }]
                    } } }),
                )
                .await;

                // the link is retired, the club itself survives
                let data = ok(&engine, "{ clubs { name } users { id } }", json!({})).await;
                assert_eq!(data, json!({ "clubs": [{ "name": "chess" }], "users": [] }));
            }

            #[tokio::test]
            async fn test_failed_mutation_rolls_back_everything() {
                let engine = $factory;
                ok(
                    &engine,
                    r#"mutation { create(data: { class: { name: "5E" } }) { class { id } } }"#,
                    json!({}),
                )
                .await;

                // the user insert succeeds, the duplicate class name does not
                let failed = request(
                    &engine,
                    "mutation($d: JSON) { create(data: $d) { user { id } } }",
                    json!({ "d": { "user": { "name": "dan" }, "class": { "name": "5E" } } }),
                )
                .await;
                assert_eq!(failed.data, Value::Null);
                assert_eq!(failed.errors[0].code(), Some("STORAGE_INTEGRITY_ERROR"));

                let data = ok(&engine, "{ users { id } classes { name } }", json!({})).await;
                assert_eq!(data, json!({ "users": [], "classes": [{ "name": "5E" }] }));
            }
        }
    };
}
