//! Shared test harness for engine testing
//!
//! Provides the school schema used across the suites, `ScriptedDatabase` (an
//! in-process `Database` double that records every call and answers from a
//! script), and the backend scenario macro.
//!
//! # Usage
//!
//! From any integration test file in `tests/`:
//! ```rust,ignore
//! #[macro_use]
//! mod engine_harness;
//! use engine_harness::*;
//! ```

#![allow(dead_code)]

#[macro_use]
pub mod scenario_tests;

use async_trait::async_trait;
use graphsql::core::error::{EngineResult, StorageError};
use graphsql::prelude::*;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

/// Users in classes, joined to clubs through `UserClub`
pub const SCHOOL_SCHEMA: &str = r#"
types:
  User:
    fields:
      id: { type: ID }
      version: { type: Int }
      createdAt: { type: Date }
      updatedAt: { type: Date }
      isDeleted: { type: Boolean }
      name: { type: String }
      age: { type: Int, nullable: true }
      classId: { type: ID, nullable: true, directive: { ref: { target: Class } } }
      class: { type: Class, nullable: true, directive: { key: { field: classId } } }
      clubs:
        type: Club
        list: true
        directive: { type: { target: UserClub, keys: [userId, clubId] } }
  Class:
    fields:
      id: { type: ID }
      version: { type: Int }
      createdAt: { type: Date }
      updatedAt: { type: Date }
      isDeleted: { type: Boolean }
      name: { type: String, unique: true }
      users: { type: User, list: true, directive: { field: { target: User, key: classId } } }
  Club:
    fields:
      id: { type: ID }
      version: { type: Int }
      createdAt: { type: Date }
      updatedAt: { type: Date }
      isDeleted: { type: Boolean }
      name: { type: String }
  UserClub:
    join_table: true
    fields:
      id: { type: ID }
      version: { type: Int }
      createdAt: { type: Date }
      updatedAt: { type: Date }
      isDeleted: { type: Boolean }
      userId: { type: ID, directive: { ref: { target: User } } }
      clubId: { type: ID, directive: { ref: { target: Club } } }
"#;

pub fn school_model() -> Arc<DirectiveModel> {
    Arc::new(DirectiveModel::from_yaml_str(SCHOOL_SCHEMA).expect("school schema should build"))
}

/// Deterministic id for seeded rows: `00000000-0000-0000-0000-00000000000n`
pub fn seed_id(n: u128) -> uuid::Uuid {
    uuid::Uuid::from_u128(n)
}

// ---------------------------------------------------------------------------
// ScriptedDatabase
// ---------------------------------------------------------------------------

/// One call observed by a `ScriptedDatabase`
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Fetch(String),
    Begin,
    Execute(String),
    FetchInTransaction(String),
    Commit,
    Rollback,
}

/// Scripted answer to a fetch or an execute
#[derive(Debug, Clone)]
pub enum Reply {
    /// Fetch: the single JSON row; execute: ignored
    Json(Value),
    /// Execute: the affected row count
    Rows(u64),
    Fail(String),
}

#[derive(Default)]
struct Script {
    fetches: VecDeque<Reply>,
    executes: VecDeque<Reply>,
    events: Vec<Event>,
}

/// In-process `Database` double
///
/// Fetches answer from the fetch script (an empty JSON object when it runs
/// out); executes answer from the execute script (one affected row when it
/// runs out).
#[derive(Clone)]
pub struct ScriptedDatabase {
    dialect: Dialect,
    script: Arc<Mutex<Script>>,
}

impl ScriptedDatabase {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            script: Arc::new(Mutex::new(Script::default())),
        }
    }

    pub fn reply_json(&self, row: Value) -> &Self {
        self.script.lock().unwrap().fetches.push_back(Reply::Json(row));
        self
    }

    pub fn fail_fetch(&self, message: &str) -> &Self {
        self.script
            .lock()
            .unwrap()
            .fetches
            .push_back(Reply::Fail(message.to_string()));
        self
    }

    pub fn affect_rows(&self, rows: u64) -> &Self {
        self.script.lock().unwrap().executes.push_back(Reply::Rows(rows));
        self
    }

    pub fn fail_execute(&self, message: &str) -> &Self {
        self.script
            .lock()
            .unwrap()
            .executes
            .push_back(Reply::Fail(message.to_string()));
        self
    }

    pub fn events(&self) -> Vec<Event> {
        self.script.lock().unwrap().events.clone()
    }

    /// SQL of every executed write, in order
    pub fn executed(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Execute(sql) => Some(sql),
                _ => None,
            })
            .collect()
    }

    /// SQL of every read, in or out of a transaction
    pub fn fetched(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Fetch(sql) | Event::FetchInTransaction(sql) => Some(sql),
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: Event) {
        self.script.lock().unwrap().events.push(event);
    }

    fn next_fetch(&self) -> EngineResult<Vec<Value>> {
        match self.script.lock().unwrap().fetches.pop_front() {
            Some(Reply::Json(row)) => Ok(vec![row]),
            Some(Reply::Fail(message)) => Err(query_error(message)),
            Some(Reply::Rows(_)) | None => Ok(vec![Value::Object(Default::default())]),
        }
    }

    fn next_execute(&self) -> EngineResult<u64> {
        match self.script.lock().unwrap().executes.pop_front() {
            Some(Reply::Rows(rows)) => Ok(rows),
            Some(Reply::Fail(message)) => Err(query_error(message)),
            Some(Reply::Json(_)) | None => Ok(1),
        }
    }
}

fn query_error(message: String) -> graphsql::core::error::EngineError {
    StorageError::Query {
        backend: "scripted".to_string(),
        message,
    }
    .into()
}

#[async_trait]
impl Database for ScriptedDatabase {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    async fn fetch_json(&self, sql: &str) -> EngineResult<Vec<Value>> {
        self.record(Event::Fetch(sql.to_string()));
        self.next_fetch()
    }

    async fn begin(&self) -> EngineResult<Box<dyn Transaction>> {
        self.record(Event::Begin);
        Ok(Box::new(ScriptedTransaction { db: self.clone() }))
    }
}

struct ScriptedTransaction {
    db: ScriptedDatabase,
}

#[async_trait]
impl Transaction for ScriptedTransaction {
    async fn execute(&mut self, sql: &str) -> EngineResult<u64> {
        self.db.record(Event::Execute(sql.to_string()));
        self.db.next_execute()
    }

    async fn fetch_json(&mut self, sql: &str) -> EngineResult<Vec<Value>> {
        self.db.record(Event::FetchInTransaction(sql.to_string()));
        self.db.next_fetch()
    }

    async fn commit(self: Box<Self>) -> EngineResult<()> {
        self.db.record(Event::Commit);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> EngineResult<()> {
        self.db.record(Event::Rollback);
        Ok(())
    }
}

/// Engine over a scripted database with the school schema
pub fn scripted_engine(dialect: Dialect) -> (Engine, ScriptedDatabase) {
    let db = ScriptedDatabase::new(dialect);
    let engine = Engine::new(school_model(), Arc::new(db.clone()));
    (engine, db)
}
