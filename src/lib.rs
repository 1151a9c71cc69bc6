//! # graphsql
//!
//! Directive-driven GraphQL-to-SQL engine for PostgreSQL and MySQL.
//!
//! An entity schema annotated with relationship directives (`ref`, `key`,
//! `field`, `type`) is loaded once into a [`DirectiveModel`]. Operations are
//! compiled against it:
//!
//! - **Queries** become one nested SELECT that returns the response already
//!   shaped as JSON, with `where`, `order`, `limit` and `offset` on every
//!   entity field.
//! - **Mutations** (`create`, `update`, `delete`) over nested payloads become
//!   an ordered list of statements run in one transaction, with optimistic
//!   locking on `version` and soft deletes through `isDeleted`.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use graphsql::prelude::*;
//! use std::sync::Arc;
//!
//! let model = Arc::new(DirectiveModel::from_yaml_str(r#"
//! types:
//!   User:
//!     fields:
//!       id: { type: ID }
//!       version: { type: Int }
//!       createdAt: { type: Date }
//!       updatedAt: { type: Date }
//!       isDeleted: { type: Boolean }
//!       name: { type: String }
//! "#)?);
//!
//! let config = EngineConfig::from_yaml_file("engine.yaml")?;
//! graphsql::logging::init(&config.log_level)?;
//! let engine = Engine::from_config(&config, model).await?;
//!
//! let created = engine
//!     .execute_request(r#"mutation { create(data: { user: { name: "bob" } }) { user { id version } } }"#, None, None)
//!     .await;
//! let users = engine
//!     .execute_request("{ users(order: [\"name_ASC\"]) { id name } }", None, None)
//!     .await;
//! ```

pub mod compiler;
pub mod config;
pub mod core;
pub mod document;
pub mod execution;
pub mod logging;
pub mod schema;
pub mod sql;
pub mod storage;

/// Re-exports of commonly used types and traits
pub mod prelude {
    // === Schema ===
    pub use crate::schema::{DirectiveModel, EntityType, FieldInfo, Relation, SchemaDefinition};

    // === Documents ===
    pub use crate::document::{OperationKind, QueryContext};

    // === Compilation ===
    pub use crate::compiler::{
        MutationCompiler, MutationKind, MutationPlan, PredicateCompiler, QueryCompiler,
        RootOutput, Statement, StatementKind,
    };
    pub use crate::sql::{Dialect, SqlPrinter};

    // === Execution ===
    pub use crate::execution::{
        Engine, ExecutionContext, Response, TransactionCoordinator, TransactionState,
    };
    pub use crate::storage::{Database, ReplicaRouter, Transaction};

    // === Config & errors ===
    pub use crate::config::{EngineConfig, QueryStrategy};
    pub use crate::core::error::{
        ConfigError, EngineError, EngineResult, InputError, ResponseError, SchemaError,
        StorageError,
    };
}

pub use schema::DirectiveModel;
