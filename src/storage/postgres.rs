//! PostgreSQL storage backend using sqlx.
//!
//! Provides [`PostgresDatabase`] backed by a `sqlx::PgPool`. Queries compiled
//! for PostgreSQL return `json` columns, decoded straight into
//! `serde_json::Value`.
//!
//! # Feature flag
//!
//! This module is gated behind the `postgres` feature flag:
//! ```toml
//! [dependencies]
//! graphsql-rs = { version = "0.1", features = ["postgres"] }
//! ```

use crate::core::error::{EngineResult, StorageError};
use crate::sql::Dialect;
use crate::storage::{Database, Transaction};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

const BACKEND: &str = "PostgreSQL";

/// PostgreSQL connection pool
#[derive(Clone, Debug)]
pub struct PostgresDatabase {
    pool: PgPool,
}

impl PostgresDatabase {
    /// Create a new `PostgresDatabase` with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a pool of at most `max_connections` connections.
    pub async fn connect(url: &str, max_connections: u32) -> EngineResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| StorageError::from_sqlx(BACKEND, e))?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Database for PostgresDatabase {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn fetch_json(&self, sql: &str) -> EngineResult<Vec<Value>> {
        tracing::debug!(backend = BACKEND, sql, "fetch");
        let rows = sqlx::query_scalar::<_, Value>(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::from_sqlx(BACKEND, e))?;
        Ok(rows)
    }

    async fn begin(&self) -> EngineResult<Box<dyn Transaction>> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::from_sqlx(BACKEND, e))?;
        Ok(Box::new(PostgresTransaction { tx }))
    }
}

/// Open PostgreSQL transaction
pub struct PostgresTransaction {
    tx: sqlx::Transaction<'static, sqlx::Postgres>,
}

#[async_trait]
impl Transaction for PostgresTransaction {
    async fn execute(&mut self, sql: &str) -> EngineResult<u64> {
        tracing::debug!(backend = BACKEND, sql, "execute");
        let result = sqlx::query(sql)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| StorageError::from_sqlx(BACKEND, e))?;
        Ok(result.rows_affected())
    }

    async fn fetch_json(&mut self, sql: &str) -> EngineResult<Vec<Value>> {
        tracing::debug!(backend = BACKEND, sql, "fetch in transaction");
        let rows = sqlx::query_scalar::<_, Value>(sql)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| StorageError::from_sqlx(BACKEND, e))?;
        Ok(rows)
    }

    async fn commit(self: Box<Self>) -> EngineResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| StorageError::from_sqlx(BACKEND, e))?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> EngineResult<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| StorageError::from_sqlx(BACKEND, e))?;
        Ok(())
    }
}
