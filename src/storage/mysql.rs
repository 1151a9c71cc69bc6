//! MySQL storage backend using sqlx.
//!
//! Provides [`MysqlDatabase`] backed by a `sqlx::MySqlPool`.
//!
//! # Feature flag
//!
//! This module is gated behind the `mysql` feature flag:
//! ```toml
//! [dependencies]
//! graphsql-rs = { version = "0.1", features = ["mysql"] }
//! ```
//!
//! # Differences from PostgreSQL backend
//!
//! - UUID stored as `CHAR(36)` (not native UUID type)
//! - `DATETIME(6)` instead of `TIMESTAMPTZ`
//! - JSON arrays are built with `GROUP_CONCAT`, so every session raises
//!   `group_concat_max_len` on connect; the default of 1024 bytes would
//!   truncate nested lists

use crate::core::error::{EngineResult, StorageError};
use crate::sql::Dialect;
use crate::storage::{Database, Transaction};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::mysql::MySqlPoolOptions;
use sqlx::{Executor, MySqlPool};

const BACKEND: &str = "MySQL";

/// Session setup run on every new connection
const SESSION_SETUP: &str = "SET SESSION group_concat_max_len = 4294967295";

/// MySQL connection pool
#[derive(Clone, Debug)]
pub struct MysqlDatabase {
    pool: MySqlPool,
}

impl MysqlDatabase {
    /// Wrap an existing pool.
    ///
    /// The pool's connections must already run [`SESSION_SETUP`]; prefer
    /// [`MysqlDatabase::connect`].
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Connect a pool of at most `max_connections` connections.
    pub async fn connect(url: &str, max_connections: u32) -> EngineResult<Self> {
        let pool = pool_options()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| StorageError::from_sqlx(BACKEND, e))?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }
}

/// Pool options with the per-session setup installed
pub fn pool_options() -> MySqlPoolOptions {
    MySqlPoolOptions::new().after_connect(|conn, _meta| {
        Box::pin(async move {
            conn.execute(SESSION_SETUP).await?;
            Ok(())
        })
    })
}

#[async_trait]
impl Database for MysqlDatabase {
    fn dialect(&self) -> Dialect {
        Dialect::Mysql
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
        Ok(Box::new(MysqlTransaction { tx }))
    }
}

/// Open MySQL transaction
pub struct MysqlTransaction {
    tx: sqlx::Transaction<'static, sqlx::MySql>,
}

#[async_trait]
impl Transaction for MysqlTransaction {
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
