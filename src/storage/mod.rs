//! Storage implementations for different backends
//!
//! The engine only needs two capabilities from a backend: run a SELECT that
//! yields one JSON column per row, and run write statements inside a
//! transaction. Both are expressed as object-safe async traits so the
//! engine can hold an `Arc<dyn Database>`.

#[cfg(feature = "mysql")]
pub mod mysql;
#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "mysql")]
pub use mysql::MysqlDatabase;
#[cfg(feature = "postgres")]
pub use postgres::PostgresDatabase;

use crate::config::EngineConfig;
use crate::core::error::{ConfigError, EngineResult};
use crate::sql::Dialect;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A connection pool the engine reads from and writes through
#[async_trait]
pub trait Database: Send + Sync {
    fn dialect(&self) -> Dialect;

    /// Run a SELECT whose single column holds JSON, one value per row
    async fn fetch_json(&self, sql: &str) -> EngineResult<Vec<Value>>;

    /// Start a transaction on a write connection
    async fn begin(&self) -> EngineResult<Box<dyn Transaction>>;
}

/// An open transaction
///
/// Dropping a transaction without committing rolls it back.
#[async_trait]
pub trait Transaction: Send {
    /// Run a write statement, returning the number of affected rows
    async fn execute(&mut self, sql: &str) -> EngineResult<u64>;

    /// Run a JSON SELECT on this transaction's connection
    async fn fetch_json(&mut self, sql: &str) -> EngineResult<Vec<Value>>;

    async fn commit(self: Box<Self>) -> EngineResult<()>;

    async fn rollback(self: Box<Self>) -> EngineResult<()>;
}

/// Sends reads to replicas round-robin and everything else to the primary
///
/// Without replicas all reads go to the primary.
pub struct ReplicaRouter {
    primary: Arc<dyn Database>,
    replicas: Vec<Arc<dyn Database>>,
    next: AtomicUsize,
}

impl ReplicaRouter {
    pub fn new(primary: Arc<dyn Database>, replicas: Vec<Arc<dyn Database>>) -> Self {
        Self {
            primary,
            replicas,
            next: AtomicUsize::new(0),
        }
    }

    fn reader(&self) -> &Arc<dyn Database> {
        if self.replicas.is_empty() {
            return &self.primary;
        }
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.replicas.len();
        &self.replicas[index]
    }
}

#[async_trait]
impl Database for ReplicaRouter {
    fn dialect(&self) -> Dialect {
        self.primary.dialect()
    }

    async fn fetch_json(&self, sql: &str) -> EngineResult<Vec<Value>> {
        self.reader().fetch_json(sql).await
    }

    async fn begin(&self) -> EngineResult<Box<dyn Transaction>> {
        self.primary.begin().await
    }
}

/// Open the pools described by `config`
///
/// Returns the primary alone, or a [`ReplicaRouter`] when replicas are
/// configured.
pub async fn connect(config: &EngineConfig) -> EngineResult<Arc<dyn Database>> {
    let primary = open(config.backend, &config.primary_url, config.max_connections).await?;
    if config.replica_urls.is_empty() {
        return Ok(primary);
    }

    let mut replicas = Vec::with_capacity(config.replica_urls.len());
    for url in &config.replica_urls {
        replicas.push(open(config.backend, url, config.max_connections).await?);
    }
    tracing::info!(
        backend = config.backend.backend_name(),
        replicas = replicas.len(),
        "routing reads to replicas"
    );
    Ok(Arc::new(ReplicaRouter::new(primary, replicas)))
}

#[allow(unused_variables)]
async fn open(dialect: Dialect, url: &str, max_connections: u32) -> EngineResult<Arc<dyn Database>> {
    match dialect {
        #[cfg(feature = "postgres")]
        Dialect::Postgres => Ok(Arc::new(PostgresDatabase::connect(url, max_connections).await?)),
        #[cfg(feature = "mysql")]
        Dialect::Mysql => Ok(Arc::new(MysqlDatabase::connect(url, max_connections).await?)),
        #[allow(unreachable_patterns)]
        other => Err(ConfigError::BackendDisabled {
            backend: other.to_string(),
        }
        .into()),
    }
}
