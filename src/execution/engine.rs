//! Queries and mutations end to end

use crate::compiler::{MutationCompiler, MutationPlan, QueryCompiler, RootOutput};
use crate::config::{EngineConfig, QueryStrategy};
use crate::core::error::{EngineError, EngineResult, ResponseError};
use crate::document::{OperationKind, QueryContext};
use crate::execution::context::ExecutionContext;
use crate::execution::transaction::TransactionCoordinator;
use crate::schema::DirectiveModel;
use crate::sql::{Dialect, SqlPrinter};
use crate::storage::{self, Database};
use futures::future::join_all;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Result of one operation
///
/// `data` is null when the operation failed as a whole. Scatter/gather
/// queries may return both data and per-root errors.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Response {
    pub data: Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ResponseError>,
    /// Ids written per entity type by a committed mutation; not part of the
    /// GraphQL response body
    #[serde(skip)]
    pub touched: IndexMap<String, Vec<Uuid>>,
}

impl Response {
    pub fn from_data(data: Value) -> Self {
        Self {
            data,
            errors: Vec::new(),
            touched: IndexMap::new(),
        }
    }

    pub fn from_error(err: &EngineError) -> Self {
        Self {
            data: Value::Null,
            errors: vec![err.to_response_error()],
            touched: IndexMap::new(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Compiles and runs operations against one database
///
/// # Example
///
/// ```rust,ignore
/// let model = Arc::new(DirectiveModel::from_yaml_str(&schema_yaml)?);
/// let config = EngineConfig::from_yaml_file("engine.yaml")?;
/// let engine = Engine::from_config(&config, model).await?;
///
/// let response = engine
///     .execute_request("{ users(limit: 10) { id name } }", None, None)
///     .await;
/// println!("{}", serde_json::to_string(&response)?);
/// ```
pub struct Engine {
    model: Arc<DirectiveModel>,
    database: Arc<dyn Database>,
    strategy: QueryStrategy,
}

impl Engine {
    pub fn new(model: Arc<DirectiveModel>, database: Arc<dyn Database>) -> Self {
        Self {
            model,
            database,
            strategy: QueryStrategy::default(),
        }
    }

    pub fn with_strategy(mut self, strategy: QueryStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Connect the configured pools and build an engine over them
    pub async fn from_config(config: &EngineConfig, model: Arc<DirectiveModel>) -> EngineResult<Self> {
        let database = storage::connect(config).await?;
        info!(
            backend = config.backend.backend_name(),
            strategy = ?config.query_strategy,
            "engine ready"
        );
        Ok(Self::new(model, database).with_strategy(config.query_strategy))
    }

    pub fn model(&self) -> &Arc<DirectiveModel> {
        &self.model
    }

    pub fn dialect(&self) -> Dialect {
        self.database.dialect()
    }

    /// Parse `document` and execute the selected operation
    pub async fn execute_request(
        &self,
        document: &str,
        variables: Option<HashMap<String, Value>>,
        operation_name: Option<&str>,
    ) -> Response {
        match QueryContext::parse(self.model.clone(), document, variables, operation_name) {
            Ok(ctx) => self.execute(&ctx).await,
            Err(e) => Response::from_error(&e),
        }
    }

    /// Execute a parsed operation
    ///
    /// Committed mutations report the ids they wrote in
    /// [`Response::touched`].
    pub async fn execute(&self, ctx: &QueryContext) -> Response {
        let result = match (ctx.operation.kind, self.strategy) {
            (OperationKind::Query, QueryStrategy::Nested) => self.run_query(ctx).await,
            (OperationKind::Query, QueryStrategy::ScatterGather) => {
                return self.run_scattered(ctx).await;
            }
            (OperationKind::Mutation, _) => {
                let mut exec = ExecutionContext::new();
                return match self.run_mutation(ctx, &mut exec).await {
                    Ok(data) => Response {
                        touched: exec.touched_ids().clone(),
                        ..Response::from_data(data)
                    },
                    Err(e) => Response::from_error(&e),
                };
            }
        };
        match result {
            Ok(data) => Response::from_data(data),
            Err(e) => Response::from_error(&e),
        }
    }

    /// Run a query as one SELECT on a read connection
    pub async fn run_query(&self, ctx: &QueryContext) -> EngineResult<Value> {
        let select = QueryCompiler::new(ctx).compile_query()?;
        let sql = SqlPrinter::new(self.dialect()).select(&select);
        debug!(sql = %sql, "query");
        first_row(self.database.fetch_json(&sql).await?)
    }

    /// Run one SELECT per root field concurrently
    ///
    /// A failing root is reported with its response key as path and set to
    /// null; the other roots are unaffected.
    async fn run_scattered(&self, ctx: &QueryContext) -> Response {
        let compiled = match QueryCompiler::new(ctx).compile_scattered() {
            Ok(compiled) => compiled,
            Err(e) => return Response::from_error(&e),
        };
        let printer = SqlPrinter::new(self.dialect());

        let pending = compiled.into_iter().map(|(key, select)| {
            let database = self.database.clone();
            async move {
                let result = match select {
                    Ok(select) => {
                        let sql = printer.select(&select);
                        debug!(root = %key, sql = %sql, "scattered query");
                        database.fetch_json(&sql).await.and_then(first_row)
                    }
                    Err(e) => Err(e),
                };
                (key, result)
            }
        });

        let mut data = Map::new();
        let mut errors = Vec::new();
        for (key, result) in join_all(pending).await {
            let value = match result {
                Ok(Value::Object(mut row)) => row.remove(&key).unwrap_or(Value::Null),
                Ok(_) => Value::Null,
                Err(e) => {
                    warn!(root = %key, error = %e, "root field failed");
                    errors.push(e.to_response_error_at(key.clone()));
                    Value::Null
                }
            };
            data.insert(key, value);
        }

        Response {
            errors,
            ..Response::from_data(Value::Object(data))
        }
    }

    /// Run a mutation in one transaction
    ///
    /// Statements run in sequenced order; the result is read back on the
    /// same transaction before commit. Any failure rolls everything back.
    pub async fn run_mutation(
        &self,
        ctx: &QueryContext,
        exec: &mut ExecutionContext,
    ) -> EngineResult<Value> {
        let plan = MutationCompiler::new(ctx, self.dialect(), exec.now()).compile()?;

        let mut coordinator = TransactionCoordinator::new(self.database.as_ref());
        coordinator.begin().await?;

        let read_back = match self.write(&mut coordinator, &plan).await {
            Ok(read_back) => read_back,
            Err(e) => {
                match &e {
                    EngineError::OptimisticLock { type_name, id } => {
                        warn!(type_name = %type_name, id = %id, "optimistic lock failed, rolling back")
                    }
                    other => warn!(error = %other, "mutation failed, rolling back"),
                }
                if let Err(rollback) = coordinator.rollback().await {
                    error!(error = %rollback, "rollback failed");
                }
                return Err(e);
            }
        };

        coordinator.commit().await?;
        exec.record_touched(&plan.touched);
        info!(
            statements = plan.statements.len(),
            rows = plan.touched.values().map(Vec::len).sum::<usize>(),
            "mutation committed"
        );

        let mut data = Map::new();
        let mut read_back = match read_back {
            Some(Value::Object(object)) => object,
            _ => Map::new(),
        };
        for (key, output) in &plan.roots {
            let value = match output {
                RootOutput::ReadBack => read_back.remove(key).unwrap_or(Value::Null),
                RootOutput::Static(value) => value.clone(),
            };
            data.insert(key.clone(), value);
        }
        Ok(Value::Object(data))
    }

    async fn write(
        &self,
        coordinator: &mut TransactionCoordinator<'_>,
        plan: &MutationPlan,
    ) -> EngineResult<Option<Value>> {
        for statement in &plan.statements {
            coordinator.execute(statement).await?;
        }
        let Some(select) = &plan.read_back else {
            return Ok(None);
        };
        let sql = SqlPrinter::new(self.dialect()).select(select);
        debug!(sql = %sql, "mutation read-back");
        Ok(Some(first_row(coordinator.fetch_json(&sql).await?)?))
    }
}

/// The single JSON row of a compiled SELECT
fn first_row(rows: Vec<Value>) -> EngineResult<Value> {
    rows.into_iter()
        .next()
        .ok_or_else(|| EngineError::Internal("JSON query returned no row".to_string()))
}
