//! Mutation transaction state machine
//!
//! ```text
//! Idle --begin--> InTransaction --commit---> Committed
//!                       |
//!                       +------rollback----> RolledBack
//! ```
//!
//! Any other transition is an internal error.

use crate::compiler::Statement;
use crate::core::error::{EngineError, EngineResult};
use crate::storage::{Database, Transaction};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Idle,
    InTransaction,
    Committed,
    RolledBack,
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionState::Idle => "idle",
            TransactionState::InTransaction => "in transaction",
            TransactionState::Committed => "committed",
            TransactionState::RolledBack => "rolled back",
        };
        f.write_str(name)
    }
}

/// Drives one mutation transaction
pub struct TransactionCoordinator<'d> {
    database: &'d dyn Database,
    state: TransactionState,
    tx: Option<Box<dyn Transaction>>,
}

impl<'d> TransactionCoordinator<'d> {
    pub fn new(database: &'d dyn Database) -> Self {
        Self {
            database,
            state: TransactionState::Idle,
            tx: None,
        }
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub async fn begin(&mut self) -> EngineResult<()> {
        self.expect(TransactionState::Idle, "begin")?;
        self.tx = Some(self.database.begin().await?);
        self.state = TransactionState::InTransaction;
        Ok(())
    }

    /// Run one statement, enforcing its single-row expectation
    ///
    /// An update or delete that matches no row lost the version race and
    /// fails with [`EngineError::OptimisticLock`].
    pub async fn execute(&mut self, statement: &Statement) -> EngineResult<u64> {
        let rows = self.active("execute")?.execute(&statement.sql).await?;
        if statement.expects_single_row && rows != 1 {
            return Err(EngineError::OptimisticLock {
                type_name: statement.type_name.clone(),
                id: statement.ordering_key,
            });
        }
        Ok(rows)
    }

    pub async fn fetch_json(&mut self, sql: &str) -> EngineResult<Vec<Value>> {
        self.active("fetch")?.fetch_json(sql).await
    }

    pub async fn commit(&mut self) -> EngineResult<()> {
        self.expect(TransactionState::InTransaction, "commit")?;
        let tx = self.take()?;
        match tx.commit().await {
            Ok(()) => {
                self.state = TransactionState::Committed;
                Ok(())
            }
            Err(e) => {
                self.state = TransactionState::RolledBack;
                Err(e)
            }
        }
    }

    pub async fn rollback(&mut self) -> EngineResult<()> {
        self.expect(TransactionState::InTransaction, "rollback")?;
        let tx = self.take()?;
        self.state = TransactionState::RolledBack;
        tx.rollback().await
    }

    fn expect(&self, state: TransactionState, action: &str) -> EngineResult<()> {
        if self.state == state {
            Ok(())
        } else {
            Err(EngineError::Internal(format!(
                "cannot {} a transaction that is {}",
                action, self.state
            )))
        }
    }

    fn active(&mut self, action: &str) -> EngineResult<&mut Box<dyn Transaction>> {
        self.expect(TransactionState::InTransaction, action)?;
        self.tx
            .as_mut()
            .ok_or_else(|| EngineError::Internal("transaction handle missing".to_string()))
    }

    fn take(&mut self) -> EngineResult<Box<dyn Transaction>> {
        self.tx
            .take()
            .ok_or_else(|| EngineError::Internal("transaction handle missing".to_string()))
    }
}
