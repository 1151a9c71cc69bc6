//! Running compiled SQL against a [`Database`](crate::storage::Database)
//!
//! - [`ExecutionContext`]: per-request clock and written ids
//! - [`TransactionCoordinator`]: the mutation transaction state machine
//! - [`Engine`]: queries and mutations end to end

pub mod context;
pub mod engine;
pub mod transaction;

pub use context::ExecutionContext;
pub use engine::{Engine, Response};
pub use transaction::{TransactionCoordinator, TransactionState};
