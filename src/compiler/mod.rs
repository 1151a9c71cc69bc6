//! Query and mutation compilation
//!
//! - [`predicate`]: `where` filters and `order` tokens
//! - [`query`]: selection trees to one nested JSON-producing SELECT
//! - [`mutation`]: nested write payloads to per-entity statements
//! - [`sequencer`]: dependency-safe, grouped statement order

pub mod mutation;
pub mod predicate;
pub mod query;
pub mod sequencer;

pub use mutation::{MutationCompiler, MutationKind, MutationPlan, RootOutput};
pub use predicate::PredicateCompiler;
pub use query::QueryCompiler;
pub use sequencer::sequence;

use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Insert,
    Update,
    SoftDelete,
    LinkInsert,
    LinkRetire,
}

/// One write statement of a mutation
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub type_name: String,
    /// Entity id, or the smaller of the two ids for join rows
    pub ordering_key: Uuid,
    pub sql: String,
    pub kind: StatementKind,
    /// Update and delete statements must match exactly one row
    pub expects_single_row: bool,
    /// Row inserted by this statement
    pub creates: Option<Uuid>,
    /// Rows created earlier in the same mutation that this statement references
    pub requires: Vec<Uuid>,
}
