//! SQL AST, dialects and the printer that renders them

pub mod ast;
pub mod dialect;
pub mod printer;

pub use ast::{Expr, Insert, JsonAggregate, JsonValue, Literal, OrderBy, Select, Update, Write};
pub use dialect::Dialect;
pub use printer::SqlPrinter;
