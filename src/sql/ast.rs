//! Internal SQL AST
//!
//! The compilers build these nodes; only the printer turns them into text.
//! Identifiers are stored unquoted and literals unescaped so that all quoting
//! happens in one place per dialect.

use crate::schema::model::ScalarType;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A literal value
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
    /// Serialized JSON document stored in a JSON column
    Json(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Eq,
    NotEq,
    Gt,
    Lt,
    GtEq,
    LtEq,
    Like,
    NotLike,
    Plus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullsOrder {
    First,
    Last,
}

/// One ORDER BY element
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub expr: Expr,
    pub descending: bool,
    pub nulls: Option<NullsOrder>,
}

/// How a value is embedded into a JSON object
#[derive(Debug, Clone, PartialEq)]
pub enum JsonValue {
    /// A column or literal of the given scalar type
    Scalar { expr: Expr, scalar: ScalarType },
    /// A plain string literal (`__typename`)
    Text(String),
    /// A subquery or expression that already yields JSON
    Nested(Expr),
}

/// An expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// `alias.column`, or a bare column when no table alias is given
    Column {
        table: Option<String>,
        name: String,
    },
    Literal(Literal),
    Binary {
        left: Box<Expr>,
        op: BinaryOperator,
        right: Box<Expr>,
    },
    IsNull {
        expr: Box<Expr>,
        negated: bool,
    },
    InList {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
    /// Scalar subquery
    Subquery(Box<Select>),
    /// JSON object built from ordered `(key, value)` pairs
    JsonObject(Vec<(String, JsonValue)>),
    /// JSON array of values that already yield JSON
    JsonArray(Vec<Expr>),
    /// Subquery aggregating the rows of `source` into a JSON array
    JsonAggregate(Box<JsonAggregate>),
    /// `ROW_NUMBER() OVER (ORDER BY ...)`
    RowNumber(Vec<OrderBy>),
}

impl Expr {
    pub fn column(table: impl Into<String>, name: impl Into<String>) -> Self {
        Expr::Column {
            table: Some(table.into()),
            name: name.into(),
        }
    }

    pub fn bare_column(name: impl Into<String>) -> Self {
        Expr::Column {
            table: None,
            name: name.into(),
        }
    }

    pub fn literal(literal: Literal) -> Self {
        Expr::Literal(literal)
    }

    pub fn binary(left: Expr, op: BinaryOperator, right: Expr) -> Self {
        Expr::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    pub fn eq(left: Expr, right: Expr) -> Self {
        Expr::binary(left, BinaryOperator::Eq, right)
    }

    /// Constant `TRUE`/`FALSE`
    pub fn boolean(value: bool) -> Self {
        Expr::Literal(Literal::Bool(value))
    }

    /// Conjunction that collapses empty and single-element lists
    pub fn and_all(mut exprs: Vec<Expr>) -> Option<Expr> {
        match exprs.len() {
            0 => None,
            1 => exprs.pop(),
            _ => Some(Expr::And(exprs)),
        }
    }

    /// Disjunction that collapses empty and single-element lists
    pub fn or_all(mut exprs: Vec<Expr>) -> Option<Expr> {
        match exprs.len() {
            0 => None,
            1 => exprs.pop(),
            _ => Some(Expr::Or(exprs)),
        }
    }
}

/// A table in a FROM or JOIN clause
#[derive(Debug, Clone, PartialEq)]
pub struct TableRef {
    pub table: String,
    /// Generated alias (`t0`, `t1`, ...); derived tables use [`FromClause::Derived`]
    pub alias: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FromClause {
    Table(TableRef),
    /// `(SELECT ...) alias`
    Derived { select: Box<Select>, alias: String },
}

/// `INNER JOIN table alias ON condition`
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub table: TableRef,
    pub on: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    pub expr: Expr,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Select {
    pub projection: Vec<SelectItem>,
    pub from: Option<FromClause>,
    pub joins: Vec<Join>,
    pub selection: Option<Expr>,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// Rows of `source` (projecting `data` and `ord`) aggregated into one JSON array
///
/// `source` must project the JSON object as `data` and its position as `ord`.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonAggregate {
    pub source: Select,
    pub alias: String,
}

/// Column name projected by aggregate sources
pub const DATA_COLUMN: &str = "data";
/// Row position column projected by aggregate sources
pub const ORD_COLUMN: &str = "ord";

#[derive(Debug, Clone, PartialEq)]
pub struct Insert {
    pub table: String,
    pub columns: Vec<String>,
    pub values: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub table: String,
    pub assignments: Vec<(String, Expr)>,
    pub selection: Option<Expr>,
}

/// A write statement
#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    Insert(Insert),
    Update(Update),
}
