//! Filter expressions and order tokens
//!
//! Filters have the shape
//!
//! ```text
//! { name: { eq: "bob" }, age: { gt: 3 }, not: {...}, and: [...], or: [...] }
//! ```
//!
//! Field predicates are ANDed, then combined with the sub-expressions as
//! `(predicates AND NOT(not) AND and...) OR (or...)`. Order tokens have the
//! shape `<field>_<ASC|DESC>[_NULLS_<FIRST|LAST>]`.

use crate::core::error::{EngineResult, InputError};
use crate::schema::directive::{DirectiveModel, FieldInfo};
use crate::schema::model::ScalarType;
use crate::sql::ast::{BinaryOperator, Expr, Literal, NullsOrder, OrderBy};
use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;
use uuid::Uuid;

const NOT_KEY: &str = "not";
const AND_KEY: &str = "and";
const OR_KEY: &str = "or";

/// Comparison operators accepted in filters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    In,
    NotIn,
    Like,
    NotLike,
}

impl FilterOperator {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "eq" => Some(FilterOperator::Eq),
            "ne" => Some(FilterOperator::Ne),
            "gt" => Some(FilterOperator::Gt),
            "lt" => Some(FilterOperator::Lt),
            "ge" => Some(FilterOperator::Ge),
            "le" => Some(FilterOperator::Le),
            "in" => Some(FilterOperator::In),
            "ni" => Some(FilterOperator::NotIn),
            "li" => Some(FilterOperator::Like),
            "nl" => Some(FilterOperator::NotLike),
            _ => None,
        }
    }
}

/// Compiles `where` and `order` arguments against one entity type
pub struct PredicateCompiler<'a> {
    model: &'a DirectiveModel,
}

impl<'a> PredicateCompiler<'a> {
    pub fn new(model: &'a DirectiveModel) -> Self {
        Self { model }
    }

    /// Compile a filter object; `None` when it constrains nothing
    pub fn compile_where(
        &self,
        type_name: &str,
        filter: &Value,
        table_alias: &str,
    ) -> EngineResult<Option<Expr>> {
        let object = filter.as_object().ok_or_else(|| InputError::MalformedFilter {
            message: format!("expected an object, got {}", filter),
        })?;
        self.compile_object(type_name, object, table_alias)
    }

    fn compile_object(
        &self,
        type_name: &str,
        object: &Map<String, Value>,
        table_alias: &str,
    ) -> EngineResult<Option<Expr>> {
        let mut conjunction = Vec::new();
        let mut disjunction = Vec::new();

        for (key, value) in object {
            match key.as_str() {
                NOT_KEY => {
                    if let Some(inner) = self.compile_where(type_name, value, table_alias)? {
                        conjunction.push(Expr::Not(Box::new(inner)));
                    }
                }
                AND_KEY => {
                    for branch in branches(value)? {
                        if let Some(inner) = self.compile_where(type_name, branch, table_alias)? {
                            conjunction.push(inner);
                        }
                    }
                }
                OR_KEY => {
                    for branch in branches(value)? {
                        // an empty branch matches everything
                        let inner = self
                            .compile_where(type_name, branch, table_alias)?
                            .unwrap_or_else(|| Expr::boolean(true));
                        disjunction.push(inner);
                    }
                }
                field => {
                    let info = self.filter_field(type_name, field)?;
                    conjunction.extend(self.compile_field(info, value, table_alias)?);
                }
            }
        }

        match (Expr::and_all(conjunction), Expr::or_all(disjunction)) {
            (None, None) => Ok(None),
            (Some(and), None) => Ok(Some(and)),
            (None, Some(or)) => Ok(Some(or)),
            (Some(and), Some(or)) => Ok(Some(Expr::Or(vec![and, or]))),
        }
    }

    fn filter_field(&self, type_name: &str, field: &str) -> EngineResult<&'a FieldInfo> {
        self.model
            .field_info(type_name, field)
            .ok()
            .filter(|info| info.column.is_some())
            .ok_or_else(|| {
                InputError::MalformedFilter {
                    message: format!("'{}' is not a filterable field of {}", field, type_name),
                }
                .into()
            })
    }

    fn compile_field(
        &self,
        info: &FieldInfo,
        operations: &Value,
        table_alias: &str,
    ) -> EngineResult<Vec<Expr>> {
        let operations = operations
            .as_object()
            .ok_or_else(|| InputError::MalformedFilter {
                message: format!(
                    "expected operators for '{}', got {}",
                    info.field_name, operations
                ),
            })?;

        let column = Expr::column(table_alias, column_of(info)?);
        let mut predicates = Vec::with_capacity(operations.len());

        for (name, value) in operations {
            let operator = FilterOperator::parse(name).ok_or_else(|| {
                InputError::UnknownOperator {
                    operator: name.clone(),
                }
            })?;
            predicates.push(compile_comparison(info, column.clone(), operator, value)?);
        }

        Ok(predicates)
    }

    /// Compile an order argument: one token or a list of tokens
    pub fn compile_order(
        &self,
        type_name: &str,
        order: &Value,
        table_alias: &str,
    ) -> EngineResult<Vec<OrderBy>> {
        let tokens: Vec<&Value> = match order {
            Value::Array(items) => items.iter().collect(),
            single => vec![single],
        };

        tokens
            .into_iter()
            .map(|token| {
                let token = token.as_str().ok_or_else(|| InputError::MalformedOrder {
                    token: token.to_string(),
                })?;
                self.compile_order_token(type_name, token, table_alias)
            })
            .collect()
    }

    fn compile_order_token(
        &self,
        type_name: &str,
        token: &str,
        table_alias: &str,
    ) -> EngineResult<OrderBy> {
        static ORDER_TOKEN: OnceLock<Regex> = OnceLock::new();
        let regex = ORDER_TOKEN.get_or_init(|| {
            Regex::new(r"^(.+?)_(ASC|DESC)(?:_NULLS_(FIRST|LAST))?$").unwrap()
        });

        let malformed = || InputError::MalformedOrder {
            token: token.to_string(),
        };
        let captures = regex.captures(token).ok_or_else(malformed)?;
        let info = self
            .model
            .column_field(type_name, &captures[1])
            .ok_or_else(malformed)?;

        Ok(OrderBy {
            expr: Expr::column(table_alias, column_of(info)?),
            descending: &captures[2] == "DESC",
            nulls: captures.get(3).map(|m| match m.as_str() {
                "FIRST" => NullsOrder::First,
                _ => NullsOrder::Last,
            }),
        })
    }
}

fn branches(value: &Value) -> EngineResult<Vec<&Value>> {
    match value {
        Value::Array(items) => Ok(items.iter().collect()),
        Value::Object(_) => Ok(vec![value]),
        other => Err(InputError::MalformedFilter {
            message: format!("expected an object or a list, got {}", other),
        }
        .into()),
    }
}

fn column_of(info: &FieldInfo) -> EngineResult<&str> {
    info.column.as_deref().ok_or_else(|| {
        InputError::MalformedFilter {
            message: format!("'{}' has no column", info.field_name),
        }
        .into()
    })
}

fn compile_comparison(
    info: &FieldInfo,
    column: Expr,
    operator: FilterOperator,
    value: &Value,
) -> EngineResult<Expr> {
    let binary = |op: BinaryOperator| -> EngineResult<Expr> {
        if value.is_null() {
            return Err(InputError::InvalidValue {
                field: info.field_name.clone(),
                message: "null is only comparable with eq and ne".to_string(),
            }
            .into());
        }
        Ok(Expr::binary(
            column.clone(),
            op,
            Expr::Literal(scalar_literal(info, value)?),
        ))
    };

    match operator {
        FilterOperator::Eq if value.is_null() => Ok(Expr::IsNull {
            expr: Box::new(column),
            negated: false,
        }),
        FilterOperator::Ne if value.is_null() => Ok(Expr::IsNull {
            expr: Box::new(column),
            negated: true,
        }),
        FilterOperator::Eq => binary(BinaryOperator::Eq),
        FilterOperator::Ne => binary(BinaryOperator::NotEq),
        FilterOperator::Gt => binary(BinaryOperator::Gt),
        FilterOperator::Lt => binary(BinaryOperator::Lt),
        FilterOperator::Ge => binary(BinaryOperator::GtEq),
        FilterOperator::Le => binary(BinaryOperator::LtEq),
        FilterOperator::Like | FilterOperator::NotLike => {
            let pattern = value.as_str().ok_or_else(|| InputError::InvalidValue {
                field: info.field_name.clone(),
                message: "like patterns must be strings".to_string(),
            })?;
            let op = if operator == FilterOperator::Like {
                BinaryOperator::Like
            } else {
                BinaryOperator::NotLike
            };
            Ok(Expr::binary(
                column,
                op,
                Expr::Literal(Literal::String(pattern.to_string())),
            ))
        }
        FilterOperator::In | FilterOperator::NotIn => {
            let negated = operator == FilterOperator::NotIn;
            let items = value.as_array().ok_or_else(|| InputError::InvalidValue {
                field: info.field_name.clone(),
                message: "in/ni expect a list".to_string(),
            })?;
            if items.is_empty() {
                return Ok(Expr::boolean(negated));
            }
            let list = items
                .iter()
                .map(|item| scalar_literal(info, item).map(Expr::Literal))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Expr::InList {
                expr: Box::new(column),
                list,
                negated,
            })
        }
    }
}

/// Convert a JSON value into a literal of the field's column type
///
/// Columns backing an entity-typed `ref` hold ids.
pub fn scalar_literal(info: &FieldInfo, value: &Value) -> Result<Literal, InputError> {
    if value.is_null() {
        return Ok(Literal::Null);
    }
    let invalid = |message: &str| InputError::InvalidValue {
        field: format!("{}.{}", info.type_name, info.field_name),
        message: format!("{} (got {})", message, value),
    };

    match info.scalar_type.unwrap_or(ScalarType::Id) {
        ScalarType::Id | ScalarType::Uuid => value
            .as_str()
            .and_then(|s| Uuid::parse_str(s).ok())
            .map(Literal::Uuid)
            .ok_or_else(|| invalid("expected a UUID")),
        ScalarType::Int => value
            .as_i64()
            .map(Literal::Int)
            .ok_or_else(|| invalid("expected an integer")),
        ScalarType::Float => value
            .as_f64()
            .filter(|f| f.is_finite())
            .map(Literal::Float)
            .ok_or_else(|| invalid("expected a number")),
        ScalarType::String => value
            .as_str()
            .map(|s| Literal::String(s.to_string()))
            .ok_or_else(|| invalid("expected a string")),
        ScalarType::Boolean => value
            .as_bool()
            .map(Literal::Bool)
            .ok_or_else(|| invalid("expected a boolean")),
        ScalarType::Date => value
            .as_str()
            .and_then(parse_timestamp)
            .map(Literal::Timestamp)
            .ok_or_else(|| invalid("expected an RFC 3339 timestamp or a date")),
        ScalarType::Json => Ok(Literal::Json(value.to_string())),
    }
}

fn parse_timestamp(input: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(input) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
