//! Selection trees to nested SQL SELECTs returning JSON
//!
//! A whole query compiles to
//!
//! ```text
//! SELECT json_build_object('users', (<aggregate over "user" t0>), ...) AS data
//! ```
//!
//! Each related field becomes a correlated subquery of its parent alias, so
//! the database assembles the response shape and one row comes back.

use crate::compiler::predicate::PredicateCompiler;
use crate::core::error::{EngineResult, InputError, SchemaError};
use crate::document::{FieldSelection, QueryContext, Selection};
use crate::schema::directive::{DirectiveModel, Relation};
use crate::schema::model::{ID_FIELD, IS_DELETED_FIELD};
use crate::sql::ast::{
    DATA_COLUMN, Expr, FromClause, Join, JsonAggregate, JsonValue, Literal, ORD_COLUMN, OrderBy,
    Select, SelectItem, TableRef,
};
use serde_json::Value;
use uuid::Uuid;

const WHERE_ARG: &str = "where";
const ORDER_ARG: &str = "order";
const LIMIT_ARG: &str = "limit";
const OFFSET_ARG: &str = "offset";

/// Type name reported for `__typename` on the query root
const QUERY_TYPENAME: &str = "Query";

/// How the rows of a subquery relate to the enclosing row
#[derive(Debug, Clone)]
enum Correlation {
    /// Root field: every live row
    None,
    /// A single row by primary key
    ById(Uuid),
    /// `target.id = parent.local_column`
    ToOne {
        parent_alias: String,
        local_column: String,
    },
    /// `target.foreign_column = parent.id`
    ToMany {
        parent_alias: String,
        parent_id: String,
        foreign_column: String,
    },
    /// Through `join_table` where `left = parent.id` and `right = target.id`
    ManyToMany {
        parent_alias: String,
        parent_id: String,
        join_type: String,
        join_table: String,
        left_column: String,
        right_column: String,
    },
}

/// Compiles selections of one request into SQL AST
pub struct QueryCompiler<'a> {
    ctx: &'a QueryContext,
    model: &'a DirectiveModel,
    predicates: PredicateCompiler<'a>,
    next_table: usize,
    next_derived: usize,
}

impl<'a> QueryCompiler<'a> {
    pub fn new(ctx: &'a QueryContext) -> Self {
        Self {
            ctx,
            model: &ctx.schema,
            predicates: PredicateCompiler::new(&ctx.schema),
            next_table: 0,
            next_derived: 0,
        }
    }

    /// One SELECT for every root field of the operation
    pub fn compile_query(&mut self) -> EngineResult<Select> {
        let roots = self.ctx.root_fields()?;
        self.compile_roots(&roots)
    }

    /// One SELECT per root field, keyed by response key
    ///
    /// Each root compiles independently so one bad root does not hide the
    /// others.
    pub fn compile_scattered(&mut self) -> EngineResult<Vec<(String, EngineResult<Select>)>> {
        Ok(self
            .ctx
            .root_fields()?
            .into_iter()
            .map(|root| {
                let key = root.response_key().to_string();
                (key, self.compile_roots(std::slice::from_ref(&root)))
            })
            .collect())
    }

    fn compile_roots(&mut self, roots: &[FieldSelection]) -> EngineResult<Select> {
        let mut entries = Vec::with_capacity(roots.len());
        for root in roots {
            let value = if root.is_typename() {
                JsonValue::Text(QUERY_TYPENAME.to_string())
            } else {
                let root_field = self.model.root_field(&root.name)?;
                let (type_name, is_list) = (root_field.type_name.clone(), root_field.is_list);
                JsonValue::Nested(self.subquery(&type_name, root, is_list, Correlation::None)?)
            };
            entries.push((root.response_key().to_string(), value));
        }
        Ok(json_row(Expr::JsonObject(entries)))
    }

    /// Scalar subquery yielding the JSON object of one row, or null
    pub fn entity_by_id(
        &mut self,
        type_name: &str,
        selections: &[Selection],
        id: Uuid,
    ) -> EngineResult<Expr> {
        let field = FieldSelection {
            alias: None,
            name: type_name.to_string(),
            arguments: Default::default(),
            selections: selections.to_vec(),
        };
        self.subquery(type_name, &field, false, Correlation::ById(id))
    }

    /// JSON object of `type_name` read from the row aliased `alias`
    fn object(
        &mut self,
        type_name: &str,
        selections: &[Selection],
        alias: &str,
    ) -> EngineResult<Expr> {
        let fields = self.ctx.collect_fields(selections, type_name)?;
        let mut entries = Vec::with_capacity(fields.len());

        for field in &fields {
            let key = field.response_key().to_string();
            if field.is_typename() {
                entries.push((key, JsonValue::Text(type_name.to_string())));
                continue;
            }

            let info = self.model.field_info(type_name, &field.name)?;
            let value = match &info.relation {
                Relation::Column => match (info.scalar_type, &info.column) {
                    (Some(scalar), Some(column)) => JsonValue::Scalar {
                        expr: Expr::column(alias, column),
                        scalar,
                    },
                    _ => {
                        return Err(SchemaError::InvalidDirective {
                            type_name: type_name.to_string(),
                            field: field.name.clone(),
                            message: "column field without a scalar type".to_string(),
                        }
                        .into());
                    }
                },
                Relation::ToOne {
                    target,
                    local_column,
                } => JsonValue::Nested(self.subquery(
                    target,
                    field,
                    false,
                    Correlation::ToOne {
                        parent_alias: alias.to_string(),
                        local_column: local_column.clone(),
                    },
                )?),
                Relation::ToMany {
                    target,
                    foreign_column,
                } => JsonValue::Nested(self.subquery(
                    target,
                    field,
                    true,
                    Correlation::ToMany {
                        parent_alias: alias.to_string(),
                        parent_id: self.column(type_name, ID_FIELD)?,
                        foreign_column: foreign_column.clone(),
                    },
                )?),
                Relation::ManyToMany {
                    target,
                    join_type,
                    join_table,
                    left_column,
                    right_column,
                } => JsonValue::Nested(self.subquery(
                    target,
                    field,
                    true,
                    Correlation::ManyToMany {
                        parent_alias: alias.to_string(),
                        parent_id: self.column(type_name, ID_FIELD)?,
                        join_type: join_type.clone(),
                        join_table: join_table.clone(),
                        left_column: left_column.clone(),
                        right_column: right_column.clone(),
                    },
                )?),
            };
            entries.push((key, value));
        }

        Ok(Expr::JsonObject(entries))
    }

    /// Subquery over `type_name` honoring the field's arguments
    fn subquery(
        &mut self,
        type_name: &str,
        field: &FieldSelection,
        many: bool,
        correlation: Correlation,
    ) -> EngineResult<Expr> {
        let entity = self.model.entity(type_name)?;
        let alias = self.table_alias();
        let id_column = self.column(type_name, ID_FIELD)?;

        let mut conditions = Vec::new();
        let mut joins = Vec::new();

        match &correlation {
            Correlation::None => {}
            Correlation::ById(id) => conditions.push(Expr::eq(
                Expr::column(&alias, &id_column),
                Expr::Literal(Literal::Uuid(*id)),
            )),
            Correlation::ToOne {
                parent_alias,
                local_column,
            } => conditions.push(Expr::eq(
                Expr::column(&alias, &id_column),
                Expr::column(parent_alias, local_column),
            )),
            Correlation::ToMany {
                parent_alias,
                parent_id,
                foreign_column,
            } => conditions.push(Expr::eq(
                Expr::column(&alias, foreign_column),
                Expr::column(parent_alias, parent_id),
            )),
            Correlation::ManyToMany {
                parent_alias,
                parent_id,
                join_type,
                join_table,
                left_column,
                right_column,
            } => {
                let join_alias = self.table_alias();
                let mut on = vec![Expr::eq(
                    Expr::column(&join_alias, right_column),
                    Expr::column(&alias, &id_column),
                )];
                on.push(Expr::eq(
                    Expr::column(&join_alias, left_column),
                    Expr::column(parent_alias, parent_id),
                ));
                if let Some(retired) = self.live_row_condition(join_type, &join_alias)? {
                    on.push(retired);
                }
                joins.push(Join {
                    table: TableRef {
                        table: join_table.clone(),
                        alias: join_alias,
                    },
                    on: Expr::And(on),
                });
            }
        }

        if let Some(live) = self.live_row_condition(type_name, &alias)? {
            conditions.push(live);
        }

        if let Some(filter) = field.argument(WHERE_ARG) {
            if let Some(expr) = self.predicates.compile_where(type_name, filter, &alias)? {
                conditions.push(expr);
            }
        }

        let mut order_by = match field.argument(ORDER_ARG) {
            Some(order) => self.predicates.compile_order(type_name, order, &alias)?,
            None => Vec::new(),
        };
        let keyed = matches!(
            correlation,
            Correlation::ById(_) | Correlation::ToOne { .. }
        );
        if order_by.is_empty() && !keyed {
            order_by.push(OrderBy {
                expr: Expr::column(&alias, &id_column),
                descending: false,
                nulls: None,
            });
        }

        let offset = non_negative(field, OFFSET_ARG)?;
        let limit = if many {
            non_negative(field, LIMIT_ARG)?
        } else {
            Some(1)
        };

        let object = self.object(type_name, &field.selections, &alias)?;
        let from = Some(FromClause::Table(TableRef {
            table: entity.table.clone(),
            alias: alias.clone(),
        }));
        let selection = Expr::and_all(conditions);

        if !many {
            return Ok(Expr::Subquery(Box::new(Select {
                projection: vec![SelectItem {
                    expr: object,
                    alias: None,
                }],
                from,
                joins,
                selection,
                order_by,
                limit,
                offset,
            })));
        }

        let source = Select {
            projection: vec![
                SelectItem {
                    expr: object,
                    alias: Some(DATA_COLUMN.to_string()),
                },
                SelectItem {
                    expr: Expr::RowNumber(order_by.clone()),
                    alias: Some(ORD_COLUMN.to_string()),
                },
            ],
            from,
            joins,
            selection,
            order_by,
            limit,
            offset,
        };
        Ok(Expr::JsonAggregate(Box::new(JsonAggregate {
            source,
            alias: self.derived_alias(),
        })))
    }

    /// `alias.is_deleted = FALSE` for soft deletable types
    fn live_row_condition(&self, type_name: &str, alias: &str) -> EngineResult<Option<Expr>> {
        if !self.model.entity(type_name)?.is_soft_deletable() {
            return Ok(None);
        }
        let column = self.column(type_name, IS_DELETED_FIELD)?;
        Ok(Some(Expr::eq(
            Expr::column(alias, column),
            Expr::boolean(false),
        )))
    }

    fn column(&self, type_name: &str, field: &str) -> EngineResult<String> {
        let info = self.model.field_info(type_name, field)?;
        info.column.clone().ok_or_else(|| {
            SchemaError::InvalidDirective {
                type_name: type_name.to_string(),
                field: field.to_string(),
                message: "field has no column".to_string(),
            }
            .into()
        })
    }

    fn table_alias(&mut self) -> String {
        let alias = format!("t{}", self.next_table);
        self.next_table += 1;
        alias
    }

    fn derived_alias(&mut self) -> String {
        let alias = format!("d{}", self.next_derived);
        self.next_derived += 1;
        alias
    }
}

/// `SELECT <expr> AS data` without a FROM clause
pub fn json_row(expr: Expr) -> Select {
    Select {
        projection: vec![SelectItem {
            expr,
            alias: Some(DATA_COLUMN.to_string()),
        }],
        ..Default::default()
    }
}

fn non_negative(field: &FieldSelection, argument: &str) -> EngineResult<Option<u64>> {
    match field.argument(argument) {
        None => Ok(None),
        Some(Value::Number(n)) if n.as_u64().is_some() => Ok(n.as_u64()),
        Some(other) => Err(InputError::InvalidValue {
            field: format!("{}({})", field.name, argument),
            message: format!("expected a non-negative integer, got {}", other),
        }
        .into()),
    }
}
