//! Dialect printer for the SQL AST

use crate::schema::model::ScalarType;
use crate::sql::ast::{
    BinaryOperator, DATA_COLUMN, Expr, FromClause, Insert, JsonAggregate, JsonValue, Literal,
    NullsOrder, ORD_COLUMN, OrderBy, Select, TableRef, Update, Write,
};
use crate::sql::dialect::Dialect;

/// MySQL has no OFFSET without LIMIT; this is the documented "all rows" bound
const MYSQL_NO_LIMIT: u64 = 18_446_744_073_709_551_615;

/// PostgreSQL functions take at most 100 arguments
const POSTGRES_MAX_JSON_PAIRS: usize = 50;

/// Renders AST nodes as SQL text for one dialect
#[derive(Debug, Clone, Copy)]
pub struct SqlPrinter {
    dialect: Dialect,
}

impl SqlPrinter {
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn write(&self, write: &Write) -> String {
        match write {
            Write::Insert(insert) => self.insert(insert),
            Write::Update(update) => self.update(update),
        }
    }

    pub fn insert(&self, insert: &Insert) -> String {
        let columns: Vec<String> = insert
            .columns
            .iter()
            .map(|c| self.dialect.quote_identifier(c))
            .collect();
        let values: Vec<String> = insert.values.iter().map(|v| self.expr(v)).collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.dialect.quote_identifier(&insert.table),
            columns.join(", "),
            values.join(", ")
        )
    }

    pub fn update(&self, update: &Update) -> String {
        let assignments: Vec<String> = update
            .assignments
            .iter()
            .map(|(column, value)| {
                format!(
                    "{} = {}",
                    self.dialect.quote_identifier(column),
                    self.expr(value)
                )
            })
            .collect();
        let mut sql = format!(
            "UPDATE {} SET {}",
            self.dialect.quote_identifier(&update.table),
            assignments.join(", ")
        );
        if let Some(selection) = &update.selection {
            sql.push_str(" WHERE ");
            sql.push_str(&self.expr(selection));
        }
        sql
    }

    pub fn select(&self, select: &Select) -> String {
        let projection: Vec<String> = select
            .projection
            .iter()
            .map(|item| match &item.alias {
                Some(alias) => format!("{} AS {}", self.expr(&item.expr), alias),
                None => self.expr(&item.expr),
            })
            .collect();

        let mut sql = format!("SELECT {}", projection.join(", "));

        if let Some(from) = &select.from {
            sql.push_str(" FROM ");
            match from {
                FromClause::Table(table) => sql.push_str(&self.table(table)),
                FromClause::Derived { select, alias } => {
                    sql.push_str(&format!("({}) {}", self.select(select), alias));
                }
            }
        }

        for join in &select.joins {
            sql.push_str(&format!(
                " INNER JOIN {} ON {}",
                self.table(&join.table),
                self.expr(&join.on)
            ));
        }

        if let Some(selection) = &select.selection {
            sql.push_str(" WHERE ");
            sql.push_str(&self.expr(selection));
        }

        if !select.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.order_by(&select.order_by));
        }

        match (select.limit, select.offset, self.dialect) {
            (Some(limit), Some(offset), _) => {
                sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset))
            }
            (Some(limit), None, _) => sql.push_str(&format!(" LIMIT {}", limit)),
            (None, Some(offset), Dialect::Mysql) => {
                sql.push_str(&format!(" LIMIT {} OFFSET {}", MYSQL_NO_LIMIT, offset))
            }
            (None, Some(offset), Dialect::Postgres) => {
                sql.push_str(&format!(" OFFSET {}", offset))
            }
            (None, None, _) => {}
        }

        sql
    }

    fn table(&self, table: &TableRef) -> String {
        format!("{} {}", self.dialect.quote_identifier(&table.table), table.alias)
    }

    fn order_by(&self, order_by: &[OrderBy]) -> String {
        let mut items = Vec::with_capacity(order_by.len());
        for item in order_by {
            let expr = self.expr(&item.expr);
            let direction = if item.descending { "DESC" } else { "ASC" };
            match (self.dialect, item.nulls) {
                (_, None) => items.push(format!("{} {}", expr, direction)),
                (Dialect::Postgres, Some(NullsOrder::First)) => {
                    items.push(format!("{} {} NULLS FIRST", expr, direction))
                }
                (Dialect::Postgres, Some(NullsOrder::Last)) => {
                    items.push(format!("{} {} NULLS LAST", expr, direction))
                }
                // `x IS NULL` is 1 for nulls, so DESC puts them first
                (Dialect::Mysql, Some(nulls)) => {
                    let null_direction = match nulls {
                        NullsOrder::First => "DESC",
                        NullsOrder::Last => "ASC",
                    };
                    items.push(format!("{} IS NULL {}", expr, null_direction));
                    items.push(format!("{} {}", expr, direction));
                }
            }
        }
        items.join(", ")
    }

    pub fn expr(&self, expr: &Expr) -> String {
        match expr {
            Expr::Column { table, name } => match table {
                Some(table) => format!("{}.{}", table, self.dialect.quote_identifier(name)),
                None => self.dialect.quote_identifier(name),
            },
            Expr::Literal(literal) => self.dialect.literal(literal),
            Expr::Binary { left, op, right } => {
                format!("{} {} {}", self.expr(left), operator(*op), self.expr(right))
            }
            Expr::IsNull { expr, negated } => {
                let keyword = if *negated { "IS NOT NULL" } else { "IS NULL" };
                format!("{} {}", self.expr(expr), keyword)
            }
            Expr::InList {
                expr,
                list,
                negated,
            } => {
                if list.is_empty() {
                    return self.dialect.literal(&Literal::Bool(*negated));
                }
                let items: Vec<String> = list.iter().map(|e| self.expr(e)).collect();
                let keyword = if *negated { "NOT IN" } else { "IN" };
                format!("{} {} ({})", self.expr(expr), keyword, items.join(", "))
            }
            Expr::And(items) => self.junction(items, " AND ", true),
            Expr::Or(items) => self.junction(items, " OR ", false),
            Expr::Not(inner) => format!("NOT ({})", self.expr(inner)),
            Expr::Subquery(select) => format!("({})", self.select(select)),
            Expr::JsonObject(entries) => self.json_object(entries),
            Expr::JsonArray(items) => {
                let rendered: Vec<String> = items.iter().map(|e| self.nested_json(e)).collect();
                match self.dialect {
                    Dialect::Postgres => format!("json_build_array({})", rendered.join(", ")),
                    Dialect::Mysql => format!("JSON_ARRAY({})", rendered.join(", ")),
                }
            }
            Expr::JsonAggregate(aggregate) => self.json_aggregate(aggregate),
            Expr::RowNumber(order_by) => {
                if order_by.is_empty() {
                    "ROW_NUMBER() OVER ()".to_string()
                } else {
                    format!("ROW_NUMBER() OVER (ORDER BY {})", self.order_by(order_by))
                }
            }
        }
    }

    fn junction(&self, items: &[Expr], separator: &str, empty: bool) -> String {
        if items.is_empty() {
            return self.dialect.literal(&Literal::Bool(empty));
        }
        let rendered: Vec<String> = items.iter().map(|e| self.expr(e)).collect();
        format!("({})", rendered.join(separator))
    }

    fn json_object(&self, entries: &[(String, JsonValue)]) -> String {
        match self.dialect {
            Dialect::Postgres if entries.len() > POSTGRES_MAX_JSON_PAIRS => {
                // splice the chunks' text so key order survives
                let inner: Vec<String> = entries
                    .chunks(POSTGRES_MAX_JSON_PAIRS)
                    .map(|chunk| {
                        format!("left(right({}::text, -1), -1)", self.json_object(chunk))
                    })
                    .collect();
                format!("('{{' || {} || '}}')::json", inner.join(" || ', ' || "))
            }
            Dialect::Postgres => format!("json_build_object({})", self.json_pairs(entries)),
            Dialect::Mysql => format!("JSON_OBJECT({})", self.json_pairs(entries)),
        }
    }

    fn json_pairs(&self, entries: &[(String, JsonValue)]) -> String {
        let mut args = Vec::with_capacity(entries.len() * 2);
        for (key, value) in entries {
            args.push(self.dialect.quote_string(key));
            args.push(match value {
                JsonValue::Scalar { expr, scalar } => self.json_scalar(expr, *scalar),
                JsonValue::Text(text) => self.dialect.quote_string(text),
                JsonValue::Nested(expr) => self.nested_json(expr),
            });
        }
        args.join(", ")
    }

    fn json_scalar(&self, expr: &Expr, scalar: ScalarType) -> String {
        let rendered = self.expr(expr);
        match (self.dialect, scalar) {
            // MySQL booleans are TINYINT(1) and would serialize as 0/1
            (Dialect::Mysql, ScalarType::Boolean) => format!(
                "CAST(CASE WHEN {0} THEN 'true' WHEN NOT {0} THEN 'false' END AS JSON)",
                rendered
            ),
            _ => rendered,
        }
    }

    fn nested_json(&self, expr: &Expr) -> String {
        match (self.dialect, expr) {
            (Dialect::Mysql, Expr::Subquery(_)) => format!("CAST({} AS JSON)", self.expr(expr)),
            _ => self.expr(expr),
        }
    }

    fn json_aggregate(&self, aggregate: &JsonAggregate) -> String {
        let alias = &aggregate.alias;
        let source = self.select(&aggregate.source);
        match self.dialect {
            Dialect::Postgres => format!(
                "(SELECT coalesce(json_agg({alias}.{DATA_COLUMN} ORDER BY {alias}.{ORD_COLUMN}), '[]'::json) FROM ({source}) {alias})"
            ),
            Dialect::Mysql => format!(
                "(SELECT CAST(CONCAT('[', COALESCE(GROUP_CONCAT({alias}.{DATA_COLUMN} ORDER BY {alias}.{ORD_COLUMN} SEPARATOR ','), ''), ']') AS JSON) FROM ({source}) {alias})"
            ),
        }
    }
}

fn operator(op: BinaryOperator) -> &'static str {
    match op {
        BinaryOperator::Eq => "=",
        BinaryOperator::NotEq => "<>",
        BinaryOperator::Gt => ">",
        BinaryOperator::Lt => "<",
        BinaryOperator::GtEq => ">=",
        BinaryOperator::LtEq => "<=",
        BinaryOperator::Like => "LIKE",
        BinaryOperator::NotLike => "NOT LIKE",
        BinaryOperator::Plus => "+",
    }
}
