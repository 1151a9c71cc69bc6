//! SQL dialects
//!
//! Every identifier and literal that reaches a statement goes through
//! [`Dialect::quote_identifier`] or [`Dialect::literal`].

use crate::core::error::ConfigError;
use crate::sql::ast::Literal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Postgres,
    Mysql,
}

impl Dialect {
    /// Human readable backend name used in logs and errors
    pub fn backend_name(&self) -> &'static str {
        match self {
            Dialect::Postgres => "PostgreSQL",
            Dialect::Mysql => "MySQL",
        }
    }

    /// Quote an identifier, doubling embedded quote characters
    pub fn quote_identifier(&self, ident: &str) -> String {
        match self {
            Dialect::Postgres => format!("\"{}\"", ident.replace('"', "\"\"")),
            Dialect::Mysql => format!("`{}`", ident.replace('`', "``")),
        }
    }

    /// Quote a string literal
    ///
    /// PostgreSQL runs with `standard_conforming_strings`, so only quotes are
    /// doubled. MySQL also treats backslash as an escape character.
    pub fn quote_string(&self, value: &str) -> String {
        match self {
            Dialect::Postgres => format!("'{}'", value.replace('\'', "''")),
            Dialect::Mysql => {
                let mut out = String::with_capacity(value.len() + 2);
                out.push('\'');
                for ch in value.chars() {
                    match ch {
                        '\'' => out.push_str("''"),
                        '\\' => out.push_str("\\\\"),
                        '\0' => out.push_str("\\0"),
                        '\n' => out.push_str("\\n"),
                        '\r' => out.push_str("\\r"),
                        '\u{1a}' => out.push_str("\\Z"),
                        _ => out.push(ch),
                    }
                }
                out.push('\'');
                out
            }
        }
    }

    /// Render a literal value
    pub fn literal(&self, literal: &Literal) -> String {
        match literal {
            Literal::Null => "NULL".to_string(),
            Literal::Bool(true) => "TRUE".to_string(),
            Literal::Bool(false) => "FALSE".to_string(),
            Literal::Int(i) => i.to_string(),
            Literal::Float(f) => {
                let rendered = f.to_string();
                if rendered.contains(['.', 'e', 'E']) {
                    rendered
                } else {
                    format!("{}.0", rendered)
                }
            }
            Literal::String(s) | Literal::Json(s) => self.quote_string(s),
            Literal::Uuid(id) => self.quote_string(&id.to_string()),
            Literal::Timestamp(ts) => match self {
                Dialect::Postgres => {
                    self.quote_string(&ts.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string())
                }
                Dialect::Mysql => self.quote_string(&ts.format("%Y-%m-%d %H:%M:%S%.6f").to_string()),
            },
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::Postgres => write!(f, "postgres"),
            Dialect::Mysql => write!(f, "mysql"),
        }
    }
}

impl FromStr for Dialect {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            "mysql" => Ok(Dialect::Mysql),
            other => Err(ConfigError::InvalidValue {
                field: "backend".to_string(),
                value: other.to_string(),
                message: "expected 'postgres' or 'mysql'".to_string(),
            }),
        }
    }
}
