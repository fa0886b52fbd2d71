//! SQL dialect differences that leak into generated SQL.
//!
//! Only placeholder style and quoting vary; everything else leanorm emits
//! is plain ANSI.

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// SQL dialect for generating dialect-specific SQL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// PostgreSQL dialect (uses $1, $2 placeholders)
    Postgres,
    /// SQLite dialect (uses ?1, ?2 placeholders)
    #[default]
    Sqlite,
    /// MySQL dialect (uses ? placeholders)
    Mysql,
}

impl Dialect {
    /// Generate a placeholder for the given parameter index (1-based).
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${index}"),
            Dialect::Sqlite => format!("?{index}"),
            Dialect::Mysql => "?".to_string(),
        }
    }

    /// Quote an identifier for this dialect, doubling embedded quote characters.
    pub fn quote_identifier(self, name: &str) -> String {
        match self {
            Dialect::Postgres | Dialect::Sqlite => {
                let escaped = name.replace('"', "\"\"");
                format!("\"{}\"", escaped)
            }
            Dialect::Mysql => {
                let escaped = name.replace('`', "``");
                format!("`{}`", escaped)
            }
        }
    }

    /// Quote a string as a SQL string literal.
    pub fn quote_str(self, text: &str) -> String {
        let escaped = match self {
            Dialect::Mysql => text.replace('\\', "\\\\").replace('\'', "''"),
            Dialect::Postgres | Dialect::Sqlite => text.replace('\'', "''"),
        };
        format!("'{}'", escaped)
    }

    /// Render any value as an inline SQL literal.
    pub fn quote_literal(self, value: &Value) -> String {
        if let Some(literal) = value.sql_literal() {
            return literal;
        }
        match value {
            Value::Text(s) | Value::Decimal(s) => self.quote_str(s),
            Value::Bytes(b) => {
                let hex: String = b.iter().map(|byte| format!("{byte:02X}")).collect();
                match self {
                    Dialect::Postgres => format!("'\\x{}'", hex),
                    Dialect::Sqlite | Dialect::Mysql => format!("X'{}'", hex),
                }
            }
            Value::Json(j) => self.quote_str(&j.to_string()),
            Value::Array(items) => items
                .iter()
                .map(|item| self.quote_literal(item))
                .collect::<Vec<_>>()
                .join(", "),
            // sql_literal covers the remaining variants; non-finite doubles land here
            _ => "NULL".to_string(),
        }
    }
}
