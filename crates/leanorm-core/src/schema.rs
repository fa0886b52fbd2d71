//! Table column metadata and the introspection contract.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Parsed SQL type with extracted metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedSqlType {
    /// Base type name (e.g., VARCHAR, INTEGER, DECIMAL)
    pub base_type: String,
    /// Length for character types (e.g., VARCHAR(255) -> 255)
    pub length: Option<u32>,
    /// Precision for numeric types (e.g., DECIMAL(10,2) -> 10)
    pub precision: Option<u32>,
    /// Scale for numeric types (e.g., DECIMAL(10,2) -> 2)
    pub scale: Option<u32>,
    pub unsigned: bool,
}

impl ParsedSqlType {
    /// Parse a SQL type string into structured metadata.
    ///
    /// # Examples
    /// - `VARCHAR(255)` -> base_type: "VARCHAR", length: 255
    /// - `DECIMAL(10,2)` -> base_type: "DECIMAL", precision: 10, scale: 2
    /// - `INT UNSIGNED` -> base_type: "INT", unsigned: true
    pub fn parse(type_str: &str) -> Self {
        let upper = type_str.trim().to_uppercase();
        let (body, unsigned) = match upper.strip_suffix(" UNSIGNED") {
            Some(rest) => (rest.trim_end(), true),
            None => (upper.as_str(), false),
        };

        let Some(open) = body.find('(') else {
            return Self {
                base_type: body.to_string(),
                unsigned,
                ..Self::default()
            };
        };

        let base_type = body[..open].trim().to_string();
        let close = body[open..].find(')').map_or(body.len(), |i| open + i);
        let params = &body[open + 1..close];

        if let Some((precision, scale)) = params.split_once(',') {
            Self {
                base_type,
                length: None,
                precision: precision.trim().parse().ok(),
                scale: scale.trim().parse().ok(),
                unsigned,
            }
        } else {
            Self {
                base_type,
                length: params.trim().parse().ok(),
                precision: None,
                scale: None,
                unsigned,
            }
        }
    }

    /// Check if this is a text/string type.
    pub fn is_text(&self) -> bool {
        matches!(
            self.base_type.as_str(),
            "VARCHAR" | "CHAR" | "TEXT" | "CLOB" | "NVARCHAR" | "NCHAR" | "NTEXT"
        )
    }

    /// Check if this is an integer type.
    pub fn is_integer(&self) -> bool {
        matches!(
            self.base_type.as_str(),
            "INT" | "INTEGER" | "BIGINT" | "SMALLINT" | "TINYINT" | "MEDIUMINT"
        )
    }

    /// Check if this is a numeric type.
    pub fn is_numeric(&self) -> bool {
        self.is_integer()
            || matches!(
                self.base_type.as_str(),
                "DECIMAL" | "NUMERIC" | "FLOAT" | "DOUBLE" | "REAL" | "DOUBLE PRECISION"
            )
    }
}

/// Metadata for one table column, discovered once per table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    /// Declared type as reported by the database
    pub sql_type: String,
    pub parsed_type: ParsedSqlType,
    pub nullable: bool,
    /// Default expression, if any, as the database reports it
    pub default: Option<String>,
    pub autoincrement: bool,
    pub primary_key: bool,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        let sql_type = sql_type.into();
        Self {
            name: name.into(),
            parsed_type: ParsedSqlType::parse(&sql_type),
            sql_type,
            nullable: true,
            default: None,
            autoincrement: false,
            primary_key: false,
        }
    }

    pub fn primary_key(mut self, autoincrement: bool) -> Self {
        self.primary_key = true;
        self.autoincrement = autoincrement;
        self.nullable = false;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn default_value(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }
}

/// Discovers column metadata for a table.
pub trait SchemaIntrospector: Send + Sync {
    /// Columns of `table` in declaration order.
    ///
    /// An unknown table yields an empty list or an error; the caller treats
    /// an empty list as "table not found".
    fn fetch_table_columns(&self, table: &str) -> Result<Vec<ColumnSpec>>;
}

impl<I: SchemaIntrospector + ?Sized> SchemaIntrospector for std::sync::Arc<I> {
    fn fetch_table_columns(&self, table: &str) -> Result<Vec<ColumnSpec>> {
        (**self).fetch_table_columns(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_varchar() {
        let t = ParsedSqlType::parse("varchar(255)");
        assert_eq!(t.base_type, "VARCHAR");
        assert_eq!(t.length, Some(255));
        assert!(t.is_text());
    }

    #[test]
    fn parse_decimal() {
        let t = ParsedSqlType::parse("DECIMAL(10, 2)");
        assert_eq!(t.base_type, "DECIMAL");
        assert_eq!(t.precision, Some(10));
        assert_eq!(t.scale, Some(2));
        assert!(t.is_numeric());
        assert!(!t.is_integer());
    }

    #[test]
    fn parse_unsigned_and_plain() {
        let t = ParsedSqlType::parse("INT UNSIGNED");
        assert_eq!(t.base_type, "INT");
        assert!(t.unsigned);

        let t = ParsedSqlType::parse("INTEGER");
        assert!(t.is_integer());
        assert_eq!(t.length, None);
    }

    #[test]
    fn parse_unbalanced_paren() {
        let t = ParsedSqlType::parse("VARCHAR(12");
        assert_eq!(t.base_type, "VARCHAR");
        assert_eq!(t.length, Some(12));
    }

    #[test]
    fn column_spec_builder() {
        let col = ColumnSpec::new("id", "INTEGER").primary_key(true);
        assert!(col.primary_key);
        assert!(col.autoincrement);
        assert!(!col.nullable);
        assert!(col.parsed_type.is_integer());
    }
}
