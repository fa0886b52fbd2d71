//! JOIN clause types.

/// A JOIN clause with a raw ON expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    pub join_type: JoinType,
    pub table: String,
    pub alias: Option<String>,
    /// ON condition, inserted verbatim
    pub on: String,
}

/// Types of SQL joins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
}

impl JoinType {
    /// Get the SQL keyword for this join type.
    pub const fn as_str(&self) -> &'static str {
        match self {
            JoinType::Inner => "INNER JOIN",
            JoinType::Left => "LEFT JOIN",
        }
    }
}

impl Join {
    /// Create an INNER JOIN.
    pub fn inner(table: impl Into<String>, on: impl Into<String>) -> Self {
        Self {
            join_type: JoinType::Inner,
            table: table.into(),
            alias: None,
            on: on.into(),
        }
    }

    /// Create a LEFT JOIN.
    pub fn left(table: impl Into<String>, on: impl Into<String>) -> Self {
        Self {
            join_type: JoinType::Left,
            table: table.into(),
            alias: None,
            on: on.into(),
        }
    }

    /// Set an alias for the joined table.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Render as ` INNER JOIN table [AS alias] ON ...`.
    pub fn build(&self) -> String {
        let mut sql = format!(" {} {}", self.join_type.as_str(), self.table);
        if let Some(alias) = &self.alias {
            sql.push_str(" AS ");
            sql.push_str(alias);
        }
        sql.push_str(" ON ");
        sql.push_str(&self.on);
        sql
    }
}
