//! SELECT statements built from [`FetchParams`].

use leanorm_core::{Dialect, Result, Value};

use crate::condition::Quoter;
use crate::join::Join;
use crate::params::{FetchParams, ParamKey};

/// A rendered SELECT with its bind values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectQuery {
    pub sql: String,
    pub params: Vec<Value>,
}

/// Builds one SELECT over a table from a fetch parameter map.
///
/// Clauses are emitted in the usual order:
/// `SELECT [DISTINCT] cols FROM table [joins] [WHERE] [GROUP BY] [HAVING]
/// [ORDER BY] [LIMIT] [OFFSET]`. Keys listed as disallowed are ignored.
#[derive(Debug, Clone)]
pub struct SelectBuilder<'a> {
    table: &'a str,
    params: &'a FetchParams,
    joins: Vec<Join>,
    disallowed: Vec<ParamKey>,
}

impl<'a> SelectBuilder<'a> {
    pub fn new(table: &'a str, params: &'a FetchParams) -> Self {
        Self {
            table,
            params,
            joins: Vec::new(),
            disallowed: Vec::new(),
        }
    }

    /// Add a JOIN clause.
    pub fn join(mut self, join: Join) -> Self {
        self.joins.push(join);
        self
    }

    /// Ignore `keys` even if set.
    pub fn disallow(mut self, keys: &[ParamKey]) -> Self {
        self.disallowed.extend_from_slice(keys);
        self
    }

    fn allows(&self, key: ParamKey) -> bool {
        !self.disallowed.contains(&key) && self.params.is_set(key)
    }

    /// Build the SQL query and parameters.
    #[tracing::instrument(level = "trace", skip(self, quoter), fields(table = self.table))]
    pub fn build<Q: Quoter + ?Sized>(&self, quoter: &Q) -> Result<SelectQuery> {
        let params = self.params;
        let mut sql = String::from("SELECT ");
        let mut binds = Vec::new();

        if self.allows(ParamKey::Distinct) {
            sql.push_str("DISTINCT ");
        }

        if self.allows(ParamKey::Cols) {
            sql.push_str(&params.cols.join(", "));
        } else {
            sql.push_str(self.table);
            sql.push_str(".*");
        }

        sql.push_str(" FROM ");
        sql.push_str(self.table);

        for join in &self.joins {
            sql.push_str(&join.build());
        }

        if self.allows(ParamKey::Where) {
            let compiled = params.where_conditions.compile(quoter, binds.len())?;
            sql.push_str(" WHERE ");
            sql.push_str(&compiled.sql);
            binds.extend(compiled.params);
        }

        if self.allows(ParamKey::Group) {
            sql.push_str(" GROUP BY ");
            sql.push_str(&params.group.join(", "));
        }

        if self.allows(ParamKey::Having) {
            let compiled = params.having.compile(quoter, binds.len())?;
            sql.push_str(" HAVING ");
            sql.push_str(&compiled.sql);
            binds.extend(compiled.params);
        }

        if self.allows(ParamKey::Order) {
            sql.push_str(" ORDER BY ");
            sql.push_str(&params.order.join(", "));
        }

        let limit = self
            .allows(ParamKey::LimitSize)
            .then_some(params.limit_size)
            .flatten();
        let offset = self
            .allows(ParamKey::LimitOffset)
            .then_some(params.limit_offset)
            .flatten();

        match (limit, offset) {
            (Some(n), _) => sql.push_str(&format!(" LIMIT {}", n)),
            // OFFSET alone is not valid SQLite/MySQL syntax
            (None, Some(_)) => match quoter.sql_dialect() {
                Dialect::Sqlite => sql.push_str(" LIMIT -1"),
                Dialect::Mysql => sql.push_str(" LIMIT 18446744073709551615"),
                Dialect::Postgres => {}
            },
            (None, None) => {}
        }
        if let Some(n) = offset {
            sql.push_str(&format!(" OFFSET {}", n));
        }

        tracing::trace!(sql = %sql, params = binds.len(), "Built SELECT");
        Ok(SelectQuery { sql, params: binds })
    }
}
