//! The SQL execution contract.
//!
//! Everything above this trait speaks in SQL text plus positional bind
//! values. Drivers implement [`Executor`]; the ORM never talks to a database
//! any other way.

use crate::dialect::Dialect;
use crate::error::Result;
use crate::row::Row;
use crate::value::Value;

/// A database handle capable of executing parameterized SQL.
///
/// Calls are synchronous and blocking. Implementations must be
/// `Send + Sync` so a handle can sit behind an `Arc` shared by every model
/// and record bound to it; they serialize access internally.
///
/// # Transactions
///
/// `begin`/`commit`/`rollback` manage a single, non-nested transaction.
/// Calling `begin` while one is open must fail with a transaction error.
pub trait Executor: Send + Sync {
    /// Placeholder and quoting style of the generated SQL.
    fn dialect(&self) -> Dialect;

    /// Execute a statement that returns rows.
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;

    /// Execute a statement and return the first row, if any.
    fn query_one(&self, sql: &str, params: &[Value]) -> Result<Option<Row>> {
        Ok(self.query(sql, params)?.into_iter().next())
    }

    /// Execute a statement that returns no rows; yields the affected row count.
    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64>;

    /// Quote a value for inline use in SQL text.
    fn quote(&self, value: &Value) -> String {
        self.dialect().quote_literal(value)
    }

    /// Key generated by the most recent insert on this handle.
    ///
    /// `sequence` names the sequence to read on databases that need one.
    fn last_insert_id(&self, sequence: Option<&str>) -> Result<Value>;

    fn begin(&self) -> Result<()>;

    fn commit(&self) -> Result<()>;

    fn rollback(&self) -> Result<()>;

    fn in_transaction(&self) -> bool;
}

impl<E: Executor + ?Sized> Executor for std::sync::Arc<E> {
    fn dialect(&self) -> Dialect {
        (**self).dialect()
    }

    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        (**self).query(sql, params)
    }

    fn query_one(&self, sql: &str, params: &[Value]) -> Result<Option<Row>> {
        (**self).query_one(sql, params)
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        (**self).execute(sql, params)
    }

    fn quote(&self, value: &Value) -> String {
        (**self).quote(value)
    }

    fn last_insert_id(&self, sequence: Option<&str>) -> Result<Value> {
        (**self).last_insert_id(sequence)
    }

    fn begin(&self) -> Result<()> {
        (**self).begin()
    }

    fn commit(&self) -> Result<()> {
        (**self).commit()
    }

    fn rollback(&self) -> Result<()> {
        (**self).rollback()
    }

    fn in_transaction(&self) -> bool {
        (**self).in_transaction()
    }
}
