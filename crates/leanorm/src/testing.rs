//! In-memory executor for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};

use leanorm_core::{
    ColumnSpec, Dialect, Error, Executor, Result, Row, SchemaIntrospector, TransactionError,
    TransactionErrorKind, Value,
};

#[derive(Debug)]
struct MockState {
    tables: HashMap<String, Vec<ColumnSpec>>,
    calls: Vec<(String, Vec<Value>)>,
    scripted_rows: VecDeque<Vec<Row>>,
    scripted_counts: VecDeque<u64>,
    last_insert_id: Value,
    in_transaction: bool,
    introspections: usize,
}

/// Records every statement and answers queries from a script.
///
/// `query` pops the next scripted result set (empty when none is queued);
/// `execute` pops the next scripted count (1 when none is queued).
#[derive(Debug)]
pub(crate) struct MockExecutor {
    state: Mutex<MockState>,
}

impl MockExecutor {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                tables: HashMap::new(),
                calls: Vec::new(),
                scripted_rows: VecDeque::new(),
                scripted_counts: VecDeque::new(),
                last_insert_id: Value::Null,
                in_transaction: false,
                introspections: 0,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn with_table(self, table: &str, columns: Vec<ColumnSpec>) -> Self {
        self.lock().tables.insert(table.to_string(), columns);
        self
    }

    pub(crate) fn push_rows(&self, rows: Vec<Row>) {
        self.lock().scripted_rows.push_back(rows);
    }

    pub(crate) fn push_count(&self, count: u64) {
        self.lock().scripted_counts.push_back(count);
    }

    pub(crate) fn set_last_insert_id(&self, id: impl Into<Value>) {
        self.lock().last_insert_id = id.into();
    }

    pub(crate) fn calls(&self) -> Vec<(String, Vec<Value>)> {
        self.lock().calls.clone()
    }

    pub(crate) fn sql(&self) -> Vec<String> {
        self.lock().calls.iter().map(|(sql, _)| sql.clone()).collect()
    }

    pub(crate) fn introspections(&self) -> usize {
        self.lock().introspections
    }
}

/// Build a row from `(column, value)` pairs.
pub(crate) fn row(pairs: &[(&str, Value)]) -> Row {
    Row::new(
        pairs.iter().map(|(name, _)| (*name).to_string()).collect(),
        pairs.iter().map(|(_, value)| value.clone()).collect(),
    )
}

impl Executor for MockExecutor {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        let mut state = self.lock();
        state.calls.push((sql.to_string(), params.to_vec()));
        Ok(state.scripted_rows.pop_front().unwrap_or_default())
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        let mut state = self.lock();
        state.calls.push((sql.to_string(), params.to_vec()));
        Ok(state.scripted_counts.pop_front().unwrap_or(1))
    }

    fn last_insert_id(&self, _sequence: Option<&str>) -> Result<Value> {
        Ok(self.lock().last_insert_id.clone())
    }

    fn begin(&self) -> Result<()> {
        let mut state = self.lock();
        if state.in_transaction {
            return Err(Error::Transaction(TransactionError {
                kind: TransactionErrorKind::AlreadyActive,
                message: "transaction already open".to_string(),
            }));
        }
        state.in_transaction = true;
        state.calls.push(("BEGIN".to_string(), Vec::new()));
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        let mut state = self.lock();
        state.in_transaction = false;
        state.calls.push(("COMMIT".to_string(), Vec::new()));
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        let mut state = self.lock();
        state.in_transaction = false;
        state.calls.push(("ROLLBACK".to_string(), Vec::new()));
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.lock().in_transaction
    }
}

impl SchemaIntrospector for MockExecutor {
    fn fetch_table_columns(&self, table: &str) -> Result<Vec<ColumnSpec>> {
        let mut state = self.lock();
        state.introspections += 1;
        Ok(state.tables.get(table).cloned().unwrap_or_default())
    }
}
