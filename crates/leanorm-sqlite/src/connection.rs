//! SQLite connection implementation.
//!
//! [`SqliteConnection`] wraps one `sqlite3*` handle behind a mutex and
//! implements both [`Executor`] and [`SchemaIntrospector`], so a single
//! `Arc<SqliteConnection>` can back a whole `Database`.

// Casts match C types exactly
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::result_large_err)]
#![allow(clippy::borrow_as_ptr)]

use std::ffi::{CString, c_int};
use std::ptr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use leanorm_core::{
    ColumnInfo, ColumnSpec, ConnectionError, ConnectionErrorKind, Dialect, Error, Executor,
    QueryError, QueryErrorKind, Result, Row, SchemaIntrospector, TransactionError,
    TransactionErrorKind, Value,
};
use serde::Deserialize;

use crate::ffi;
use crate::types;

/// Configuration for opening SQLite connections.
///
/// Deserializes from a config file section; every field is optional and
/// falls back to an in-memory database with no busy timeout.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SqliteConfig {
    /// Path to the database file, or ":memory:" for in-memory database.
    pub path: String,
    /// Open flags (read-only, read-write, create, etc.)
    pub flags: OpenFlags,
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: u32,
}

/// Flags controlling how the database is opened.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
#[allow(clippy::struct_excessive_bools)]
pub struct OpenFlags {
    /// Open for reading only.
    pub read_only: bool,
    /// Open for reading and writing.
    pub read_write: bool,
    /// Create the database if it doesn't exist.
    pub create: bool,
    /// Enable URI filename interpretation.
    pub uri: bool,
    pub no_mutex: bool,
    pub full_mutex: bool,
    pub shared_cache: bool,
    pub private_cache: bool,
}

impl OpenFlags {
    /// Create flags for read-only access.
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Default::default()
        }
    }

    /// Create flags for read-write access (database must exist).
    pub fn read_write() -> Self {
        Self {
            read_write: true,
            ..Default::default()
        }
    }

    /// Create flags for read-write access with creation if needed.
    pub fn create_read_write() -> Self {
        Self {
            read_write: true,
            create: true,
            ..Default::default()
        }
    }

    fn to_sqlite_flags(self) -> c_int {
        let mut flags = 0;
        for (set, flag) in [
            (self.read_only, ffi::SQLITE_OPEN_READONLY),
            (self.read_write, ffi::SQLITE_OPEN_READWRITE),
            (self.create, ffi::SQLITE_OPEN_CREATE),
            (self.uri, ffi::SQLITE_OPEN_URI),
            (self.no_mutex, ffi::SQLITE_OPEN_NOMUTEX),
            (self.full_mutex, ffi::SQLITE_OPEN_FULLMUTEX),
            (self.shared_cache, ffi::SQLITE_OPEN_SHAREDCACHE),
            (self.private_cache, ffi::SQLITE_OPEN_PRIVATECACHE),
        ] {
            if set {
                flags |= flag;
            }
        }

        // Default to read-write if no mode specified
        if flags & (ffi::SQLITE_OPEN_READONLY | ffi::SQLITE_OPEN_READWRITE) == 0 {
            flags |= ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE;
        }
        flags
    }
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: ":memory:".to_string(),
            flags: OpenFlags::create_read_write(),
            busy_timeout_ms: 0,
        }
    }
}

impl SqliteConfig {
    /// Create a config for a file-based database.
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Create a config for an in-memory database.
    pub fn memory() -> Self {
        Self::default()
    }

    pub fn flags(mut self, flags: OpenFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn busy_timeout(mut self, ms: u32) -> Self {
        self.busy_timeout_ms = ms;
        self
    }
}

struct SqliteInner {
    db: *mut ffi::sqlite3,
    in_transaction: bool,
}

/// A connection to a SQLite database.
///
/// All access to the handle is serialized through an internal mutex.
pub struct SqliteConnection {
    inner: Mutex<SqliteInner>,
    path: String,
}

// SqliteConnection is Send + Sync because all access goes through the Mutex
unsafe impl Send for SqliteConnection {}
unsafe impl Sync for SqliteConnection {}

impl std::fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("path", &self.path)
            .field("in_transaction", &self.lock().in_transaction)
            .finish()
    }
}

impl SqliteConnection {
    /// Open a new SQLite connection with the given configuration.
    #[tracing::instrument(level = "debug", skip(config), fields(path = %config.path))]
    pub fn open(config: &SqliteConfig) -> Result<Self> {
        let c_path = CString::new(config.path.as_str()).map_err(|_| {
            connect_error("Invalid path: contains null byte".to_string())
        })?;

        let mut db: *mut ffi::sqlite3 = ptr::null_mut();
        let flags = config.flags.to_sqlite_flags();

        // SAFETY: We pass valid pointers and check the return value
        let rc = unsafe { ffi::sqlite3_open_v2(c_path.as_ptr(), &mut db, flags, ptr::null()) };

        if rc != ffi::SQLITE_OK {
            let msg = if db.is_null() {
                ffi::error_string(rc).to_string()
            } else {
                // SAFETY: db is valid until closed here
                unsafe {
                    let msg = ffi::last_error_message(db);
                    ffi::sqlite3_close(db);
                    msg
                }
            };
            tracing::warn!(error = %msg, "Failed to open SQLite database");
            return Err(connect_error(format!("Failed to open database: {}", msg)));
        }

        if config.busy_timeout_ms > 0 {
            // SAFETY: db is valid
            unsafe {
                ffi::sqlite3_busy_timeout(db, config.busy_timeout_ms as c_int);
            }
        }

        tracing::debug!(version = ffi::version(), "Opened SQLite database");
        Ok(Self {
            inner: Mutex::new(SqliteInner {
                db,
                in_transaction: false,
            }),
            path: config.path.clone(),
        })
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self> {
        Self::open(&SqliteConfig::memory())
    }

    /// Open a file-based database.
    pub fn open_file(path: impl Into<String>) -> Result<Self> {
        Self::open(&SqliteConfig::file(path))
    }

    /// Get the database path.
    pub fn path(&self) -> &str {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, SqliteInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Execute one or more statements without binding (DDL, PRAGMAs, fixtures).
    pub fn execute_raw(&self, sql: &str) -> Result<()> {
        let inner = self.lock();
        exec_batch(inner.db, sql)
    }

    /// Get the rowid of the last inserted row.
    pub fn last_insert_rowid(&self) -> i64 {
        let inner = self.lock();
        // SAFETY: db is valid
        unsafe { ffi::sqlite3_last_insert_rowid(inner.db) }
    }

    /// Get the number of rows changed by the last statement.
    pub fn changes(&self) -> i32 {
        let inner = self.lock();
        // SAFETY: db is valid
        unsafe { ffi::sqlite3_changes(inner.db) }
    }

    fn query_sync(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        let inner = self.lock();
        let stmt = prepare_stmt(inner.db, sql)?;
        bind_all(inner.db, stmt, sql, params)?;

        // SAFETY: stmt is valid
        let col_count = unsafe { ffi::sqlite3_column_count(stmt) };
        let col_names = (0..col_count)
            .map(|i| unsafe { types::column_name(stmt, i) }.unwrap_or_else(|| format!("col{}", i)))
            .collect();
        let columns = Arc::new(ColumnInfo::new(col_names));

        let mut rows = Vec::new();
        loop {
            // SAFETY: stmt is valid
            let rc = unsafe { ffi::sqlite3_step(stmt) };
            match rc {
                ffi::SQLITE_ROW => {
                    let values = (0..col_count)
                        // SAFETY: stmt is valid, we just got SQLITE_ROW
                        .map(|i| unsafe { types::read_column(stmt, i) })
                        .collect();
                    rows.push(Row::with_columns(Arc::clone(&columns), values));
                }
                ffi::SQLITE_DONE => break,
                _ => {
                    let err = step_error(inner.db, sql);
                    // SAFETY: stmt is valid
                    unsafe { ffi::sqlite3_finalize(stmt) };
                    return Err(err);
                }
            }
        }

        // SAFETY: stmt is valid
        unsafe { ffi::sqlite3_finalize(stmt) };
        tracing::debug!(sql = %sql, rows = rows.len(), "Query returned");
        Ok(rows)
    }

    fn execute_sync(&self, sql: &str, params: &[Value]) -> Result<u64> {
        let inner = self.lock();
        let stmt = prepare_stmt(inner.db, sql)?;
        bind_all(inner.db, stmt, sql, params)?;

        // SAFETY: stmt is valid
        let rc = unsafe { ffi::sqlite3_step(stmt) };
        let result = match rc {
            ffi::SQLITE_DONE | ffi::SQLITE_ROW => {
                // SAFETY: db is valid
                let changes = unsafe { ffi::sqlite3_changes(inner.db) };
                Ok(changes as u64)
            }
            _ => Err(step_error(inner.db, sql)),
        };

        // SAFETY: stmt is valid
        unsafe { ffi::sqlite3_finalize(stmt) };
        if let Ok(changes) = result {
            tracing::debug!(sql = %sql, rows_affected = changes, "Statement executed");
        }
        result
    }

    fn transition(&self, sql: &str, expect_open: bool) -> Result<()> {
        let mut inner = self.lock();
        if inner.in_transaction != expect_open {
            let (kind, message) = if expect_open {
                (TransactionErrorKind::NotActive, "Not in a transaction")
            } else {
                (TransactionErrorKind::AlreadyActive, "Already in a transaction")
            };
            return Err(Error::Transaction(TransactionError {
                kind,
                message: message.to_string(),
            }));
        }

        let result = exec_batch(inner.db, sql);
        // A failed COMMIT can leave the transaction open; SQLite knows.
        // SAFETY: db is valid while the lock is held
        inner.in_transaction = unsafe { ffi::sqlite3_get_autocommit(inner.db) } == 0;
        result?;
        tracing::debug!(statement = sql, "Transaction state changed");
        Ok(())
    }
}

impl Drop for SqliteConnection {
    fn drop(&mut self) {
        let inner = self.lock();
        if !inner.db.is_null() {
            // SAFETY: db is valid and no statements outlive a call
            unsafe {
                ffi::sqlite3_close_v2(inner.db);
            }
        }
    }
}

impl Executor for SqliteConnection {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.query_sync(sql, params)
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        self.execute_sync(sql, params)
    }

    /// SQLite has no sequences; the rowid of the last insert is the key.
    fn last_insert_id(&self, _sequence: Option<&str>) -> Result<Value> {
        Ok(Value::BigInt(self.last_insert_rowid()))
    }

    fn begin(&self) -> Result<()> {
        self.transition("BEGIN", false)
    }

    fn commit(&self) -> Result<()> {
        self.transition("COMMIT", true)
    }

    fn rollback(&self) -> Result<()> {
        self.transition("ROLLBACK", true)
    }

    fn in_transaction(&self) -> bool {
        self.lock().in_transaction
    }
}

impl SchemaIntrospector for SqliteConnection {
    /// Read columns through `PRAGMA table_info`.
    ///
    /// A single `INTEGER` primary key aliases the rowid and is reported as
    /// auto-incrementing. An unknown table yields an empty list.
    #[tracing::instrument(level = "debug", skip(self))]
    fn fetch_table_columns(&self, table: &str) -> Result<Vec<ColumnSpec>> {
        let sql = format!(
            "PRAGMA table_info({})",
            Dialect::Sqlite.quote_identifier(table)
        );
        let rows = self.query_sync(&sql, &[])?;

        let pk_count = rows
            .iter()
            .filter(|row| row.get_named::<i64>("pk").is_ok_and(|pk| pk > 0))
            .count();

        rows.iter()
            .map(|row| {
                let name: String = row.get_named("name")?;
                let sql_type: String = row.get_named::<Option<String>>("type")?.unwrap_or_default();
                let not_null = row.get_named::<i64>("notnull")? != 0;
                let pk = row.get_named::<i64>("pk")? > 0;
                let default = row
                    .get_by_name("dflt_value")
                    .filter(|v| !v.is_null())
                    .map(ToString::to_string);

                let mut spec = ColumnSpec::new(name, sql_type);
                if pk {
                    let rowid_alias =
                        pk_count == 1 && spec.sql_type.eq_ignore_ascii_case("INTEGER");
                    spec = spec.primary_key(rowid_alias);
                }
                if not_null {
                    spec = spec.not_null();
                }
                if let Some(default) = default {
                    spec = spec.default_value(default);
                }
                Ok(spec)
            })
            .collect()
    }
}

// Helper functions

fn connect_error(message: String) -> Error {
    Error::Connection(ConnectionError {
        kind: ConnectionErrorKind::Connect,
        message,
        source: None,
    })
}

fn null_byte_error(sql: &str) -> Error {
    Error::Query(QueryError {
        kind: QueryErrorKind::Syntax,
        sql: Some(sql.to_string()),
        message: "SQL contains null byte".to_string(),
        detail: None,
        source: None,
    })
}

fn exec_batch(db: *mut ffi::sqlite3, sql: &str) -> Result<()> {
    let c_sql = CString::new(sql).map_err(|_| null_byte_error(sql))?;
    let mut errmsg: *mut std::ffi::c_char = ptr::null_mut();

    // SAFETY: All pointers are valid
    let rc = unsafe { ffi::sqlite3_exec(db, c_sql.as_ptr(), None, ptr::null_mut(), &mut errmsg) };
    if rc == ffi::SQLITE_OK {
        return Ok(());
    }

    let message = if errmsg.is_null() {
        ffi::error_string(rc).to_string()
    } else {
        // SAFETY: errmsg was allocated by sqlite3_exec and is freed exactly once
        unsafe {
            let msg = std::ffi::CStr::from_ptr(errmsg)
                .to_string_lossy()
                .into_owned();
            ffi::sqlite3_free(errmsg.cast());
            msg
        }
    };
    Err(Error::Query(QueryError {
        kind: error_code_to_kind(rc, &message),
        sql: Some(sql.to_string()),
        message,
        detail: None,
        source: None,
    }))
}

fn prepare_stmt(db: *mut ffi::sqlite3, sql: &str) -> Result<*mut ffi::sqlite3_stmt> {
    let c_sql = CString::new(sql).map_err(|_| null_byte_error(sql))?;
    let mut stmt: *mut ffi::sqlite3_stmt = ptr::null_mut();

    // SAFETY: All pointers are valid
    let rc = unsafe {
        ffi::sqlite3_prepare_v2(
            db,
            c_sql.as_ptr(),
            c_sql.as_bytes().len() as c_int,
            &mut stmt,
            ptr::null_mut(),
        )
    };

    if rc != ffi::SQLITE_OK {
        return Err(step_error(db, sql));
    }
    Ok(stmt)
}

fn bind_all(
    db: *mut ffi::sqlite3,
    stmt: *mut ffi::sqlite3_stmt,
    sql: &str,
    params: &[Value],
) -> Result<()> {
    for (i, param) in params.iter().enumerate() {
        // SAFETY: stmt is valid, index is 1-based
        let rc = unsafe { types::bind_value(stmt, (i + 1) as c_int, param) };
        if rc != ffi::SQLITE_OK {
            // SAFETY: db is valid
            let msg = if rc == ffi::SQLITE_MISMATCH {
                format!("{} has no bindable form", param.type_name())
            } else {
                unsafe { ffi::last_error_message(db) }
            };
            // SAFETY: stmt is valid
            unsafe { ffi::sqlite3_finalize(stmt) };
            return Err(Error::Query(QueryError {
                kind: QueryErrorKind::Database,
                sql: Some(sql.to_string()),
                message: format!("Failed to bind parameter {}: {}", i + 1, msg),
                detail: None,
                source: None,
            }));
        }
    }
    Ok(())
}

fn step_error(db: *mut ffi::sqlite3, sql: &str) -> Error {
    // SAFETY: db is valid
    let (message, code) = unsafe { (ffi::last_error_message(db), ffi::sqlite3_errcode(db)) };
    tracing::debug!(sql = %sql, code, error = %message, "SQLite error");

    Error::Query(QueryError {
        kind: error_code_to_kind(code, &message),
        sql: Some(sql.to_string()),
        message,
        detail: None,
        source: None,
    })
}

fn error_code_to_kind(code: c_int, message: &str) -> QueryErrorKind {
    // Extended codes carry the primary code in the low byte
    match code & 0xff {
        ffi::SQLITE_CONSTRAINT => QueryErrorKind::Constraint,
        ffi::SQLITE_BUSY | ffi::SQLITE_LOCKED => QueryErrorKind::Busy,
        ffi::SQLITE_PERM | ffi::SQLITE_AUTH | ffi::SQLITE_READONLY => QueryErrorKind::Permission,
        ffi::SQLITE_NOTFOUND => QueryErrorKind::NotFound,
        ffi::SQLITE_ERROR if message.contains("syntax error") => QueryErrorKind::Syntax,
        ffi::SQLITE_ERROR if message.starts_with("no such") => QueryErrorKind::NotFound,
        _ => QueryErrorKind::Database,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people() -> SqliteConnection {
        let conn = SqliteConnection::open_memory().unwrap();
        conn.execute_raw(
            "CREATE TABLE people (id INTEGER PRIMARY KEY, name TEXT NOT NULL, age INTEGER DEFAULT 0)",
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_open_memory() {
        let conn = SqliteConnection::open_memory().unwrap();
        assert_eq!(conn.path(), ":memory:");
        assert_eq!(conn.dialect(), Dialect::Sqlite);
    }

    #[test]
    fn test_execute_raw() {
        let conn = people();
        conn.execute_raw("INSERT INTO people (name) VALUES ('Alice')")
            .unwrap();
        assert_eq!(conn.changes(), 1);
        assert_eq!(conn.last_insert_rowid(), 1);
    }

    #[test]
    fn test_query_with_placeholders() {
        let conn = people();
        conn.execute(
            "INSERT INTO people (name, age) VALUES (?1, ?2), (?3, ?4)",
            &[
                Value::from("Alice"),
                Value::Int(30),
                Value::from("Bob"),
                Value::BigInt(41),
            ],
        )
        .unwrap();

        let rows = conn
            .query("SELECT * FROM people WHERE age > ?1 ORDER BY id", &[Value::Int(35)])
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_named::<String>("name").unwrap(), "Bob");
        assert_eq!(rows[0].get_named::<i64>("age").unwrap(), 41);
    }

    #[test]
    fn test_null_handling() {
        let conn = SqliteConnection::open_memory().unwrap();
        conn.execute_raw("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)")
            .unwrap();
        conn.execute("INSERT INTO t (name) VALUES (?1)", &[Value::Null])
            .unwrap();

        let row = conn.query_one("SELECT * FROM t", &[]).unwrap().unwrap();
        assert_eq!(row.get_named::<Option<String>>("name").unwrap(), None);
    }

    #[test]
    #[allow(clippy::approx_constant)]
    fn test_type_conversions() {
        let conn = SqliteConnection::open_memory().unwrap();
        conn.execute_raw("CREATE TABLE types (b BOOLEAN, i INTEGER, f REAL, t TEXT, bl BLOB, j TEXT)")
            .unwrap();
        conn.execute(
            "INSERT INTO types VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            &[
                Value::Bool(true),
                Value::BigInt(5_000_000_000),
                Value::Double(3.14),
                Value::from("hello"),
                Value::Bytes(vec![1, 2, 3]),
                Value::Json(serde_json::json!({"k": [1, 2]})),
            ],
        )
        .unwrap();

        let row = conn.query_one("SELECT * FROM types", &[]).unwrap().unwrap();
        assert_eq!(row.get_by_name("b"), Some(&Value::Int(1)));
        assert_eq!(row.get_by_name("i"), Some(&Value::BigInt(5_000_000_000)));
        assert!((row.get_named::<f64>("f").unwrap() - 3.14).abs() < 0.001);
        assert_eq!(row.get_named::<String>("t").unwrap(), "hello");
        assert_eq!(row.get_by_name("bl"), Some(&Value::Bytes(vec![1, 2, 3])));
        assert_eq!(row.get_named::<String>("j").unwrap(), r#"{"k":[1,2]}"#);
    }

    #[test]
    fn test_default_value_is_not_bindable() {
        let conn = people();
        let err = conn
            .execute("INSERT INTO people (name) VALUES (?1)", &[Value::Default])
            .unwrap_err();
        assert!(err.is_persistence());
        assert!(err.to_string().contains("bind parameter 1"));
    }

    #[test]
    fn test_transaction() {
        let conn = people();

        conn.begin().unwrap();
        assert!(conn.in_transaction());
        conn.execute("INSERT INTO people (name) VALUES (?1)", &[Value::from("Alice")])
            .unwrap();
        conn.rollback().unwrap();
        assert!(!conn.in_transaction());
        assert!(conn.query("SELECT * FROM people", &[]).unwrap().is_empty());

        conn.begin().unwrap();
        conn.execute("INSERT INTO people (name) VALUES (?1)", &[Value::from("Bob")])
            .unwrap();
        conn.commit().unwrap();
        assert_eq!(conn.query("SELECT * FROM people", &[]).unwrap().len(), 1);
    }

    #[test]
    fn test_transaction_state_errors() {
        let conn = people();
        let err = conn.commit().unwrap_err();
        assert!(matches!(
            err,
            Error::Transaction(TransactionError {
                kind: TransactionErrorKind::NotActive,
                ..
            })
        ));

        conn.begin().unwrap();
        let err = conn.begin().unwrap_err();
        assert!(matches!(
            err,
            Error::Transaction(TransactionError {
                kind: TransactionErrorKind::AlreadyActive,
                ..
            })
        ));
        conn.rollback().unwrap();
    }

    #[test]
    fn test_failed_commit_keeps_transaction_open() {
        let conn = SqliteConnection::open_memory().unwrap();
        conn.execute_raw(
            "PRAGMA foreign_keys = ON;
             CREATE TABLE parents (id INTEGER PRIMARY KEY);
             CREATE TABLE children (
                 id INTEGER PRIMARY KEY,
                 parent_id INTEGER REFERENCES parents(id) DEFERRABLE INITIALLY DEFERRED
             );",
        )
        .unwrap();

        conn.begin().unwrap();
        conn.execute("INSERT INTO children (parent_id) VALUES (?1)", &[Value::from(9)])
            .unwrap();
        assert!(conn.commit().is_err());
        assert!(conn.in_transaction());

        conn.rollback().unwrap();
        assert!(!conn.in_transaction());
        assert!(conn.query("SELECT * FROM children", &[]).unwrap().is_empty());
    }

    #[test]
    fn test_last_insert_id() {
        let conn = people();
        conn.execute("INSERT INTO people (name) VALUES (?1)", &[Value::from("Alice")])
            .unwrap();
        conn.execute("INSERT INTO people (name) VALUES (?1)", &[Value::from("Bob")])
            .unwrap();
        assert_eq!(conn.last_insert_id(None).unwrap(), Value::BigInt(2));
    }

    #[test]
    fn test_error_kinds() {
        let conn = people();
        let err = conn.query("SELEC 1", &[]).unwrap_err();
        assert!(matches!(
            err,
            Error::Query(QueryError {
                kind: QueryErrorKind::Syntax,
                ..
            })
        ));
        assert_eq!(err.sql(), Some("SELEC 1"));

        let err = conn.query("SELECT * FROM missing", &[]).unwrap_err();
        assert!(matches!(
            err,
            Error::Query(QueryError {
                kind: QueryErrorKind::NotFound,
                ..
            })
        ));

        let err = conn
            .execute("INSERT INTO people (name) VALUES (?1)", &[Value::Null])
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Query(QueryError {
                kind: QueryErrorKind::Constraint,
                ..
            })
        ));
    }

    #[test]
    fn test_table_columns() {
        let conn = people();
        let cols = conn.fetch_table_columns("people").unwrap();
        let names: Vec<_> = cols.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["id", "name", "age"]);

        assert!(cols[0].primary_key);
        assert!(cols[0].autoincrement);
        assert!(!cols[1].nullable);
        assert!(!cols[1].primary_key);
        assert_eq!(cols[2].default.as_deref(), Some("0"));
        assert!(cols[2].parsed_type.is_integer());
    }

    #[test]
    fn test_composite_key_is_not_autoincrement() {
        let conn = SqliteConnection::open_memory().unwrap();
        conn.execute_raw(
            "CREATE TABLE post_tags (post_id INTEGER, tag_id INTEGER, PRIMARY KEY (post_id, tag_id))",
        )
        .unwrap();
        let cols = conn.fetch_table_columns("post_tags").unwrap();
        assert!(cols.iter().all(|c| c.primary_key && !c.autoincrement));
    }

    #[test]
    fn test_unknown_table_has_no_columns() {
        let conn = SqliteConnection::open_memory().unwrap();
        assert!(conn.fetch_table_columns("nope").unwrap().is_empty());
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: SqliteConfig =
            serde_json::from_value(serde_json::json!({"busy_timeout_ms": 250})).unwrap();
        assert_eq!(config.path, ":memory:");
        assert_eq!(config.busy_timeout_ms, 250);

        let config: SqliteConfig = serde_json::from_value(serde_json::json!({
            "path": "app.db",
            "flags": {"read_only": true}
        }))
        .unwrap();
        assert_eq!(config.path, "app.db");
        assert!(config.flags.read_only);
        assert!(!config.flags.create);
    }

    #[test]
    fn test_open_flags() {
        let tmp = std::env::temp_dir().join(format!("leanorm_flags_{}.db", std::process::id()));
        let _ = std::fs::remove_file(&tmp);

        let config = SqliteConfig::file(tmp.to_string_lossy().to_string())
            .flags(OpenFlags::create_read_write());
        let conn = SqliteConnection::open(&config).unwrap();
        conn.execute_raw("CREATE TABLE test (id INTEGER)").unwrap();
        drop(conn);

        let config =
            SqliteConfig::file(tmp.to_string_lossy().to_string()).flags(OpenFlags::read_only());
        let conn = SqliteConnection::open(&config).unwrap();
        assert!(conn.query("SELECT * FROM test", &[]).unwrap().is_empty());
        let err = conn.execute_raw("INSERT INTO test VALUES (1)").unwrap_err();
        assert!(matches!(
            err,
            Error::Query(QueryError {
                kind: QueryErrorKind::Permission,
                ..
            })
        ));

        drop(conn);
        let _ = std::fs::remove_file(&tmp);
    }
}
