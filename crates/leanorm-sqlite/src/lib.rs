//! SQLite driver for leanorm.
//!
// FFI bindings require unsafe code - this is expected for database drivers
#![allow(unsafe_code)]
//!
//! [`SqliteConnection`] implements [`leanorm_core::Executor`] and
//! [`leanorm_core::SchemaIntrospector`] over a bundled libsqlite3, so one
//! handle is enough to back a `leanorm::Database`.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use leanorm_core::{Executor, Value};
//! use leanorm_sqlite::SqliteConnection;
//!
//! let conn = Arc::new(SqliteConnection::open_memory()?);
//! conn.execute_raw("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)")?;
//! conn.execute("INSERT INTO users (name) VALUES (?1)", &[Value::from("Alice")])?;
//! assert_eq!(conn.last_insert_id(None)?, Value::BigInt(1));
//! ```
//!
//! # Type Mapping
//!
//! | Value | SQLite Type |
//! |-------|-------------|
//! | `Bool` | INTEGER (0/1) |
//! | `Int`, `BigInt` | INTEGER |
//! | `Double` | REAL |
//! | `Text`, `Decimal` | TEXT |
//! | `Bytes` | BLOB |
//! | `Json`, `Array` | TEXT (JSON) |
//! | `Null` | NULL |
//!
//! INTEGER columns read back as `Int` when they fit in 32 bits and `BigInt`
//! otherwise.

pub mod connection;
pub mod ffi;
pub mod types;

pub use connection::{OpenFlags, SqliteConfig, SqliteConnection};

/// Get the SQLite library version.
pub fn sqlite_version() -> &'static str {
    ffi::version()
}
