//! Core types and traits for leanorm.
//!
//! This crate provides the pieces every other leanorm crate speaks in:
//!
//! - [`Value`] and [`Row`] for data moving in and out of the database
//! - [`Executor`] and [`SchemaIntrospector`], the contracts a driver implements
//! - [`Dialect`] for placeholder and quoting style
//! - [`Error`] and [`Result`]

pub mod dialect;
pub mod error;
pub mod executor;
pub mod row;
pub mod schema;
pub mod value;

pub use dialect::Dialect;
pub use error::{
    CapabilityError, CapabilityErrorKind, ConfigError, ConnectionError, ConnectionErrorKind,
    Error, NotFoundError, NotFoundKind, QueryError, QueryErrorKind, Result, StructureError,
    StructureErrorKind, TransactionError, TransactionErrorKind, TypeError,
};
pub use executor::Executor;
pub use row::{ColumnInfo, FromValue, Row, RowMap};
pub use schema::{ColumnSpec, ParsedSqlType, SchemaIntrospector};
pub use value::{Numeric, Value, parse_numeric};
