//! Error types for leanorm operations.

use std::fmt;

/// The primary error type for all leanorm operations.
#[derive(Debug)]
pub enum Error {
    /// Connection-related errors (open, configuration of the handle)
    Connection(ConnectionError),
    /// Query execution errors raised by an executor
    Query(QueryError),
    /// Type conversion errors
    Type(TypeError),
    /// Transaction errors
    Transaction(TransactionError),
    /// Configuration errors (registry, driver settings)
    Config(ConfigError),
    /// Malformed caller input: condition arrays, fetch params, values
    Structure(StructureError),
    /// Operation not supported by the receiver
    Capability(CapabilityError),
    /// Unknown property, relation, collection key, model or table
    NotFound(NotFoundError),
    /// Custom error with message
    Custom(String),
}

#[derive(Debug)]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// Failed to open the database
    Connect,
    /// No connection is registered under the requested name
    UnknownName,
}

#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub sql: Option<String>,
    pub message: String,
    pub detail: Option<String>,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Syntax error in SQL
    Syntax,
    /// Constraint violation (unique, foreign key, not null)
    Constraint,
    /// Table or column not found
    NotFound,
    /// Permission denied or read-only database
    Permission,
    /// Database busy or locked
    Busy,
    /// Other database error
    Database,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
}

#[derive(Debug)]
pub struct TransactionError {
    pub kind: TransactionErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionErrorKind {
    /// `begin` while a transaction is already open
    AlreadyActive,
    /// `commit`/`rollback` with no open transaction
    NotActive,
    /// The driver cannot nest transactions
    NestedNotSupported,
}

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

/// Malformed input supplied by the caller.
///
/// `fragment` carries the offending piece of input (a rendered condition
/// entry, a fetch-param key, a column name) so the message can point at it.
#[derive(Debug, Clone)]
pub struct StructureError {
    pub kind: StructureErrorKind,
    pub message: String,
    pub fragment: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructureErrorKind {
    /// A where/having condition list violates its shape rules
    BadConditionArray,
    /// A fetch parameter has the wrong shape
    BadFetchParams,
    /// A value cannot be written to a column
    UnsupportedValue,
    /// Column selection incompatible with the requested fetch
    BadColumnSelection,
}

#[derive(Debug, Clone)]
pub struct CapabilityError {
    pub kind: CapabilityErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityErrorKind {
    /// Mutation attempted on a read-only record
    UnsupportedOperation,
    /// Bulk insert of a record that belongs to another table
    TableMismatch,
}

#[derive(Debug, Clone)]
pub struct NotFoundError {
    pub kind: NotFoundKind,
    pub name: String,
    pub owner: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotFoundKind {
    Property,
    CollectionKey,
    Table,
}

impl Error {
    /// Build a condition-array error naming the offending fragment.
    pub fn bad_condition(message: impl Into<String>, fragment: impl Into<String>) -> Self {
        Error::Structure(StructureError {
            kind: StructureErrorKind::BadConditionArray,
            message: message.into(),
            fragment: Some(fragment.into()),
        })
    }

    /// Build a fetch-params error naming the offending key.
    pub fn bad_fetch_params(message: impl Into<String>, key: impl Into<String>) -> Self {
        Error::Structure(StructureError {
            kind: StructureErrorKind::BadFetchParams,
            message: message.into(),
            fragment: Some(key.into()),
        })
    }

    pub fn unsupported_value(column: impl Into<String>, type_name: &str) -> Self {
        let column = column.into();
        Error::Structure(StructureError {
            kind: StructureErrorKind::UnsupportedValue,
            message: format!("value of type {type_name} cannot be written to column '{column}'"),
            fragment: Some(column),
        })
    }

    /// The selected columns do not fit the fetch shape (e.g. a pairs fetch
    /// needs exactly two).
    pub fn bad_column_selection(message: impl Into<String>, cols: &[String]) -> Self {
        Error::Structure(StructureError {
            kind: StructureErrorKind::BadColumnSelection,
            message: message.into(),
            fragment: Some(cols.join(", ")),
        })
    }

    pub fn unsupported_operation(message: impl Into<String>) -> Self {
        Error::Capability(CapabilityError {
            kind: CapabilityErrorKind::UnsupportedOperation,
            message: message.into(),
        })
    }

    pub fn not_found(kind: NotFoundKind, name: impl Into<String>) -> Self {
        Error::NotFound(NotFoundError {
            kind,
            name: name.into(),
            owner: None,
        })
    }

    /// A not-found error naming what `name` was looked up on.
    pub fn not_found_on(
        kind: NotFoundKind,
        name: impl Into<String>,
        owner: impl Into<String>,
    ) -> Self {
        Error::NotFound(NotFoundError {
            kind,
            name: name.into(),
            owner: Some(owner.into()),
        })
    }

    /// Is this caller input that failed validation?
    pub fn is_structural(&self) -> bool {
        matches!(self, Error::Structure(_))
    }

    pub fn is_capability(&self) -> bool {
        matches!(self, Error::Capability(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Did this error come out of the database layer?
    pub fn is_persistence(&self) -> bool {
        matches!(
            self,
            Error::Query(_) | Error::Connection(_) | Error::Transaction(_)
        )
    }

    /// Get the SQL that caused this error, if available
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sql.as_deref(),
            _ => None,
        }
    }

    /// The offending input fragment of a structural error.
    pub fn fragment(&self) -> Option<&str> {
        match self {
            Error::Structure(s) => s.fragment.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Connection(e) => write!(f, "Connection error: {}", e.message),
            Error::Query(e) => write!(f, "Query error: {}", e.message),
            Error::Type(e) => write!(f, "Type error: {}", e),
            Error::Transaction(e) => write!(f, "Transaction error: {}", e.message),
            Error::Config(e) => write!(f, "Configuration error: {}", e.message),
            Error::Structure(e) => write!(f, "Invalid input: {}", e),
            Error::Capability(e) => write!(f, "Unsupported operation: {}", e.message),
            Error::NotFound(e) => write!(f, "{}", e),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Connection(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Query(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Config(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sql {
            Some(sql) => write!(f, "{} (in `{}`)", self.message, sql),
            None => write!(f, "{}", self.message),
        }
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = &self.column {
            write!(
                f,
                "expected {} for column '{}', found {}",
                self.expected, col, self.actual
            )
        } else {
            write!(f, "expected {}, found {}", self.expected, self.actual)
        }
    }
}

impl fmt::Display for TransactionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for StructureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.fragment {
            Some(fragment) => write!(f, "{}: {}", self.message, fragment),
            None => write!(f, "{}", self.message),
        }
    }
}

impl fmt::Display for CapabilityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for NotFoundError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self.kind {
            NotFoundKind::Property => "property",
            NotFoundKind::CollectionKey => "collection key",
            NotFoundKind::Table => "table",
        };
        match &self.owner {
            Some(owner) => write!(f, "Unknown {} '{}' on '{}'", what, self.name, owner),
            None => write!(f, "Unknown {} '{}'", what, self.name),
        }
    }
}

impl From<ConnectionError> for Error {
    fn from(err: ConnectionError) -> Self {
        Error::Connection(err)
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Error::Query(err)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

impl From<TransactionError> for Error {
    fn from(err: TransactionError) -> Self {
        Error::Transaction(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

impl From<StructureError> for Error {
    fn from(err: StructureError) -> Self {
        Error::Structure(err)
    }
}

impl From<CapabilityError> for Error {
    fn from(err: CapabilityError) -> Self {
        Error::Capability(err)
    }
}

impl From<NotFoundError> for Error {
    fn from(err: NotFoundError) -> Self {
        Error::NotFound(err)
    }
}

/// Result type alias for leanorm operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structural_errors_carry_fragment() {
        let err = Error::bad_condition("missing operator", r#"{"col":"id"}"#);
        assert!(err.is_structural());
        assert_eq!(err.fragment(), Some(r#"{"col":"id"}"#));
        assert!(err.to_string().contains("missing operator"));
        assert!(err.to_string().contains(r#"{"col":"id"}"#));
    }

    #[test]
    fn category_flags() {
        let query = Error::Query(QueryError {
            kind: QueryErrorKind::Syntax,
            sql: Some("SELEC 1".to_string()),
            message: "near \"SELEC\": syntax error".to_string(),
            detail: None,
            source: None,
        });
        assert!(query.is_persistence());
        assert_eq!(query.sql(), Some("SELEC 1"));
        assert!(!query.is_structural());

        let cap = Error::unsupported_operation("read-only record");
        assert!(cap.is_capability());

        let missing = Error::not_found(NotFoundKind::Table, "authors");
        assert!(missing.is_not_found());
        assert_eq!(missing.to_string(), "Unknown table 'authors'");
    }

    #[test]
    fn not_found_with_owner() {
        let err = Error::not_found_on(NotFoundKind::Property, "nickname", "users");
        assert_eq!(err.to_string(), "Unknown property 'nickname' on 'users'");
    }
}
