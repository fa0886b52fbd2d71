//! Dynamic SQL values.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, TypeError};

/// A dynamically-typed SQL value.
///
/// Row data, bind parameters and condition operands all use this type.
/// Drivers map their native column types onto it when reading results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// NULL value
    Null,

    /// Boolean value
    Bool(bool),

    /// 32-bit signed integer
    Int(i32),

    /// 64-bit signed integer
    BigInt(i64),

    /// 64-bit floating point
    Double(f64),

    /// Arbitrary precision decimal (stored as string)
    Decimal(String),

    /// Text string
    Text(String),

    /// Binary data
    Bytes(Vec<u8>),

    /// JSON document
    Json(serde_json::Value),

    /// List of values, only meaningful as an `in`/`not-in` operand
    Array(Vec<Value>),

    /// SQL DEFAULT keyword
    Default,
}

/// The numeric reading of a value, see [`Value::numeric`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Numeric {
    Int(i64),
    Float(f64),
}

impl Numeric {
    pub fn as_f64(self) -> f64 {
        match self {
            Numeric::Int(v) => v as f64,
            Numeric::Float(v) => v,
        }
    }

    /// Integral values render without a fractional part so `1`, `1.0` and
    /// `"1"` all normalize to `"1"`.
    fn normalized(self) -> String {
        match self {
            Numeric::Int(v) => v.to_string(),
            #[allow(clippy::cast_possible_truncation)]
            Numeric::Float(v) if v.fract() == 0.0 && v.abs() < 9.0e15 => (v as i64).to_string(),
            Numeric::Float(v) => v.to_string(),
        }
    }
}

fn numeric_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^\s*[+-]?(\d+(\.\d*)?|\.\d+)([eE][+-]?\d+)?\s*$").ok())
        .as_ref()
}

/// Parse a string the way a lenient database layer reads numeric text:
/// optional surrounding whitespace, an optional sign, digits with an optional
/// fraction and exponent. `"inf"`, `"NaN"`, hex and empty strings are not numeric.
pub fn parse_numeric(text: &str) -> Option<Numeric> {
    if !numeric_pattern()?.is_match(text) {
        return None;
    }
    let trimmed = text.trim();
    if let Ok(v) = trimmed.parse::<i64>() {
        return Some(Numeric::Int(v));
    }
    trimmed.parse::<f64>().ok().map(Numeric::Float)
}

impl Value {
    /// Check if this value is NULL.
    pub const fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// NULL or the empty string: "no key" for primary-key purposes.
    pub fn is_blank(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Get the type name of this value.
    pub const fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Bool(_) => "BOOLEAN",
            Value::Int(_) => "INTEGER",
            Value::BigInt(_) => "BIGINT",
            Value::Double(_) => "DOUBLE",
            Value::Decimal(_) => "DECIMAL",
            Value::Text(_) => "TEXT",
            Value::Bytes(_) => "BLOB",
            Value::Json(_) => "JSON",
            Value::Array(_) => "ARRAY",
            Value::Default => "DEFAULT",
        }
    }

    /// Can this value be bound to a single column?
    pub const fn is_scalar(&self) -> bool {
        !matches!(self, Value::Array(_) | Value::Default)
    }

    /// Try to convert this value to a bool.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            Value::Int(v) => Some(*v != 0),
            Value::BigInt(v) => Some(*v != 0),
            _ => None,
        }
    }

    /// Try to convert this value to an i64.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(i64::from(*v)),
            Value::BigInt(v) => Some(*v),
            Value::Bool(v) => Some(if *v { 1 } else { 0 }),
            _ => None,
        }
    }

    /// Try to convert this value to an f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(v) => Some(*v),
            Value::Int(v) => Some(f64::from(*v)),
            Value::BigInt(v) => Some(*v as f64),
            Value::Decimal(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Try to get this value as a string reference.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            Value::Decimal(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric reading of this value.
    ///
    /// Integers and doubles are numeric; text and decimals are numeric when
    /// their content parses as a number. Booleans are not.
    pub fn numeric(&self) -> Option<Numeric> {
        match self {
            Value::Int(v) => Some(Numeric::Int(i64::from(*v))),
            Value::BigInt(v) => Some(Numeric::Int(*v)),
            Value::Double(v) => Some(Numeric::Float(*v)),
            Value::Text(s) | Value::Decimal(s) => parse_numeric(s),
            _ => None,
        }
    }

    /// Equality used for dirty tracking.
    ///
    /// NULL only equals NULL. Two numeric-like values compare by number, so
    /// `Text("1")` equals `BigInt(1)` and `Text("1.50")` equals `Double(1.5)`.
    /// Everything else compares strictly.
    pub fn loosely_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Null, _) | (_, Value::Null) => false,
            _ => match (self.numeric(), other.numeric()) {
                (Some(Numeric::Int(a)), Some(Numeric::Int(b))) => a == b,
                (Some(a), Some(b)) => a.as_f64() == b.as_f64(),
                _ => self == other,
            },
        }
    }

    /// Normalized string used to match key values across rows.
    ///
    /// Returns `None` for values that can never act as a key.
    pub fn key_string(&self) -> Option<String> {
        match self {
            Value::Null | Value::Array(_) | Value::Default => None,
            Value::Bool(v) => Some(if *v { "1" } else { "0" }.to_string()),
            Value::Int(_) | Value::BigInt(_) | Value::Double(_) => {
                self.numeric().map(Numeric::normalized)
            }
            Value::Text(s) | Value::Decimal(s) => Some(
                parse_numeric(s)
                    .map(Numeric::normalized)
                    .unwrap_or_else(|| s.clone()),
            ),
            Value::Bytes(b) => Some(String::from_utf8_lossy(b).into_owned()),
            Value::Json(j) => Some(j.to_string()),
        }
    }

    /// Render this value as an unquoted SQL literal.
    ///
    /// Returns `None` for values that need driver quoting (text, blobs, JSON)
    /// or have no single-literal form.
    pub fn sql_literal(&self) -> Option<String> {
        match self {
            Value::Null => Some("NULL".to_string()),
            Value::Bool(v) => Some(if *v { "1" } else { "0" }.to_string()),
            Value::Int(v) => Some(v.to_string()),
            Value::BigInt(v) => Some(v.to_string()),
            Value::Double(v) if v.is_finite() => Some(v.to_string()),
            Value::Decimal(s) if parse_numeric(s).is_some() => Some(s.trim().to_string()),
            Value::Default => Some("DEFAULT".to_string()),
            _ => None,
        }
    }

    /// Convert a JSON document into a value.
    ///
    /// Scalars map onto native variants, arrays recurse into `Array`,
    /// objects are kept as `Json`.
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::BigInt(i),
                None => n.as_f64().map_or(Value::Null, Value::Double),
            },
            serde_json::Value::String(s) => Value::Text(s.clone()),
            serde_json::Value::Array(items) => {
                Value::Array(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(_) => Value::Json(json.clone()),
        }
    }

    /// Convert this value into a JSON document.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null | Value::Default => serde_json::Value::Null,
            Value::Bool(v) => serde_json::Value::Bool(*v),
            Value::Int(v) => serde_json::Value::from(*v),
            Value::BigInt(v) => serde_json::Value::from(*v),
            Value::Double(v) => serde_json::Number::from_f64(*v)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Value::Decimal(s) | Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Bytes(b) => serde_json::Value::String(String::from_utf8_lossy(b).into_owned()),
            Value::Json(j) => j.clone(),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::BigInt(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Decimal(s) | Value::Text(s) => write!(f, "{}", s),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Value::Json(j) => write!(f, "{}", j),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Default => write!(f, "DEFAULT"),
        }
    }
}

// Conversion implementations
impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::BigInt(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::BigInt(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::Json(v)
    }
}

impl From<Vec<i64>> for Value {
    fn from(v: Vec<i64>) -> Self {
        Value::Array(v.into_iter().map(Value::BigInt).collect())
    }
}

impl From<Vec<String>> for Value {
    fn from(v: Vec<String>) -> Self {
        Value::Array(v.into_iter().map(Value::Text).collect())
    }
}

impl From<Vec<&str>> for Value {
    fn from(v: Vec<&str>) -> Self {
        Value::Array(v.into_iter().map(Value::from).collect())
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

fn type_error(expected: &'static str, actual: &Value) -> Error {
    Error::Type(TypeError {
        expected,
        actual: actual.type_name().to_string(),
        column: None,
    })
}

impl TryFrom<Value> for bool {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        value.as_bool().ok_or_else(|| type_error("bool", &value))
    }
}

impl TryFrom<Value> for i64 {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        value.as_i64().ok_or_else(|| type_error("i64", &value))
    }
}

impl TryFrom<Value> for f64 {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        value.as_f64().ok_or_else(|| type_error("f64", &value))
    }
}

impl TryFrom<Value> for String {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Text(v) | Value::Decimal(v) => Ok(v),
            other => Err(type_error("String", &other)),
        }
    }
}

/// TryFrom for `Option<T>` - returns None for Null, tries to convert otherwise
impl<T> TryFrom<Value> for Option<T>
where
    T: TryFrom<Value, Error = Error>,
{
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Null => Ok(None),
            v => T::try_from(v).map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_strings() {
        assert_eq!(parse_numeric("42"), Some(Numeric::Int(42)));
        assert_eq!(parse_numeric(" -7 "), Some(Numeric::Int(-7)));
        assert_eq!(parse_numeric("1.50"), Some(Numeric::Float(1.5)));
        assert_eq!(parse_numeric(".5"), Some(Numeric::Float(0.5)));
        assert_eq!(parse_numeric("1e3"), Some(Numeric::Float(1000.0)));
        assert_eq!(parse_numeric(""), None);
        assert_eq!(parse_numeric("abc"), None);
        assert_eq!(parse_numeric("inf"), None);
        assert_eq!(parse_numeric("NaN"), None);
        assert_eq!(parse_numeric("0x1A"), None);
        assert_eq!(parse_numeric("1,2"), None);
    }

    #[test]
    fn loose_equality_for_dirty_tracking() {
        assert!(Value::from("1").loosely_equals(&Value::BigInt(1)));
        assert!(Value::from("1.50").loosely_equals(&Value::Double(1.5)));
        assert!(Value::Int(3).loosely_equals(&Value::BigInt(3)));
        assert!(!Value::Null.loosely_equals(&Value::BigInt(0)));
        assert!(!Value::from("").loosely_equals(&Value::Null));
        assert!(!Value::from("a").loosely_equals(&Value::from("b")));
        assert!(Value::from("a").loosely_equals(&Value::from("a")));
        assert!(Value::Null.loosely_equals(&Value::Null));
        assert!(!Value::Bool(true).loosely_equals(&Value::BigInt(1)));
    }

    #[test]
    fn key_strings_normalize_numbers() {
        assert_eq!(Value::Int(1).key_string().as_deref(), Some("1"));
        assert_eq!(Value::BigInt(1).key_string().as_deref(), Some("1"));
        assert_eq!(Value::from("1").key_string().as_deref(), Some("1"));
        assert_eq!(Value::Double(1.0).key_string().as_deref(), Some("1"));
        assert_eq!(Value::from("abc").key_string().as_deref(), Some("abc"));
        assert_eq!(Value::Null.key_string(), None);
    }

    #[test]
    fn sql_literals() {
        assert_eq!(Value::Null.sql_literal().as_deref(), Some("NULL"));
        assert_eq!(Value::BigInt(-4).sql_literal().as_deref(), Some("-4"));
        assert_eq!(Value::Double(2.5).sql_literal().as_deref(), Some("2.5"));
        assert_eq!(Value::Bool(true).sql_literal().as_deref(), Some("1"));
        assert_eq!(Value::from("x").sql_literal(), None);
    }

    #[test]
    fn json_conversion() {
        let json = serde_json::json!([1, "two", null, 2.5, true]);
        let value = Value::from_json(&json);
        assert_eq!(
            value,
            Value::Array(vec![
                Value::BigInt(1),
                Value::from("two"),
                Value::Null,
                Value::Double(2.5),
                Value::Bool(true),
            ])
        );
        assert_eq!(value.to_json(), json);
    }

    #[test]
    fn try_from_conversions() {
        assert_eq!(i64::try_from(Value::Int(5)).unwrap(), 5);
        assert_eq!(String::try_from(Value::from("hi")).unwrap(), "hi");
        assert_eq!(Option::<i64>::try_from(Value::Null).unwrap(), None);
        assert!(matches!(
            i64::try_from(Value::from("x")),
            Err(Error::Type(_))
        ));
    }
}
