//! Where/having condition trees.
//!
//! A [`Conditions`] list is an ordered sequence of entries. Each entry is a
//! predicate (`col`, `operator`, optional `val`) or a nested list, and is
//! keyed by how it joins the entry before it: an ordinary key means `AND`,
//! `OR` or `OR#<tag>` means `OR`. Tagged keys let one JSON object hold several
//! independent OR entries.
//!
//! ```ignore
//! // WHERE author_id = ?1 AND (status = ?2 OR pinned IS NOT NULL)
//! let conds = Conditions::new()
//!     .and("author_id", Operator::Eq, 7)
//!     .and_group(
//!         Conditions::new()
//!             .and("status", Operator::Eq, "published")
//!             .or_not_null("pinned"),
//!     );
//! let compiled = conds.compile(&Dialect::Sqlite, 0)?;
//! ```
//!
//! Scalar operands are bound as positional parameters. `in`/`not-in` lists
//! are rendered inline: string members are quoted through the [`Quoter`],
//! everything else is emitted as an unquoted literal.

use std::fmt;
use std::sync::OnceLock;

use leanorm_core::{Dialect, Error, Executor, Result, Value};
use regex::Regex;

/// Quotes values for inline use and reports the placeholder style.
///
/// Implemented for [`Dialect`] (pure SQL-standard quoting) and for
/// `dyn Executor`, which defers to the driver.
pub trait Quoter {
    fn sql_dialect(&self) -> Dialect;

    fn quote_value(&self, value: &Value) -> String;
}

impl Quoter for Dialect {
    fn sql_dialect(&self) -> Dialect {
        *self
    }

    fn quote_value(&self, value: &Value) -> String {
        self.quote_literal(value)
    }
}

impl Quoter for dyn Executor + '_ {
    fn sql_dialect(&self) -> Dialect {
        self.dialect()
    }

    fn quote_value(&self, value: &Value) -> String {
        self.quote(value)
    }
}

/// Comparison operators accepted in a predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    NotEq,
    Gt,
    GtEq,
    Lt,
    LtEq,
    In,
    NotIn,
    Like,
    NotLike,
    IsNull,
    NotNull,
}

impl Operator {
    pub const ALL: [Operator; 12] = [
        Operator::Eq,
        Operator::NotEq,
        Operator::Gt,
        Operator::GtEq,
        Operator::Lt,
        Operator::LtEq,
        Operator::In,
        Operator::NotIn,
        Operator::Like,
        Operator::NotLike,
        Operator::IsNull,
        Operator::NotNull,
    ];

    /// Parse the logical operator name used in condition maps.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.as_str() == name)
    }

    /// The logical name, e.g. `not-in`.
    pub const fn as_str(self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::NotEq => "!=",
            Operator::Gt => ">",
            Operator::GtEq => ">=",
            Operator::Lt => "<",
            Operator::LtEq => "<=",
            Operator::In => "in",
            Operator::NotIn => "not-in",
            Operator::Like => "like",
            Operator::NotLike => "not-like",
            Operator::IsNull => "is-null",
            Operator::NotNull => "not-null",
        }
    }

    pub const fn to_sql(self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::NotEq => "<>",
            Operator::Gt => ">",
            Operator::GtEq => ">=",
            Operator::Lt => "<",
            Operator::LtEq => "<=",
            Operator::In => "IN",
            Operator::NotIn => "NOT IN",
            Operator::Like => "LIKE",
            Operator::NotLike => "NOT LIKE",
            Operator::IsNull => "IS NULL",
            Operator::NotNull => "IS NOT NULL",
        }
    }

    /// Null checks ignore any supplied value.
    pub const fn takes_value(self) -> bool {
        !matches!(self, Operator::IsNull | Operator::NotNull)
    }

    pub const fn is_list(self) -> bool {
        matches!(self, Operator::In | Operator::NotIn)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an entry joins the entry before it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionKey {
    /// Any ordinary key (sequential index or name); joins with AND.
    And(String),
    /// The literal `OR` key.
    Or,
    /// `OR#<tag>`.
    OrTagged(String),
}

impl ConditionKey {
    /// Classify a map key.
    pub fn parse(key: &str) -> Self {
        if key == "OR" {
            ConditionKey::Or
        } else if let Some(tag) = key.strip_prefix("OR#") {
            ConditionKey::OrTagged(tag.to_string())
        } else {
            ConditionKey::And(key.to_string())
        }
    }

    pub fn is_or(&self) -> bool {
        !matches!(self, ConditionKey::And(_))
    }

    pub fn label(&self) -> String {
        match self {
            ConditionKey::And(key) => key.clone(),
            ConditionKey::Or => "OR".to_string(),
            ConditionKey::OrTagged(tag) => format!("OR#{tag}"),
        }
    }
}

/// A single `col operator val` test.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub col: String,
    pub operator: Operator,
    pub val: Option<Value>,
}

impl Predicate {
    pub fn new(col: impl Into<String>, operator: Operator, val: impl Into<Value>) -> Self {
        Self {
            col: col.into(),
            operator,
            val: Some(val.into()),
        }
    }

    /// A predicate with no operand (`is-null` / `not-null`).
    pub fn unary(col: impl Into<String>, operator: Operator) -> Self {
        Self {
            col: col.into(),
            operator,
            val: None,
        }
    }

    fn describe(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        map.insert("col".into(), serde_json::Value::String(self.col.clone()));
        map.insert(
            "operator".into(),
            serde_json::Value::String(self.operator.as_str().to_string()),
        );
        if let Some(val) = &self.val {
            map.insert("val".into(), val.to_json());
        }
        serde_json::Value::Object(map)
    }
}

/// One entry of a condition list.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Predicate(Predicate),
    Group(Conditions),
}

impl Condition {
    fn describe(&self) -> serde_json::Value {
        match self {
            Condition::Predicate(p) => p.describe(),
            Condition::Group(g) => g.describe(),
        }
    }
}

/// An ordered where/having condition list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conditions {
    entries: Vec<(ConditionKey, Condition)>,
}

/// Compiled SQL boolean expression plus its bind values, in placeholder order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledCondition {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Conditions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ConditionKey, &Condition)> {
        self.entries.iter().map(|(k, c)| (k, c))
    }

    /// Append an entry under an explicit key.
    pub fn push(mut self, key: ConditionKey, condition: Condition) -> Self {
        self.entries.push((key, condition));
        self
    }

    fn next_index(&self) -> ConditionKey {
        ConditionKey::And(self.entries.len().to_string())
    }

    pub fn and(self, col: impl Into<String>, operator: Operator, val: impl Into<Value>) -> Self {
        let key = self.next_index();
        self.push(key, Condition::Predicate(Predicate::new(col, operator, val)))
    }

    pub fn or(self, col: impl Into<String>, operator: Operator, val: impl Into<Value>) -> Self {
        self.push(
            ConditionKey::Or,
            Condition::Predicate(Predicate::new(col, operator, val)),
        )
    }

    pub fn and_is_null(self, col: impl Into<String>) -> Self {
        let key = self.next_index();
        self.push(
            key,
            Condition::Predicate(Predicate::unary(col, Operator::IsNull)),
        )
    }

    pub fn and_not_null(self, col: impl Into<String>) -> Self {
        let key = self.next_index();
        self.push(
            key,
            Condition::Predicate(Predicate::unary(col, Operator::NotNull)),
        )
    }

    pub fn or_is_null(self, col: impl Into<String>) -> Self {
        self.push(
            ConditionKey::Or,
            Condition::Predicate(Predicate::unary(col, Operator::IsNull)),
        )
    }

    pub fn or_not_null(self, col: impl Into<String>) -> Self {
        self.push(
            ConditionKey::Or,
            Condition::Predicate(Predicate::unary(col, Operator::NotNull)),
        )
    }

    pub fn and_group(self, group: Conditions) -> Self {
        let key = self.next_index();
        self.push(key, Condition::Group(group))
    }

    pub fn or_group(self, group: Conditions) -> Self {
        self.push(ConditionKey::Or, Condition::Group(group))
    }

    /// Equality on every `(column, value)` pair, joined with AND.
    ///
    /// A NULL value matches with `IS NULL`, an array with `IN`.
    pub fn matching<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a Value)>,
    {
        pairs
            .into_iter()
            .fold(Self::new(), |conds, (col, val)| match val {
                Value::Null => conds.and_is_null(col.clone()),
                Value::Array(_) => conds.and(col.clone(), Operator::In, val.clone()),
                _ => conds.and(col.clone(), Operator::Eq, val.clone()),
            })
    }

    /// Parse a condition list from a JSON object or array.
    ///
    /// Object keys keep their document order. `null` yields an empty list.
    pub fn from_json(json: &serde_json::Value) -> Result<Self> {
        match json {
            serde_json::Value::Null => Ok(Self::new()),
            serde_json::Value::Object(_) | serde_json::Value::Array(_) => parse_list(json),
            other => Err(Error::bad_condition(
                "a condition list must be an object or array",
                other.to_string(),
            )),
        }
    }

    fn describe(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for (key, cond) in &self.entries {
            map.insert(key.label(), cond.describe());
        }
        serde_json::Value::Object(map)
    }

    /// Validate and compile into a SQL boolean expression.
    ///
    /// `offset` is the number of bind values that precede this expression in
    /// the enclosing statement; placeholders are numbered after them. An empty
    /// list compiles to an empty string with no params.
    #[tracing::instrument(level = "trace", skip(self, quoter))]
    pub fn compile<Q: Quoter + ?Sized>(
        &self,
        quoter: &Q,
        offset: usize,
    ) -> Result<CompiledCondition> {
        let mut params = Vec::new();
        let sql = self.compile_into(quoter, offset, &mut params)?;
        tracing::trace!(sql = %sql, params = params.len(), "Compiled condition list");
        Ok(CompiledCondition { sql, params })
    }

    fn compile_into<Q: Quoter + ?Sized>(
        &self,
        quoter: &Q,
        offset: usize,
        params: &mut Vec<Value>,
    ) -> Result<String> {
        let mut sql = String::new();

        for (i, (key, condition)) in self.entries.iter().enumerate() {
            if i == 0 && key.is_or() {
                return Err(Error::bad_condition(
                    "the first entry of a condition list cannot be an OR entry",
                    format!("{}: {}", key.label(), condition.describe()),
                ));
            }

            let piece = match condition {
                Condition::Predicate(p) => compile_predicate(p, quoter, offset, params)?,
                Condition::Group(group) => {
                    if group.is_empty() {
                        return Err(Error::bad_condition(
                            "a nested condition list cannot be empty",
                            key.label(),
                        ));
                    }
                    format!("({})", group.compile_into(quoter, offset, params)?)
                }
            };

            if i > 0 {
                sql.push_str(if key.is_or() { " OR " } else { " AND " });
            }
            sql.push_str(&piece);
        }

        Ok(sql)
    }
}

fn compile_predicate<Q: Quoter + ?Sized>(
    predicate: &Predicate,
    quoter: &Q,
    offset: usize,
    params: &mut Vec<Value>,
) -> Result<String> {
    let fragment = || predicate.describe().to_string();

    if predicate.col.trim().is_empty() {
        return Err(Error::bad_condition(
            "a condition must name a column",
            fragment(),
        ));
    }

    let op = predicate.operator;
    if !op.takes_value() {
        return Ok(format!("{} {}", predicate.col, op.to_sql()));
    }

    let Some(val) = &predicate.val else {
        return Err(Error::bad_condition(
            format!("operator '{}' requires a value", op),
            fragment(),
        ));
    };

    if op.is_list() {
        let list = render_in_list(val, quoter, &fragment)?;
        return Ok(format!("{} {} {}", predicate.col, op.to_sql(), list));
    }

    if !val.is_scalar() {
        return Err(Error::bad_condition(
            format!("operator '{}' expects a single value", op),
            fragment(),
        ));
    }

    params.push(val.clone());
    let placeholder = quoter.sql_dialect().placeholder(offset + params.len());
    Ok(format!("{} {} {}", predicate.col, op.to_sql(), placeholder))
}

fn numeric_looking() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[\d\s.,()+-]+$").ok())
        .as_ref()
}

fn numeric_list() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r"^\s*\(\s*[+-]?\d+(\.\d+)?(\s*,\s*[+-]?\d+(\.\d+)?)*\s*\)\s*$").ok()
        })
        .as_ref()
}

fn single_number() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^\s*[+-]?\d+(\.\d+)?\s*$").ok())
        .as_ref()
}

fn render_in_list<Q: Quoter + ?Sized>(
    val: &Value,
    quoter: &Q,
    fragment: &dyn Fn() -> String,
) -> Result<String> {
    match val {
        Value::Array(items) => {
            if items.is_empty() {
                return Err(Error::bad_condition(
                    "an in/not-in list cannot be empty",
                    fragment(),
                ));
            }
            let rendered = items
                .iter()
                .map(|item| match item {
                    Value::Text(_) => Ok(quoter.quote_value(item)),
                    Value::Array(_) | Value::Default => Err(Error::bad_condition(
                        "in/not-in list members must be single values",
                        fragment(),
                    )),
                    other => Ok(other
                        .sql_literal()
                        .unwrap_or_else(|| quoter.quote_value(other))),
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(format!("({})", rendered.join(", ")))
        }
        Value::Text(text) => {
            let looks_numeric = numeric_looking().is_some_and(|re| re.is_match(text));
            if !looks_numeric {
                return Ok(format!("({})", quoter.quote_value(val)));
            }
            if numeric_list().is_some_and(|re| re.is_match(text)) {
                Ok(text.trim().to_string())
            } else if single_number().is_some_and(|re| re.is_match(text)) {
                Ok(format!("({})", text.trim()))
            } else {
                Err(Error::bad_condition(
                    "malformed numeric in/not-in list",
                    fragment(),
                ))
            }
        }
        Value::Default => Err(Error::bad_condition(
            "DEFAULT cannot be used as an in/not-in operand",
            fragment(),
        )),
        other => Ok(format!(
            "({})",
            other
                .sql_literal()
                .unwrap_or_else(|| quoter.quote_value(other))
        )),
    }
}

const LEAF_KEYS: [&str; 3] = ["col", "operator", "val"];

fn parse_list(json: &serde_json::Value) -> Result<Conditions> {
    let entries: Vec<(String, &serde_json::Value)> = match json {
        serde_json::Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v)).collect(),
        serde_json::Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v))
            .collect(),
        _ => Vec::new(),
    };

    let mut conds = Conditions::new();
    for (key, entry) in entries {
        let condition = parse_entry(&key, entry)?;
        conds = conds.push(ConditionKey::parse(&key), condition);
    }
    Ok(conds)
}

fn is_leaf(map: &serde_json::Map<String, serde_json::Value>) -> bool {
    LEAF_KEYS.iter().any(|k| map.contains_key(*k))
        || map.values().any(|v| !(v.is_object() || v.is_array()))
}

fn parse_entry(key: &str, entry: &serde_json::Value) -> Result<Condition> {
    match entry {
        serde_json::Value::Object(map) if is_leaf(map) => parse_predicate(map, entry),
        serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
            let group = parse_list(entry)?;
            if group.is_empty() {
                return Err(Error::bad_condition(
                    "a nested condition list cannot be empty",
                    format!("{key}: {entry}"),
                ));
            }
            Ok(Condition::Group(group))
        }
        other => Err(Error::bad_condition(
            "a condition entry must be an object",
            format!("{key}: {other}"),
        )),
    }
}

fn parse_predicate(
    map: &serde_json::Map<String, serde_json::Value>,
    entry: &serde_json::Value,
) -> Result<Condition> {
    let col = match map.get("col") {
        Some(serde_json::Value::String(col)) if !col.trim().is_empty() => col.clone(),
        Some(_) => {
            return Err(Error::bad_condition(
                "'col' must be a non-empty string",
                entry.to_string(),
            ));
        }
        None => {
            return Err(Error::bad_condition(
                "a condition must contain 'col'",
                entry.to_string(),
            ));
        }
    };

    let operator = match map.get("operator") {
        Some(serde_json::Value::String(name)) => Operator::parse(name).ok_or_else(|| {
            Error::bad_condition(
                format!(
                    "unknown operator '{}', expected one of {}",
                    name,
                    Operator::ALL.map(Operator::as_str).join(", ")
                ),
                entry.to_string(),
            )
        })?,
        Some(_) => {
            return Err(Error::bad_condition(
                "'operator' must be a string",
                entry.to_string(),
            ));
        }
        None => {
            return Err(Error::bad_condition(
                "a condition must contain 'operator'",
                entry.to_string(),
            ));
        }
    };

    let val = map.get("val").map(Value::from_json);
    if operator.takes_value() && val.is_none() {
        return Err(Error::bad_condition(
            format!("operator '{}' requires 'val'", operator),
            entry.to_string(),
        ));
    }

    Ok(Condition::Predicate(Predicate { col, operator, val }))
}

impl TryFrom<&serde_json::Value> for Conditions {
    type Error = Error;

    fn try_from(json: &serde_json::Value) -> Result<Self> {
        Conditions::from_json(json)
    }
}
