//! The fetch parameter map accepted by every fetch operation.

use std::fmt;

use leanorm_core::{Error, Result};

use crate::condition::Conditions;

/// Recognized fetch parameter keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKey {
    Distinct,
    Cols,
    Where,
    Group,
    Having,
    Order,
    LimitSize,
    LimitOffset,
    RelationsToInclude,
}

impl ParamKey {
    pub const ALL: [ParamKey; 9] = [
        ParamKey::Distinct,
        ParamKey::Cols,
        ParamKey::Where,
        ParamKey::Group,
        ParamKey::Having,
        ParamKey::Order,
        ParamKey::LimitSize,
        ParamKey::LimitOffset,
        ParamKey::RelationsToInclude,
    ];

    /// Keys a relation sub-query never honors.
    pub const SUBQUERY_DISALLOWED: [ParamKey; 3] = [
        ParamKey::LimitSize,
        ParamKey::LimitOffset,
        ParamKey::RelationsToInclude,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            ParamKey::Distinct => "distinct",
            ParamKey::Cols => "cols",
            ParamKey::Where => "where",
            ParamKey::Group => "group",
            ParamKey::Having => "having",
            ParamKey::Order => "order",
            ParamKey::LimitSize => "limit_size",
            ParamKey::LimitOffset => "limit_offset",
            ParamKey::RelationsToInclude => "relations_to_include",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }
}

impl fmt::Display for ParamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declarative description of a fetch.
///
/// Every field is optional; the default fetches every column of every row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchParams {
    pub distinct: bool,
    /// Select list; empty means `<table>.*`
    pub cols: Vec<String>,
    pub where_conditions: Conditions,
    pub group: Vec<String>,
    pub having: Conditions,
    /// Raw ORDER BY items, e.g. `created_at DESC`
    pub order: Vec<String>,
    pub limit_size: Option<u64>,
    pub limit_offset: Option<u64>,
    /// Relations to eager-load onto the fetched records
    pub relations_to_include: Vec<String>,
}

impl FetchParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn distinct(mut self, distinct: bool) -> Self {
        self.distinct = distinct;
        self
    }

    pub fn cols<I, S>(mut self, cols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cols = cols.into_iter().map(Into::into).collect();
        self
    }

    pub fn filter(mut self, conditions: Conditions) -> Self {
        self.where_conditions = conditions;
        self
    }

    pub fn group_by<I, S>(mut self, cols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group = cols.into_iter().map(Into::into).collect();
        self
    }

    pub fn having(mut self, conditions: Conditions) -> Self {
        self.having = conditions;
        self
    }

    pub fn order_by<I, S>(mut self, order: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.order = order.into_iter().map(Into::into).collect();
        self
    }

    pub fn limit(mut self, size: u64) -> Self {
        self.limit_size = Some(size);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.limit_offset = Some(offset);
        self
    }

    pub fn include<I, S>(mut self, relations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.relations_to_include = relations.into_iter().map(Into::into).collect();
        self
    }

    /// Parse from a JSON object keyed by the fetch parameter names.
    ///
    /// Each recognized key is shape-checked; a mismatch is a structural
    /// error naming the key. Unrecognized keys are ignored.
    pub fn from_json(json: &serde_json::Value) -> Result<Self> {
        let map = match json {
            serde_json::Value::Null => return Ok(Self::new()),
            serde_json::Value::Object(map) => map,
            other => {
                return Err(Error::bad_fetch_params(
                    format!("fetch params must be an object, got {other}"),
                    "",
                ));
            }
        };

        let mut params = Self::new();
        for (name, value) in map {
            let Some(key) = ParamKey::parse(name) else {
                tracing::trace!(key = %name, "Ignoring unrecognized fetch param");
                continue;
            };
            match key {
                ParamKey::Distinct => {
                    params.distinct = value
                        .as_bool()
                        .ok_or_else(|| shape_error(key, "a boolean", value))?;
                }
                ParamKey::Cols => params.cols = string_list(key, value)?,
                ParamKey::Group => params.group = string_list(key, value)?,
                ParamKey::Order => params.order = string_list(key, value)?,
                ParamKey::RelationsToInclude => {
                    params.relations_to_include = string_list(key, value)?;
                }
                ParamKey::Where => params.where_conditions = condition_list(key, value)?,
                ParamKey::Having => params.having = condition_list(key, value)?,
                ParamKey::LimitSize => params.limit_size = Some(count(key, value)?),
                ParamKey::LimitOffset => params.limit_offset = Some(count(key, value)?),
            }
        }
        Ok(params)
    }

    /// Is `key` set to something other than its default?
    pub fn is_set(&self, key: ParamKey) -> bool {
        match key {
            ParamKey::Distinct => self.distinct,
            ParamKey::Cols => !self.cols.is_empty(),
            ParamKey::Where => !self.where_conditions.is_empty(),
            ParamKey::Group => !self.group.is_empty(),
            ParamKey::Having => !self.having.is_empty(),
            ParamKey::Order => !self.order.is_empty(),
            ParamKey::LimitSize => self.limit_size.is_some(),
            ParamKey::LimitOffset => self.limit_offset.is_some(),
            ParamKey::RelationsToInclude => !self.relations_to_include.is_empty(),
        }
    }

    /// Reset `keys` to their defaults.
    pub fn without(mut self, keys: &[ParamKey]) -> Self {
        for key in keys {
            match key {
                ParamKey::Distinct => self.distinct = false,
                ParamKey::Cols => self.cols.clear(),
                ParamKey::Where => self.where_conditions = Conditions::new(),
                ParamKey::Group => self.group.clear(),
                ParamKey::Having => self.having = Conditions::new(),
                ParamKey::Order => self.order.clear(),
                ParamKey::LimitSize => self.limit_size = None,
                ParamKey::LimitOffset => self.limit_offset = None,
                ParamKey::RelationsToInclude => self.relations_to_include.clear(),
            }
        }
        self
    }
}

impl TryFrom<&serde_json::Value> for FetchParams {
    type Error = Error;

    fn try_from(json: &serde_json::Value) -> Result<Self> {
        FetchParams::from_json(json)
    }
}

fn shape_error(key: ParamKey, expected: &str, got: &serde_json::Value) -> Error {
    Error::bad_fetch_params(
        format!("'{}' must be {}, got {}", key, expected, got),
        key.as_str(),
    )
}

fn string_list(key: ParamKey, value: &serde_json::Value) -> Result<Vec<String>> {
    let items = value
        .as_array()
        .ok_or_else(|| shape_error(key, "an array of strings", value))?;
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| shape_error(key, "an array of strings", value))
        })
        .collect()
}

fn condition_list(key: ParamKey, value: &serde_json::Value) -> Result<Conditions> {
    if !(value.is_object() || value.is_array() || value.is_null()) {
        return Err(shape_error(key, "a condition list", value));
    }
    Conditions::from_json(value)
}

fn count(key: ParamKey, value: &serde_json::Value) -> Result<u64> {
    value
        .as_u64()
        .ok_or_else(|| shape_error(key, "a non-negative integer", value))
}
