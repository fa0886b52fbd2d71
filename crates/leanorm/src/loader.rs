//! Relation loading.
//!
//! One query per relation, whatever the number of parents. Parent key
//! values are collected and deduplicated, the foreign rows are fetched with
//! a single `=`/`IN` select, grouped by normalized key and handed back to
//! each parent:
//!
//! ```text
//! parents: [post 1, post 2]           -> keys [1, 2]
//! SELECT comments.* FROM comments WHERE comments.post_id IN (1, 2)
//! {"1": [c1, c3], "2": [c2]}          -> post 1 gets [c1, c3], post 2 gets [c2]
//! ```
//!
//! Has-many-through goes through the join table and carries the parent key
//! back in an extra aliased column that is dropped before wrapping.

use std::collections::{HashMap, HashSet};

use leanorm_core::{ConfigError, Error, Result, RowMap, Value};
use leanorm_query::{Conditions, FetchParams, Join, Operator, ParamKey, SelectBuilder};

use crate::collection::Collection;
use crate::model::Model;
use crate::record::{ReadOnlyRecord, Record, RecordAccess, Related};
use crate::relation::{RecordKind, RelationDef, RelationKind};

/// Alias carrying the parent key through a has-many-through join.
const PARENT_KEY_ALIAS: &str = "__parent_key";

/// Something related data can be attached to.
pub trait RelationHost {
    /// Value of `col` used to match foreign rows.
    fn relation_key(&self, col: &str) -> Option<&Value>;

    fn attach_related(&mut self, name: &str, related: Related);
}

/// Load relation `name` of `model` onto every parent with one query.
///
/// An unknown relation name is ignored. `wrap` overrides the relation's
/// default for wrapping foreign rows in records.
#[tracing::instrument(
    level = "debug",
    skip(model, parents, wrap),
    fields(table = %model.table_name(), parents = parents.len())
)]
pub fn load_relation<H: RelationHost>(
    model: &Model,
    parents: &mut [&mut H],
    name: &str,
    wrap: Option<bool>,
) -> Result<()> {
    let Some(rel) = model.relation(name) else {
        tracing::trace!(relation = name, "Unknown relation, nothing to load");
        return Ok(());
    };

    let foreign = if wrap.unwrap_or(rel.wrap_in_records) {
        let foreign = model.database().model(&rel.foreign_model)?;
        let kind = if foreign.def().record_kind == RecordKind::ReadOnly {
            RecordKind::ReadOnly
        } else {
            rel.foreign_record_kind
        };
        Some((foreign, kind))
    } else {
        None
    };
    let target = foreign.as_ref().map(|(m, k)| (m, *k));

    let keys = collect_keys(parents.iter().map(|p| &**p), &rel.foreign_key_col_in_my_table);
    if keys.is_empty() {
        tracing::debug!(relation = name, "No parent keys, skipping query");
        for parent in parents.iter_mut() {
            parent.attach_related(name, wrap_rows(rel.kind, Vec::new(), target));
        }
        return Ok(());
    }

    let grouped = fetch_grouped(model, rel, &keys)?;
    tracing::debug!(
        relation = name,
        keys = keys.len(),
        matched = grouped.len(),
        "Stitching related rows"
    );

    match rel.kind {
        RelationKind::BelongsTo | RelationKind::HasOne => {
            stitch(parents, rel, &grouped, |rows| {
                wrap_rows(rel.kind, rows.iter().take(1).cloned().collect(), target)
            });
        }
        RelationKind::HasMany | RelationKind::HasManyThrough => {
            stitch(parents, rel, &grouped, |rows| {
                wrap_rows(rel.kind, rows.to_vec(), target)
            });
        }
    }
    Ok(())
}

/// Distinct non-null key values, in first-seen order.
fn collect_keys<'a, H, I>(parents: I, col: &str) -> Vec<Value>
where
    H: RelationHost + 'a,
    I: Iterator<Item = &'a H>,
{
    let mut seen = HashSet::new();
    let mut keys = Vec::new();
    for parent in parents {
        let Some(value) = parent.relation_key(col) else {
            continue;
        };
        if let Some(key) = value.key_string() {
            if seen.insert(key) {
                keys.push(value.clone());
            }
        }
    }
    keys
}

/// Run the relation query and group the rows by normalized parent key.
fn fetch_grouped(
    model: &Model,
    rel: &RelationDef,
    keys: &[Value],
) -> Result<HashMap<String, Vec<RowMap>>> {
    let through = match rel.kind {
        RelationKind::HasManyThrough => Some(rel.join_table.as_ref().ok_or_else(|| {
            Error::Config(ConfigError {
                message: format!("relation '{}' has no join table", rel.name),
                source: None,
            })
        })?),
        _ => None,
    };

    let match_col = match through {
        Some(join) => format!("{}.{}", join.table, join.col_linked_to_my_table),
        None => format!("{}.{}", rel.foreign_table, rel.foreign_key_col_in_foreign_table),
    };
    let key_condition = match keys {
        [single] => Conditions::new().and(match_col, Operator::Eq, single.clone()),
        _ => Conditions::new().and(match_col, Operator::In, Value::Array(keys.to_vec())),
    };

    let mut params: FetchParams = rel
        .constraints
        .clone()
        .without(&ParamKey::SUBQUERY_DISALLOWED);
    params.where_conditions = if params.where_conditions.is_empty() {
        key_condition
    } else {
        key_condition.and_group(std::mem::take(&mut params.where_conditions))
    };

    let mut joins = Vec::new();
    if let Some(join) = through {
        if params.cols.is_empty() {
            params.cols.push(format!("{}.*", rel.foreign_table));
        }
        params.cols.push(format!(
            "{}.{} AS {}",
            join.table, join.col_linked_to_my_table, PARENT_KEY_ALIAS
        ));
        joins.push(Join::inner(
            join.table.as_str(),
            format!(
                "{}.{} = {}.{}",
                join.table,
                join.col_linked_to_foreign_table,
                rel.foreign_table,
                rel.foreign_key_col_in_foreign_table
            ),
        ));
    }
    let mut builder =
        SelectBuilder::new(&rel.foreign_table, &params).disallow(&ParamKey::SUBQUERY_DISALLOWED);
    for join in joins {
        builder = builder.join(join);
    }

    let executor = model.executor();
    let query = builder.build(executor)?;
    let rows = executor.query(&query.sql, &query.params)?;

    let mut grouped: HashMap<String, Vec<RowMap>> = HashMap::new();
    for row in rows {
        let mut map = row.into_map();
        let key = if through.is_some() {
            map.shift_remove(PARENT_KEY_ALIAS)
        } else {
            map.get(&rel.foreign_key_col_in_foreign_table).cloned()
        };
        match key.as_ref().and_then(Value::key_string) {
            Some(key) => grouped.entry(key).or_default().push(map),
            None => tracing::trace!(relation = %rel.name, "Related row without a key"),
        }
    }
    Ok(grouped)
}

fn stitch<H, F>(
    parents: &mut [&mut H],
    rel: &RelationDef,
    grouped: &HashMap<String, Vec<RowMap>>,
    wrap: F,
) where
    H: RelationHost,
    F: Fn(&[RowMap]) -> Related,
{
    for parent in parents.iter_mut() {
        let key = parent
            .relation_key(&rel.foreign_key_col_in_my_table)
            .and_then(Value::key_string);
        let rows = key
            .and_then(|key| grouped.get(&key))
            .map_or(&[][..], Vec::as_slice);
        parent.attach_related(&rel.name, wrap(rows));
    }
}

/// Shape `rows` for the relation kind: at most one row for to-one
/// relations, all of them otherwise.
fn wrap_rows(
    kind: RelationKind,
    rows: Vec<RowMap>,
    target: Option<(&Model, RecordKind)>,
) -> Related {
    if kind.is_to_many() {
        return match target {
            None => Related::Rows(rows),
            Some((model, RecordKind::Writable)) => Related::Many(records(model, rows)),
            Some((model, RecordKind::ReadOnly)) => Related::ManyReadOnly(records(model, rows)),
        };
    }
    let row = rows.into_iter().next();
    match target {
        None => Related::Row(row),
        Some((model, RecordKind::Writable)) => {
            Related::One(row.map(|r| Box::new(Record::from_fetched(model.clone(), r))))
        }
        Some((model, RecordKind::ReadOnly)) => Related::OneReadOnly(
            row.map(|r| Box::new(ReadOnlyRecord::from_fetched(model.clone(), r))),
        ),
    }
}

fn records<R: RecordAccess>(model: &Model, rows: Vec<RowMap>) -> Collection<R> {
    let mut collection = model.create_new_collection();
    for row in rows {
        collection.push(R::from_fetched(model.clone(), row));
    }
    collection
}
