//! Records: one row's data with dirty tracking and a relation cache.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use leanorm_core::{
    Error, NotFoundKind, Result, RowMap, TransactionError, TransactionErrorKind, Value,
};

use crate::collection::Collection;
use crate::loader::{RelationHost, load_relation};
use crate::model::Model;

static NULL: Value = Value::Null;

/// What a relation name resolves to once loaded.
#[derive(Debug, Clone)]
pub enum Related {
    One(Option<Box<Record>>),
    OneReadOnly(Option<Box<ReadOnlyRecord>>),
    Many(Collection<Record>),
    ManyReadOnly(Collection<ReadOnlyRecord>),
    /// Unwrapped to-one result
    Row(Option<RowMap>),
    /// Unwrapped to-many result
    Rows(Vec<RowMap>),
}

impl Related {
    /// Number of related rows held.
    pub fn len(&self) -> usize {
        match self {
            Related::One(r) => usize::from(r.is_some()),
            Related::OneReadOnly(r) => usize::from(r.is_some()),
            Related::Row(r) => usize::from(r.is_some()),
            Related::Many(c) => c.len(),
            Related::ManyReadOnly(c) => c.len(),
            Related::Rows(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_one(&self) -> Option<&Record> {
        match self {
            Related::One(r) => r.as_deref(),
            _ => None,
        }
    }

    pub fn as_one_read_only(&self) -> Option<&ReadOnlyRecord> {
        match self {
            Related::OneReadOnly(r) => r.as_deref(),
            _ => None,
        }
    }

    pub fn as_many(&self) -> Option<&Collection<Record>> {
        match self {
            Related::Many(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_many_read_only(&self) -> Option<&Collection<ReadOnlyRecord>> {
        match self {
            Related::ManyReadOnly(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_row(&self) -> Option<&RowMap> {
        match self {
            Related::Row(r) => r.as_ref(),
            _ => None,
        }
    }

    pub fn as_rows(&self) -> Option<&[RowMap]> {
        match self {
            Related::Rows(rows) => Some(rows),
            _ => None,
        }
    }

    /// Mutable access to a writable to-many result.
    pub fn as_many_mut(&mut self) -> Option<&mut Collection<Record>> {
        match self {
            Related::Many(c) => Some(c),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Related::One(r) => r.as_ref().map_or(serde_json::Value::Null, |r| r.to_json()),
            Related::OneReadOnly(r) => {
                r.as_ref().map_or(serde_json::Value::Null, |r| r.to_json())
            }
            Related::Row(r) => r.as_ref().map_or(serde_json::Value::Null, map_to_json),
            Related::Many(c) => c.iter().map(|(_, r)| r.to_json()).collect(),
            Related::ManyReadOnly(c) => c.iter().map(|(_, r)| r.to_json()).collect(),
            Related::Rows(rows) => rows.iter().map(map_to_json).collect(),
        }
    }
}

fn map_to_json(map: &RowMap) -> serde_json::Value {
    serde_json::Value::Object(map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect())
}

/// Where a property name resolved.
#[derive(Debug, Clone, Copy)]
pub enum Property<'a> {
    TableColumn(&'a Value),
    Relation(&'a Related),
    /// Data that is neither a table column nor a relation
    Scratch(&'a Value),
    NotFound,
}

impl<'a> Property<'a> {
    /// The value of a column or scratch property.
    pub fn value(self) -> Option<&'a Value> {
        match self {
            Property::TableColumn(v) | Property::Scratch(v) => Some(v),
            Property::Relation(_) | Property::NotFound => None,
        }
    }

    pub fn related(self) -> Option<&'a Related> {
        match self {
            Property::Relation(r) => Some(r),
            _ => None,
        }
    }

    pub fn is_found(self) -> bool {
        !matches!(self, Property::NotFound)
    }
}

/// Result of [`Record::save`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Inserted,
    Updated,
    NothingToSave,
}

/// One row of a table, with a snapshot for change detection.
///
/// A record starts out new. The first successful insert marks it persisted
/// and snapshots its data; every later load, insert or update refreshes the
/// snapshot. Keys that are not table columns are kept apart as scratch data
/// and never written.
#[derive(Debug, Clone)]
pub struct Record {
    model: Model,
    data: RowMap,
    initial_data: RowMap,
    related_data: IndexMap<String, Related>,
    non_table_col_and_non_related_data: RowMap,
    is_new: bool,
}

impl Record {
    /// An empty new record.
    pub fn new(model: Model) -> Self {
        Self {
            model,
            data: RowMap::new(),
            initial_data: RowMap::new(),
            related_data: IndexMap::new(),
            non_table_col_and_non_related_data: RowMap::new(),
            is_new: true,
        }
    }

    /// A persisted record holding a fetched row.
    pub fn from_row(model: Model, row: RowMap) -> Self {
        let mut record = Self::new(model);
        record.load_data(row, None);
        record.is_new = false;
        record
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn data(&self) -> &RowMap {
        &self.data
    }

    pub fn initial_data(&self) -> &RowMap {
        &self.initial_data
    }

    pub fn related_data(&self) -> &IndexMap<String, Related> {
        &self.related_data
    }

    pub fn non_table_col_and_non_related_data(&self) -> &RowMap {
        &self.non_table_col_and_non_related_data
    }

    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub fn get_related(&self, name: &str) -> Option<&Related> {
        self.related_data.get(name)
    }

    /// Value of the primary column, NULL when unset.
    pub fn primary_key_value(&self) -> &Value {
        self.data.get(self.model.primary_col()).unwrap_or(&NULL)
    }

    /// Resolve `key` without touching the database.
    pub fn lookup(&self, key: &str) -> Property<'_> {
        if let Some(value) = self.data.get(key) {
            Property::TableColumn(value)
        } else if let Some(related) = self.related_data.get(key) {
            Property::Relation(related)
        } else if let Some(value) = self.non_table_col_and_non_related_data.get(key) {
            Property::Scratch(value)
        } else if self.model.has_column(key) {
            Property::TableColumn(&NULL)
        } else {
            Property::NotFound
        }
    }

    /// Resolve `key`, loading a declared relation on first access.
    ///
    /// A table column with no value yet is materialized as NULL. Relations
    /// are only loaded once the record holds data.
    pub fn get(&mut self, key: &str) -> Result<Property<'_>> {
        let held = self.data.contains_key(key)
            || self.related_data.contains_key(key)
            || self.non_table_col_and_non_related_data.contains_key(key);
        if !held {
            if self.model.has_column(key) {
                self.data.insert(key.to_string(), Value::Null);
            } else if self.model.relation(key).is_some() && !self.data.is_empty() {
                let model = self.model.clone();
                load_relation(&model, &mut [&mut *self], key, None)?;
            }
        }
        match self.lookup(key) {
            Property::NotFound => Err(Error::not_found_on(
                NotFoundKind::Property,
                key,
                self.model.table_name(),
            )),
            found => Ok(found),
        }
    }

    /// Replace `data` with `map`, or only the columns named in `cols`.
    ///
    /// Keys that are not table columns go to scratch data. The first load
    /// into an empty snapshot also fills the snapshot.
    pub fn load_data(&mut self, map: RowMap, cols: Option<&[&str]>) {
        match cols {
            None => {
                self.data.clear();
                for (key, value) in map {
                    self.place(key, value);
                }
            }
            Some(cols) => {
                for (key, value) in map {
                    if cols.contains(&key.as_str()) {
                        self.place(key, value);
                    }
                }
            }
        }
        if self.initial_data.is_empty() {
            self.initial_data = self.data.clone();
        }
    }

    fn place(&mut self, key: String, value: Value) {
        if self.model.has_column(&key) {
            self.data.insert(key, value);
        } else {
            self.non_table_col_and_non_related_data.insert(key, value);
        }
    }

    /// Set a table column, or scratch data for any other key.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.place(key.into(), value.into());
    }

    /// Remove `key` from data, relations and scratch data.
    pub fn unset(&mut self, key: &str) {
        self.data.shift_remove(key);
        self.related_data.shift_remove(key);
        self.non_table_col_and_non_related_data.shift_remove(key);
    }

    pub fn set_related_data(&mut self, name: impl Into<String>, related: Related) {
        self.related_data.insert(name.into(), related);
    }

    pub fn mark_as_new(&mut self) {
        self.is_new = true;
    }

    pub fn mark_as_not_new(&mut self) {
        self.is_new = false;
    }

    /// Clear every piece of state and mark the record new.
    pub fn set_state_to_new(&mut self) {
        self.clear_state();
        self.is_new = true;
    }

    fn clear_state(&mut self) {
        self.data.clear();
        self.initial_data.clear();
        self.related_data.clear();
        self.non_table_col_and_non_related_data.clear();
    }

    pub(crate) fn snapshot(&mut self) {
        self.initial_data = self.data.clone();
    }

    /// Has `col` changed since the last snapshot?
    ///
    /// A missing value counts as NULL. Numeric-looking values compare by
    /// number, so `"1"` and `1` are the same.
    pub fn is_changed(&self, col: &str) -> bool {
        let current = self.data.get(col).unwrap_or(&NULL);
        let initial = self.initial_data.get(col).unwrap_or(&NULL);
        !current.loosely_equals(initial)
    }

    pub fn is_changed_any(&self) -> bool {
        self.data
            .keys()
            .chain(self.initial_data.keys())
            .any(|col| self.is_changed(col))
    }

    /// Insert or update, merging `data` first.
    ///
    /// A record that is new or has no primary key value is inserted and
    /// reloaded from the stored row. Otherwise changed columns are
    /// updated. An empty record saves nothing.
    #[tracing::instrument(
        level = "debug",
        skip(self, data),
        fields(table = %self.model.table_name())
    )]
    pub fn save(&mut self, data: Option<RowMap>) -> Result<SaveOutcome> {
        if let Some(data) = data {
            for (key, value) in data {
                self.place(key, value);
            }
        }
        if self.data.is_empty() {
            return Ok(SaveOutcome::NothingToSave);
        }

        if self.is_new || self.primary_key_value().is_blank() {
            let stored = self.model.insert(&self.data)?;
            self.adopt_stored(stored);
            return Ok(SaveOutcome::Inserted);
        }

        // an unset column is a change nothing can write
        let writable_change = self
            .data
            .keys()
            .any(|col| self.model.has_column(col) && self.is_changed(col));
        if !writable_change {
            return Ok(SaveOutcome::NothingToSave);
        }
        let affected = self.model.update_specified_record(self)?;
        tracing::debug!(affected, "Updated record");
        self.snapshot();
        Ok(SaveOutcome::Updated)
    }

    /// Take `stored` as the freshly inserted row: data, snapshot and state.
    pub(crate) fn adopt_stored(&mut self, stored: RowMap) {
        self.data.clear();
        for (key, value) in stored {
            self.place(key, value);
        }
        self.snapshot();
        self.is_new = false;
    }

    /// [`save`](Self::save) inside a transaction.
    ///
    /// A failed save or commit is rolled back and the record gets its
    /// pre-save state back. Refused while a transaction is already open on
    /// the executor.
    pub fn save_in_transaction(&mut self, data: Option<RowMap>) -> Result<SaveOutcome> {
        let executor = Arc::clone(self.model.database().executor());
        if executor.in_transaction() {
            return Err(Error::Transaction(TransactionError {
                kind: TransactionErrorKind::NestedNotSupported,
                message: format!(
                    "cannot save a '{}' record inside an open transaction",
                    self.model.table_name()
                ),
            }));
        }

        let checkpoint = Checkpoint::of(self);
        executor.begin()?;
        let saved = self
            .save(data)
            .and_then(|outcome| executor.commit().map(|()| outcome));
        match saved {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                if let Err(rollback_err) = executor.rollback() {
                    tracing::warn!(
                        error = %rollback_err,
                        "Rollback after failed save also failed"
                    );
                }
                checkpoint.restore(self);
                Err(err)
            }
        }
    }

    /// Delete the stored row. With `clear_state`, all data is dropped on
    /// success.
    pub fn delete(&mut self, clear_state: bool) -> Result<u64> {
        let affected = self.model.delete_specified_record(self)?;
        if affected > 0 && clear_state {
            self.clear_state();
        }
        Ok(affected)
    }

    /// Data and scratch data in one map.
    pub fn to_map(&self) -> RowMap {
        let mut map = self.data.clone();
        for (key, value) in &self.non_table_col_and_non_related_data {
            map.insert(key.clone(), value.clone());
        }
        map
    }

    /// Data, scratch data and loaded relations as a JSON object.
    pub fn to_json(&self) -> serde_json::Value {
        let mut object = match map_to_json(&self.to_map()) {
            serde_json::Value::Object(object) => object,
            _ => serde_json::Map::new(),
        };
        for (name, related) in &self.related_data {
            object.insert(name.clone(), related.to_json());
        }
        serde_json::Value::Object(object)
    }
}

/// Record state taken before a transactional save.
struct Checkpoint {
    data: RowMap,
    initial_data: RowMap,
    scratch: RowMap,
    is_new: bool,
}

impl Checkpoint {
    fn of(record: &Record) -> Self {
        Self {
            data: record.data.clone(),
            initial_data: record.initial_data.clone(),
            scratch: record.non_table_col_and_non_related_data.clone(),
            is_new: record.is_new,
        }
    }

    fn restore(self, record: &mut Record) {
        record.data = self.data;
        record.initial_data = self.initial_data;
        record.non_table_col_and_non_related_data = self.scratch;
        record.is_new = self.is_new;
    }
}

/// A record with no mutating API.
///
/// Reads and lazy relation loading work as on [`Record`]; the dynamic
/// mutation entry points of [`RecordAccess`] fail with an
/// unsupported-operation error.
#[derive(Clone)]
pub struct ReadOnlyRecord(Record);

impl fmt::Debug for ReadOnlyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ReadOnlyRecord").field(&self.0).finish()
    }
}

impl ReadOnlyRecord {
    pub fn model(&self) -> &Model {
        self.0.model()
    }

    pub fn data(&self) -> &RowMap {
        self.0.data()
    }

    pub fn initial_data(&self) -> &RowMap {
        self.0.initial_data()
    }

    pub fn related_data(&self) -> &IndexMap<String, Related> {
        self.0.related_data()
    }

    pub fn non_table_col_and_non_related_data(&self) -> &RowMap {
        self.0.non_table_col_and_non_related_data()
    }

    pub fn get_related(&self, name: &str) -> Option<&Related> {
        self.0.get_related(name)
    }

    pub fn primary_key_value(&self) -> &Value {
        self.0.primary_key_value()
    }

    pub fn lookup(&self, key: &str) -> Property<'_> {
        self.0.lookup(key)
    }

    pub fn get(&mut self, key: &str) -> Result<Property<'_>> {
        self.0.get(key)
    }

    pub fn to_map(&self) -> RowMap {
        self.0.to_map()
    }

    pub fn to_json(&self) -> serde_json::Value {
        self.0.to_json()
    }
}

/// The record contract shared by [`Record`] and [`ReadOnlyRecord`].
///
/// Collections are generic over it, so only records can be stored in one.
pub trait RecordAccess: RelationHost + Clone + fmt::Debug {
    /// Wrap a fetched row as a persisted record.
    fn from_fetched(model: Model, data: RowMap) -> Self;

    fn record(&self) -> &Record;

    /// Mutable access to the underlying record, refused by read-only records.
    fn writable(&mut self) -> Result<&mut Record>;

    fn is_read_only(&self) -> bool;

    fn try_save(&mut self) -> Result<SaveOutcome> {
        self.writable()?.save(None)
    }

    fn try_delete(&mut self, clear_state: bool) -> Result<u64> {
        self.writable()?.delete(clear_state)
    }

    fn try_set(&mut self, key: &str, value: Value) -> Result<()> {
        self.writable()?.set(key, value);
        Ok(())
    }

    fn try_unset(&mut self, key: &str) -> Result<()> {
        self.writable()?.unset(key);
        Ok(())
    }
}

impl RecordAccess for Record {
    fn from_fetched(model: Model, data: RowMap) -> Self {
        Record::from_row(model, data)
    }

    fn record(&self) -> &Record {
        self
    }

    fn writable(&mut self) -> Result<&mut Record> {
        Ok(self)
    }

    fn is_read_only(&self) -> bool {
        false
    }
}

impl RecordAccess for ReadOnlyRecord {
    fn from_fetched(model: Model, data: RowMap) -> Self {
        ReadOnlyRecord(Record::from_row(model, data))
    }

    fn record(&self) -> &Record {
        &self.0
    }

    fn writable(&mut self) -> Result<&mut Record> {
        Err(Error::unsupported_operation(format!(
            "records of '{}' are read-only",
            self.0.model.table_name()
        )))
    }

    fn is_read_only(&self) -> bool {
        true
    }
}

impl RelationHost for Record {
    fn relation_key(&self, col: &str) -> Option<&Value> {
        self.data.get(col)
    }

    fn attach_related(&mut self, name: &str, related: Related) {
        self.set_related_data(name, related);
    }
}

impl RelationHost for ReadOnlyRecord {
    fn relation_key(&self, col: &str) -> Option<&Value> {
        self.0.relation_key(col)
    }

    fn attach_related(&mut self, name: &str, related: Related) {
        self.0.attach_related(name, related);
    }
}

/// A fetched row kept as a plain map, with its loaded relations.
#[derive(Debug, Clone, Default)]
pub struct FetchedRow {
    pub data: RowMap,
    pub related: IndexMap<String, Related>,
}

impl FetchedRow {
    pub fn new(data: RowMap) -> Self {
        Self {
            data,
            related: IndexMap::new(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        let mut object = match map_to_json(&self.data) {
            serde_json::Value::Object(object) => object,
            _ => serde_json::Map::new(),
        };
        for (name, related) in &self.related {
            object.insert(name.clone(), related.to_json());
        }
        serde_json::Value::Object(object)
    }
}

impl RelationHost for FetchedRow {
    fn relation_key(&self, col: &str) -> Option<&Value> {
        self.data.get(col)
    }

    fn attach_related(&mut self, name: &str, related: Related) {
        self.related.insert(name.to_string(), related);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, ModelDef};
    use crate::relation::RelationDef;
    use crate::testing::{MockExecutor, row};
    use leanorm_core::{ColumnSpec, Executor};

    fn setup() -> (Arc<MockExecutor>, Model) {
        let mock = Arc::new(
            MockExecutor::new()
                .with_table(
                    "posts",
                    vec![
                        ColumnSpec::new("id", "INTEGER").primary_key(true),
                        ColumnSpec::new("title", "TEXT"),
                        ColumnSpec::new("views", "INTEGER"),
                    ],
                )
                .with_table(
                    "comments",
                    vec![
                        ColumnSpec::new("id", "INTEGER").primary_key(true),
                        ColumnSpec::new("post_id", "INTEGER"),
                    ],
                ),
        );
        let db = Arc::new(Database::from_connection(Arc::clone(&mock)));
        db.register(ModelDef::new("posts").relation(RelationDef::has_many(
            "comments", "comments", "post_id", "id",
        )));
        let model = db.model("posts").unwrap();
        (mock, model)
    }

    fn fetched(model: &Model, pairs: &[(&str, Value)]) -> Record {
        Record::from_row(model.clone(), row(pairs).into_map())
    }

    #[test]
    fn change_detection() {
        let (_, model) = setup();
        let mut record = fetched(
            &model,
            &[
                ("id", Value::Int(1)),
                ("title", Value::from("a")),
                ("views", Value::Null),
            ],
        );
        assert!(!record.is_changed_any());

        record.set("views", 0);
        assert!(record.is_changed("views"));

        record.set("views", Value::Null);
        record.set("id", "1");
        assert!(!record.is_changed("id"));

        record.set("title", "b");
        assert!(record.is_changed("title"));
        assert!(record.is_changed_any());
    }

    #[test]
    fn set_routes_by_column() {
        let (_, model) = setup();
        let mut record = model.create_new_record();
        record.set("title", "x");
        record.set("flash", "saved");
        assert!(record.data().contains_key("title"));
        assert!(record.non_table_col_and_non_related_data().contains_key("flash"));

        record.unset("flash");
        assert!(matches!(record.lookup("flash"), Property::NotFound));
        assert_eq!(record.to_map().len(), 1);
    }

    #[test]
    fn get_materializes_columns_and_rejects_unknown() {
        let (_, model) = setup();
        let mut record = model.create_new_record();
        let views = record.get("views").unwrap();
        assert_eq!(views.value(), Some(&Value::Null));
        assert!(record.data().contains_key("views"));

        let err = record.get("nickname").unwrap_err();
        assert_eq!(err.to_string(), "Unknown property 'nickname' on 'posts'");
    }

    #[test]
    fn get_loads_relations_lazily() {
        let (mock, model) = setup();
        let mut record = fetched(&model, &[("id", Value::Int(3))]);
        mock.push_rows(vec![
            row(&[("id", Value::Int(10)), ("post_id", Value::Int(3))]),
            row(&[("id", Value::Int(11)), ("post_id", Value::Int(3))]),
        ]);

        let comments = record.get("comments").unwrap().related().map(Related::len);
        assert_eq!(comments, Some(2));
        assert_eq!(
            mock.sql(),
            ["SELECT comments.* FROM comments WHERE comments.post_id = ?1"]
        );

        // cached
        record.get("comments").unwrap();
        assert_eq!(mock.sql().len(), 1);
    }

    #[test]
    fn save_inserts_then_updates() {
        let (mock, model) = setup();
        let mut record = model.create_new_record();
        assert_eq!(record.save(None).unwrap(), SaveOutcome::NothingToSave);

        mock.set_last_insert_id(5_i64);
        mock.push_rows(vec![row(&[
            ("id", Value::BigInt(5)),
            ("title", Value::from("t")),
            ("views", Value::Int(0)),
        ])]);
        let mut data = RowMap::new();
        data.insert("title".into(), Value::from("t"));
        assert_eq!(record.save(Some(data)).unwrap(), SaveOutcome::Inserted);
        assert!(!record.is_new());
        assert_eq!(record.data(), record.initial_data());
        assert_eq!(record.primary_key_value(), &Value::BigInt(5));

        assert_eq!(record.save(None).unwrap(), SaveOutcome::NothingToSave);

        record.set("views", 9);
        assert_eq!(record.save(None).unwrap(), SaveOutcome::Updated);
        assert!(!record.is_changed_any());
        let (sql, params) = mock.calls().pop().unwrap();
        assert_eq!(sql, "UPDATE posts SET views = ?1 WHERE id = ?2");
        assert_eq!(params, vec![Value::Int(9), Value::BigInt(5)]);
    }

    #[test]
    fn save_in_transaction_rolls_back() {
        let (mock, model) = setup();
        let mut record = model.create_new_record();
        record.set("title", Value::from(vec![1_i64]));
        assert!(record.save_in_transaction(None).unwrap_err().is_structural());
        assert_eq!(mock.sql(), ["BEGIN", "ROLLBACK"]);
    }

    #[test]
    fn unset_column_saves_nothing() {
        let (mock, model) = setup();
        let mut record = fetched(&model, &[("id", Value::Int(1)), ("title", Value::from("a"))]);
        record.unset("title");
        assert!(record.is_changed_any());
        assert_eq!(record.save(None).unwrap(), SaveOutcome::NothingToSave);
        assert!(mock.calls().is_empty());
    }

    #[test]
    fn save_in_transaction_refuses_an_open_transaction() {
        let (mock, model) = setup();
        let mut record = fetched(&model, &[("id", Value::Int(1))]);
        record.set("title", "x");
        mock.begin().unwrap();

        let err = record.save_in_transaction(None).unwrap_err();
        assert!(matches!(
            err,
            Error::Transaction(TransactionError {
                kind: TransactionErrorKind::NestedNotSupported,
                ..
            })
        ));
        assert_eq!(mock.sql(), ["BEGIN"]);
        assert!(record.is_changed("title"));
    }

    #[test]
    fn delete_without_key_runs_nothing() {
        let (mock, model) = setup();
        let mut record = model.create_new_record();
        record.set("title", "x");
        assert_eq!(record.delete(true).unwrap(), 0);
        assert!(mock.calls().is_empty());

        let mut stored = fetched(&model, &[("id", Value::Int(2))]);
        assert_eq!(stored.delete(true).unwrap(), 1);
        assert!(stored.data().is_empty());
        assert_eq!(mock.sql(), ["DELETE FROM posts WHERE id = ?1"]);
    }

    #[test]
    fn read_only_refuses_mutation() {
        let (mock, model) = setup();
        let mut record =
            model.create_new_read_only_record(row(&[("id", Value::Int(1))]).into_map());
        let err = record.try_set("title", Value::from("x")).unwrap_err();
        assert!(err.is_capability());
        assert!(record.try_save().unwrap_err().is_capability());
        assert!(record.try_delete(false).unwrap_err().is_capability());
        assert!(!record.data().contains_key("title"));
        assert!(mock.calls().is_empty());
    }

    #[test]
    fn json_includes_relations() {
        let (_, model) = setup();
        let mut record = fetched(&model, &[("id", Value::Int(1)), ("title", Value::from("a"))]);
        record.set("score", 2.5);
        let comment = row(&[("id", Value::Int(4))]).into_map();
        record.set_related_data("comments", Related::Rows(vec![comment]));
        assert_eq!(
            record.to_json(),
            serde_json::json!({"id": 1, "title": "a", "score": 2.5, "comments": [{"id": 4}]})
        );
    }
}
