//! Keyed, ordered record containers with bulk save and delete.

use std::collections::HashMap;
use std::fmt;

use indexmap::IndexMap;
use leanorm_core::{
    CapabilityError, CapabilityErrorKind, Error, NotFoundKind, Result, RowMap, Value,
};
use leanorm_query::{Conditions, FetchParams, Operator};

use crate::loader::load_relation;
use crate::model::Model;
use crate::record::{Record, RecordAccess};

/// Position of a record in a collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Index(usize),
    Name(String),
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Key::Index(index)
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Key::Name(name.to_string())
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Key::Name(name)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Index(i) => write!(f, "{}", i),
            Key::Name(name) => f.write_str(name),
        }
    }
}

/// Result of a bulk operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BulkOutcome {
    AllSucceeded,
    /// Keys of the records that could not be saved or deleted
    Failed(Vec<Key>),
}

impl BulkOutcome {
    fn from_failures(failed: Vec<Key>) -> Self {
        if failed.is_empty() {
            BulkOutcome::AllSucceeded
        } else {
            BulkOutcome::Failed(failed)
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, BulkOutcome::AllSucceeded)
    }
}

/// Records of one model, in insertion order.
///
/// Keys stay attached to their record across inserts and removals.
/// [`push`](Self::push) assigns the next free integer index.
#[derive(Debug, Clone)]
pub struct Collection<R: RecordAccess = Record> {
    model: Model,
    records: IndexMap<Key, R>,
    next_index: usize,
}

impl<R: RecordAccess> Collection<R> {
    pub fn new(model: Model) -> Self {
        Self {
            model,
            records: IndexMap::new(),
            next_index: 0,
        }
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Append `record` under the next integer index.
    pub fn push(&mut self, record: R) -> Key {
        let key = Key::Index(self.next_index);
        self.next_index = self.next_index.saturating_add(1);
        self.records.insert(key.clone(), record);
        key
    }

    /// Store `record` under `key`, returning the record it replaced.
    pub fn insert(&mut self, key: impl Into<Key>, record: R) -> Option<R> {
        let key = key.into();
        if let Key::Index(i) = key {
            self.next_index = self.next_index.max(i.saturating_add(1));
        }
        self.records.insert(key, record)
    }

    pub fn get(&self, key: impl Into<Key>) -> Result<&R> {
        let key = key.into();
        self.records
            .get(&key)
            .ok_or_else(|| self.missing(&key))
    }

    pub fn get_mut(&mut self, key: impl Into<Key>) -> Result<&mut R> {
        let key = key.into();
        match self.records.get_index_of(&key) {
            Some(index) => Ok(&mut self.records[index]),
            None => Err(self.missing(&key)),
        }
    }

    fn missing(&self, key: &Key) -> Error {
        Error::not_found_on(
            NotFoundKind::CollectionKey,
            key.to_string(),
            self.model.table_name(),
        )
    }

    pub fn contains_key(&self, key: impl Into<Key>) -> bool {
        self.records.contains_key(&key.into())
    }

    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.records.keys()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Key, &R)> {
        self.records.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&Key, &mut R)> {
        self.records.iter_mut()
    }

    /// Detach one record without touching the database.
    pub fn remove_record(&mut self, key: impl Into<Key>) -> Option<R> {
        self.records.shift_remove(&key.into())
    }

    /// Detach every record without touching the database.
    pub fn remove_all(&mut self) -> IndexMap<Key, R> {
        std::mem::take(&mut self.records)
    }

    pub fn into_records(self) -> Vec<R> {
        self.records.into_values().collect()
    }

    /// Value of `col` for each record, NULL where unset.
    pub fn col_values(&self, col: &str) -> Vec<Value> {
        self.records
            .values()
            .map(|r| r.record().data().get(col).cloned().unwrap_or(Value::Null))
            .collect()
    }

    /// Every record as a plain map.
    pub fn to_array(&self) -> Vec<RowMap> {
        self.records.values().map(|r| r.record().to_map()).collect()
    }

    /// Load each relation in `names` for the whole collection, one query per
    /// relation.
    pub fn eager_load_related_data(&mut self, names: &[&str]) -> Result<()> {
        if self.records.is_empty() {
            return Ok(());
        }
        for name in names {
            let mut parents: Vec<&mut R> = self.records.values_mut().collect();
            load_relation(&self.model, &mut parents, name, None)?;
        }
        Ok(())
    }

    fn ensure_writable(&self, action: &str) -> Result<()> {
        match self.records.iter().find(|(_, r)| r.is_read_only()) {
            Some((key, _)) => Err(Error::unsupported_operation(format!(
                "cannot {} a collection holding read-only record '{}'",
                action, key
            ))),
            None => Ok(()),
        }
    }

    /// Save every record.
    ///
    /// With `group_inserts`, new records are written with one bulk insert
    /// and must all belong to this collection's table; a mismatch fails
    /// before any SQL runs. The inserted rows are then read back in one
    /// query, so each record ends up persisted with its generated key. New
    /// records holding no data are skipped.
    #[tracing::instrument(
        level = "debug",
        skip(self),
        fields(table = %self.model.table_name(), records = self.records.len())
    )]
    pub fn save_all(&mut self, group_inserts: bool) -> Result<BulkOutcome> {
        self.ensure_writable("save")?;

        if group_inserts {
            let foreign = self.records.iter().find(|(_, r)| {
                let record = r.record();
                record.is_new() && !record.model().same_table(&self.model)
            });
            if let Some((key, r)) = foreign {
                return Err(Error::Capability(CapabilityError {
                    kind: CapabilityErrorKind::TableMismatch,
                    message: format!(
                        "record '{}' belongs to '{}', not '{}'",
                        key,
                        r.record().model().table_name(),
                        self.model.table_name()
                    ),
                }));
            }
        }

        let mut failed = Vec::new();
        let mut to_insert = Vec::new();
        for (key, r) in &mut self.records {
            let record = r.writable()?;
            if group_inserts && record.is_new() {
                if !record.data().is_empty() {
                    to_insert.push(key.clone());
                }
                continue;
            }
            if let Err(err) = record.save(None) {
                tracing::warn!(key = %key, error = %err, "Record failed to save");
                failed.push(key.clone());
            }
        }

        if !to_insert.is_empty() {
            let rows: Vec<RowMap> = to_insert
                .iter()
                .filter_map(|key| self.records.get(key))
                .map(|r| r.record().data().clone())
                .collect();
            match self.model.insert_many(&rows) {
                Ok(keys) => {
                    tracing::debug!(rows = keys.len(), "Grouped insert complete");
                    failed.extend(self.adopt_inserted(&to_insert, keys)?);
                }
                Err(err) => {
                    tracing::warn!(
                        error = %err,
                        records = to_insert.len(),
                        "Grouped insert failed"
                    );
                    failed.extend(to_insert);
                }
            }
        }

        Ok(BulkOutcome::from_failures(failed))
    }

    /// Load the stored rows behind freshly inserted records and mark them
    /// persisted. Returns the keys of records whose generated key is
    /// unknown; those stay new.
    fn adopt_inserted(&mut self, inserted: &[Key], generated: Vec<Value>) -> Result<Vec<Key>> {
        let primary_col = self.model.primary_col().to_string();
        let known: Vec<Value> = generated.iter().filter(|k| !k.is_blank()).cloned().collect();
        let mut stored: HashMap<String, RowMap> = HashMap::new();
        if !known.is_empty() {
            let params = FetchParams::new().filter(Conditions::new().and(
                primary_col.as_str(),
                Operator::In,
                Value::Array(known),
            ));
            match self.model.fetch_rows(&params) {
                Ok(rows) => {
                    for row in rows {
                        if let Some(key) = row.get(&primary_col).and_then(Value::key_string) {
                            stored.insert(key, row);
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %err, "Could not read inserted rows back");
                }
            }
        }

        let mut unresolved = Vec::new();
        for (key, generated) in inserted.iter().zip(generated) {
            let Some(r) = self.records.get_mut(key) else {
                continue;
            };
            let record = r.writable()?;
            let Some(lookup) = generated.key_string() else {
                tracing::warn!(key = %key, "Inserted record has no known key");
                unresolved.push(key.clone());
                continue;
            };
            let row = stored.remove(&lookup).unwrap_or_else(|| {
                let mut row = record.data().clone();
                row.insert(primary_col.clone(), generated);
                row
            });
            record.adopt_stored(row);
        }
        Ok(unresolved)
    }

    /// Delete every record from the database and drop the deleted ones from
    /// the collection. A record whose delete affects no row counts as failed.
    #[tracing::instrument(
        level = "debug",
        skip(self),
        fields(table = %self.model.table_name(), records = self.records.len())
    )]
    pub fn delete_all(&mut self) -> Result<BulkOutcome> {
        self.ensure_writable("delete")?;

        let mut failed = Vec::new();
        let mut deleted = Vec::new();
        for (key, r) in &mut self.records {
            match r.writable()?.delete(false) {
                Ok(0) => failed.push(key.clone()),
                Ok(_) => deleted.push(key.clone()),
                Err(err) => {
                    tracing::warn!(key = %key, error = %err, "Record failed to delete");
                    failed.push(key.clone());
                }
            }
        }
        for key in &deleted {
            self.records.shift_remove(key);
        }
        Ok(BulkOutcome::from_failures(failed))
    }
}
