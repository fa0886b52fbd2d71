//! Table-level operations: fetches, writes and record factories.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use leanorm_core::{ColumnSpec, Dialect, Error, Executor, Result, Row, RowMap, Value};
use leanorm_query::{Conditions, FetchParams, Operator, SelectBuilder};

use crate::collection::Collection;
use crate::db::{Database, ModelDef, TableSchema};
use crate::loader::load_relation;
use crate::record::{FetchedRow, ReadOnlyRecord, Record, RecordAccess};
use crate::relation::RelationDef;

/// A model bound to a database handle.
///
/// Cloning is cheap: the handle, definition and column metadata are shared.
#[derive(Clone)]
pub struct Model {
    db: Arc<Database>,
    def: Arc<ModelDef>,
    schema: Arc<TableSchema>,
    primary_col: String,
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("name", &self.def.name)
            .field("table", &self.def.table)
            .field("primary_col", &self.primary_col)
            .finish_non_exhaustive()
    }
}

impl Model {
    /// Bind `def` to `db`, introspecting the table on first use.
    ///
    /// The primary column is the definition's override, else the first
    /// column the introspector flags as primary key, else `id`.
    pub fn new(db: Arc<Database>, def: Arc<ModelDef>) -> Result<Self> {
        let schema = db.table_schema(&def.table)?;
        let primary_col = def
            .primary_col
            .clone()
            .or_else(|| schema.primary_key().map(|c| c.name.clone()))
            .unwrap_or_else(|| "id".to_string());
        Ok(Self {
            db,
            def,
            schema,
            primary_col,
        })
    }

    pub fn table_name(&self) -> &str {
        &self.def.table
    }

    pub fn primary_col(&self) -> &str {
        &self.primary_col
    }

    pub fn table_col_names(&self) -> Vec<&str> {
        self.schema.column_names().collect()
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.schema.column(name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.schema.has_column(name)
    }

    pub fn relation(&self, name: &str) -> Option<&RelationDef> {
        self.def.relations.get(name)
    }

    pub fn relation_names(&self) -> Vec<&str> {
        self.def.relations.keys().map(String::as_str).collect()
    }

    pub fn def(&self) -> &ModelDef {
        &self.def
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn executor(&self) -> &dyn Executor {
        &**self.db.executor()
    }

    /// Is `other` bound to the same table?
    pub(crate) fn same_table(&self, other: &Model) -> bool {
        self.def.table == other.def.table
    }

    // ---- factories ----

    pub fn create_new_record(&self) -> Record {
        Record::new(self.clone())
    }

    /// A read-only record holding `data`.
    pub fn create_new_read_only_record(&self, data: RowMap) -> ReadOnlyRecord {
        ReadOnlyRecord::from_fetched(self.clone(), data)
    }

    pub fn create_new_collection<R: RecordAccess>(&self) -> Collection<R> {
        Collection::new(self.clone())
    }

    // ---- fetches ----

    /// Run the SELECT described by `params` and return raw rows.
    ///
    /// `relations_to_include` is ignored here.
    #[tracing::instrument(level = "debug", skip(self, params), fields(table = %self.def.table))]
    pub fn fetch_rows(&self, params: &FetchParams) -> Result<Vec<RowMap>> {
        let rows = self.select(params)?;
        tracing::debug!(rows = rows.len(), "Fetched rows");
        Ok(rows.into_iter().map(Row::into_map).collect())
    }

    fn select(&self, params: &FetchParams) -> Result<Vec<Row>> {
        let executor = self.executor();
        let query = SelectBuilder::new(&self.def.table, params).build(executor)?;
        executor.query(&query.sql, &query.params)
    }

    fn fetch_records<R: RecordAccess>(&self, params: &FetchParams) -> Result<Collection<R>> {
        let mut collection = self.create_new_collection();
        for row in self.fetch_rows(params)? {
            collection.push(R::from_fetched(self.clone(), row));
        }
        if !params.relations_to_include.is_empty() {
            let names: Vec<&str> = params
                .relations_to_include
                .iter()
                .map(String::as_str)
                .collect();
            collection.eager_load_related_data(&names)?;
        }
        Ok(collection)
    }

    pub fn fetch_all(&self, params: &FetchParams) -> Result<Collection<Record>> {
        self.fetch_records(params)
    }

    pub fn fetch_all_read_only(
        &self,
        params: &FetchParams,
    ) -> Result<Collection<ReadOnlyRecord>> {
        self.fetch_records(params)
    }

    /// Like [`fetch_all`](Self::fetch_all), as a plain vector.
    pub fn fetch_all_as_array(&self, params: &FetchParams) -> Result<Vec<Record>> {
        Ok(self.fetch_all(params)?.into_records())
    }

    /// Rows as plain maps, with included relations attached alongside.
    #[tracing::instrument(level = "debug", skip(self, params), fields(table = %self.def.table))]
    pub fn fetch_array(&self, params: &FetchParams) -> Result<Vec<FetchedRow>> {
        let mut rows: Vec<FetchedRow> = self
            .fetch_rows(params)?
            .into_iter()
            .map(FetchedRow::new)
            .collect();
        for name in &params.relations_to_include {
            let mut parents: Vec<&mut FetchedRow> = rows.iter_mut().collect();
            load_relation(self, &mut parents, name, None)?;
        }
        Ok(rows)
    }

    pub fn fetch_one(&self, params: &FetchParams) -> Result<Option<Record>> {
        self.fetch_first(params)
    }

    pub fn fetch_one_read_only(&self, params: &FetchParams) -> Result<Option<ReadOnlyRecord>> {
        self.fetch_first(params)
    }

    fn fetch_first<R: RecordAccess>(&self, params: &FetchParams) -> Result<Option<R>> {
        let params = params.clone().limit(1);
        Ok(self.fetch_records::<R>(&params)?.into_records().into_iter().next())
    }

    /// Values of the single selected column.
    pub fn fetch_col(&self, params: &FetchParams) -> Result<Vec<Value>> {
        if params.cols.len() != 1 {
            return Err(Error::bad_column_selection(
                "fetch_col needs exactly one column in 'cols'",
                &params.cols,
            ));
        }
        Ok(self
            .select(params)?
            .into_iter()
            .filter_map(|row| row.into_values().into_iter().next())
            .collect())
    }

    /// First selected column as key, second as value. Later rows win on
    /// duplicate keys; a NULL key becomes the empty string.
    pub fn fetch_pairs(&self, params: &FetchParams) -> Result<IndexMap<String, Value>> {
        if params.cols.len() != 2 {
            return Err(Error::bad_column_selection(
                "fetch_pairs needs exactly two columns in 'cols'",
                &params.cols,
            ));
        }
        let mut pairs = IndexMap::new();
        for row in self.select(params)? {
            let mut values = row.into_values().into_iter();
            let (Some(key), Some(value)) = (values.next(), values.next()) else {
                continue;
            };
            pairs.insert(key.key_string().unwrap_or_default(), value);
        }
        Ok(pairs)
    }

    /// First column of the first row.
    pub fn fetch_value(&self, params: &FetchParams) -> Result<Option<Value>> {
        let params = params.clone().limit(1);
        Ok(self
            .select(&params)?
            .into_iter()
            .next()
            .and_then(|row| row.into_values().into_iter().next()))
    }

    // ---- writes ----

    /// Table columns of `data` in order, rejecting values that cannot be
    /// written.
    fn writable_pairs<'a>(&self, data: &'a RowMap) -> Result<Vec<(&'a str, Value)>> {
        let mut pairs = Vec::new();
        for (col, value) in data {
            if !self.has_column(col) {
                tracing::trace!(table = %self.def.table, col = %col, "Skipping non-table column");
                continue;
            }
            if !value.is_scalar() {
                return Err(Error::unsupported_value(col.as_str(), value.type_name()));
            }
            pairs.push((col.as_str(), value.clone()));
        }
        Ok(pairs)
    }

    fn dialect(&self) -> Dialect {
        self.executor().dialect()
    }

    fn placeholders(&self, start: usize, count: usize) -> String {
        let dialect = self.dialect();
        (start..start + count)
            .map(|i| dialect.placeholder(i))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Insert one row and return it as stored, defaults and generated key
    /// included.
    #[tracing::instrument(level = "debug", skip(self, data), fields(table = %self.def.table))]
    pub fn insert(&self, data: &RowMap) -> Result<RowMap> {
        let pairs = self.writable_pairs(data)?;
        let table = &self.def.table;
        let sql = if pairs.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", table)
        } else {
            let cols: Vec<&str> = pairs.iter().map(|(c, _)| *c).collect();
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                table,
                cols.join(", "),
                self.placeholders(1, pairs.len())
            )
        };
        let values: Vec<Value> = pairs.into_iter().map(|(_, v)| v).collect();

        let executor = self.executor();
        executor.execute(&sql, &values)?;

        let key = match data.get(&self.primary_col) {
            Some(v) if !v.is_blank() => v.clone(),
            _ => self.reported_insert_id()?,
        };
        tracing::debug!(key = %key, "Inserted row");

        let params = FetchParams::new()
            .filter(Conditions::new().and(
                self.primary_col.as_str(),
                Operator::Eq,
                key.clone(),
            ))
            .limit(1);
        if let Some(stored) = self.fetch_rows(&params)?.into_iter().next() {
            return Ok(stored);
        }

        // Key not readable back (e.g. no generated id): return what was written.
        let mut stored: RowMap = data
            .iter()
            .filter(|(col, _)| self.has_column(col))
            .map(|(col, v)| (col.clone(), v.clone()))
            .collect();
        stored.insert(self.primary_col.clone(), key);
        Ok(stored)
    }

    fn reported_insert_id(&self) -> Result<Value> {
        let executor = self.executor();
        let sequence = (executor.dialect() == Dialect::Postgres)
            .then(|| format!("{}_{}_seq", self.def.table, self.primary_col));
        executor.last_insert_id(sequence.as_deref())
    }

    /// Keys generated by the last statement, which wrote `count` rows.
    ///
    /// MySQL reports the first key of a multi-row INSERT, the others the
    /// last one. A driver that reports no integer key yields NULLs.
    fn generated_keys(&self, count: usize) -> Result<Vec<Value>> {
        let reported = self.reported_insert_id()?;
        let Some(reported) = reported.as_i64() else {
            tracing::warn!(table = %self.def.table, "Driver reported no generated key");
            return Ok(vec![Value::Null; count]);
        };
        let span = i64::try_from(count).unwrap_or(i64::MAX);
        let first = match self.dialect() {
            Dialect::Mysql => reported,
            _ => reported.saturating_sub(span.saturating_sub(1)),
        };
        Ok((0..span).map(|i| Value::BigInt(first.saturating_add(i))).collect())
    }

    /// Insert many rows, one multi-row INSERT per distinct column set.
    ///
    /// Returns the primary key of every row, in input order. A blank key is
    /// not written and the generated one is taken from the driver instead;
    /// rows of one statement get consecutive keys. NULL marks a key the
    /// driver could not report.
    #[tracing::instrument(
        level = "debug",
        skip(self, rows),
        fields(table = %self.def.table, rows = rows.len())
    )]
    pub fn insert_many(&self, rows: &[RowMap]) -> Result<Vec<Value>> {
        let mut groups: IndexMap<Vec<&str>, Vec<(usize, Vec<Value>)>> = IndexMap::new();
        for (index, row) in rows.iter().enumerate() {
            let (cols, values): (Vec<&str>, Vec<Value>) = self
                .writable_pairs(row)?
                .into_iter()
                .filter(|(col, value)| *col != self.primary_col || !value.is_blank())
                .unzip();
            groups.entry(cols).or_default().push((index, values));
        }

        let executor = self.executor();
        let table = &self.def.table;
        let mut keys = vec![Value::Null; rows.len()];
        let mut written = 0;
        for (cols, group) in groups {
            let key_at = cols.iter().position(|c| *c == self.primary_col);
            if cols.is_empty() {
                let sql = format!("INSERT INTO {} DEFAULT VALUES", table);
                for (index, _) in &group {
                    written += executor.execute(&sql, &[])?;
                    keys[*index] = self.generated_keys(1)?.pop().unwrap_or(Value::Null);
                }
                continue;
            }

            let mut tuples = Vec::with_capacity(group.len());
            let mut params = Vec::with_capacity(group.len() * cols.len());
            let mut indices = Vec::with_capacity(group.len());
            for (index, values) in group {
                if let Some(at) = key_at {
                    keys[index] = values[at].clone();
                }
                tuples.push(format!("({})", self.placeholders(params.len() + 1, values.len())));
                params.extend(values);
                indices.push(index);
            }
            let sql = format!(
                "INSERT INTO {} ({}) VALUES {}",
                table,
                cols.join(", "),
                tuples.join(", ")
            );
            written += executor.execute(&sql, &params)?;
            if key_at.is_none() {
                for (index, key) in indices.into_iter().zip(self.generated_keys(tuples.len())?) {
                    keys[index] = key;
                }
            }
        }
        tracing::debug!(written, "Bulk insert complete");
        Ok(keys)
    }

    /// `UPDATE table SET cols_to_save WHERE cols_to_match`.
    ///
    /// Returns `None` without touching the database when no table column is
    /// being saved. An empty `cols_to_match` updates every row.
    #[tracing::instrument(
        level = "debug",
        skip(self, cols_to_save, cols_to_match),
        fields(table = %self.def.table)
    )]
    pub fn update_matching(
        &self,
        cols_to_save: &RowMap,
        cols_to_match: &RowMap,
    ) -> Result<Option<u64>> {
        let pairs = self.writable_pairs(cols_to_save)?;
        if pairs.is_empty() {
            return Ok(None);
        }
        let executor = self.executor();
        let dialect = executor.dialect();

        let mut sql = format!("UPDATE {} SET ", self.def.table);
        let assignments: Vec<String> = pairs
            .iter()
            .enumerate()
            .map(|(i, (col, _))| format!("{} = {}", col, dialect.placeholder(i + 1)))
            .collect();
        sql.push_str(&assignments.join(", "));
        let mut params: Vec<Value> = pairs.into_iter().map(|(_, v)| v).collect();

        if !cols_to_match.is_empty() {
            let compiled = Conditions::matching(cols_to_match).compile(executor, params.len())?;
            sql.push_str(" WHERE ");
            sql.push_str(&compiled.sql);
            params.extend(compiled.params);
        }

        let affected = executor.execute(&sql, &params)?;
        tracing::debug!(affected, "Updated rows");
        Ok(Some(affected))
    }

    /// `DELETE FROM table WHERE cols_to_match`.
    ///
    /// Returns `None` without touching the database when `cols_to_match` is
    /// empty.
    #[tracing::instrument(level = "debug", skip(self, cols_to_match), fields(table = %self.def.table))]
    pub fn delete_matching(&self, cols_to_match: &RowMap) -> Result<Option<u64>> {
        if cols_to_match.is_empty() {
            return Ok(None);
        }
        let executor = self.executor();
        let compiled = Conditions::matching(cols_to_match).compile(executor, 0)?;
        let sql = format!("DELETE FROM {} WHERE {}", self.def.table, compiled.sql);
        let affected = executor.execute(&sql, &compiled.params)?;
        tracing::debug!(affected, "Deleted rows");
        Ok(Some(affected))
    }

    /// Key identifying the stored row of `record`: the snapshot's key when
    /// one was loaded, so a changed key still finds the old row.
    fn stored_key(&self, record: &Record) -> Option<Value> {
        record
            .initial_data()
            .get(&self.primary_col)
            .filter(|v| !v.is_blank())
            .or_else(|| record.data().get(&self.primary_col))
            .filter(|v| !v.is_blank())
            .cloned()
    }

    /// Write the changed table columns of `record`. Returns the affected
    /// row count; 0 when nothing changed or the record has no key.
    pub fn update_specified_record(&self, record: &Record) -> Result<u64> {
        let changed: RowMap = record
            .data()
            .iter()
            .filter(|(col, _)| self.has_column(col) && record.is_changed(col))
            .map(|(col, v)| (col.clone(), v.clone()))
            .collect();
        if changed.is_empty() {
            return Ok(0);
        }
        let Some(key) = self.stored_key(record) else {
            tracing::debug!(table = %self.def.table, "Record has no key, not updating");
            return Ok(0);
        };
        let mut matching = RowMap::new();
        matching.insert(self.primary_col.clone(), key);
        Ok(self.update_matching(&changed, &matching)?.unwrap_or(0))
    }

    /// Delete the stored row of `record`. A record without a key deletes
    /// nothing and runs no SQL.
    pub fn delete_specified_record(&self, record: &Record) -> Result<u64> {
        let Some(key) = self.stored_key(record) else {
            return Ok(0);
        };
        let mut matching = RowMap::new();
        matching.insert(self.primary_col.clone(), key);
        Ok(self.delete_matching(&matching)?.unwrap_or(0))
    }
}
