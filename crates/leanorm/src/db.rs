//! The database handle: one executor, one introspector, model definitions
//! and a per-table column cache.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use indexmap::IndexMap;
use leanorm_core::{ColumnSpec, Error, Executor, NotFoundKind, Result, SchemaIntrospector};

use crate::model::Model;
use crate::relation::{RecordKind, RelationDef};

/// Static description of a model: its table, key and relations.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelDef {
    /// Registry name; defaults to the table name
    pub name: String,
    pub table: String,
    /// Overrides the primary key reported by the introspector
    pub primary_col: Option<String>,
    pub relations: IndexMap<String, RelationDef>,
    /// Record type produced when this model is the target of a relation
    pub record_kind: RecordKind,
}

impl ModelDef {
    pub fn new(table: impl Into<String>) -> Self {
        let table = table.into();
        Self {
            name: table.clone(),
            table,
            primary_col: None,
            relations: IndexMap::new(),
            record_kind: RecordKind::Writable,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn primary_col(mut self, col: impl Into<String>) -> Self {
        self.primary_col = Some(col.into());
        self
    }

    /// Declare a relation. A later declaration with the same name replaces
    /// the earlier one.
    pub fn relation(mut self, relation: RelationDef) -> Self {
        self.relations.insert(relation.name.clone(), relation);
        self
    }

    pub fn read_only(mut self) -> Self {
        self.record_kind = RecordKind::ReadOnly;
        self
    }
}

/// Columns of one table, in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    table: String,
    columns: IndexMap<String, ColumnSpec>,
}

impl TableSchema {
    pub fn new(table: impl Into<String>, columns: Vec<ColumnSpec>) -> Self {
        Self {
            table: table.into(),
            columns: columns.into_iter().map(|c| (c.name.clone(), c)).collect(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.get(name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn columns(&self) -> impl Iterator<Item = &ColumnSpec> {
        self.columns.values()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// First column flagged as primary key.
    pub fn primary_key(&self) -> Option<&ColumnSpec> {
        self.columns.values().find(|c| c.primary_key)
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// A connection-bound handle shared by every model, record and collection
/// created from it.
///
/// Column metadata is fetched once per table and cached for the life of
/// the handle.
pub struct Database {
    executor: Arc<dyn Executor>,
    introspector: Arc<dyn SchemaIntrospector>,
    models: RwLock<IndexMap<String, Arc<ModelDef>>>,
    schemas: Mutex<HashMap<String, Arc<TableSchema>>>,
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let models = self.models.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("Database")
            .field("dialect", &self.executor.dialect())
            .field("models", &models.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Database {
    pub fn new(executor: Arc<dyn Executor>, introspector: Arc<dyn SchemaIntrospector>) -> Self {
        Self {
            executor,
            introspector,
            models: RwLock::new(IndexMap::new()),
            schemas: Mutex::new(HashMap::new()),
        }
    }

    /// Use one driver handle as both executor and introspector.
    pub fn from_connection<C>(conn: Arc<C>) -> Self
    where
        C: Executor + SchemaIntrospector + 'static,
    {
        let executor: Arc<dyn Executor> = conn.clone();
        let introspector: Arc<dyn SchemaIntrospector> = conn;
        Self::new(executor, introspector)
    }

    pub fn executor(&self) -> &Arc<dyn Executor> {
        &self.executor
    }

    /// Register a model definition under its name, replacing any previous one.
    pub fn register(&self, def: ModelDef) {
        tracing::debug!(model = %def.name, table = %def.table, "Registering model");
        let mut models = self.models.write().unwrap_or_else(PoisonError::into_inner);
        models.insert(def.name.clone(), Arc::new(def));
    }

    pub fn model_def(&self, name: &str) -> Option<Arc<ModelDef>> {
        let models = self.models.read().unwrap_or_else(PoisonError::into_inner);
        models.get(name).cloned()
    }

    pub fn model_names(&self) -> Vec<String> {
        let models = self.models.read().unwrap_or_else(PoisonError::into_inner);
        models.keys().cloned().collect()
    }

    /// Bind a model by name.
    ///
    /// An unregistered name is treated as a bare table with no relations.
    /// Fails with a not-found error when the table has no columns.
    pub fn model(self: &Arc<Self>, name: &str) -> Result<Model> {
        let def = self
            .model_def(name)
            .unwrap_or_else(|| Arc::new(ModelDef::new(name)));
        Model::new(Arc::clone(self), def)
    }

    /// Columns of `table`, introspected on first use.
    pub fn table_schema(&self, table: &str) -> Result<Arc<TableSchema>> {
        if let Some(schema) = self.cached_schema(table) {
            return Ok(schema);
        }

        let columns = self.introspector.fetch_table_columns(table)?;
        if columns.is_empty() {
            return Err(Error::not_found(NotFoundKind::Table, table));
        }
        tracing::debug!(table, columns = columns.len(), "Introspected table");

        let schema = Arc::new(TableSchema::new(table, columns));
        let mut schemas = self.schemas.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(
            schemas.entry(table.to_string()).or_insert(schema),
        ))
    }

    fn cached_schema(&self, table: &str) -> Option<Arc<TableSchema>> {
        let schemas = self.schemas.lock().unwrap_or_else(PoisonError::into_inner);
        schemas.get(table).cloned()
    }

    /// Drop cached columns so the next use re-introspects `table`.
    pub fn forget_schema(&self, table: &str) -> bool {
        let mut schemas = self.schemas.lock().unwrap_or_else(PoisonError::into_inner);
        schemas.remove(table).is_some()
    }
}
