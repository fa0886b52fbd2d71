//! Named database handles.
//!
//! A [`ConnectionRegistry`] maps names to factories. The first lookup of a
//! name runs its factory and caches the handle; later lookups share it.
//!
//! ```rust,ignore
//! let registry = ConnectionRegistry::new();
//! registry.register(DEFAULT_CONNECTION, || {
//!     let conn = Arc::new(SqliteConnection::open_memory()?);
//!     Ok(Database::from_connection(conn))
//! });
//! let db = registry.default_database()?;
//! ```
//!
//! Pass the registry to the code that needs it. [`ConnectionRegistry::global`]
//! exists for programs that prefer one process-wide instance.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock};

use indexmap::IndexMap;
use leanorm_core::{ConnectionError, ConnectionErrorKind, Error, Result};

use crate::db::Database;

/// Name used when no connection name is given.
pub const DEFAULT_CONNECTION: &str = "default";

type Factory = Arc<dyn Fn() -> Result<Database> + Send + Sync>;

static GLOBAL_REGISTRY: OnceLock<ConnectionRegistry> = OnceLock::new();

#[derive(Default)]
pub struct ConnectionRegistry {
    factories: RwLock<IndexMap<String, Factory>>,
    instances: Mutex<HashMap<String, Arc<Database>>>,
}

impl fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("names", &self.names())
            .finish_non_exhaustive()
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> &'static ConnectionRegistry {
        GLOBAL_REGISTRY.get_or_init(ConnectionRegistry::new)
    }

    /// Register a factory under `name`. Replaces any previous factory and
    /// drops a cached handle of the same name.
    pub fn register<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Result<Database> + Send + Sync + 'static,
    {
        let name = name.into();
        tracing::debug!(connection = %name, "Registering connection factory");
        self.instances
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&name);
        self.factories
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, Arc::new(factory));
    }

    /// Register an already open handle under `name`.
    pub fn register_database(&self, name: impl Into<String>, db: Arc<Database>) {
        let name = name.into();
        tracing::debug!(connection = %name, "Registering database handle");
        self.instances
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, db);
    }

    /// The handle registered under `name`, created on first use.
    pub fn get(&self, name: &str) -> Result<Arc<Database>> {
        if let Some(db) = self
            .instances
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
        {
            return Ok(Arc::clone(db));
        }

        let factory = self
            .factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| {
                Error::Connection(ConnectionError {
                    kind: ConnectionErrorKind::UnknownName,
                    message: format!("no connection registered under '{}'", name),
                    source: None,
                })
            })?;

        tracing::debug!(connection = name, "Opening connection");
        let db = Arc::new(factory()?);
        let mut instances = self.instances.lock().unwrap_or_else(PoisonError::into_inner);
        // Another caller may have opened it meanwhile; keep the first.
        Ok(Arc::clone(instances.entry(name.to_string()).or_insert(db)))
    }

    pub fn default_database(&self) -> Result<Arc<Database>> {
        self.get(DEFAULT_CONNECTION)
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
            || self
                .instances
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .contains_key(name)
    }

    /// Registered names: factories in registration order, then handles
    /// registered directly.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        let instances = self.instances.lock().unwrap_or_else(PoisonError::into_inner);
        let mut extra: Vec<&String> = instances.keys().filter(|n| !names.contains(*n)).collect();
        extra.sort();
        names.extend(extra.into_iter().cloned());
        names
    }

    /// Forget `name` and its cached handle.
    pub fn remove(&self, name: &str) -> bool {
        let factory = self
            .factories
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .shift_remove(name)
            .is_some();
        let instance = self
            .instances
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .is_some();
        factory || instance
    }
}
