//! leanorm: map-driven, ActiveRecord-style data access.
//!
//! A [`Database`] wraps one [`Executor`] and one [`SchemaIntrospector`].
//! Models are bound from it by name, fetch with a [`FetchParams`] map and
//! hand back [`Record`]s, [`Collection`]s or plain rows:
//!
//! - [`Record`] tracks changes against a snapshot and saves itself
//! - [`ReadOnlyRecord`] has the same read side and no mutators
//! - [`Collection`] holds records under stable keys, with bulk save/delete
//! - relations declared on a [`ModelDef`] load lazily per record or eagerly
//!   for a whole result set with one query per relation
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use leanorm::prelude::*;
//! use leanorm_sqlite::SqliteConnection;
//!
//! let conn = Arc::new(SqliteConnection::open_memory()?);
//! let db = Arc::new(Database::from_connection(conn));
//! db.register(
//!     ModelDef::new("posts")
//!         .relation(RelationDef::has_many("comments", "comments", "post_id", "id")),
//! );
//!
//! let posts = db.model("posts")?;
//! let recent = posts.fetch_all(
//!     &FetchParams::new()
//!         .filter(Conditions::new().and("published", Operator::Eq, true))
//!         .order_by(["created_at DESC"])
//!         .limit(10)
//!         .include(["comments"]),
//! )?;
//! for (_, post) in recent.iter() {
//!     let comments = post.get_related("comments").map_or(0, Related::len);
//!     println!("{} has {} comments", post.data()["title"], comments);
//! }
//! ```

pub mod collection;
pub mod db;
pub mod loader;
pub mod model;
pub mod record;
pub mod registry;
pub mod relation;

#[cfg(test)]
mod testing;

pub use collection::{BulkOutcome, Collection, Key};
pub use db::{Database, ModelDef, TableSchema};
pub use loader::{RelationHost, load_relation};
pub use model::Model;
pub use record::{FetchedRow, Property, ReadOnlyRecord, Record, RecordAccess, Related, SaveOutcome};
pub use registry::{ConnectionRegistry, DEFAULT_CONNECTION};
pub use relation::{JoinTable, RecordKind, RelationDef, RelationKind};

pub use leanorm_core::{
    ColumnSpec, Dialect, Error, Executor, NotFoundKind, Result, Row, RowMap, SchemaIntrospector,
    Value,
};
pub use leanorm_query::{Conditions, FetchParams, Join, JoinType, Operator, ParamKey, SelectBuilder};

/// Everything needed for everyday use.
pub mod prelude {
    pub use crate::{
        BulkOutcome, Collection, ColumnSpec, Conditions, ConnectionRegistry, DEFAULT_CONNECTION,
        Database, Error, Executor, FetchParams, FetchedRow, JoinTable, Key, Model, ModelDef,
        Operator, Property, ReadOnlyRecord, Record, RecordAccess, RecordKind, Related,
        RelationDef, RelationKind, Result, RowMap, SaveOutcome, Value,
    };
}
