//! Declared associations between models.

use std::fmt;

use leanorm_query::FetchParams;
use serde::{Deserialize, Serialize};

/// The four association shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RelationKind {
    BelongsTo,
    HasOne,
    HasMany,
    HasManyThrough,
}

impl RelationKind {
    /// Does each parent hold a list of foreign rows?
    pub const fn is_to_many(self) -> bool {
        matches!(self, RelationKind::HasMany | RelationKind::HasManyThrough)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            RelationKind::BelongsTo => "belongs-to",
            RelationKind::HasOne => "has-one",
            RelationKind::HasMany => "has-many",
            RelationKind::HasManyThrough => "has-many-through",
        }
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which record type related rows are wrapped in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecordKind {
    #[default]
    Writable,
    ReadOnly,
}

/// The association table of a has-many-through relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinTable {
    pub table: String,
    /// Column holding the owning table's key
    pub col_linked_to_my_table: String,
    /// Column holding the foreign table's key
    pub col_linked_to_foreign_table: String,
}

impl JoinTable {
    pub fn new(
        table: impl Into<String>,
        col_linked_to_my_table: impl Into<String>,
        col_linked_to_foreign_table: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            col_linked_to_my_table: col_linked_to_my_table.into(),
            col_linked_to_foreign_table: col_linked_to_foreign_table.into(),
        }
    }
}

/// One declared relation of a model.
///
/// Parents match foreign rows where
/// `my_table.foreign_key_col_in_my_table = foreign_table.foreign_key_col_in_foreign_table`
/// (through the join table for has-many-through).
///
/// ```ignore
/// // posts.author_id -> authors.id
/// RelationDef::belongs_to("author", "authors", "id", "author_id");
/// // posts.id <- comments.post_id
/// RelationDef::has_many("comments", "comments", "post_id", "id")
///     .constraints(FetchParams::new().order_by(["created_at"]));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RelationDef {
    pub name: String,
    pub kind: RelationKind,
    pub foreign_table: String,
    pub foreign_key_col_in_foreign_table: String,
    pub foreign_key_col_in_my_table: String,
    /// Registered model used to wrap foreign rows; defaults to `foreign_table`
    pub foreign_model: String,
    pub foreign_record_kind: RecordKind,
    /// Wrap foreign rows in records unless a caller overrides it
    pub wrap_in_records: bool,
    /// Extra fetch params applied to the relation query
    pub constraints: FetchParams,
    pub join_table: Option<JoinTable>,
}

impl RelationDef {
    pub fn new(
        name: impl Into<String>,
        kind: RelationKind,
        foreign_table: impl Into<String>,
        foreign_key_col_in_foreign_table: impl Into<String>,
        foreign_key_col_in_my_table: impl Into<String>,
    ) -> Self {
        let foreign_table = foreign_table.into();
        Self {
            name: name.into(),
            kind,
            foreign_model: foreign_table.clone(),
            foreign_table,
            foreign_key_col_in_foreign_table: foreign_key_col_in_foreign_table.into(),
            foreign_key_col_in_my_table: foreign_key_col_in_my_table.into(),
            foreign_record_kind: RecordKind::Writable,
            wrap_in_records: true,
            constraints: FetchParams::new(),
            join_table: None,
        }
    }

    pub fn belongs_to(
        name: impl Into<String>,
        foreign_table: impl Into<String>,
        foreign_key_col_in_foreign_table: impl Into<String>,
        foreign_key_col_in_my_table: impl Into<String>,
    ) -> Self {
        Self::new(
            name,
            RelationKind::BelongsTo,
            foreign_table,
            foreign_key_col_in_foreign_table,
            foreign_key_col_in_my_table,
        )
    }

    pub fn has_one(
        name: impl Into<String>,
        foreign_table: impl Into<String>,
        foreign_key_col_in_foreign_table: impl Into<String>,
        foreign_key_col_in_my_table: impl Into<String>,
    ) -> Self {
        Self::new(
            name,
            RelationKind::HasOne,
            foreign_table,
            foreign_key_col_in_foreign_table,
            foreign_key_col_in_my_table,
        )
    }

    pub fn has_many(
        name: impl Into<String>,
        foreign_table: impl Into<String>,
        foreign_key_col_in_foreign_table: impl Into<String>,
        foreign_key_col_in_my_table: impl Into<String>,
    ) -> Self {
        Self::new(
            name,
            RelationKind::HasMany,
            foreign_table,
            foreign_key_col_in_foreign_table,
            foreign_key_col_in_my_table,
        )
    }

    pub fn has_many_through(
        name: impl Into<String>,
        foreign_table: impl Into<String>,
        foreign_key_col_in_foreign_table: impl Into<String>,
        foreign_key_col_in_my_table: impl Into<String>,
        join_table: JoinTable,
    ) -> Self {
        let mut def = Self::new(
            name,
            RelationKind::HasManyThrough,
            foreign_table,
            foreign_key_col_in_foreign_table,
            foreign_key_col_in_my_table,
        );
        def.join_table = Some(join_table);
        def
    }

    pub fn foreign_model(mut self, model: impl Into<String>) -> Self {
        self.foreign_model = model.into();
        self
    }

    /// Wrap related rows in read-only records.
    pub fn read_only(mut self) -> Self {
        self.foreign_record_kind = RecordKind::ReadOnly;
        self
    }

    pub fn wrap_in_records(mut self, wrap: bool) -> Self {
        self.wrap_in_records = wrap;
        self
    }

    /// Extra where/order/cols/group/having for the relation query.
    ///
    /// `limit_size`, `limit_offset` and `relations_to_include` are ignored.
    pub fn constraints(mut self, params: FetchParams) -> Self {
        self.constraints = params;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_default_to_foreign_table_model() {
        let rel = RelationDef::belongs_to("author", "authors", "id", "author_id");
        assert_eq!(rel.kind, RelationKind::BelongsTo);
        assert_eq!(rel.foreign_model, "authors");
        assert!(rel.wrap_in_records);
        assert_eq!(rel.foreign_record_kind, RecordKind::Writable);
        assert!(rel.join_table.is_none());
    }

    #[test]
    fn through_carries_join_table() {
        let rel = RelationDef::has_many_through(
            "tags",
            "tags",
            "id",
            "id",
            JoinTable::new("post_tags", "post_id", "tag_id"),
        )
        .foreign_model("tag")
        .read_only()
        .wrap_in_records(false);
        assert!(rel.kind.is_to_many());
        assert_eq!(rel.foreign_model, "tag");
        assert_eq!(rel.foreign_record_kind, RecordKind::ReadOnly);
        assert!(!rel.wrap_in_records);
        assert_eq!(
            rel.join_table.as_ref().map(|j| j.col_linked_to_foreign_table.as_str()),
            Some("tag_id")
        );
    }

    #[test]
    fn kind_names() {
        assert_eq!(RelationKind::HasManyThrough.to_string(), "has-many-through");
        assert!(!RelationKind::HasOne.is_to_many());
        let parsed: RelationKind = serde_json::from_str("\"belongs-to\"").unwrap();
        assert_eq!(parsed, RelationKind::BelongsTo);
    }
}
