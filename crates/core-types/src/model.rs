use crate::record::RecordMeta;
use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

/// Timestamp columns shared by every table, written alongside a model's own columns.
pub const META_COLUMNS: [&str; 2] = ["created_at", "updated_at"];

/// How a named association is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// This record holds the target id in `foreign_key`.
    BelongsTo { foreign_key: &'static str },
    /// Target records hold this record's id in `foreign_key`.
    HasMany { foreign_key: &'static str },
    /// Link rows in `join_table` pair `source_key` (this id) with `target_key`.
    ManyToMany {
        join_table: &'static str,
        source_key: &'static str,
        target_key: &'static str,
    },
}

/// A named association from one model to the table of another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relation {
    pub name: &'static str,
    pub target: &'static str,
    pub kind: RelationKind,
}

impl Relation {
    pub const fn belongs_to(name: &'static str, target: &'static str, foreign_key: &'static str) -> Self {
        Self {
            name,
            target,
            kind: RelationKind::BelongsTo { foreign_key },
        }
    }

    pub const fn has_many(name: &'static str, target: &'static str, foreign_key: &'static str) -> Self {
        Self {
            name,
            target,
            kind: RelationKind::HasMany { foreign_key },
        }
    }

    pub const fn many_to_many(
        name: &'static str,
        target: &'static str,
        join_table: &'static str,
        source_key: &'static str,
        target_key: &'static str,
    ) -> Self {
        Self {
            name,
            target,
            kind: RelationKind::ManyToMany {
                join_table,
                source_key,
                target_key,
            },
        }
    }

    /// True for associations that resolve to at most one record.
    pub fn is_to_one(&self) -> bool {
        matches!(self.kind, RelationKind::BelongsTo { .. })
    }
}

/// The records an association resolved to.
#[derive(Debug, Clone, PartialEq)]
pub enum Related<T> {
    One(Option<T>),
    Many(Vec<T>),
}

impl<T> Related<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Related::One(one) => one.into_iter().collect(),
            Related::Many(many) => many,
        }
    }

    /// The single related record, or the first of many.
    pub fn into_one(self) -> Option<T> {
        match self {
            Related::One(one) => one,
            Related::Many(many) => many.into_iter().next(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Related::One(one) => usize::from(one.is_some()),
            Related::Many(many) => many.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The metadata half of an active-record model.
///
/// Implementors are plain serde structs that flatten a [`RecordMeta`] and
/// declare where they live. The persistence operations are provided by the
/// `database` crate for every `Model`.
pub trait Model: Serialize + DeserializeOwned + Send + Sync + Unpin + 'static {
    /// Table name on the relational backend, collection name on the document backend.
    const TABLE: &'static str;

    /// The model's own columns, excluding `id` and the timestamp columns.
    const COLUMNS: &'static [&'static str];

    /// Named associations this model can resolve.
    const RELATIONS: &'static [Relation] = &[];

    fn meta(&self) -> &RecordMeta;

    fn meta_mut(&mut self) -> &mut RecordMeta;

    fn id(&self) -> Option<Uuid> {
        self.meta().id
    }

    fn table_name() -> &'static str {
        Self::TABLE
    }

    fn collection_name() -> &'static str {
        Self::TABLE
    }

    /// Every column written on insert or update.
    fn writable_columns() -> Vec<&'static str> {
        Self::COLUMNS.iter().copied().chain(META_COLUMNS).collect()
    }

    fn relation(name: &str) -> Option<&'static Relation> {
        Self::RELATIONS.iter().find(|relation| relation.name == name)
    }
}
