use crate::connection::DataSource;
use crate::error::DbError;
use crate::relational;
use chrono::Utc;
use core_types::{Model, Related, Relation, RelationKind};
use serde_json::{Map, Value};
use std::future::Future;
use uuid::Uuid;

/// Persistence operations shared by every model.
///
/// Implemented for all `Model`s; bring the trait into scope and call
/// `user.save(&db)`, `User::get(&db, id)` and so on. Each operation dispatches
/// on the `DataSource` variant.
pub trait ActiveRecord: Model {
    /// Inserts a transient record or updates a persisted one, stamping the timestamps.
    fn save(&mut self, db: &DataSource) -> impl Future<Output = Result<(), DbError>> + Send;

    /// Creates the record and back-fills the id the store generated.
    fn insert(&mut self, db: &DataSource) -> impl Future<Output = Result<(), DbError>> + Send;

    /// Pushes the whole record over the stored one with the same id.
    fn update(&mut self, db: &DataSource) -> impl Future<Output = Result<(), DbError>> + Send;

    /// Deletes by id. True only when a stored record was actually removed.
    fn delete(&self, db: &DataSource) -> impl Future<Output = Result<bool, DbError>> + Send;

    /// Deletes the record stored under `id` without loading it first.
    fn delete_by_id(db: &DataSource, id: Uuid) -> impl Future<Output = Result<bool, DbError>> + Send;

    /// Loads the records a named association points at.
    fn get_related<R: Model>(
        &self,
        db: &DataSource,
        relation: &str,
    ) -> impl Future<Output = Result<Related<R>, DbError>> + Send;

    /// Replaces a named association. A `BelongsTo` foreign key on this record
    /// is updated in place as well.
    fn set_related<R: Model>(
        &mut self,
        db: &DataSource,
        relation: &str,
        related: &[R],
    ) -> impl Future<Output = Result<(), DbError>> + Send;

    fn get(db: &DataSource, id: Uuid) -> impl Future<Output = Result<Option<Self>, DbError>> + Send;

    /// Every stored record, oldest first.
    fn get_all(db: &DataSource) -> impl Future<Output = Result<Vec<Self>, DbError>> + Send;

    /// Runs raw SQL on the relational backend, returning one JSON object per row.
    ///
    /// Queries and `RETURNING` statements yield their rows; any other statement
    /// runs as is and yields none. The string is not parameterized; never build
    /// it from untrusted input. The document backend ignores `raw` and returns
    /// the whole collection.
    fn query(db: &DataSource, raw: &str) -> impl Future<Output = Result<Vec<Value>, DbError>> + Send;
}

impl<T: Model> ActiveRecord for T {
    async fn save(&mut self, db: &DataSource) -> Result<(), DbError> {
        let now = Utc::now();
        if self.meta().is_transient() {
            self.meta_mut().mark_created(now);
            self.insert(db).await
        } else {
            self.meta_mut().mark_updated(now);
            self.update(db).await
        }
    }

    async fn insert(&mut self, db: &DataSource) -> Result<(), DbError> {
        if self.meta().created_at.is_none() {
            self.meta_mut().mark_created(Utc::now());
        }
        let fields = to_fields(self)?;

        let id = match db {
            DataSource::Relational(pool) => {
                relational::insert(pool, Self::TABLE, &Self::writable_columns(), &fields).await?
            }
            DataSource::Document(store) => store.insert(Self::TABLE, fields)?,
        };

        self.meta_mut().id = Some(id);
        tracing::debug!(table = Self::TABLE, %id, "Inserted record.");
        Ok(())
    }

    async fn update(&mut self, db: &DataSource) -> Result<(), DbError> {
        let id = self.id().ok_or(DbError::MissingId { table: Self::TABLE })?;
        let fields = to_fields(self)?;

        match db {
            DataSource::Relational(pool) => {
                let found = relational::update(pool, Self::TABLE, &Self::writable_columns(), id, &fields).await?;
                if !found {
                    return Err(DbError::NotFound { table: Self::TABLE, id });
                }
            }
            DataSource::Document(store) => store.update(Self::TABLE, id, fields)?,
        }

        tracing::debug!(table = Self::TABLE, %id, "Updated record.");
        Ok(())
    }

    async fn delete(&self, db: &DataSource) -> Result<bool, DbError> {
        match self.id() {
            Some(id) => Self::delete_by_id(db, id).await,
            None => Ok(false),
        }
    }

    async fn delete_by_id(db: &DataSource, id: Uuid) -> Result<bool, DbError> {
        let removed = match db {
            DataSource::Relational(pool) => relational::delete(pool, Self::TABLE, id).await?,
            DataSource::Document(store) => store.remove(Self::TABLE, id)?,
        };

        tracing::debug!(table = Self::TABLE, %id, removed, "Deleted record.");
        Ok(removed)
    }

    async fn get_related<R: Model>(&self, db: &DataSource, relation: &str) -> Result<Related<R>, DbError> {
        let relation = resolve::<Self, R>(relation)?;
        let id = self.id().ok_or(DbError::MissingId { table: Self::TABLE })?;

        let rows = match db {
            DataSource::Relational(pool) => {
                relational::related(pool, Self::TABLE, relation.target, relation.kind, id).await?
            }
            DataSource::Document(store) => {
                let ids = store.related_ids(Self::TABLE, relation.target, relation.kind, id)?;
                store
                    .find_many(relation.target, &ids)?
                    .into_iter()
                    .map(Value::Object)
                    .collect()
            }
        };

        let mut records = rows
            .into_iter()
            .map(serde_json::from_value::<R>)
            .collect::<Result<Vec<_>, _>>()?;

        if relation.is_to_one() {
            Ok(Related::One(records.pop()))
        } else {
            Ok(Related::Many(records))
        }
    }

    async fn set_related<R: Model>(
        &mut self,
        db: &DataSource,
        relation: &str,
        related: &[R],
    ) -> Result<(), DbError> {
        let relation = resolve::<Self, R>(relation)?;
        let id = self.id().ok_or(DbError::MissingId { table: Self::TABLE })?;

        let mut ids: Vec<Uuid> = Vec::with_capacity(related.len());
        for record in related {
            let target_id = record.id().ok_or(DbError::MissingId { table: R::TABLE })?;
            if !ids.contains(&target_id) {
                ids.push(target_id);
            }
        }
        if relation.is_to_one() && ids.len() > 1 {
            return Err(DbError::Cardinality {
                relation: relation.name,
                got: ids.len(),
            });
        }

        match db {
            DataSource::Relational(pool) => {
                relational::set_related(pool, Self::TABLE, relation.target, relation.kind, id, &ids).await?
            }
            DataSource::Document(store) => {
                store.set_related_ids(Self::TABLE, relation.target, relation.kind, id, &ids)?
            }
        }

        if let RelationKind::BelongsTo { foreign_key } = relation.kind {
            let value = ids
                .first()
                .map_or(Value::Null, |target_id| Value::String(target_id.to_string()));
            patch_field(self, foreign_key, value)?;
        }

        tracing::debug!(table = Self::TABLE, %id, relation = relation.name, count = ids.len(), "Replaced association.");
        Ok(())
    }

    async fn get(db: &DataSource, id: Uuid) -> Result<Option<Self>, DbError> {
        let row = match db {
            DataSource::Relational(pool) => relational::find(pool, Self::TABLE, id).await?,
            DataSource::Document(store) => store.find(Self::TABLE, id)?.map(Value::Object),
        };
        Ok(row.map(serde_json::from_value).transpose()?)
    }

    async fn get_all(db: &DataSource) -> Result<Vec<Self>, DbError> {
        let rows = match db {
            DataSource::Relational(pool) => relational::find_all(pool, Self::TABLE).await?,
            DataSource::Document(store) => store
                .find_all(Self::TABLE)?
                .into_iter()
                .map(Value::Object)
                .collect(),
        };
        Ok(rows
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn query(db: &DataSource, raw: &str) -> Result<Vec<Value>, DbError> {
        match db {
            DataSource::Relational(pool) => relational::raw_query(pool, raw).await,
            DataSource::Document(store) => {
                tracing::warn!(
                    collection = Self::collection_name(),
                    query = raw,
                    "The document backend ignores query strings; returning the full collection."
                );
                Ok(store
                    .find_all(Self::TABLE)?
                    .into_iter()
                    .map(Value::Object)
                    .collect())
            }
        }
    }
}

/// Looks up `name` on `S` and checks that it points at `R`'s table.
fn resolve<S: Model, R: Model>(name: &str) -> Result<&'static Relation, DbError> {
    let relation = S::relation(name).ok_or_else(|| DbError::UnknownRelation {
        table: S::TABLE,
        relation: name.to_string(),
    })?;
    if relation.target != R::TABLE {
        return Err(DbError::TargetMismatch {
            relation: relation.name,
            expected: relation.target,
            actual: R::TABLE,
        });
    }
    Ok(relation)
}

fn to_fields<T: Model>(record: &T) -> Result<Map<String, Value>, DbError> {
    match serde_json::to_value(record)? {
        Value::Object(fields) => Ok(fields),
        _ => Err(DbError::Malformed {
            table: T::TABLE,
            reason: "model does not serialize to a JSON object".to_string(),
        }),
    }
}

// Rewrites one serialized field, leaving records that lack it untouched.
fn patch_field<T: Model>(record: &mut T, key: &str, value: Value) -> Result<(), DbError> {
    let mut fields = to_fields(record)?;
    if fields.contains_key(key) {
        fields.insert(key.to_string(), value);
        *record = serde_json::from_value(Value::Object(fields))?;
    }
    Ok(())
}
