//! Document backend: JSON documents in an embedded `sled` database.
//!
//! Each collection is a sled tree keyed by the 16 id bytes. Associations keep
//! the same layout as the relational schema: a `BelongsTo` foreign key is a
//! field of the source document, `HasMany` is answered by scanning the target
//! collection for that field, and a `ManyToMany` join table is a tree whose
//! keys are `source id ++ target id`.

use crate::error::DbError;
use chrono::{DateTime, FixedOffset};
use core_types::RelationKind;
use serde_json::{Map, Value};
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionError, TransactionalTree,
};
use std::fmt;
use std::path::Path;
use uuid::Uuid;

pub type Document = Map<String, Value>;

/// A handle to the document database. Cloning is cheap and shares the same store.
#[derive(Clone)]
pub struct DocumentStore {
    db: sled::Db,
}

impl fmt::Debug for DocumentStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentStore")
            .field("collections", &self.db.tree_names().len())
            .finish()
    }
}

impl DocumentStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        Ok(Self {
            db: sled::open(path)?,
        })
    }

    /// A store that lives in a temporary directory and is removed on drop.
    pub fn temporary() -> Result<Self, DbError> {
        Ok(Self {
            db: sled::Config::new().temporary(true).open()?,
        })
    }

    pub fn flush(&self) -> Result<(), DbError> {
        self.db.flush()?;
        Ok(())
    }

    fn collection(&self, name: &str) -> Result<sled::Tree, DbError> {
        Ok(self.db.open_tree(name)?)
    }

    /// Stores a new document and returns its id, generating one unless the document carries it.
    ///
    /// An id that is already taken is a `Conflict`; the stored document is left alone.
    pub fn insert(&self, collection: &'static str, mut doc: Document) -> Result<Uuid, DbError> {
        let id = match doc.get("id") {
            Some(value) if !value.is_null() => parse_id(collection, value)?,
            _ => Uuid::new_v4(),
        };
        doc.insert("id".to_string(), Value::String(id.to_string()));
        self.collection(collection)?
            .compare_and_swap(id.as_bytes(), None as Option<&[u8]>, Some(serde_json::to_vec(&doc)?))?
            .map_err(|_| DbError::Conflict { table: collection, id })?;
        Ok(id)
    }

    /// Merges `fields` over the stored document, keeping fields it does not mention.
    pub fn update(&self, collection: &'static str, id: Uuid, fields: Document) -> Result<(), DbError> {
        self.collection(collection)?
            .transaction(|tx| merge_into(tx, collection, id, &fields))
            .map_err(from_transaction)
    }

    pub fn find(&self, collection: &'static str, id: Uuid) -> Result<Option<Document>, DbError> {
        self.collection(collection)?
            .get(id.as_bytes())?
            .map(|bytes| decode(collection, &bytes))
            .transpose()
    }

    pub fn exists(&self, collection: &'static str, id: Uuid) -> Result<bool, DbError> {
        Ok(self.collection(collection)?.contains_key(id.as_bytes())?)
    }

    /// Every document in the collection, oldest first.
    pub fn find_all(&self, collection: &'static str) -> Result<Vec<Document>, DbError> {
        let mut docs = self
            .collection(collection)?
            .iter()
            .map(|entry| {
                let (_, bytes) = entry?;
                decode(collection, &bytes)
            })
            .collect::<Result<Vec<_>, _>>()?;
        sort_by_creation(&mut docs);
        Ok(docs)
    }

    /// Looks up several ids at once; ids without a document are skipped.
    pub fn find_many(&self, collection: &'static str, ids: &[Uuid]) -> Result<Vec<Document>, DbError> {
        let tree = self.collection(collection)?;
        let mut docs = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(bytes) = tree.get(id.as_bytes())? {
                docs.push(decode(collection, &bytes)?);
            }
        }
        sort_by_creation(&mut docs);
        Ok(docs)
    }

    /// Removes a document; true when one was there.
    pub fn remove(&self, collection: &'static str, id: Uuid) -> Result<bool, DbError> {
        Ok(self.collection(collection)?.remove(id.as_bytes())?.is_some())
    }

    /// Resolves the ids an association currently points at.
    pub fn related_ids(
        &self,
        collection: &'static str,
        target: &'static str,
        kind: RelationKind,
        id: Uuid,
    ) -> Result<Vec<Uuid>, DbError> {
        let source = self
            .find(collection, id)?
            .ok_or(DbError::NotFound { table: collection, id })?;

        match kind {
            RelationKind::BelongsTo { foreign_key } => match source.get(foreign_key) {
                None | Some(Value::Null) => Ok(Vec::new()),
                Some(value) => Ok(vec![parse_id(collection, value)?]),
            },
            RelationKind::HasMany { foreign_key } => {
                let owner = Value::String(id.to_string());
                self.find_all(target)?
                    .iter()
                    .filter(|doc| doc.get(foreign_key) == Some(&owner))
                    .map(|doc| document_id(target, doc))
                    .collect()
            }
            RelationKind::ManyToMany { join_table, .. } => self
                .collection(join_table)?
                .scan_prefix(id.as_bytes())
                .keys()
                .map(|key| {
                    let key = key?;
                    Uuid::from_slice(&key[16..]).map_err(|e| DbError::Malformed {
                        table: join_table,
                        reason: e.to_string(),
                    })
                })
                .collect(),
        }
    }

    /// Points an association at exactly `ids`.
    pub fn set_related_ids(
        &self,
        collection: &'static str,
        target: &'static str,
        kind: RelationKind,
        id: Uuid,
        ids: &[Uuid],
    ) -> Result<(), DbError> {
        if !self.exists(collection, id)? {
            return Err(DbError::NotFound { table: collection, id });
        }

        match kind {
            RelationKind::BelongsTo { foreign_key } => {
                self.ensure_exist(target, ids)?;
                let value = ids
                    .first()
                    .map_or(Value::Null, |target_id| Value::String(target_id.to_string()));
                self.update(collection, id, Map::from_iter([(foreign_key.to_string(), value)]))
            }
            // Missing targets abort the transaction in `merge_into`.
            RelationKind::HasMany { foreign_key } => {
                let previous = self.related_ids(collection, target, kind, id)?;
                let detach = Map::from_iter([(foreign_key.to_string(), Value::Null)]);
                let attach = Map::from_iter([(foreign_key.to_string(), Value::String(id.to_string()))]);
                self.collection(target)?
                    .transaction(|tx| -> ConflictableTransactionResult<(), DbError> {
                        for stale in previous.iter().filter(|stale| !ids.contains(stale)) {
                            merge_into(tx, target, *stale, &detach)?;
                        }
                        for target_id in ids {
                            merge_into(tx, target, *target_id, &attach)?;
                        }
                        Ok(())
                    })
                    .map_err(from_transaction)
            }
            RelationKind::ManyToMany { join_table, .. } => {
                self.ensure_exist(target, ids)?;
                let links = self.collection(join_table)?;
                let mut batch = sled::Batch::default();
                for key in links.scan_prefix(id.as_bytes()).keys() {
                    batch.remove(key?);
                }
                for target_id in ids {
                    batch.insert(link_key(id, *target_id).as_slice(), sled::IVec::default());
                }
                links.apply_batch(batch)?;
                Ok(())
            }
        }
    }

    fn ensure_exist(&self, collection: &'static str, ids: &[Uuid]) -> Result<(), DbError> {
        for id in ids {
            if !self.exists(collection, *id)? {
                return Err(DbError::NotFound { table: collection, id: *id });
            }
        }
        Ok(())
    }
}

// Merges `fields` over one stored document inside a transaction.
fn merge_into(
    tx: &TransactionalTree,
    collection: &'static str,
    id: Uuid,
    fields: &Document,
) -> ConflictableTransactionResult<(), DbError> {
    let Some(bytes) = tx.get(id.as_bytes())? else {
        return Err(ConflictableTransactionError::Abort(DbError::NotFound { table: collection, id }));
    };
    let mut doc = decode(collection, &bytes).map_err(ConflictableTransactionError::Abort)?;
    for (key, value) in fields {
        if key != "id" {
            doc.insert(key.clone(), value.clone());
        }
    }
    let bytes = serde_json::to_vec(&doc).map_err(|e| ConflictableTransactionError::Abort(e.into()))?;
    tx.insert(id.as_bytes().as_slice(), bytes)?;
    Ok(())
}

fn from_transaction(err: TransactionError<DbError>) -> DbError {
    match err {
        TransactionError::Abort(err) => err,
        TransactionError::Storage(err) => DbError::DocumentStore(err),
    }
}

fn link_key(source: Uuid, target: Uuid) -> [u8; 32] {
    let mut key = [0u8; 32];
    key[..16].copy_from_slice(source.as_bytes());
    key[16..].copy_from_slice(target.as_bytes());
    key
}

fn decode(collection: &'static str, bytes: &[u8]) -> Result<Document, DbError> {
    match serde_json::from_slice(bytes)? {
        Value::Object(doc) => Ok(doc),
        _ => Err(DbError::Malformed {
            table: collection,
            reason: "stored value is not a JSON object".to_string(),
        }),
    }
}

fn parse_id(collection: &'static str, value: &Value) -> Result<Uuid, DbError> {
    value
        .as_str()
        .and_then(|raw| Uuid::parse_str(raw).ok())
        .ok_or_else(|| DbError::Malformed {
            table: collection,
            reason: format!("expected a UUID string, found {}", value),
        })
}

fn document_id(collection: &'static str, doc: &Document) -> Result<Uuid, DbError> {
    let value = doc.get("id").ok_or_else(|| DbError::Malformed {
        table: collection,
        reason: "document has no id".to_string(),
    })?;
    parse_id(collection, value)
}

fn created_at(doc: &Document) -> Option<DateTime<FixedOffset>> {
    doc.get("created_at")
        .and_then(Value::as_str)
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
}

// Keys are random UUIDs, so insertion order has to come from the timestamps.
fn sort_by_creation(docs: &mut [Document]) {
    docs.sort_by(|a, b| {
        created_at(a).cmp(&created_at(b)).then_with(|| {
            let id_a = a.get("id").and_then(Value::as_str);
            let id_b = b.get("id").and_then(Value::as_str);
            id_a.cmp(&id_b)
        })
    });
}
