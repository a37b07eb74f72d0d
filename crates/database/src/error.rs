use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Failed to load environment variables for database connection: {0}")]
    ConnectionConfigError(String),

    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Database migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("Document store error: {0}")]
    DocumentStore(#[from] sled::Error),

    #[error("An error occurred during JSON serialization/deserialization: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Malformed record in '{table}': {reason}")]
    Malformed { table: &'static str, reason: String },

    #[error("No entity found in '{table}' with ID {id}")]
    NotFound { table: &'static str, id: Uuid },

    #[error("A record in '{table}' with ID {id} already exists")]
    Conflict { table: &'static str, id: Uuid },

    #[error("Record in '{table}' has no ID; save it first")]
    MissingId { table: &'static str },

    #[error("'{table}' has no relation named '{relation}'")]
    UnknownRelation { table: &'static str, relation: String },

    #[error("Relation '{relation}' targets '{expected}', not '{actual}'")]
    TargetMismatch {
        relation: &'static str,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Relation '{relation}' holds at most one record, got {got}")]
    Cardinality { relation: &'static str, got: usize },
}
