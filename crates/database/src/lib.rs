//! # Database Crate
//!
//! Active-record persistence for any `core_types::Model`, on either a
//! relational or a document backend.
//!
//! ## Architectural Principles
//!
//! - **One vocabulary, two stores:** `save`, `insert`, `update`, `delete`,
//!   `get`, `get_all`, `query`, `get_related` and `set_related` behave the same
//!   whichever backend `DB_TYPE` selects.
//! - **Delegation:** PostgreSQL (through `sqlx` and its `PgPool`) or an embedded
//!   `sled` document store does the real work. Library errors are wrapped in
//!   `DbError` and otherwise passed through.
//! - **Asynchronous:** every model operation is async; the relational path is
//!   pooled.
//!
//! ## Public API
//!
//! - `DataSource`: the connection handle, built with `connect`, `initialize`,
//!   `from_env` or `open_temporary`.
//! - `ActiveRecord`: the persistence operations, implemented for every `Model`.
//! - `run_migrations`: applies the embedded migrations to a pool.
//! - `DbError`: the error type of this crate.

// Declare the modules that constitute this crate.
pub mod active_record;
pub mod connection;
pub mod document;
pub mod error;
mod relational;

// Re-export the key components to create a clean, public-facing API.
pub use active_record::ActiveRecord;
pub use connection::{DataSource, run_migrations};
pub use document::DocumentStore;
pub use error::DbError;
