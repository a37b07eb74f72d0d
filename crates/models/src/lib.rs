//! Concrete entities persisted through the `database` crate.
//!
//! Each model is a plain serde struct that flattens a `RecordMeta` and
//! declares its table, columns and named associations. Persistence comes from
//! the blanket `database::ActiveRecord` implementation.

pub mod post;
pub mod role;
pub mod user;

pub use post::Post;
pub use role::Role;
pub use user::User;
