pub mod enums;
pub mod error;
pub mod model;
pub mod record;

// Re-export the core types to provide a clean public API.
pub use enums::BackendKind;
pub use error::CoreError;
pub use model::{Model, Related, Relation, RelationKind};
pub use record::RecordMeta;
