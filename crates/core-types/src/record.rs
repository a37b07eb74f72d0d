use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The identifier and timestamps every persisted record carries.
///
/// Models embed this with `#[serde(flatten)]`, so a stored row or document has
/// `id`, `created_at` and `updated_at` next to the model's own fields. Absent
/// values are skipped when serializing, which lets the store fill in defaults
/// and keeps an update from blanking a timestamp it never loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl RecordMeta {
    /// Metadata for a record that refers to an existing row by id.
    pub fn with_id(id: Uuid) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    /// A record is transient until its first successful insert.
    pub fn is_transient(&self) -> bool {
        self.id.is_none()
    }

    /// Stamps both timestamps ahead of an insert.
    pub fn mark_created(&mut self, now: DateTime<Utc>) {
        self.created_at = Some(now);
        self.updated_at = Some(now);
    }

    /// Stamps the last-modified timestamp ahead of an update.
    pub fn mark_updated(&mut self, now: DateTime<Utc>) {
        self.updated_at = Some(now);
    }
}
