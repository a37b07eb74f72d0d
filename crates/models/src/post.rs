use core_types::{Model, RecordMeta, Relation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub title: String,
    #[serde(default)]
    pub body: String,
    pub author_id: Option<Uuid>,
}

impl Post {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            meta: RecordMeta::default(),
            title: title.into(),
            body: body.into(),
            author_id: None,
        }
    }
}

impl Model for Post {
    const TABLE: &'static str = "posts";
    const COLUMNS: &'static [&'static str] = &["title", "body", "author_id"];
    const RELATIONS: &'static [Relation] = &[Relation::belongs_to("author", "users", "author_id")];

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta {
        &mut self.meta
    }
}
