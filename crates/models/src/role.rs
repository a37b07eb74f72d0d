use core_types::{Model, RecordMeta};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Role {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub name: String,
}

impl Role {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            meta: RecordMeta::default(),
            name: name.into(),
        }
    }
}

impl Model for Role {
    const TABLE: &'static str = "roles";
    const COLUMNS: &'static [&'static str] = &["name"];

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta {
        &mut self.meta
    }
}
