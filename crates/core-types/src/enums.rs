use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Selects which storage path every model operation takes.
///
/// Read from the `DB_TYPE` variable. Deserialization goes through `FromStr`,
/// so configuration files, the environment and the CLI accept the same names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum BackendKind {
    #[default]
    #[serde(rename = "postgres")]
    Relational,
    #[serde(rename = "document")]
    Document,
}

impl BackendKind {
    /// Returns the canonical configuration value for this backend.
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Relational => "postgres",
            BackendKind::Document => "document",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "relational" => Ok(BackendKind::Relational),
            "document" | "sled" => Ok(BackendKind::Document),
            other => Err(CoreError::InvalidInput(
                "backend".to_string(),
                format!("unknown backend '{}'", other),
            )),
        }
    }
}

impl TryFrom<String> for BackendKind {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
