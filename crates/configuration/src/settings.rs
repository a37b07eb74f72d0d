use crate::error::ConfigError;
use core_types::BackendKind;
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Connection settings shared by both backends.
///
/// Deserialized from `DB_*` environment variables (and an optional
/// `database.toml`). The relational backend uses the host/port/credential
/// fields; the document backend only uses `name` and `path`.
#[derive(Clone, Deserialize)]
pub struct DbSettings {
    /// The backend selector flag (`DB_TYPE`).
    #[serde(rename = "type")]
    pub backend: BackendKind,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Database name on the server, and the default directory name of the document store.
    pub name: String,
    /// Where the document store keeps its files. Defaults to `./data/<name>`.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Apply pending migrations while initializing the data source.
    pub synchronize: bool,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl DbSettings {
    /// Directory of the document store.
    pub fn document_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| PathBuf::from("data").join(&self.name))
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    /// Rejects settings no backend could connect with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "DB_NAME must not be empty".to_string(),
            ));
        }
        if self.backend == BackendKind::Relational {
            if self.port == 0 {
                return Err(ConfigError::ValidationError(
                    "DB_PORT must be a non-zero port number".to_string(),
                ));
            }
            if self.max_connections == 0 {
                return Err(ConfigError::ValidationError(
                    "DB_MAX_CONNECTIONS must be at least 1".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Applies command-line overrides on top of the loaded settings.
    pub fn apply(&mut self, overrides: &SettingsOverrides) {
        if let Some(backend) = overrides.backend {
            self.backend = backend;
        }
        if let Some(path) = &overrides.db_path {
            self.path = Some(path.clone());
        }
        if overrides.synchronize {
            self.synchronize = true;
        }
    }
}

// The password never reaches the logs.
impl fmt::Debug for DbSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbSettings")
            .field("backend", &self.backend)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("synchronize", &self.synchronize)
            .field("max_connections", &self.max_connections)
            .field("acquire_timeout_secs", &self.acquire_timeout_secs)
            .finish()
    }
}

/// Per-invocation overrides, exposed as CLI flags when the `clap` feature is on.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "clap", derive(clap::Args))]
pub struct SettingsOverrides {
    /// Override DB_TYPE (postgres | document).
    #[cfg_attr(feature = "clap", arg(long, global = true))]
    pub backend: Option<BackendKind>,

    /// Override DB_PATH for the document store.
    #[cfg_attr(feature = "clap", arg(long, global = true))]
    pub db_path: Option<PathBuf>,

    /// Run migrations while initializing, as DB_SYNCHRONIZE=true would.
    #[cfg_attr(feature = "clap", arg(long, global = true))]
    pub synchronize: bool,
}
