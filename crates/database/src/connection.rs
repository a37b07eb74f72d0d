use crate::document::DocumentStore;
use crate::error::DbError;
use configuration::DbSettings;
use core_types::BackendKind;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};

/// The configured store every model operation runs against.
///
/// The variant is fixed when the data source is built from `DB_TYPE`; each
/// operation matches on it, so the selected code path always agrees with the
/// connection that was actually opened.
#[derive(Debug, Clone)]
pub enum DataSource {
    Relational(PgPool),
    Document(DocumentStore),
}

impl DataSource {
    /// Opens the backend the settings select, without touching the schema.
    pub async fn connect(settings: &DbSettings) -> Result<Self, DbError> {
        match settings.backend {
            BackendKind::Relational => {
                let options = PgConnectOptions::new()
                    .host(&settings.host)
                    .port(settings.port)
                    .username(&settings.username)
                    .password(&settings.password)
                    .database(&settings.name);

                let pool = PgPoolOptions::new()
                    .max_connections(settings.max_connections)
                    .acquire_timeout(settings.acquire_timeout())
                    .connect_with(options)
                    .await?;

                Ok(DataSource::Relational(pool))
            }
            BackendKind::Document => {
                let store = DocumentStore::open(settings.document_path())?;
                Ok(DataSource::Document(store))
            }
        }
    }

    /// Validates the settings, connects, and synchronizes the schema when asked to.
    ///
    /// The outcome is logged either way. There is no retry: a failure is
    /// returned to the caller as is.
    pub async fn initialize(settings: &DbSettings) -> Result<Self, DbError> {
        let result = Self::connect_and_synchronize(settings).await;
        match &result {
            Ok(source) => tracing::info!(backend = %source.backend(), "Data Source has been initialized!"),
            Err(e) => tracing::error!(error = %e, backend = %settings.backend, "Error during Data Source initialization"),
        }
        result
    }

    async fn connect_and_synchronize(settings: &DbSettings) -> Result<Self, DbError> {
        settings
            .validate()
            .map_err(|e| DbError::ConnectionConfigError(e.to_string()))?;
        let source = Self::connect(settings).await?;
        if settings.synchronize {
            source.synchronize().await?;
        }
        Ok(source)
    }

    /// Loads the settings from `.env` and the environment, then initializes.
    pub async fn from_env() -> Result<Self, DbError> {
        let settings =
            configuration::load_db_settings().map_err(|e| DbError::ConnectionConfigError(e.to_string()))?;
        Self::initialize(&settings).await
    }

    /// A document store in a temporary directory, discarded when the last handle drops.
    pub fn open_temporary() -> Result<Self, DbError> {
        Ok(DataSource::Document(DocumentStore::temporary()?))
    }

    pub fn backend(&self) -> BackendKind {
        match self {
            DataSource::Relational(_) => BackendKind::Relational,
            DataSource::Document(_) => BackendKind::Document,
        }
    }

    /// Brings the schema up to date. Document collections need no schema and
    /// are created on first write.
    pub async fn synchronize(&self) -> Result<(), DbError> {
        match self {
            DataSource::Relational(pool) => run_migrations(pool).await,
            DataSource::Document(_) => Ok(()),
        }
    }

    /// Closes the pool, or flushes the document store to disk.
    pub async fn close(&self) -> Result<(), DbError> {
        match self {
            DataSource::Relational(pool) => {
                pool.close().await;
                Ok(())
            }
            DataSource::Document(store) => store.flush(),
        }
    }
}

impl From<PgPool> for DataSource {
    fn from(pool: PgPool) -> Self {
        DataSource::Relational(pool)
    }
}

impl From<DocumentStore> for DataSource {
    fn from(store: DocumentStore) -> Self {
        DataSource::Document(store)
    }
}

/// A utility function to run database migrations automatically.
///
/// This is the relational counterpart of schema synchronization and is safe to
/// call on every start: applied migrations are skipped.
pub async fn run_migrations(pool: &PgPool) -> Result<(), DbError> {
    // Use a relative path from the crate root
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
