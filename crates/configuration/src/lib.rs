use crate::error::ConfigError;

// Declare the modules that make up this crate.
pub mod error;
pub mod settings;
pub mod telemetry;

// Re-export the core types to provide a clean public API.
pub use settings::{DbSettings, SettingsOverrides};
pub use telemetry::init_tracing;

/// The prefix shared by every database environment variable (`DB_HOST`, `DB_TYPE`, ...).
const ENV_PREFIX: &str = "DB";

/// Loads the database settings from `.env`, `database.toml` and the process environment.
///
/// This function is the primary entry point for this crate. Environment variables
/// win over the file, and the file wins over the built-in defaults.
pub fn load_db_settings() -> Result<DbSettings, ConfigError> {
    // A missing .env file is fine; the variables may come from the real environment.
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            tracing::warn!(error = %e, "Ignoring unreadable .env file.");
        }
    }
    build_settings(None)
}

/// Loads the settings from an explicit set of variables instead of the process environment.
pub fn load_db_settings_from(vars: config::Map<String, String>) -> Result<DbSettings, ConfigError> {
    build_settings(Some(vars))
}

fn build_settings(vars: Option<config::Map<String, String>>) -> Result<DbSettings, ConfigError> {
    let builder = config::Config::builder()
        .set_default("type", "postgres")?
        .set_default("host", "localhost")?
        .set_default("port", 5432_i64)?
        .set_default("username", "postgres")?
        .set_default("password", "")?
        .set_default("name", "app")?
        .set_default("synchronize", false)?
        .set_default("max_connections", 10_i64)?
        .set_default("acquire_timeout_secs", 5_i64)?
        // Tells the builder to look for an optional file named `database.toml`
        .add_source(config::File::with_name("database").required(false))
        .add_source(config::Environment::with_prefix(ENV_PREFIX).source(vars))
        .build()?;

    // Attempt to deserialize the entire configuration into our `DbSettings` struct
    let settings = builder.try_deserialize::<DbSettings>()?;
    settings.validate()?;

    Ok(settings)
}
