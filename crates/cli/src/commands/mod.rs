//! `tp-cli` subcommands.

pub mod admin;
pub mod migrate;

use secrecy::SecretString;
use sqlx::PgPool;
use thiserror::Error;

use tradepost_api::services::AuthError;

/// Errors from any CLI command.
#[derive(Debug, Error)]
pub enum CliError {
    /// Required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    /// Database connection error.
    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration failed.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Account validation or persistence failed.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// No account with this email.
    #[error("No user with email: {0}")]
    UserNotFound(String),

    /// Account is already an admin.
    #[error("User is already an admin: {0}")]
    AlreadyAdmin(String),
}

/// Connect using `TRADEPOST_DATABASE_URL`, falling back to `DATABASE_URL`.
///
/// # Errors
///
/// Returns `CliError` if neither variable is set or the connection fails.
pub async fn connect() -> Result<PgPool, CliError> {
    dotenvy::dotenv().ok();

    let database_url = std::env::var("TRADEPOST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .map(SecretString::from)
        .map_err(|_| CliError::MissingEnvVar("TRADEPOST_DATABASE_URL"))?;

    tracing::info!("Connecting to database...");
    Ok(tradepost_api::db::create_pool(&database_url).await?)
}
