//! CLI command implementations.

pub mod migrate;
pub mod user;

use thiserror::Error;

/// Errors shared by every command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    /// Database connection error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration failed.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Repository operation failed.
    #[error("Repository error: {0}")]
    Repository(#[from] modernshop_storefront::db::RepositoryError),

    #[error("Invalid input: {0}")]
    Invalid(String),

    #[error("User not found: {0}")]
    UserNotFound(String),
}

/// Connect using `MODERNSHOP_DATABASE_URL`, falling back to `DATABASE_URL`.
pub(crate) async fn connect() -> Result<sqlx::PgPool, CommandError> {
    dotenvy::dotenv().ok();

    let database_url = std::env::var("MODERNSHOP_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .map_err(|_| CommandError::MissingEnvVar("MODERNSHOP_DATABASE_URL"))?;

    tracing::info!("Connecting to database...");
    let pool = modernshop_storefront::db::create_pool(&secrecy::SecretString::from(database_url))
        .await?;
    Ok(pool)
}
