//! CLI subcommands.

pub mod admin;
pub mod migrate;
pub mod seed;

use secrecy::SecretString;
use sqlx::PgPool;

/// Missing connection string.
#[derive(Debug, thiserror::Error)]
#[error("Missing environment variable: API_DATABASE_URL (or DATABASE_URL)")]
pub struct MissingDatabaseUrl;

/// Read `API_DATABASE_URL`, falling back to `DATABASE_URL`.
pub fn database_url() -> Result<SecretString, MissingDatabaseUrl> {
    dotenvy::dotenv().ok();
    std::env::var("API_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .map(SecretString::from)
        .map_err(|_| MissingDatabaseUrl)
}

/// Failure to open the pool.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error(transparent)]
    MissingEnvVar(#[from] MissingDatabaseUrl),

    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Connect with the API's pool settings.
pub async fn connect() -> Result<PgPool, ConnectError> {
    let url = database_url()?;
    tracing::info!("Connecting to database...");
    Ok(emporium_api::db::create_pool(&url).await?)
}
