//! CLI subcommands.

pub mod catalog;
pub mod migrate;
pub mod users;

use okapi_storefront::config::{ConfigError, database_url_from_env};
use okapi_storefront::db::create_pool;
use sqlx::PgPool;

/// Connect to the storefront database named by the environment.
async fn connect() -> Result<PgPool, ConnectError> {
    dotenvy::dotenv().ok();
    let database_url = database_url_from_env()?;

    tracing::info!("Connecting to storefront database...");
    Ok(create_pool(&database_url).await?)
}

/// Errors while connecting to the database.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),
}
