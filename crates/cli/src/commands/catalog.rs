//! Catalog sync command.
//!
//! Mirrors the Printful store into `okapi.products` so that order items and
//! reviews reference real rows. Products that disappeared from Printful are
//! kept (orders point at them) but marked out of stock.
//!
//! # Environment Variables
//!
//! - `STOREFRONT_DATABASE_URL` - `PostgreSQL` connection string
//! - `PRINTFUL_API_TOKEN` - Printful private token
//! - `PRINTFUL_STORE_ID` - Printful store ID (optional)

use okapi_storefront::config::{ConfigError, PrintfulConfig};
use okapi_storefront::db::{ProductRepository, RepositoryError};
use okapi_storefront::models::ProductUpsert;
use okapi_storefront::printful::{FulfillmentGateway, PrintfulClient, PrintfulError};

use super::{ConnectError, connect};

/// Errors that can occur during a catalog sync.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Printful error: {0}")]
    Printful(#[from] PrintfulError),

    #[error("Database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Result of a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub upserted: u64,
    pub marked_out_of_stock: u64,
}

/// Sync the Printful catalog into the products table.
///
/// # Errors
///
/// Returns an error if Printful or the database fails; the upsert runs in a
/// single transaction so a failed run writes nothing.
pub async fn sync() -> Result<SyncReport, SyncError> {
    let pool = connect().await?;
    let printful = PrintfulClient::new(&PrintfulConfig::from_env()?)?;

    let summaries = printful.list_products().await?;
    tracing::info!(count = summaries.len(), "Fetched Printful store products");

    let mut products = Vec::with_capacity(summaries.len());
    for summary in summaries.iter().filter(|s| !s.is_ignored) {
        let detail = printful.get_product(summary.id).await?;
        products.push(ProductUpsert::from_printful(&detail));
    }

    let repository = ProductRepository::new(pool);
    let upserted = repository.upsert_many(&products).await?;
    let present: Vec<i64> = products.iter().map(|p| p.id.get()).collect();
    let marked_out_of_stock = repository.mark_missing_out_of_stock(&present).await?;

    tracing::info!(upserted, marked_out_of_stock, "Catalog sync complete!");
    Ok(SyncReport {
        upserted,
        marked_out_of_stock,
    })
}
