//! Product catalog backed by Printful.
//!
//! Reshapes Printful store products into storefront views and caches them
//! using `moka` (5-minute TTL).

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, instrument, warn};

use okapi_core::{ProductId, VariantId, format_euro_price};

use crate::printful::{FulfillmentGateway, PrintfulError, SyncProductDetail, SyncVariant};

/// Errors returned by the catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Unknown or hidden product or variant.
    #[error("product not found: {0}")]
    NotFound(String),

    /// Printful request failed.
    #[error(transparent)]
    Upstream(#[from] PrintfulError),
}

/// A product in the catalog listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductSummaryView {
    pub id: ProductId,
    pub name: String,
    pub thumbnail: Option<String>,
    #[serde(with = "rust_decimal::serde::str")]
    pub price_from: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub price_to: Decimal,
    /// `€ 25,00` or `€ 25,00 - € 30,00`
    pub price_label: String,
    pub in_stock: bool,
}

/// A purchasable variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariantView {
    pub id: VariantId,
    /// Catalog variant the sync variant prints on; used for shipping quotes
    #[serde(skip_serializing)]
    pub catalog_variant_id: i64,
    pub name: String,
    pub size: Option<String>,
    pub color: Option<String>,
    #[serde(with = "rust_decimal::serde::str")]
    pub price: Decimal,
    pub price_label: String,
    pub image: Option<String>,
    pub in_stock: bool,
}

/// A product with its variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductDetailView {
    #[serde(flatten)]
    pub summary: ProductSummaryView,
    pub variants: Vec<VariantView>,
}

impl ProductDetailView {
    /// Look up a variant by sync variant ID.
    #[must_use]
    pub fn variant(&self, id: VariantId) -> Option<&VariantView> {
        self.variants.iter().find(|v| v.id == id)
    }

    fn from_printful(detail: SyncProductDetail) -> Self {
        let product = detail.sync_product;
        let variants: Vec<VariantView> = detail
            .sync_variants
            .iter()
            .filter(|v| !v.is_ignored)
            .map(VariantView::from_printful)
            .collect();

        let price_from = variants.iter().map(|v| v.price).min().unwrap_or_default();
        let price_to = variants.iter().map(|v| v.price).max().unwrap_or_default();
        let price_label = if price_from == price_to {
            format_euro_price(price_from)
        } else {
            format!(
                "{} - {}",
                format_euro_price(price_from),
                format_euro_price(price_to)
            )
        };

        Self {
            summary: ProductSummaryView {
                id: product.id,
                name: product.name,
                thumbnail: product.thumbnail_url,
                price_from,
                price_to,
                price_label,
                in_stock: variants.iter().any(|v| v.in_stock),
            },
            variants,
        }
    }
}

impl VariantView {
    fn from_printful(variant: &SyncVariant) -> Self {
        Self {
            id: variant.id,
            catalog_variant_id: variant.variant_id,
            name: variant.name.clone(),
            size: variant.size.clone(),
            color: variant.color.clone(),
            price: variant.retail_price,
            price_label: format_euro_price(variant.retail_price),
            image: variant.image().map(String::from),
            in_stock: variant.is_available(),
        }
    }
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
enum CacheKey {
    Products,
    Product(ProductId),
}

#[derive(Debug, Clone)]
enum CacheValue {
    Products(Arc<Vec<ProductSummaryView>>),
    Product(Arc<ProductDetailView>),
}

/// Cached read access to the Printful store catalog.
#[derive(Clone)]
pub struct CatalogService {
    gateway: Arc<dyn FulfillmentGateway>,
    cache: Cache<CacheKey, CacheValue>,
}

impl CatalogService {
    /// Create a catalog over a fulfillment gateway.
    #[must_use]
    pub fn new(gateway: Arc<dyn FulfillmentGateway>) -> Self {
        let cache = Cache::builder()
            .max_capacity(1000)
            .time_to_live(Duration::from_secs(300)) // 5 minutes
            .build();
        Self { gateway, cache }
    }

    /// All visible products with their price ranges.
    ///
    /// Printful's list endpoint carries no prices, so product details are
    /// fetched concurrently (and cached individually).
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Upstream` if the product list cannot be loaded.
    #[instrument(skip(self))]
    pub async fn list_products(&self) -> Result<Arc<Vec<ProductSummaryView>>, CatalogError> {
        if let Some(CacheValue::Products(products)) = self.cache.get(&CacheKey::Products).await {
            debug!("Cache hit for product list");
            return Ok(products);
        }

        let summaries = self.gateway.list_products().await?;

        let mut tasks = JoinSet::new();
        for (position, summary) in summaries
            .into_iter()
            .filter(|s| !s.is_ignored)
            .enumerate()
        {
            let catalog = self.clone();
            tasks.spawn(async move { (position, catalog.get_product(summary.id).await) });
        }

        let mut products = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((position, Ok(detail))) => products.push((position, detail.summary.clone())),
                Ok((_, Err(e))) => warn!(error = %e, "Skipping product that failed to load"),
                Err(e) => warn!(error = %e, "Product detail task failed"),
            }
        }
        products.sort_by_key(|(position, _)| *position);

        let products = Arc::new(products.into_iter().map(|(_, p)| p).collect::<Vec<_>>());
        self.cache
            .insert(CacheKey::Products, CacheValue::Products(Arc::clone(&products)))
            .await;
        Ok(products)
    }

    /// A product with its variants.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::NotFound` for unknown or hidden products and
    /// `CatalogError::Upstream` for other Printful failures.
    #[instrument(skip(self))]
    pub async fn get_product(&self, id: ProductId) -> Result<Arc<ProductDetailView>, CatalogError> {
        let key = CacheKey::Product(id);
        if let Some(CacheValue::Product(product)) = self.cache.get(&key).await {
            debug!("Cache hit for product");
            return Ok(product);
        }

        let detail = match self.gateway.get_product(id).await {
            Ok(detail) => detail,
            Err(PrintfulError::NotFound(_)) => return Err(CatalogError::NotFound(id.to_string())),
            Err(e) => return Err(e.into()),
        };
        if detail.sync_product.is_ignored {
            return Err(CatalogError::NotFound(id.to_string()));
        }

        let product = Arc::new(ProductDetailView::from_printful(detail));
        self.cache
            .insert(key, CacheValue::Product(Arc::clone(&product)))
            .await;
        Ok(product)
    }

    /// A single variant of a product.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::NotFound` if the product or variant is unknown.
    pub async fn variant(
        &self,
        product_id: ProductId,
        variant_id: VariantId,
    ) -> Result<VariantView, CatalogError> {
        self.get_product(product_id)
            .await?
            .variant(variant_id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(format!("{product_id}/{variant_id}")))
    }
}
