//! Local product rows.

use rust_decimal::Decimal;

use okapi_core::ProductId;

use crate::printful::SyncProductDetail;

/// Values written when a product is upserted into the local table.
///
/// Printful stays the source of truth; the local row exists so order items
/// and reviews have something to reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductUpsert {
    pub id: ProductId,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub image: Option<String>,
    pub in_stock: bool,
}

impl ProductUpsert {
    /// Row for a Printful store product; the price is the cheapest variant.
    #[must_use]
    pub fn from_printful(detail: &SyncProductDetail) -> Self {
        let variants = detail.sync_variants.iter().filter(|v| !v.is_ignored);
        Self {
            id: detail.sync_product.id,
            name: detail.sync_product.name.clone(),
            description: None,
            price: variants
                .clone()
                .map(|v| v.retail_price)
                .min()
                .unwrap_or_default(),
            image: detail.sync_product.thumbnail_url.clone(),
            in_stock: !detail.sync_product.is_ignored && variants.clone().any(|v| v.is_available()),
        }
    }
}
