//! Printful API types.
//!
//! Printful wraps every response as `{"code": 200, "result": ...}` and
//! encodes money as decimal strings.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use okapi_core::{ProductId, VariantId};

/// Response envelope.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    pub result: T,
    pub paging: Option<Paging>,
}

/// Pagination info on list endpoints.
#[derive(Debug, Clone, Copy, Deserialize)]
pub(crate) struct Paging {
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
}

/// Error envelope, e.g. `{"code":404,"result":"Not found","error":{...}}`.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorEnvelope {
    pub result: Option<serde_json::Value>,
    pub error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    pub message: Option<String>,
}

/// A store product as returned by the list endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SyncProductSummary {
    pub id: ProductId,
    pub external_id: Option<String>,
    pub name: String,
    /// Number of variants
    pub variants: u32,
    pub synced: u32,
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub is_ignored: bool,
}

/// A store product with its variants.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SyncProductDetail {
    pub sync_product: SyncProductSummary,
    pub sync_variants: Vec<SyncVariant>,
}

/// The catalog item a store variant is printed on.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CatalogProductRef {
    pub variant_id: i64,
    pub product_id: i64,
    pub image: Option<String>,
    pub name: Option<String>,
}

/// A print or preview file attached to a variant.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct VariantFile {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub preview_url: Option<String>,
    pub thumbnail_url: Option<String>,
}

/// A sellable store variant.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SyncVariant {
    /// Sync variant ID; what the cart and orders use
    pub id: VariantId,
    pub external_id: Option<String>,
    pub sync_product_id: ProductId,
    pub name: String,
    /// Catalog variant ID; what shipping rates use
    pub variant_id: i64,
    #[serde(with = "rust_decimal::serde::str")]
    pub retail_price: Decimal,
    pub currency: Option<String>,
    #[serde(default)]
    pub is_ignored: bool,
    pub sku: Option<String>,
    pub product: Option<CatalogProductRef>,
    #[serde(default)]
    pub files: Vec<VariantFile>,
    pub size: Option<String>,
    pub color: Option<String>,
    pub availability_status: Option<String>,
}

impl SyncVariant {
    /// Whether Printful can currently fulfill this variant.
    #[must_use]
    pub fn is_available(&self) -> bool {
        !self.is_ignored
            && self
                .availability_status
                .as_deref()
                .is_none_or(|status| matches!(status, "active" | "temporary_out_of_stock_eu"))
    }

    /// Mock-up image: the preview file, then the catalog image.
    #[must_use]
    pub fn image(&self) -> Option<&str> {
        self.files
            .iter()
            .find(|f| f.kind.as_deref() == Some("preview"))
            .and_then(|f| f.preview_url.as_deref())
            .or_else(|| self.product.as_ref().and_then(|p| p.image.as_deref()))
    }
}

/// Recipient of a shipment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Recipient {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub address1: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address2: Option<String>,
    pub city: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_code: Option<String>,
    pub country_code: String,
    pub zip: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// An item in a shipping-rate request, by catalog variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateItem {
    pub variant_id: i64,
    pub quantity: u32,
}

/// Body of `POST /shipping/rates`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShippingRateRequest {
    pub recipient: Recipient,
    pub items: Vec<RateItem>,
    pub currency: String,
    pub locale: String,
}

/// A shipping option quoted by Printful.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ShippingRate {
    pub id: String,
    pub name: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub rate: Decimal,
    pub currency: String,
    #[serde(rename = "minDeliveryDays")]
    pub min_delivery_days: Option<u32>,
    #[serde(rename = "maxDeliveryDays")]
    pub max_delivery_days: Option<u32>,
}

/// An item of a new order, by sync variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderItemRequest {
    pub sync_variant_id: VariantId,
    pub quantity: u32,
    #[serde(with = "rust_decimal::serde::str")]
    pub retail_price: Decimal,
    pub name: String,
}

/// Retail amounts shown on packing slips.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetailCosts {
    #[serde(with = "rust_decimal::serde::str")]
    pub subtotal: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub shipping: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub total: Decimal,
}

/// Body of `POST /orders`. Orders are created as drafts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderRequest {
    /// The local order ID
    pub external_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipping: Option<String>,
    pub recipient: Recipient,
    pub items: Vec<OrderItemRequest>,
    pub retail_costs: RetailCosts,
}

/// A shipment of a Printful order.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Shipment {
    pub id: i64,
    pub carrier: Option<String>,
    pub service: Option<String>,
    pub tracking_number: Option<String>,
    pub tracking_url: Option<String>,
    pub ship_date: Option<String>,
    #[serde(default)]
    pub reshipment: bool,
}

/// An order as Printful reports it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PrintfulOrder {
    pub id: i64,
    pub external_id: Option<String>,
    /// `draft`, `pending`, `inprocess`, `fulfilled`, `canceled`, ...
    pub status: String,
    pub shipping: Option<String>,
    pub shipping_service_name: Option<String>,
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    pub created: Option<DateTime<Utc>>,
    #[serde(default)]
    pub shipments: Vec<Shipment>,
}
