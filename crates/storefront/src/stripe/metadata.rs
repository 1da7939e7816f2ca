//! Cart snapshot carried in payment intent metadata.
//!
//! Stripe metadata values are limited to 500 characters and an object holds
//! at most 50 keys, so the items JSON is split across `items`, `items_1`,
//! `items_2`, ... with the number of chunks in `items_count`.

use std::collections::{BTreeMap, HashMap};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use okapi_core::{Cart, ProductId, UserId, VariantId};

/// Maximum length of one metadata value, in characters.
pub const MAX_VALUE_LEN: usize = 500;

/// Keys reserved for item chunks; the rest hold the scalar fields.
const MAX_ITEM_CHUNKS: usize = 45;

const ITEMS: &str = "items";
const ITEMS_COUNT: &str = "items_count";
const USER_ID: &str = "user_id";
const SHIPPING_AMOUNT: &str = "shipping_amount";
const SHIPPING_METHOD: &str = "shipping_method";

/// Errors encoding or decoding order metadata.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("cart is empty")]
    EmptyCart,
    #[error("item {0} has no variant selected")]
    MissingVariant(ProductId),
    #[error("cart too large to attach to the payment")]
    TooLarge,
    #[error("missing metadata key {0}")]
    MissingKey(String),
    #[error("invalid metadata value for {key}: {message}")]
    Invalid { key: String, message: String },
}

/// One purchased line as recorded on the payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataItem {
    pub product_id: ProductId,
    pub variant_id: VariantId,
    pub name: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub price: Decimal,
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// Everything the webhook needs to rebuild the order from the payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderMetadata {
    pub items: Vec<MetadataItem>,
    pub user_id: Option<UserId>,
    /// Shipping charged, in cents
    pub shipping_amount: i64,
    pub shipping_method: Option<String>,
}

impl OrderMetadata {
    /// Snapshot a cart.
    ///
    /// # Errors
    ///
    /// Returns `MetadataError::EmptyCart` or `MetadataError::MissingVariant`.
    pub fn from_cart(
        cart: &Cart,
        user_id: Option<UserId>,
        shipping_amount: i64,
        shipping_method: Option<String>,
    ) -> Result<Self, MetadataError> {
        if cart.is_empty() {
            return Err(MetadataError::EmptyCart);
        }
        let items = cart
            .items()
            .iter()
            .map(|item| {
                Ok(MetadataItem {
                    product_id: item.product_id,
                    variant_id: item
                        .variant_id
                        .ok_or(MetadataError::MissingVariant(item.product_id))?,
                    name: item.name.clone(),
                    price: item.price,
                    quantity: item.quantity,
                    image: item.image.clone(),
                })
            })
            .collect::<Result<Vec<_>, MetadataError>>()?;

        Ok(Self {
            items,
            user_id,
            shipping_amount,
            shipping_method,
        })
    }

    /// Sum of item price times quantity.
    #[must_use]
    pub fn subtotal(&self) -> Decimal {
        self.items
            .iter()
            .map(|item| item.price * Decimal::from(item.quantity))
            .sum()
    }

    /// Encode as Stripe metadata.
    ///
    /// Images are dropped if the items would not fit otherwise.
    ///
    /// # Errors
    ///
    /// Returns `MetadataError::TooLarge` if the items do not fit even
    /// without images.
    pub fn to_metadata(&self) -> Result<BTreeMap<String, String>, MetadataError> {
        let chunks = match chunk_items(&self.items)? {
            Some(chunks) => chunks,
            None => {
                let slim: Vec<MetadataItem> = self
                    .items
                    .iter()
                    .cloned()
                    .map(|item| MetadataItem {
                        image: None,
                        ..item
                    })
                    .collect();
                chunk_items(&slim)?.ok_or(MetadataError::TooLarge)?
            }
        };

        let mut map = BTreeMap::new();
        map.insert(ITEMS_COUNT.to_string(), chunks.len().to_string());
        for (index, chunk) in chunks.into_iter().enumerate() {
            map.insert(chunk_key(index), chunk);
        }
        if let Some(user_id) = self.user_id {
            map.insert(USER_ID.to_string(), user_id.to_string());
        }
        map.insert(SHIPPING_AMOUNT.to_string(), self.shipping_amount.to_string());
        if let Some(method) = &self.shipping_method {
            map.insert(SHIPPING_METHOD.to_string(), method.chars().take(MAX_VALUE_LEN).collect());
        }
        Ok(map)
    }

    /// Decode from Stripe metadata.
    ///
    /// A missing `items_count` is read as a single `items` value.
    ///
    /// # Errors
    ///
    /// Returns `MetadataError::MissingKey` or `MetadataError::Invalid` when the
    /// metadata was not written by [`OrderMetadata::to_metadata`].
    pub fn from_metadata(map: &HashMap<String, String>) -> Result<Self, MetadataError> {
        let count = match map.get(ITEMS_COUNT) {
            Some(raw) => raw.parse::<usize>().map_err(|e| MetadataError::Invalid {
                key: ITEMS_COUNT.to_string(),
                message: e.to_string(),
            })?,
            None => 1,
        };

        let mut json = String::new();
        for index in 0..count {
            let key = chunk_key(index);
            json.push_str(map.get(&key).ok_or(MetadataError::MissingKey(key))?);
        }

        let items: Vec<MetadataItem> =
            serde_json::from_str(&json).map_err(|e| MetadataError::Invalid {
                key: ITEMS.to_string(),
                message: e.to_string(),
            })?;
        if items.is_empty() {
            return Err(MetadataError::EmptyCart);
        }

        let user_id = map
            .get(USER_ID)
            .map(|raw| raw.parse::<UserId>())
            .transpose()
            .map_err(|e| MetadataError::Invalid {
                key: USER_ID.to_string(),
                message: e.to_string(),
            })?;

        let shipping_amount = map
            .get(SHIPPING_AMOUNT)
            .map(|raw| raw.parse::<i64>())
            .transpose()
            .map_err(|e| MetadataError::Invalid {
                key: SHIPPING_AMOUNT.to_string(),
                message: e.to_string(),
            })?
            .unwrap_or(0);

        Ok(Self {
            items,
            user_id,
            shipping_amount,
            shipping_method: map.get(SHIPPING_METHOD).cloned(),
        })
    }
}

fn chunk_key(index: usize) -> String {
    if index == 0 {
        ITEMS.to_string()
    } else {
        format!("{ITEMS}_{index}")
    }
}

/// Split the items JSON into metadata-sized chunks, `None` if too many.
fn chunk_items(items: &[MetadataItem]) -> Result<Option<Vec<String>>, MetadataError> {
    let json = serde_json::to_string(items).map_err(|e| MetadataError::Invalid {
        key: ITEMS.to_string(),
        message: e.to_string(),
    })?;

    let chars: Vec<char> = json.chars().collect();
    let chunks: Vec<String> = chars
        .chunks(MAX_VALUE_LEN)
        .map(|chunk| chunk.iter().collect())
        .collect();

    Ok((chunks.len() <= MAX_ITEM_CHUNKS).then_some(chunks))
}
