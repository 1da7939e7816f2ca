//! Shopping cart model.
//!
//! The cart is a plain value persisted in the visitor's session. Lines are
//! keyed by product and variant; derived totals are always recomputed from the
//! lines and never stored.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{ProductId, VariantId};

/// Maximum quantity of a single cart line.
pub const MAX_LINE_QUANTITY: u32 = 99;

/// Maximum number of distinct lines in a cart.
pub const MAX_LINES: usize = 50;

/// Errors returned by cart mutations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CartError {
    /// Quantity must be at least one when adding.
    #[error("quantity must be between 1 and {MAX_LINE_QUANTITY}")]
    InvalidQuantity,
    /// Prices must not be negative.
    #[error("price cannot be negative")]
    NegativePrice,
    /// The cart already holds the maximum number of lines.
    #[error("cart cannot hold more than {MAX_LINES} different items")]
    TooManyLines,
}

/// A single cart line.
///
/// `variant_id` is optional because catalog listings can be added before a
/// size or color is chosen; checkout rejects such lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: ProductId,
    #[serde(default)]
    pub variant_id: Option<VariantId>,
    pub name: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub price: Decimal,
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl CartItem {
    /// Price times quantity.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }

    fn same_line(&self, product_id: ProductId, variant_id: Option<VariantId>) -> bool {
        self.product_id == product_id && self.variant_id == variant_id
    }
}

/// The shopping cart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    items: Vec<CartItem>,
}

impl Cart {
    /// Create an empty cart.
    #[must_use]
    pub const fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Build a cart from existing lines, merging duplicates.
    ///
    /// # Errors
    ///
    /// Returns the first validation error raised by [`Cart::add`].
    pub fn from_items(items: impl IntoIterator<Item = CartItem>) -> Result<Self, CartError> {
        let mut cart = Self::new();
        for item in items {
            cart.add(item)?;
        }
        Ok(cart)
    }

    /// Add a line, merging with an existing line for the same product and
    /// variant. Merged quantities are capped at [`MAX_LINE_QUANTITY`]; the
    /// latest name, price and image win.
    ///
    /// # Errors
    ///
    /// Returns `CartError::InvalidQuantity` for a zero or oversized quantity,
    /// `CartError::NegativePrice` for a negative price and
    /// `CartError::TooManyLines` when a new line would exceed [`MAX_LINES`].
    pub fn add(&mut self, item: CartItem) -> Result<(), CartError> {
        if item.quantity == 0 || item.quantity > MAX_LINE_QUANTITY {
            return Err(CartError::InvalidQuantity);
        }
        if item.price.is_sign_negative() && !item.price.is_zero() {
            return Err(CartError::NegativePrice);
        }

        if let Some(existing) = self
            .items
            .iter_mut()
            .find(|line| line.same_line(item.product_id, item.variant_id))
        {
            existing.quantity = existing
                .quantity
                .saturating_add(item.quantity)
                .min(MAX_LINE_QUANTITY);
            existing.name = item.name;
            existing.price = item.price;
            existing.image = item.image;
            return Ok(());
        }

        if self.items.len() >= MAX_LINES {
            return Err(CartError::TooManyLines);
        }
        self.items.push(item);
        Ok(())
    }

    /// Set the quantity of a line. A quantity of zero removes it.
    ///
    /// Returns `Ok(false)` if no such line exists.
    ///
    /// # Errors
    ///
    /// Returns `CartError::InvalidQuantity` if `quantity` exceeds
    /// [`MAX_LINE_QUANTITY`].
    pub fn set_quantity(
        &mut self,
        product_id: ProductId,
        variant_id: Option<VariantId>,
        quantity: u32,
    ) -> Result<bool, CartError> {
        if quantity > MAX_LINE_QUANTITY {
            return Err(CartError::InvalidQuantity);
        }
        if quantity == 0 {
            return Ok(self.remove(product_id, variant_id));
        }
        match self
            .items
            .iter_mut()
            .find(|line| line.same_line(product_id, variant_id))
        {
            Some(line) => {
                line.quantity = quantity;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Remove a line. Returns whether anything was removed.
    pub fn remove(&mut self, product_id: ProductId, variant_id: Option<VariantId>) -> bool {
        let before = self.items.len();
        self.items
            .retain(|line| !line.same_line(product_id, variant_id));
        self.items.len() != before
    }

    /// Remove every line.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// The cart lines, in insertion order.
    #[must_use]
    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    /// Whether the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Sum of all line totals.
    #[must_use]
    pub fn subtotal(&self) -> Decimal {
        self.items.iter().map(CartItem::line_total).sum()
    }

    /// Total number of units across all lines.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.items.iter().map(|line| line.quantity).sum()
    }

    /// The first line that has no variant selected, if any.
    #[must_use]
    pub fn first_missing_variant(&self) -> Option<&CartItem> {
        self.items.iter().find(|line| line.variant_id.is_none())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn item(product: i64, variant: Option<i64>, cents: i64, quantity: u32) -> CartItem {
        CartItem {
            product_id: ProductId::new(product),
            variant_id: variant.map(VariantId::new),
            name: format!("Okapi tee {product}"),
            price: Decimal::new(cents, 2),
            quantity,
            image: None,
        }
    }

    #[test]
    fn test_add_merges_same_line() {
        let mut cart = Cart::new();
        cart.add(item(1, Some(10), 2500, 1)).unwrap();
        cart.add(item(1, Some(10), 2500, 2)).unwrap();
        cart.add(item(1, Some(11), 2500, 1)).unwrap();

        assert_eq!(cart.items().len(), 2);
        assert_eq!(cart.item_count(), 4);
        assert_eq!(cart.subtotal(), Decimal::new(10_000, 2));
    }

    #[test]
    fn test_add_caps_merged_quantity() {
        let mut cart = Cart::new();
        cart.add(item(1, Some(10), 100, 90)).unwrap();
        cart.add(item(1, Some(10), 100, 20)).unwrap();
        assert_eq!(cart.items()[0].quantity, MAX_LINE_QUANTITY);
    }

    #[test]
    fn test_add_validates() {
        let mut cart = Cart::new();
        assert_eq!(
            cart.add(item(1, Some(1), 100, 0)),
            Err(CartError::InvalidQuantity)
        );
        assert_eq!(
            cart.add(item(1, Some(1), -100, 1)),
            Err(CartError::NegativePrice)
        );
        assert!(cart.is_empty());
    }

    #[test]
    fn test_too_many_lines() {
        let mut cart = Cart::new();
        for i in 0..MAX_LINES {
            cart.add(item(i64::try_from(i).unwrap(), Some(1), 100, 1))
                .unwrap();
        }
        assert_eq!(
            cart.add(item(9999, Some(1), 100, 1)),
            Err(CartError::TooManyLines)
        );
        // Merging into an existing line still works at capacity
        assert!(cart.add(item(0, Some(1), 100, 1)).is_ok());
    }

    #[test]
    fn test_set_quantity_and_remove() {
        let mut cart = Cart::new();
        cart.add(item(1, Some(10), 1250, 1)).unwrap();

        assert!(cart
            .set_quantity(ProductId::new(1), Some(VariantId::new(10)), 3)
            .unwrap());
        assert_eq!(cart.subtotal(), Decimal::new(3750, 2));

        assert!(!cart
            .set_quantity(ProductId::new(2), Some(VariantId::new(10)), 3)
            .unwrap());

        assert!(cart
            .set_quantity(ProductId::new(1), Some(VariantId::new(10)), 0)
            .unwrap());
        assert!(cart.is_empty());
    }

    #[test]
    fn test_first_missing_variant() {
        let mut cart = Cart::new();
        cart.add(item(1, Some(10), 100, 1)).unwrap();
        assert!(cart.first_missing_variant().is_none());
        cart.add(item(2, None, 100, 1)).unwrap();
        assert_eq!(
            cart.first_missing_variant().map(|i| i.product_id),
            Some(ProductId::new(2))
        );
    }

    #[test]
    fn test_session_json_shape() {
        let cart = Cart::from_items([item(7, Some(70), 1999, 2)]).unwrap();
        let json = serde_json::to_value(&cart).unwrap();
        assert_eq!(json["items"][0]["price"], "19.99");
        assert_eq!(json["items"][0]["variant_id"], 70);
        let back: Cart = serde_json::from_value(json).unwrap();
        assert_eq!(back, cart);
    }
}
