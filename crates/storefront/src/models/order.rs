//! Order domain types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use okapi_core::{Email, OrderId, OrderItemId, OrderStatus, ProductId, UserId, VariantId};

/// Shipping name and address captured at purchase time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShippingSnapshot {
    pub name: String,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub postal_code: String,
    pub state: Option<String>,
    /// ISO 3166-1 alpha-2 code
    pub country: String,
}

/// A local order record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Order {
    pub id: OrderId,
    pub status: OrderStatus,
    #[serde(with = "rust_decimal::serde::str")]
    pub subtotal: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub shipping: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub total: Decimal,
    /// Amount captured by Stripe for this order.
    #[serde(with = "rust_decimal::serde::str")]
    pub amount_charged: Decimal,
    #[serde(skip_serializing)]
    pub stripe_session_id: Option<String>,
    #[serde(skip_serializing)]
    pub stripe_payment_id: String,
    /// External id sent to Printful (the local order id for our orders).
    pub printful_id: Option<String>,
    /// Printful's internal order id.
    #[serde(skip_serializing)]
    pub printful_order_id: Option<i64>,
    #[serde(skip_serializing)]
    pub user_id: UserId,
    pub email: Email,
    pub shipping_method: Option<String>,
    pub shipping_address: ShippingSnapshot,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Key used to look the order up at Printful.
    ///
    /// Purely numeric ids are our own external ids and need the `@` prefix;
    /// anything else is passed through as-is.
    #[must_use]
    pub fn fulfillment_key(&self) -> Option<String> {
        self.printful_id.as_deref().map(fulfillment_key)
    }

    /// Whether Printful has accepted this order.
    #[must_use]
    pub const fn is_fulfilled(&self) -> bool {
        self.printful_id.is_some()
    }
}

/// Printful lookup key for a stored id.
#[must_use]
pub fn fulfillment_key(stored: &str) -> String {
    if !stored.is_empty() && stored.bytes().all(|b| b.is_ascii_digit()) {
        format!("@{stored}")
    } else {
        stored.to_string()
    }
}

/// A line of an order, priced at purchase time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub variant_id: VariantId,
    pub name: String,
    pub quantity: u32,
    #[serde(with = "rust_decimal::serde::str")]
    pub price: Decimal,
}

impl OrderItem {
    /// Price times quantity.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}

/// An order together with its items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderWithItems {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

impl OrderWithItems {
    /// Whether the stored totals agree with the items and the charge.
    ///
    /// `subtotal` must equal the sum of line totals, `total` must equal
    /// `subtotal + shipping` and Stripe must have charged exactly `total`.
    #[must_use]
    pub fn totals_consistent(&self) -> bool {
        let items: Decimal = self.items.iter().map(OrderItem::line_total).sum();
        items == self.order.subtotal
            && self.order.subtotal + self.order.shipping == self.order.total
            && self.order.amount_charged == self.order.total
    }

    /// Whether the order contains the given product variant.
    #[must_use]
    pub fn contains(&self, product_id: ProductId, variant_id: VariantId) -> bool {
        self.items
            .iter()
            .any(|item| item.product_id == product_id && item.variant_id == variant_id)
    }
}

/// A line to insert along with a new order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrderItem {
    pub product_id: ProductId,
    pub variant_id: VariantId,
    pub name: String,
    pub quantity: u32,
    pub price: Decimal,
    pub image: Option<String>,
}

impl NewOrderItem {
    /// Price times quantity.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}

/// A new order, written in one transaction together with its items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub user_id: UserId,
    pub email: Email,
    pub stripe_payment_id: String,
    pub stripe_session_id: Option<String>,
    pub shipping: Decimal,
    /// Amount Stripe charged, which may differ from `total()`.
    pub amount_charged: Decimal,
    pub shipping_method: Option<String>,
    pub shipping_address: ShippingSnapshot,
    pub items: Vec<NewOrderItem>,
}

impl NewOrder {
    /// Sum of the item line totals.
    #[must_use]
    pub fn subtotal(&self) -> Decimal {
        self.items.iter().map(NewOrderItem::line_total).sum()
    }

    /// `subtotal + shipping`.
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.subtotal() + self.shipping
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_order(printful_id: Option<&str>) -> OrderWithItems {
        let now = Utc::now();
        OrderWithItems {
            order: Order {
                id: OrderId::new(42),
                status: OrderStatus::Processing,
                subtotal: Decimal::new(5000, 2),
                shipping: Decimal::new(495, 2),
                total: Decimal::new(5495, 2),
                amount_charged: Decimal::new(5495, 2),
                stripe_session_id: None,
                stripe_payment_id: "pi_123".to_string(),
                printful_id: printful_id.map(str::to_string),
                printful_order_id: None,
                user_id: UserId::new(7),
                email: Email::parse("ada@example.com").unwrap(),
                shipping_method: Some("STANDARD".to_string()),
                shipping_address: ShippingSnapshot {
                    name: "Ada Lovelace".to_string(),
                    line1: "Rue Neuve 1".to_string(),
                    line2: None,
                    city: "Brussels".to_string(),
                    postal_code: "1000".to_string(),
                    state: None,
                    country: "BE".to_string(),
                },
                created_at: now,
                updated_at: now,
            },
            items: vec![OrderItem {
                id: OrderItemId::new(1),
                order_id: OrderId::new(42),
                product_id: ProductId::new(10),
                variant_id: VariantId::new(100),
                name: "Okapi tee".to_string(),
                quantity: 2,
                price: Decimal::new(2500, 2),
            }],
        }
    }

    #[test]
    fn test_fulfillment_key() {
        assert_eq!(fulfillment_key("42"), "@42");
        assert_eq!(fulfillment_key("98765432"), "@98765432");
        assert_eq!(fulfillment_key("okapi-42"), "okapi-42");
        assert_eq!(fulfillment_key(""), "");
    }

    #[test]
    fn test_totals_consistent() {
        let mut order = sample_order(Some("42"));
        assert!(order.totals_consistent());

        order.order.total = Decimal::new(5000, 2);
        assert!(!order.totals_consistent());

        let mut order = sample_order(Some("42"));
        order.items[0].quantity = 3;
        assert!(!order.totals_consistent());

        let mut order = sample_order(Some("42"));
        order.order.amount_charged = Decimal::new(100, 2);
        assert!(!order.totals_consistent());
    }

    #[test]
    fn test_contains() {
        let order = sample_order(None);
        assert!(order.contains(ProductId::new(10), VariantId::new(100)));
        assert!(!order.contains(ProductId::new(10), VariantId::new(101)));
    }

    #[test]
    fn test_serialization_hides_payment_ids() {
        let json = serde_json::to_value(sample_order(Some("42"))).unwrap();
        assert_eq!(json["id"], 42);
        assert_eq!(json["total"], "54.95");
        assert_eq!(json["status"], "processing");
        assert!(json.get("stripe_payment_id").is_none());
        assert!(json.get("user_id").is_none());
        assert_eq!(json["items"][0]["price"], "25.00");
    }
}
