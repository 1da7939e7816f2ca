//! Shipping-rate calculation.
//!
//! Carts hold sync variant IDs while Printful quotes by catalog variant, so
//! every line is resolved through the catalog first. Validation runs before
//! any network call.

use std::collections::BTreeMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;

use okapi_core::{AllowedCountries, Cart, CountryCode, format_euro_price};

use super::catalog::{CatalogError, CatalogService};
use crate::printful::{
    FulfillmentGateway, PrintfulError, RateItem, Recipient, ShippingRate, ShippingRateRequest,
};
use crate::stripe::{Address, ShippingDetails};

/// Errors returned while quoting shipping.
#[derive(Debug, Error)]
pub enum ShippingError {
    #[error("Your cart is empty")]
    EmptyCart,
    #[error("Please choose a size or color for {0}")]
    MissingVariant(String),
    #[error("Missing required address field: {0}")]
    MissingField(&'static str),
    #[error("Invalid country code: {0}")]
    InvalidCountry(String),
    #[error("We do not ship to {0} yet")]
    UnsupportedCountry(CountryCode),
    #[error("{0} is no longer available")]
    UnknownVariant(String),
    #[error("No shipping options are available for this address")]
    NoRates,
    #[error("Could not calculate shipping: {0}")]
    Upstream(#[from] PrintfulError),
}

/// A destination as entered at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    #[serde(default)]
    pub name: Option<String>,
    pub address1: String,
    #[serde(default)]
    pub address2: Option<String>,
    pub city: String,
    pub country_code: String,
    #[serde(default)]
    pub state_code: Option<String>,
    pub zip: String,
}

impl ShippingAddress {
    /// Trim every field, drop blank optionals and uppercase codes.
    #[must_use]
    pub fn normalized(&self) -> Self {
        let optional = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(String::from)
        };
        Self {
            name: optional(&self.name),
            address1: self.address1.trim().to_string(),
            address2: optional(&self.address2),
            city: self.city.trim().to_string(),
            country_code: self.country_code.trim().to_ascii_uppercase(),
            state_code: optional(&self.state_code).map(|s| s.to_ascii_uppercase()),
            zip: self.zip.trim().to_string(),
        }
    }

    /// Check required fields and the destination country.
    ///
    /// # Errors
    ///
    /// Returns `MissingField`, `InvalidCountry` or `UnsupportedCountry`.
    pub fn validate(&self, allowed: &AllowedCountries) -> Result<CountryCode, ShippingError> {
        for (field, value) in [
            ("address1", &self.address1),
            ("city", &self.city),
            ("zip", &self.zip),
            ("country_code", &self.country_code),
        ] {
            if value.trim().is_empty() {
                return Err(ShippingError::MissingField(field));
            }
        }
        let country = CountryCode::parse(&self.country_code)
            .map_err(|_| ShippingError::InvalidCountry(self.country_code.clone()))?;
        if !allowed.contains(country) {
            return Err(ShippingError::UnsupportedCountry(country));
        }
        Ok(country)
    }

    /// As a Printful recipient.
    #[must_use]
    pub fn to_recipient(&self) -> Recipient {
        Recipient {
            name: self.name.clone(),
            address1: self.address1.clone(),
            address2: self.address2.clone(),
            city: self.city.clone(),
            state_code: self.state_code.clone(),
            country_code: self.country_code.clone(),
            zip: self.zip.clone(),
            email: None,
        }
    }

    /// As Stripe shipping details.
    #[must_use]
    pub fn to_stripe(&self) -> ShippingDetails {
        ShippingDetails {
            name: self.name.clone(),
            address: Address {
                line1: Some(self.address1.clone()),
                line2: self.address2.clone(),
                city: Some(self.city.clone()),
                postal_code: Some(self.zip.clone()),
                state: self.state_code.clone(),
                country: Some(self.country_code.clone()),
            },
            phone: None,
        }
    }
}

/// A shipping option offered to the customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateOption {
    pub id: String,
    pub name: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub price: Decimal,
    pub price_label: String,
    pub min_delivery_days: Option<u32>,
    pub max_delivery_days: Option<u32>,
    pub is_default: bool,
}

impl From<ShippingRate> for RateOption {
    fn from(rate: ShippingRate) -> Self {
        Self {
            price_label: format_euro_price(rate.rate),
            id: rate.id,
            name: rate.name,
            price: rate.rate,
            min_delivery_days: rate.min_delivery_days,
            max_delivery_days: rate.max_delivery_days,
            is_default: false,
        }
    }
}

/// Rates quoted for an address, kept in the session so that later steps
/// charge exactly what was shown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingQuote {
    pub address: ShippingAddress,
    pub rates: Vec<RateOption>,
}

impl ShippingQuote {
    /// A quoted rate by ID.
    #[must_use]
    pub fn rate(&self, id: &str) -> Option<&RateOption> {
        self.rates.iter().find(|r| r.id == id)
    }

    /// The preselected (cheapest) rate.
    #[must_use]
    pub fn default_rate(&self) -> Option<&RateOption> {
        self.rates.iter().find(|r| r.is_default)
    }
}

/// Check that every line can be shipped.
///
/// # Errors
///
/// Returns `EmptyCart` or `MissingVariant`.
pub fn validate_cart(cart: &Cart) -> Result<(), ShippingError> {
    if cart.is_empty() {
        return Err(ShippingError::EmptyCart);
    }
    if let Some(item) = cart.first_missing_variant() {
        return Err(ShippingError::MissingVariant(item.name.clone()));
    }
    Ok(())
}

/// Sort by price and flag the cheapest rate as the default.
#[must_use]
pub fn rank_rates(rates: Vec<ShippingRate>) -> Vec<RateOption> {
    let mut options: Vec<RateOption> = rates.into_iter().map(RateOption::from).collect();
    options.sort_by(|a, b| a.price.cmp(&b.price));
    if let Some(first) = options.first_mut() {
        first.is_default = true;
    }
    options
}

/// Quotes shipping through Printful.
#[derive(Clone)]
pub struct ShippingCalculator {
    catalog: CatalogService,
    gateway: Arc<dyn FulfillmentGateway>,
    allowed: AllowedCountries,
}

impl ShippingCalculator {
    #[must_use]
    pub fn new(
        catalog: CatalogService,
        gateway: Arc<dyn FulfillmentGateway>,
        allowed: AllowedCountries,
    ) -> Self {
        Self {
            catalog,
            gateway,
            allowed,
        }
    }

    /// Quote every available rate for the cart and address.
    ///
    /// # Errors
    ///
    /// Returns a validation error before any network call, `UnknownVariant`
    /// when a line no longer exists, `NoRates` or `Upstream`.
    #[instrument(skip(self, cart, address), fields(country = %address.country_code))]
    pub async fn quote(
        &self,
        cart: &Cart,
        address: &ShippingAddress,
    ) -> Result<ShippingQuote, ShippingError> {
        validate_cart(cart)?;
        let address = address.normalized();
        address.validate(&self.allowed)?;

        // Aggregate by catalog variant; two designs on one blank ship together
        let mut quantities: BTreeMap<i64, u32> = BTreeMap::new();
        for item in cart.items() {
            let Some(variant_id) = item.variant_id else {
                return Err(ShippingError::MissingVariant(item.name.clone()));
            };
            let variant = match self.catalog.variant(item.product_id, variant_id).await {
                Ok(variant) => variant,
                Err(CatalogError::NotFound(_)) => {
                    return Err(ShippingError::UnknownVariant(item.name.clone()));
                }
                Err(CatalogError::Upstream(e)) => return Err(e.into()),
            };
            *quantities.entry(variant.catalog_variant_id).or_default() += item.quantity;
        }

        let request = ShippingRateRequest {
            recipient: address.to_recipient(),
            items: quantities
                .into_iter()
                .map(|(variant_id, quantity)| RateItem {
                    variant_id,
                    quantity,
                })
                .collect(),
            currency: "EUR".to_string(),
            locale: "nl_BE".to_string(),
        };

        let rates = rank_rates(self.gateway.shipping_rates(&request).await?);
        if rates.is_empty() {
            return Err(ShippingError::NoRates);
        }

        Ok(ShippingQuote { address, rates })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use okapi_core::{CartItem, ProductId, VariantId};

    use super::*;
    use crate::testing::FakeFulfillment;

    pub(crate) fn address(country: &str) -> ShippingAddress {
        ShippingAddress {
            name: Some("Ada Lovelace".to_string()),
            address1: "Rue Neuve 1".to_string(),
            address2: None,
            city: "Brussels".to_string(),
            country_code: country.to_string(),
            state_code: None,
            zip: "1000".to_string(),
        }
    }

    pub(crate) fn tee_cart() -> Cart {
        Cart::from_items([
            CartItem {
                product_id: ProductId::new(1),
                variant_id: Some(VariantId::new(11)),
                name: "Okapi tee / M".to_string(),
                price: Decimal::new(2500, 2),
                quantity: 2,
                image: None,
            },
            CartItem {
                product_id: ProductId::new(2),
                variant_id: Some(VariantId::new(20)),
                name: "Okapi mug".to_string(),
                price: Decimal::new(1200, 2),
                quantity: 1,
                image: None,
            },
        ])
        .unwrap()
    }

    fn calculator(fulfillment: &Arc<FakeFulfillment>) -> ShippingCalculator {
        let gateway: Arc<dyn FulfillmentGateway> = fulfillment.clone();
        ShippingCalculator::new(
            CatalogService::new(gateway.clone()),
            gateway,
            AllowedCountries::default(),
        )
    }

    #[tokio::test]
    async fn test_rates_sorted_with_cheapest_default() {
        let fulfillment = Arc::new(FakeFulfillment::with_catalog());
        let quote = calculator(&fulfillment)
            .quote(&tee_cart(), &address("be"))
            .await
            .unwrap();

        let prices: Vec<Decimal> = quote.rates.iter().map(|r| r.price).collect();
        assert_eq!(prices, vec![Decimal::new(495, 2), Decimal::new(1290, 2)]);
        assert!(quote.rates[0].is_default);
        assert!(!quote.rates[1].is_default);
        assert_eq!(quote.address.country_code, "BE");

        let request = fulfillment.last_rate_request().unwrap();
        let items: Vec<(i64, u32)> = request.items.iter().map(|i| (i.variant_id, i.quantity)).collect();
        assert_eq!(items, vec![(1320, 1), (4011, 2)]);
    }

    #[tokio::test]
    async fn test_missing_variant_rejected_before_network() {
        let fulfillment = Arc::new(FakeFulfillment::with_catalog());
        let mut cart = tee_cart();
        cart.add(CartItem {
            product_id: ProductId::new(1),
            variant_id: None,
            name: "Okapi tee".to_string(),
            price: Decimal::new(2500, 2),
            quantity: 1,
            image: None,
        })
        .unwrap();

        let result = calculator(&fulfillment).quote(&cart, &address("BE")).await;
        assert!(matches!(result, Err(ShippingError::MissingVariant(_))));
        assert_eq!(fulfillment.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_unsupported_country_rejected_before_network() {
        let fulfillment = Arc::new(FakeFulfillment::with_catalog());
        let result = calculator(&fulfillment)
            .quote(&tee_cart(), &address("US"))
            .await;
        assert!(matches!(result, Err(ShippingError::UnsupportedCountry(_))));
        assert_eq!(fulfillment.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_blank_fields_and_empty_cart() {
        let fulfillment = Arc::new(FakeFulfillment::with_catalog());
        let calc = calculator(&fulfillment);

        let mut blank = address("BE");
        blank.city = "  ".to_string();
        assert!(matches!(
            calc.quote(&tee_cart(), &blank).await,
            Err(ShippingError::MissingField("city"))
        ));
        assert!(matches!(
            calc.quote(&Cart::new(), &address("BE")).await,
            Err(ShippingError::EmptyCart)
        ));
        assert_eq!(fulfillment.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_upstream_failure_surfaces() {
        let fulfillment = Arc::new(FakeFulfillment::with_catalog());
        fulfillment.fail_rates();
        let result = calculator(&fulfillment).quote(&tee_cart(), &address("NL")).await;
        assert!(matches!(result, Err(ShippingError::Upstream(_))));
    }

    #[test]
    fn test_quote_lookup() {
        let quote = ShippingQuote {
            address: address("BE"),
            rates: rank_rates(vec![
                ShippingRate {
                    id: "EXPRESS".to_string(),
                    name: "Express".to_string(),
                    rate: Decimal::new(1290, 2),
                    currency: "EUR".to_string(),
                    min_delivery_days: Some(1),
                    max_delivery_days: Some(2),
                },
                ShippingRate {
                    id: "STANDARD".to_string(),
                    name: "Flat Rate".to_string(),
                    rate: Decimal::new(495, 2),
                    currency: "EUR".to_string(),
                    min_delivery_days: Some(3),
                    max_delivery_days: Some(4),
                },
            ]),
        };
        assert_eq!(quote.default_rate().map(|r| r.id.as_str()), Some("STANDARD"));
        assert_eq!(quote.rate("EXPRESS").map(|r| r.price_label.as_str()), Some("€ 12,90"));
        assert!(quote.rate("OVERNIGHT").is_none());
    }
}
