//! Session-related types.
//!
//! Everything the storefront keeps per visitor lives in the session: the
//! cart, the bound user, the last shipping quote and the payment intent.

use serde::{Deserialize, Serialize};

use okapi_core::{Email, UserId};

/// Session-stored user identity.
///
/// Bound after the visitor proves ownership of an order by email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    /// User's database ID.
    pub id: UserId,
    /// User's email address.
    pub email: Email,
}

/// Session keys.
pub mod keys {
    /// Key for the bound user.
    pub const CURRENT_USER: &str = "current_user";

    /// Key for the shopping cart.
    pub const CART: &str = "cart";

    /// Key for the last shipping quote (address + rates).
    pub const SHIPPING_QUOTE: &str = "shipping_quote";

    /// Key for the checkout's payment intent state.
    pub const PAYMENT_INTENT: &str = "payment_intent";
}
