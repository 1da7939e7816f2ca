//! Business logic services for the storefront.
//!
//! Services hold `Arc<dyn Trait>` handles to their collaborators so that
//! tests can swap in the in-memory fakes from `crate::testing`.
//!
//! # Services
//!
//! - `catalog` - Cached Printful product catalog
//! - `shipping` - Shipping quotes for the cart
//! - `payment_intent` - Keeps the checkout's payment intent in sync
//! - `checkout` - Hosted Stripe Checkout sessions
//! - `reconcile` - Webhook-driven order creation and status changes
//! - `orders` - Customer order lookup
//! - `reviews` - Verified-purchase reviews
//! - `admin` - Back-office order management and statistics
//! - `email` - Order confirmation email
//! - `mailchimp` - Newsletter subscriptions

pub mod admin;
pub mod catalog;
pub mod checkout;
pub mod email;
pub mod mailchimp;
pub mod orders;
pub mod payment_intent;
pub mod reconcile;
pub mod reviews;
pub mod shipping;

pub use admin::{AdminError, AdminService};
pub use catalog::{CatalogError, CatalogService};
pub use checkout::{CheckoutError, CheckoutService};
pub use email::{EmailError, Mailer, SmtpMailer};
pub use mailchimp::{MailchimpClient, MailchimpError, MailingList, Subscription};
pub use orders::{OrderError, OrderService};
pub use payment_intent::{PaymentIntentError, PaymentIntentSync};
pub use reconcile::{OrderReconciler, Outcome, ReconcileError};
pub use reviews::{ReviewError, ReviewService};
pub use shipping::{ShippingCalculator, ShippingError, ShippingQuote};
