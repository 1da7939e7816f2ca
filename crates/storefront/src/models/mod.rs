//! Domain models for the storefront.
//!
//! These are validated domain objects; database row types live next to the
//! queries in [`crate::db`] and are converted on the way out.

pub mod order;
pub mod product;
pub mod review;
pub mod session;
pub mod user;

pub use order::{NewOrder, NewOrderItem, Order, OrderItem, OrderWithItems, ShippingSnapshot};
pub use product::ProductUpsert;
pub use review::{NewReview, Review, ReviewSummary};
pub use session::{CurrentUser, keys};
pub use user::User;
