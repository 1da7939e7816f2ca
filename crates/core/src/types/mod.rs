//! Core types for the Okapi Store.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod email;
pub mod id;
pub mod price;
pub mod status;

pub use email::{Email, EmailError};
pub use id::*;
pub use price::{PriceError, format_euro_price, from_cents, standardize_price, to_cents};
pub use status::*;
