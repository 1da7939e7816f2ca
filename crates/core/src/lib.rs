//! Okapi Core - Shared types library.
//!
//! This crate provides common types used across all Okapi Store components:
//! - `storefront` - Public-facing shop API, checkout, webhooks and admin endpoints
//! - `cli` - Command-line tools for migrations and catalog maintenance
//!
//! # Architecture
//!
//! The core crate contains only types and pure logic - no I/O, no database
//! access, no HTTP clients. This keeps it lightweight and allows it to be used
//! anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for IDs, emails, statuses and euro prices
//! - [`cart`] - The shopping cart model and its derived totals
//! - [`country`] - ISO country codes and the shipping allow-list

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod country;
pub mod types;

pub use cart::{Cart, CartError, CartItem};
pub use country::{AllowedCountries, CountryCode, CountryError};
pub use types::*;
