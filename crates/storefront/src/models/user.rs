//! User domain types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use okapi_core::{Email, UserId};

/// An email-keyed customer identity.
///
/// Guests are created from billing emails at order time and can later be
/// promoted in place, so their orders follow the account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    /// Unique user ID.
    pub id: UserId,
    /// User's email address.
    pub email: Email,
    /// Whether this row was created from a billing email only.
    pub is_guest: bool,
    /// When the user was created.
    pub created_at: DateTime<Utc>,
    /// When the user was last updated.
    pub updated_at: DateTime<Utc>,
}
