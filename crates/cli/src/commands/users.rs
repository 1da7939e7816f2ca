//! Customer account commands.
//!
//! Guest accounts are created by the payment webhook from a billing email;
//! promoting one marks it as a regular account.

use okapi_core::{Email, EmailError};
use okapi_storefront::db::{RepositoryError, UserRepository, UserStore};

use super::{ConnectError, connect};

/// Errors that can occur while managing users.
#[derive(Debug, thiserror::Error)]
pub enum UserError {
    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error("Invalid email: {0}")]
    InvalidEmail(#[from] EmailError),

    #[error("Database error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("No account with email: {0}")]
    NotFound(String),
}

/// Promote a guest account.
///
/// # Errors
///
/// Returns `UserError::NotFound` if no account uses the email.
pub async fn promote(email: &str) -> Result<(), UserError> {
    let email = Email::parse(email)?;
    let pool = connect().await?;

    let user = UserRepository::new(pool)
        .promote_guest(&email)
        .await?
        .ok_or_else(|| UserError::NotFound(email.to_string()))?;

    tracing::info!(user_id = %user.id, "Account promoted");
    Ok(())
}
