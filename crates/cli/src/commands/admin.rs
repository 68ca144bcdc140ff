//! Admin management commands.
//!
//! Accounts are created through the API; this only changes roles.

use bazaar_core::{Email, UserRole};
use bazaar_server::db::{RepositoryError, UserRepository};
use thiserror::Error;

/// Errors that can occur during admin operations.
#[derive(Debug, Error)]
pub enum AdminError {
    /// Invalid email.
    #[error("Invalid email: {0}")]
    InvalidEmail(#[from] bazaar_core::EmailError),

    /// No account with that email.
    #[error("No user with email: {0}")]
    UserNotFound(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),
}

/// Grant the admin role to the account with `email`.
///
/// # Errors
///
/// Returns an error if the email is malformed, no such user exists or the
/// database is unreachable.
pub async fn promote(email: &str) -> Result<(), Box<dyn std::error::Error>> {
    let email = Email::parse(email).map_err(AdminError::from)?;
    let pool = super::connect().await?;

    let user = UserRepository::new(&pool)
        .set_role(&email, UserRole::Admin)
        .await
        .map_err(|e| match e {
            RepositoryError::NotFound => AdminError::UserNotFound(email.to_string()),
            other => AdminError::Database(other),
        })?;

    tracing::info!(
        "{} ({}) is now an admin",
        user.username.as_str(),
        user.email.as_str()
    );
    Ok(())
}
