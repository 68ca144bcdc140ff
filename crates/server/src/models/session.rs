//! Authentication state carried with a request.

use serde::{Deserialize, Serialize};

use bazaar_core::{Email, UserId, UserRole};

/// The authenticated caller, decoded from a verified access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentUser {
    /// User's database ID.
    pub id: UserId,
    /// User's email address.
    pub email: Email,
    /// Role at the time the token was issued.
    pub role: UserRole,
}

impl CurrentUser {
    /// Whether the caller holds the admin role.
    #[must_use]
    pub const fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

/// Session keys.
pub mod keys {
    /// Key for the Google OAuth state (CSRF protection).
    pub const GOOGLE_OAUTH_STATE: &str = "google_oauth_state";
}
