//! User domain types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use bazaar_core::{Email, UserId, UserRole, Username};

/// A store account as stored in `users`.
///
/// Holds credentials and reset state; never serialize this directly, use
/// [`PublicUser`] for responses.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: UserId,
    pub username: Username,
    pub email: Email,
    /// Argon2 PHC string. `None` for accounts created through Google.
    pub password_hash: Option<String>,
    pub phone: Option<String>,
    pub role: UserRole,
    /// Cloudinary URL of the avatar image.
    pub avatar: Option<String>,
    pub google_id: Option<String>,
    /// The refresh token most recently issued; rotated on every refresh.
    pub refresh_token: Option<String>,
    pub otp: Option<String>,
    pub otp_expires_at: Option<DateTime<Utc>>,
    /// Set after a successful OTP verification.
    pub reset_allowed_until: Option<DateTime<Utc>>,
    pub failed_login_attempts: i32,
    pub is_locked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The client-facing view of a user.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: UserId,
    pub username: Username,
    pub email: Email,
    pub phone: Option<String>,
    pub role: UserRole,
    pub avatar: Option<String>,
    pub is_locked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            phone: user.phone.clone(),
            role: user.role,
            avatar: user.avatar.clone(),
            is_locked: user.is_locked,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

impl From<User> for PublicUser {
    fn from(user: User) -> Self {
        Self::from(&user)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
impl User {
    /// An unsaved account for unit tests.
    pub(crate) fn sample(role: UserRole) -> Self {
        let now = Utc::now();
        Self {
            id: UserId::generate(),
            username: Username::parse("shopper").unwrap(),
            email: Email::parse("shopper@example.com").unwrap(),
            password_hash: None,
            phone: None,
            role,
            avatar: None,
            google_id: None,
            refresh_token: None,
            otp: None,
            otp_expires_at: None,
            reset_allowed_until: None,
            failed_login_attempts: 0,
            is_locked: false,
            created_at: now,
            updated_at: now,
        }
    }
}
