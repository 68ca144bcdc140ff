//! Authentication error types.

use thiserror::Error;

use crate::db::RepositoryError;
use crate::services::email::EmailError;
use crate::services::google::GoogleError;
use crate::services::media::MediaError;

/// Errors that can occur during authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] bazaar_core::EmailError),

    /// Invalid username.
    #[error("invalid username: {0}")]
    InvalidUsername(#[from] bazaar_core::UsernameError),

    /// Unknown email or wrong password.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// User not found.
    #[error("user not found")]
    UserNotFound,

    /// Email or username already registered.
    #[error("user already exists")]
    UserAlreadyExists,

    /// Password too weak or invalid.
    #[error("password validation failed: {0}")]
    WeakPassword(String),

    /// New password and confirmation differ.
    #[error("Passwords do not match")]
    PasswordMismatch,

    /// Old password did not verify on change.
    #[error("Invalid old password")]
    InvalidOldPassword,

    /// Account locked after too many failed attempts.
    #[error("User is locked. Please check your email")]
    AccountLocked,

    /// Phone number longer than the column allows.
    #[error("phone number must be at most {max} characters")]
    InvalidPhone { max: usize },

    /// Registration without an avatar file.
    #[error("Avatar file is required")]
    AvatarRequired,

    /// OTP missing or wrong.
    #[error("Invalid OTP")]
    InvalidOtp,

    /// OTP past its expiry.
    #[error("OTP expired")]
    OtpExpired,

    /// No verified OTP within the reset window.
    #[error("Password reset not allowed. Verify your OTP first")]
    ResetNotAllowed,

    /// Missing, malformed, expired or revoked token.
    #[error("invalid or expired token")]
    InvalidToken,

    /// Changing someone else's password.
    #[error("not allowed to modify another user")]
    Forbidden,

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),

    /// Password hashing error.
    #[error("password hashing error")]
    PasswordHash,

    /// Avatar upload failed.
    #[error("media error: {0}")]
    Media(#[from] MediaError),

    /// Sending a mail failed.
    #[error("email error: {0}")]
    Email(#[from] EmailError),

    /// Google sign-in failed.
    #[error("google sign-in failed: {0}")]
    Google(#[from] GoogleError),

    /// Signing a token failed.
    #[error("token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
}
