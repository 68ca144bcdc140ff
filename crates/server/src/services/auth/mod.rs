//! Authentication service.
//!
//! Password accounts with lockout, JWT access/refresh tokens, OTP password
//! reset and Google sign-in.

mod error;
pub mod tokens;

pub use error::AuthError;
pub use tokens::{Claims, TokenPair, TokenService};

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;

use bazaar_core::{Email, UserId, Username};

use crate::db::RepositoryError;
use crate::db::users::{NewUser, UserRepository};
use crate::models::{CurrentUser, User};
use crate::services::email::{self, EmailService, OTP_VALID_MINUTES};
use crate::services::google::GoogleProfile;
use crate::services::media::{AVATAR_FOLDER, MediaService, Upload};

/// Minimum password length.
const MIN_PASSWORD_LENGTH: usize = 8;

/// Wrong passwords in a row before an account is locked.
pub const MAX_FAILED_ATTEMPTS: i32 = 5;

/// How long a verified OTP allows a password reset.
const RESET_WINDOW_MINUTES: i64 = 10;

/// Wrong guesses before a reset code is discarded.
pub const MAX_OTP_ATTEMPTS: i32 = 5;

/// Longest phone number the `users.phone` column holds.
const MAX_PHONE_LENGTH: usize = 15;

/// Attempts at finding a free username for a Google account.
const USERNAME_ATTEMPTS: usize = 5;

/// Fields submitted by the registration form.
#[derive(Debug)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
    pub phone: Option<String>,
    pub avatar: Option<Upload>,
}

/// Authentication service.
pub struct AuthService<'a> {
    users: UserRepository<'a>,
    tokens: &'a TokenService,
    email: &'a EmailService,
    media: &'a MediaService,
}

impl<'a> AuthService<'a> {
    /// Create a new authentication service.
    #[must_use]
    pub const fn new(
        pool: &'a PgPool,
        tokens: &'a TokenService,
        email: &'a EmailService,
        media: &'a MediaService,
    ) -> Self {
        Self {
            users: UserRepository::new(pool),
            tokens,
            email,
            media,
        }
    }

    // =========================================================================
    // Registration & Login
    // =========================================================================

    /// Register a new password account with an avatar.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UserAlreadyExists` if the email or username is taken,
    /// `AuthError::AvatarRequired` without an avatar, and validation errors for
    /// malformed fields.
    pub async fn register(&self, form: Registration) -> Result<User, AuthError> {
        let email = Email::parse(&form.email)?;
        let username = Username::parse(&form.username)?;
        validate_password(&form.password)?;
        let phone = normalize_phone(form.phone.as_deref())?;
        let avatar = form.avatar.ok_or(AuthError::AvatarRequired)?;

        if self.users.exists(&email, &username).await? {
            return Err(AuthError::UserAlreadyExists);
        }

        let password_hash = hash_password(&form.password)?;
        let avatar_url = self.media.upload(avatar, AVATAR_FOLDER).await?;

        let created = self
            .users
            .create(&NewUser {
                username: &username,
                email: &email,
                password_hash: &password_hash,
                phone: phone.as_deref(),
                avatar: Some(&avatar_url),
            })
            .await;

        match created {
            Ok(user) => {
                tracing::info!(user_id = %user.id, "user registered");
                Ok(user)
            }
            Err(e) => {
                // Lost a race with another registration; drop the orphaned upload.
                self.media.destroy_all(std::slice::from_ref(&avatar_url)).await;
                Err(match e {
                    RepositoryError::Conflict(_) => AuthError::UserAlreadyExists,
                    other => AuthError::Repository(other),
                })
            }
        }
    }

    /// Log in with email and password.
    ///
    /// The fifth wrong password in a row locks the account and mails the owner.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` for an unknown email or wrong
    /// password and `AuthError::AccountLocked` for a locked account.
    pub async fn login(&self, email: &str, password: &str) -> Result<(User, TokenPair), AuthError> {
        let email = Email::parse(email).map_err(|_| AuthError::InvalidCredentials)?;
        let user = self
            .users
            .get_by_email(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if user.is_locked {
            return Err(AuthError::AccountLocked);
        }

        let Some(password_hash) = user.password_hash.as_deref() else {
            return Err(AuthError::InvalidCredentials);
        };

        if verify_password(password, password_hash).is_err() {
            let failed = self
                .users
                .record_failed_login(user.id, MAX_FAILED_ATTEMPTS)
                .await?;
            tracing::info!(
                user_id = %user.id,
                attempts = failed.failed_login_attempts,
                "failed login"
            );
            if failed.is_locked {
                tracing::warn!(user_id = %user.id, "account locked after repeated failed logins");
                if let Err(e) = self
                    .email
                    .send_account_locked(user.email.as_str(), user.username.as_str())
                    .await
                {
                    tracing::error!(user_id = %user.id, error = %e, "failed to send lock notice");
                }
            }
            return Err(AuthError::InvalidCredentials);
        }

        let tokens = self.tokens.issue(&user)?;
        self.users.record_login(user.id, &tokens.refresh_token).await?;
        Ok((user, tokens))
    }

    /// Revoke the stored refresh token.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Repository` if the database operation fails.
    pub async fn logout(&self, user_id: UserId) -> Result<(), AuthError> {
        self.users.set_refresh_token(user_id, None).await?;
        Ok(())
    }

    /// Exchange a refresh token for a new pair.
    ///
    /// The presented token must verify and be the one currently stored; the
    /// stored token is swapped atomically, so a token can be used only once.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidToken` if the token does not verify, belongs
    /// to no user or was already rotated.
    pub async fn refresh(&self, refresh_token: &str) -> Result<(User, TokenPair), AuthError> {
        let claims = self.tokens.verify_refresh(refresh_token)?;
        let user = self
            .users
            .get_by_id(claims.sub)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        if user.is_locked {
            return Err(AuthError::AccountLocked);
        }

        let tokens = self.tokens.issue(&user)?;
        let rotated = self
            .users
            .rotate_refresh_token(user.id, refresh_token, &tokens.refresh_token)
            .await?;
        if !rotated {
            tracing::warn!(user_id = %user.id, "stale refresh token presented");
            return Err(AuthError::InvalidToken);
        }
        Ok((user, tokens))
    }

    // =========================================================================
    // Password Reset
    // =========================================================================

    /// Mail a reset code if the email belongs to an account.
    ///
    /// Succeeds either way so callers cannot discover which accounts exist.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail` for a malformed address.
    pub async fn forgot_password(&self, email: &str) -> Result<(), AuthError> {
        let email = Email::parse(email)?;
        let Some(user) = self.users.get_by_email(&email).await? else {
            tracing::debug!("password reset requested for unknown email");
            return Ok(());
        };

        let otp = email::generate_otp();
        let expires_at = Utc::now() + Duration::minutes(OTP_VALID_MINUTES);
        self.users.set_otp(user.id, &otp, expires_at).await?;

        if let Err(e) = self
            .email
            .send_otp(user.email.as_str(), user.username.as_str(), &otp)
            .await
        {
            tracing::error!(user_id = %user.id, error = %e, "failed to send reset code");
        }
        Ok(())
    }

    /// Check a reset code and open the reset window.
    ///
    /// Each wrong guess is counted; after [`MAX_OTP_ATTEMPTS`] the code is
    /// discarded and a new one must be requested.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidOtp` for a wrong, discarded or missing code
    /// (or unknown email) and `AuthError::OtpExpired` once the code has expired.
    pub async fn verify_otp(&self, email: &str, otp: &str) -> Result<(), AuthError> {
        let email = Email::parse(email).map_err(|_| AuthError::InvalidOtp)?;
        let user = self
            .users
            .get_by_email(&email)
            .await?
            .ok_or(AuthError::InvalidOtp)?;

        let now = Utc::now();
        match check_otp(user.otp.as_deref(), user.otp_expires_at, otp, now) {
            OtpCheck::Missing => Err(AuthError::InvalidOtp),
            OtpCheck::Mismatch => {
                if self.users.record_otp_miss(user.id, MAX_OTP_ATTEMPTS).await? {
                    tracing::warn!(user_id = %user.id, "reset code discarded after repeated misses");
                }
                Err(AuthError::InvalidOtp)
            }
            OtpCheck::Expired => {
                self.users.clear_otp(user.id).await?;
                Err(AuthError::OtpExpired)
            }
            OtpCheck::Valid => {
                self.users
                    .open_reset_window(user.id, now + Duration::minutes(RESET_WINDOW_MINUTES))
                    .await?;
                Ok(())
            }
        }
    }

    /// Set a new password inside the reset window. Unlocks the account.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::PasswordMismatch` if the confirmation differs and
    /// `AuthError::ResetNotAllowed` without a recently verified code.
    pub async fn reset_password(
        &self,
        email: &str,
        new_password: &str,
        confirm_password: &str,
    ) -> Result<(), AuthError> {
        if new_password != confirm_password {
            return Err(AuthError::PasswordMismatch);
        }
        validate_password(new_password)?;

        let email = Email::parse(email).map_err(|_| AuthError::ResetNotAllowed)?;
        let user = self
            .users
            .get_by_email(&email)
            .await?
            .ok_or(AuthError::ResetNotAllowed)?;

        let password_hash = hash_password(new_password)?;
        if !self.users.reset_password(user.id, &password_hash).await? {
            return Err(AuthError::ResetNotAllowed);
        }
        tracing::info!(user_id = %user.id, "password reset");
        Ok(())
    }

    /// Change the caller's own password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Forbidden` when `target` is not the caller and
    /// `AuthError::InvalidOldPassword` if the old password does not verify.
    pub async fn change_password(
        &self,
        caller: &CurrentUser,
        target: UserId,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        if caller.id != target {
            return Err(AuthError::Forbidden);
        }
        let user = self.get_user(target).await?;
        let current = user
            .password_hash
            .as_deref()
            .ok_or(AuthError::InvalidOldPassword)?;
        verify_password(old_password, current).map_err(|_| AuthError::InvalidOldPassword)?;
        validate_password(new_password)?;

        let password_hash = hash_password(new_password)?;
        self.users.update_password(user.id, &password_hash).await?;
        Ok(())
    }

    // =========================================================================
    // Administration
    // =========================================================================

    /// Every account, newest first.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Repository` if the database operation fails.
    pub async fn list_users(&self) -> Result<Vec<User>, AuthError> {
        Ok(self.users.list().await?)
    }

    /// Delete an account and its avatar.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UserNotFound` if the user doesn't exist.
    pub async fn delete_user(&self, id: UserId) -> Result<User, AuthError> {
        let user = self.users.delete(id).await.map_err(|e| match e {
            RepositoryError::NotFound => AuthError::UserNotFound,
            other => AuthError::Repository(other),
        })?;
        if let Some(avatar) = &user.avatar {
            self.media.destroy_all(std::slice::from_ref(avatar)).await;
        }
        tracing::info!(user_id = %user.id, "user deleted");
        Ok(user)
    }

    /// Get a user by ID.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UserNotFound` if the user doesn't exist.
    pub async fn get_user(&self, user_id: UserId) -> Result<User, AuthError> {
        self.users
            .get_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    // =========================================================================
    // Google Sign-In
    // =========================================================================

    /// Find or create the account for a Google profile and issue tokens.
    ///
    /// An existing password account with the same email gets the Google id
    /// linked to it.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::AccountLocked` for a locked account.
    pub async fn google_login(
        &self,
        profile: &GoogleProfile,
    ) -> Result<(User, TokenPair), AuthError> {
        let user = match self.users.get_by_google_id(&profile.sub).await? {
            Some(user) => user,
            None => self.link_or_create_google_user(profile).await?,
        };

        if user.is_locked {
            return Err(AuthError::AccountLocked);
        }

        let tokens = self.tokens.issue(&user)?;
        self.users.record_login(user.id, &tokens.refresh_token).await?;
        Ok((user, tokens))
    }

    async fn link_or_create_google_user(&self, profile: &GoogleProfile) -> Result<User, AuthError> {
        let email = Email::parse(&profile.email)?;
        let avatar = profile.picture.as_deref();

        if let Some(existing) = self.users.get_by_email(&email).await? {
            tracing::info!(user_id = %existing.id, "linking Google account to existing user");
            return Ok(self.users.link_google(existing.id, &profile.sub, avatar).await?);
        }

        let base = username_base(profile.name.as_deref(), &email);
        for attempt in 0..USERNAME_ATTEMPTS {
            let candidate = if attempt == 0 {
                base.clone()
            } else {
                with_suffix(&base, rand_suffix())
            };
            let username = Username::parse(&candidate)?;
            if self.users.username_taken(username.as_str()).await? {
                continue;
            }
            match self
                .users
                .create_from_google(&username, &email, &profile.sub, avatar)
                .await
            {
                Ok(user) => {
                    tracing::info!(user_id = %user.id, "user registered via Google");
                    return Ok(user);
                }
                Err(RepositoryError::Conflict(_)) => {}
                Err(other) => return Err(other.into()),
            }
        }
        Err(AuthError::UserAlreadyExists)
    }
}

/// Trim a phone number, treating blank as absent.
fn normalize_phone(phone: Option<&str>) -> Result<Option<String>, AuthError> {
    match phone.map(str::trim) {
        None | Some("") => Ok(None),
        Some(p) if p.chars().count() > MAX_PHONE_LENGTH => Err(AuthError::InvalidPhone {
            max: MAX_PHONE_LENGTH,
        }),
        Some(p) => Ok(Some(p.to_owned())),
    }
}

/// A username derived from a Google display name, or the email's local part.
fn username_base(name: Option<&str>, email: &Email) -> String {
    let source = name
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| email.as_str().split('@').next().unwrap_or_default());

    let mut base: String = source
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .flat_map(char::to_lowercase)
        .take(Username::MAX_LENGTH - 5)
        .collect();
    while base.chars().count() < Username::MIN_LENGTH {
        base.push('_');
    }
    base
}

fn with_suffix(base: &str, suffix: u16) -> String {
    format!("{base}{suffix:04}")
}

fn rand_suffix() -> u16 {
    use rand::Rng;
    rand::rng().random_range(0..10_000)
}

/// Validate password meets requirements.
fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}

/// Hash a password using Argon2id.
pub(crate) fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against a hash.
fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
    let argon2 = Argon2::default();

    argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidCredentials)
}

/// Outcome of comparing a submitted reset code with the stored one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OtpCheck {
    /// No code outstanding.
    Missing,
    Mismatch,
    Expired,
    Valid,
}

/// A wrong code is reported as a mismatch even when the stored one has
/// expired, so guesses never learn the expiry.
fn check_otp(
    stored: Option<&str>,
    expires_at: Option<DateTime<Utc>>,
    given: &str,
    now: DateTime<Utc>,
) -> OtpCheck {
    let (Some(stored), Some(expires_at)) = (stored, expires_at) else {
        return OtpCheck::Missing;
    };
    if stored != given.trim() {
        OtpCheck::Mismatch
    } else if expires_at <= now {
        OtpCheck::Expired
    } else {
        OtpCheck::Valid
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_check_otp_outcomes() {
        let now = Utc::now();
        let later = now + Duration::minutes(OTP_VALID_MINUTES);
        let earlier = now - Duration::seconds(1);

        assert_eq!(check_otp(Some("12345"), Some(later), " 12345 ", now), OtpCheck::Valid);
        assert_eq!(check_otp(Some("12345"), Some(later), "54321", now), OtpCheck::Mismatch);
        assert_eq!(check_otp(Some("12345"), Some(earlier), "12345", now), OtpCheck::Expired);
        // an expired code still reads as a plain miss to a wrong guess
        assert_eq!(check_otp(Some("12345"), Some(earlier), "00000", now), OtpCheck::Mismatch);
        assert_eq!(check_otp(None, None, "12345", now), OtpCheck::Missing);
        assert_eq!(check_otp(Some("12345"), None, "12345", now), OtpCheck::Missing);
    }

    #[test]
    fn test_password_round_trip() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct horse", &hash).is_ok());
        assert!(matches!(
            verify_password("wrong horse", &hash),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_validate_password_length() {
        assert!(matches!(
            validate_password("short"),
            Err(AuthError::WeakPassword(_))
        ));
        assert!(validate_password("12345678").is_ok());
    }

    #[test]
    fn test_verify_password_rejects_garbage_hash() {
        assert!(verify_password("anything", "not-a-phc-string").is_err());
    }

    #[test]
    fn test_normalize_phone() {
        assert_eq!(normalize_phone(None).unwrap(), None);
        assert_eq!(normalize_phone(Some("   ")).unwrap(), None);
        assert_eq!(
            normalize_phone(Some(" +15551234567 ")).unwrap(),
            Some("+15551234567".to_owned())
        );
        assert!(matches!(
            normalize_phone(Some("1234567890123456")),
            Err(AuthError::InvalidPhone { max: 15 })
        ));
    }

    #[test]
    fn test_username_base_from_name() {
        let email = Email::parse("jane.doe@example.com").unwrap();
        assert_eq!(username_base(Some("Jane Doe"), &email), "janedoe");
    }

    #[test]
    fn test_username_base_falls_back_to_email() {
        let email = Email::parse("jd@example.com").unwrap();
        assert_eq!(username_base(None, &email), "jd_");
        assert_eq!(username_base(Some("  "), &email), "jd_");
    }

    #[test]
    fn test_username_base_is_valid_with_suffix() {
        let email = Email::parse("x@example.com").unwrap();
        let long_name = "a".repeat(300);
        let base = username_base(Some(&long_name), &email);
        let candidate = with_suffix(&base, 42);
        assert!(candidate.ends_with("0042"));
        assert!(Username::parse(&candidate).is_ok());
    }
}
