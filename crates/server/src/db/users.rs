//! User repository for database operations.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use bazaar_core::{Email, UserId, UserRole, Username};

use super::RepositoryError;
use crate::models::User;

const USER_COLUMNS: &str = "id, username, email, password_hash, phone, role, avatar, google_id, \
     refresh_token, otp, otp_expires_at, reset_allowed_until, failed_login_attempts, is_locked, \
     created_at, updated_at";

/// Fields for a new password account.
#[derive(Debug)]
pub struct NewUser<'a> {
    pub username: &'a Username,
    pub email: &'a Email,
    pub password_hash: &'a str,
    pub phone: Option<&'a str>,
    pub avatar: Option<&'a str>,
}

/// Outcome of recording a failed password attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::FromRow)]
pub struct FailedLogin {
    pub failed_login_attempts: i32,
    pub is_locked: bool,
}

/// Repository for user database operations.
pub struct UserRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> UserRepository<'a> {
    /// Create a new user repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get a user by their ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;
        Ok(user)
    }

    /// Get a user by their email address.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(self.pool)
        .await?;
        Ok(user)
    }

    /// Get a user by their Google account id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_google_id(&self, google_id: &str) -> Result<Option<User>, RepositoryError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE google_id = $1"
        ))
        .bind(google_id)
        .fetch_optional(self.pool)
        .await?;
        Ok(user)
    }

    /// Whether an account already uses this email or username.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn exists(&self, email: &Email, username: &Username) -> Result<bool, RepositoryError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM users WHERE email = $1 OR username = $2)",
        )
        .bind(email)
        .bind(username)
        .fetch_one(self.pool)
        .await?;
        Ok(exists)
    }

    /// Whether this username is taken.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn username_taken(&self, username: &str) -> Result<bool, RepositoryError> {
        let taken: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE username = $1)")
                .bind(username)
                .fetch_one(self.pool)
                .await?;
        Ok(taken)
    }

    /// Create a password account.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the email or username already exists.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn create(&self, new: &NewUser<'_>) -> Result<User, RepositoryError> {
        sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (id, username, email, password_hash, phone, avatar) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(UserId::generate())
        .bind(new.username)
        .bind(new.email)
        .bind(new.password_hash)
        .bind(new.phone)
        .bind(new.avatar)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::from_unique_violation(e, "user"))
    }

    /// Create an account from a Google profile (no password).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the email, username or Google id already exists.
    pub async fn create_from_google(
        &self,
        username: &Username,
        email: &Email,
        google_id: &str,
        avatar: Option<&str>,
    ) -> Result<User, RepositoryError> {
        sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (id, username, email, google_id, avatar) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(UserId::generate())
        .bind(username)
        .bind(email)
        .bind(google_id)
        .bind(avatar)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::from_unique_violation(e, "user"))
    }

    /// Attach a Google account to an existing user, keeping any avatar already set.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user does not exist.
    pub async fn link_google(
        &self,
        id: UserId,
        google_id: &str,
        avatar: Option<&str>,
    ) -> Result<User, RepositoryError> {
        sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET google_id = $2, avatar = COALESCE(avatar, $3), updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(google_id)
        .bind(avatar)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| RepositoryError::from_unique_violation(e, "google account"))?
        .ok_or(RepositoryError::NotFound)
    }

    /// List all users, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self) -> Result<Vec<User>, RepositoryError> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC"
        ))
        .fetch_all(self.pool)
        .await?;
        Ok(users)
    }

    /// Delete a user, returning the deleted row.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user does not exist.
    pub async fn delete(&self, id: UserId) -> Result<User, RepositoryError> {
        sqlx::query_as::<_, User>(&format!(
            "DELETE FROM users WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    /// Increment the failed-attempt counter, locking the account once it
    /// reaches `max_attempts`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user does not exist.
    pub async fn record_failed_login(
        &self,
        id: UserId,
        max_attempts: i32,
    ) -> Result<FailedLogin, RepositoryError> {
        sqlx::query_as::<_, FailedLogin>(
            r"
            UPDATE users
            SET failed_login_attempts = failed_login_attempts + 1,
                is_locked = is_locked OR failed_login_attempts + 1 >= $2,
                updated_at = NOW()
            WHERE id = $1
            RETURNING failed_login_attempts, is_locked
            ",
        )
        .bind(id)
        .bind(max_attempts)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    /// Clear the failed-attempt counter and store the newly issued refresh token.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn record_login(&self, id: UserId, refresh_token: &str) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE users SET failed_login_attempts = 0, refresh_token = $2, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(refresh_token)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Replace the stored refresh token, or clear it with `None`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn set_refresh_token(
        &self,
        id: UserId,
        refresh_token: Option<&str>,
    ) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE users SET refresh_token = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(refresh_token)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Swap `current` for `next` only if `current` is still the stored token.
    ///
    /// Returns `false` when the presented token was already rotated or revoked.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn rotate_refresh_token(
        &self,
        id: UserId,
        current: &str,
        next: &str,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE users SET refresh_token = $3, updated_at = NOW() \
             WHERE id = $1 AND refresh_token = $2",
        )
        .bind(id)
        .bind(current)
        .bind(next)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Store a password-reset OTP, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn set_otp(
        &self,
        id: UserId,
        otp: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE users SET otp = $2, otp_expires_at = $3, otp_attempts = 0, \
             reset_allowed_until = NULL, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(otp)
        .bind(expires_at)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Consume the OTP and allow a password reset until `until`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn open_reset_window(
        &self,
        id: UserId,
        until: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE users SET otp = NULL, otp_expires_at = NULL, otp_attempts = 0, \
             reset_allowed_until = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(until)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Count a wrong OTP guess, discarding the code on the `max_attempts`th.
    ///
    /// Returns `true` once the code has been discarded.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn record_otp_miss(&self, id: UserId, max_attempts: i32) -> Result<bool, RepositoryError> {
        let discarded = sqlx::query_scalar::<_, bool>(
            r"
            UPDATE users
            SET otp_attempts = otp_attempts + 1,
                otp = CASE WHEN otp_attempts + 1 >= $2 THEN NULL ELSE otp END,
                otp_expires_at = CASE WHEN otp_attempts + 1 >= $2 THEN NULL ELSE otp_expires_at END,
                updated_at = NOW()
            WHERE id = $1 AND otp IS NOT NULL
            RETURNING otp IS NULL
            ",
        )
        .bind(id)
        .bind(max_attempts)
        .fetch_optional(self.pool)
        .await?;
        Ok(discarded.unwrap_or(true))
    }

    /// Clear an expired OTP.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn clear_otp(&self, id: UserId) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE users SET otp = NULL, otp_expires_at = NULL, otp_attempts = 0, \
             updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Set a new password if the reset window is still open, unlocking the
    /// account and revoking outstanding refresh tokens.
    ///
    /// Returns `false` when no reset window was open.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn reset_password(
        &self,
        id: UserId,
        password_hash: &str,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE users
            SET password_hash = $2,
                reset_allowed_until = NULL,
                failed_login_attempts = 0,
                is_locked = FALSE,
                refresh_token = NULL,
                updated_at = NOW()
            WHERE id = $1 AND reset_allowed_until > NOW()
            ",
        )
        .bind(id)
        .bind(password_hash)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Replace the password hash.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn update_password(
        &self,
        id: UserId,
        password_hash: &str,
    ) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Grant a role by email.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if no user has this email.
    pub async fn set_role(&self, email: &Email, role: UserRole) -> Result<User, RepositoryError> {
        sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET role = $2, updated_at = NOW() WHERE email = $1 \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(email)
        .bind(role)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }
}
