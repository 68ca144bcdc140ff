//! Access and refresh tokens (HS256 JWTs).
//!
//! The two kinds are signed with separate secrets and carry a `kind` claim,
//! so a refresh token never passes as an access token or the other way round.

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use bazaar_core::{Email, UserId, UserRole};

use super::AuthError;
use crate::config::JwtConfig;
use crate::models::{CurrentUser, User};

/// Which secret a token was signed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// JWT claims for both token kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: UserId,
    pub email: Email,
    pub role: UserRole,
    pub exp: i64,
    pub iat: i64,
    /// Unique per token, so two tokens issued in the same second differ.
    pub jti: Uuid,
    pub kind: TokenKind,
}

impl From<Claims> for CurrentUser {
    fn from(claims: Claims) -> Self {
        Self {
            id: claims.sub,
            email: claims.email,
            role: claims.role,
        }
    }
}

/// A freshly issued access/refresh pair.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl KeyPair {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

/// Issues and verifies tokens.
pub struct TokenService {
    access: KeyPair,
    refresh: KeyPair,
    access_ttl: Duration,
    refresh_ttl: Duration,
    validation: Validation,
}

impl TokenService {
    /// Build a token service from configuration.
    #[must_use]
    pub fn new(config: &JwtConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            access: KeyPair::from_secret(config.access_secret.expose_secret()),
            refresh: KeyPair::from_secret(config.refresh_secret.expose_secret()),
            access_ttl: Duration::minutes(config.access_ttl_minutes),
            refresh_ttl: Duration::days(config.refresh_ttl_days),
            validation,
        }
    }

    /// Lifetime of access tokens.
    #[must_use]
    pub const fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    /// Lifetime of refresh tokens.
    #[must_use]
    pub const fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    /// Issue a new access/refresh pair for `user`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Token` if signing fails.
    pub fn issue(&self, user: &User) -> Result<TokenPair, AuthError> {
        Ok(TokenPair {
            access_token: self.sign(user, TokenKind::Access)?,
            refresh_token: self.sign(user, TokenKind::Refresh)?,
        })
    }

    /// Verify an access token.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidToken` if the token is malformed, expired,
    /// signed with the wrong secret or is not an access token.
    pub fn verify_access(&self, token: &str) -> Result<Claims, AuthError> {
        self.verify(token, TokenKind::Access)
    }

    /// Verify a refresh token's signature and expiry.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidToken` if the token does not verify.
    pub fn verify_refresh(&self, token: &str) -> Result<Claims, AuthError> {
        self.verify(token, TokenKind::Refresh)
    }

    fn keys(&self, kind: TokenKind) -> &KeyPair {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    fn sign(&self, user: &User, kind: TokenKind) -> Result<String, AuthError> {
        let now = Utc::now();
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let claims = Claims {
            sub: user.id,
            email: user.email.clone(),
            role: user.role,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            jti: Uuid::new_v4(),
            kind,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.keys(kind).encoding)?;
        Ok(token)
    }

    fn verify(&self, token: &str, kind: TokenKind) -> Result<Claims, AuthError> {
        let data = decode::<Claims>(token, &self.keys(kind).decoding, &self.validation).map_err(
            |e| {
                tracing::debug!(error = %e, ?kind, "token rejected");
                AuthError::InvalidToken
            },
        )?;
        if data.claims.kind != kind {
            return Err(AuthError::InvalidToken);
        }
        Ok(data.claims)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::tests::test_config;

    fn user() -> User {
        let now = Utc::now();
        User {
            id: UserId::generate(),
            username: bazaar_core::Username::parse("shopper").unwrap(),
            email: Email::parse("shopper@example.com").unwrap(),
            password_hash: None,
            phone: None,
            role: UserRole::User,
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

    #[test]
    fn issued_tokens_verify_with_their_own_kind() {
        let tokens = TokenService::new(&test_config().jwt);
        let user = user();
        let pair = tokens.issue(&user).unwrap();

        let access = tokens.verify_access(&pair.access_token).unwrap();
        assert_eq!(access.sub, user.id);
        assert_eq!(access.kind, TokenKind::Access);

        let refresh = tokens.verify_refresh(&pair.refresh_token).unwrap();
        assert_eq!(refresh.sub, user.id);
        assert!(refresh.exp > access.exp);
    }

    #[test]
    fn kinds_are_not_interchangeable() {
        let tokens = TokenService::new(&test_config().jwt);
        let pair = tokens.issue(&user()).unwrap();

        assert!(matches!(
            tokens.verify_access(&pair.refresh_token),
            Err(AuthError::InvalidToken)
        ));
        assert!(matches!(
            tokens.verify_refresh(&pair.access_token),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn consecutive_pairs_differ() {
        let tokens = TokenService::new(&test_config().jwt);
        let user = user();
        let first = tokens.issue(&user).unwrap();
        let second = tokens.issue(&user).unwrap();
        assert_ne!(first.refresh_token, second.refresh_token);
    }

    #[test]
    fn expired_token_is_rejected() {
        let mut config = test_config().jwt;
        config.access_ttl_minutes = -10;
        let tokens = TokenService::new(&config);
        let pair = tokens.issue(&user()).unwrap();
        assert!(tokens.verify_access(&pair.access_token).is_err());
    }

    #[test]
    fn garbage_is_rejected() {
        let tokens = TokenService::new(&test_config().jwt);
        assert!(tokens.verify_access("not.a.jwt").is_err());
    }
}
