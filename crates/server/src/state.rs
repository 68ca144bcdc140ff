//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;

use crate::cache::Cache;
use crate::config::ServerConfig;
use crate::services::{EmailService, GoogleClient, MediaService, TokenService};

/// Timeout for outbound calls to Cloudinary and Google.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Error building the application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("SMTP configuration error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like database connections and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ServerConfig,
    pool: PgPool,
    cache: Cache,
    tokens: TokenService,
    media: MediaService,
    email: EmailService,
    google: Option<GoogleClient>,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client or SMTP transport cannot be built.
    pub fn new(config: ServerConfig, pool: PgPool, cache: Cache) -> Result<Self, StateError> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent(concat!("bazaar/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let tokens = TokenService::new(&config.jwt);
        let media = MediaService::new(&config.cloudinary, http.clone());
        let email = EmailService::new(config.email.as_ref())?;
        let google = config
            .google
            .clone()
            .map(|google| GoogleClient::new(google, http));

        if google.is_none() {
            tracing::info!("Google sign-in disabled (GOOGLE_CLIENT_ID not set)");
        }

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                cache,
                tokens,
                media,
                email,
                google,
            }),
        })
    }

    /// Get a reference to the server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// Get a reference to the report/category cache.
    #[must_use]
    pub fn cache(&self) -> &Cache {
        &self.inner.cache
    }

    /// Get a reference to the JWT issuer.
    #[must_use]
    pub fn tokens(&self) -> &TokenService {
        &self.inner.tokens
    }

    /// Get a reference to the Cloudinary client.
    #[must_use]
    pub fn media(&self) -> &MediaService {
        &self.inner.media
    }

    /// Get a reference to the mailer.
    #[must_use]
    pub fn email(&self) -> &EmailService {
        &self.inner.email
    }

    /// The Google OAuth client, if Google sign-in is configured.
    #[must_use]
    pub fn google(&self) -> Option<&GoogleClient> {
        self.inner.google.as_ref()
    }
}
