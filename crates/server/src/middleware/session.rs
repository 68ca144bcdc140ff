//! Session middleware configuration.
//!
//! Sessions only carry short-lived OAuth state (the Google CSRF token);
//! authentication itself is token based. Backed by `PostgreSQL` through
//! tower-sessions.

use sqlx::PgPool;
use tower_sessions::cookie::{SameSite, time::Duration};
use tower_sessions::{Expiry, SessionManagerLayer};
use tower_sessions_sqlx_store::PostgresStore;

use crate::config::ServerConfig;

/// Session cookie name.
pub const SESSION_COOKIE_NAME: &str = "bazaar_session";

/// Idle lifetime of a session. Long enough to finish a Google consent screen.
const SESSION_IDLE_MINUTES: i64 = 30;

/// Create the session layer with `PostgreSQL` store.
///
/// The `tower_sessions.session` table is created by `bz-cli migrate`.
#[must_use]
pub fn create_session_layer(
    pool: &PgPool,
    config: &ServerConfig,
) -> SessionManagerLayer<PostgresStore> {
    let store = PostgresStore::new(pool.clone());

    SessionManagerLayer::new(store)
        .with_name(SESSION_COOKIE_NAME)
        .with_expiry(Expiry::OnInactivity(Duration::minutes(SESSION_IDLE_MINUTES)))
        .with_secure(config.is_secure())
        .with_same_site(SameSite::Lax)
        .with_http_only(true)
        .with_path("/")
}
