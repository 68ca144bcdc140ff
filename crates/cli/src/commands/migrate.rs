//! Database migration command.
//!
//! Applies the schema migrations embedded in `bazaar-server` and creates the
//! `tower_sessions.session` table used by the session store.

use tower_sessions_sqlx_store::PostgresStore;

use bazaar_server::db;

/// Run every migration.
///
/// # Errors
///
/// Returns an error if the database is unreachable or a migration fails.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let pool = super::connect().await?;

    tracing::info!("Running schema migrations...");
    db::run_migrations(&pool).await?;

    tracing::info!("Running session store migration...");
    PostgresStore::new(pool.clone()).migrate().await?;

    tracing::info!("Migrations complete!");
    Ok(())
}
