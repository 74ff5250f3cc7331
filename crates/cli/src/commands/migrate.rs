//! Database migration command.
//!
//! ```bash
//! ms-cli migrate
//! ```
//!
//! Migrations live in `crates/storefront/migrations/` and are embedded at
//! build time. They include the `shop.session` table used by the session
//! store, so a fresh database is fully ready after one run.

use super::{CommandError, connect};

/// Run all pending migrations.
///
/// # Errors
///
/// Fails if the database is unreachable or a migration does not apply.
pub async fn run() -> Result<(), CommandError> {
    let pool = connect().await?;

    tracing::info!("Running migrations...");
    sqlx::migrate!("../storefront/migrations").run(&pool).await?;

    tracing::info!("Migrations complete!");
    Ok(())
}
