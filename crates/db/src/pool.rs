//! Postgres connection pool and embedded migrations.

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use crate::DbError;

/// The pool shared by every store, queue and repository call.
pub type DbPool = PgPool;

/// Connect to `database_url` with at most `max_connections` open at once.
///
/// Callers wait up to ten seconds for a free connection before the query
/// fails with a (transient) pool timeout.
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<DbPool, DbError> {
    info!(target_db = %redacted(database_url), max_connections, "connecting to database");
    let pool = PgPoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Apply the SQL files under the workspace `migrations/` directory.
/// They are embedded at compile time, so the binary needs no files at runtime.
pub async fn run_migrations(pool: &DbPool) -> Result<(), DbError> {
    info!("applying migrations");
    sqlx::migrate!("../../migrations").run(pool).await?;
    Ok(())
}

/// `database_url` with any password replaced, for logging.
fn redacted(database_url: &str) -> String {
    let Some((scheme, rest)) = database_url.split_once("://") else {
        return database_url.to_owned();
    };
    let Some((credentials, host)) = rest.rsplit_once('@') else {
        return database_url.to_owned();
    };
    match credentials.split_once(':') {
        Some((user, _)) => format!("{scheme}://{user}:***@{host}"),
        None => database_url.to_owned(),
    }
}
