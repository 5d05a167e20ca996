//! Errors surfaced by the persistence layer.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    /// Query, connection or pool failure.
    #[error("database query failed: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// A lookup or update matched no row.
    #[error("no matching row")]
    NotFound,

    #[error("failed to apply migrations: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}
