//! Storage errors shared by every [`Store`](crate::Store) implementation.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    /// Driver, connection or query failure reported by Postgres.
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// An update or delete matched no row in the named table.
    #[error("no matching row in {0}")]
    NotFound(&'static str),

    #[error("schema migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}
