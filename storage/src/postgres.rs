//! Pool construction and the embedded migration sequence.

use errors::StorageError;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Connect a pool to the configured database.
pub async fn connect(database_url: &str, pool_size: u32) -> Result<PgPool, StorageError> {
    PgPoolOptions::new()
        .max_connections(pool_size)
        .connect(database_url)
        .await
        .map_err(|e| StorageError::Database(e.to_string()))
}

/// Run the embedded migration sequence to the latest revision.
///
/// Safe to run on every startup; already-applied migrations are skipped.
pub async fn run_migrations(pool: &PgPool) -> Result<(), StorageError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| StorageError::Migration {
            reason: e.to_string(),
        })?;
    tracing::info!("Database migrations up to date");
    Ok(())
}

pub(crate) fn db_err(e: sqlx::Error) -> StorageError {
    StorageError::Database(e.to_string())
}

pub(crate) fn decode_err(reason: impl std::fmt::Display) -> StorageError {
    StorageError::Serialization {
        reason: reason.to_string(),
    }
}
