//! Token revocation list. One indexed lookup per authenticated request.

use chrono::{DateTime, Utc};
use errors::StorageError;
use guard_core::RevokedToken;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::postgres::{db_err, decode_err};

#[derive(Clone)]
pub struct RevokedTokenStore {
    pool: PgPool,
}

impl RevokedTokenStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a jti into the blocklist. Idempotent: revoking the same
    /// token twice is a no-op.
    pub async fn revoke(&self, jti: Uuid, expires_at: DateTime<Utc>) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO revoked_tokens (jti, expires_at)
             VALUES ($1, $2)
             ON CONFLICT (jti) DO NOTHING",
        )
        .bind(jti)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    pub async fn is_revoked(&self, jti: Uuid) -> Result<bool, StorageError> {
        let hit: Option<i32> = sqlx::query_scalar("SELECT 1 FROM revoked_tokens WHERE jti = $1")
            .bind(jti)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(hit.is_some())
    }

    /// Full blocklist row, for operator inspection.
    pub async fn get(&self, jti: Uuid) -> Result<Option<RevokedToken>, StorageError> {
        let row = sqlx::query(
            "SELECT jti, revoked_at, expires_at FROM revoked_tokens WHERE jti = $1",
        )
        .bind(jti)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(|row| {
            Ok(RevokedToken {
                jti: row.try_get("jti").map_err(decode_err)?,
                revoked_at: row.try_get::<DateTime<Utc>, _>("revoked_at").map_err(decode_err)?,
                expires_at: row.try_get::<DateTime<Utc>, _>("expires_at").map_err(decode_err)?,
            })
        })
        .transpose()
    }

    /// Drop rows whose underlying token has expired anyway. Returns the
    /// number of rows removed.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StorageError> {
        let result = sqlx::query("DELETE FROM revoked_tokens WHERE expires_at < $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected())
    }
}
