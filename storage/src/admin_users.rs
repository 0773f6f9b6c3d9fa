//! Named admin account repository.

use chrono::{DateTime, Utc};
use errors::StorageError;
use guard_core::{AdminRole, AdminUser};
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::postgres::{db_err, decode_err};

#[derive(Debug, Clone)]
pub struct NewAdminUser {
    pub admin_id: String,
    pub name: String,
    pub key_hash: String,
    pub key_prefix: String,
    pub role: AdminRole,
    pub team: Option<String>,
}

#[derive(Clone)]
pub struct AdminUserStore {
    pool: PgPool,
}

impl AdminUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, new: &NewAdminUser) -> Result<AdminUser, StorageError> {
        let row = sqlx::query(
            "INSERT INTO admin_users (admin_id, name, key_hash, key_prefix, role, team, is_active)
             VALUES ($1, $2, $3, $4, $5, $6, TRUE)
             RETURNING admin_id, name, key_hash, key_prefix, role, team, is_active, created_at",
        )
        .bind(&new.admin_id)
        .bind(&new.name)
        .bind(&new.key_hash)
        .bind(&new.key_prefix)
        .bind(new.role.as_str())
        .bind(&new.team)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        map_admin_user(&row)
    }

    /// Credential lookup for `POST /token`: active account by key hash.
    pub async fn find_active_by_key_hash(
        &self,
        key_hash: &str,
    ) -> Result<Option<AdminUser>, StorageError> {
        let row = sqlx::query(
            "SELECT admin_id, name, key_hash, key_prefix, role, team, is_active, created_at
             FROM admin_users WHERE key_hash = $1 AND is_active = TRUE",
        )
        .bind(key_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.as_ref().map(map_admin_user).transpose()
    }

    pub async fn list(&self) -> Result<Vec<AdminUser>, StorageError> {
        let rows = sqlx::query(
            "SELECT admin_id, name, key_hash, key_prefix, role, team, is_active, created_at
             FROM admin_users ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(map_admin_user).collect()
    }

    /// Soft-delete: the account stays for the audit trail but can no
    /// longer mint tokens. Returns false when no such account exists.
    pub async fn deactivate(&self, admin_id: &str) -> Result<bool, StorageError> {
        let result = sqlx::query("UPDATE admin_users SET is_active = FALSE WHERE admin_id = $1")
            .bind(admin_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }
}

fn map_admin_user(row: &PgRow) -> Result<AdminUser, StorageError> {
    let role: String = row.try_get("role").map_err(decode_err)?;
    Ok(AdminUser {
        admin_id: row.try_get("admin_id").map_err(decode_err)?,
        name: row.try_get("name").map_err(decode_err)?,
        key_hash: row.try_get("key_hash").map_err(decode_err)?,
        key_prefix: row.try_get("key_prefix").map_err(decode_err)?,
        role: role.parse().map_err(decode_err)?,
        team: row.try_get("team").map_err(decode_err)?,
        is_active: row.try_get("is_active").map_err(decode_err)?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at").map_err(decode_err)?,
    })
}
