//! Audit log repository: chained append, filtered query, verification.

use chrono::{DateTime, Utc};
use errors::StorageError;
use guard_core::{ActionResult, AuditLogEntry};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::chain::{ChainRow, ChainVerification, genesis_hash, link_hash, verify_rows};
use crate::postgres::{db_err, decode_err};

const LOG_COLUMNS: &str = "id, log_id, agent_id, timestamp, action, resource, context, \
                           allowed, result, metadata, request_id, previous_hash";

/// Caller-supplied fields of a new entry. Identity, timestamp, and chain
/// hash are assigned at insert.
#[derive(Debug, Clone)]
pub struct NewAuditLog {
    pub action: String,
    pub resource: Option<String>,
    pub context: Option<serde_json::Value>,
    pub allowed: bool,
    pub result: ActionResult,
    pub metadata: Option<serde_json::Value>,
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    pub agent_id: Option<String>,
    pub action: Option<String>,
    pub allowed: Option<bool>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// Caller scope, not a user filter: restricts to agents of one team.
    pub team: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Clone)]
pub struct AuditLogStore {
    pool: PgPool,
}

impl AuditLogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Append one entry to the agent's chain.
    ///
    /// Inserts must serialize per agent or two writers could observe the
    /// same tail and mint duplicate `previous_hash` values. The advisory
    /// transaction lock covers the empty-chain case (no tail row to
    /// lock); the `FOR UPDATE` on the tail read covers everything else
    /// and keeps the lock footprint on the hot row.
    pub async fn append(
        &self,
        agent_id: &str,
        new: &NewAuditLog,
    ) -> Result<AuditLogEntry, StorageError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1)::bigint)")
            .bind(agent_id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        let tail = sqlx::query(
            "SELECT log_id, timestamp FROM audit_logs
             WHERE agent_id = $1
             ORDER BY id DESC
             LIMIT 1
             FOR UPDATE",
        )
        .bind(agent_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;

        let new_log_id = Uuid::new_v4();
        let previous_hash = match tail {
            Some(row) => {
                let prev_log_id: Uuid = row.try_get("log_id").map_err(decode_err)?;
                let prev_timestamp: DateTime<Utc> =
                    row.try_get("timestamp").map_err(decode_err)?;
                link_hash(prev_log_id, prev_timestamp, new_log_id, &new.action)
            }
            None => genesis_hash(),
        };

        let row = sqlx::query(&format!(
            "INSERT INTO audit_logs
                 (log_id, agent_id, action, resource, context, allowed, result,
                  metadata, request_id, previous_hash)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             RETURNING {LOG_COLUMNS}"
        ))
        .bind(new_log_id)
        .bind(agent_id)
        .bind(&new.action)
        .bind(&new.resource)
        .bind(&new.context)
        .bind(new.allowed)
        .bind(new.result.as_str())
        .bind(&new.metadata)
        .bind(&new.request_id)
        .bind(&previous_hash)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;

        map_entry(&row)
    }

    /// Filtered query, most recent first.
    pub async fn query(&self, filter: &LogFilter) -> Result<Vec<AuditLogEntry>, StorageError> {
        let rows = sqlx::query(&format!(
            "SELECT {LOG_COLUMNS} FROM audit_logs
             WHERE ($1::text IS NULL OR agent_id = $1)
               AND ($2::text IS NULL OR action = $2)
               AND ($3::boolean IS NULL OR allowed = $3)
               AND ($4::timestamptz IS NULL OR timestamp >= $4)
               AND ($5::timestamptz IS NULL OR timestamp <= $5)
               AND ($6::text IS NULL OR EXISTS (
                       SELECT 1 FROM agents a
                       WHERE a.agent_id = audit_logs.agent_id
                         AND a.owner_team = $6))
             ORDER BY timestamp DESC
             OFFSET $7 LIMIT $8"
        ))
        .bind(&filter.agent_id)
        .bind(&filter.action)
        .bind(filter.allowed)
        .bind(filter.start_time)
        .bind(filter.end_time)
        .bind(&filter.team)
        .bind(filter.offset)
        .bind(filter.limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(map_entry).collect()
    }

    /// Walk one agent's chain in insertion order and report the first
    /// broken link. Integrity failures are a result, not an error.
    pub async fn verify_chain(&self, agent_id: &str) -> Result<ChainVerification, StorageError> {
        let rows = sqlx::query(
            "SELECT log_id, timestamp, action, previous_hash
             FROM audit_logs WHERE agent_id = $1 ORDER BY id ASC",
        )
        .bind(agent_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut chain = Vec::with_capacity(rows.len());
        for row in &rows {
            chain.push(ChainRow {
                log_id: row.try_get("log_id").map_err(decode_err)?,
                timestamp: row.try_get("timestamp").map_err(decode_err)?,
                action: row.try_get("action").map_err(decode_err)?,
                previous_hash: row.try_get("previous_hash").map_err(decode_err)?,
            });
        }

        Ok(verify_rows(&chain))
    }
}

fn map_entry(row: &PgRow) -> Result<AuditLogEntry, StorageError> {
    let result: String = row.try_get("result").map_err(decode_err)?;
    Ok(AuditLogEntry {
        id: row.try_get("id").map_err(decode_err)?,
        log_id: row.try_get("log_id").map_err(decode_err)?,
        agent_id: row.try_get("agent_id").map_err(decode_err)?,
        timestamp: row.try_get::<DateTime<Utc>, _>("timestamp").map_err(decode_err)?,
        action: row.try_get("action").map_err(decode_err)?,
        resource: row.try_get("resource").map_err(decode_err)?,
        context: row.try_get("context").map_err(decode_err)?,
        allowed: row.try_get("allowed").map_err(decode_err)?,
        result: result.parse().map_err(decode_err)?,
        metadata: row.try_get("metadata").map_err(decode_err)?,
        request_id: row.try_get("request_id").map_err(decode_err)?,
        previous_hash: row.try_get("previous_hash").map_err(decode_err)?,
    })
}
