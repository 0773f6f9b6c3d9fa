//! Approval request repository and state machine enforcement.
//!
//! The `pending → approved | denied` transition is guarded inside the
//! UPDATE itself (`WHERE status = 'pending'`), so two racing decisions
//! resolve to one winner and one conflict without an explicit lock.

use chrono::{DateTime, Utc};
use errors::StorageError;
use guard_core::{ApprovalRequest, ApprovalStatus};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::postgres::{db_err, decode_err};

const APPROVAL_COLUMNS: &str = "approval_id, agent_id, status, action, resource, context, \
                                created_at, decision_at, decision_by, decision_reason";

/// Listing filter. `team` is the caller's scope, not a user filter: when
/// set, only requests from agents owned by that team are visible.
#[derive(Debug, Clone, Default)]
pub struct ApprovalFilter {
    pub status: Option<ApprovalStatus>,
    pub agent_id: Option<String>,
    pub team: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

/// One page of approvals with display names, the filtered total, and the
/// global pending count.
#[derive(Debug, Clone)]
pub struct ApprovalListing {
    pub items: Vec<(ApprovalRequest, Option<String>)>,
    pub total: i64,
    pub pending_count: i64,
}

#[derive(Debug, Clone)]
pub enum DecideOutcome {
    Decided(ApprovalRequest),
    NotFound,
    /// The request had already left `pending`; carries the current status.
    Conflict(ApprovalStatus),
}

#[derive(Debug, Clone)]
pub enum CancelOutcome {
    Cancelled,
    NotFound,
    NotPending(ApprovalStatus),
}

#[derive(Clone)]
pub struct ApprovalStore {
    pool: PgPool,
}

impl ApprovalStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a fresh `pending` request (decision fields all null).
    pub async fn create(
        &self,
        agent_id: &str,
        action: &str,
        resource: Option<&str>,
        context: Option<&serde_json::Value>,
    ) -> Result<ApprovalRequest, StorageError> {
        let row = sqlx::query(&format!(
            "INSERT INTO approval_requests (approval_id, agent_id, status, action, resource, context)
             VALUES ($1, $2, 'pending', $3, $4, $5)
             RETURNING {APPROVAL_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(agent_id)
        .bind(action)
        .bind(resource)
        .bind(context)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        map_approval(&row)
    }

    pub async fn get(&self, approval_id: Uuid) -> Result<Option<ApprovalRequest>, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT {APPROVAL_COLUMNS} FROM approval_requests WHERE approval_id = $1"
        ))
        .bind(approval_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.as_ref().map(map_approval).transpose()
    }

    /// Agent polling path: an agent may only see its own approvals, so a
    /// foreign id behaves exactly like a missing one.
    pub async fn get_for_agent(
        &self,
        approval_id: Uuid,
        agent_id: &str,
    ) -> Result<Option<ApprovalRequest>, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT {APPROVAL_COLUMNS} FROM approval_requests
             WHERE approval_id = $1 AND agent_id = $2"
        ))
        .bind(approval_id)
        .bind(agent_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.as_ref().map(map_approval).transpose()
    }

    pub async fn list(&self, filter: &ApprovalFilter) -> Result<ApprovalListing, StorageError> {
        let rows = sqlx::query(
            "SELECT ar.approval_id, ar.agent_id, ar.status, ar.action, ar.resource, ar.context,
                    ar.created_at, ar.decision_at, ar.decision_by, ar.decision_reason,
                    a.name AS agent_name
             FROM approval_requests ar
             JOIN agents a ON a.agent_id = ar.agent_id
             WHERE ($1::text IS NULL OR a.owner_team = $1)
               AND ($2::text IS NULL OR ar.status = $2)
               AND ($3::text IS NULL OR ar.agent_id = $3)
             ORDER BY ar.created_at DESC
             OFFSET $4 LIMIT $5",
        )
        .bind(&filter.team)
        .bind(filter.status.map(|s| s.as_str()))
        .bind(&filter.agent_id)
        .bind(filter.offset)
        .bind(filter.limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut items = Vec::with_capacity(rows.len());
        for row in &rows {
            let name: Option<String> = row.try_get("agent_name").map_err(decode_err)?;
            items.push((map_approval(row)?, name));
        }

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*)
             FROM approval_requests ar
             JOIN agents a ON a.agent_id = ar.agent_id
             WHERE ($1::text IS NULL OR a.owner_team = $1)
               AND ($2::text IS NULL OR ar.status = $2)
               AND ($3::text IS NULL OR ar.agent_id = $3)",
        )
        .bind(&filter.team)
        .bind(filter.status.map(|s| s.as_str()))
        .bind(&filter.agent_id)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        let pending_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM approval_requests WHERE status = 'pending'")
                .fetch_one(&self.pool)
                .await
                .map_err(db_err)?;

        Ok(ApprovalListing {
            items,
            total,
            pending_count,
        })
    }

    /// Transition a pending request to `approved` or `denied`, stamping
    /// all three decision fields atomically.
    pub async fn decide(
        &self,
        approval_id: Uuid,
        next: ApprovalStatus,
        decided_by: &str,
        reason: &str,
    ) -> Result<DecideOutcome, StorageError> {
        debug_assert!(next.is_terminal());

        let row = sqlx::query(&format!(
            "UPDATE approval_requests
             SET status = $2, decision_at = now(), decision_by = $3, decision_reason = $4
             WHERE approval_id = $1 AND status = 'pending'
             RETURNING {APPROVAL_COLUMNS}"
        ))
        .bind(approval_id)
        .bind(next.as_str())
        .bind(decided_by)
        .bind(reason)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        if let Some(row) = row {
            return Ok(DecideOutcome::Decided(map_approval(&row)?));
        }

        // Nothing updated: either the row is missing or already decided.
        match self.get(approval_id).await? {
            Some(existing) => Ok(DecideOutcome::Conflict(existing.status)),
            None => Ok(DecideOutcome::NotFound),
        }
    }

    /// Delete a pending request. Decided requests are part of the record
    /// and cannot be cancelled.
    pub async fn cancel(&self, approval_id: Uuid) -> Result<CancelOutcome, StorageError> {
        let result = sqlx::query(
            "DELETE FROM approval_requests WHERE approval_id = $1 AND status = 'pending'",
        )
        .bind(approval_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() > 0 {
            return Ok(CancelOutcome::Cancelled);
        }

        match self.get(approval_id).await? {
            Some(existing) => Ok(CancelOutcome::NotPending(existing.status)),
            None => Ok(CancelOutcome::NotFound),
        }
    }
}

fn map_approval(row: &PgRow) -> Result<ApprovalRequest, StorageError> {
    let status: String = row.try_get("status").map_err(decode_err)?;
    Ok(ApprovalRequest {
        approval_id: row.try_get("approval_id").map_err(decode_err)?,
        agent_id: row.try_get("agent_id").map_err(decode_err)?,
        status: status.parse().map_err(decode_err)?,
        action: row.try_get("action").map_err(decode_err)?,
        resource: row.try_get("resource").map_err(decode_err)?,
        context: row.try_get("context").map_err(decode_err)?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at").map_err(decode_err)?,
        decision_at: row
            .try_get::<Option<DateTime<Utc>>, _>("decision_at")
            .map_err(decode_err)?,
        decision_by: row.try_get("decision_by").map_err(decode_err)?,
        decision_reason: row.try_get("decision_reason").map_err(decode_err)?,
    })
}
