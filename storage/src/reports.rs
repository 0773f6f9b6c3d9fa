//! Compliance summary aggregation, team-scoped.

use chrono::{DateTime, Duration, Utc};
use errors::StorageError;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use std::collections::HashMap;

use crate::postgres::{db_err, decode_err};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Overview {
    pub total_actions: i64,
    pub allowed: i64,
    pub denied: i64,
    pub allow_rate: f64,
    pub deny_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalStats {
    pub total: i64,
    pub pending: i64,
    pub approved: i64,
    pub denied: i64,
    pub approval_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentActivity {
    pub agent_id: String,
    pub agent_name: String,
    pub total_actions: i64,
    pub allowed: i64,
    pub denied: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeniedAction {
    pub action: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyActivity {
    pub date: String,
    pub total: i64,
    pub allowed: i64,
    pub denied: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryReport {
    pub period_days: i64,
    pub generated_at: DateTime<Utc>,
    pub overview: Overview,
    pub approvals: ApprovalStats,
    pub top_agents: Vec<AgentActivity>,
    pub top_denied_actions: Vec<DeniedAction>,
    pub daily_breakdown: Vec<DailyActivity>,
}

#[derive(Clone)]
pub struct ReportStore {
    pool: PgPool,
}

impl ReportStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Aggregate counts over the last `days` days. `team = Some(..)`
    /// restricts every figure to agents owned by that team.
    pub async fn summary(
        &self,
        days: i64,
        team: Option<&str>,
    ) -> Result<SummaryReport, StorageError> {
        let now = Utc::now();
        let cutoff = now - Duration::days(days);

        let overview_row = sqlx::query(
            "SELECT COUNT(*) AS total,
                    COUNT(*) FILTER (WHERE l.allowed) AS allowed
             FROM audit_logs l
             JOIN agents a ON a.agent_id = l.agent_id
             WHERE l.timestamp >= $1
               AND ($2::text IS NULL OR a.owner_team = $2)",
        )
        .bind(cutoff)
        .bind(team)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        let total_actions: i64 = overview_row.try_get("total").map_err(decode_err)?;
        let allowed: i64 = overview_row.try_get("allowed").map_err(decode_err)?;
        let denied = total_actions - allowed;

        let approvals_row = sqlx::query(
            "SELECT COUNT(*) FILTER (WHERE ar.created_at >= $1) AS total,
                    COUNT(*) FILTER (WHERE ar.status = 'pending') AS pending,
                    COUNT(*) FILTER (WHERE ar.created_at >= $1 AND ar.status = 'approved') AS approved,
                    COUNT(*) FILTER (WHERE ar.created_at >= $1 AND ar.status = 'denied') AS denied
             FROM approval_requests ar
             JOIN agents a ON a.agent_id = ar.agent_id
             WHERE ($2::text IS NULL OR a.owner_team = $2)",
        )
        .bind(cutoff)
        .bind(team)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        let approvals_total: i64 = approvals_row.try_get("total").map_err(decode_err)?;
        let pending: i64 = approvals_row.try_get("pending").map_err(decode_err)?;
        let approved: i64 = approvals_row.try_get("approved").map_err(decode_err)?;
        let denied_approvals: i64 = approvals_row.try_get("denied").map_err(decode_err)?;
        let decided = approved + denied_approvals;

        let top_agent_rows = sqlx::query(
            "SELECT l.agent_id, a.name,
                    COUNT(*) AS total,
                    COUNT(*) FILTER (WHERE l.allowed) AS allowed
             FROM audit_logs l
             JOIN agents a ON a.agent_id = l.agent_id
             WHERE l.timestamp >= $1
               AND ($2::text IS NULL OR a.owner_team = $2)
             GROUP BY l.agent_id, a.name
             ORDER BY COUNT(*) DESC
             LIMIT 10",
        )
        .bind(cutoff)
        .bind(team)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut top_agents = Vec::with_capacity(top_agent_rows.len());
        for row in &top_agent_rows {
            let total: i64 = row.try_get("total").map_err(decode_err)?;
            let agent_allowed: i64 = row.try_get("allowed").map_err(decode_err)?;
            top_agents.push(AgentActivity {
                agent_id: row.try_get("agent_id").map_err(decode_err)?,
                agent_name: row.try_get("name").map_err(decode_err)?,
                total_actions: total,
                allowed: agent_allowed,
                denied: total - agent_allowed,
            });
        }

        let denied_rows = sqlx::query(
            "SELECT l.action, COUNT(*) AS count
             FROM audit_logs l
             JOIN agents a ON a.agent_id = l.agent_id
             WHERE l.timestamp >= $1
               AND NOT l.allowed
               AND ($2::text IS NULL OR a.owner_team = $2)
             GROUP BY l.action
             ORDER BY COUNT(*) DESC
             LIMIT 10",
        )
        .bind(cutoff)
        .bind(team)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut top_denied_actions = Vec::with_capacity(denied_rows.len());
        for row in &denied_rows {
            top_denied_actions.push(DeniedAction {
                action: row.try_get("action").map_err(decode_err)?,
                count: row.try_get("count").map_err(decode_err)?,
            });
        }

        // Per-day counts, zero-filled, capped at 14 days for readability.
        let chart_days = days.min(14);
        let chart_cutoff = (now - Duration::days(chart_days - 1))
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc())
            .unwrap_or(cutoff);

        let daily_rows = sqlx::query(
            "SELECT date_trunc('day', l.timestamp) AS day,
                    COUNT(*) AS total,
                    COUNT(*) FILTER (WHERE l.allowed) AS allowed
             FROM audit_logs l
             JOIN agents a ON a.agent_id = l.agent_id
             WHERE l.timestamp >= $1
               AND ($2::text IS NULL OR a.owner_team = $2)
             GROUP BY 1",
        )
        .bind(chart_cutoff)
        .bind(team)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut per_day: HashMap<String, (i64, i64)> = HashMap::new();
        for row in &daily_rows {
            let day: DateTime<Utc> = row.try_get("day").map_err(decode_err)?;
            let total: i64 = row.try_get("total").map_err(decode_err)?;
            let day_allowed: i64 = row.try_get("allowed").map_err(decode_err)?;
            per_day.insert(day.format("%Y-%m-%d").to_string(), (total, day_allowed));
        }

        let mut daily_breakdown = Vec::with_capacity(chart_days as usize);
        for offset in (0..chart_days).rev() {
            let date = (now - Duration::days(offset)).format("%Y-%m-%d").to_string();
            let (total, day_allowed) = per_day.get(&date).copied().unwrap_or((0, 0));
            daily_breakdown.push(DailyActivity {
                date,
                total,
                allowed: day_allowed,
                denied: total - day_allowed,
            });
        }

        Ok(SummaryReport {
            period_days: days,
            generated_at: now,
            overview: Overview {
                total_actions,
                allowed,
                denied,
                allow_rate: rate(allowed, total_actions),
                deny_rate: rate(denied, total_actions),
            },
            approvals: ApprovalStats {
                total: approvals_total,
                pending,
                approved,
                denied: denied_approvals,
                approval_rate: rate(approved, decided),
            },
            top_agents,
            top_denied_actions,
            daily_breakdown,
        })
    }
}

/// Percentage rounded to one decimal place; zero denominators report 0.
fn rate(part: i64, whole: i64) -> f64 {
    if whole <= 0 {
        return 0.0;
    }
    (part as f64 / whole as f64 * 1000.0).round() / 10.0
}
