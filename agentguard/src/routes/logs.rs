//! Audit log endpoints: chained append, filtered query, verification.

use axum::Json;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use chrono::{DateTime, Utc};
use guard_core::{ActionResult, AuditLogEntry};
use serde::{Deserialize, Serialize};
use storage::{ChainVerification, LogFilter, NewAuditLog};
use uuid::Uuid;

use crate::auth_resolver::{Caller, require_admin_or_agent, require_agent};
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AuditLogCreate {
    pub action: String,
    #[serde(default)]
    pub resource: Option<String>,
    #[serde(default)]
    pub context: Option<serde_json::Value>,
    pub allowed: bool,
    pub result: String,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub request_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AuditLogResponse {
    pub log_id: Uuid,
    pub agent_id: String,
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub resource: Option<String>,
    pub context: Option<serde_json::Value>,
    pub allowed: bool,
    pub result: ActionResult,
    pub metadata: Option<serde_json::Value>,
    pub request_id: Option<String>,
    pub previous_hash: String,
}

impl From<AuditLogEntry> for AuditLogResponse {
    fn from(entry: AuditLogEntry) -> Self {
        Self {
            log_id: entry.log_id,
            agent_id: entry.agent_id,
            timestamp: entry.timestamp,
            action: entry.action,
            resource: entry.resource,
            context: entry.context,
            allowed: entry.allowed,
            result: entry.result,
            metadata: entry.metadata,
            request_id: entry.request_id,
            previous_hash: entry.previous_hash,
        }
    }
}

/// `POST /logs` — append one entry to the caller's chain. Entries are
/// immutable once written.
pub async fn create_log(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<AuditLogCreate>,
) -> Result<(StatusCode, Json<AuditLogResponse>), ApiError> {
    let agent = require_agent(&state, &headers).await?;

    let result: ActionResult = body.result.parse().map_err(|_| {
        ApiError::Validation("result must be one of: success, error".to_string())
    })?;
    if body.action.trim().is_empty() {
        return Err(ApiError::Validation("action must not be empty".to_string()));
    }

    let entry = state
        .logs
        .append(
            &agent.agent_id,
            &NewAuditLog {
                action: body.action,
                resource: body.resource,
                context: body.context,
                allowed: body.allowed,
                result,
                metadata: body.metadata,
                request_id: body.request_id,
            },
        )
        .await?;

    tracing::info!(agent_id = %agent.agent_id, log_id = %entry.log_id, action = %entry.action, "Audit log created");

    Ok((StatusCode::CREATED, Json(entry.into())))
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub allowed: Option<bool>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

/// `GET /logs` — agents see only their own entries; admins see their team
/// scope (all teams when unscoped) and may filter by `agent_id`.
pub async fn query_logs(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<LogsQuery>,
) -> Result<Json<Vec<AuditLogResponse>>, ApiError> {
    let caller = require_admin_or_agent(&state, &headers).await?;

    let limit = query.limit.unwrap_or(100);
    if !(1..=1000).contains(&limit) {
        return Err(ApiError::Validation("limit must be between 1 and 1000".to_string()));
    }
    let offset = query.offset.unwrap_or(0);
    if offset < 0 {
        return Err(ApiError::Validation("offset must be non-negative".to_string()));
    }

    let mut filter = LogFilter {
        agent_id: query.agent_id,
        action: query.action,
        allowed: query.allowed,
        start_time: query.start_time,
        end_time: query.end_time,
        team: None,
        limit,
        offset,
    };

    match &caller {
        Caller::Agent(agent) => {
            // The agent_id filter is forced to the caller's own stream.
            filter.agent_id = Some(agent.agent_id.clone());
        }
        Caller::Admin(ctx) => {
            filter.team = ctx.team.clone();
        }
    }

    let entries = state.logs.query(&filter).await?;
    Ok(Json(entries.into_iter().map(AuditLogResponse::from).collect()))
}

#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    #[serde(default)]
    pub agent_id: Option<String>,
}

/// `GET /logs/verify` — walk one agent's chain and report the first
/// broken link. Integrity failures are reported in the body, never as an
/// HTTP error.
pub async fn verify_chain(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<VerifyQuery>,
) -> Result<Json<ChainVerification>, ApiError> {
    let caller = require_admin_or_agent(&state, &headers).await?;

    let agent_id = match &caller {
        Caller::Agent(agent) => agent.agent_id.clone(),
        Caller::Admin(ctx) => {
            let agent_id = query.agent_id.clone().ok_or_else(|| {
                ApiError::Validation("agent_id query parameter is required".to_string())
            })?;
            let agent = state
                .agents
                .get(&agent_id)
                .await?
                .ok_or_else(|| ApiError::NotFound(format!("Agent {agent_id} not found")))?;
            if !ctx.can_see_team(&agent.owner_team) {
                return Err(ApiError::NotFound(format!("Agent {agent_id} not found")));
            }
            agent_id
        }
    };

    let verification = state.logs.verify_chain(&agent_id).await?;
    Ok(Json(verification))
}
