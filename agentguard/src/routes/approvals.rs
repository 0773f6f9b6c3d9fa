//! Approval management (admin surface): list, inspect, decide, cancel.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use chrono::{DateTime, Utc};
use errors::ApprovalError;
use guard_core::{AdminContext, AdminRole, ApprovalRequest, ApprovalStatus};
use serde::{Deserialize, Serialize};
use storage::{ApprovalFilter, CancelOutcome, DecideOutcome};
use uuid::Uuid;

use crate::auth_resolver::require_admin;
use crate::error::ApiError;
use crate::state::AppState;
use crate::webhook::{ApprovalEvent, EVENT_APPROVAL_APPROVED, EVENT_APPROVAL_DENIED};

#[derive(Debug, Deserialize)]
pub struct ApprovalDecisionRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ApprovalResponse {
    pub approval_id: Uuid,
    pub agent_id: String,
    pub agent_name: Option<String>,
    pub status: ApprovalStatus,
    pub action: String,
    pub resource: Option<String>,
    pub context: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub decision_at: Option<DateTime<Utc>>,
    pub decision_by: Option<String>,
    pub decision_reason: Option<String>,
}

fn to_response(approval: ApprovalRequest, agent_name: Option<String>) -> ApprovalResponse {
    ApprovalResponse {
        approval_id: approval.approval_id,
        agent_id: approval.agent_id,
        agent_name,
        status: approval.status,
        action: approval.action,
        resource: approval.resource,
        context: approval.context,
        created_at: approval.created_at,
        decision_at: approval.decision_at,
        decision_by: approval.decision_by,
        decision_reason: approval.decision_reason,
    }
}

#[derive(Debug, Serialize)]
pub struct ApprovalListResponse {
    pub items: Vec<ApprovalResponse>,
    pub total: i64,
    pub pending_count: i64,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

/// List approvals, newest first. Team-scoped callers only see requests
/// from their team's agents; `pending_count` stays global.
pub async fn list_approvals(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApprovalListResponse>, ApiError> {
    let ctx = require_admin(&state, &headers, AdminRole::Approver).await?;

    let status = query
        .status
        .as_deref()
        .map(|raw| {
            raw.parse::<ApprovalStatus>().map_err(|_| {
                ApiError::Validation(
                    "status must be one of: pending, approved, denied".to_string(),
                )
            })
        })
        .transpose()?;

    let limit = query.limit.unwrap_or(100);
    if !(1..=500).contains(&limit) {
        return Err(ApiError::Validation("limit must be between 1 and 500".to_string()));
    }
    let offset = query.offset.unwrap_or(0);
    if offset < 0 {
        return Err(ApiError::Validation("offset must be non-negative".to_string()));
    }

    let listing = state
        .approvals
        .list(&ApprovalFilter {
            status,
            agent_id: query.agent_id,
            team: ctx.team,
            limit,
            offset,
        })
        .await?;

    Ok(Json(ApprovalListResponse {
        items: listing
            .items
            .into_iter()
            .map(|(approval, name)| to_response(approval, name))
            .collect(),
        total: listing.total,
        pending_count: listing.pending_count,
    }))
}

/// Fetch an approval, enforcing team scope through its agent. Out-of-scope
/// ids read as missing.
async fn scoped_approval(
    state: &AppState,
    ctx: &AdminContext,
    approval_id: Uuid,
) -> Result<(ApprovalRequest, Option<String>), ApiError> {
    let approval = state
        .approvals
        .get(approval_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Approval {approval_id} not found")))?;

    let agent = state.agents.get(&approval.agent_id).await?;
    if let Some(agent) = &agent {
        if !ctx.can_see_team(&agent.owner_team) {
            return Err(ApiError::NotFound(format!("Approval {approval_id} not found")));
        }
    }

    Ok((approval, agent.map(|a| a.name)))
}

pub async fn get_approval(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(approval_id): Path<Uuid>,
) -> Result<Json<ApprovalResponse>, ApiError> {
    let ctx = require_admin(&state, &headers, AdminRole::Approver).await?;
    let (approval, agent_name) = scoped_approval(&state, &ctx, approval_id).await?;
    Ok(Json(to_response(approval, agent_name)))
}

pub async fn approve_request(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(approval_id): Path<Uuid>,
    Json(decision): Json<ApprovalDecisionRequest>,
) -> Result<Json<ApprovalResponse>, ApiError> {
    decide(
        state,
        headers,
        approval_id,
        ApprovalStatus::Approved,
        decision.reason.unwrap_or_else(|| "Approved by admin".to_string()),
    )
    .await
}

pub async fn deny_request(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(approval_id): Path<Uuid>,
    Json(decision): Json<ApprovalDecisionRequest>,
) -> Result<Json<ApprovalResponse>, ApiError> {
    decide(
        state,
        headers,
        approval_id,
        ApprovalStatus::Denied,
        decision.reason.unwrap_or_else(|| "Denied by admin".to_string()),
    )
    .await
}

async fn decide(
    state: AppState,
    headers: HeaderMap,
    approval_id: Uuid,
    next: ApprovalStatus,
    reason: String,
) -> Result<Json<ApprovalResponse>, ApiError> {
    let ctx = require_admin(&state, &headers, AdminRole::Approver).await?;
    let (_, agent_name) = scoped_approval(&state, &ctx, approval_id).await?;

    let outcome = state.approvals.decide(approval_id, next, &ctx.sub, &reason).await?;
    let approval = match outcome {
        DecideOutcome::Decided(approval) => approval,
        DecideOutcome::NotFound => {
            return Err(ApiError::NotFound(format!("Approval {approval_id} not found")));
        }
        DecideOutcome::Conflict(status) => {
            return Err(ApiError::Conflict(
                ApprovalError::AlreadyDecided {
                    status: status.to_string(),
                }
                .to_string(),
            ));
        }
    };

    tracing::info!(
        approval_id = %approval_id,
        agent_id = %approval.agent_id,
        status = %approval.status,
        decided_by = %ctx.sub,
        "Approval decided"
    );

    let event = match next {
        ApprovalStatus::Approved => EVENT_APPROVAL_APPROVED,
        _ => EVENT_APPROVAL_DENIED,
    };
    state.webhooks.dispatch(
        event,
        ApprovalEvent {
            approval_id: approval.approval_id.to_string(),
            agent_id: approval.agent_id.clone(),
            agent_name: agent_name.clone(),
            action: approval.action.clone(),
            resource: approval.resource.clone(),
            context: None,
            decision_reason: approval.decision_reason.clone(),
            decision_by: approval.decision_by.clone(),
        },
    );

    Ok(Json(to_response(approval, agent_name)))
}

/// Cancel (delete) a pending request. Decided requests are immutable
/// history.
pub async fn cancel_approval(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(approval_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let ctx = require_admin(&state, &headers, AdminRole::Admin).await?;
    scoped_approval(&state, &ctx, approval_id).await?;

    match state.approvals.cancel(approval_id).await? {
        CancelOutcome::Cancelled => {
            tracing::info!(approval_id = %approval_id, "Approval cancelled");
            Ok(StatusCode::NO_CONTENT)
        }
        CancelOutcome::NotFound => {
            Err(ApiError::NotFound(format!("Approval {approval_id} not found")))
        }
        CancelOutcome::NotPending(status) => Err(ApiError::Conflict(
            ApprovalError::NotCancellable {
                status: status.to_string(),
            }
            .to_string(),
        )),
    }
}
