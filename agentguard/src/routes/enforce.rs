//! The agent-facing decision endpoint and approval polling.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use guard_core::ApprovalStatus;
use serde::Serialize;
use uuid::Uuid;

use crate::auth_resolver::require_agent;
use crate::enforcement::{self, EnforceRequest, EnforceResponse};
use crate::error::ApiError;
use crate::state::AppState;

/// `POST /enforce` — may this agent perform `(action, resource)` now?
///
/// Never errors on the decision itself: the body always carries one of
/// `allowed` / `denied` / `pending`. When pending, poll
/// `GET /enforce/approval/{approval_id}` until a human decides.
pub async fn enforce_action(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<EnforceRequest>,
) -> Result<Json<EnforceResponse>, ApiError> {
    let agent = require_agent(&state, &headers).await?;
    let response = enforcement::enforce(&state, &agent, &request).await?;
    Ok(Json(response))
}

#[derive(Debug, Serialize)]
pub struct OwnApprovalResponse {
    pub approval_id: Uuid,
    pub status: ApprovalStatus,
    pub decision_reason: Option<String>,
    pub decision_by: Option<String>,
    pub decision_at: Option<DateTime<Utc>>,
}

/// Poll an approval created by this agent. Foreign approval ids are
/// indistinguishable from missing ones.
pub async fn poll_own_approval(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(approval_id): Path<Uuid>,
) -> Result<Json<OwnApprovalResponse>, ApiError> {
    let agent = require_agent(&state, &headers).await?;

    let approval = state
        .approvals
        .get_for_agent(approval_id, &agent.agent_id)
        .await?
        .ok_or_else(|| {
            ApiError::NotFound(format!("Approval {approval_id} not found for this agent"))
        })?;

    Ok(Json(OwnApprovalResponse {
        approval_id: approval.approval_id,
        status: approval.status,
        decision_reason: approval.decision_reason,
        decision_by: approval.decision_by,
        decision_at: approval.decision_at,
    }))
}
