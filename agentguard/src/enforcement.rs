//! The enforcement flow: decision engine → approval record → webhook.
//!
//! `policy::evaluate` is pure; this module gives its `RequiresApproval`
//! outcome its side effects — the pending approval row and the
//! `approval.created` notification — and shapes the wire response.

use chrono::Utc;
use guard_core::Agent;
use policy::Decision;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;
use crate::webhook::{ApprovalEvent, EVENT_APPROVAL_CREATED};

#[derive(Debug, Clone, Deserialize)]
pub struct EnforceRequest {
    pub action: String,
    #[serde(default)]
    pub resource: Option<String>,
    #[serde(default)]
    pub context: Option<serde_json::Value>,
}

/// Contract: `allowed` is true iff `status == "allowed"`; `approval_id`
/// is present iff `status == "pending"`.
#[derive(Debug, Clone, Serialize)]
pub struct EnforceResponse {
    pub allowed: bool,
    pub status: &'static str,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_id: Option<Uuid>,
}

/// Evaluate one request for an authenticated agent and perform the
/// pending-path side effects. Decisions never error; only storage can.
pub async fn enforce(
    state: &AppState,
    agent: &Agent,
    request: &EnforceRequest,
) -> Result<EnforceResponse, ApiError> {
    let agent_policy = state.policies.get(&agent.agent_id).await?;

    // Team policy only matters once an agent policy exists; without one
    // the decision is an unconditional deny.
    let team_policy = match &agent_policy {
        Some(_) => state.policies.get_team(&agent.owner_team).await?,
        None => None,
    };

    let decision = policy::evaluate(
        agent_policy.as_ref(),
        team_policy.as_ref(),
        agent.environment,
        &request.action,
        request.resource.as_deref(),
        Utc::now(),
    );

    metrics::counter!("agentguard_enforcement_decisions_total", "status" => decision.status())
        .increment(1);

    let response = match decision {
        Decision::Allowed { reason } => EnforceResponse {
            allowed: true,
            status: "allowed",
            reason,
            approval_id: None,
        },
        Decision::Denied { reason } => EnforceResponse {
            allowed: false,
            status: "denied",
            reason,
            approval_id: None,
        },
        Decision::RequiresApproval { reason, .. } => {
            let approval = state
                .approvals
                .create(
                    &agent.agent_id,
                    &request.action,
                    request.resource.as_deref(),
                    request.context.as_ref(),
                )
                .await?;

            state.webhooks.dispatch(
                EVENT_APPROVAL_CREATED,
                ApprovalEvent {
                    approval_id: approval.approval_id.to_string(),
                    agent_id: agent.agent_id.clone(),
                    agent_name: Some(agent.name.clone()),
                    action: request.action.clone(),
                    resource: request.resource.clone(),
                    context: request.context.clone(),
                    decision_reason: None,
                    decision_by: None,
                },
            );

            EnforceResponse {
                allowed: false,
                status: "pending",
                reason,
                approval_id: Some(approval.approval_id),
            }
        }
    };

    tracing::info!(
        agent_id = %agent.agent_id,
        action = %request.action,
        resource = request.resource.as_deref().unwrap_or(""),
        status = response.status,
        approval_id = ?response.approval_id,
        "Enforcement decision"
    );

    Ok(response)
}
