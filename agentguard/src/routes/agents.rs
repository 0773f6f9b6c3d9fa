//! Agent lifecycle management (admin surface).

use auth::{generate_key, hash_key, key_prefix, random_id};
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use chrono::{DateTime, Utc};
use guard_core::{AdminContext, AdminRole, Agent, Environment};
use serde::{Deserialize, Serialize};
use storage::NewAgent;

use crate::auth_resolver::require_admin;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AgentCreate {
    pub name: String,
    pub owner_team: String,
    pub environment: String,
}

#[derive(Debug, Serialize)]
pub struct AgentResponse {
    pub agent_id: String,
    pub name: String,
    pub owner_team: String,
    pub environment: Environment,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Agent> for AgentResponse {
    fn from(agent: Agent) -> Self {
        Self {
            agent_id: agent.agent_id,
            name: agent.name,
            owner_team: agent.owner_team,
            environment: agent.environment,
            is_active: agent.is_active,
            created_at: agent.created_at,
            updated_at: agent.updated_at,
        }
    }
}

/// Creation response: the only place the raw key ever appears.
#[derive(Debug, Serialize)]
pub struct AgentWithKey {
    #[serde(flatten)]
    pub agent: AgentResponse,
    pub api_key: String,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub skip: Option<i64>,
    #[serde(default)]
    pub limit: Option<i64>,
}

fn parse_environment(raw: &str) -> Result<Environment, ApiError> {
    raw.parse().map_err(|_| {
        ApiError::Validation(format!(
            "environment must be one of development, staging, production (got '{raw}')"
        ))
    })
}

fn ensure_team_scope(ctx: &AdminContext, agent: &Agent) -> Result<(), ApiError> {
    if ctx.can_see_team(&agent.owner_team) {
        Ok(())
    } else {
        // 404 rather than 403 so scoped callers cannot probe existence.
        Err(ApiError::NotFound(format!("Agent {} not found", agent.agent_id)))
    }
}

pub async fn create_agent(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<AgentCreate>,
) -> Result<(StatusCode, Json<AgentWithKey>), ApiError> {
    require_admin(&state, &headers, AdminRole::Admin).await?;

    let environment = parse_environment(&body.environment)?;
    if body.name.trim().is_empty() {
        return Err(ApiError::Validation("name must not be empty".to_string()));
    }
    if body.owner_team.trim().is_empty() {
        return Err(ApiError::Validation("owner_team must not be empty".to_string()));
    }

    let agent_id = random_id(&state.settings.agent_id_prefix, 12);
    let api_key = generate_key(&state.settings.api_key_prefix);

    let agent = state
        .agents
        .create(&NewAgent {
            agent_id,
            name: body.name,
            owner_team: body.owner_team,
            environment,
            key_hash: hash_key(&api_key),
            key_prefix: key_prefix(&api_key),
        })
        .await?;

    tracing::info!(agent_id = %agent.agent_id, team = %agent.owner_team, "Agent created");

    Ok((
        StatusCode::CREATED,
        Json(AgentWithKey {
            agent: agent.into(),
            api_key,
        }),
    ))
}

pub async fn list_agents(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<AgentResponse>>, ApiError> {
    let ctx = require_admin(&state, &headers, AdminRole::Admin).await?;

    let environment = query.environment.as_deref().map(parse_environment).transpose()?;
    let skip = query.skip.unwrap_or(0).max(0);
    let limit = query.limit.unwrap_or(100);
    if !(1..=1000).contains(&limit) {
        return Err(ApiError::Validation("limit must be between 1 and 1000".to_string()));
    }

    let agents = state
        .agents
        .list(environment, ctx.team.as_deref(), skip, limit)
        .await?;

    Ok(Json(agents.into_iter().map(AgentResponse::from).collect()))
}

pub async fn get_agent(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(agent_id): Path<String>,
) -> Result<Json<AgentResponse>, ApiError> {
    let ctx = require_admin(&state, &headers, AdminRole::Admin).await?;

    let agent = state
        .agents
        .get(&agent_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Agent {agent_id} not found")))?;
    ensure_team_scope(&ctx, &agent)?;

    Ok(Json(agent.into()))
}

/// Hard delete: keys, policy, approvals, and logs cascade with the row.
pub async fn delete_agent(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(agent_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let ctx = require_admin(&state, &headers, AdminRole::Admin).await?;

    let agent = state
        .agents
        .get(&agent_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Agent {agent_id} not found")))?;
    ensure_team_scope(&ctx, &agent)?;

    state.agents.delete(&agent_id).await?;
    tracing::info!(agent_id = %agent_id, "Agent deleted");

    Ok(StatusCode::NO_CONTENT)
}
