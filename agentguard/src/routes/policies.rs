//! Agent policy, team policy, and built-in template endpoints.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use guard_core::{AdminContext, AdminRole, Policy, PolicyRules, Rule, TeamPolicy};
use serde::Serialize;

use crate::auth_resolver::require_admin;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct PolicyResponse {
    pub agent_id: String,
    pub allow: Vec<Rule>,
    pub deny: Vec<Rule>,
    pub require_approval: Vec<Rule>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Policy> for PolicyResponse {
    fn from(policy: Policy) -> Self {
        Self {
            agent_id: policy.agent_id,
            allow: policy.allow,
            deny: policy.deny,
            require_approval: policy.require_approval,
            created_at: policy.created_at,
            updated_at: policy.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TeamPolicyResponse {
    pub team: String,
    pub allow: Vec<Rule>,
    pub deny: Vec<Rule>,
    pub require_approval: Vec<Rule>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<TeamPolicy> for TeamPolicyResponse {
    fn from(policy: TeamPolicy) -> Self {
        Self {
            team: policy.team,
            allow: policy.allow,
            deny: policy.deny,
            require_approval: policy.require_approval,
            created_at: policy.created_at,
            updated_at: policy.updated_at,
        }
    }
}

async fn scoped_agent_lookup(
    state: &AppState,
    ctx: &AdminContext,
    agent_id: &str,
) -> Result<(), ApiError> {
    let agent = state
        .agents
        .get(agent_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Agent {agent_id} not found")))?;
    if !ctx.can_see_team(&agent.owner_team) {
        return Err(ApiError::NotFound(format!("Agent {agent_id} not found")));
    }
    Ok(())
}

fn ensure_team_in_scope(ctx: &AdminContext, team: &str) -> Result<(), ApiError> {
    if ctx.can_see_team(team) {
        Ok(())
    } else {
        Err(ApiError::NotFound(format!("No policy set for team '{team}'")))
    }
}

/// Replace (or create) an agent's policy wholesale.
pub async fn set_policy(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(agent_id): Path<String>,
    Json(rules): Json<PolicyRules>,
) -> Result<Json<PolicyResponse>, ApiError> {
    let ctx = require_admin(&state, &headers, AdminRole::Admin).await?;
    scoped_agent_lookup(&state, &ctx, &agent_id).await?;

    let policy = state.policies.upsert(&agent_id, &rules).await?;
    tracing::info!(agent_id = %agent_id, "Policy set");

    Ok(Json(policy.into()))
}

pub async fn get_policy(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(agent_id): Path<String>,
) -> Result<Json<PolicyResponse>, ApiError> {
    let ctx = require_admin(&state, &headers, AdminRole::Admin).await?;
    scoped_agent_lookup(&state, &ctx, &agent_id).await?;

    let policy = state
        .policies
        .get(&agent_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("No policy found for agent {agent_id}")))?;

    Ok(Json(policy.into()))
}

/// Create or replace a team's base policy. Team deny rules take
/// precedence over member agents' allow rules at decision time.
pub async fn set_team_policy(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(team): Path<String>,
    Json(rules): Json<PolicyRules>,
) -> Result<Json<TeamPolicyResponse>, ApiError> {
    let ctx = require_admin(&state, &headers, AdminRole::Admin).await?;
    ensure_team_in_scope(&ctx, &team)?;

    let policy = state.policies.upsert_team(&team, &rules).await?;
    tracing::info!(team = %team, "Team policy set");

    Ok(Json(policy.into()))
}

pub async fn get_team_policy(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(team): Path<String>,
) -> Result<Json<TeamPolicyResponse>, ApiError> {
    let ctx = require_admin(&state, &headers, AdminRole::Auditor).await?;
    ensure_team_in_scope(&ctx, &team)?;

    let policy = state
        .policies
        .get_team(&team)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("No policy set for team '{team}'")))?;

    Ok(Json(policy.into()))
}

#[derive(Debug, Clone, Serialize)]
pub struct PolicyTemplate {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub tags: Vec<&'static str>,
    pub allow: Vec<Rule>,
    pub deny: Vec<Rule>,
    pub require_approval: Vec<Rule>,
}

/// Built-in rule-set presets for common agent archetypes. Apply one, then
/// customize before saving.
pub async fn list_templates(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<PolicyTemplate>>, ApiError> {
    require_admin(&state, &headers, AdminRole::Admin).await?;
    Ok(Json(builtin_templates()))
}

fn builtin_templates() -> Vec<PolicyTemplate> {
    vec![
        PolicyTemplate {
            id: "read-only",
            name: "Read-Only Agent",
            description: "Can read, list, and query any resource. All writes, deletes, and \
                          executions are blocked. Safe for audit bots and monitoring agents.",
            tags: vec!["safe", "audit", "read-only"],
            allow: vec![
                Rule::new("read:*", "*"),
                Rule::new("list:*", "*"),
                Rule::new("query:*", "*"),
            ],
            deny: vec![
                Rule::new("write:*", "*"),
                Rule::new("delete:*", "*"),
                Rule::new("execute:*", "*"),
                Rule::new("send:*", "*"),
            ],
            require_approval: vec![],
        },
        PolicyTemplate {
            id: "research-agent",
            name: "Research Agent",
            description: "Can search the web and write to the research database. Sensitive \
                          tables are blocked; deletes require human approval.",
            tags: vec!["research", "web-search", "database"],
            allow: vec![
                Rule::new("search:web", "*"),
                Rule::new("read:*", "*"),
                Rule::new("write:database", "research_findings"),
            ],
            deny: vec![
                Rule::new("write:database", "users"),
                Rule::new("write:database", "payments"),
                Rule::new("execute:*", "*"),
            ],
            require_approval: vec![Rule::new("delete:*", "*")],
        },
        PolicyTemplate {
            id: "devops-agent",
            name: "DevOps Agent",
            description: "Can deploy, restart, and monitor services. Production deploys and \
                          deletes require human approval; database writes are blocked.",
            tags: vec!["devops", "deployment", "production"],
            allow: vec![
                Rule::new("deploy:service", "*"),
                Rule::new("restart:service", "*"),
                Rule::new("read:*", "*"),
                Rule::new("query:*", "metrics/*"),
            ],
            deny: vec![
                Rule::new("write:database", "*"),
                Rule::new("execute:script", "production/*"),
            ],
            require_approval: vec![
                Rule::new("delete:*", "production/*"),
                Rule::new("deploy:*", "production/*"),
            ],
        },
        PolicyTemplate {
            id: "full-access-dev",
            name: "Full Access (Development Only)",
            description: "Allows all actions on all resources. Use only in development \
                          environments, never in production.",
            tags: vec!["development", "testing", "unrestricted"],
            allow: vec![Rule::new("*", "*")],
            deny: vec![],
            require_approval: vec![],
        },
    ]
}
