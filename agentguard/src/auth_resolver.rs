//! Request authentication: map inbound headers to an identity.
//!
//! Two credential paths, checked in order:
//! 1. `Authorization: Bearer <token>` — verified via the token service,
//!    then checked against the revocation list. The token `type` must
//!    match the endpoint's expectation.
//! 2. Legacy static headers — `X-Agent-Key` carries a raw agent key,
//!    `X-Admin-Key` must equal the configured bootstrap key and yields an
//!    implicit super-admin with no database row.

use auth::{Claims, TokenType, hash_key};
use axum::http::HeaderMap;
use errors::{AuthError, TokenError};
use guard_core::{AdminContext, AdminRole, Agent};

use crate::error::ApiError;
use crate::state::AppState;

/// The identity behind a request on an endpoint that accepts both kinds
/// of caller.
pub enum Caller {
    Admin(AdminContext),
    Agent(Box<Agent>),
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Verify a bearer token end to end: signature, expiry, jti presence,
/// and the revocation list.
pub async fn verify_bearer(state: &AppState, token: &str) -> Result<Claims, ApiError> {
    let claims = state.tokens.verify(token)?;
    let jti = claims.jti.ok_or(TokenError::MissingJti)?;
    if state.revoked.is_revoked(jti).await? {
        return Err(TokenError::Revoked.into());
    }
    Ok(claims)
}

/// Resolve an admin identity and enforce a minimum role.
pub async fn require_admin(
    state: &AppState,
    headers: &HeaderMap,
    min_role: AdminRole,
) -> Result<AdminContext, ApiError> {
    let ctx = resolve_admin(state, headers).await?;
    if !ctx.has_role(min_role) {
        return Err(AuthError::InsufficientRole {
            required: min_role.to_string(),
            actual: ctx.role.to_string(),
        }
        .into());
    }
    Ok(ctx)
}

async fn resolve_admin(state: &AppState, headers: &HeaderMap) -> Result<AdminContext, ApiError> {
    if let Some(token) = bearer_token(headers) {
        let claims = verify_bearer(state, token).await?;
        if claims.token_type != TokenType::Admin {
            return Err(AuthError::WrongTokenType {
                expected: "Admin".to_string(),
            }
            .into());
        }
        // Tokens minted before RBAC carry no role claim; treat as super-admin.
        return Ok(AdminContext {
            sub: claims.sub,
            role: claims.role.unwrap_or(AdminRole::SuperAdmin),
            team: claims.team,
        });
    }

    if let Some(key) = header_value(headers, "x-admin-key") {
        if key == state.settings.admin_api_key {
            return Ok(AdminContext {
                sub: "admin".to_string(),
                role: AdminRole::SuperAdmin,
                team: None,
            });
        }
        return Err(AuthError::InvalidAdminKey.into());
    }

    Err(AuthError::MissingCredentials.into())
}

/// Resolve an agent identity. Inactive agents are blocked on every path.
pub async fn require_agent(state: &AppState, headers: &HeaderMap) -> Result<Agent, ApiError> {
    if let Some(token) = bearer_token(headers) {
        let claims = verify_bearer(state, token).await?;
        if claims.token_type != TokenType::Agent {
            return Err(AuthError::WrongTokenType {
                expected: "Agent".to_string(),
            }
            .into());
        }
        return state
            .agents
            .get_active(&claims.sub)
            .await?
            .ok_or_else(|| AuthError::AgentInactive { agent_id: claims.sub }.into());
    }

    if let Some(key) = header_value(headers, "x-agent-key") {
        let agent_key = state
            .agents
            .find_key_by_hash(&hash_key(key))
            .await?
            .ok_or(AuthError::InvalidAgentKey)?;
        return state
            .agents
            .get_active(&agent_key.agent_id)
            .await?
            .ok_or_else(|| {
                AuthError::AgentInactive {
                    agent_id: agent_key.agent_id,
                }
                .into()
            });
    }

    Err(AuthError::MissingCredentials.into())
}

/// Accept either an admin (any role) or an agent, dispatching on the
/// token `type` for bearer credentials.
pub async fn require_admin_or_agent(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Caller, ApiError> {
    if let Some(token) = bearer_token(headers) {
        let claims = verify_bearer(state, token).await?;
        return match claims.token_type {
            TokenType::Admin => Ok(Caller::Admin(AdminContext {
                sub: claims.sub,
                role: claims.role.unwrap_or(AdminRole::SuperAdmin),
                team: claims.team,
            })),
            TokenType::Agent => {
                let agent = state
                    .agents
                    .get_active(&claims.sub)
                    .await?
                    .ok_or(AuthError::AgentInactive { agent_id: claims.sub })?;
                Ok(Caller::Agent(Box::new(agent)))
            }
        };
    }

    if header_value(headers, "x-admin-key").is_some() {
        return resolve_admin(state, headers).await.map(Caller::Admin);
    }

    if header_value(headers, "x-agent-key").is_some() {
        return require_agent(state, headers).await.map(|a| Caller::Agent(Box::new(a)));
    }

    Err(AuthError::MissingCredentials.into())
}
