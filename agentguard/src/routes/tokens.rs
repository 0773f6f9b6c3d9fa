//! Token issuance, revocation, and the public key set.

use auth::{Jwks, hash_key};
use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use errors::TokenError;
use serde::{Deserialize, Serialize};

use crate::auth_resolver::verify_bearer;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    #[serde(default)]
    pub agent_key: Option<String>,
    #[serde(default)]
    pub admin_key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: u64,
}

#[derive(Debug, Serialize)]
pub struct RevokeResponse {
    pub revoked: bool,
}

/// Exchange a static credential for a signed bearer token. Exactly one
/// of `agent_key` / `admin_key` must be provided.
pub async fn issue_token(
    State(state): State<AppState>,
    Json(request): Json<TokenRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    match (&request.agent_key, &request.admin_key) {
        (Some(agent_key), None) => issue_agent_token(&state, agent_key).await,
        (None, Some(admin_key)) => issue_admin_token(&state, admin_key).await,
        _ => Err(ApiError::Validation(
            "Provide either 'agent_key' or 'admin_key'".to_string(),
        )),
    }
}

async fn issue_agent_token(
    state: &AppState,
    agent_key: &str,
) -> Result<Json<TokenResponse>, ApiError> {
    let key_record = state
        .agents
        .find_key_by_hash(&hash_key(agent_key))
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Invalid or inactive agent key".to_string()))?;

    let agent = state
        .agents
        .get_active(&key_record.agent_id)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Agent not found or inactive".to_string()))?;

    let issued = state.tokens.issue_agent_token(&agent, Utc::now())?;

    tracing::info!(agent_id = %agent.agent_id, "Issued agent token");

    Ok(Json(TokenResponse {
        access_token: issued.token,
        token_type: "bearer",
        expires_in: issued.expires_in,
    }))
}

async fn issue_admin_token(
    state: &AppState,
    admin_key: &str,
) -> Result<Json<TokenResponse>, ApiError> {
    if let Some(admin) = state.admin_users.find_active_by_key_hash(&hash_key(admin_key)).await? {
        let issued = state.tokens.issue_admin_token(
            &admin.admin_id,
            admin.role,
            admin.team.as_deref(),
            Utc::now(),
        )?;
        tracing::info!(admin_id = %admin.admin_id, role = %admin.role, "Issued admin token");
        return Ok(Json(TokenResponse {
            access_token: issued.token,
            token_type: "bearer",
            expires_in: issued.expires_in,
        }));
    }

    // Bootstrap key: implicit super-admin with no database row. Removing
    // it from configuration is the only way to revoke it.
    if admin_key != state.settings.admin_api_key {
        return Err(ApiError::Unauthorized("Invalid admin key".to_string()));
    }

    let issued = state.tokens.issue_admin_token(
        "admin",
        guard_core::AdminRole::SuperAdmin,
        None,
        Utc::now(),
    )?;
    tracing::info!("Issued super-admin token for bootstrap key");

    Ok(Json(TokenResponse {
        access_token: issued.token,
        token_type: "bearer",
        expires_in: issued.expires_in,
    }))
}

/// Revoke the presented token by blocklisting its jti. Idempotent in
/// effect: a second call fails verification because the token is already
/// revoked, and the blocklist row is unchanged.
pub async fn revoke_token(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<RevokeResponse>, ApiError> {
    let token = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| {
            ApiError::Unauthorized("Authorization: Bearer <token> header required".to_string())
        })?;

    let claims = verify_bearer(&state, token).await?;
    let jti = claims.jti.ok_or(TokenError::MissingJti)?;
    let expires_at = DateTime::<Utc>::from_timestamp(claims.exp, 0)
        .ok_or_else(|| ApiError::Validation("Token exp is out of range".to_string()))?;

    state.revoked.revoke(jti, expires_at).await?;

    tracing::info!(jti = %jti, sub = %claims.sub, "Token revoked");

    Ok(Json(RevokeResponse { revoked: true }))
}

/// Public keys for third-party verification of AgentGuard tokens.
pub async fn jwks(State(state): State<AppState>) -> Json<Jwks> {
    Json(state.tokens.jwks())
}
