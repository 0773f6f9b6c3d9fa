//! Named admin account management.

use auth::{generate_key, hash_key, key_prefix, random_id};
use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use chrono::{DateTime, Utc};
use guard_core::{AdminRole, AdminUser};
use serde::{Deserialize, Serialize};
use storage::NewAdminUser;

use crate::auth_resolver::require_admin;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AdminUserCreate {
    pub name: String,
    pub role: String,
    #[serde(default)]
    pub team: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AdminUserResponse {
    pub admin_id: String,
    pub name: String,
    pub key_prefix: String,
    pub role: AdminRole,
    pub team: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<AdminUser> for AdminUserResponse {
    fn from(user: AdminUser) -> Self {
        Self {
            admin_id: user.admin_id,
            name: user.name,
            key_prefix: user.key_prefix,
            role: user.role,
            team: user.team,
            is_active: user.is_active,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AdminUserWithKey {
    #[serde(flatten)]
    pub user: AdminUserResponse,
    pub api_key: String,
}

/// Create a named admin account. The raw `adk_` key is returned once and
/// never stored; exchange it for a role-scoped token via `POST /token`.
pub async fn create_admin_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<AdminUserCreate>,
) -> Result<(StatusCode, Json<AdminUserWithKey>), ApiError> {
    require_admin(&state, &headers, AdminRole::Admin).await?;

    let role: AdminRole = body.role.parse().map_err(|_| {
        ApiError::Validation(
            "role must be one of: super-admin, admin, auditor, approver".to_string(),
        )
    })?;
    if body.name.trim().is_empty() {
        return Err(ApiError::Validation("name must not be empty".to_string()));
    }

    let api_key = generate_key("adk_");
    let user = state
        .admin_users
        .create(&NewAdminUser {
            admin_id: random_id("adm_", 10),
            name: body.name,
            key_hash: hash_key(&api_key),
            key_prefix: key_prefix(&api_key),
            role,
            team: body.team,
        })
        .await?;

    tracing::info!(admin_id = %user.admin_id, role = %user.role, "Admin user created");

    Ok((
        StatusCode::CREATED,
        Json(AdminUserWithKey {
            user: user.into(),
            api_key,
        }),
    ))
}

pub async fn list_admin_users(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<AdminUserResponse>>, ApiError> {
    require_admin(&state, &headers, AdminRole::Admin).await?;
    let users = state.admin_users.list().await?;
    Ok(Json(users.into_iter().map(AdminUserResponse::from).collect()))
}

/// Soft-delete: the account can no longer mint tokens, but its id stays
/// valid in historical `decision_by` fields.
pub async fn deactivate_admin_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(admin_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    require_admin(&state, &headers, AdminRole::Admin).await?;

    if !state.admin_users.deactivate(&admin_id).await? {
        return Err(ApiError::NotFound(format!("Admin user {admin_id} not found")));
    }

    tracing::info!(admin_id = %admin_id, "Admin user deactivated");
    Ok(StatusCode::NO_CONTENT)
}
