//! Compliance summary reporting.

use axum::Json;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use guard_core::AdminRole;
use serde::Deserialize;
use storage::SummaryReport;

use crate::auth_resolver::require_admin;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    #[serde(default)]
    pub days: Option<i64>,
}

/// `GET /reports/summary?days=` — aggregated action and approval counts
/// over a look-back window, team-scoped for scoped callers.
pub async fn summary(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<SummaryQuery>,
) -> Result<Json<SummaryReport>, ApiError> {
    let ctx = require_admin(&state, &headers, AdminRole::Auditor).await?;

    let days = query.days.unwrap_or(30);
    if !(1..=365).contains(&days) {
        return Err(ApiError::Validation("days must be between 1 and 365".to_string()));
    }

    let report = state.reports.summary(days, ctx.team.as_deref()).await?;
    Ok(Json(report))
}
