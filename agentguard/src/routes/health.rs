use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use std::time::Instant;

use crate::state::AppState;

/// Liveness: the process is up.
pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "AgentGuard",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// Readiness: the database answers, with its round-trip latency.
pub async fn ready(State(state): State<AppState>) -> Response {
    let started = Instant::now();
    let probe: Result<i32, sqlx::Error> =
        sqlx::query_scalar("SELECT 1").fetch_one(&state.pool).await;
    let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

    match probe {
        Ok(_) => Json(serde_json::json!({
            "status": "ready",
            "checks": {
                "database": true,
                "database_latency_ms": (latency_ms * 100.0).round() / 100.0,
            },
            "timestamp": Utc::now().to_rfc3339(),
        }))
        .into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "Readiness probe failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({
                    "status": "unhealthy",
                    "checks": { "database": false },
                    "timestamp": Utc::now().to_rfc3339(),
                })),
            )
                .into_response()
        }
    }
}
