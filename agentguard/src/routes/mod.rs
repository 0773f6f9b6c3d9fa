//! Route table and middleware layers. Handlers parse requests, resolve
//! the caller, delegate to the domain crates, and map results onto the
//! wire — no decision logic lives here.

use axum::Router;
use axum::http::HeaderValue;
use axum::routing::{delete, get, post, put};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub mod admin;
pub mod agents;
pub mod approvals;
pub mod enforce;
pub mod health;
pub mod logs;
pub mod policies;
pub mod reports;
pub mod tokens;

pub fn router(state: AppState) -> Router {
    let origins: Vec<HeaderValue> = state
        .settings
        .cors_origins_list()
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::ready))
        .route("/token", post(tokens::issue_token))
        .route("/token/revoke", post(tokens::revoke_token))
        .route("/.well-known/jwks.json", get(tokens::jwks))
        .route("/agents", post(agents::create_agent).get(agents::list_agents))
        .route(
            "/agents/{agent_id}",
            get(agents::get_agent).delete(agents::delete_agent),
        )
        .route(
            "/agents/{agent_id}/policy",
            put(policies::set_policy).get(policies::get_policy),
        )
        .route("/policy-templates", get(policies::list_templates))
        .route(
            "/teams/{team}/policy",
            put(policies::set_team_policy).get(policies::get_team_policy),
        )
        .route("/enforce", post(enforce::enforce_action))
        .route("/enforce/approval/{approval_id}", get(enforce::poll_own_approval))
        .route("/approvals", get(approvals::list_approvals))
        .route(
            "/approvals/{approval_id}",
            get(approvals::get_approval).delete(approvals::cancel_approval),
        )
        .route("/approvals/{approval_id}/approve", post(approvals::approve_request))
        .route("/approvals/{approval_id}/deny", post(approvals::deny_request))
        .route("/logs", post(logs::create_log).get(logs::query_logs))
        .route("/logs/verify", get(logs::verify_chain))
        .route("/reports/summary", get(reports::summary))
        .route("/admin/users", post(admin::create_admin_user).get(admin::list_admin_users))
        .route("/admin/users/{admin_id}", delete(admin::deactivate_admin_user))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
