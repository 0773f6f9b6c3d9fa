use auth::TokenService;
use config::Settings;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Instant;
use storage::{
    AdminUserStore, AgentStore, ApprovalStore, AuditLogStore, PolicyStore, ReportStore,
    RevokedTokenStore,
};

use crate::webhook::WebhookDispatcher;

/// Shared per-process state. Everything here is cheap to clone: stores
/// wrap the pool, the token service and settings sit behind `Arc`s.
///
/// The signing keypair inside [`TokenService`] is the only in-memory
/// state that survives across requests; all mutable state is in the
/// database.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub tokens: Arc<TokenService>,
    pub agents: AgentStore,
    pub admin_users: AdminUserStore,
    pub policies: PolicyStore,
    pub approvals: ApprovalStore,
    pub logs: AuditLogStore,
    pub revoked: RevokedTokenStore,
    pub reports: ReportStore,
    pub webhooks: WebhookDispatcher,
    pub pool: PgPool,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(settings: Settings, pool: PgPool) -> Result<Self, anyhow::Error> {
        let tokens = TokenService::new(
            settings.jwt_private_key.as_deref(),
            settings.jwt_key_id.clone(),
            settings.jwt_agent_expire_seconds,
            settings.jwt_admin_expire_seconds,
        )?;

        let webhooks = WebhookDispatcher::new(
            settings.webhook_url.clone(),
            settings.webhook_secret.clone(),
        )?;

        Ok(Self {
            settings: Arc::new(settings),
            tokens: Arc::new(tokens),
            agents: AgentStore::new(pool.clone()),
            admin_users: AdminUserStore::new(pool.clone()),
            policies: PolicyStore::new(pool.clone()),
            approvals: ApprovalStore::new(pool.clone()),
            logs: AuditLogStore::new(pool.clone()),
            revoked: RevokedTokenStore::new(pool.clone()),
            reports: ReportStore::new(pool.clone()),
            webhooks,
            pool,
            started_at: Instant::now(),
        })
    }
}
