use agentguard::{AppState, router, telemetry};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = config::load_from_env()?;
    telemetry::init(&settings);

    let pool = storage::connect(&settings.database_url, settings.database_pool_size).await?;
    storage::run_migrations(&pool).await?;

    let addr = settings.bind_addr();
    let state = AppState::new(settings, pool)?;
    let app = router(state);

    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "Starting AgentGuard server");
    axum::serve(listener, app).await?;

    Ok(())
}
