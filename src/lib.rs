pub mod api; // Clinician dashboard + chat transport
pub mod checkin; // Conversational check-in and daily prompts
pub mod config;
pub mod core_state; // Transport-agnostic state
pub mod db;
pub mod models;
pub mod pipeline; // Aggregate → trend → alerts
pub mod scoring; // Per-answer sentiment

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

/// Run the service until Ctrl-C: dashboard API plus the prompt scheduler.
pub async fn run() -> Result<(), String> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let engine = config::EngineConfig::from_env();
    let db_path = config::database_path();
    let bind = config::bind_address();

    // Opening SQLite and building a blocking HTTP client both block.
    let core = tokio::task::spawn_blocking(move || core_state::CoreState::open(&db_path, engine))
        .await
        .map_err(|e| format!("Startup task failed: {e}"))?
        .map_err(|e| format!("Failed to open core state: {e}"))?;
    let core = Arc::new(core);

    let server = api::start_dashboard_server(core.clone(), bind).await?;
    tracing::info!(addr = %server.session.server_addr, "Dashboard listening");
    *core.api_server.lock().await = Some(server);

    let scheduler = checkin::start_scheduler(checkin::CheckinScheduler::new(
        core.orchestrator().clone(),
        Arc::new(checkin::LogPromptSink),
    ));

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
    }
    tracing::info!("Shutting down");

    let server = core.api_server.lock().await.take();
    if let Some(server) = server {
        server.stop().await;
    }
    // Joins the scheduler thread; a tick in flight finishes first.
    tokio::task::spawn_blocking(move || {
        drop(scheduler);
        drop(core);
    })
    .await
    .map_err(|e| format!("Shutdown task failed: {e}"))?;

    tracing::info!("{} stopped", config::APP_NAME);
    Ok(())
}
