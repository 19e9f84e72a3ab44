//! Papyrix Web Server
//!
//! Run with: cargo run -p papyrix-web

use std::time::Duration;

use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine; real env vars still apply.
    let _ = dotenvy::dotenv();

    // Initialise structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("papyrix=debug,info")),
        )
        .init();

    info!("Starting Papyrix Web Server...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = papyrix_common::Config::load()?;
    info!(
        "Configuration loaded. Metadata provider: {}, LLM backend: {}, sources: {}",
        config.providers.metadata,
        config.llm.backend,
        config.download.enabled_sources.join(", ")
    );

    let state = papyrix_web::state::AppState::from_config(&config)?;

    // Expired tasks are dropped in the background for the life of the server.
    let _sweeper = state.store.spawn_sweeper(
        Duration::from_secs(config.tasks.sweep_interval_secs),
        Duration::from_secs(config.tasks.ttl_secs),
    );

    let app = papyrix_web::router::build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
