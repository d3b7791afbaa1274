// src/main.rs
use std::time::Duration;

use anyhow::Context;
use axum_server::Handle;
use tracing::info;
use tracing_subscriber::EnvFilter;

use quick_polls::config::Config;
use quick_polls::services::PollService;
use quick_polls::{db, routes, sweeper};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("quick_polls=info,tower_http=info")),
        )
        .init();

    // Loads .env as well
    let config = Config::from_env().context("invalid configuration")?;

    let store = db::connect(&config)
        .await
        .context("failed to open the poll store")?;
    let service = PollService::new(store);

    let sweeper = config
        .reconcile_interval
        .map(|every| sweeper::spawn_sweeper(service.clone(), every));

    let app = routes::create_routes(service);
    let addr = config.socket_addr();

    let handle = Handle::new();
    tokio::spawn(shutdown_on_ctrl_c(handle.clone()));

    info!(%addr, "server running");
    axum_server::bind(addr)
        .handle(handle)
        .serve(app.into_make_service())
        .await
        .context("server error")?;

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }
    info!("server stopped");
    Ok(())
}

async fn shutdown_on_ctrl_c(handle: Handle) {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown requested");
        handle.graceful_shutdown(Some(Duration::from_secs(10)));
    }
}
