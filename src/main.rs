mod api;
mod command;
mod config;
mod engine;
mod session;
mod transport;

use anyhow::Context;
use config::ServiceConfig;
use engine::PowerEngine;
use std::net::SocketAddr;
use std::sync::Arc;
use transport::SshConnector;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    dotenvy::dotenv().ok();

    let config = match ServiceConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return Err(e.into());
        }
    };

    info!("iLO power service starting");
    info!("  iLO: {}@{}:{}", config.device.username, config.device.host, config.device.port);
    info!("  HTTP: {}", config.listen_addr);
    info!("  Rate limit: {} requests per {:?}", config.rate_limit.max_requests, config.rate_limit.window);

    let connector = Arc::new(SshConnector::new(
        config.device.clone(),
        config.timing.connect_timeout,
        config.timing.command_timeout,
    ));
    let engine = Arc::new(PowerEngine::new(connector, config.timing.clone()));
    let engine_handle = engine.start().await?;

    let app = api::create_app(engine, config.rate_limit.clone());
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    info!("Listening on {}", config.listen_addr);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    engine_handle.shutdown().await;
    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
