//! Axum API server binary.

use std::net::SocketAddr;

use anyhow::Context;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ttball_api::{create_router, metrics, ApiConfig, AppState};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    init_tracing();

    if let Err(e) = run().await {
        error!("Server failed: {:#}", e);
        std::process::exit(1);
    }
}

/// Human-readable output by default, JSON lines (with the request span)
/// when `LOG_FORMAT=json`. `RUST_LOG` overrides the `ttball=info` filter.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ttball=info"));
    let registry = tracing_subscriber::registry().with(filter);

    match std::env::var("LOG_FORMAT") {
        Ok(format) if format.eq_ignore_ascii_case("json") => registry
            .with(fmt::layer().json().with_current_span(true).with_span_list(false))
            .init(),
        _ => registry.with(fmt::layer().with_target(true)).init(),
    }
}

async fn run() -> anyhow::Result<()> {
    info!("Starting ttball-api");

    let config = ApiConfig::from_env();
    info!(
        host = %config.host,
        port = config.port,
        root_path = %config.root_path,
        environment = %config.environment,
        "API config loaded"
    );

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid bind address")?;

    let metrics_handle = if config.metrics_enabled {
        info!("Prometheus metrics enabled at /metrics");
        Some(metrics::init_metrics().context("Failed to install Prometheus recorder")?)
    } else {
        None
    };

    let state = AppState::new(config)
        .await
        .context("Failed to create application state")?;

    let app = create_router(state, metrics_handle);

    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to install CTRL+C handler: {}", e);
        return;
    }
    info!("Received shutdown signal");
}
