mod bootstrap;
mod capture;
mod health;

use anyhow::{Context, Result};
use callcoach_core::config::{AppConfig, LoadOptions};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

fn init_logging(config: &AppConfig) {
    use callcoach_core::config::LogFormat::*;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Logging has to come from the same config the runtime is built with.
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener =
        TcpListener::bind(&address).await.with_context(|| format!("failed to bind {address}"))?;

    let router = capture::router(app.coach.clone(), app.config.server.allowed_origin.clone())
        .merge(health::router(app.coach.clone()));
    let server = tokio::spawn(async move { axum::serve(listener, router).await });
    let ticker = bootstrap::spawn_ticker(app.coach.clone());

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        address = %address,
        advisory_enabled = app.config.advisory.enabled,
        "callcoach-server started"
    );
    wait_for_shutdown().await?;
    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "callcoach-server stopping"
    );

    ticker.abort();
    server.abort();
    app.runtime_task.abort();
    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
