use std::sync::Arc;
use std::time::Duration;

use callcoach_agent::llm::{client_from_config, AdvisoryError};
use callcoach_agent::runtime::{CoachEvent, CoachHandle, CoachRuntime, SystemClock};
use callcoach_core::battlecards::BattlecardLibrary;
use callcoach_core::config::{AppConfig, ConfigError, LoadOptions};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub coach: CoachHandle,
    pub runtime_task: JoinHandle<()>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("advisory client setup failed: {0}")]
    Advisory(#[from] AdvisoryError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    let client = client_from_config(&config.advisory)?;
    info!(
        event_name = "system.bootstrap.advisory_client",
        correlation_id = "bootstrap",
        enabled = client.is_enabled(),
        model = %config.advisory.model,
        "advisory client initialized"
    );

    let library = BattlecardLibrary::builtin();
    info!(
        event_name = "system.bootstrap.library_loaded",
        correlation_id = "bootstrap",
        cards = library.len(),
        aliases = library.aliases().len(),
        "battlecard library loaded"
    );

    let (runtime, coach) = CoachRuntime::new(
        library,
        &config.coaching,
        client,
        Arc::new(SystemClock),
        config.server.event_channel_capacity,
    );
    let runtime_task = runtime.spawn();

    Ok(Application { config, coach, runtime_task })
}

/// Drives the 1 Hz phase timer and advisory cadence until the runtime stops.
pub fn spawn_ticker(coach: CoachHandle) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if coach.send(CoachEvent::Tick).await.is_err() {
                break;
            }
        }
    })
}
