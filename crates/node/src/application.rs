use std::time::Duration;

use provider_node_deps::{BootstrapError as DepsError, Bootstrapper, Deps};
use provider_node_domain::config::{BootstrapInputs, ConfigError};
use provider_node_domain::services::telemetry::{init_telemetry, TelemetryConfig, TelemetryError};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Time given to the cleanup tasks after shutdown is signalled.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(250);

pub async fn run() -> Result<(), BootstrapError> {
    let inputs = BootstrapInputs::load_from_env()?;

    let telemetry_config = TelemetryConfig::from_env("PROVIDER");
    let telemetry = init_telemetry(&telemetry_config)?;

    let shutdown = CancellationToken::new();
    let bootstrapper = Bootstrapper::new(inputs, shutdown.clone());
    let mut deps = Deps::default();
    bootstrapper.populate_remaining(&mut deps).await?;

    info!(
        repo = %bootstrapper.inputs().repo_path().display(),
        layers = ?bootstrapper.inputs().layers(),
        listen = deps.listen_addr.get().map(String::as_str).unwrap_or_default(),
        miners = deps.miner_addresses.get().map(Vec::len).unwrap_or_default(),
        in_process_metrics = telemetry.render_metrics().is_some(),
        "provider node running"
    );

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    shutdown.cancel();
    tokio::time::sleep(SHUTDOWN_GRACE).await;

    Ok(())
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error(transparent)]
    Deps(#[from] DepsError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
