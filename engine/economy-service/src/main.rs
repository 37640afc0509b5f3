//! Casino Economy Service
//!
//! Main entry point: loads configuration, opens the wallet store, builds the
//! fairness engine and runs the payout scheduler until a shutdown signal.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::info;

use economy_service::{
    graceful_shutdown, initialize_logging, install_metrics_exporter, load_configuration,
    setup_signal_handlers, validate_config, Cli, ServiceState,
};
use payout_scheduler::EpochOutcome;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let mut service_config = load_configuration(cli.config.as_deref())?;
    cli.apply(&mut service_config);
    validate_config(&service_config).context("Invalid configuration after CLI overrides")?;

    // Held until exit so buffered file logs are flushed
    let _log_guard = initialize_logging(&service_config.logging)?;

    info!("Starting Casino Economy Service v{}", env!("CARGO_PKG_VERSION"));

    if cli.check_config {
        println!("{}", toml::to_string_pretty(&service_config).context("Failed to render configuration")?);
        info!("Configuration is valid");
        return Ok(());
    }

    install_metrics_exporter(&service_config.metrics)?;

    let service_state = Arc::new(ServiceState::new(service_config).await?);
    info!("Service state initialized");

    if let Some(job) = cli.run_once {
        let outcome = service_state.run_once(job.into()).await?;
        let rendered = match &outcome {
            EpochOutcome::Hourly(report) => serde_json::to_string_pretty(report)?,
            EpochOutcome::Daily(report) => serde_json::to_string_pretty(report)?,
            EpochOutcome::Skipped { job, last_marker } => {
                format!("{} epoch already ran at {}", job.as_str(), last_marker)
            }
        };
        println!("{}", rendered);
        return Ok(());
    }

    let mut shutdown_signal = setup_signal_handlers(service_state.clone())?;
    info!("Signal handlers configured");

    service_state.start().await?;
    info!("Casino Economy Service is running. Press Ctrl+C to shutdown gracefully.");

    let signal = shutdown_signal.recv().await.unwrap_or("channel closed");
    info!("Shutdown signal received ({}). Initiating graceful shutdown...", signal);
    graceful_shutdown(service_state).await?;

    info!("Casino Economy Service shutdown complete");
    Ok(())
}
