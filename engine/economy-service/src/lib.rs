//! Casino Economy Service Library
//!
//! Wires the wallet store, the fairness engine and the payout scheduler into
//! one process, with layered configuration, logging, a Prometheus exporter
//! and graceful shutdown handling.

use anyhow::{Context, Result};
use std::path::Path;

pub mod cli;
pub mod config;
pub mod exporter;
pub mod logging;
pub mod service;
pub mod signals;

pub use cli::{Cli, OnceJob};
pub use self::config::{validate_config, ServiceConfig};
pub use exporter::install_metrics_exporter;
pub use logging::initialize_logging;
pub use service::{ServiceHealth, ServiceState};
pub use signals::{graceful_shutdown, setup_signal_handlers};

/// Load configuration from an optional file and environment variables
pub fn load_configuration(path: Option<&Path>) -> Result<ServiceConfig> {
    self::config::load_config(path).context("Failed to load service configuration")
}
