//! Command-line arguments

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::config::ServiceConfig;
use payout_scheduler::PayoutJob;

#[derive(Parser, Debug)]
#[command(name = "economy-service")]
#[command(about = "Casino economy service: fairness engine and pool payouts")]
#[command(version)]
pub struct Cli {
    /// Path to the service TOML configuration
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override the persistence data directory
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Override the log level or filter directive
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override the log format (json, pretty, compact)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Disable the Prometheus exporter
    #[arg(long)]
    pub no_metrics: bool,

    /// Validate the configuration, print it and exit
    #[arg(long)]
    pub check_config: bool,

    /// Run a single payout epoch now and exit
    #[arg(long, value_enum)]
    pub run_once: Option<OnceJob>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OnceJob {
    Hourly,
    Daily,
}

impl From<OnceJob> for PayoutJob {
    fn from(job: OnceJob) -> Self {
        match job {
            OnceJob::Hourly => PayoutJob::Hourly,
            OnceJob::Daily => PayoutJob::Daily,
        }
    }
}

impl Cli {
    /// Apply flag overrides on top of the loaded configuration
    pub fn apply(&self, config: &mut ServiceConfig) {
        if let Some(dir) = &self.data_dir {
            config.persistence.data_dir = dir.clone();
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.logging.format = format.clone();
        }
        if self.no_metrics || self.check_config || self.run_once.is_some() {
            config.metrics.enabled = false;
        }
        if config.service.development_mode && self.log_level.is_none() {
            config.logging.level = "debug".to_string();
        }
    }
}
