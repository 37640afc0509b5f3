//! Error types for the payout scheduler

use fairness_engine::FairnessError;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while scheduling payout epochs
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Engine error: {0}")]
    Engine(#[from] FairnessError),

    #[error("Epoch timed out after {0:?}")]
    Timeout(Duration),

    #[error("Epoch task failed: {0}")]
    TaskFailed(String),

    #[error("Scheduler is already running")]
    AlreadyRunning,

    #[error("Scheduler is not running")]
    NotRunning,

    #[error("Failed to read configuration: {0}")]
    ConfigIo(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Failed to serialize configuration: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),
}
