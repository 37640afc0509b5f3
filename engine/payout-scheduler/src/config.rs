//! Configuration for the payout scheduler

use crate::clock::Cadence;
use crate::error::SchedulerError;
use crate::DEFAULT_DAILY_TIME;
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Largest UTC offset accepted for the daily cadence (UTC+14)
const MAX_OFFSET_MINUTES: i32 = 14 * 60;

/// Configuration for the PayoutScheduler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Run the universal pool split at the top of every UTC hour
    pub hourly_enabled: bool,

    /// Run the loss-pool lottery once per day
    pub daily_enabled: bool,

    /// Local time of the daily lottery, `HH:MM`
    pub daily_time: String,

    /// Offset of the daily lottery's local time from UTC, in minutes
    pub utc_offset_minutes: i32,

    /// Run a missed epoch immediately on start-up
    pub catch_up_on_start: bool,

    /// Deadline for a single epoch
    pub epoch_timeout_secs: Option<u64>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            hourly_enabled: true,
            daily_enabled: true,
            daily_time: DEFAULT_DAILY_TIME.to_string(),
            utc_offset_minutes: 0,
            catch_up_on_start: true,
            epoch_timeout_secs: Some(300),
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<(), SchedulerError> {
        self.daily_cadence()?;
        if self.epoch_timeout_secs == Some(0) {
            return Err(SchedulerError::Config("epoch_timeout_secs must be positive".to_string()));
        }
        Ok(())
    }

    /// Parsed daily cadence
    pub fn daily_cadence(&self) -> Result<Cadence, SchedulerError> {
        let time = NaiveTime::parse_from_str(&self.daily_time, "%H:%M").map_err(|e| {
            SchedulerError::Config(format!("daily_time '{}' is not HH:MM: {}", self.daily_time, e))
        })?;
        if self.utc_offset_minutes.abs() > MAX_OFFSET_MINUTES {
            return Err(SchedulerError::Config(format!(
                "utc_offset_minutes {} is outside ±{}",
                self.utc_offset_minutes, MAX_OFFSET_MINUTES
            )));
        }
        Ok(Cadence::DailyAt { time, utc_offset_minutes: self.utc_offset_minutes })
    }

    /// Get the epoch deadline as Duration
    pub fn epoch_timeout(&self) -> Option<Duration> {
        self.epoch_timeout_secs.map(Duration::from_secs)
    }

    /// Load configuration from TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SchedulerError> {
        let content = std::fs::read_to_string(path)?;
        let config: SchedulerConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<(), SchedulerError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
