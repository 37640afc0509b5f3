//! Service configuration management
//!
//! Layers, lowest first: built-in defaults, an optional TOML file, then
//! `ECONOMY__SECTION__KEY` environment variables. CLI flags are applied last
//! by the binary.

use anyhow::{Context, Result};
use ::config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use fairness_engine::EconomyConfig;
use payout_scheduler::SchedulerConfig;
use persistence::PersistenceConfig;

/// Prefix of environment overrides
pub const ENV_PREFIX: &str = "ECONOMY";

/// Main service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Service-level configuration
    pub service: ServiceSettings,

    /// Wallet and pool storage
    pub persistence: PersistenceConfig,

    /// Inline economy tuning, used when `economy_file` is unset
    pub economy: EconomyConfig,

    /// Separate economy TOML; also the file re-read on SIGHUP
    pub economy_file: Option<PathBuf>,

    /// Payout scheduler configuration
    pub scheduler: SchedulerConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Metrics configuration
    pub metrics: MetricsConfig,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Enable development mode (debug logging, memory store allowed)
    pub development_mode: bool,

    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_secs: u64,

    /// Re-read `economy_file` on SIGHUP
    pub reload_on_sighup: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or full filter directive (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty, compact)
    pub format: String,

    /// Directory for daily-rotated log files; stdout when unset
    pub directory: Option<PathBuf>,

    /// File name prefix inside `directory`
    pub file_prefix: String,
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Serve Prometheus metrics
    pub enabled: bool,

    /// Listen address of the exporter
    pub host: String,

    /// Metrics export port
    pub port: u16,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self { development_mode: false, shutdown_timeout_secs: 10, reload_on_sighup: true }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            directory: None,
            file_prefix: "economy-service.log".to_string(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true, host: "0.0.0.0".to_string(), port: 9090 }
    }
}

impl ServiceConfig {
    /// Economy tuning from `economy_file` when set, otherwise the inline section
    pub fn load_economy(&self) -> Result<EconomyConfig> {
        match &self.economy_file {
            Some(path) => EconomyConfig::from_file(path)
                .with_context(|| format!("Failed to load economy config from {:?}", path)),
            None => {
                self.economy.validate().context("Invalid inline economy config")?;
                Ok(self.economy.clone())
            }
        }
    }
}

/// Load configuration from defaults, an optional file and the environment
pub fn load_config(path: Option<&Path>) -> Result<ServiceConfig> {
    let mut builder = Config::builder();

    if let Some(path) = path {
        tracing::debug!("Loading configuration from file: {:?}", path);
        builder = builder.add_source(File::from(path.to_path_buf()).format(FileFormat::Toml));
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    let config: ServiceConfig = builder
        .build()
        .context("Failed to assemble configuration sources")?
        .try_deserialize()
        .context("Failed to deserialize service configuration")?;

    validate_config(&config)?;
    Ok(config)
}

/// Validate configuration
pub fn validate_config(config: &ServiceConfig) -> Result<()> {
    config
        .persistence
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid persistence config: {}", e))?;
    config.scheduler.validate().context("Invalid scheduler config")?;
    config.load_economy()?;

    // A bare level is checked here; anything else is an EnvFilter directive
    let level = config.logging.level.as_str();
    if !level.contains('=') && !matches!(level, "trace" | "debug" | "info" | "warn" | "error") {
        return Err(anyhow::anyhow!("Invalid log level: {}", config.logging.level));
    }

    match config.logging.format.as_str() {
        "json" | "pretty" | "compact" => {}
        _ => return Err(anyhow::anyhow!("Invalid log format: {}", config.logging.format)),
    }

    if config.metrics.enabled && config.metrics.port == 0 {
        return Err(anyhow::anyhow!("Invalid metrics port: {}", config.metrics.port));
    }

    if config.service.shutdown_timeout_secs == 0 {
        return Err(anyhow::anyhow!("shutdown_timeout_secs must be positive"));
    }

    Ok(())
}

/// Save configuration to a TOML file
pub fn save_config(config: &ServiceConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config).context("Failed to serialize configuration")?;
    std::fs::write(path, content).with_context(|| format!("Failed to write {:?}", path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use persistence::BackendKind;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_default_config_is_valid() {
        tokio_test::assert_ok!(validate_config(&ServiceConfig::default()));
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "service.toml",
            r#"
[persistence]
backend = "memory"

[scheduler]
daily_time = "18:30"
utc_offset_minutes = 120

[logging]
format = "json"

[economy.lottery]
base_weight = 2.0
"#,
        );

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.persistence.backend, BackendKind::Memory);
        assert_eq!(config.scheduler.daily_time, "18:30");
        assert_eq!(config.scheduler.utc_offset_minutes, 120);
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.economy.lottery.base_weight, 2.0);
        // Untouched sections keep their defaults
        assert!(config.scheduler.hourly_enabled);
        assert_eq!(config.metrics.port, 9090);
    }

    #[test]
    fn test_environment_overrides_file() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "service.toml", "[service]\nshutdown_timeout_secs = 5\n");

        std::env::set_var("ECONOMY__SERVICE__SHUTDOWN_TIMEOUT_SECS", "42");
        let config = load_config(Some(&path));
        std::env::remove_var("ECONOMY__SERVICE__SHUTDOWN_TIMEOUT_SECS");

        assert_eq!(config.unwrap().service.shutdown_timeout_secs, 42);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = ServiceConfig::default();
        config.logging.format = "xml".to_string();
        assert!(validate_config(&config).is_err());

        let mut config = ServiceConfig::default();
        config.scheduler.daily_time = "noon".to_string();
        assert!(validate_config(&config).is_err());

        let mut config = ServiceConfig::default();
        config.economy.lottery.base_weight = -1.0;
        assert!(validate_config(&config).is_err());

        let mut config = ServiceConfig::default();
        config.logging.level = "fairness_engine=debug,info".to_string();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_economy_file_takes_precedence() {
        let dir = TempDir::new().unwrap();
        let mut economy = EconomyConfig::default();
        economy.lottery.weight_per_level = 1.25;
        let economy_path = dir.path().join("economy.toml");
        economy.to_file(&economy_path).unwrap();

        let config = ServiceConfig { economy_file: Some(economy_path), ..Default::default() };
        assert_eq!(config.load_economy().unwrap().lottery.weight_per_level, 1.25);

        let missing = ServiceConfig {
            economy_file: Some(dir.path().join("missing.toml")),
            ..Default::default()
        };
        assert!(missing.load_economy().is_err());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("saved.toml");

        let mut config = ServiceConfig::default();
        config.metrics.port = 9191;
        config.scheduler.catch_up_on_start = false;
        save_config(&config, &path).unwrap();

        let loaded = load_config(Some(&path)).unwrap();
        assert_eq!(loaded.metrics.port, 9191);
        assert!(!loaded.scheduler.catch_up_on_start);
    }
}
