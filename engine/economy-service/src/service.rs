//! Service state management and component initialization

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::ServiceConfig;
use fairness_engine::FairnessEngine;
use payout_scheduler::{Clock, EpochOutcome, PayoutJob, PayoutScheduler, SystemClock};
use persistence::{BackendKind, WalletStore};

/// Service state containing all initialized components
pub struct ServiceState {
    /// Service configuration
    pub config: ServiceConfig,

    /// Fairness engine over the configured store
    pub engine: Arc<FairnessEngine>,

    /// Hourly and daily payout scheduler
    pub scheduler: Arc<PayoutScheduler>,

    clock: Arc<dyn Clock>,
    started_at: DateTime<Utc>,
}

impl ServiceState {
    /// Create a new service state on the system clock
    pub async fn new(config: ServiceConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock)).await
    }

    /// Create a new service state with all components initialized
    pub async fn with_clock(config: ServiceConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        info!("Initializing service components...");

        if config.persistence.backend == BackendKind::Memory && !config.service.development_mode {
            warn!("In-memory store selected outside development mode; balances will not survive a restart");
        }

        info!(backend = ?config.persistence.backend, data_dir = ?config.persistence.data_dir, "Opening wallet store...");
        let store: Arc<dyn WalletStore> = Arc::from(
            persistence::open_store(config.persistence.clone())
                .await
                .context("Failed to open wallet store")?,
        );

        info!("Initializing FairnessEngine...");
        let economy = config.load_economy()?;
        let engine = Arc::new(FairnessEngine::new(store, economy).context("Failed to create FairnessEngine")?);

        info!("Initializing PayoutScheduler...");
        let scheduler = Arc::new(
            PayoutScheduler::new(engine.clone(), clock.clone(), config.scheduler.clone())
                .context("Failed to create PayoutScheduler")?,
        );

        let started_at = clock.now();
        info!("Service components initialized successfully");
        Ok(Self { config, engine, scheduler, clock, started_at })
    }

    /// Start the payout scheduler
    pub async fn start(&self) -> Result<()> {
        let pool = self.engine.pool().await.context("Failed to read pool record")?;
        info!(
            universal_pool = pool.universal_pool,
            loss_pool = pool.loss_pool,
            last_hourly_payout = ?pool.last_hourly_payout,
            last_daily_spin = ?pool.last_daily_spin,
            "Recovered pool state"
        );

        self.scheduler.start().await.context("Failed to start PayoutScheduler")?;
        Ok(())
    }

    /// Stop the payout scheduler, waiting for an in-flight epoch
    pub async fn stop(&self) -> Result<()> {
        info!("Stopping PayoutScheduler...");
        self.scheduler.stop().await.context("Failed to stop PayoutScheduler")?;
        Ok(())
    }

    /// Run one epoch immediately, outside the scheduler's cadence
    pub async fn run_once(&self, job: PayoutJob) -> Result<EpochOutcome> {
        let now = self.clock.now();
        info!(job = job.as_str(), at = %now, "Running single payout epoch");
        let runner = self.scheduler.runner();
        let outcome = match job {
            PayoutJob::Hourly => runner.run_hourly(now).await,
            PayoutJob::Daily => runner.run_daily(now).await,
        };
        outcome.with_context(|| format!("{} epoch failed", job.as_str()))
    }

    /// Re-read `economy_file` and swap it into the engine
    pub fn reload_economy(&self) -> Result<()> {
        let path = self
            .config
            .economy_file
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("No economy_file configured; nothing to reload"))?;
        let economy = fairness_engine::EconomyConfig::from_file(path)
            .with_context(|| format!("Failed to load economy config from {:?}", path))?;
        self.engine.reload_config(economy).context("Engine rejected economy config")?;
        info!(path = ?path, "Economy config reloaded");
        Ok(())
    }

    /// Check if the scheduler is running
    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Seconds since the components were initialized
    pub fn uptime_secs(&self) -> i64 {
        (self.clock.now() - self.started_at).num_seconds()
    }

    /// Get service health status
    pub async fn health_check(&self) -> ServiceHealth {
        if !self.is_running() {
            return ServiceHealth::Unhealthy;
        }
        if let Err(e) = self.engine.pool().await {
            warn!(error = %e, "Health check could not read the pool");
            return ServiceHealth::Unhealthy;
        }
        if self.scheduler.metrics().snapshot().epochs_failed > 0 {
            return ServiceHealth::Degraded;
        }
        ServiceHealth::Healthy
    }

    /// Graceful shutdown of all components
    pub async fn shutdown(&self) -> Result<()> {
        info!("Initiating graceful shutdown...");
        if self.is_running() {
            self.stop().await?;
        }
        let snapshot = self.scheduler.metrics().snapshot();
        info!(
            epochs_run = snapshot.epochs_run,
            epochs_failed = snapshot.epochs_failed,
            currency_distributed = snapshot.currency_distributed,
            uptime_secs = self.uptime_secs(),
            "Graceful shutdown complete"
        );
        Ok(())
    }
}

/// Service health status
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceHealth {
    Healthy,
    Unhealthy,
    Degraded,
}

impl ServiceHealth {
    pub fn is_healthy(&self) -> bool {
        matches!(self, ServiceHealth::Healthy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use fairness_engine::{EconomyConfig, HourlyPayoutReport};
    use payout_scheduler::ManualClock;
    use persistence::{PoolData, Wallet};
    use tempfile::TempDir;

    fn memory_config() -> ServiceConfig {
        let mut config = ServiceConfig::default();
        config.persistence.backend = BackendKind::Memory;
        config.service.development_mode = true;
        config.scheduler.catch_up_on_start = false;
        config.economy.double_chance.per_level = 0.0;
        config
    }

    async fn state(config: ServiceConfig) -> ServiceState {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 9, 15, 0).unwrap()));
        ServiceState::with_clock(config, clock).await.unwrap()
    }

    #[tokio::test]
    async fn test_start_stop_and_health() {
        let state = state(memory_config()).await;
        assert_eq!(state.health_check().await, ServiceHealth::Unhealthy);

        state.start().await.unwrap();
        assert!(state.is_running());
        assert!(state.health_check().await.is_healthy());

        state.shutdown().await.unwrap();
        assert!(!state.is_running());
        // Shutting down twice is harmless
        state.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_run_once_hourly() {
        let state = state(memory_config()).await;
        let store = state.engine.store().clone();
        for id in [10, 20] {
            store.set_wallet(id, &Wallet::new(state.clock.now())).await.unwrap();
        }
        store.set_pool(&PoolData { universal_pool: 801, ..Default::default() }).await.unwrap();

        let outcome = state.run_once(PayoutJob::Hourly).await.unwrap();
        let EpochOutcome::Hourly(HourlyPayoutReport { share, credited_players, pool_after, .. }) = outcome else {
            panic!("expected an hourly report");
        };
        assert_eq!(share, 400);
        assert_eq!(credited_players, 2);
        assert_eq!(pool_after, 1);

        // The same hour is not paid again
        let again = state.run_once(PayoutJob::Hourly).await.unwrap();
        assert!(matches!(again, EpochOutcome::Skipped { .. }));
    }

    #[tokio::test]
    async fn test_reload_economy_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("economy.toml");
        EconomyConfig::default().to_file(&path).unwrap();

        let mut config = memory_config();
        config.economy_file = Some(path.clone());
        let state = state(config).await;
        assert_eq!(state.engine.config().lottery.base_weight, 1.0);

        let mut updated = EconomyConfig::default();
        updated.lottery.base_weight = 3.0;
        updated.to_file(&path).unwrap();
        state.reload_economy().unwrap();
        assert_eq!(state.engine.config().lottery.base_weight, 3.0);

        // A broken file leaves the running config in place
        std::fs::write(&path, "[lottery]\nbase_weight = -2.0\n").unwrap();
        assert!(state.reload_economy().is_err());
        assert_eq!(state.engine.config().lottery.base_weight, 3.0);
    }

    #[tokio::test]
    async fn test_reload_without_file_fails() {
        let state = state(memory_config()).await;
        assert!(state.reload_economy().is_err());
    }

    #[tokio::test]
    async fn test_local_backend_persists_between_states() {
        let dir = TempDir::new().unwrap();
        let mut config = memory_config();
        config.persistence.backend = BackendKind::Local;
        config.persistence.data_dir = dir.path().to_path_buf();

        {
            let state = state(config.clone()).await;
            let pool = PoolData { universal_pool: 500, ..Default::default() };
            state.engine.store().set_pool(&pool).await.unwrap();
        }

        let state = state(config).await;
        assert_eq!(state.engine.pool().await.unwrap().universal_pool, 500);
    }
}
