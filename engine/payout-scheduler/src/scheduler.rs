//! PayoutScheduler: drives the hourly and daily payout epochs
//!
//! The engine does not deduplicate epochs. Before each run the scheduler reads
//! the pool's epoch marker and skips the run when the marker already lies in
//! the current epoch, so a restart or a catch-up never pays an epoch twice.

use crate::clock::{Cadence, Clock};
use crate::config::SchedulerConfig;
use crate::error::SchedulerError;
use crate::metrics::{PayoutJob, PayoutMetrics};
use crate::task::PeriodicTask;
use chrono::{DateTime, Utc};
use fairness_engine::{FairnessEngine, HourlyPayoutReport, LotteryReport};
use futures::future::join_all;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Result of asking the scheduler to run one epoch
#[derive(Debug, Clone, PartialEq)]
pub enum EpochOutcome {
    Hourly(HourlyPayoutReport),
    Daily(LotteryReport),
    /// The marker showed this epoch already ran
    Skipped { job: PayoutJob, last_marker: DateTime<Utc> },
}

/// Runs single epochs with marker checks, deadlines and metrics
///
/// An epoch runs on its own task. The deadline bounds how long a caller waits
/// for it, never the epoch itself: a timed-out epoch keeps running until its
/// credits and marker are written, and the next epoch waits for it.
#[derive(Clone)]
pub struct EpochRunner {
    engine: Arc<FairnessEngine>,
    metrics: Arc<PayoutMetrics>,
    daily: Cadence,
    timeout: Option<Duration>,
    in_flight: Arc<AsyncMutex<()>>,
}

impl EpochRunner {
    async fn with_deadline<T, F, Fut>(
        &self,
        guard: OwnedMutexGuard<()>,
        job: F,
    ) -> Result<T, SchedulerError>
    where
        F: FnOnce(Arc<FairnessEngine>) -> Fut,
        Fut: Future<Output = fairness_engine::Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let epoch = job(self.engine.clone());
        let handle = tokio::spawn(async move {
            let _guard = guard;
            epoch.await
        });

        let joined = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!(timeout = ?limit, "Epoch exceeded its deadline; it will finish in the background");
                    return Err(SchedulerError::Timeout(limit));
                }
            },
            None => handle.await,
        };
        Ok(joined.map_err(|e| SchedulerError::TaskFailed(e.to_string()))??)
    }

    /// Run the hourly split for the epoch containing `epoch`
    pub async fn run_hourly(&self, epoch: DateTime<Utc>) -> Result<EpochOutcome, SchedulerError> {
        let guard = self.in_flight.clone().lock_owned().await;
        let epoch_start = Cadence::Hourly.epoch_start(epoch);
        if let Some(marker) = self.engine.pool().await?.last_hourly_payout {
            if marker >= epoch_start {
                info!(epoch = %epoch_start, marker = %marker, "Hourly epoch already paid, skipping");
                self.metrics.record_skipped(PayoutJob::Hourly);
                return Ok(EpochOutcome::Skipped { job: PayoutJob::Hourly, last_marker: marker });
            }
        }

        let started = Instant::now();
        let run = self.with_deadline(guard, move |engine| async move {
            engine.run_hourly_payout_epoch(epoch).await
        });
        match run.await {
            Ok(report) => {
                self.metrics.record_hourly(&report, started.elapsed());
                Ok(EpochOutcome::Hourly(report))
            }
            Err(e) => {
                self.metrics.record_failure(PayoutJob::Hourly, started.elapsed());
                Err(e)
            }
        }
    }

    /// Run the daily lottery for the epoch containing `epoch`
    pub async fn run_daily(&self, epoch: DateTime<Utc>) -> Result<EpochOutcome, SchedulerError> {
        let guard = self.in_flight.clone().lock_owned().await;
        let epoch_start = self.daily.epoch_start(epoch);
        if let Some(marker) = self.engine.pool().await?.last_daily_spin {
            if marker >= epoch_start {
                info!(epoch = %epoch_start, marker = %marker, "Daily lottery already drawn, skipping");
                self.metrics.record_skipped(PayoutJob::Daily);
                return Ok(EpochOutcome::Skipped { job: PayoutJob::Daily, last_marker: marker });
            }
        }

        let started = Instant::now();
        let run = self.with_deadline(guard, move |engine| async move {
            engine.run_daily_lottery_epoch(epoch).await
        });
        match run.await {
            Ok(report) => {
                self.metrics.record_lottery(&report, started.elapsed());
                Ok(EpochOutcome::Daily(report))
            }
            Err(e) => {
                self.metrics.record_failure(PayoutJob::Daily, started.elapsed());
                Err(e)
            }
        }
    }

    async fn run_logged(&self, job: PayoutJob, epoch: DateTime<Utc>) {
        let result = match job {
            PayoutJob::Hourly => self.run_hourly(epoch).await,
            PayoutJob::Daily => self.run_daily(epoch).await,
        };
        if let Err(e) = result {
            error!(job = job.as_str(), epoch = %epoch, error = %e, "Payout epoch failed");
        }
    }
}

/// The payout scheduler
pub struct PayoutScheduler {
    runner: EpochRunner,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
    is_running: AtomicBool,
    shutdown: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl PayoutScheduler {
    /// Create a new PayoutScheduler
    pub fn new(
        engine: Arc<FairnessEngine>,
        clock: Arc<dyn Clock>,
        config: SchedulerConfig,
    ) -> Result<Self, SchedulerError> {
        config.validate()?;
        let (shutdown, _) = watch::channel(false);
        Ok(Self {
            runner: EpochRunner {
                engine,
                metrics: Arc::new(PayoutMetrics::new()),
                daily: config.daily_cadence()?,
                timeout: config.epoch_timeout(),
                in_flight: Arc::new(AsyncMutex::new(())),
            },
            clock,
            config,
            is_running: AtomicBool::new(false),
            shutdown,
            handles: Mutex::new(Vec::new()),
        })
    }

    pub fn metrics(&self) -> Arc<PayoutMetrics> {
        self.runner.metrics.clone()
    }

    pub fn runner(&self) -> &EpochRunner {
        &self.runner
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    /// Run any epoch whose boundary has passed without a payout
    pub async fn catch_up(&self) {
        let now = self.clock.now();
        if self.config.hourly_enabled {
            self.runner.run_logged(PayoutJob::Hourly, Cadence::Hourly.epoch_start(now)).await;
        }
        if self.config.daily_enabled {
            self.runner.run_logged(PayoutJob::Daily, self.runner.daily.epoch_start(now)).await;
        }
    }

    /// Spawn the enabled payout tasks
    pub async fn start(&self) -> Result<(), SchedulerError> {
        if self.is_running.swap(true, Ordering::SeqCst) {
            return Err(SchedulerError::AlreadyRunning);
        }
        self.shutdown.send_replace(false);

        if self.config.catch_up_on_start {
            self.catch_up().await;
        }

        let mut handles = self.handles.lock();
        let jobs = [
            (self.config.hourly_enabled, PayoutJob::Hourly, Cadence::Hourly),
            (self.config.daily_enabled, PayoutJob::Daily, self.runner.daily),
        ];
        for (enabled, job, cadence) in jobs {
            if !enabled {
                continue;
            }
            let runner = self.runner.clone();
            let task = PeriodicTask::new(cadence, self.clock.clone());
            let shutdown = self.shutdown.subscribe();
            handles.push(tokio::spawn(async move {
                task.run(shutdown, |epoch| {
                    let runner = runner.clone();
                    async move { runner.run_logged(job, epoch).await }
                })
                .await;
            }));
        }

        info!(
            hourly = self.config.hourly_enabled,
            daily = self.config.daily_enabled,
            daily_time = %self.config.daily_time,
            utc_offset_minutes = self.config.utc_offset_minutes,
            "Payout scheduler started"
        );
        Ok(())
    }

    /// Signal the tasks to stop and wait for the in-flight epoch to finish
    pub async fn stop(&self) -> Result<(), SchedulerError> {
        if !self.is_running.swap(false, Ordering::SeqCst) {
            return Err(SchedulerError::NotRunning);
        }
        self.shutdown.send_replace(true);

        let handles: Vec<_> = self.handles.lock().drain(..).collect();
        for result in join_all(handles).await {
            if let Err(e) = result {
                error!(error = %e, "Payout task panicked");
            }
        }
        info!("Payout scheduler stopped");
        Ok(())
    }
}
