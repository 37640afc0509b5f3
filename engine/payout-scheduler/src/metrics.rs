//! Metrics collection for payout epochs
//!
//! Counters are kept in atomics for in-process inspection and mirrored to the
//! `metrics` facade for whichever exporter the service installs.

use fairness_engine::{HourlyPayoutReport, LotteryReport};
use ::metrics::{counter, gauge, histogram};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Which payout job an observation belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutJob {
    Hourly,
    Daily,
}

impl PayoutJob {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutJob::Hourly => "hourly",
            PayoutJob::Daily => "daily",
        }
    }
}

/// Point-in-time view of the collected metrics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutMetricsSnapshot {
    pub epochs_run: u64,
    pub epochs_skipped: u64,
    pub epochs_failed: u64,
    pub players_paid: u64,
    pub players_skipped: u64,
    pub currency_distributed: u64,
    pub lottery_draws: u64,
    pub last_duration_ms: u64,
}

/// Metrics collector for the PayoutScheduler
#[derive(Debug, Default)]
pub struct PayoutMetrics {
    epochs_run: AtomicU64,
    epochs_skipped: AtomicU64,
    epochs_failed: AtomicU64,
    players_paid: AtomicU64,
    players_skipped: AtomicU64,
    currency_distributed: AtomicU64,
    lottery_draws: AtomicU64,
    last_duration_ms: AtomicU64,
}

impl PayoutMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn record_duration(&self, job: PayoutJob, duration: Duration) {
        self.last_duration_ms.store(duration.as_millis() as u64, Ordering::Relaxed);
        histogram!("payout_epoch_duration_seconds", duration.as_secs_f64(), "job" => job.as_str());
    }

    /// Record a completed hourly split
    pub fn record_hourly(&self, report: &HourlyPayoutReport, duration: Duration) {
        self.epochs_run.fetch_add(1, Ordering::Relaxed);
        self.players_paid.fetch_add(report.credited_players as u64, Ordering::Relaxed);
        self.players_skipped.fetch_add(report.skipped_players as u64, Ordering::Relaxed);
        self.currency_distributed.fetch_add(report.distributed, Ordering::Relaxed);
        self.record_duration(PayoutJob::Hourly, duration);

        counter!("payout_epochs_total", 1, "job" => "hourly");
        counter!("payout_players_paid_total", report.credited_players as u64, "job" => "hourly");
        counter!("payout_players_skipped_total", report.skipped_players as u64, "job" => "hourly");
        counter!("payout_currency_distributed_total", report.distributed, "job" => "hourly");
        gauge!("payout_universal_pool", report.pool_after as f64);
    }

    /// Record a completed daily lottery
    pub fn record_lottery(&self, report: &LotteryReport, duration: Duration) {
        self.epochs_run.fetch_add(1, Ordering::Relaxed);
        self.record_duration(PayoutJob::Daily, duration);
        counter!("payout_epochs_total", 1, "job" => "daily");

        match report {
            LotteryReport::Drawn(winner) => {
                self.players_paid.fetch_add(1, Ordering::Relaxed);
                self.lottery_draws.fetch_add(1, Ordering::Relaxed);
                self.currency_distributed.fetch_add(winner.payout, Ordering::Relaxed);
                counter!("payout_players_paid_total", 1, "job" => "daily");
                counter!("payout_currency_distributed_total", winner.payout, "job" => "daily");
                gauge!("payout_loss_pool", 0.0);
            }
            LotteryReport::WinnerUnavailable { .. } => {
                self.players_skipped.fetch_add(1, Ordering::Relaxed);
                counter!("payout_players_skipped_total", 1, "job" => "daily");
            }
            LotteryReport::EmptyPool | LotteryReport::NoCandidates => {}
        }
    }

    /// Record an epoch whose marker showed it already ran
    pub fn record_skipped(&self, job: PayoutJob) {
        self.epochs_skipped.fetch_add(1, Ordering::Relaxed);
        counter!("payout_epochs_skipped_total", 1, "job" => job.as_str());
    }

    /// Record an epoch that returned an error or hit its deadline
    pub fn record_failure(&self, job: PayoutJob, duration: Duration) {
        self.epochs_failed.fetch_add(1, Ordering::Relaxed);
        self.record_duration(job, duration);
        counter!("payout_epochs_failed_total", 1, "job" => job.as_str());
    }

    pub fn snapshot(&self) -> PayoutMetricsSnapshot {
        PayoutMetricsSnapshot {
            epochs_run: self.epochs_run.load(Ordering::Relaxed),
            epochs_skipped: self.epochs_skipped.load(Ordering::Relaxed),
            epochs_failed: self.epochs_failed.load(Ordering::Relaxed),
            players_paid: self.players_paid.load(Ordering::Relaxed),
            players_skipped: self.players_skipped.load(Ordering::Relaxed),
            currency_distributed: self.currency_distributed.load(Ordering::Relaxed),
            lottery_draws: self.lottery_draws.load(Ordering::Relaxed),
            last_duration_ms: self.last_duration_ms.load(Ordering::Relaxed),
        }
    }

    /// Reset all metrics
    pub fn reset(&self) {
        for counter in [
            &self.epochs_run,
            &self.epochs_skipped,
            &self.epochs_failed,
            &self.players_paid,
            &self.players_skipped,
            &self.currency_distributed,
            &self.lottery_draws,
            &self.last_duration_ms,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
