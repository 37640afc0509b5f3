//! # PayoutScheduler
//!
//! Wall-clock scheduling for the economy's redistribution epochs.
//!
//! The scheduler wakes at the top of every UTC hour to split the universal
//! pool and once a day, at a configured local time, to draw the loss-pool
//! lottery. Each wake-up recomputes the delay to the next boundary from an
//! injectable [`Clock`], so runs never drift, and each epoch is checked
//! against the pool's epoch marker before it is paid.

pub mod clock;
pub mod config;
pub mod error;
pub mod metrics;
pub mod scheduler;
pub mod task;



pub use clock::{Cadence, Clock, ManualClock, SystemClock};
pub use config::SchedulerConfig;
pub use error::SchedulerError;
pub use self::metrics::{PayoutJob, PayoutMetrics, PayoutMetricsSnapshot};
pub use scheduler::{EpochOutcome, EpochRunner, PayoutScheduler};
pub use task::PeriodicTask;

/// Current version of the PayoutScheduler
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default local time of the daily lottery
pub const DEFAULT_DAILY_TIME: &str = "20:00";
