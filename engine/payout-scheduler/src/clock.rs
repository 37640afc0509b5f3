//! Wall-clock boundaries and the injectable clock

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveTime, Timelike, Utc};
use parking_lot::Mutex;
use std::time::Duration;

/// Source of "now" and of sleeping, swappable in tests
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    async fn sleep(&self, duration: Duration);
}

/// Real time via chrono and tokio
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Virtual time: sleeping advances the clock instantly
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(start), sleeps: Mutex::new(Vec::new()) }
    }

    pub fn advance(&self, by: ChronoDuration) {
        *self.now.lock() += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock() = to;
    }

    /// Every duration passed to `sleep`, in order
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().clone()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().push(duration);
        let by = ChronoDuration::from_std(duration).unwrap_or(ChronoDuration::zero());
        self.advance(by);
        tokio::task::yield_now().await;
    }
}

/// When an epoch closes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    /// Top of every UTC hour
    Hourly,
    /// A fixed local time once per day
    DailyAt { time: NaiveTime, utc_offset_minutes: i32 },
}

impl Cadence {
    pub fn name(&self) -> &'static str {
        match self {
            Cadence::Hourly => "hourly",
            Cadence::DailyAt { .. } => "daily",
        }
    }

    /// Latest boundary at or before `now`
    pub fn epoch_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match *self {
            Cadence::Hourly => {
                now - ChronoDuration::seconds(i64::from(now.minute() * 60 + now.second()))
                    - ChronoDuration::nanoseconds(i64::from(now.nanosecond()))
            }
            Cadence::DailyAt { time, utc_offset_minutes } => {
                let offset = ChronoDuration::minutes(i64::from(utc_offset_minutes));
                let local = (now + offset).naive_utc();
                let today = (local.date().and_time(time) - offset).and_utc();
                if today <= now {
                    today
                } else {
                    today - ChronoDuration::days(1)
                }
            }
        }
    }

    /// First boundary strictly after `after`
    pub fn next_boundary(&self, after: DateTime<Utc>) -> DateTime<Utc> {
        let step = match self {
            Cadence::Hourly => ChronoDuration::hours(1),
            Cadence::DailyAt { .. } => ChronoDuration::days(1),
        };
        self.epoch_start(after) + step
    }

    /// Wait from `now` until the next boundary
    pub fn delay_until_next(&self, now: DateTime<Utc>) -> Duration {
        (self.next_boundary(now) - now).to_std().unwrap_or(Duration::ZERO)
    }
}
