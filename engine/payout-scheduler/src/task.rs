//! Boundary-aligned periodic task loop
//!
//! The delay is recomputed from the clock on every iteration, so a slow job or
//! a late wake-up never shifts later runs off the wall-clock boundary.

use crate::clock::{Cadence, Clock};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

pub struct PeriodicTask {
    cadence: Cadence,
    clock: Arc<dyn Clock>,
}

impl PeriodicTask {
    pub fn new(cadence: Cadence, clock: Arc<dyn Clock>) -> Self {
        Self { cadence, clock }
    }

    /// Run `job` at every boundary until `shutdown` turns true or its sender drops
    ///
    /// The job receives the boundary instant it was scheduled for.
    pub async fn run<F, Fut>(self, mut shutdown: watch::Receiver<bool>, mut job: F)
    where
        F: FnMut(DateTime<Utc>) -> Fut,
        Fut: Future<Output = ()>,
    {
        let name = self.cadence.name();
        info!(task = name, "Starting periodic task");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let now = self.clock.now();
            let boundary = self.cadence.next_boundary(now);
            let delay = self.cadence.delay_until_next(now);
            debug!(task = name, next = %boundary, delay_secs = delay.as_secs(), "Sleeping until boundary");

            tokio::select! {
                _ = self.clock.sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            job(boundary).await;
        }

        info!(task = name, "Periodic task stopped");
    }
}
