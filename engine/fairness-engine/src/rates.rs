//! Progressive slab schedules, bank interest and payout flooring
//!
//! A schedule splits a band axis into consecutive bands:
//!
//! ```text
//! [0, t1) * s1, [t1, t2) * s2, ..., [t_last, inf) * final_scale
//! ```
//!
//! The same calculator drives bank interest (axis = bank balance) and the
//! pool's share of the win tax (axis = net worth).

use crate::config::{check_duration, check_non_negative};
use crate::{FairnessError, Result};
use chrono::{DateTime, Duration, Utc};
use persistence::Wallet;
use serde::{Deserialize, Serialize};

/// Added before flooring so values like `29999.999999999996` land on 30000
const FLOOR_EPSILON: f64 = 1e-9;

/// Floor a derived payout into whole currency; NaN and negatives give 0
pub fn floor_amount(value: f64) -> u64 {
    if value.is_nan() || value <= 0.0 {
        return 0;
    }
    (value + FLOOR_EPSILON).floor() as u64
}

/// Upper bound of one band and the scale applied below it
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Slab {
    pub threshold: u64,
    pub scale: f64,
}

/// Ascending slabs plus the scale used above the last threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlabSchedule {
    pub slabs: Vec<Slab>,
    pub final_scale: f64,
}

impl Default for SlabSchedule {
    fn default() -> Self {
        Self { slabs: Vec::new(), final_scale: 1.0 }
    }
}

impl SlabSchedule {
    pub fn validate(&self, name: &str) -> Result<()> {
        for (i, slab) in self.slabs.iter().enumerate() {
            check_non_negative(&format!("{name}.slabs[{i}].scale"), slab.scale)?;
            if i > 0 && slab.threshold <= self.slabs[i - 1].threshold {
                return Err(FairnessError::config(format!(
                    "{name}: thresholds must be strictly ascending ({} follows {})",
                    slab.threshold,
                    self.slabs[i - 1].threshold
                )));
            }
        }
        check_non_negative(&format!("{name}.final_scale"), self.final_scale)
    }

    /// Banded sum over `[0, base)`
    pub fn amount(&self, base: u64, rate: f64) -> f64 {
        self.amount_between(0, base, rate)
    }

    /// Banded sum over `[start, end)`; empty when `end <= start`
    pub fn amount_between(&self, start: u64, end: u64, rate: f64) -> f64 {
        if end <= start || rate <= 0.0 || !rate.is_finite() {
            return 0.0;
        }

        let mut total = 0.0;
        let mut lower = 0u64;
        for slab in &self.slabs {
            total += overlap(start, end, lower, slab.threshold) as f64 * rate * slab.scale;
            lower = slab.threshold;
            if lower >= end {
                return total;
            }
        }
        total + overlap(start, end, lower, u64::MAX) as f64 * rate * self.final_scale
    }
}

/// Length of `[start, end) ∩ [lower, upper)`
fn overlap(start: u64, end: u64, lower: u64, upper: u64) -> u64 {
    let from = start.max(lower);
    let to = end.min(upper);
    to.saturating_sub(from)
}

/// Unfloored banded amount of `base` at `rate`
pub fn compute_slabbed_amount(base: u64, rate: f64, slabs: &[Slab], final_scale: f64) -> f64 {
    SlabSchedule { slabs: slabs.to_vec(), final_scale }.amount(base, rate)
}

/// Bank interest parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterestConfig {
    /// Rate per period at upgrade level 0
    pub base_rate: f64,
    pub rate_per_level: f64,
    pub period_secs: u64,
    /// Periods credited at most for one gap (offline players)
    pub max_periods: u32,
    pub schedule: SlabSchedule,
}

impl Default for InterestConfig {
    fn default() -> Self {
        Self {
            base_rate: 0.001,
            rate_per_level: 0.0005,
            period_secs: 3_600,
            max_periods: 168,
            schedule: SlabSchedule {
                slabs: vec![
                    Slab { threshold: 1_000_000, scale: 1.0 },
                    Slab { threshold: 10_000_000, scale: 0.5 },
                ],
                final_scale: 0.1,
            },
        }
    }
}

impl InterestConfig {
    pub fn validate(&self) -> Result<()> {
        check_non_negative("interest.base_rate", self.base_rate)?;
        check_non_negative("interest.rate_per_level", self.rate_per_level)?;
        check_duration("interest.period_secs", self.period_secs)?;
        if self.max_periods == 0 {
            return Err(FairnessError::config("interest.max_periods must be at least 1"));
        }
        self.schedule.validate("interest.schedule")
    }

    /// Per-period rate for an (already clamped) upgrade level
    pub fn rate_for_level(&self, level: u8) -> f64 {
        self.base_rate + f64::from(level) * self.rate_per_level
    }
}

/// Result of one accrual pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterestAccrual {
    pub periods: u32,
    pub interest: u64,
}

/// Credit whole elapsed periods of interest to `wallet.bank`
///
/// Each period compounds on the bank including earlier periods' interest and
/// is floored once when credited. `last_bank_accrual` advances by the periods
/// consumed, keeping the partial period for the next pass, or jumps to `now`
/// when the gap exceeded `max_periods`.
pub fn accrue_interest(
    wallet: &mut Wallet,
    config: &InterestConfig,
    level: u8,
    now: DateTime<Utc>,
) -> InterestAccrual {
    let elapsed = (now - wallet.last_bank_accrual).num_seconds();
    if elapsed <= 0 || config.period_secs == 0 {
        return InterestAccrual::default();
    }

    let whole = elapsed as u64 / config.period_secs;
    if whole == 0 {
        return InterestAccrual::default();
    }
    let capped = whole > u64::from(config.max_periods);
    let periods = if capped { config.max_periods } else { whole as u32 };

    let rate = config.rate_for_level(level);
    let mut interest = 0u64;
    for _ in 0..periods {
        let credit = floor_amount(config.schedule.amount(wallet.bank, rate));
        wallet.bank = wallet.bank.saturating_add(credit);
        interest = interest.saturating_add(credit);
    }

    wallet.last_bank_accrual = if capped {
        now
    } else {
        wallet.last_bank_accrual + Duration::seconds((u64::from(periods) * config.period_secs) as i64)
    };
    wallet.stats.total_interest = wallet.stats.total_interest.saturating_add(interest);

    InterestAccrual { periods, interest }
}
