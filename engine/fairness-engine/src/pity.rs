//! Loss-streak pity buffs
//!
//! A run of consecutive losses activates a time-limited win-chance boost.
//! Tiers are ascending loss counts; reaching a higher tier replaces the lower
//! streak stack instead of adding to it. Granted stacks (items, admin grants)
//! sit beside the streak stack and count toward the same cap. Any win clears
//! every stack. Expiry is checked lazily whenever the ledger is touched.

use crate::config::{check_duration, check_non_negative};
use crate::{FairnessError, Result};
use chrono::{DateTime, Duration, Utc};
use persistence::{PityStack, PityState, StackSource};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info};

/// One activation threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PityTier {
    pub label: String,
    /// Consecutive losses that activate this tier
    pub losses: u32,
    pub rate: f64,
    pub duration_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PityConfig {
    pub tiers: Vec<PityTier>,
    /// Cap on the summed boost of all active stacks
    pub max_boost: f64,
}

impl Default for PityConfig {
    fn default() -> Self {
        let tier = |label: &str, losses, rate, minutes: u64| PityTier {
            label: label.to_string(),
            losses,
            rate,
            duration_secs: minutes * 60,
        };
        Self {
            tiers: vec![
                tier("streak_5", 5, 0.05, 30),
                tier("streak_10", 10, 0.10, 60),
                tier("streak_15", 15, 0.15, 120),
            ],
            max_boost: 0.25,
        }
    }
}

impl PityConfig {
    pub fn validate(&self) -> Result<()> {
        check_non_negative("pity.max_boost", self.max_boost)?;

        let mut labels = HashSet::new();
        for (i, tier) in self.tiers.iter().enumerate() {
            if tier.losses == 0 {
                return Err(FairnessError::config(format!("pity.tiers[{i}].losses must be positive")));
            }
            if i > 0 && tier.losses <= self.tiers[i - 1].losses {
                return Err(FairnessError::config(format!(
                    "pity.tiers must be strictly ascending by losses ({} follows {})",
                    tier.losses,
                    self.tiers[i - 1].losses
                )));
            }
            if tier.label.is_empty() || !labels.insert(tier.label.as_str()) {
                return Err(FairnessError::config(format!(
                    "pity.tiers[{i}].label must be non-empty and unique"
                )));
            }
            check_non_negative(&format!("pity.tiers[{i}].rate"), tier.rate)?;
            check_duration(&format!("pity.tiers[{i}].duration_secs"), tier.duration_secs)?;
        }
        Ok(())
    }

    fn tier_index(&self, label: &str) -> Option<usize> {
        self.tiers.iter().position(|t| t.label == label)
    }
}

/// Pity transition caused by a single bet result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PityTriggerInfo {
    /// First streak stack of this run
    Activated {
        tier: String,
        rate: f64,
        expires_at: DateTime<Utc>,
        loss_streak: u32,
        total_boost: f64,
    },
    /// A higher tier replaced the active streak stack
    Upgraded {
        from: String,
        tier: String,
        rate: f64,
        expires_at: DateTime<Utc>,
        loss_streak: u32,
        total_boost: f64,
    },
    /// A win removed the active stacks
    Cleared { stacks_cleared: usize, loss_streak_broken: u32 },
}

/// Display view of one active stack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackStatus {
    pub label: String,
    pub source: StackSource,
    pub rate: f64,
    pub remaining_secs: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PityStatus {
    pub active: bool,
    /// Summed rate of active stacks, capped
    pub total_boost: f64,
    pub loss_streak: u32,
    pub best_loss_streak: u32,
    pub trigger_count: u64,
    pub stacks: Vec<StackStatus>,
}

/// Sum of unexpired stack rates clamped to `[0, max_boost]`
///
/// Stored stacks may come from an older configuration, so the cap is always
/// applied here rather than trusted from state.
pub fn effective_boost(stacks: &[PityStack], now: DateTime<Utc>, max_boost: f64) -> f64 {
    let sum: f64 = stacks
        .iter()
        .filter(|s| s.is_active(now))
        .map(|s| if s.rate_per_stack.is_finite() { s.rate_per_stack } else { 0.0 })
        .sum();
    sum.clamp(0.0, max_boost.max(0.0))
}

/// Mutating view over one wallet's pity state at a fixed instant
pub struct PityLedger<'a> {
    state: &'a mut PityState,
    config: &'a PityConfig,
    now: DateTime<Utc>,
}

impl<'a> PityLedger<'a> {
    pub fn new(state: &'a mut PityState, config: &'a PityConfig, now: DateTime<Utc>) -> Self {
        Self { state, config, now }
    }

    /// Drop expired stacks; returns how many were removed
    pub fn prune_expired(&mut self) -> usize {
        let now = self.now;
        let before = self.state.stacks.len();
        self.state.stacks.retain(|s| s.is_active(now));
        before - self.state.stacks.len()
    }

    pub fn total_boost(&self) -> f64 {
        effective_boost(&self.state.stacks, self.now, self.config.max_boost)
    }

    pub fn record_loss(&mut self) -> Option<PityTriggerInfo> {
        self.prune_expired();

        let streak = self.state.loss_streak.saturating_add(1);
        self.state.loss_streak = streak;
        self.state.best_loss_streak = self.state.best_loss_streak.max(streak);

        let tier_idx = self.config.tiers.iter().position(|t| t.losses == streak)?;

        // Highest tier currently held by a streak stack
        let current = self
            .state
            .stacks
            .iter()
            .filter(|s| s.source == StackSource::Streak)
            .map(|s| (self.config.tier_index(&s.threshold_label), s.threshold_label.clone()))
            .max_by_key(|(idx, _)| *idx);

        if let Some((Some(held), _)) = &current {
            if *held >= tier_idx {
                return None;
            }
        }

        let config = self.config;
        let tier = &config.tiers[tier_idx];
        let expires_at = self.now + Duration::seconds(tier.duration_secs as i64);
        self.state.stacks.retain(|s| s.source != StackSource::Streak);
        self.state.stacks.push(PityStack {
            source: StackSource::Streak,
            threshold_label: tier.label.clone(),
            rate_per_stack: tier.rate,
            activated_at: self.now,
            expires_at,
        });
        self.state.trigger_count += 1;

        let total_boost = self.total_boost();
        info!(
            tier = %tier.label,
            rate = tier.rate,
            loss_streak = streak,
            total_boost,
            "Pity tier activated"
        );

        Some(match current {
            Some((_, from)) => PityTriggerInfo::Upgraded {
                from,
                tier: tier.label.clone(),
                rate: tier.rate,
                expires_at,
                loss_streak: streak,
                total_boost,
            },
            None => PityTriggerInfo::Activated {
                tier: tier.label.clone(),
                rate: tier.rate,
                expires_at,
                loss_streak: streak,
                total_boost,
            },
        })
    }

    /// Reset the streak and clear every stack
    pub fn record_win(&mut self) -> Option<PityTriggerInfo> {
        self.prune_expired();

        let stacks_cleared = self.state.stacks.len();
        let loss_streak_broken = self.state.loss_streak;
        self.state.stacks.clear();
        self.state.loss_streak = 0;

        if stacks_cleared == 0 {
            return None;
        }
        debug!(stacks_cleared, loss_streak_broken, "Pity cleared by win");
        Some(PityTriggerInfo::Cleared { stacks_cleared, loss_streak_broken })
    }

    /// Add or refresh a granted stack; returns the capped total boost
    pub fn grant(&mut self, label: &str, rate: f64, duration: Duration) -> Result<f64> {
        check_non_negative("granted stack rate", rate)?;
        if duration <= Duration::zero() {
            return Err(FairnessError::InvalidAmount {
                message: format!("granted stack duration must be positive, got {duration}"),
            });
        }

        self.prune_expired();
        let expires_at = self.now + duration;
        match self
            .state
            .stacks
            .iter_mut()
            .find(|s| s.source == StackSource::Granted && s.threshold_label == label)
        {
            Some(stack) => {
                stack.rate_per_stack = rate;
                stack.activated_at = self.now;
                stack.expires_at = expires_at;
            }
            None => self.state.stacks.push(PityStack {
                source: StackSource::Granted,
                threshold_label: label.to_string(),
                rate_per_stack: rate,
                activated_at: self.now,
                expires_at,
            }),
        }
        Ok(self.total_boost())
    }

    pub fn status(&self) -> PityStatus {
        let stacks: Vec<StackStatus> = self
            .state
            .stacks
            .iter()
            .filter(|s| s.is_active(self.now))
            .map(|s| StackStatus {
                label: s.threshold_label.clone(),
                source: s.source,
                rate: s.rate_per_stack,
                remaining_secs: (s.expires_at - self.now).num_seconds(),
            })
            .collect();

        PityStatus {
            active: !stacks.is_empty(),
            total_boost: self.total_boost(),
            loss_streak: self.state.loss_streak,
            best_loss_streak: self.state.best_loss_streak,
            trigger_count: self.state.trigger_count,
            stacks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn lose(state: &mut PityState, config: &PityConfig, times: u32) -> Vec<PityTriggerInfo> {
        let mut ledger = PityLedger::new(state, config, t0());
        (0..times).filter_map(|_| ledger.record_loss()).collect()
    }

    #[test]
    fn test_threshold_activates_stack() {
        let config = PityConfig::default();
        let mut state = PityState::default();

        let triggers = lose(&mut state, &config, 4);
        assert!(triggers.is_empty());

        let triggers = lose(&mut state, &config, 1);
        match &triggers[..] {
            [PityTriggerInfo::Activated { tier, rate, loss_streak, .. }] => {
                assert_eq!(tier, "streak_5");
                assert_eq!(*rate, 0.05);
                assert_eq!(*loss_streak, 5);
            }
            other => panic!("unexpected triggers: {other:?}"),
        }
        assert_eq!(state.trigger_count, 1);
        assert_eq!(state.stacks.len(), 1);
    }

    #[test]
    fn test_higher_tier_replaces_lower() {
        let config = PityConfig::default();
        let mut state = PityState::default();

        let triggers = lose(&mut state, &config, 10);
        assert_eq!(triggers.len(), 2);
        assert!(matches!(
            &triggers[1],
            PityTriggerInfo::Upgraded { from, tier, .. } if from == "streak_5" && tier == "streak_10"
        ));

        assert_eq!(state.stacks.len(), 1);
        assert_eq!(state.stacks[0].threshold_label, "streak_10");
        assert_eq!(state.trigger_count, 2);

        let ledger = PityLedger::new(&mut state, &config, t0());
        assert!((ledger.total_boost() - 0.10).abs() < 1e-12);
    }

    #[test]
    fn test_win_clears_everything() {
        let config = PityConfig::default();
        let mut state = PityState::default();
        lose(&mut state, &config, 7);

        let mut ledger = PityLedger::new(&mut state, &config, t0());
        ledger.grant("potion", 0.05, Duration::minutes(10)).unwrap();
        let cleared = ledger.record_win();
        assert_eq!(
            cleared,
            Some(PityTriggerInfo::Cleared { stacks_cleared: 2, loss_streak_broken: 7 })
        );

        let status = ledger.status();
        assert!(!status.active);
        assert_eq!(status.loss_streak, 0);
        assert_eq!(status.best_loss_streak, 7);
        assert_eq!(status.total_boost, 0.0);
    }

    #[test]
    fn test_win_without_stacks_reports_nothing() {
        let config = PityConfig::default();
        let mut state = PityState::default();
        lose(&mut state, &config, 2);

        let mut ledger = PityLedger::new(&mut state, &config, t0());
        assert_eq!(ledger.record_win(), None);
        assert_eq!(state.loss_streak, 0);
    }

    #[test]
    fn test_boost_is_capped() {
        let config = PityConfig { max_boost: 0.2, ..PityConfig::default() };
        let mut state = PityState::default();
        lose(&mut state, &config, 15);

        let mut ledger = PityLedger::new(&mut state, &config, t0());
        let total = ledger.grant("potion", 0.15, Duration::minutes(10)).unwrap();
        assert_eq!(total, 0.2);
        assert_eq!(ledger.status().total_boost, 0.2);
    }

    #[test]
    fn test_granted_stack_refreshes_by_label() {
        let config = PityConfig::default();
        let mut state = PityState::default();

        let mut ledger = PityLedger::new(&mut state, &config, t0());
        ledger.grant("potion", 0.05, Duration::minutes(10)).unwrap();
        ledger.grant("potion", 0.07, Duration::minutes(20)).unwrap();
        ledger.grant("blessing", 0.01, Duration::minutes(5)).unwrap();

        let status = ledger.status();
        assert_eq!(status.stacks.len(), 2);
        assert!((status.total_boost - 0.08).abs() < 1e-12);
        assert_eq!(state.trigger_count, 0);
        assert_eq!(state.stacks[0].expires_at, t0() + Duration::minutes(20));
    }

    #[test]
    fn test_grant_rejects_bad_input() {
        let config = PityConfig::default();
        let mut state = PityState::default();
        let mut ledger = PityLedger::new(&mut state, &config, t0());
        assert!(ledger.grant("x", -0.1, Duration::minutes(1)).is_err());
        assert!(ledger.grant("x", 0.1, Duration::zero()).is_err());
    }

    #[test]
    fn test_prune_keeps_streak() {
        let config = PityConfig::default();
        let mut state = PityState::default();
        lose(&mut state, &config, 5);

        let later = t0() + Duration::minutes(31);
        let mut ledger = PityLedger::new(&mut state, &config, later);
        assert_eq!(ledger.prune_expired(), 1);
        assert!(!ledger.status().active);
        assert_eq!(state.loss_streak, 5);
    }

    #[test]
    fn test_expired_lower_tier_still_upgrades() {
        let config = PityConfig::default();
        let mut state = PityState::default();
        lose(&mut state, &config, 9);

        let later = t0() + Duration::hours(1);
        let mut ledger = PityLedger::new(&mut state, &config, later);
        let trigger = ledger.record_loss();
        assert!(matches!(trigger, Some(PityTriggerInfo::Activated { loss_streak: 10, .. })));
    }

    #[test]
    fn test_two_losses_count_twice() {
        let config = PityConfig::default();
        let mut state = PityState::default();
        lose(&mut state, &config, 1);
        let before = state.loss_streak;
        lose(&mut state, &config, 2);
        assert_eq!(state.loss_streak, before + 2);
    }

    #[test]
    fn test_effective_boost_filters_and_clamps() {
        let now = t0();
        let stack = |rate, expires_in: i64| PityStack {
            source: StackSource::Granted,
            threshold_label: "x".into(),
            rate_per_stack: rate,
            activated_at: now,
            expires_at: now + Duration::seconds(expires_in),
        };
        let stacks = vec![stack(0.1, 60), stack(0.5, 0), stack(f64::NAN, 60), stack(0.2, 60)];
        assert!((effective_boost(&stacks, now, 1.0) - 0.3).abs() < 1e-12);
        assert_eq!(effective_boost(&stacks, now, 0.25), 0.25);
        assert_eq!(effective_boost(&[stack(-0.4, 60)], now, 0.25), 0.0);
    }

    #[test]
    fn test_trigger_info_is_tagged() {
        let info = PityTriggerInfo::Cleared { stacks_cleared: 1, loss_streak_broken: 6 };
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["kind"], "cleared");
        assert_eq!(json["loss_streak_broken"], 6);
    }

    #[test]
    fn test_config_validation() {
        tokio_test::assert_ok!(PityConfig::default().validate());

        let mut config = PityConfig::default();
        config.tiers[1].losses = 5;
        assert!(config.validate().is_err());

        let mut config = PityConfig::default();
        config.tiers[2].label = "streak_5".into();
        assert!(config.validate().is_err());

        let mut config = PityConfig::default();
        config.tiers[0].duration_secs = 0;
        assert!(config.validate().is_err());
    }
}
