//! Win-chance modifier aggregation
//!
//! Pity, lucky potions and curses are additive deltas combined before they
//! scale the game's base chance. The combined chance is nominal and may exceed
//! 1; it is clamped only where a roll is sampled.

use crate::config::{check_duration, check_non_negative};
use crate::{FairnessError, Result};
use chrono::{DateTime, Duration, Utc};
use persistence::{ActiveEffect, EffectKind, PlayerId};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Tuning for one kind of timed effect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectSpec {
    pub rate: f64,
    /// Active stacks that count; more are never stored
    pub max_stacks: u32,
    pub duration_secs: u64,
}

impl EffectSpec {
    fn validate(&self, name: &str) -> Result<()> {
        check_non_negative(&format!("{name}.rate"), self.rate)?;
        if self.max_stacks == 0 {
            return Err(FairnessError::config(format!("{name}.max_stacks must be at least 1")));
        }
        check_duration(&format!("{name}.duration_secs"), self.duration_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectConfig {
    pub lucky: EffectSpec,
    pub unlucky: EffectSpec,
}

impl Default for EffectConfig {
    fn default() -> Self {
        Self {
            lucky: EffectSpec { rate: 0.1, max_stacks: 3, duration_secs: 1_800 },
            unlucky: EffectSpec { rate: 0.1, max_stacks: 1, duration_secs: 1_800 },
        }
    }
}

impl EffectConfig {
    pub fn validate(&self) -> Result<()> {
        self.lucky.validate("effects.lucky")?;
        self.unlucky.validate("effects.unlucky")
    }

    pub fn spec(&self, kind: EffectKind) -> &EffectSpec {
        match kind {
            EffectKind::Lucky => &self.lucky,
            EffectKind::Unlucky => &self.unlucky,
        }
    }
}

/// Components of a player's modifier; `unlucky` is a magnitude
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModifierBreakdown {
    pub pity: f64,
    pub lucky: f64,
    pub unlucky: f64,
    pub total: f64,
}

fn effect_sum(effects: &[ActiveEffect], kind: EffectKind, now: DateTime<Utc>, max_stacks: u32) -> f64 {
    effects
        .iter()
        .filter(|e| e.kind == kind && e.is_active(now))
        .take(max_stacks as usize)
        .map(|e| if e.rate.is_finite() { e.rate.max(0.0) } else { 0.0 })
        .sum()
}

/// Combine an already capped pity boost with the active timed effects
pub fn aggregate_modifier(
    pity_boost: f64,
    effects: &[ActiveEffect],
    now: DateTime<Utc>,
    config: &EffectConfig,
) -> ModifierBreakdown {
    let pity = if pity_boost.is_finite() { pity_boost } else { 0.0 };
    let lucky = effect_sum(effects, EffectKind::Lucky, now, config.lucky.max_stacks);
    let unlucky = effect_sum(effects, EffectKind::Unlucky, now, config.unlucky.max_stacks);
    ModifierBreakdown { pity, lucky, unlucky, total: pity + lucky - unlucky }
}

/// `base * (1 + modifier)`, unclamped
pub fn effective_chance(base: f64, modifier: f64) -> f64 {
    base * (1.0 + modifier)
}

/// Sample a win with `chance` clamped into `[0, 1]`
pub fn roll_outcome<R: Rng + ?Sized>(chance: f64, rng: &mut R) -> bool {
    if chance.is_nan() {
        return false;
    }
    rng.gen_bool(chance.clamp(0.0, 1.0))
}

pub fn prune_effects(effects: &mut Vec<ActiveEffect>, now: DateTime<Utc>) -> usize {
    let before = effects.len();
    effects.retain(|e| e.is_active(now));
    before - effects.len()
}

/// Outcome of applying a timed effect
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EffectApplication {
    pub kind: EffectKind,
    pub active_stacks: u32,
    pub expires_at: DateTime<Utc>,
    /// True when the cap was reached and the oldest stack was renewed instead
    pub refreshed: bool,
}

/// Add a stack of `kind`, or renew the soonest-expiring one at the cap
pub fn apply_effect(
    effects: &mut Vec<ActiveEffect>,
    kind: EffectKind,
    config: &EffectConfig,
    applied_by: Option<PlayerId>,
    now: DateTime<Utc>,
) -> EffectApplication {
    prune_effects(effects, now);
    let spec = config.spec(kind);
    let expires_at = now + Duration::seconds(spec.duration_secs as i64);

    let active = effects.iter().filter(|e| e.kind == kind).count() as u32;
    let refreshed = active >= spec.max_stacks;
    if refreshed {
        if let Some(oldest) = effects
            .iter_mut()
            .filter(|e| e.kind == kind)
            .min_by_key(|e| e.expires_at)
        {
            oldest.rate = spec.rate;
            oldest.applied_at = now;
            oldest.expires_at = expires_at;
            oldest.applied_by = applied_by;
        }
    } else {
        effects.push(ActiveEffect { kind, rate: spec.rate, applied_at: now, expires_at, applied_by });
    }

    EffectApplication {
        kind,
        active_stacks: if refreshed { active } else { active + 1 },
        expires_at,
        refreshed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 5, 8, 0, 0).unwrap()
    }

    fn effect(kind: EffectKind, rate: f64, expires_in_secs: i64) -> ActiveEffect {
        ActiveEffect {
            kind,
            rate,
            applied_at: now(),
            expires_at: now() + Duration::seconds(expires_in_secs),
            applied_by: None,
        }
    }

    #[test]
    fn test_breakdown_sums_components() {
        let effects = vec![
            effect(EffectKind::Lucky, 0.1, 60),
            effect(EffectKind::Lucky, 0.1, 60),
            effect(EffectKind::Unlucky, 0.15, 60),
            effect(EffectKind::Lucky, 0.3, -1),
        ];
        let breakdown = aggregate_modifier(0.05, &effects, now(), &EffectConfig::default());
        assert!((breakdown.lucky - 0.2).abs() < 1e-12);
        assert!((breakdown.unlucky - 0.15).abs() < 1e-12);
        assert!((breakdown.total - (0.05 + 0.2 - 0.15)).abs() < 1e-12);
    }

    #[test]
    fn test_stacks_beyond_cap_do_not_count() {
        let effects: Vec<_> = (0..5).map(|_| effect(EffectKind::Lucky, 0.1, 60)).collect();
        let breakdown = aggregate_modifier(0.0, &effects, now(), &EffectConfig::default());
        assert!((breakdown.lucky - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_effective_chance_is_not_clamped() {
        assert!((effective_chance(0.5, 0.2) - 0.6).abs() < 1e-12);
        assert!(effective_chance(0.9, 0.5) > 1.0);
        assert!(effective_chance(0.5, -1.5) < 0.0);
    }

    #[test]
    fn test_roll_outcome_clamps() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        assert!((0..100).all(|_| roll_outcome(1.7, &mut rng)));
        assert!((0..100).all(|_| !roll_outcome(-0.3, &mut rng)));
        assert!(!roll_outcome(f64::NAN, &mut rng));
    }

    #[test]
    fn test_apply_effect_refreshes_at_cap() {
        let config = EffectConfig::default();
        let mut effects = Vec::new();

        let first = apply_effect(&mut effects, EffectKind::Unlucky, &config, Some(42), now());
        assert_eq!(first.active_stacks, 1);
        assert!(!first.refreshed);

        let later = now() + Duration::minutes(5);
        let second = apply_effect(&mut effects, EffectKind::Unlucky, &config, Some(43), later);
        assert!(second.refreshed);
        assert_eq!(second.active_stacks, 1);
        assert_eq!(effects.len(), 1);
        assert_eq!(effects[0].applied_by, Some(43));
        assert_eq!(effects[0].expires_at, later + Duration::minutes(30));
    }

    #[test]
    fn test_prune_effects() {
        let mut effects = vec![effect(EffectKind::Lucky, 0.1, 0), effect(EffectKind::Lucky, 0.1, 10)];
        assert_eq!(prune_effects(&mut effects, now()), 1);
        assert_eq!(effects.len(), 1);
    }
}
