//! Configuration for the fairness engine
//!
//! Every table is a typed struct validated once at load time. A config that
//! fails validation is never installed, so the engine never pays out from a
//! malformed schedule.

use crate::modifiers::EffectConfig;
use crate::pity::PityConfig;
use crate::rates::{InterestConfig, Slab, SlabSchedule};
use crate::{FairnessError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Longest duration any timed buff may be configured with
pub(crate) const MAX_DURATION_SECS: u64 = 365 * 24 * 60 * 60;

/// Per-game tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameTuning {
    /// Baseline win probability before modifiers
    pub win_chance: f64,

    /// Multiplier applied by `apply_profit_boost`
    pub profit_multiplier: f64,
}

impl Default for GameTuning {
    fn default() -> Self {
        Self { win_chance: 0.5, profit_multiplier: 1.0 }
    }
}

/// Baseline win chances per game
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GamesConfig {
    /// Used for games without an explicit entry
    pub default_win_chance: f64,

    pub games: BTreeMap<String, GameTuning>,
}

impl Default for GamesConfig {
    fn default() -> Self {
        let games = [
            ("blackjack", 0.49),
            ("coinflip", 0.5),
            ("mines", 0.45),
            ("slots", 0.3),
            ("wheel", 0.4),
        ]
        .into_iter()
        .map(|(name, win_chance)| {
            (name.to_string(), GameTuning { win_chance, profit_multiplier: 1.0 })
        })
        .collect();

        Self { default_win_chance: 0.5, games }
    }
}

impl GamesConfig {
    pub fn win_chance(&self, game: &str) -> f64 {
        self.games.get(game).map(|g| g.win_chance).unwrap_or(self.default_win_chance)
    }

    pub fn profit_multiplier(&self, game: &str) -> f64 {
        self.games.get(game).map(|g| g.profit_multiplier).unwrap_or(1.0)
    }
}

/// Win tax and loss pool rates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaxConfig {
    /// Flat share of a win's profit charged to the player
    pub win_tax_rate: f64,

    /// Share of a lost wager added to the loss pool
    pub loss_pool_rate: f64,

    /// Pool share of the win tax, banded by net worth
    pub pool_schedule: SlabSchedule,
}

impl Default for TaxConfig {
    fn default() -> Self {
        Self {
            win_tax_rate: 0.05,
            loss_pool_rate: 0.10,
            pool_schedule: SlabSchedule {
                slabs: vec![
                    Slab { threshold: 1_000_000, scale: 1.0 },
                    Slab { threshold: 10_000_000, scale: 0.5 },
                    Slab { threshold: 100_000_000, scale: 0.25 },
                ],
                final_scale: 0.1,
            },
        }
    }
}

/// Cashback on losses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CashbackConfig {
    pub rate_per_level: f64,
}

impl Default for CashbackConfig {
    fn default() -> Self {
        Self { rate_per_level: 0.01 }
    }
}

/// Upgrade bounds and per-level effects not covered by a dedicated table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpgradeConfig {
    pub max_level: u8,
    pub profit_boost_per_level: f64,
}

impl Default for UpgradeConfig {
    fn default() -> Self {
        Self { max_level: 10, profit_boost_per_level: 0.02 }
    }
}

/// Daily loss-pool lottery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LotteryConfig {
    pub base_weight: f64,
    pub weight_per_level: f64,
    /// Added to the personal payout multiplier (base 1.0) per level
    pub multiplier_per_level: f64,
    /// Budget for resolving the winner's display name
    pub name_lookup_timeout_ms: u64,
}

impl Default for LotteryConfig {
    fn default() -> Self {
        Self {
            base_weight: 1.0,
            weight_per_level: 0.5,
            multiplier_per_level: 0.1,
            name_lookup_timeout_ms: 2_000,
        }
    }
}

/// Hourly double-payout chance: integer part guaranteed, fraction rolled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DoubleChanceConfig {
    pub base: f64,
    pub per_level: f64,
}

impl Default for DoubleChanceConfig {
    fn default() -> Self {
        Self { base: 0.0, per_level: 0.1 }
    }
}

/// Complete economy configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EconomyConfig {
    pub games: GamesConfig,
    pub pity: PityConfig,
    pub effects: EffectConfig,
    pub interest: InterestConfig,
    pub tax: TaxConfig,
    pub cashback: CashbackConfig,
    pub upgrades: UpgradeConfig,
    pub lottery: LotteryConfig,
    pub double_chance: DoubleChanceConfig,
}

fn check_unit(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(FairnessError::config(format!("{name} must be within [0, 1], got {value}")));
    }
    Ok(())
}

pub(crate) fn check_non_negative(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(FairnessError::config(format!(
            "{name} must be finite and non-negative, got {value}"
        )));
    }
    Ok(())
}

pub(crate) fn check_duration(name: &str, secs: u64) -> Result<()> {
    if secs == 0 || secs > MAX_DURATION_SECS {
        return Err(FairnessError::config(format!(
            "{name} must be between 1 and {MAX_DURATION_SECS} seconds, got {secs}"
        )));
    }
    Ok(())
}

impl EconomyConfig {
    /// Validate every table; the first violation is reported
    pub fn validate(&self) -> Result<()> {
        check_unit("games.default_win_chance", self.games.default_win_chance)?;
        for (name, game) in &self.games.games {
            check_unit(&format!("games.{name}.win_chance"), game.win_chance)?;
            check_non_negative(&format!("games.{name}.profit_multiplier"), game.profit_multiplier)?;
        }

        self.pity.validate()?;
        self.effects.validate()?;
        self.interest.validate()?;

        check_unit("tax.win_tax_rate", self.tax.win_tax_rate)?;
        check_unit("tax.loss_pool_rate", self.tax.loss_pool_rate)?;
        self.tax.pool_schedule.validate("tax.pool_schedule")?;
        if self.tax.pool_schedule.slabs.iter().any(|s| s.scale > 1.0)
            || self.tax.pool_schedule.final_scale > 1.0
        {
            return Err(FairnessError::config(
                "tax.pool_schedule scales must not exceed 1 (the pool cannot take more than the tax)",
            ));
        }

        check_non_negative("cashback.rate_per_level", self.cashback.rate_per_level)?;
        let max_cashback = self.cashback.rate_per_level * f64::from(self.upgrades.max_level);
        if max_cashback > 1.0 {
            return Err(FairnessError::config(format!(
                "cashback at max level would refund {max_cashback:.2}x the wager"
            )));
        }

        check_non_negative("upgrades.profit_boost_per_level", self.upgrades.profit_boost_per_level)?;

        check_non_negative("lottery.base_weight", self.lottery.base_weight)?;
        check_non_negative("lottery.weight_per_level", self.lottery.weight_per_level)?;
        check_non_negative("lottery.multiplier_per_level", self.lottery.multiplier_per_level)?;
        if self.lottery.base_weight <= 0.0 {
            return Err(FairnessError::config("lottery.base_weight must be positive"));
        }

        check_non_negative("double_chance.base", self.double_chance.base)?;
        check_non_negative("double_chance.per_level", self.double_chance.per_level)?;

        Ok(())
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: EconomyConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Save configuration to TOML file
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Upgrade level clamped to the configured maximum
    pub fn level(&self, stored: u8) -> u8 {
        stored.min(self.upgrades.max_level)
    }

    /// Cashback fraction for an upgrade level
    pub fn cashback_rate(&self, level: u8) -> f64 {
        f64::from(self.level(level)) * self.cashback.rate_per_level
    }

    /// Profit multiplier from the profit-boost upgrade
    pub fn profit_boost(&self, level: u8) -> f64 {
        1.0 + f64::from(self.level(level)) * self.upgrades.profit_boost_per_level
    }

    /// Lottery weight for an upgrade level plus item bonus
    pub fn lottery_weight(&self, level: u8, bonus: f64) -> f64 {
        let bonus = if bonus.is_finite() { bonus.max(0.0) } else { 0.0 };
        self.lottery.base_weight + f64::from(self.level(level)) * self.lottery.weight_per_level + bonus
    }

    /// Personal payout multiplier for the daily lottery
    pub fn lottery_multiplier(&self, level: u8) -> f64 {
        1.0 + f64::from(self.level(level)) * self.lottery.multiplier_per_level
    }

    /// Double-payout chance for the hourly split
    pub fn double_chance(&self, level: u8) -> f64 {
        self.double_chance.base + f64::from(self.level(level)) * self.double_chance.per_level
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        EconomyConfig::default().validate().unwrap();
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EconomyConfig::from_toml_str(
            r#"
            [tax]
            win_tax_rate = 0.02

            [games.games.dice]
            win_chance = 0.48
            "#,
        )
        .unwrap();

        assert_eq!(config.tax.win_tax_rate, 0.02);
        assert_eq!(config.tax.loss_pool_rate, TaxConfig::default().loss_pool_rate);
        assert_eq!(config.games.win_chance("dice"), 0.48);
        assert_eq!(config.games.win_chance("unknown"), 0.5);
    }

    #[test]
    fn test_out_of_range_rate_fails_fast() {
        let err = EconomyConfig::from_toml_str("[tax]\nwin_tax_rate = 1.5\n").unwrap_err();
        assert!(matches!(err, FairnessError::InvalidConfig { .. }));
    }

    #[test]
    fn test_descending_slabs_rejected() {
        let mut config = EconomyConfig::default();
        config.interest.schedule.slabs = vec![
            Slab { threshold: 10_000, scale: 1.0 },
            Slab { threshold: 5_000, scale: 0.5 },
        ];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_levels_are_clamped() {
        let config = EconomyConfig::default();
        assert_eq!(config.level(200), config.upgrades.max_level);
        assert!((config.cashback_rate(200) - 0.10).abs() < 1e-12);
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("economy.toml");

        let config = EconomyConfig::default();
        config.to_file(&path).unwrap();
        assert_eq!(EconomyConfig::from_file(&path).unwrap(), config);
    }
}
