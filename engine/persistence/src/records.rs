//! Persisted record types for wallets and the global redistribution pools

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Player identifier (chat-platform snowflake)
pub type PlayerId = u64;

/// Per-player wallet record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Wallet {
    /// Liquid currency
    pub balance: u64,

    /// Interest-bearing currency
    pub bank: u64,

    /// Instant up to which bank interest has been accrued
    pub last_bank_accrual: DateTime<Utc>,

    /// Last known display name, used as a fallback by stores
    pub display_name: Option<String>,

    /// Purchased upgrade levels
    pub upgrades: Upgrades,

    /// Lottery weight granted by items, added on top of the upgrade weight
    pub lottery_bonus: f64,

    /// Game statistics and pity state
    pub stats: WalletStats,

    /// Timed lucky/unlucky effects
    pub effects: Vec<ActiveEffect>,
}

impl Wallet {
    /// Create an empty wallet whose interest clock starts at `now`
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            balance: 0,
            bank: 0,
            last_bank_accrual: now,
            display_name: None,
            upgrades: Upgrades::default(),
            lottery_bonus: 0.0,
            stats: WalletStats::default(),
            effects: Vec::new(),
        }
    }

    /// Balance plus bank
    pub fn net_worth(&self) -> u64 {
        self.balance.saturating_add(self.bank)
    }

    /// Per-game record, created on first access
    pub fn game_mut(&mut self, game: &str) -> &mut GameRecord {
        self.stats.games.entry(game.to_string()).or_default()
    }
}

/// A fresh wallet accrues from the moment it is created or first loaded
impl Default for Wallet {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

/// Upgrade levels; each is bounded by the configured max level
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Upgrades {
    pub interest: u8,
    pub cashback: u8,
    pub lottery_weight: u8,
    pub double_chance: u8,
    pub lottery_multiplier: u8,
    pub profit_boost: u8,
}

/// Cumulative wins and losses for one game
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameRecord {
    pub wins: u64,
    pub losses: u64,
    pub total_won: u64,
    pub total_lost: u64,
}

impl GameRecord {
    pub fn games_played(&self) -> u64 {
        self.wins + self.losses
    }
}

/// Statistics block embedded in a wallet
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletStats {
    pub games: BTreeMap<String, GameRecord>,
    pub pity: PityState,
    pub games_played: u64,
    pub total_won: u64,
    pub total_lost: u64,
    pub total_tax_paid: u64,
    pub total_cashback: u64,
    pub total_interest: u64,
    pub total_hourly_payouts: u64,
    pub lottery_wins: u64,
    pub lottery_winnings: u64,
}

impl WalletStats {
    /// Wins and games summed across every game
    pub fn overall(&self) -> GameRecord {
        self.games.values().fold(GameRecord::default(), |mut acc, g| {
            acc.wins += g.wins;
            acc.losses += g.losses;
            acc.total_won += g.total_won;
            acc.total_lost += g.total_lost;
            acc
        })
    }
}

/// Loss-streak bookkeeping and the active pity stacks
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PityState {
    pub loss_streak: u32,
    pub best_loss_streak: u32,
    pub trigger_count: u64,
    pub stacks: Vec<PityStack>,
}

/// What caused a pity stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StackSource {
    /// Loss-streak tier; at most one is active
    Streak,
    /// Independent cause (items, admin grants)
    Granted,
}

/// One time-limited win-chance boost
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PityStack {
    pub source: StackSource,
    pub threshold_label: String,
    pub rate_per_stack: f64,
    pub activated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PityStack {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Kind of a timed win-chance effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    Lucky,
    Unlucky,
}

/// A timed effect (potion or curse) on a wallet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveEffect {
    pub kind: EffectKind,
    pub rate: f64,
    pub applied_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Player who cast a curse, if any
    pub applied_by: Option<PlayerId>,
}

impl ActiveEffect {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Global redistribution pools
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolData {
    /// Accumulated win tax, split hourly
    pub universal_pool: u64,

    /// Accumulated loss tax, drawn daily
    pub loss_pool: u64,

    /// Epoch marker of the last hourly payout
    pub last_hourly_payout: Option<DateTime<Utc>>,

    /// Epoch marker of the last daily lottery
    pub last_daily_spin: Option<DateTime<Utc>>,
}
