//! FairnessEngine: the single entry point for wallet mutations
//!
//! Every mutation of a wallet runs under that wallet's async lock, so two
//! settlements for the same player never interleave inside this process.
//! When a mutation also touches the pool, the wallet lock is taken first and
//! the pool lock second. Payout epochs never hold the pool lock while they
//! wait on a wallet lock.

use crate::config::EconomyConfig;
use crate::luck::{assess_luck, LuckAssessment};
use crate::modifiers::{
    aggregate_modifier, apply_effect, effective_chance, prune_effects, roll_outcome,
    EffectApplication, ModifierBreakdown,
};
use crate::pity::{PityLedger, PityStatus, PityTriggerInfo};
use crate::rates::{self, floor_amount, InterestAccrual};
use crate::{FairnessError, Result};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use persistence::{EffectKind, PlayerId, PoolData, Wallet, WalletStore};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info};

/// Per-wallet async locks, created on first use
#[derive(Debug, Default)]
pub struct WalletLocks {
    locks: DashMap<PlayerId, Arc<tokio::sync::Mutex<()>>>,
}

impl WalletLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, id: PlayerId) -> OwnedMutexGuard<()> {
        let mutex = self.locks.entry(id).or_default().clone();
        mutex.lock_owned().await
    }

    /// Drop locks nobody holds or waits on
    pub fn prune_idle(&self) -> usize {
        let before = self.locks.len();
        self.locks.retain(|_, mutex| Arc::strong_count(mutex) > 1);
        before - self.locks.len()
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// What a single bet settlement changed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettlementReceipt {
    pub pity: Option<PityTriggerInfo>,
    /// Win tax deducted from the balance
    pub tax_charged: u64,
    /// Share of the win tax added to the universal pool
    pub pool_contribution: u64,
    /// Credited to the balance on a loss
    pub cashback: u64,
    /// House-funded addition to the loss pool
    pub loss_pool_contribution: u64,
}

pub struct FairnessEngine {
    pub(crate) store: Arc<dyn WalletStore>,
    config: RwLock<Arc<EconomyConfig>>,
    pub(crate) locks: WalletLocks,
    pub(crate) pool_lock: tokio::sync::Mutex<()>,
    pub(crate) rng: Mutex<ChaCha8Rng>,
}

impl FairnessEngine {
    /// Create an engine over `store`; the configuration must validate
    pub fn new(store: Arc<dyn WalletStore>, config: EconomyConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            config: RwLock::new(Arc::new(config)),
            locks: WalletLocks::new(),
            pool_lock: tokio::sync::Mutex::new(()),
            rng: Mutex::new(ChaCha8Rng::from_entropy()),
        })
    }

    /// Replace the RNG with a seeded one for reproducible draws
    pub fn with_rng_seed(self, seed: u64) -> Self {
        *self.rng.lock() = ChaCha8Rng::seed_from_u64(seed);
        self
    }

    pub fn config(&self) -> Arc<EconomyConfig> {
        self.config.read().clone()
    }

    pub fn store(&self) -> &Arc<dyn WalletStore> {
        &self.store
    }

    /// Swap in a new configuration; an invalid one is rejected and the old kept
    pub fn reload_config(&self, config: EconomyConfig) -> Result<()> {
        config.validate()?;
        *self.config.write() = Arc::new(config);
        info!("Economy configuration reloaded");
        Ok(())
    }

    pub async fn pool(&self) -> Result<PoolData> {
        Ok(self.store.get_pool().await?)
    }

    pub(crate) async fn load_or_create(&self, id: PlayerId, now: DateTime<Utc>) -> Result<Wallet> {
        Ok(self.store.get_wallet(id).await?.unwrap_or_else(|| {
            debug!(player_id = id, "Creating wallet on first use");
            Wallet::new(now)
        }))
    }

    pub(crate) async fn load_existing(&self, id: PlayerId) -> Result<Wallet> {
        self.store
            .get_wallet(id)
            .await?
            .ok_or(FairnessError::PlayerNotFound { player_id: id })
    }

    async fn add_to_pool(&self, universal: u64, loss: u64) -> Result<()> {
        if universal == 0 && loss == 0 {
            return Ok(());
        }
        let _pool = self.pool_lock.lock().await;
        let mut pool = self.store.get_pool().await?;
        pool.universal_pool = pool.universal_pool.saturating_add(universal);
        pool.loss_pool = pool.loss_pool.saturating_add(loss);
        self.store.set_pool(&pool).await?;
        Ok(())
    }

    pub async fn record_win(&self, id: PlayerId, game: &str, profit: u64) -> Result<SettlementReceipt> {
        self.record_win_at(id, game, profit, Utc::now()).await
    }

    /// Settle a win whose `profit` the caller has already credited
    pub async fn record_win_at(
        &self,
        id: PlayerId,
        game: &str,
        profit: u64,
        now: DateTime<Utc>,
    ) -> Result<SettlementReceipt> {
        let config = self.config();
        let _guard = self.locks.lock(id).await;
        let mut wallet = self.load_or_create(id, now).await?;

        let pity = PityLedger::new(&mut wallet.stats.pity, &config.pity, now).record_win();
        prune_effects(&mut wallet.effects, now);

        let record = wallet.game_mut(game);
        record.wins += 1;
        record.total_won = record.total_won.saturating_add(profit);
        wallet.stats.games_played += 1;
        wallet.stats.total_won = wallet.stats.total_won.saturating_add(profit);

        // Band axis runs from net worth before the win to net worth after it
        let net_worth = wallet.net_worth();
        let tax = floor_amount(profit as f64 * config.tax.win_tax_rate);
        let tax_charged = tax.min(wallet.balance);
        let pool_contribution = floor_amount(config.tax.pool_schedule.amount_between(
            net_worth.saturating_sub(profit),
            net_worth,
            config.tax.win_tax_rate,
        ))
        .min(tax_charged);

        wallet.balance -= tax_charged;
        wallet.stats.total_tax_paid = wallet.stats.total_tax_paid.saturating_add(tax_charged);
        self.store.set_wallet(id, &wallet).await?;
        self.add_to_pool(pool_contribution, 0).await?;

        debug!(player_id = id, game, profit, tax_charged, pool_contribution, "Recorded win");
        Ok(SettlementReceipt { pity, tax_charged, pool_contribution, ..Default::default() })
    }

    pub async fn record_loss(&self, id: PlayerId, game: &str, amount: u64) -> Result<SettlementReceipt> {
        self.record_loss_at(id, game, amount, Utc::now()).await
    }

    /// Settle a lost wager of `amount`
    pub async fn record_loss_at(
        &self,
        id: PlayerId,
        game: &str,
        amount: u64,
        now: DateTime<Utc>,
    ) -> Result<SettlementReceipt> {
        let config = self.config();
        let _guard = self.locks.lock(id).await;
        let mut wallet = self.load_or_create(id, now).await?;

        let pity = PityLedger::new(&mut wallet.stats.pity, &config.pity, now).record_loss();
        prune_effects(&mut wallet.effects, now);

        let record = wallet.game_mut(game);
        record.losses += 1;
        record.total_lost = record.total_lost.saturating_add(amount);
        wallet.stats.games_played += 1;
        wallet.stats.total_lost = wallet.stats.total_lost.saturating_add(amount);

        let cashback = floor_amount(amount as f64 * config.cashback_rate(wallet.upgrades.cashback));
        wallet.balance = wallet.balance.saturating_add(cashback);
        wallet.stats.total_cashback = wallet.stats.total_cashback.saturating_add(cashback);
        let loss_pool_contribution = floor_amount(amount as f64 * config.tax.loss_pool_rate);

        self.store.set_wallet(id, &wallet).await?;
        self.add_to_pool(0, loss_pool_contribution).await?;

        debug!(player_id = id, game, amount, cashback, loss_pool_contribution, "Recorded loss");
        Ok(SettlementReceipt { pity, cashback, loss_pool_contribution, ..Default::default() })
    }

    /// Modifier components without persisting any pruning
    pub async fn modifier_breakdown_at(&self, id: PlayerId, now: DateTime<Utc>) -> Result<ModifierBreakdown> {
        let config = self.config();
        let Some(mut wallet) = self.store.get_wallet(id).await? else {
            return Ok(ModifierBreakdown::default());
        };
        let pity = PityLedger::new(&mut wallet.stats.pity, &config.pity, now).total_boost();
        Ok(aggregate_modifier(pity, &wallet.effects, now, &config.effects))
    }

    pub async fn get_win_chance_modifier(&self, id: PlayerId) -> Result<f64> {
        Ok(self.modifier_breakdown_at(id, Utc::now()).await?.total)
    }

    pub async fn effective_win_chance(&self, id: PlayerId, game: &str) -> Result<f64> {
        self.effective_win_chance_at(id, game, Utc::now()).await
    }

    pub async fn effective_win_chance_at(&self, id: PlayerId, game: &str, now: DateTime<Utc>) -> Result<f64> {
        let base = self.config().games.win_chance(game);
        let modifier = self.modifier_breakdown_at(id, now).await?.total;
        Ok(effective_chance(base, modifier))
    }

    /// Roll a bet with the player's effective chance
    pub async fn roll_win(&self, id: PlayerId, game: &str) -> Result<bool> {
        let chance = self.effective_win_chance(id, game).await?;
        let mut rng = self.rng.lock();
        Ok(roll_outcome(chance, &mut *rng))
    }

    /// `floor(base * profit boost * game multiplier)`
    pub async fn apply_profit_boost(&self, id: PlayerId, game: &str, base_profit: u64) -> Result<u64> {
        let config = self.config();
        let level = match self.store.get_wallet(id).await? {
            Some(wallet) => wallet.upgrades.profit_boost,
            None => 0,
        };
        let boosted = base_profit as f64 * config.profit_boost(level) * config.games.profit_multiplier(game);
        Ok(floor_amount(boosted))
    }

    pub async fn get_user_pity_status(&self, id: PlayerId) -> Result<PityStatus> {
        self.get_user_pity_status_at(id, Utc::now()).await
    }

    /// Pity status; expired stacks found here are pruned and persisted
    pub async fn get_user_pity_status_at(&self, id: PlayerId, now: DateTime<Utc>) -> Result<PityStatus> {
        let config = self.config();
        let _guard = self.locks.lock(id).await;
        let Some(mut wallet) = self.store.get_wallet(id).await? else {
            let mut empty = Default::default();
            return Ok(PityLedger::new(&mut empty, &config.pity, now).status());
        };

        let mut ledger = PityLedger::new(&mut wallet.stats.pity, &config.pity, now);
        let pruned = ledger.prune_expired();
        let status = ledger.status();
        if pruned > 0 {
            self.store.set_wallet(id, &wallet).await?;
        }
        Ok(status)
    }

    pub async fn grant_pity_stack(
        &self,
        id: PlayerId,
        label: &str,
        rate: f64,
        duration: Duration,
    ) -> Result<PityStatus> {
        self.grant_pity_stack_at(id, label, rate, duration, Utc::now()).await
    }

    /// Add an independent-cause stack that counts toward the pity cap
    pub async fn grant_pity_stack_at(
        &self,
        id: PlayerId,
        label: &str,
        rate: f64,
        duration: Duration,
        now: DateTime<Utc>,
    ) -> Result<PityStatus> {
        let config = self.config();
        let _guard = self.locks.lock(id).await;
        let mut wallet = self.load_or_create(id, now).await?;

        let mut ledger = PityLedger::new(&mut wallet.stats.pity, &config.pity, now);
        ledger.grant(label, rate, duration)?;
        let status = ledger.status();
        self.store.set_wallet(id, &wallet).await?;

        info!(player_id = id, label, rate, total_boost = status.total_boost, "Granted pity stack");
        Ok(status)
    }

    pub async fn accrue_interest(&self, id: PlayerId) -> Result<InterestAccrual> {
        self.accrue_interest_at(id, Utc::now()).await
    }

    /// Credit pending bank interest for an existing wallet
    pub async fn accrue_interest_at(&self, id: PlayerId, now: DateTime<Utc>) -> Result<InterestAccrual> {
        let config = self.config();
        let _guard = self.locks.lock(id).await;
        let mut wallet = self.load_existing(id).await?;

        let level = config.level(wallet.upgrades.interest);
        let accrual = rates::accrue_interest(&mut wallet, &config.interest, level, now);
        if accrual.periods > 0 {
            self.store.set_wallet(id, &wallet).await?;
            debug!(player_id = id, periods = accrual.periods, interest = accrual.interest, "Accrued interest");
        }
        Ok(accrual)
    }

    /// Luck over one game, or across all games when `game` is `None`
    pub async fn assess_player_luck(&self, id: PlayerId, game: Option<&str>) -> Result<Option<LuckAssessment>> {
        let config = self.config();
        let Some(wallet) = self.store.get_wallet(id).await? else {
            return Ok(None);
        };

        let (record, baseline) = match game {
            Some(game) => (
                wallet.stats.games.get(game).cloned().unwrap_or_default(),
                config.games.win_chance(game),
            ),
            None => (wallet.stats.overall(), config.games.default_win_chance),
        };
        Ok(assess_luck(record.wins, record.games_played(), baseline))
    }

    pub async fn apply_lucky_effect(&self, id: PlayerId) -> Result<EffectApplication> {
        self.apply_lucky_effect_at(id, Utc::now()).await
    }

    pub async fn apply_lucky_effect_at(&self, id: PlayerId, now: DateTime<Utc>) -> Result<EffectApplication> {
        self.apply_effect_at(id, EffectKind::Lucky, None, now).await
    }

    pub async fn apply_curse(&self, target: PlayerId, caster: PlayerId) -> Result<EffectApplication> {
        self.apply_curse_at(target, caster, Utc::now()).await
    }

    /// Curse an existing player on behalf of `caster`
    pub async fn apply_curse_at(
        &self,
        target: PlayerId,
        caster: PlayerId,
        now: DateTime<Utc>,
    ) -> Result<EffectApplication> {
        self.apply_effect_at(target, EffectKind::Unlucky, Some(caster), now).await
    }

    async fn apply_effect_at(
        &self,
        id: PlayerId,
        kind: EffectKind,
        applied_by: Option<PlayerId>,
        now: DateTime<Utc>,
    ) -> Result<EffectApplication> {
        let config = self.config();
        let _guard = self.locks.lock(id).await;
        let mut wallet = match kind {
            EffectKind::Lucky => self.load_or_create(id, now).await?,
            EffectKind::Unlucky => self.load_existing(id).await?,
        };

        let application = apply_effect(&mut wallet.effects, kind, &config.effects, applied_by, now);
        self.store.set_wallet(id, &wallet).await?;

        info!(
            player_id = id,
            kind = ?kind,
            applied_by = ?applied_by,
            active_stacks = application.active_stacks,
            "Applied timed effect"
        );
        Ok(application)
    }
}
