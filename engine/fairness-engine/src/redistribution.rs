//! Hourly universal-pool split and daily loss-pool lottery
//!
//! Neither epoch deduplicates runs; the scheduler compares the pool's epoch
//! markers before calling. Per-player failures are logged and skipped so one
//! unreadable wallet never aborts a batch.
//!
//! Pool handling follows the engine's lock order: the pool is read under the
//! pool lock, the lock is released while wallets are credited, and the
//! distributed amount is subtracted afterwards. Contributions that arrive
//! mid-epoch therefore carry over to the next one.

use crate::config::EconomyConfig;
use crate::engine::FairnessEngine;
use crate::rates::floor_amount;
use crate::Result;
use chrono::{DateTime, Utc};
use persistence::PlayerId;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// First candidate whose cumulative weight reaches `draw`
///
/// Non-positive and non-finite weights never win. A draw at or beyond the
/// total selects the last eligible candidate.
pub fn select_weighted(candidates: &[(PlayerId, f64)], draw: f64) -> Option<PlayerId> {
    let mut cumulative = 0.0;
    let mut last = None;
    for &(id, weight) in candidates {
        if !weight.is_finite() || weight <= 0.0 {
            continue;
        }
        cumulative += weight;
        last = Some(id);
        if cumulative >= draw {
            return last;
        }
    }
    last
}

/// One uniform draw in `[0, total_weight)`
pub fn draw_winner<R: Rng + ?Sized>(candidates: &[(PlayerId, f64)], rng: &mut R) -> Option<PlayerId> {
    let total: f64 = candidates
        .iter()
        .map(|&(_, w)| w)
        .filter(|w| w.is_finite() && *w > 0.0)
        .sum();
    if total <= 0.0 {
        return None;
    }
    select_weighted(candidates, rng.gen::<f64>() * total)
}

/// Extra share units for a double-payout chance
///
/// The integer part is guaranteed; the fraction is one Bernoulli roll.
pub fn double_payout_extras<R: Rng + ?Sized>(chance: f64, rng: &mut R) -> u64 {
    if !chance.is_finite() || chance <= 0.0 {
        return 0;
    }
    let guaranteed = chance.floor();
    let fraction = chance - guaranteed;
    let bonus = if fraction > 0.0 && rng.gen_bool(fraction) { 1 } else { 0 };
    guaranteed as u64 + bonus
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourlyPayoutReport {
    pub epoch: Option<DateTime<Utc>>,
    pub players: usize,
    pub pool_before: u64,
    pub share: u64,
    pub credited_players: usize,
    pub skipped_players: usize,
    /// Currency credited including double-payout bonuses
    pub distributed: u64,
    /// Part of `distributed` funded outside the pool
    pub bonus: u64,
    pub pool_after: u64,
    pub interest_credited: u64,
    pub interest_failures: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LotteryWinner {
    pub player_id: PlayerId,
    pub display_name: Option<String>,
    pub payout: u64,
    /// Loss pool consumed by the draw
    pub pool_drawn: u64,
    pub multiplier: f64,
    pub weight: f64,
    pub total_weight: f64,
    pub candidates: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LotteryReport {
    EmptyPool,
    /// Nobody holds positive net worth; the pool is kept
    NoCandidates,
    Drawn(LotteryWinner),
    /// The drawn winner could not be credited; the pool is kept
    WinnerUnavailable { player_id: PlayerId, reason: String },
}

impl LotteryReport {
    pub fn payout(&self) -> u64 {
        match self {
            LotteryReport::Drawn(winner) => winner.payout,
            _ => 0,
        }
    }
}

impl FairnessEngine {
    /// Split the universal pool equally across all wallets
    pub async fn run_hourly_payout_epoch(&self, now: DateTime<Utc>) -> Result<HourlyPayoutReport> {
        let config = self.config();
        let ids = self.store.list_wallet_ids().await?;
        let mut report = HourlyPayoutReport { epoch: Some(now), players: ids.len(), ..Default::default() };
        if ids.is_empty() {
            debug!("Hourly payout skipped: no players");
            return Ok(report);
        }

        for &id in &ids {
            match self.accrue_interest_at(id, now).await {
                Ok(accrual) => report.interest_credited += accrual.interest,
                Err(e) => {
                    warn!(player_id = id, error = %e, "Interest flush failed, skipping player");
                    report.interest_failures += 1;
                }
            }
        }

        report.pool_before = {
            let _pool = self.pool_lock.lock().await;
            self.store.get_pool().await?.universal_pool
        };
        report.share = report.pool_before / ids.len() as u64;

        if report.share > 0 {
            for &id in &ids {
                match self.credit_hourly_share(id, report.share, &config).await {
                    Ok(amount) => {
                        report.credited_players += 1;
                        report.distributed = report.distributed.saturating_add(amount);
                        report.bonus = report.bonus.saturating_add(amount - report.share);
                    }
                    Err(e) => {
                        warn!(player_id = id, error = %e, "Hourly payout failed, skipping player");
                        report.skipped_players += 1;
                    }
                }
            }
        }

        {
            let _pool = self.pool_lock.lock().await;
            let mut pool = self.store.get_pool().await?;
            let drawn = report.share.saturating_mul(report.credited_players as u64);
            pool.universal_pool = pool.universal_pool.saturating_sub(drawn);
            pool.last_hourly_payout = Some(now);
            self.store.set_pool(&pool).await?;
            report.pool_after = pool.universal_pool;
        }
        self.locks.prune_idle();

        info!(
            players = report.players,
            share = report.share,
            credited = report.credited_players,
            skipped = report.skipped_players,
            distributed = report.distributed,
            bonus = report.bonus,
            pool_after = report.pool_after,
            "Hourly payout complete"
        );
        Ok(report)
    }

    async fn credit_hourly_share(&self, id: PlayerId, share: u64, config: &EconomyConfig) -> Result<u64> {
        let _guard = self.locks.lock(id).await;
        let mut wallet = self.load_existing(id).await?;

        let chance = config.double_chance(wallet.upgrades.double_chance);
        let extras = {
            let mut rng = self.rng.lock();
            double_payout_extras(chance, &mut *rng)
        };
        let amount = share.saturating_mul(1 + extras);

        wallet.bank = wallet.bank.saturating_add(amount);
        wallet.stats.total_hourly_payouts = wallet.stats.total_hourly_payouts.saturating_add(amount);
        self.store.set_wallet(id, &wallet).await?;
        Ok(amount)
    }

    /// Award the whole loss pool to one weighted-random player
    pub async fn run_daily_lottery_epoch(&self, now: DateTime<Utc>) -> Result<LotteryReport> {
        let config = self.config();
        let pool_drawn = {
            let _pool = self.pool_lock.lock().await;
            self.store.get_pool().await?.loss_pool
        };
        if pool_drawn == 0 {
            debug!("Daily lottery skipped: loss pool empty");
            return Ok(LotteryReport::EmptyPool);
        }

        let mut candidates = Vec::new();
        for id in self.store.list_wallet_ids().await? {
            match self.store.get_wallet(id).await {
                Ok(Some(wallet)) if wallet.net_worth() > 0 => candidates
                    .push((id, config.lottery_weight(wallet.upgrades.lottery_weight, wallet.lottery_bonus))),
                Ok(_) => {}
                Err(e) => warn!(player_id = id, error = %e, "Lottery candidate unreadable, skipping"),
            }
        }

        let drawn = {
            let mut rng = self.rng.lock();
            draw_winner(&candidates, &mut *rng)
        };
        let Some(player_id) = drawn else {
            info!(loss_pool = pool_drawn, "Daily lottery has no eligible players");
            return Ok(LotteryReport::NoCandidates);
        };

        let (payout, multiplier) = match self.credit_lottery_win(player_id, pool_drawn, &config).await {
            Ok(credited) => credited,
            Err(e) => {
                warn!(player_id, error = %e, "Lottery winner could not be credited, keeping pool");
                return Ok(LotteryReport::WinnerUnavailable { player_id, reason: e.to_string() });
            }
        };

        {
            let _pool = self.pool_lock.lock().await;
            let mut pool = self.store.get_pool().await?;
            pool.loss_pool = pool.loss_pool.saturating_sub(pool_drawn);
            pool.last_daily_spin = Some(now);
            self.store.set_pool(&pool).await?;
        }

        let display_name = self.lookup_display_name(player_id, &config).await;
        let total_weight: f64 = candidates.iter().map(|&(_, w)| w).sum();
        let weight = candidates.iter().find(|&&(id, _)| id == player_id).map(|&(_, w)| w).unwrap_or(0.0);

        info!(
            player_id,
            display_name = display_name.as_deref().unwrap_or("<unknown>"),
            payout,
            pool_drawn,
            multiplier,
            candidates = candidates.len(),
            "Daily lottery drawn"
        );

        Ok(LotteryReport::Drawn(LotteryWinner {
            player_id,
            display_name,
            payout,
            pool_drawn,
            multiplier,
            weight,
            total_weight,
            candidates: candidates.len(),
        }))
    }

    async fn credit_lottery_win(&self, id: PlayerId, pool: u64, config: &EconomyConfig) -> Result<(u64, f64)> {
        let _guard = self.locks.lock(id).await;
        let mut wallet = self.load_existing(id).await?;

        let multiplier = config.lottery_multiplier(wallet.upgrades.lottery_multiplier);
        let payout = floor_amount(pool as f64 * multiplier);

        wallet.balance = wallet.balance.saturating_add(payout);
        wallet.stats.lottery_wins += 1;
        wallet.stats.lottery_winnings = wallet.stats.lottery_winnings.saturating_add(payout);
        self.store.set_wallet(id, &wallet).await?;
        Ok((payout, multiplier))
    }

    async fn lookup_display_name(&self, id: PlayerId, config: &EconomyConfig) -> Option<String> {
        let budget = Duration::from_millis(config.lottery.name_lookup_timeout_ms);
        match tokio::time::timeout(budget, self.store.resolve_display_name(id)).await {
            Ok(Ok(name)) => Some(name),
            Ok(Err(e)) => {
                debug!(player_id = id, error = %e, "Display name unavailable");
                None
            }
            Err(_) => {
                debug!(player_id = id, "Display name lookup timed out");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use persistence::{InMemoryStore, Wallet, WalletStore};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::sync::Arc;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 1, 13, 0, 0).unwrap()
    }

    fn no_double_chance() -> EconomyConfig {
        let mut config = EconomyConfig::default();
        config.double_chance.base = 0.0;
        config.double_chance.per_level = 0.0;
        config
    }

    async fn setup(config: EconomyConfig, players: &[(PlayerId, u64)]) -> (FairnessEngine, InMemoryStore) {
        let store = InMemoryStore::new();
        for &(id, balance) in players {
            let mut wallet = Wallet::new(now());
            wallet.balance = balance;
            store.set_wallet(id, &wallet).await.unwrap();
        }
        let engine = FairnessEngine::new(Arc::new(store.clone()), config).unwrap().with_rng_seed(11);
        (engine, store)
    }

    async fn set_pools(store: &InMemoryStore, universal: u64, loss: u64) {
        let mut pool = store.get_pool().await.unwrap();
        pool.universal_pool = universal;
        pool.loss_pool = loss;
        store.set_pool(&pool).await.unwrap();
    }

    #[test]
    fn test_select_weighted_cumulative_scan() {
        let candidates = [(1, 1.0), (2, 1.0), (3, 2.0)];
        assert_eq!(select_weighted(&candidates, 2.5), Some(3));
        assert_eq!(select_weighted(&candidates, 0.0), Some(1));
        assert_eq!(select_weighted(&candidates, 1.0), Some(1));
        assert_eq!(select_weighted(&candidates, 1.5), Some(2));
        assert_eq!(select_weighted(&candidates, 99.0), Some(3));
    }

    #[test]
    fn test_select_weighted_skips_zero_weights() {
        let candidates = [(1, 0.0), (2, f64::NAN), (3, 1.0)];
        assert_eq!(select_weighted(&candidates, 0.0), Some(3));
        assert_eq!(select_weighted(&[(1, 0.0)], 0.0), None);
        assert_eq!(select_weighted(&[], 0.5), None);
    }

    #[test]
    fn test_double_payout_extras() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        assert_eq!(double_payout_extras(0.0, &mut rng), 0);
        assert_eq!(double_payout_extras(2.0, &mut rng), 2);
        assert!((0..50).all(|_| (1..=2).contains(&double_payout_extras(1.4, &mut rng))));
        assert_eq!(double_payout_extras(f64::NAN, &mut rng), 0);
    }

    #[tokio::test]
    async fn test_hourly_equal_split_keeps_remainder() {
        let (engine, store) = setup(no_double_chance(), &[(1, 10), (2, 10), (3, 10)]).await;
        set_pools(&store, 1_000, 0).await;

        let report = engine.run_hourly_payout_epoch(now()).await.unwrap();
        assert_eq!(report.share, 333);
        assert_eq!(report.credited_players, 3);
        assert_eq!(report.pool_after, 1);

        for id in 1..=3 {
            assert_eq!(store.get_wallet(id).await.unwrap().unwrap().bank, 333);
        }
        let pool = store.get_pool().await.unwrap();
        assert_eq!(pool.universal_pool, 1);
        assert_eq!(pool.last_hourly_payout, Some(now()));
    }

    #[tokio::test]
    async fn test_hourly_skips_stale_player() {
        let (engine, store) = setup(no_double_chance(), &[(1, 10), (2, 10)]).await;
        store.add_stale_id(3).await;
        set_pools(&store, 900, 0).await;

        let report = engine.run_hourly_payout_epoch(now()).await.unwrap();
        assert_eq!(report.share, 300);
        assert_eq!(report.credited_players, 2);
        assert_eq!(report.skipped_players, 1);
        assert_eq!(report.interest_failures, 1);
        assert_eq!(store.get_pool().await.unwrap().universal_pool, 300);
    }

    #[tokio::test]
    async fn test_hourly_double_chance_is_funded_outside_pool() {
        let mut config = no_double_chance();
        config.double_chance.base = 1.0;
        let (engine, store) = setup(config, &[(1, 10), (2, 10)]).await;
        set_pools(&store, 100, 0).await;

        let report = engine.run_hourly_payout_epoch(now()).await.unwrap();
        assert_eq!(report.distributed, 200);
        assert_eq!(report.bonus, 100);
        assert_eq!(report.pool_after, 0);
        assert_eq!(store.get_wallet(1).await.unwrap().unwrap().bank, 100);
    }

    #[tokio::test]
    async fn test_hourly_without_players_is_noop() {
        let (engine, store) = setup(no_double_chance(), &[]).await;
        set_pools(&store, 500, 0).await;

        let report = engine.run_hourly_payout_epoch(now()).await.unwrap();
        assert_eq!(report.players, 0);
        let pool = store.get_pool().await.unwrap();
        assert_eq!(pool.universal_pool, 500);
        assert_eq!(pool.last_hourly_payout, None);
    }

    #[tokio::test]
    async fn test_hourly_flushes_interest_first() {
        let (engine, store) = setup(no_double_chance(), &[]).await;
        let mut wallet = Wallet::new(now() - chrono::Duration::hours(1));
        wallet.bank = 100_000;
        store.set_wallet(1, &wallet).await.unwrap();

        let report = engine.run_hourly_payout_epoch(now()).await.unwrap();
        assert_eq!(report.interest_credited, 100);
        assert_eq!(report.share, 0);
        assert_eq!(store.get_wallet(1).await.unwrap().unwrap().bank, 100_100);
    }

    #[tokio::test]
    async fn test_lottery_empty_pool_is_noop() {
        let (engine, _store) = setup(EconomyConfig::default(), &[(1, 10)]).await;
        assert_eq!(engine.run_daily_lottery_epoch(now()).await.unwrap(), LotteryReport::EmptyPool);
    }

    #[tokio::test]
    async fn test_lottery_requires_positive_net_worth() {
        let (engine, store) = setup(EconomyConfig::default(), &[(1, 0), (2, 0)]).await;
        set_pools(&store, 0, 400).await;

        assert_eq!(engine.run_daily_lottery_epoch(now()).await.unwrap(), LotteryReport::NoCandidates);
        assert_eq!(store.get_pool().await.unwrap().loss_pool, 400);
    }

    #[tokio::test]
    async fn test_lottery_multiplier_scales_prize_and_zeroes_pool() {
        let (engine, store) = setup(EconomyConfig::default(), &[]).await;
        let mut wallet = Wallet::new(now());
        wallet.balance = 1;
        wallet.upgrades.lottery_multiplier = 5;
        store.set_wallet(9, &wallet).await.unwrap();
        store.set_display_name(9, "winner").await;
        set_pools(&store, 0, 1_000).await;

        let winner = match engine.run_daily_lottery_epoch(now()).await.unwrap() {
            LotteryReport::Drawn(winner) => winner,
            other => panic!("expected a draw, got {other:?}"),
        };
        assert_eq!(winner.player_id, 9);
        assert_eq!(winner.payout, 1_500);
        assert_eq!(winner.display_name.as_deref(), Some("winner"));

        let pool = store.get_pool().await.unwrap();
        assert_eq!(pool.loss_pool, 0);
        assert_eq!(pool.last_daily_spin, Some(now()));

        let wallet = store.get_wallet(9).await.unwrap().unwrap();
        assert_eq!(wallet.balance, 1_501);
        assert_eq!(wallet.stats.lottery_wins, 1);
    }

    #[tokio::test]
    async fn test_lottery_picks_only_funded_player() {
        let (engine, store) = setup(EconomyConfig::default(), &[(1, 0), (2, 50), (3, 0)]).await;
        set_pools(&store, 0, 10).await;

        let report = engine.run_daily_lottery_epoch(now()).await.unwrap();
        assert!(matches!(report, LotteryReport::Drawn(ref w) if w.player_id == 2 && w.payout == 10));
        assert_eq!(report.payout(), 10);
    }
}
