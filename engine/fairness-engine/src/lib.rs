//! Fairness engine - win-chance modifiers, pity buffs and pool redistribution
//!
//! This crate decides a player's effective win probability, scores how
//! statistically extreme their record is, grants and decays loss-streak pity
//! buffs, applies progressive slab schedules to bank interest and pool tax,
//! and runs the hourly and daily redistribution epochs.
//!
//! All wallet and pool state lives behind a [`persistence::WalletStore`];
//! mutations go through [`FairnessEngine`].

pub mod config;
pub mod engine;
pub mod error;
pub mod luck;
pub mod modifiers;
pub mod pity;
pub mod probability;
pub mod rates;
pub mod redistribution;

pub use config::EconomyConfig;
pub use engine::{FairnessEngine, SettlementReceipt, WalletLocks};
pub use error::FairnessError;

// Re-export commonly used types
pub use luck::{assess_luck, LuckAssessment, LuckDirection};
pub use modifiers::{effective_chance, roll_outcome, EffectApplication, ModifierBreakdown};
pub use pity::{PityStatus, PityTriggerInfo};
pub use rates::{compute_slabbed_amount, InterestAccrual, Slab, SlabSchedule};
pub use redistribution::{HourlyPayoutReport, LotteryReport, LotteryWinner};

// Result type alias
pub type Result<T> = std::result::Result<T, FairnessError>;
