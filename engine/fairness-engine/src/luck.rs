//! Luck assessment over a player's win/loss record
//!
//! Read-only diagnostics: nothing here gates gameplay.

use crate::probability::{lower_tail, upper_tail};
use serde::{Deserialize, Serialize};

/// Observed wins within this distance of the expectation count as neutral
const NEUTRAL_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LuckDirection {
    Lucky,
    Unlucky,
    Neutral,
}

/// How extreme a record is relative to the baseline win probability
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LuckAssessment {
    pub direction: LuckDirection,
    /// `(1 - tail) * 100`, 0 when neutral
    pub confidence_percent: f64,
    pub z_score: f64,
    pub win_rate: f64,
    pub expected_rate: f64,
}

/// Assess `wins` out of `total_games` against `baseline`; `None` with no games
pub fn assess_luck(wins: u64, total_games: u64, baseline: f64) -> Option<LuckAssessment> {
    if total_games == 0 {
        return None;
    }

    let p = if baseline.is_nan() { 0.0 } else { baseline.clamp(0.0, 1.0) };
    let wins = wins.min(total_games);
    let n = total_games as f64;
    let observed = wins as f64;
    let expected = n * p;

    let direction = if (observed - expected).abs() <= NEUTRAL_TOLERANCE {
        LuckDirection::Neutral
    } else if observed > expected {
        LuckDirection::Lucky
    } else {
        LuckDirection::Unlucky
    };

    let tail = match direction {
        LuckDirection::Lucky => upper_tail(wins as i64, total_games, p),
        LuckDirection::Unlucky => lower_tail(wins as i64, total_games, p),
        LuckDirection::Neutral => 1.0,
    };

    let variance = n * p * (1.0 - p);
    let z_score = if variance > 0.0 { (observed - expected) / variance.sqrt() } else { 0.0 };

    Some(LuckAssessment {
        direction,
        confidence_percent: ((1.0 - tail) * 100.0).clamp(0.0, 100.0),
        z_score,
        win_rate: observed / n,
        expected_rate: p,
    })
}
