//! Opportunity scorer.
//!
//! Turns a raw market listing into a ranked shortlist:
//! 1. Liquidity floor, raised when recent advice has performed poorly
//! 2. Log-scale volume normalisation across the surviving candidates
//! 3. Linear composite of 7d momentum, 24h momentum and normalised volume
//! 4. Stable descending sort, truncated to the shortlist size

use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use tracing::{debug, info};

use crate::config::ScoringConfig;
use crate::types::{CoinSnapshot, ScoredCoin};

// ---------------------------------------------------------------------------
// Coefficients
// ---------------------------------------------------------------------------

const WEIGHT_7D: f64 = 0.6;
const WEIGHT_24H: f64 = 0.3;
const WEIGHT_VOLUME: f64 = 5.0;

/// Normalised volume when every candidate has the same log-volume.
const DEGENERATE_NORM_VOL: f64 = 0.5;

/// Below this success rate the floor is raised by `MEDIOCRE_MULTIPLIER`.
const MEDIOCRE_RATE: f64 = 0.5;
/// Below this success rate the floor is raised again by `POOR_MULTIPLIER`.
const POOR_RATE: f64 = 0.35;

const MEDIOCRE_MULTIPLIER: Decimal = dec!(1.5);
const POOR_MULTIPLIER: Decimal = dec!(2.0);

// ---------------------------------------------------------------------------
// Liquidity floor
// ---------------------------------------------------------------------------

/// Minimum volume a coin needs to be ranked at the given success rate.
///
/// Both adjustments stack: a rate below 0.35 is also below 0.5, so the
/// floor ends up at 3x the base.
pub fn liquidity_floor(base_min_volume: Decimal, success_rate: f64) -> Decimal {
    let mut floor = base_min_volume;
    if success_rate < MEDIOCRE_RATE {
        floor *= MEDIOCRE_MULTIPLIER;
    }
    if success_rate < POOR_RATE {
        floor *= POOR_MULTIPLIER;
    }
    floor
}

fn log_volume(volume: Decimal) -> f64 {
    volume.to_f64().unwrap_or(0.0).max(1.0).log10()
}

// ---------------------------------------------------------------------------
// Scorer
// ---------------------------------------------------------------------------

/// Result of a scoring pass.
#[derive(Debug, Clone)]
pub struct Ranking {
    /// Effective liquidity floor used for this pass.
    pub min_volume: Decimal,
    /// Number of coins that cleared the floor.
    pub candidates: usize,
    /// Top coins, best first.
    pub shortlist: Vec<ScoredCoin>,
}

pub struct Scorer {
    config: ScoringConfig,
}

impl Scorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    /// Floor for the given success rate, `None` meaning "nothing checked yet".
    pub fn floor_for(&self, success_rate: Option<f64>) -> Decimal {
        let rate = success_rate.unwrap_or(self.config.default_success_rate);
        liquidity_floor(self.config.base_min_volume, rate)
    }

    /// Filter, score and rank `snapshots`.
    pub fn rank(&self, snapshots: &[CoinSnapshot], success_rate: Option<f64>) -> Ranking {
        let min_volume = self.floor_for(success_rate);

        let liquid: Vec<&CoinSnapshot> = snapshots
            .iter()
            .filter(|c| c.total_volume >= min_volume)
            .collect();

        debug!(
            input = snapshots.len(),
            liquid = liquid.len(),
            min_volume = %min_volume,
            "Liquidity filter applied"
        );

        let mut scored = score_candidates(&liquid);
        // sort_by is stable, so equal scores keep input order
        scored.sort_by(|a, b| {
            b.opportunity_score
                .partial_cmp(&a.opportunity_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(self.config.shortlist_size);

        info!(
            candidates = liquid.len(),
            shortlisted = scored.len(),
            min_volume = %min_volume,
            top = scored.first().map(|c| c.coin.id.as_str()).unwrap_or("-"),
            "Ranking complete"
        );

        Ranking {
            min_volume,
            candidates: liquid.len(),
            shortlist: scored,
        }
    }
}

/// Score already-filtered candidates, keeping input order.
fn score_candidates(candidates: &[&CoinSnapshot]) -> Vec<ScoredCoin> {
    if candidates.is_empty() {
        return Vec::new();
    }

    let logs: Vec<f64> = candidates.iter().map(|c| log_volume(c.total_volume)).collect();
    let min_v = logs.iter().copied().fold(f64::INFINITY, f64::min);
    let max_v = logs.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    candidates
        .iter()
        .zip(logs)
        .map(|(coin, lv)| {
            let norm_vol = if max_v == min_v {
                DEGENERATE_NORM_VOL
            } else {
                (lv - min_v) / (max_v - min_v)
            };
            ScoredCoin {
                coin: (*coin).clone(),
                opportunity_score: composite_score(coin.change_7d, coin.change_24h, norm_vol),
            }
        })
        .collect()
}

/// `0.6 * change_7d + 0.3 * change_24h + 5 * norm_vol`.
pub fn composite_score(change_7d: f64, change_24h: f64, norm_vol: f64) -> f64 {
    WEIGHT_7D * change_7d + WEIGHT_24H * change_24h + WEIGHT_VOLUME * norm_vol
}

/// Convenience wrapper with the default configuration.
pub fn score(snapshots: &[CoinSnapshot], success_rate: f64) -> Vec<ScoredCoin> {
    Scorer::new(ScoringConfig::default())
        .rank(snapshots, Some(success_rate))
        .shortlist
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
