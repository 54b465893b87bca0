//! Shared types for the COINPULSE service.
//!
//! These types form the data model used across all modules. Market
//! snapshots and scored coins are transient; advice records, success
//! statistics and holdings are persisted through the storage layer.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Market snapshots
// ---------------------------------------------------------------------------

/// One market data record for a coin at a point in time.
///
/// Built once per fetch at the source boundary, where missing percentage
/// changes and volumes have already been defaulted to zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinSnapshot {
    pub id: String,
    pub name: String,
    pub symbol_upper: String,
    /// Price in the quote currency (always > 0).
    pub current_price: Decimal,
    /// Trading volume in the quote currency.
    pub total_volume: Decimal,
    /// 24h change in percent.
    pub change_24h: f64,
    /// 7d change in percent.
    pub change_7d: f64,
}

impl CoinSnapshot {
    /// Helper to build a test snapshot with flat momentum and ample volume.
    #[cfg(test)]
    pub fn sample(id: &str, price: Decimal) -> Self {
        CoinSnapshot {
            id: id.to_string(),
            name: id.to_string(),
            symbol_upper: id.to_uppercase(),
            current_price: price,
            total_volume: Decimal::from(10_000_000),
            change_24h: 0.0,
            change_7d: 0.0,
        }
    }
}

impl fmt::Display for CoinSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) price={} vol={} 24h={:+.2}% 7d={:+.2}%",
            self.name,
            self.symbol_upper,
            self.current_price,
            self.total_volume.round(),
            self.change_24h,
            self.change_7d,
        )
    }
}

/// A snapshot ranked by the scorer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCoin {
    #[serde(flatten)]
    pub coin: CoinSnapshot,
    pub opportunity_score: f64,
}

impl fmt::Display for ScoredCoin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} score={:.2}", self.coin, self.opportunity_score)
    }
}

// ---------------------------------------------------------------------------
// Advice
// ---------------------------------------------------------------------------

/// Direction of a recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdviceKind {
    Buy,
    Sell,
}

impl fmt::Display for AdviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdviceKind::Buy => write!(f, "BUY"),
            AdviceKind::Sell => write!(f, "SELL"),
        }
    }
}

/// Outcome of a recommendation. `Correct` and `Incorrect` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdviceResult {
    Pending,
    Correct,
    Incorrect,
}

impl AdviceResult {
    pub fn is_pending(&self) -> bool {
        *self == AdviceResult::Pending
    }
}

impl fmt::Display for AdviceResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdviceResult::Pending => write!(f, "?"),
            AdviceResult::Correct => write!(f, "CORRECT"),
            AdviceResult::Incorrect => write!(f, "INCORRECT"),
        }
    }
}

/// A persisted, timestamped recommendation tied to a coin and the price
/// at which it was issued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdviceRecord {
    /// Stable handle used by "unfollow". Older logs without one load with
    /// the nil id; the tracker assigns and persists a real one.
    #[serde(default)]
    pub id: Uuid,
    pub time: DateTime<Utc>,
    pub coin_id: String,
    pub advice_kind: AdviceKind,
    pub start_price: Decimal,
    pub result: AdviceResult,
}

impl AdviceRecord {
    /// A fresh pending Buy recommendation at the coin's current price.
    pub fn buy(coin: &CoinSnapshot, time: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            time,
            coin_id: coin.id.clone(),
            advice_kind: AdviceKind::Buy,
            start_price: coin.current_price,
            result: AdviceResult::Pending,
        }
    }
}

impl fmt::Display for AdviceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {} @ {} -> {}",
            self.time.format("%Y-%m-%d %H:%M"),
            self.advice_kind,
            self.coin_id,
            self.start_price,
            self.result,
        )
    }
}

/// Aggregate of reconciled recommendations. `correct <= checked` always.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessStats {
    pub checked: u64,
    pub correct: u64,
}

impl SuccessStats {
    /// `correct / checked`, or `None` before anything has been checked.
    pub fn success_rate(&self) -> Option<f64> {
        if self.checked == 0 {
            None
        } else {
            Some(self.correct as f64 / self.checked as f64)
        }
    }

    /// Success rate with an optimistic prior when nothing has been checked.
    pub fn rate_or(&self, prior: f64) -> f64 {
        self.success_rate().unwrap_or(prior)
    }

    pub fn record_correct(&mut self) {
        self.checked += 1;
        self.correct += 1;
    }

    pub fn record_incorrect(&mut self) {
        self.checked += 1;
    }
}

impl fmt::Display for SuccessStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.success_rate() {
            Some(rate) => write!(f, "{:.1}% ({}/{})", rate * 100.0, self.correct, self.checked),
            None => write!(f, "-"),
        }
    }
}

/// A single Pending -> Correct/Incorrect transition produced by reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdviceEvent {
    pub advice_id: Uuid,
    pub coin_id: String,
    pub kind: AdviceKind,
    pub from: AdviceResult,
    pub to: AdviceResult,
    pub start_price: Decimal,
    pub current_price: Decimal,
}

impl fmt::Display for AdviceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} -> {} ({} -> {})",
            self.kind, self.coin_id, self.from, self.to, self.start_price, self.current_price,
        )
    }
}

// ---------------------------------------------------------------------------
// Holdings
// ---------------------------------------------------------------------------

/// A user-entered position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub coin_id: String,
    pub quantity: Decimal,
    pub buy_price: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HoldingAction {
    Hold,
    Sell,
}

impl fmt::Display for HoldingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HoldingAction::Hold => write!(f, "HOLD"),
            HoldingAction::Sell => write!(f, "SELL"),
        }
    }
}

/// Hold/sell advice for one holding at a given price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldingAdvice {
    pub action: HoldingAction,
    /// Unrealised result after the transaction fee.
    pub net: Decimal,
    pub in_shortlist: bool,
    pub reason: String,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for COINPULSE.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Advice record not found: {0}")]
    AdviceNotFound(Uuid),

    #[error("Holding not found: {0}")]
    HoldingNotFound(String),

    #[error("Invalid holding: {0}")]
    InvalidHolding(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
