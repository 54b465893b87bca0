//! Advice tracker — issues recommendations and grades them later.
//!
//! The two core steps are pure functions over the advice log:
//! - `generate_advice` emits a Buy for every shortlisted coin scoring above
//!   the threshold, unless that coin already has a pending recommendation
//! - `reconcile` grades pending recommendations against current prices and
//!   updates the success statistics that feed back into the scorer
//!
//! `AdviceTracker` wraps them with persistence: every mutation is a
//! read-modify-write of the full log and stats inside one critical section.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::AdviceConfig;
use crate::market::PriceSource;
use crate::storage::{self, KeyValueStore, ADVICE_LOG_KEY, SUCCESS_STATS_KEY};
use crate::types::{
    AdviceEvent, AdviceKind, AdviceRecord, AdviceResult, MonitorError, ScoredCoin, SuccessStats,
};

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

/// New Buy records for shortlisted coins scoring strictly above `threshold`.
///
/// Never produces a second pending record for a coin, whether the existing
/// one is in `existing` or was created earlier in the same call.
pub fn generate_advice(
    shortlist: &[ScoredCoin],
    existing: &[AdviceRecord],
    threshold: f64,
    now: DateTime<Utc>,
) -> Vec<AdviceRecord> {
    let mut pending: HashSet<&str> = existing
        .iter()
        .filter(|r| r.result.is_pending())
        .map(|r| r.coin_id.as_str())
        .collect();

    let mut created = Vec::new();
    for scored in shortlist {
        if scored.opportunity_score <= threshold {
            continue;
        }
        if !pending.insert(scored.coin.id.as_str()) {
            debug!(coin = %scored.coin.id, "Pending advice already exists, skipping");
            continue;
        }
        created.push(AdviceRecord::buy(&scored.coin, now));
    }
    created
}

// ---------------------------------------------------------------------------
// Reconciliation
// ---------------------------------------------------------------------------

/// Output of one reconciliation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub logs: Vec<AdviceRecord>,
    pub stats: SuccessStats,
    pub events: Vec<AdviceEvent>,
}

/// Grade a single pending record. `None` means it stays pending.
fn grade(record: &AdviceRecord, current: Decimal, dead_band: Decimal) -> Option<AdviceResult> {
    let correct = match record.advice_kind {
        AdviceKind::Buy => current > record.start_price,
        AdviceKind::Sell => current < record.start_price,
    };
    if correct {
        return Some(AdviceResult::Correct);
    }

    let deviation = (current - record.start_price).abs() / record.start_price;
    if deviation > dead_band {
        Some(AdviceResult::Incorrect)
    } else {
        None
    }
}

/// Grade every pending record that has a price available.
///
/// Records whose price lookup returns `None` are left untouched for the
/// next pass. `stats.checked` only ever grows and `stats.correct` never
/// overtakes it.
pub fn reconcile<F>(
    mut logs: Vec<AdviceRecord>,
    mut stats: SuccessStats,
    dead_band: Decimal,
    price_lookup: F,
) -> Reconciliation
where
    F: Fn(&str) -> Option<Decimal>,
{
    let mut events = Vec::new();

    for record in logs.iter_mut().filter(|r| r.result.is_pending()) {
        let Some(current) = price_lookup(&record.coin_id) else {
            debug!(coin = %record.coin_id, "No price available, retrying next pass");
            continue;
        };
        if record.start_price <= Decimal::ZERO {
            warn!(
                coin = %record.coin_id,
                start_price = %record.start_price,
                "Advice has a non-positive start price, cannot grade"
            );
            continue;
        }

        let Some(outcome) = grade(record, current, dead_band) else {
            debug!(
                coin = %record.coin_id,
                start = %record.start_price,
                current = %current,
                "Within dead-band, still pending"
            );
            continue;
        };

        match outcome {
            AdviceResult::Correct => stats.record_correct(),
            _ => stats.record_incorrect(),
        }
        let event = AdviceEvent {
            advice_id: record.id,
            coin_id: record.coin_id.clone(),
            kind: record.advice_kind,
            from: record.result,
            to: outcome,
            start_price: record.start_price,
            current_price: current,
        };
        record.result = outcome;
        info!(
            coin = %event.coin_id,
            kind = %event.kind,
            result = %event.to,
            start = %event.start_price,
            current = %event.current_price,
            "Advice graded"
        );
        events.push(event);
    }

    Reconciliation { logs, stats, events }
}

// ---------------------------------------------------------------------------
// Persisted tracker
// ---------------------------------------------------------------------------

/// Summary of a persisted reconciliation pass.
#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    /// Distinct coins with pending advice at the start of the pass.
    pub coins_checked: usize,
    /// Coins whose price could not be fetched.
    pub prices_missing: usize,
    pub events: Vec<AdviceEvent>,
    pub stats: SuccessStats,
}

/// Owns the advice log and success statistics in a key-value store.
pub struct AdviceTracker {
    store: Arc<dyn KeyValueStore>,
    config: AdviceConfig,
    /// Serialises read-modify-write cycles on the log and stats.
    ledger: Mutex<()>,
}

impl AdviceTracker {
    pub fn new(store: Arc<dyn KeyValueStore>, config: AdviceConfig) -> Self {
        Self {
            store,
            config,
            ledger: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &AdviceConfig {
        &self.config
    }

    pub fn logs(&self) -> Vec<AdviceRecord> {
        let _guard = self.lock_ledger();
        self.load_logs()
    }

    /// Load the log, giving records stored without an id a permanent one.
    /// Callers must hold the ledger lock.
    fn load_logs(&self) -> Vec<AdviceRecord> {
        let mut logs: Vec<AdviceRecord> = storage::load_or_default(self.store.as_ref(), ADVICE_LOG_KEY);
        let mut assigned = 0;
        for rec in logs.iter_mut().filter(|r| r.id.is_nil()) {
            rec.id = Uuid::new_v4();
            assigned += 1;
        }
        if assigned > 0 {
            match storage::save(self.store.as_ref(), ADVICE_LOG_KEY, &logs) {
                Ok(()) => info!(count = assigned, "Assigned ids to advice records stored without one"),
                Err(e) => warn!(error = %e, "Failed to persist assigned advice ids"),
            }
        }
        logs
    }

    pub fn stats(&self) -> SuccessStats {
        storage::load_or_default(self.store.as_ref(), SUCCESS_STATS_KEY)
    }

    fn lock_ledger(&self) -> std::sync::MutexGuard<'_, ()> {
        // The guarded value is (), so a poisoned lock carries no bad state.
        self.ledger.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn persist_logs(&self, logs: &[AdviceRecord]) -> Result<(), MonitorError> {
        storage::save(self.store.as_ref(), ADVICE_LOG_KEY, logs)
            .map_err(|e| MonitorError::Storage(e.to_string()))
    }

    /// Write graded logs and the matching stats as one unit. If the stats
    /// write fails, `previous` is written back so the graded records stay
    /// pending and are counted on a later pass instead of never.
    fn persist_graded(
        &self,
        previous: &[AdviceRecord],
        logs: &[AdviceRecord],
        stats: &SuccessStats,
    ) -> Result<(), MonitorError> {
        self.persist_logs(logs)?;
        if let Err(e) = storage::save(self.store.as_ref(), SUCCESS_STATS_KEY, stats) {
            if let Err(rollback) = self.persist_logs(previous) {
                error!(error = %rollback, "Failed to restore advice log after stats write failure");
            }
            return Err(MonitorError::Storage(e.to_string()));
        }
        Ok(())
    }

    /// Append advice for qualifying shortlisted coins and return the new records.
    pub fn record_shortlist(
        &self,
        shortlist: &[ScoredCoin],
        now: DateTime<Utc>,
    ) -> Result<Vec<AdviceRecord>, MonitorError> {
        let _guard = self.lock_ledger();
        let mut logs = self.load_logs();
        let created = generate_advice(shortlist, &logs, self.config.auto_score_threshold, now);
        if created.is_empty() {
            return Ok(created);
        }

        for rec in &created {
            info!(
                coin = %rec.coin_id,
                price = %rec.start_price,
                "Automatic buy advice added"
            );
        }
        logs.extend(created.iter().cloned());
        self.persist_logs(&logs)?;
        Ok(created)
    }

    /// Look up prices for every coin with pending advice (sequentially, one
    /// lookup per coin), then grade and persist in one step.
    pub async fn reconcile_with(
        &self,
        prices: &dyn PriceSource,
        vs_currency: &str,
    ) -> Result<ReconcileReport, MonitorError> {
        let mut coins: Vec<String> = Vec::new();
        for rec in self.logs().into_iter().filter(|r| r.result.is_pending()) {
            if !coins.contains(&rec.coin_id) {
                coins.push(rec.coin_id);
            }
        }

        let mut quotes: HashMap<String, Decimal> = HashMap::new();
        for coin in &coins {
            match prices.fetch_price(coin, vs_currency).await {
                Ok(Some(price)) => {
                    quotes.insert(coin.clone(), price);
                }
                Ok(None) => debug!(coin = %coin, "No quote available"),
                Err(e) => debug!(coin = %coin, error = %e, "Price lookup failed"),
            }
        }

        // Reload after the awaits so advice added meanwhile is kept.
        let _guard = self.lock_ledger();
        let previous = self.load_logs();
        let outcome = reconcile(previous.clone(), self.stats(), self.config.dead_band, |id| {
            quotes.get(id).copied()
        });
        if !outcome.events.is_empty() {
            self.persist_graded(&previous, &outcome.logs, &outcome.stats)?;
        }

        Ok(ReconcileReport {
            coins_checked: coins.len(),
            prices_missing: coins.len() - quotes.len(),
            events: outcome.events,
            stats: outcome.stats,
        })
    }

    /// Stop following a recommendation. Statistics are left as they are.
    pub fn unfollow(&self, id: Uuid) -> Result<AdviceRecord, MonitorError> {
        let _guard = self.lock_ledger();
        let mut logs = self.load_logs();
        let pos = logs
            .iter()
            .position(|r| r.id == id)
            .ok_or(MonitorError::AdviceNotFound(id))?;
        let removed = logs.remove(pos);
        self.persist_logs(&logs)?;
        info!(coin = %removed.coin_id, id = %id, "Advice unfollowed");
        Ok(removed)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
