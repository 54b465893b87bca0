//! Monitor — the session object tying sources, scorer and tracker together.
//!
//! Owns the session state (current shortlist, last liquidity floor) and
//! the handles to the sources and storage. Each periodic pass goes through
//! a single-flight gate, so a timer that fires while the previous pass is
//! still awaiting the network is skipped rather than run twice.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{AdviceConfig, MonitorConfig, ScoringConfig};
use crate::engine::holdings::{advice_for_holding, HoldingsBook};
use crate::engine::scorer::Scorer;
use crate::engine::tracker::{AdviceTracker, ReconcileReport};
use crate::market::{MarketDataSource, PriceSource};
use crate::storage::KeyValueStore;
use crate::types::{
    AdviceRecord, Holding, HoldingAdvice, MonitorError, ScoredCoin, SuccessStats,
};

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Summary of one refresh pass.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshReport {
    pub timestamp: DateTime<Utc>,
    /// The market source returned no data; nothing else was touched.
    pub failed: bool,
    pub coins_fetched: usize,
    pub candidates: usize,
    pub min_volume: Decimal,
    pub shortlist: Vec<ScoredCoin>,
    pub new_advice: Vec<AdviceRecord>,
}

/// Result of trying to run a periodic pass.
#[derive(Debug, Clone)]
pub enum PassOutcome<T> {
    Completed(T),
    /// The previous pass of the same kind was still running.
    Skipped,
}

impl<T> PassOutcome<T> {
    pub fn completed(self) -> Option<T> {
        match self {
            PassOutcome::Completed(v) => Some(v),
            PassOutcome::Skipped => None,
        }
    }
}

/// A holding enriched with its live price and advice.
#[derive(Debug, Clone, Serialize)]
pub struct HoldingStatus {
    #[serde(flatten)]
    pub holding: Holding,
    pub current_price: Option<Decimal>,
    /// `None` when the price was unavailable.
    pub advice: Option<HoldingAdvice>,
}

/// An advice record with the coin's live price, for display.
#[derive(Debug, Clone, Serialize)]
pub struct AdviceStatus {
    #[serde(flatten)]
    pub record: AdviceRecord,
    /// `None` when the price was unavailable.
    pub current_price: Option<Decimal>,
}

/// Point-in-time view for display.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorStatus {
    pub vs_currency: String,
    pub success_rate: Option<f64>,
    pub stats: SuccessStats,
    pub min_volume: Decimal,
    pub shortlist_len: usize,
    pub pending_advice: usize,
    pub last_refresh: Option<DateTime<Utc>>,
    pub last_refresh_failed: bool,
    pub last_reconcile: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Session state
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct SessionState {
    shortlist: Vec<ScoredCoin>,
    min_volume: Option<Decimal>,
    last_refresh: Option<DateTime<Utc>>,
    last_refresh_failed: bool,
    last_reconcile: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Monitor
// ---------------------------------------------------------------------------

pub struct Monitor {
    market: Arc<dyn MarketDataSource>,
    prices: Arc<dyn PriceSource>,
    scorer: Scorer,
    tracker: AdviceTracker,
    holdings: HoldingsBook,
    settings: MonitorConfig,
    state: RwLock<SessionState>,
    refresh_gate: Mutex<()>,
    reconcile_gate: Mutex<()>,
}

impl Monitor {
    pub fn new(
        market: Arc<dyn MarketDataSource>,
        prices: Arc<dyn PriceSource>,
        store: Arc<dyn KeyValueStore>,
        settings: MonitorConfig,
        scoring: ScoringConfig,
        advice: AdviceConfig,
    ) -> Self {
        Self {
            market,
            prices,
            scorer: Scorer::new(scoring),
            tracker: AdviceTracker::new(store.clone(), advice),
            holdings: HoldingsBook::new(store),
            settings,
            state: RwLock::new(SessionState::default()),
            refresh_gate: Mutex::new(()),
            reconcile_gate: Mutex::new(()),
        }
    }

    pub fn tracker(&self) -> &AdviceTracker {
        &self.tracker
    }

    pub fn holdings(&self) -> &HoldingsBook {
        &self.holdings
    }

    // -- Refresh ---------------------------------------------------------

    /// Fetch the market, rank it with the current success rate as feedback,
    /// and record automatic advice for the new shortlist.
    pub async fn refresh(&self) -> Result<PassOutcome<RefreshReport>, MonitorError> {
        let Ok(_gate) = self.refresh_gate.try_lock() else {
            debug!("Refresh already in progress, skipping");
            return Ok(PassOutcome::Skipped);
        };

        info!(vs_currency = %self.settings.vs_currency, "Refreshing selection");
        let now = Utc::now();
        let stats = self.tracker.stats();
        let min_volume = self.scorer.floor_for(stats.success_rate());

        let snapshots = match self
            .market
            .fetch_markets(&self.settings.vs_currency, self.settings.page_size)
            .await
        {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "Market refresh failed, keeping previous shortlist");
                let mut state = self.state.write().await;
                state.last_refresh = Some(now);
                state.last_refresh_failed = true;
                return Ok(PassOutcome::Completed(RefreshReport {
                    timestamp: now,
                    failed: true,
                    coins_fetched: 0,
                    candidates: 0,
                    min_volume,
                    shortlist: state.shortlist.clone(),
                    new_advice: Vec::new(),
                }));
            }
        };

        let ranking = self.scorer.rank(&snapshots, stats.success_rate());
        let new_advice = self.tracker.record_shortlist(&ranking.shortlist, now)?;

        {
            let mut state = self.state.write().await;
            state.shortlist = ranking.shortlist.clone();
            state.min_volume = Some(ranking.min_volume);
            state.last_refresh = Some(now);
            state.last_refresh_failed = false;
        }

        info!(
            fetched = snapshots.len(),
            candidates = ranking.candidates,
            shortlisted = ranking.shortlist.len(),
            new_advice = new_advice.len(),
            min_volume = %ranking.min_volume,
            success = %stats,
            "Selection refreshed"
        );

        Ok(PassOutcome::Completed(RefreshReport {
            timestamp: now,
            failed: false,
            coins_fetched: snapshots.len(),
            candidates: ranking.candidates,
            min_volume: ranking.min_volume,
            shortlist: ranking.shortlist,
            new_advice,
        }))
    }

    // -- Reconcile -------------------------------------------------------

    /// Grade outstanding advice against current prices.
    pub async fn reconcile(&self) -> Result<PassOutcome<ReconcileReport>, MonitorError> {
        let Ok(_gate) = self.reconcile_gate.try_lock() else {
            debug!("Reconcile already in progress, skipping");
            return Ok(PassOutcome::Skipped);
        };

        let report = self
            .tracker
            .reconcile_with(self.prices.as_ref(), &self.settings.vs_currency)
            .await?;
        self.state.write().await.last_reconcile = Some(Utc::now());

        info!(
            coins = report.coins_checked,
            missing_prices = report.prices_missing,
            graded = report.events.len(),
            success = %report.stats,
            "Advice reconciled"
        );
        Ok(PassOutcome::Completed(report))
    }

    // -- Queries & user actions -----------------------------------------

    pub async fn shortlist(&self) -> Vec<ScoredCoin> {
        self.state.read().await.shortlist.clone()
    }

    pub fn advice_log(&self) -> Vec<AdviceRecord> {
        self.tracker.logs()
    }

    /// The advice log, newest first, with one price lookup per distinct coin.
    pub async fn advice_report(&self) -> Vec<AdviceStatus> {
        let mut logs = self.tracker.logs();
        logs.reverse();

        let mut quotes: HashMap<String, Option<Decimal>> = HashMap::new();
        let mut out = Vec::with_capacity(logs.len());
        for record in logs {
            let current_price = match quotes.get(&record.coin_id) {
                Some(price) => *price,
                None => {
                    let price = self.lookup_price(&record.coin_id).await;
                    quotes.insert(record.coin_id.clone(), price);
                    price
                }
            };
            out.push(AdviceStatus { record, current_price });
        }
        out
    }

    pub fn unfollow(&self, id: Uuid) -> Result<AdviceRecord, MonitorError> {
        self.tracker.unfollow(id)
    }

    pub async fn status(&self) -> MonitorStatus {
        let stats = self.tracker.stats();
        let pending = self
            .tracker
            .logs()
            .iter()
            .filter(|r| r.result.is_pending())
            .count();
        let state = self.state.read().await;
        MonitorStatus {
            vs_currency: self.settings.vs_currency.clone(),
            success_rate: stats.success_rate(),
            stats,
            min_volume: state
                .min_volume
                .unwrap_or_else(|| self.scorer.floor_for(stats.success_rate())),
            shortlist_len: state.shortlist.len(),
            pending_advice: pending,
            last_refresh: state.last_refresh,
            last_refresh_failed: state.last_refresh_failed,
            last_reconcile: state.last_reconcile,
        }
    }

    /// Every holding with its live price and hold/sell advice.
    pub async fn holdings_report(&self) -> Vec<HoldingStatus> {
        let shortlist = self.shortlist().await;
        let fee = self.tracker.config().transaction_fee;
        let mut out = Vec::new();

        for holding in self.holdings.list() {
            let price = self.lookup_price(&holding.coin_id).await;
            let in_shortlist = shortlist.iter().any(|c| c.coin.id == holding.coin_id);
            let advice = price.map(|p| advice_for_holding(&holding, p, in_shortlist, fee));
            out.push(HoldingStatus {
                holding,
                current_price: price,
                advice,
            });
        }
        out
    }

    /// Live price for display. Failures are logged and read as unavailable.
    async fn lookup_price(&self, coin_id: &str) -> Option<Decimal> {
        match self.prices.fetch_price(coin_id, &self.settings.vs_currency).await {
            Ok(price) => price,
            Err(e) => {
                debug!(coin = %coin_id, error = %e, "Price lookup failed");
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
