//! Holdings book — user-entered positions and hold/sell advice.
//!
//! A holding is kept while it shows a profit after the transaction fee,
//! or while its coin is still on the shortlist; otherwise the advice is
//! to sell.

use rust_decimal::Decimal;
use std::sync::{Arc, Mutex};
use tracing::info;

use crate::storage::{self, KeyValueStore, HOLDINGS_KEY};
use crate::types::{Holding, HoldingAction, HoldingAdvice, MonitorError};

/// Hold/sell advice for `holding` at `current_price`.
pub fn advice_for_holding(
    holding: &Holding,
    current_price: Decimal,
    in_shortlist: bool,
    transaction_fee: Decimal,
) -> HoldingAdvice {
    let gross = (current_price - holding.buy_price) * holding.quantity;
    let net = gross - transaction_fee;
    let suffix = if in_shortlist { " + in shortlist" } else { "" };

    if net > Decimal::ZERO {
        HoldingAdvice {
            action: HoldingAction::Hold,
            net,
            in_shortlist,
            reason: format!("Profit {:.2}{suffix}", net),
        }
    } else {
        HoldingAdvice {
            action: if in_shortlist {
                HoldingAction::Hold
            } else {
                HoldingAction::Sell
            },
            net,
            in_shortlist,
            reason: format!("Loss {:.2}{suffix}", net),
        }
    }
}

/// Persisted list of holdings, one per coin.
pub struct HoldingsBook {
    store: Arc<dyn KeyValueStore>,
    lock: Mutex<()>,
}

impl HoldingsBook {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            lock: Mutex::new(()),
        }
    }

    pub fn list(&self) -> Vec<Holding> {
        storage::load_or_default(self.store.as_ref(), HOLDINGS_KEY)
    }

    fn save(&self, holdings: &[Holding]) -> Result<(), MonitorError> {
        storage::save(self.store.as_ref(), HOLDINGS_KEY, holdings)
            .map_err(|e| MonitorError::Storage(e.to_string()))
    }

    /// Add a holding, replacing any existing entry for the same coin.
    pub fn add(&self, holding: Holding) -> Result<Holding, MonitorError> {
        let holding = Holding {
            coin_id: holding.coin_id.trim().to_lowercase(),
            ..holding
        };
        if holding.coin_id.is_empty() {
            return Err(MonitorError::InvalidHolding("coin id is empty".into()));
        }
        if holding.quantity <= Decimal::ZERO || holding.buy_price <= Decimal::ZERO {
            return Err(MonitorError::InvalidHolding(format!(
                "quantity and buy price must be positive for {}",
                holding.coin_id
            )));
        }

        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut holdings = self.list();
        holdings.retain(|h| h.coin_id != holding.coin_id);
        holdings.push(holding.clone());
        self.save(&holdings)?;
        info!(
            coin = %holding.coin_id,
            qty = %holding.quantity,
            buy_price = %holding.buy_price,
            "Holding added"
        );
        Ok(holding)
    }

    pub fn remove(&self, coin_id: &str) -> Result<Holding, MonitorError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut holdings = self.list();
        let pos = holdings
            .iter()
            .position(|h| h.coin_id == coin_id)
            .ok_or_else(|| MonitorError::HoldingNotFound(coin_id.to_string()))?;
        let removed = holdings.remove(pos);
        self.save(&holdings)?;
        info!(coin = %removed.coin_id, "Holding removed");
        Ok(removed)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
