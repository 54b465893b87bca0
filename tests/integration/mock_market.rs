//! Mock market for integration testing.
//!
//! One in-memory exchange implementing both the market listing and the
//! single-coin price lookup. Prices can be moved from test code between
//! passes, and a forced error simulates an API outage.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use coinpulse::market::{MarketDataSource, PriceSource};
use coinpulse::types::CoinSnapshot;

#[derive(Clone, Default)]
pub struct MockMarket {
    coins: Arc<Mutex<Vec<CoinSnapshot>>>,
    /// If set, every request fails with this message.
    force_error: Arc<Mutex<Option<String>>>,
    market_calls: Arc<Mutex<usize>>,
    price_calls: Arc<Mutex<HashMap<String, usize>>>,
}

impl MockMarket {
    pub fn with_coins(coins: Vec<CoinSnapshot>) -> Self {
        let market = Self::default();
        *market.coins.lock().unwrap() = coins;
        market
    }

    pub fn set_price(&self, coin_id: &str, price: Decimal) {
        let mut coins = self.coins.lock().unwrap();
        if let Some(c) = coins.iter_mut().find(|c| c.id == coin_id) {
            c.current_price = price;
        }
    }

    pub fn set_momentum(&self, coin_id: &str, change_24h: f64, change_7d: f64) {
        let mut coins = self.coins.lock().unwrap();
        if let Some(c) = coins.iter_mut().find(|c| c.id == coin_id) {
            c.change_24h = change_24h;
            c.change_7d = change_7d;
        }
    }

    pub fn delist(&self, coin_id: &str) {
        self.coins.lock().unwrap().retain(|c| c.id != coin_id);
    }

    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }

    pub fn clear_error(&self) {
        *self.force_error.lock().unwrap() = None;
    }

    pub fn market_calls(&self) -> usize {
        *self.market_calls.lock().unwrap()
    }

    pub fn price_calls(&self, coin_id: &str) -> usize {
        self.price_calls.lock().unwrap().get(coin_id).copied().unwrap_or(0)
    }

    fn check_error(&self) -> Result<()> {
        match self.force_error.lock().unwrap().as_ref() {
            Some(msg) => Err(anyhow!("{msg}")),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl MarketDataSource for MockMarket {
    async fn fetch_markets(&self, _vs_currency: &str, page_size: u32) -> Result<Vec<CoinSnapshot>> {
        *self.market_calls.lock().unwrap() += 1;
        self.check_error()?;
        let coins = self.coins.lock().unwrap();
        Ok(coins.iter().take(page_size as usize).cloned().collect())
    }
}

#[async_trait]
impl PriceSource for MockMarket {
    async fn fetch_price(&self, coin_id: &str, _vs_currency: &str) -> Result<Option<Decimal>> {
        *self
            .price_calls
            .lock()
            .unwrap()
            .entry(coin_id.to_string())
            .or_default() += 1;
        self.check_error()?;
        let coins = self.coins.lock().unwrap();
        Ok(coins.iter().find(|c| c.id == coin_id).map(|c| c.current_price))
    }
}

/// A liquid coin with the given momentum.
pub fn coin(id: &str, price: Decimal, volume: Decimal, change_24h: f64, change_7d: f64) -> CoinSnapshot {
    CoinSnapshot {
        id: id.to_string(),
        name: id.to_string(),
        symbol_upper: id.to_uppercase(),
        current_price: price,
        total_volume: volume,
        change_24h,
        change_7d,
    }
}
