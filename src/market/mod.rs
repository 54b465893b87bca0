//! Market data sources.
//!
//! Defines the two read-only interfaces the engine consumes:
//! - `MarketDataSource` — a page of coin snapshots for a quote currency
//! - `PriceSource` — the current price of a single coin
//!
//! `coingecko` implements both against the public CoinGecko API.

pub mod coingecko;

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::types::CoinSnapshot;

/// Abstraction over a bulk market listing.
///
/// Errors cover transport failures, non-success statuses and malformed
/// payloads. The engine treats any error as "no data" for the current pass.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Fetch up to `page_size` coins priced in `vs_currency`.
    async fn fetch_markets(&self, vs_currency: &str, page_size: u32) -> Result<Vec<CoinSnapshot>>;
}

/// Abstraction over single-coin price lookups.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Current price of `coin_id` in `vs_currency`, `Ok(None)` when the
    /// source has no quote for it.
    async fn fetch_price(&self, coin_id: &str, vs_currency: &str) -> Result<Option<Decimal>>;
}
