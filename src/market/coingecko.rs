//! CoinGecko public API integration.
//!
//! Used both for the bulk market listing (ranking input) and for
//! single-coin price lookups (advice reconciliation, holdings).
//!
//! API docs: https://docs.coingecko.com/reference/introduction
//! Base URL: https://api.coingecko.com/api/v3
//! Rate limit: ~30 requests/minute on the public tier.
//! Auth: Not required; an optional demo key is sent as `x-cg-demo-api-key`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, info};

use super::{MarketDataSource, PriceSource};
use crate::types::CoinSnapshot;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

pub const DEFAULT_BASE_URL: &str = "https://api.coingecko.com/api/v3";

const API_KEY_HEADER: &str = "x-cg-demo-api-key";

// ---------------------------------------------------------------------------
// API response types (CoinGecko JSON → Rust)
// ---------------------------------------------------------------------------

/// One entry of `/coins/markets`. Every numeric field may be `null` for
/// thinly traded or freshly listed coins.
#[derive(Debug, Deserialize)]
struct GeckoMarket {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    symbol: String,
    #[serde(default)]
    current_price: Option<Decimal>,
    #[serde(default)]
    total_volume: Option<Decimal>,
    #[serde(default)]
    price_change_percentage_24h_in_currency: Option<f64>,
    #[serde(default)]
    price_change_percentage_7d_in_currency: Option<f64>,
}

impl GeckoMarket {
    /// Validate and default the record once, at the boundary.
    ///
    /// Records without a positive price are dropped; a missing volume or
    /// percentage change becomes zero.
    fn into_snapshot(self) -> Option<CoinSnapshot> {
        let price = self.current_price.filter(|p| *p > Decimal::ZERO)?;
        if self.id.is_empty() {
            return None;
        }
        let name = if self.name.is_empty() {
            self.id.clone()
        } else {
            self.name
        };
        Some(CoinSnapshot {
            id: self.id,
            name,
            symbol_upper: self.symbol.to_uppercase(),
            current_price: price,
            total_volume: self
                .total_volume
                .filter(|v| *v >= Decimal::ZERO)
                .unwrap_or(Decimal::ZERO),
            change_24h: finite_or_zero(self.price_change_percentage_24h_in_currency),
            change_7d: finite_or_zero(self.price_change_percentage_7d_in_currency),
        })
    }
}

fn finite_or_zero(value: Option<f64>) -> f64 {
    value.filter(|v| v.is_finite()).unwrap_or(0.0)
}

/// `/simple/price` response: `{ "<coin id>": { "<vs currency>": price } }`.
type SimplePriceResponse = HashMap<String, HashMap<String, Option<Decimal>>>;

/// Parse a `/coins/markets` body into validated snapshots.
fn parse_markets(body: &str) -> Result<Vec<CoinSnapshot>> {
    let raw: Vec<GeckoMarket> =
        serde_json::from_str(body).context("Failed to parse CoinGecko markets response")?;
    let total = raw.len();
    let snapshots: Vec<CoinSnapshot> = raw.into_iter().filter_map(GeckoMarket::into_snapshot).collect();
    if snapshots.len() < total {
        debug!(
            dropped = total - snapshots.len(),
            kept = snapshots.len(),
            "Dropped market records without a usable price"
        );
    }
    Ok(snapshots)
}

/// Parse a `/simple/price` body and pick out one quote.
fn parse_simple_price(body: &str, coin_id: &str, vs_currency: &str) -> Result<Option<Decimal>> {
    let raw: SimplePriceResponse =
        serde_json::from_str(body).context("Failed to parse CoinGecko simple/price response")?;
    Ok(raw
        .get(coin_id)
        .and_then(|quotes| quotes.get(vs_currency))
        .copied()
        .flatten()
        .filter(|p| *p > Decimal::ZERO))
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// CoinGecko client implementing both market and price sources.
pub struct CoinGeckoClient {
    http: Client,
    base_url: String,
    api_key: Option<SecretString>,
}

impl CoinGeckoClient {
    /// Create a new client.
    ///
    /// `api_key` is optional; the public endpoints work without one.
    pub fn new(base_url: Option<String>, api_key: Option<String>, timeout_secs: u64) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .user_agent("COINPULSE/0.1.0 (crypto-opportunity-monitor)")
            .build()
            .context("Failed to build HTTP client for CoinGecko")?;

        Ok(Self {
            http,
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key: api_key.map(SecretString::new),
        })
    }

    fn markets_url(&self, vs_currency: &str, page_size: u32) -> String {
        format!(
            "{}/coins/markets?vs_currency={}&order=market_cap_desc&per_page={}&page=1&sparkline=false&price_change_percentage=24h,7d",
            self.base_url,
            urlencoding::encode(vs_currency),
            page_size,
        )
    }

    fn simple_price_url(&self, coin_id: &str, vs_currency: &str) -> String {
        format!(
            "{}/simple/price?ids={}&vs_currencies={}",
            self.base_url,
            urlencoding::encode(coin_id),
            urlencoding::encode(vs_currency),
        )
    }

    /// GET `url` and return the body, failing on non-success statuses.
    async fn get_text(&self, url: &str) -> Result<String> {
        debug!(url = %url, "Fetching CoinGecko");

        let mut req = self.http.get(url);
        if let Some(key) = &self.api_key {
            req = req.header(API_KEY_HEADER, key.expose_secret());
        }

        let resp = req.send().await.context("CoinGecko API request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("CoinGecko API error {status}: {body}");
        }

        resp.text().await.context("Failed to read CoinGecko response body")
    }
}

#[async_trait]
impl MarketDataSource for CoinGeckoClient {
    async fn fetch_markets(&self, vs_currency: &str, page_size: u32) -> Result<Vec<CoinSnapshot>> {
        let body = self.get_text(&self.markets_url(vs_currency, page_size)).await?;
        let snapshots = parse_markets(&body)?;
        info!(
            count = snapshots.len(),
            vs_currency,
            "CoinGecko markets fetched"
        );
        Ok(snapshots)
    }
}

#[async_trait]
impl PriceSource for CoinGeckoClient {
    async fn fetch_price(&self, coin_id: &str, vs_currency: &str) -> Result<Option<Decimal>> {
        let body = self
            .get_text(&self.simple_price_url(coin_id, vs_currency))
            .await?;
        parse_simple_price(&body, coin_id, vs_currency)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const MARKETS_BODY: &str = r#"[
        {
            "id": "bitcoin",
            "symbol": "btc",
            "name": "Bitcoin",
            "current_price": 61234.5,
            "total_volume": 28123456789,
            "price_change_percentage_24h_in_currency": 1.25,
            "price_change_percentage_7d_in_currency": -3.5,
            "market_cap": 1200000000000
        },
        {
            "id": "fresh-coin",
            "symbol": "new",
            "name": "Fresh Coin",
            "current_price": 0.0042,
            "total_volume": null,
            "price_change_percentage_24h_in_currency": null
        },
        {
            "id": "delisted",
            "symbol": "dead",
            "name": "Delisted",
            "current_price": null,
            "total_volume": 100
        }
    ]"#;

    #[test]
    fn test_parse_markets_validates_at_boundary() {
        let snapshots = parse_markets(MARKETS_BODY).unwrap();
        assert_eq!(snapshots.len(), 2, "record without a price is dropped");

        let btc = &snapshots[0];
        assert_eq!(btc.id, "bitcoin");
        assert_eq!(btc.symbol_upper, "BTC");
        assert_eq!(btc.current_price, dec!(61234.5));
        assert_eq!(btc.total_volume, dec!(28123456789));
        assert_eq!(btc.change_24h, 1.25);
        assert_eq!(btc.change_7d, -3.5);

        let fresh = &snapshots[1];
        assert_eq!(fresh.total_volume, Decimal::ZERO);
        assert_eq!(fresh.change_24h, 0.0);
        assert_eq!(fresh.change_7d, 0.0);
    }

    #[test]
    fn test_parse_markets_malformed() {
        assert!(parse_markets("{\"error\":\"rate limited\"}").is_err());
        assert!(parse_markets("not json").is_err());
    }

    #[test]
    fn test_parse_simple_price() {
        let body = r#"{"bitcoin":{"eur":56789.12},"ghost":{"eur":null}}"#;
        assert_eq!(
            parse_simple_price(body, "bitcoin", "eur").unwrap(),
            Some(dec!(56789.12))
        );
        assert_eq!(parse_simple_price(body, "bitcoin", "usd").unwrap(), None);
        assert_eq!(parse_simple_price(body, "ethereum", "eur").unwrap(), None);
        assert_eq!(parse_simple_price(body, "ghost", "eur").unwrap(), None);
        assert_eq!(parse_simple_price("{}", "bitcoin", "eur").unwrap(), None);
    }

    #[test]
    fn test_urls() {
        let client = CoinGeckoClient::new(Some("http://localhost:9000/api/".into()), None, 5).unwrap();
        assert_eq!(
            client.simple_price_url("usd-coin", "eur"),
            "http://localhost:9000/api/simple/price?ids=usd-coin&vs_currencies=eur"
        );
        let markets = client.markets_url("eur", 200);
        assert!(markets.starts_with("http://localhost:9000/api/coins/markets?vs_currency=eur"));
        assert!(markets.contains("per_page=200"));
        assert!(markets.contains("price_change_percentage=24h,7d"));
    }

    #[test]
    fn test_client_default_base_url() {
        let client = CoinGeckoClient::new(None, Some("demo-key".into()), 30).unwrap();
        assert_eq!(client.base_url, DEFAULT_BASE_URL);
        assert!(client.api_key.is_some());
    }
}
