//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Every field carries a default so a partial file still yields a working
//! service. Secrets (the optional CoinGecko API key) are referenced by
//! env-var name in the config and resolved at runtime via `std::env::var`.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::info;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub monitor: MonitorConfig,
    pub scoring: ScoringConfig,
    pub advice: AdviceConfig,
    pub storage: StorageConfig,
    pub coingecko: CoinGeckoConfig,
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MonitorConfig {
    /// Quote currency for prices and volumes ("eur", "usd", ...).
    pub vs_currency: String,
    /// Number of coins requested per market fetch.
    pub page_size: u32,
    pub refresh_interval_secs: u64,
    pub reconcile_interval_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            vs_currency: "eur".to_string(),
            page_size: 200,
            refresh_interval_secs: 60,
            reconcile_interval_secs: 60 * 60,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ScoringConfig {
    /// Liquidity floor before success-rate adjustment.
    pub base_min_volume: Decimal,
    /// Success rate assumed before any advice has been checked.
    pub default_success_rate: f64,
    pub shortlist_size: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            base_min_volume: dec!(5000000),
            default_success_rate: 0.6,
            shortlist_size: 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AdviceConfig {
    /// Scores strictly above this trigger an automatic Buy advice.
    pub auto_score_threshold: f64,
    /// Relative move a losing advice needs before it counts as incorrect.
    pub dead_band: Decimal,
    /// Flat fee subtracted when evaluating holdings.
    pub transaction_fee: Decimal,
}

impl Default for AdviceConfig {
    fn default() -> Self {
        Self {
            auto_score_threshold: 10.0,
            dead_band: dec!(0.005),
            transaction_fee: dec!(5.0),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: "data".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CoinGeckoConfig {
    pub base_url: String,
    /// Name of the env var holding an optional demo API key.
    pub api_key_env: Option<String>,
    pub timeout_secs: u64,
}

impl Default for CoinGeckoConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.coingecko.com/api/v3".to_string(),
            api_key_env: None,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8080,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Load `path` if it exists, otherwise fall back to built-in defaults.
    pub fn load_or_default(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            Self::load(path)
        } else {
            info!(path, "No config file found, using defaults");
            Ok(Self::default())
        }
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.monitor.refresh_interval_secs == 0 || self.monitor.reconcile_interval_secs == 0 {
            anyhow::bail!("monitor intervals must be greater than zero");
        }
        if self.scoring.shortlist_size == 0 {
            anyhow::bail!("scoring.shortlist_size must be greater than zero");
        }
        if self.advice.dead_band < Decimal::ZERO {
            anyhow::bail!("advice.dead_band must not be negative");
        }
        Ok(())
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}
