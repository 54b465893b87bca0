//! COINPULSE — crypto opportunity monitor
//!
//! Entry point. Loads configuration, initialises structured logging,
//! opens the state directory, starts the refresh and reconcile loops
//! and the dashboard, then waits for Ctrl+C.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use coinpulse::config::AppConfig;
use coinpulse::dashboard;
use coinpulse::dashboard::routes::DashboardState;
use coinpulse::engine::monitor::Monitor;
use coinpulse::engine::scheduler::Scheduler;
use coinpulse::market::coingecko::CoinGeckoClient;
use coinpulse::storage::JsonFileStore;

const BANNER: &str = r#"
  ___ ___ ___ _  _ ___ _   _ _    ___ ___
 / __/ _ \_ _| \| | _ \ | | | |  / __| __|
| (_| (_) | || .` |  _/ |_| | |__\__ \ _|
 \___\___/___|_|\_|_|  \___/|____|___/___|

  Crypto opportunity scoring & self-grading advice
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = AppConfig::load_or_default("config.toml")?;

    init_logging();

    println!("{BANNER}");
    info!(
        vs_currency = %cfg.monitor.vs_currency,
        refresh_interval_secs = cfg.monitor.refresh_interval_secs,
        reconcile_interval_secs = cfg.monitor.reconcile_interval_secs,
        state_dir = %cfg.storage.dir,
        "COINPULSE starting up"
    );

    // -- Initialise components -------------------------------------------

    let api_key = match cfg.coingecko.api_key_env.as_deref() {
        Some(env) => match AppConfig::resolve_env(env) {
            Ok(key) => Some(key),
            Err(e) => {
                warn!(error = %e, "CoinGecko API key not available, using the public tier");
                None
            }
        },
        None => None,
    };
    let gecko = Arc::new(CoinGeckoClient::new(
        Some(cfg.coingecko.base_url.clone()),
        api_key,
        cfg.coingecko.timeout_secs,
    )?);

    let store = Arc::new(JsonFileStore::open(&cfg.storage.dir)?);

    let monitor = Arc::new(Monitor::new(
        gecko.clone(),
        gecko,
        store,
        cfg.monitor.clone(),
        cfg.scoring.clone(),
        cfg.advice.clone(),
    ));

    let restored = monitor.tracker().stats();
    info!(
        advice = monitor.advice_log().len(),
        success = %restored,
        holdings = monitor.holdings().list().len(),
        "State restored"
    );

    if cfg.dashboard.enabled {
        dashboard::spawn_dashboard(Arc::new(DashboardState::new(monitor.clone())), cfg.dashboard.port)
            .await?;
    }

    // -- Main loop -------------------------------------------------------

    let scheduler = Scheduler::new(monitor);
    scheduler.start(
        Duration::from_secs(cfg.monitor.refresh_interval_secs),
        Duration::from_secs(cfg.monitor.reconcile_interval_secs),
    );

    info!("Monitor running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received.");

    scheduler.stop();
    let stats = scheduler.monitor().tracker().stats();
    info!(success = %stats, "COINPULSE shut down cleanly.");

    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("coinpulse=info"));

    let json_logging = std::env::var("COINPULSE_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
