//! End-to-end tests: refresh → advice → reconcile → feedback into the
//! liquidity floor, with state persisted to a real directory.

use rust_decimal_macros::dec;
use std::path::PathBuf;
use std::sync::Arc;

use coinpulse::config::{AdviceConfig, MonitorConfig, ScoringConfig};
use coinpulse::engine::monitor::{Monitor, PassOutcome};
use coinpulse::storage::{JsonFileStore, KeyValueStore, MemoryStore};
use coinpulse::types::{AdviceResult, SuccessStats};

use crate::mock_market::{coin, MockMarket};

fn temp_dir() -> PathBuf {
    std::env::temp_dir().join(format!("coinpulse_it_{}", uuid::Uuid::new_v4()))
}

fn build(market: &MockMarket, store: Arc<dyn KeyValueStore>) -> Monitor {
    Monitor::new(
        Arc::new(market.clone()),
        Arc::new(market.clone()),
        store,
        MonitorConfig::default(),
        ScoringConfig::default(),
        AdviceConfig::default(),
    )
}

fn three_coins() -> MockMarket {
    MockMarket::with_coins(vec![
        coin("alpha", dec!(100), dec!(50000000), 2.0, 30.0),
        coin("beta", dec!(10), dec!(20000000), 1.0, 25.0),
        coin("gamma", dec!(1), dec!(6000000), 0.0, 0.0),
    ])
}

#[tokio::test]
async fn test_poor_advice_raises_liquidity_floor() {
    let dir = temp_dir();
    let market = three_coins();
    let store: Arc<dyn KeyValueStore> = Arc::new(JsonFileStore::open(&dir).unwrap());
    let monitor = build(&market, store);

    // First pass: default rate, 5M floor, everyone qualifies
    let first = monitor.refresh().await.unwrap().completed().unwrap();
    assert_eq!(first.min_volume, dec!(5000000));
    assert_eq!(first.candidates, 3);
    let advised: Vec<&str> = first.new_advice.iter().map(|a| a.coin_id.as_str()).collect();
    assert_eq!(advised, vec!["alpha", "beta"]);

    // Both buys go wrong by 10%
    market.set_price("alpha", dec!(90));
    market.set_price("beta", dec!(9));
    let graded = monitor.reconcile().await.unwrap().completed().unwrap();
    assert_eq!(graded.events.len(), 2);
    assert_eq!(graded.stats, SuccessStats { checked: 2, correct: 0 });
    assert!(monitor
        .advice_log()
        .iter()
        .all(|r| r.result == AdviceResult::Incorrect));

    // 0% success: floor is 5M * 1.5 * 2, gamma drops out
    let second = monitor.refresh().await.unwrap().completed().unwrap();
    assert_eq!(second.min_volume, dec!(15000000));
    assert_eq!(second.candidates, 2);
    assert!(second.shortlist.iter().all(|c| c.coin.id != "gamma"));
    // Previous advice is resolved, so both get fresh recommendations
    assert_eq!(second.new_advice.len(), 2);
    assert_eq!(monitor.advice_log().len(), 4);

    // State survives a restart
    drop(monitor);
    let reopened: Arc<dyn KeyValueStore> = Arc::new(JsonFileStore::open(&dir).unwrap());
    let restarted = build(&market, reopened);
    assert_eq!(restarted.tracker().stats(), SuccessStats { checked: 2, correct: 0 });
    assert_eq!(restarted.advice_log().len(), 4);
    assert_eq!(restarted.status().await.min_volume, dec!(15000000));

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_good_advice_keeps_floor() {
    let market = three_coins();
    let monitor = build(&market, Arc::new(MemoryStore::new()));

    monitor.refresh().await.unwrap();
    market.set_price("alpha", dec!(110));
    market.set_price("beta", dec!(9));
    monitor.reconcile().await.unwrap();

    let status = monitor.status().await;
    assert_eq!(status.stats, SuccessStats { checked: 2, correct: 1 });
    assert_eq!(status.success_rate, Some(0.5));

    // Exactly 0.5 is not "below 0.5"
    let report = monitor.refresh().await.unwrap().completed().unwrap();
    assert_eq!(report.min_volume, dec!(5000000));
    assert_eq!(report.candidates, 3);
}

#[tokio::test]
async fn test_repeated_refreshes_do_not_duplicate_advice() {
    let market = three_coins();
    let monitor = build(&market, Arc::new(MemoryStore::new()));

    for _ in 0..4 {
        monitor.refresh().await.unwrap();
    }
    assert_eq!(market.market_calls(), 4);

    let logs = monitor.advice_log();
    assert_eq!(logs.len(), 2);
    assert!(logs.iter().all(|r| r.result.is_pending()));

    // Small moves stay inside the dead-band; one price lookup per coin per pass
    market.set_price("alpha", dec!(99.8));
    market.set_price("beta", dec!(9.98));
    let report = monitor.reconcile().await.unwrap().completed().unwrap();
    assert!(report.events.is_empty());
    assert_eq!(report.coins_checked, 2);
    assert_eq!(market.price_calls("alpha"), 1);
    assert_eq!(market.price_calls("gamma"), 0);
}

#[tokio::test]
async fn test_market_outage_is_tolerated() {
    let market = three_coins();
    let monitor = build(&market, Arc::new(MemoryStore::new()));
    monitor.refresh().await.unwrap();
    let before = monitor.shortlist().await;

    market.set_error("HTTP 503 Service Unavailable");
    let failed = monitor.refresh().await.unwrap().completed().unwrap();
    assert!(failed.failed);
    assert!(failed.new_advice.is_empty());
    assert_eq!(monitor.shortlist().await, before);
    assert!(monitor.status().await.last_refresh_failed);

    // Price lookups fail too: nothing is graded, nothing is lost
    let report = monitor.reconcile().await.unwrap().completed().unwrap();
    assert_eq!(report.prices_missing, 2);
    assert!(report.events.is_empty());
    assert_eq!(report.stats, SuccessStats::default());

    market.clear_error();
    market.set_price("alpha", dec!(120));
    let report = monitor.reconcile().await.unwrap().completed().unwrap();
    assert_eq!(report.prices_missing, 0);
    assert_eq!(report.events.len(), 1);
    assert!(!monitor.refresh().await.unwrap().completed().unwrap().failed);
}

#[tokio::test]
async fn test_delisted_coin_stays_pending() {
    let market = three_coins();
    let monitor = build(&market, Arc::new(MemoryStore::new()));
    monitor.refresh().await.unwrap();

    market.delist("beta");
    market.set_price("alpha", dec!(50));
    let report = monitor.reconcile().await.unwrap().completed().unwrap();
    assert_eq!(report.prices_missing, 1);

    let logs = monitor.advice_log();
    let beta = logs.iter().find(|r| r.coin_id == "beta").unwrap();
    assert_eq!(beta.result, AdviceResult::Pending);
    let alpha = logs.iter().find(|r| r.coin_id == "alpha").unwrap();
    assert_eq!(alpha.result, AdviceResult::Incorrect);
}

#[tokio::test]
async fn test_momentum_shift_reorders_shortlist() {
    let market = three_coins();
    let monitor = build(&market, Arc::new(MemoryStore::new()));
    monitor.refresh().await.unwrap();
    assert_eq!(monitor.shortlist().await[0].coin.id, "alpha");

    market.set_momentum("gamma", 10.0, 60.0);
    market.set_momentum("alpha", -5.0, -10.0);
    let report = monitor.refresh().await.unwrap().completed().unwrap();
    assert_eq!(report.shortlist[0].coin.id, "gamma");
    // alpha still has pending advice, gamma is new
    let advised: Vec<&str> = report.new_advice.iter().map(|a| a.coin_id.as_str()).collect();
    assert_eq!(advised, vec!["gamma"]);
}

#[tokio::test]
async fn test_unfollow_and_holdings_through_monitor() {
    let market = three_coins();
    let monitor = build(&market, Arc::new(MemoryStore::new()));
    let report = monitor.refresh().await.unwrap();
    let PassOutcome::Completed(report) = report else {
        panic!("refresh should not be skipped");
    };

    monitor.unfollow(report.new_advice[0].id).unwrap();
    assert_eq!(monitor.advice_log().len(), 1);
    // Unfollowing leaves the statistics alone, and the coin can be advised again
    assert_eq!(monitor.tracker().stats(), SuccessStats::default());
    let again = monitor.refresh().await.unwrap().completed().unwrap();
    assert_eq!(again.new_advice.len(), 1);
    assert_eq!(again.new_advice[0].coin_id, "alpha");

    monitor
        .holdings()
        .add(coinpulse::types::Holding {
            coin_id: "gamma".into(),
            quantity: dec!(100),
            buy_price: dec!(2),
        })
        .unwrap();
    let holdings = monitor.holdings_report().await;
    assert_eq!(holdings.len(), 1);
    let advice = holdings[0].advice.as_ref().unwrap();
    // (1 - 2) * 100 - 5
    assert_eq!(advice.net, dec!(-105));
    assert!(advice.in_shortlist);
}
