//! Dashboard — Axum web server exposing the monitor over a JSON API.
//!
//! CORS enabled for local development.

pub mod errors;
pub mod routes;

use anyhow::{Context, Result};
use axum::{
    http::{header, Method},
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use routes::AppState;

/// Bind the dashboard port and serve in a background task.
pub async fn spawn_dashboard(state: AppState, port: u16) -> Result<()> {
    let app = build_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind dashboard port {port}"))?;
    info!(port, "Dashboard server starting on http://localhost:{port}");

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "Dashboard server error");
        }
    });

    Ok(())
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/api/status", get(routes::get_status))
        .route("/api/shortlist", get(routes::get_shortlist))
        .route("/api/advice", get(routes::get_advice))
        .route("/api/advice/:id", delete(routes::unfollow_advice))
        .route(
            "/api/holdings",
            get(routes::get_holdings).post(routes::add_holding),
        )
        .route("/api/holdings/:coin_id", delete(routes::remove_holding))
        .route("/api/refresh", post(routes::trigger_refresh))
        .route("/health", get(routes::health))
        .layer(cors)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AdviceConfig, MonitorConfig, ScoringConfig};
    use crate::engine::monitor::Monitor;
    use crate::market::{MockMarketDataSource, MockPriceSource};
    use crate::storage::MemoryStore;
    use crate::types::CoinSnapshot;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use routes::DashboardState;
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn test_state() -> AppState {
        let mut market = MockMarketDataSource::new();
        market.expect_fetch_markets().returning(|_, _| {
            let mut hot = CoinSnapshot::sample("hot", dec!(50));
            hot.change_7d = 25.0;
            Ok(vec![hot, CoinSnapshot::sample("calm", dec!(2))])
        });
        let mut prices = MockPriceSource::new();
        prices.expect_fetch_price().returning(|_, _| Ok(Some(dec!(60))));

        let monitor = Monitor::new(
            Arc::new(market),
            Arc::new(prices),
            Arc::new(MemoryStore::new()),
            MonitorConfig::default(),
            ScoringConfig::default(),
            AdviceConfig::default(),
        );
        Arc::new(DashboardState::new(Arc::new(monitor)))
    }

    async fn send(app: Router, method: &str, uri: &str, body: Option<&str>) -> (StatusCode, serde_json::Value) {
        let mut req = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(b) => {
                req = req.header(header::CONTENT_TYPE, "application/json");
                Body::from(b.to_string())
            }
            None => Body::empty(),
        };
        let resp = app.oneshot(req.body(body).unwrap()).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), 100_000).await.unwrap();
        // Extractor rejections from axum come back as plain text
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, json)
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (status, _) = send(build_router(test_state()), "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_status_before_any_grading() {
        let (status, json) = send(build_router(test_state()), "GET", "/api/status", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success_display"], "-");
        assert!(json["success_rate"].is_null());
        assert_eq!(json["shortlist_len"], 0);
        assert_eq!(json["vs_currency"], "eur");
    }

    #[tokio::test]
    async fn test_refresh_then_shortlist_and_advice() {
        let state = test_state();

        let (status, report) = send(build_router(state.clone()), "POST", "/api/refresh", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["failed"], false);
        assert_eq!(report["new_advice"].as_array().unwrap().len(), 1);

        let (_, shortlist) = send(build_router(state.clone()), "GET", "/api/shortlist", None).await;
        let shortlist = shortlist.as_array().unwrap();
        assert_eq!(shortlist.len(), 2);
        assert_eq!(shortlist[0]["id"], "hot");

        let (_, advice) = send(build_router(state.clone()), "GET", "/api/advice", None).await;
        let advice = advice.as_array().unwrap();
        assert_eq!(advice.len(), 1);
        assert_eq!(advice[0]["coin_id"], "hot");
        assert_eq!(advice[0]["result"], "Pending");
        assert_eq!(advice[0]["start_price"].as_f64().unwrap(), 50.0);
        assert_eq!(advice[0]["current_price"].as_f64().unwrap(), 60.0);

        let id = advice[0]["id"].as_str().unwrap().to_string();
        let (status, _) = send(build_router(state.clone()), "DELETE", &format!("/api/advice/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, json) = send(build_router(state), "DELETE", &format!("/api/advice/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["success"], false);
    }

    #[tokio::test]
    async fn test_unfollow_rejects_bad_id() {
        let (status, body) = send(build_router(test_state()), "DELETE", "/api/advice/not-a-uuid", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.is_string());
    }

    #[tokio::test]
    async fn test_holdings_crud() {
        let state = test_state();

        let (status, json) = send(
            build_router(state.clone()),
            "POST",
            "/api/holdings",
            Some(r#"{"coin_id":"bitcoin","quantity":2,"buy_price":50}"#),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["coin_id"], "bitcoin");

        let (status, json) = send(build_router(state.clone()), "GET", "/api/holdings", None).await;
        assert_eq!(status, StatusCode::OK);
        let rows = json.as_array().unwrap();
        assert_eq!(rows.len(), 1);
        // (60 - 50) * 2 - 5 fee
        assert_eq!(rows[0]["advice"]["action"], "Hold");
        assert_eq!(rows[0]["advice"]["net"].as_f64().unwrap(), 15.0);

        let (status, _) = send(build_router(state.clone()), "DELETE", "/api/holdings/bitcoin", None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(build_router(state), "DELETE", "/api/holdings/bitcoin", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_invalid_holding_is_bad_request() {
        let (status, json) = send(
            build_router(test_state()),
            "POST",
            "/api/holdings",
            Some(r#"{"coin_id":"bitcoin","quantity":0,"buy_price":50}"#),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("positive"));
    }
}
