//! Dashboard API route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<DashboardState>`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::errors::ApiError;
use crate::engine::monitor::{AdviceStatus, HoldingStatus, Monitor, MonitorStatus, PassOutcome, RefreshReport};
use crate::types::{AdviceRecord, Holding, ScoredCoin};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Shared state accessible by all route handlers.
pub struct DashboardState {
    pub monitor: Arc<Monitor>,
    pub started_at: DateTime<Utc>,
}

impl DashboardState {
    pub fn new(monitor: Arc<Monitor>) -> Self {
        Self {
            monitor,
            started_at: Utc::now(),
        }
    }
}

pub type AppState = Arc<DashboardState>;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub monitor: MonitorStatus,
    /// Success rate as shown to the user: "-" before anything was graded.
    pub success_display: String,
    pub uptime_secs: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewHolding {
    pub coin_id: String,
    pub quantity: rust_decimal::Decimal,
    pub buy_price: rust_decimal::Decimal,
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /api/status
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let status = state.monitor.status().await;
    Json(StatusResponse {
        success_display: status.stats.to_string(),
        monitor: status,
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
    })
}

/// GET /api/shortlist
pub async fn get_shortlist(State(state): State<AppState>) -> Json<Vec<ScoredCoin>> {
    Json(state.monitor.shortlist().await)
}

/// GET /api/advice (newest first)
pub async fn get_advice(State(state): State<AppState>) -> Json<Vec<AdviceStatus>> {
    Json(state.monitor.advice_report().await)
}

/// DELETE /api/advice/:id
pub async fn unfollow_advice(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<AdviceRecord>, ApiError> {
    Ok(Json(state.monitor.unfollow(id)?))
}

/// GET /api/holdings
pub async fn get_holdings(State(state): State<AppState>) -> Json<Vec<HoldingStatus>> {
    Json(state.monitor.holdings_report().await)
}

/// POST /api/holdings
pub async fn add_holding(
    State(state): State<AppState>,
    Json(body): Json<NewHolding>,
) -> Result<(StatusCode, Json<Holding>), ApiError> {
    let holding = state.monitor.holdings().add(Holding {
        coin_id: body.coin_id,
        quantity: body.quantity,
        buy_price: body.buy_price,
    })?;
    Ok((StatusCode::CREATED, Json(holding)))
}

/// DELETE /api/holdings/:coin_id
pub async fn remove_holding(
    State(state): State<AppState>,
    Path(coin_id): Path<String>,
) -> Result<Json<Holding>, ApiError> {
    Ok(Json(state.monitor.holdings().remove(&coin_id)?))
}

/// POST /api/refresh: run a refresh pass now.
pub async fn trigger_refresh(State(state): State<AppState>) -> Result<Json<RefreshReport>, ApiError> {
    match state.monitor.refresh().await? {
        PassOutcome::Completed(report) => Ok(Json(report)),
        PassOutcome::Skipped => Err(ApiError::Conflict("refresh already in progress".into())),
    }
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}
