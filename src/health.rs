//! `GET /health` endpoint handler.
//!
//! Reports the configured mode, the breaker's current open/closed
//! state, uptime, and cumulative request statistics. Never performs a
//! downstream write — the breaker check here is read-only and cannot
//! consume the half-open probe slot.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::server::AppState;

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub mode: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub breaker_open: bool,
    pub stats: StatsResponse,
}

#[derive(Serialize, Deserialize)]
pub struct StatsResponse {
    pub accepted: u64,
    pub rejected: u64,
    pub dropped: u64,
}

pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let breaker_open = state.breaker.is_open();
    let mode = state.config.mode.name();
    let status = if breaker_open || mode == "unconfigured" {
        "degraded"
    } else {
        "healthy"
    };

    Json(HealthResponse {
        status: status.to_string(),
        mode: mode.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        breaker_open,
        stats: StatsResponse {
            accepted: state.stats.accepted.load(Ordering::Relaxed),
            rejected: state.stats.rejected.load(Ordering::Relaxed),
            dropped: state.stats.dropped.load(Ordering::Relaxed),
        },
    })
}
