//! `GET /_mesh/health` endpoint handler.
//!
//! Returns a [`HealthResponse`] JSON payload containing the server
//! version, uptime, config source, the installed routes with the liveness
//! of every backend, and cumulative request statistics. The path lives
//! under `/_mesh/` so it does not shadow ordinary route prefixes.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::server::AppState;

pub const HEALTH_PATH: &str = "/_mesh/health";

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub commit: String,
    pub uptime_seconds: u64,
    pub config: ConfigHealth,
    pub routes: Vec<RouteHealth>,
    pub stats: StatsResponse,
}

#[derive(Serialize, Deserialize)]
pub struct ConfigHealth {
    pub source: String,
    pub routes: usize,
    pub backends: usize,
    pub alive_backends: usize,
}

#[derive(Serialize, Deserialize)]
pub struct RouteHealth {
    pub prefix: String,
    pub backends: Vec<BackendHealth>,
}

#[derive(Serialize, Deserialize)]
pub struct BackendHealth {
    pub address: String,
    pub alive: bool,
}

#[derive(Serialize, Deserialize)]
pub struct StatsResponse {
    pub requests_forwarded: u64,
    pub requests_failed: u64,
    pub routes_not_found: u64,
    pub backends_unavailable: u64,
}

pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let snapshot = state.dispatcher.table().snapshot();

    let routes: Vec<RouteHealth> = snapshot
        .iter()
        .map(|route| RouteHealth {
            prefix: route.prefix.to_string(),
            backends: route
                .pool
                .members()
                .iter()
                .map(|backend| BackendHealth {
                    address: backend.origin().to_string(),
                    alive: backend.is_alive(),
                })
                .collect(),
        })
        .collect();

    let backends = routes.iter().map(|r| r.backends.len()).sum();
    let alive_backends = routes
        .iter()
        .flat_map(|r| &r.backends)
        .filter(|b| b.alive)
        .count();

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        commit: env!("RELAYMESH_GIT_SHORT").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        config: ConfigHealth {
            source: state.source_name.clone(),
            routes: routes.len(),
            backends,
            alive_backends,
        },
        routes,
        stats: StatsResponse {
            requests_forwarded: state.stats.forwarded.load(Ordering::Relaxed),
            requests_failed: state.stats.failed.load(Ordering::Relaxed),
            routes_not_found: state.stats.not_found.load(Ordering::Relaxed),
            backends_unavailable: state.stats.unavailable.load(Ordering::Relaxed),
        },
    })
}
