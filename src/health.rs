//! `GET /health` endpoint handler.
//!
//! Returns a [`HealthResponse`] JSON payload with the crate version,
//! uptime, config source metadata, role, registry size, and cumulative
//! request and classification counters.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::server::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub config: ConfigHealth,
    pub stats: StatsResponse,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigHealth {
    pub source: String,
    pub version: String,
    pub loaded_ago_seconds: u64,
    pub role: String,
    pub routing_enabled: bool,
    pub routes: usize,
    pub services: usize,
    pub instances: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatsResponse {
    pub requests_forwarded: u64,
    pub requests_failed: u64,
    pub requests_unavailable: u64,
    pub config_reloads: u64,
    pub classified: ClassCounts,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ClassCounts {
    pub all: u64,
    pub prod: u64,
    pub gray: u64,
}

pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let loaded = state.config.load();
    let stats = &state.stats;

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        config: ConfigHealth {
            source: loaded.source_name.clone(),
            version: loaded.version.short().to_string(),
            loaded_ago_seconds: loaded.loaded_at.elapsed().as_secs(),
            role: loaded.config.role.as_str().to_string(),
            routing_enabled: loaded.config.routing.enabled,
            routes: loaded.config.routes.len(),
            services: loaded.registry.service_count(),
            instances: loaded.registry.instance_count(),
        },
        stats: StatsResponse {
            requests_forwarded: stats.forwarded.load(Ordering::Relaxed),
            requests_failed: stats.failed.load(Ordering::Relaxed),
            requests_unavailable: stats.unavailable.load(Ordering::Relaxed),
            config_reloads: stats.config_reloads.load(Ordering::Relaxed),
            classified: ClassCounts {
                all: stats.classified_all.load(Ordering::Relaxed),
                prod: stats.classified_prod.load(Ordering::Relaxed),
                gray: stats.classified_gray.load(Ordering::Relaxed),
            },
        },
    })
}
