//! Metrics and health endpoints

use axum::extract::State;
use axum::response::Json;
use chrono::Utc;
use serde_json::{json, Value};

use crate::state::AppState;

pub async fn metrics_handler(State(state): State<AppState>) -> Json<Value> {
    let snapshot = state.metrics.snapshot();
    Json(json!({
        "metrics": {
            "totalJobs": snapshot.total_jobs,
            "completedJobs": snapshot.completed_jobs,
            "failedJobs": snapshot.failed_jobs,
            "retries": snapshot.retries,
            "queueLength": snapshot.queued,
            "inFlight": snapshot.in_flight,
            "totalPrinters": snapshot.total_printers,
            "activePrinters": snapshot.active_printers,
            "rendererRecycles": snapshot.renderer_recycles,
            "renderer": snapshot.renderer,
            "breakerTrips": snapshot.breaker_trips,
            "refreshedAt": snapshot.refreshed_at,
        },
        "performance": {
            "averageProcessingTimeMs": snapshot.avg_processing_ms,
            "processingStdDevMs": snapshot.processing_std_dev_ms,
            "measuredJobs": snapshot.measured_jobs,
        },
        "timestamp": Utc::now(),
    }))
}

pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now(),
        "uptimeSecs": state.started_at.elapsed().as_secs(),
        "memory": { "rssBytes": rss_bytes() },
    }))
}

#[cfg(target_os = "linux")]
fn rss_bytes() -> Option<u64> {
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let rss_pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    Some(rss_pages * 4096)
}

#[cfg(not(target_os = "linux"))]
fn rss_bytes() -> Option<u64> {
    None
}
