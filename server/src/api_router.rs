//! Route assembly

use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, post};
use axum::Router;

use crate::middleware::{cors_layer, rate_limit, route_timeout, trace_requests};
use crate::print_api::{job_status_handler, submit_handler};
use crate::printers_api::{printers_handler, zebra_reset_handler};
use crate::state::AppState;
use crate::system_api::{health_handler, metrics_handler};

/// All routes under `/api/print`, with throttling and hard deadlines on the
/// whole `/api` subtree.
pub fn build_router(state: AppState) -> Router {
    let print_routes = Router::new()
        .route("/submit", post(submit_handler))
        .route("/status/{job_id}", get(job_status_handler))
        .route("/metrics", get(metrics_handler))
        .route("/printers", get(printers_handler))
        .route("/zebra/reset-media/{printer_name}", post(zebra_reset_handler))
        .route("/health", get(health_handler));

    let api = Router::new()
        .nest("/print", print_routes)
        .layer(from_fn_with_state(state.clone(), rate_limit))
        .layer(from_fn_with_state(state.clone(), route_timeout));

    Router::new()
        .nest("/api", api)
        .layer(from_fn(trace_requests))
        .layer(cors_layer(&state.config.http.allowed_origins))
        .with_state(state)
}
