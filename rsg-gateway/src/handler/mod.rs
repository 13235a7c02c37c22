use std::sync::Arc;

use axum::routing::{get, post};
use axum::{Extension, Router};
use http::StatusCode;
use rsg_engine::Engine;
use tower_http::trace::TraceLayer;

mod rest;
mod stream;

pub fn build_router(engine: Arc<Engine>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/health", get(rest::get_health))
        .route("/api/scenarios", get(rest::list_scenarios))
        .route("/api/scenarios/{id}", get(rest::get_scenario))
        .route("/api/scenarios/{id}/start", post(rest::start_scenario))
        .route("/api/runs/current", get(rest::current_run))
        .route("/api/runs/current/cancel", post(rest::cancel_run))
        .route("/api/runs/events", get(stream::run_events))
        .route("/api/validate", post(rest::validate))
        .route("/api/history/{kind}", get(rest::history))
        .fallback(no_found)
        .layer(Extension(engine))
        .layer(TraceLayer::new_for_http())
}

pub async fn no_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "NOT FOUND")
}

pub async fn healthz() -> &'static str {
    "ok"
}
