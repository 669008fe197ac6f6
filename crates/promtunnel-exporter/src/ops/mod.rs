//! Operational HTTP endpoints.
//!
//! - `/metrics` : Prometheus text format
//! - `/healthz` : liveness
//! - `/readyz`  : readiness (503 until marked ready, and again while shutting down)
//! - `/version` : build info as JSON

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use crate::app_state::AppState;
use crate::obs::metrics::CONTENT_TYPE;

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    if state.is_ready() {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}

pub async fn version(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.build_info().clone())
}

pub async fn metrics(State(state): State<AppState>) -> Response {
    match state.metrics().render() {
        Ok(body) => (StatusCode::OK, [(header::CONTENT_TYPE, CONTENT_TYPE)], body).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}
