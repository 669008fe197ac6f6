//! Axum router wiring for the exposition server.
//!
//! The probe routes themselves are not instrumented; only handlers passed
//! through [`crate::obs::instrument`] feed the request metrics.

use axum::{routing::get, Router};

use crate::{app_state::AppState, ops};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/metrics", get(ops::metrics))
        .route("/healthz", get(ops::healthz))
        .route("/readyz", get(ops::readyz))
        .route("/version", get(ops::version))
        .with_state(state)
}
